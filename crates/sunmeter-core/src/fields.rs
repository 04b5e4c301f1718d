// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SunMeter.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use sunmeter_types::{RawSnapshot, StationSummary};

/// Default noise floor in watts. Inverters report a few watts of jitter
/// overnight; anything strictly below this is treated as zero so it never
/// accrues energy.
pub const DEFAULT_NOISE_FLOOR_W: f64 = 20.0;

/// Instantaneous-power registers, in fallback order: AC output first, then
/// DC input (panel side), then the legacy inverter output register.
pub const POWER_FIELDS: &[&str] = &["APo_t1", "DPi_t1", "P_INV1"];

/// Cumulative lifetime-generation registers, in fallback order.
pub const LIFETIME_FIELDS: &[&str] = &["Et_ge0"];

/// Battery state-of-charge register.
pub const BATTERY_SOC_FIELD: &str = "B_left_cap1";

/// Look up `key` in the snapshot and coerce its raw value to a number.
/// Absence is a first-class result: a missing key, an unparsable string or
/// a non-finite value all come back as `None`, never as an error.
#[must_use]
pub fn resolve(snapshot: &RawSnapshot, key: &str) -> Option<f64> {
    snapshot
        .fields
        .iter()
        .find(|field| field.key == key)
        .and_then(|field| coerce(&field.value))
}

/// First key of `keys` that resolves to a present value wins.
#[must_use]
pub fn first_resolved(snapshot: &RawSnapshot, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| resolve(snapshot, key))
}

fn coerce(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        // The cloud reports most registers as strings, and some firmware
        // locales use a comma decimal separator.
        serde_json::Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        serde_json::Value::Null
        | serde_json::Value::Bool(_)
        | serde_json::Value::Array(_)
        | serde_json::Value::Object(_) => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Pick the instantaneous power reading for this tick.
///
/// Candidates in order: the station-level generation power, then the device
/// registers of [`POWER_FIELDS`]. Whatever wins is clamped to zero when it
/// sits strictly below the noise floor.
#[must_use]
pub fn estimate_power(
    station: &StationSummary,
    snapshot: &RawSnapshot,
    noise_floor_w: f64,
) -> f64 {
    let raw = station
        .generation_power_w
        .or_else(|| first_resolved(snapshot, POWER_FIELDS))
        .unwrap_or(0.0);

    if raw < noise_floor_w { 0.0 } else { raw }
}

/// Cumulative lifetime-energy counter, when the source exposes one:
/// station-level total first, then the device generation register.
#[must_use]
pub fn lifetime_counter(station: &StationSummary, snapshot: &RawSnapshot) -> Option<f64> {
    station
        .total_energy_kwh
        .or_else(|| first_resolved(snapshot, LIFETIME_FIELDS))
}

/// Battery state of charge in percent, if reported anywhere.
#[must_use]
pub fn battery_soc(station: &StationSummary, snapshot: &RawSnapshot) -> Option<f64> {
    resolve(snapshot, BATTERY_SOC_FIELD).or(station.battery_soc)
}
