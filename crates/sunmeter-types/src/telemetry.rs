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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One register reported by the device cloud. The cloud sends most values
/// as strings, some as numbers; both are kept raw until resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawField {
    pub key: String,
    pub value: serde_json::Value,
}

/// Raw device readings for a single collection tick, in the order the
/// cloud reported them. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub fields: Vec<RawField>,
}

impl RawSnapshot {
    #[must_use]
    pub fn new(fields: Vec<RawField>) -> Self {
        Self { fields }
    }
}

/// Station-level summary from the provider. Everything besides the name
/// may be missing depending on the plant's metering generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationSummary {
    pub name: String,
    pub generation_power_w: Option<f64>,
    pub battery_soc: Option<f64>,
    pub total_energy_kwh: Option<f64>,
}

/// One persisted time-series row. Immutable once appended; the series is
/// cleared only by an administrative recalibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub power_w: f64,
    pub lifetime_kwh: f64,
}

/// Last successfully reconciled result, served to readers from the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStatus {
    pub station_name: String,
    pub power_w: f64,
    pub lifetime_kwh: f64,
    pub battery_soc: Option<f64>,
    pub collected_at: DateTime<Utc>,
}

impl LiveStatus {
    /// Zeroed placeholder used when no collection has ever succeeded.
    #[must_use]
    pub fn unavailable(now: DateTime<Utc>) -> Self {
        Self {
            station_name: String::new(),
            power_w: 0.0,
            lifetime_kwh: 0.0,
            battery_soc: None,
            collected_at: now,
        }
    }
}
