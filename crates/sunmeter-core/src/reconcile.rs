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

/// Mutable reconciliation state, persisted across restarts.
///
/// `accumulated_kwh` and `last_emitted_kwh` are deliberately separate: the
/// accumulator is the integral of measured power since the last calibration
/// and is never clamped, while the emitted total is what the monotonicity
/// guard operates on. A transient bad reading therefore only distorts one
/// emitted value and self-heals on the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Operator-supplied known-good lifetime total, set at deployment or by
    /// an administrative recalibration.
    pub floor_kwh: f64,
    /// Energy integrated from power readings since the last calibration.
    pub accumulated_kwh: f64,
    /// Timestamp of the previous tick; `None` right after (re)calibration.
    pub last_tick: Option<DateTime<Utc>>,
    /// The lifetime total emitted on the previous tick.
    pub last_emitted_kwh: f64,
}

impl CalibrationState {
    #[must_use]
    pub fn new(floor_kwh: f64) -> Self {
        Self {
            floor_kwh,
            accumulated_kwh: 0.0,
            last_tick: None,
            last_emitted_kwh: floor_kwh,
        }
    }

    /// Adopt a new floor and restart accumulation from it.
    pub fn recalibrate(&mut self, floor_kwh: f64) {
        self.floor_kwh = floor_kwh;
        self.accumulated_kwh = 0.0;
        self.last_tick = None;
        self.last_emitted_kwh = floor_kwh;
    }
}

/// Advance the integration accumulator for one tick.
///
/// Productive ticks (power strictly above the noise floor) accrue
/// `power_kW * elapsed_hours`; non-productive ticks accrue nothing. Either
/// way `last_tick` moves forward, so a long night never telescopes into the
/// first morning tick.
pub fn advance_integration(
    state: &mut CalibrationState,
    power_w: f64,
    noise_floor_w: f64,
    now: DateTime<Utc>,
) {
    if let Some(previous) = state.last_tick
        && power_w > noise_floor_w
    {
        let elapsed_hours = (now - previous).num_milliseconds() as f64 / 3_600_000.0;
        if elapsed_hours > 0.0 {
            state.accumulated_kwh += power_w / 1000.0 * elapsed_hours;
        }
    }
    state.last_tick = Some(now);
}

/// Reconcile one tick into the authoritative lifetime-energy value.
///
/// The counter reading wins when the source exposes one; otherwise the
/// candidate is the calibration floor plus the integrated accumulator. The
/// guard then rejects absent, zero, below-floor and regressing candidates,
/// replacing them with the best value already emitted. Only the emitted
/// total is guarded; the accumulator keeps whatever it has accrued.
pub fn reconcile(
    state: &mut CalibrationState,
    counter_kwh: Option<f64>,
    power_w: f64,
    noise_floor_w: f64,
    now: DateTime<Utc>,
) -> f64 {
    advance_integration(state, power_w, noise_floor_w, now);

    let candidate = match counter_kwh {
        Some(value) => value,
        None => state.floor_kwh + state.accumulated_kwh,
    };

    let mut emitted = if candidate <= 0.0 || candidate < state.floor_kwh {
        state.floor_kwh
    } else {
        candidate
    };
    if emitted < state.last_emitted_kwh {
        emitted = state.last_emitted_kwh;
    }

    state.last_emitted_kwh = emitted;
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FLOOR: f64 = 100.0;
    const NOISE_FLOOR_W: f64 = 20.0;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    fn tick(state: &mut CalibrationState, counter: Option<f64>, power_w: f64, now: DateTime<Utc>) -> f64 {
        reconcile(state, counter, power_w, NOISE_FLOOR_W, now)
    }

    #[test]
    fn integration_accrues_power_over_elapsed_time() {
        let mut state = CalibrationState::new(FLOOR);
        // First tick has no prior timestamp, so it contributes no delta.
        assert_eq!(tick(&mut state, None, 500.0, at(10, 0)), FLOOR);
        let emitted = tick(&mut state, None, 500.0, at(11, 0));
        assert!((emitted - (FLOOR + 0.5)).abs() < 1e-9, "got {emitted}");
    }

    #[test]
    fn below_floor_power_accrues_nothing_but_advances_the_clock() {
        let mut state = CalibrationState::new(FLOOR);
        tick(&mut state, None, 500.0, at(10, 0));
        // Night tick: elapsed time is positive, delta must stay zero.
        tick(&mut state, None, 10.0, at(11, 0));
        assert_eq!(state.accumulated_kwh, 0.0);
        assert_eq!(state.last_tick, Some(at(11, 0)));
        // The hour of darkness must not telescope into the next productive tick.
        let emitted = tick(&mut state, None, 1000.0, at(11, 30));
        assert!((emitted - (FLOOR + 0.5)).abs() < 1e-9, "got {emitted}");
    }

    #[test]
    fn counter_reading_wins_over_integration() {
        let mut state = CalibrationState::new(FLOOR);
        assert_eq!(tick(&mut state, Some(250.0), 500.0, at(10, 0)), 250.0);
    }

    #[test]
    fn counter_below_floor_is_replaced_by_the_floor() {
        let mut state = CalibrationState::new(FLOOR);
        assert_eq!(tick(&mut state, Some(42.0), 0.0, at(10, 0)), FLOOR);
        assert_eq!(tick(&mut state, Some(0.0), 0.0, at(10, 5)), FLOOR);
    }

    #[test]
    fn emitted_sequence_never_decreases_when_counter_regresses() {
        let mut state = CalibrationState::new(FLOOR);
        assert_eq!(tick(&mut state, Some(105.0), 0.0, at(10, 0)), 105.0);
        // Device-side counter reset: still above the floor, but regressing.
        assert_eq!(tick(&mut state, Some(104.0), 0.0, at(10, 5)), 105.0);
        assert_eq!(tick(&mut state, None, 0.0, at(10, 10)), 105.0);
        assert_eq!(tick(&mut state, Some(106.0), 0.0, at(10, 15)), 106.0);
    }

    #[test]
    fn guard_leaves_the_accumulator_untouched() {
        let mut state = CalibrationState::new(FLOOR);
        tick(&mut state, None, 1000.0, at(10, 0));
        tick(&mut state, None, 1000.0, at(11, 0));
        assert!((state.accumulated_kwh - 1.0).abs() < 1e-9);
        // A glitched counter reading distorts one emission only.
        assert_eq!(tick(&mut state, Some(0.0), 1000.0, at(11, 30)), FLOOR + 1.0);
        assert!((state.accumulated_kwh - 1.5).abs() < 1e-9);
        let healed = tick(&mut state, None, 0.0, at(12, 0));
        assert!((healed - (FLOOR + 1.5)).abs() < 1e-9, "got {healed}");
    }

    #[test]
    fn recalibrate_restarts_from_the_new_floor() {
        let mut state = CalibrationState::new(FLOOR);
        tick(&mut state, None, 1000.0, at(10, 0));
        tick(&mut state, None, 1000.0, at(11, 0));
        state.recalibrate(5000.0);
        assert_eq!(state.accumulated_kwh, 0.0);
        assert_eq!(state.last_tick, None);
        // First tick after reset emits the new floor (no elapsed time yet).
        assert_eq!(tick(&mut state, None, 800.0, at(12, 0)), 5000.0);
    }
}
