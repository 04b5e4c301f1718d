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

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::path::Path;
use std::sync::Mutex;

use sunmeter_types::Sample;

use crate::reconcile::CalibrationState;

/// Durable time series of reconciled samples plus the single-row
/// calibration record. Samples are append-only; the only deletion path is
/// [`SampleStore::clear`], reserved for administrative recalibration.
#[derive(Debug)]
pub struct SampleStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SampleStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open database: {path}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS samples (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp     TEXT NOT NULL,
                power_w       REAL NOT NULL,
                lifetime_kwh  REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_samples_timestamp
                ON samples(timestamp);

            CREATE TABLE IF NOT EXISTS calibration (
                id               INTEGER PRIMARY KEY CHECK (id = 1),
                floor_kwh        REAL NOT NULL,
                accumulated_kwh  REAL NOT NULL,
                last_tick        TEXT,
                last_emitted_kwh REAL NOT NULL
            );",
        )
        .context("Failed to initialize database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn append(&self, sample: &Sample) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT INTO samples (timestamp, power_w, lifetime_kwh) VALUES (?1, ?2, ?3)",
            params![
                sample.timestamp.to_rfc3339(),
                sample.power_w,
                sample.lifetime_kwh
            ],
        )?;
        Ok(())
    }

    /// All samples strictly after `since`, ascending by timestamp.
    pub fn samples_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT timestamp, power_w, lifetime_kwh FROM samples
             WHERE timestamp > ?1 ORDER BY timestamp ASC",
        )?;

        let rows = stmt
            .query_map(params![since.to_rfc3339()], |row| {
                Ok(Sample {
                    timestamp: row.get(0)?,
                    power_w: row.get(1)?,
                    lifetime_kwh: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Energy produced since `since`: the spread of the lifetime counter
    /// over the qualifying samples. Clamped to zero; samples recorded
    /// before a recalibration may predate the current floor.
    pub fn energy_since(&self, since: DateTime<Utc>) -> Result<f64> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let spread: Option<f64> = conn.query_row(
            "SELECT MAX(lifetime_kwh) - MIN(lifetime_kwh) FROM samples WHERE timestamp > ?1",
            params![since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(spread.unwrap_or(0.0).max(0.0))
    }

    /// Full-resolution intraday power curve: every sample after `since`,
    /// ascending, unfiltered.
    pub fn power_curve_since(&self, since: DateTime<Utc>) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT timestamp, power_w FROM samples
             WHERE timestamp > ?1 ORDER BY timestamp ASC",
        )?;

        let rows = stmt
            .query_map(params![since.to_rfc3339()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Administrative wipe of the whole series.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute("DELETE FROM samples", [])?;
        Ok(())
    }

    pub fn load_calibration(&self) -> Result<Option<CalibrationState>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let state = conn
            .query_row(
                "SELECT floor_kwh, accumulated_kwh, last_tick, last_emitted_kwh
                 FROM calibration WHERE id = 1",
                [],
                |row| {
                    Ok(CalibrationState {
                        floor_kwh: row.get(0)?,
                        accumulated_kwh: row.get(1)?,
                        last_tick: row.get(2)?,
                        last_emitted_kwh: row.get(3)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(state)
    }

    pub fn save_calibration(&self, state: &CalibrationState) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute(
            "INSERT INTO calibration (id, floor_kwh, accumulated_kwh, last_tick, last_emitted_kwh)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                floor_kwh = ?1,
                accumulated_kwh = ?2,
                last_tick = ?3,
                last_emitted_kwh = ?4",
            params![
                state.floor_kwh,
                state.accumulated_kwh,
                state.last_tick.map(|t| t.to_rfc3339()),
                state.last_emitted_kwh
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    fn sample(ts: DateTime<Utc>, power_w: f64, lifetime_kwh: f64) -> Sample {
        Sample {
            timestamp: ts,
            power_w,
            lifetime_kwh,
        }
    }

    fn store_with_day() -> SampleStore {
        let store = SampleStore::open(":memory:").expect("open in-memory store");
        store.append(&sample(at(8, 0), 0.0, 100.0)).unwrap();
        store.append(&sample(at(10, 0), 400.0, 100.0)).unwrap();
        store.append(&sample(at(12, 0), 900.0, 103.5)).unwrap();
        store
    }

    #[test]
    fn samples_come_back_ascending_and_strictly_after_the_cutoff() {
        let store = store_with_day();
        let rows = store.samples_since(at(8, 0)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, at(10, 0));
        assert_eq!(rows[1].timestamp, at(12, 0));
    }

    #[test]
    fn energy_since_is_the_lifetime_spread() {
        let store = store_with_day();
        let kwh = store.energy_since(at(0, 0)).unwrap();
        assert!((kwh - 3.5).abs() < 1e-9, "got {kwh}");
    }

    #[test]
    fn energy_since_is_zero_without_qualifying_samples() {
        let store = store_with_day();
        assert_eq!(store.energy_since(at(23, 0)).unwrap(), 0.0);
        let empty = SampleStore::open(":memory:").unwrap();
        assert_eq!(empty.energy_since(at(0, 0)).unwrap(), 0.0);
    }

    #[test]
    fn power_curve_keeps_every_sample() {
        let store = store_with_day();
        let curve = store.power_curve_since(at(0, 0)).unwrap();
        assert_eq!(
            curve,
            vec![(at(8, 0), 0.0), (at(10, 0), 400.0), (at(12, 0), 900.0)]
        );
    }

    #[test]
    fn clear_empties_the_series() {
        let store = store_with_day();
        store.clear().unwrap();
        assert!(store.samples_since(at(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn calibration_round_trips() {
        let store = SampleStore::open(":memory:").unwrap();
        assert!(store.load_calibration().unwrap().is_none());

        let mut state = CalibrationState::new(100.0);
        state.accumulated_kwh = 2.5;
        state.last_tick = Some(at(12, 0));
        state.last_emitted_kwh = 102.5;
        store.save_calibration(&state).unwrap();
        assert_eq!(store.load_calibration().unwrap(), Some(state.clone()));

        // Saving again overwrites the single row.
        state.recalibrate(5000.0);
        store.save_calibration(&state).unwrap();
        assert_eq!(store.load_calibration().unwrap(), Some(state));
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sunmeter.db");
        let path = path.to_str().unwrap();

        {
            let store = SampleStore::open(path).unwrap();
            store.append(&sample(at(10, 0), 400.0, 100.0)).unwrap();
            store.save_calibration(&CalibrationState::new(100.0)).unwrap();
        }

        let reopened = SampleStore::open(path).unwrap();
        assert_eq!(reopened.samples_since(at(0, 0)).unwrap().len(), 1);
        assert_eq!(
            reopened.load_calibration().unwrap(),
            Some(CalibrationState::new(100.0))
        );
    }
}
