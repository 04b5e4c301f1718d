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

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{info, warn};

use sunmeter_types::{LiveStatus, Sample};

use crate::fields;
use crate::reconcile::{self, CalibrationState};
use crate::source::TelemetrySource;
use crate::store::SampleStore;

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub noise_floor_w: f64,
    /// Readers within this window are served from the cache; the upstream
    /// provider is never called more often than once per window.
    pub cache_ttl_secs: i64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            noise_floor_w: fields::DEFAULT_NOISE_FLOOR_W,
            cache_ttl_secs: 30,
        }
    }
}

/// The collection pipeline and its read cache.
///
/// One logical pipeline: the calibration mutex serializes ticks (periodic
/// or on-demand) and the administrative reset, so concurrent invocations
/// can never interleave calibration writes or double-append a sample.
/// Readers only touch the `RwLock` cache and never block each other.
pub struct Collector {
    source: Arc<dyn TelemetrySource>,
    store: Arc<SampleStore>,
    settings: CollectorSettings,
    cache: RwLock<Option<LiveStatus>>,
    calibration: tokio::sync::Mutex<CalibrationState>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Wire up the pipeline, resuming calibration from the store when a
    /// persisted record exists, else starting from the configured base.
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        store: Arc<SampleStore>,
        settings: CollectorSettings,
        base_total_kwh: f64,
    ) -> Result<Self> {
        let calibration = match store.load_calibration()? {
            Some(state) => {
                info!(
                    floor_kwh = state.floor_kwh,
                    accumulated_kwh = state.accumulated_kwh,
                    "Resuming persisted calibration"
                );
                state
            }
            None => {
                info!(floor_kwh = base_total_kwh, "Starting fresh calibration");
                CalibrationState::new(base_total_kwh)
            }
        };

        Ok(Self {
            source,
            store,
            settings,
            cache: RwLock::new(None),
            calibration: tokio::sync::Mutex::new(calibration),
        })
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    fn fresh_cached(&self, now: DateTime<Utc>) -> Option<LiveStatus> {
        let ttl = Duration::seconds(self.settings.cache_ttl_secs);
        self.cache
            .read()
            .as_ref()
            .filter(|status| now - status.collected_at < ttl)
            .cloned()
    }

    /// Read path: cached result inside the freshness window, otherwise a
    /// refresh. A failed refresh serves the last known result; readers get
    /// a zeroed placeholder only when nothing has ever been collected.
    pub async fn current(&self, now: DateTime<Utc>) -> LiveStatus {
        if let Some(status) = self.fresh_cached(now) {
            return status;
        }

        match self.refresh(now).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Collection failed, serving last known result");
                self.cache
                    .read()
                    .clone()
                    .unwrap_or_else(|| LiveStatus::unavailable(now))
            }
        }
    }

    /// Run one full pipeline tick. Also the periodic poller entry point.
    ///
    /// Calibration is advanced on a working copy and committed only after
    /// the sample append succeeds; a failed tick leaves no trace.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<LiveStatus> {
        let mut guard = self.calibration.lock().await;

        // Another caller may have finished a tick while we waited.
        if let Some(status) = self.fresh_cached(now) {
            return Ok(status);
        }

        let credential = self.source.credential().await?;
        let station = self.source.station_summary(&credential).await?;
        let snapshot = self.source.device_snapshot(&credential).await?;

        let power_w = fields::estimate_power(&station, &snapshot, self.settings.noise_floor_w);
        let counter_kwh = fields::lifetime_counter(&station, &snapshot);
        let battery_soc = fields::battery_soc(&station, &snapshot);

        let mut working = guard.clone();
        let lifetime_kwh = reconcile::reconcile(
            &mut working,
            counter_kwh,
            power_w,
            self.settings.noise_floor_w,
            now,
        );

        let sample = Sample {
            timestamp: now,
            power_w,
            lifetime_kwh,
        };
        self.store.append(&sample).context("Failed to append sample")?;
        self.store
            .save_calibration(&working)
            .context("Failed to persist calibration")?;
        *guard = working;

        let status = LiveStatus {
            station_name: station.name,
            power_w,
            lifetime_kwh,
            battery_soc,
            collected_at: now,
        };
        *self.cache.write() = Some(status.clone());

        info!(
            power_w,
            lifetime_kwh,
            counter_present = counter_kwh.is_some(),
            "Collection tick completed"
        );
        Ok(status)
    }

    /// Administrative reset: adopt `floor_kwh` as the new known-good
    /// lifetime total, drop all accrued state and the whole sample series.
    /// Mutually exclusive with in-flight ticks.
    pub async fn recalibrate(&self, floor_kwh: f64, now: DateTime<Utc>) -> Result<()> {
        let mut guard = self.calibration.lock().await;

        self.store.clear().context("Failed to clear sample series")?;
        guard.recalibrate(floor_kwh);
        self.store
            .save_calibration(&guard)
            .context("Failed to persist recalibration")?;
        *self.cache.write() = None;

        info!(floor_kwh, at = %now, "Recalibrated lifetime energy");
        Ok(())
    }
}
