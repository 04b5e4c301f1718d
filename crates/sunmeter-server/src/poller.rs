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

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sunmeter_core::Collector;

/// Periodic collection trigger. Tick failures are logged and discarded;
/// the schedule never stops.
pub fn spawn_poller(collector: Arc<Collector>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        info!(interval_secs, "Collection poller started");

        loop {
            interval.tick().await;

            if let Err(e) = collector.refresh(Utc::now()).await {
                warn!(error = %e, "Collection tick failed");
            }
        }
    })
}
