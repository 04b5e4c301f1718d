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

use async_trait::async_trait;

use sunmeter_types::{RawSnapshot, StationSummary};

use crate::error::SourceResult;

/// Opaque bearer credential. The provider signals no expiry back to us, so
/// the collector requests a fresh one every tick; caching is the vendor
/// adapter's business if it wants it.
#[derive(Debug, Clone)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

/// Remote telemetry provider seam. Vendor crates (Solarman today) implement
/// this; the collector pipeline only ever talks through it.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn credential(&self) -> SourceResult<Credential>;

    async fn station_summary(&self, credential: &Credential) -> SourceResult<StationSummary>;

    async fn device_snapshot(&self, credential: &Credential) -> SourceResult<RawSnapshot>;
}
