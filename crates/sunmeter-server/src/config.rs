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

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub solarman: SolarmanSettings,
    #[serde(default)]
    pub collector: CollectorSettings,
    pub admin: AdminSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolarmanSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    pub email: String,
    /// SHA-256 hex of the portal password; the API never sees the clear text.
    pub password_sha256: String,
    pub device_sn: String,
    pub station_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_noise_floor_w")]
    pub noise_floor_w: f64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
    /// Known-good lifetime total at deployment time, in kWh.
    #[serde(default)]
    pub base_total_kwh: f64,
    /// IANA timezone defining the "today" boundary for aggregates.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminSettings {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8200
}

fn default_base_url() -> String {
    "https://globalapi.solarmanpv.com".to_owned()
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_noise_floor_w() -> f64 {
    20.0
}

fn default_cache_ttl_secs() -> i64 {
    30
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_db_path() -> String {
    "./data/sunmeter.db".to_owned()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            noise_floor_w: default_noise_floor_w(),
            cache_ttl_secs: default_cache_ttl_secs(),
            base_total_kwh: 0.0,
            timezone: default_timezone(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.admin.secret.is_empty() || self.admin.secret == "change-me" {
            bail!("admin.secret must be set to a strong random value");
        }
        if self.solarman.app_id.is_empty() || self.solarman.app_secret.is_empty() {
            bail!("solarman.app_id and solarman.app_secret must be set");
        }
        if self.solarman.device_sn.is_empty() {
            bail!("solarman.device_sn must be set");
        }
        if self.collector.poll_interval_secs == 0 {
            bail!("collector.poll_interval_secs must be at least 1");
        }
        if !self.collector.base_total_kwh.is_finite() || self.collector.base_total_kwh < 0.0 {
            bail!("collector.base_total_kwh must be a non-negative number");
        }
        if self.collector.timezone.parse::<chrono_tz::Tz>().is_err() {
            bail!(
                "collector.timezone is not a valid IANA timezone: {}",
                self.collector.timezone
            );
        }
        Ok(())
    }

    /// Parsed timezone; validation guarantees this cannot fail after load.
    #[must_use]
    pub fn timezone(&self) -> chrono_tz::Tz {
        self.collector
            .timezone
            .parse()
            .unwrap_or(chrono_tz::Tz::UTC)
    }
}
