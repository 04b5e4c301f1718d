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

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sunmeter_core::{Collector, CollectorSettings, SampleStore};
use sunmeter_server::api::{self, ApiState};
use sunmeter_server::config::ServerConfig;
use sunmeter_server::poller;
use sunmeter_solarman::{SolarmanClient, SolarmanCredentials};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sunmeter_server=info,sunmeter_core=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sunmeter.toml".to_owned());
    info!(path = %config_path, "Loading configuration");
    let config = ServerConfig::from_file(&config_path)?;

    let store = Arc::new(SampleStore::open(&config.database.path)?);
    info!(path = %config.database.path, "Sample store opened");

    let source = SolarmanClient::new(
        &config.solarman.base_url,
        SolarmanCredentials {
            app_id: config.solarman.app_id.clone(),
            app_secret: config.solarman.app_secret.clone(),
            email: config.solarman.email.clone(),
            password_sha256: config.solarman.password_sha256.clone(),
        },
        config.solarman.station_id,
        &config.solarman.device_sn,
    )?;

    let collector = Arc::new(Collector::new(
        Arc::new(source),
        Arc::clone(&store),
        CollectorSettings {
            noise_floor_w: config.collector.noise_floor_w,
            cache_ttl_secs: config.collector.cache_ttl_secs,
        },
        config.collector.base_total_kwh,
    )?);

    poller::spawn_poller(Arc::clone(&collector), config.collector.poll_interval_secs);

    let state = ApiState {
        collector,
        admin_secret: Arc::from(config.admin.secret.as_str()),
        timezone: config.timezone(),
    };

    let app = Router::new()
        .route("/api/status", get(api::status_handler))
        .route("/api/energy/today", get(api::energy_today_handler))
        .route("/api/power/today", get(api::power_today_handler))
        .route("/api/admin/recalibrate", post(api::recalibrate_handler))
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("SunMeter Server listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
