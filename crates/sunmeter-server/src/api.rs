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

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use sunmeter_core::Collector;

#[derive(Clone)]
pub struct ApiState {
    pub collector: Arc<Collector>,
    pub admin_secret: Arc<str>,
    pub timezone: Tz,
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub station_name: String,
    pub current_power_w: f64,
    pub total_kwh: f64,
    pub battery_soc: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct EnergyTodayResponse {
    pub kwh: f64,
}

#[derive(Debug, Serialize)]
pub struct PowerPoint {
    pub timestamp: DateTime<Utc>,
    pub power_w: f64,
}

#[derive(Debug, Deserialize)]
pub struct RecalibrateRequest {
    pub secret: String,
    pub total_kwh: f64,
}

#[derive(Debug, Serialize)]
pub struct RecalibrateResponse {
    pub ok: bool,
    pub floor_kwh: Option<f64>,
    pub message: Option<String>,
}

/// Start of the current day in the configured timezone, as a UTC instant.
fn local_midnight(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local_day = now.with_timezone(&tz).date_naive();
    local_day
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(tz).earliest())
        .map_or(now, |local| local.with_timezone(&Utc))
}

pub async fn status_handler(State(state): State<ApiState>) -> Json<StatusResponse> {
    let status = state.collector.current(Utc::now()).await;
    Json(StatusResponse {
        station_name: status.station_name,
        current_power_w: status.power_w,
        total_kwh: status.lifetime_kwh,
        battery_soc: status.battery_soc,
    })
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn energy_today_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let midnight = local_midnight(Utc::now(), state.timezone);
    match state.collector.store().energy_since(midnight) {
        Ok(kwh) => (StatusCode::OK, Json(EnergyTodayResponse { kwh })).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to aggregate today's energy");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn power_today_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let midnight = local_midnight(Utc::now(), state.timezone);
    match state.collector.store().power_curve_since(midnight) {
        Ok(curve) => {
            let points: Vec<PowerPoint> = curve
                .into_iter()
                .map(|(timestamp, power_w)| PowerPoint {
                    timestamp,
                    power_w,
                })
                .collect();
            (StatusCode::OK, Json(points)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to read today's power curve");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn recalibrate_handler(
    State(state): State<ApiState>,
    Json(request): Json<RecalibrateRequest>,
) -> impl IntoResponse {
    if request.secret != *state.admin_secret {
        warn!("Recalibration rejected: invalid secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(RecalibrateResponse {
                ok: false,
                floor_kwh: None,
                message: Some("Invalid secret".to_owned()),
            }),
        );
    }

    // ValidationError: reject without touching any state.
    if !request.total_kwh.is_finite() || request.total_kwh < 0.0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(RecalibrateResponse {
                ok: false,
                floor_kwh: None,
                message: Some("total_kwh must be a non-negative number".to_owned()),
            }),
        );
    }

    match state
        .collector
        .recalibrate(request.total_kwh, Utc::now())
        .await
    {
        Ok(()) => {
            info!(floor_kwh = request.total_kwh, "Recalibration accepted");
            (
                StatusCode::OK,
                Json(RecalibrateResponse {
                    ok: true,
                    floor_kwh: Some(request.total_kwh),
                    message: None,
                }),
            )
        }
        Err(e) => {
            error!(error = %e, "Recalibration failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RecalibrateResponse {
                    ok: false,
                    floor_kwh: None,
                    message: Some("Internal error".to_owned()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_midnight_respects_the_timezone() {
        let tz: Tz = "Europe/Paris".parse().unwrap();
        // 01:30 UTC on June 1st is 03:30 in Paris; Paris midnight is 22:00 UTC the day before.
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 1, 30, 0).unwrap();
        let midnight = local_midnight(now, tz);
        assert_eq!(midnight, Utc.with_ymd_and_hms(2025, 5, 31, 22, 0, 0).unwrap());
    }

    #[test]
    fn local_midnight_in_utc_is_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 13, 30, 0).unwrap();
        assert_eq!(
            local_midnight(now, chrono_tz::Tz::UTC),
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
        );
    }
}
