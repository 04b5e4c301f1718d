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

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use sunmeter_core::error::{SourceError, SourceResult};
use sunmeter_core::source::{Credential, TelemetrySource};
use sunmeter_types::{RawField, RawSnapshot, StationSummary};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Account credentials for the Solarman OpenAPI. The password is the
/// SHA-256 of the portal password, as the API expects.
#[derive(Debug, Clone)]
pub struct SolarmanCredentials {
    pub app_id: String,
    pub app_secret: String,
    pub email: String,
    pub password_sha256: String,
}

/// Solarman OpenAPI client. One instance per monitored plant: it knows the
/// station to summarize and the inverter serial to read registers from.
#[derive(Debug, Clone)]
pub struct SolarmanClient {
    base_url: String,
    credentials: SolarmanCredentials,
    station_id: Option<u64>,
    device_sn: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationListResponse {
    #[serde(default)]
    station_list: Vec<StationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationEntry {
    id: Option<u64>,
    name: Option<String>,
    generation_power: Option<f64>,
    battery_soc: Option<f64>,
    generation_total: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentDataResponse {
    #[serde(default)]
    data_list: Vec<DataListEntry>,
}

#[derive(Debug, Deserialize)]
struct DataListEntry {
    key: String,
    value: serde_json::Value,
}

impl SolarmanClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: SolarmanCredentials,
        station_id: Option<u64>,
        device_sn: impl Into<String>,
    ) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Fetch(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            credentials,
            station_id,
            device_sn: device_sn.into(),
            client,
        })
    }

    fn map_send_error(e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Fetch(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> SourceResult<reqwest::Response> {
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(SourceError::Auth("provider rejected the credential".to_owned()))
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(SourceError::Fetch(format!("status {status}: {body}")))
            }
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl TelemetrySource for SolarmanClient {
    /// Exchange the account credentials for a bearer token. Every failure
    /// on this leg is an auth failure, whatever the transport said.
    async fn credential(&self) -> SourceResult<Credential> {
        let url = format!(
            "{}/account/v1.0/token?appId={}",
            self.base_url, self.credentials.app_id
        );
        debug!("Requesting Solarman access token");

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "appSecret": self.credentials.app_secret,
                "email": self.credentials.email,
                "password": self.credentials.password_sha256,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout
                } else {
                    SourceError::Auth(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(SourceError::Auth(format!(
                "token endpoint returned status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Auth(format!("malformed token response: {e}")))?;

        match token.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(Credential::new(access_token)),
            _ => Err(SourceError::Auth(
                token.msg.unwrap_or_else(|| "no access_token in response".to_owned()),
            )),
        }
    }

    async fn station_summary(&self, credential: &Credential) -> SourceResult<StationSummary> {
        let url = format!("{}/station/v1.0/list", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.token())
            .json(&json!({ "page": 1, "size": 20 }))
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let response = Self::check_status(response).await?;

        let list: StationListResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Fetch(format!("malformed station list: {e}")))?;

        let station = match self.station_id {
            Some(id) => list.station_list.into_iter().find(|s| s.id == Some(id)),
            None => list.station_list.into_iter().next(),
        }
        .ok_or_else(|| SourceError::Fetch("no station in provider response".to_owned()))?;

        if station.name.is_none() {
            warn!("Station entry carries no name");
        }

        Ok(StationSummary {
            name: station.name.unwrap_or_default(),
            generation_power_w: station.generation_power,
            battery_soc: station.battery_soc,
            total_energy_kwh: station.generation_total,
        })
    }

    async fn device_snapshot(&self, credential: &Credential) -> SourceResult<RawSnapshot> {
        let url = format!("{}/device/v1.0/currentData", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.token())
            .json(&json!({ "deviceSn": self.device_sn }))
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let response = Self::check_status(response).await?;

        let data: CurrentDataResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Fetch(format!("malformed current data: {e}")))?;

        debug!(fields = data.data_list.len(), "Device snapshot received");

        Ok(RawSnapshot::new(
            data.data_list
                .into_iter()
                .map(|entry| RawField {
                    key: entry.key,
                    value: entry.value,
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use sunmeter_core::fields;

    fn credentials() -> SolarmanCredentials {
        SolarmanCredentials {
            app_id: "3000001".to_owned(),
            app_secret: "secret".to_owned(),
            email: "owner@example.com".to_owned(),
            password_sha256: "deadbeef".to_owned(),
        }
    }

    fn client(server: &Server, station_id: Option<u64>) -> SolarmanClient {
        SolarmanClient::new(server.url(), credentials(), station_id, "SN123456").unwrap()
    }

    #[tokio::test]
    async fn token_exchange_yields_a_credential() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/account/v1.0/token?appId=3000001")
            .match_body(Matcher::PartialJson(json!({"appSecret": "secret"})))
            .with_status(200)
            .with_body(json!({"access_token": "tok-1", "success": true}).to_string())
            .create_async()
            .await;

        let credential = client(&server, None).credential().await.unwrap();
        assert_eq!(credential.token(), "tok-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_token_is_an_auth_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/account/v1.0/token?appId=3000001")
            .with_status(200)
            .with_body(json!({"success": false, "msg": "auth invalid"}).to_string())
            .create_async()
            .await;

        let err = client(&server, None).credential().await.unwrap_err();
        assert!(matches!(err, SourceError::Auth(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn station_summary_picks_the_configured_station() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/station/v1.0/list")
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_body(
                json!({"stationList": [
                    {"id": 1, "name": "Other", "generationPower": 10.0},
                    {"id": 7, "name": "Maison Sud", "generationPower": 1234.5,
                     "batterySoc": 55.0, "generationTotal": 9001.5}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let summary = client(&server, Some(7))
            .station_summary(&Credential::new("tok-1"))
            .await
            .unwrap();
        assert_eq!(summary.name, "Maison Sud");
        assert_eq!(summary.generation_power_w, Some(1234.5));
        assert_eq!(summary.battery_soc, Some(55.0));
        assert_eq!(summary.total_energy_kwh, Some(9001.5));
    }

    #[tokio::test]
    async fn empty_station_list_is_a_fetch_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/station/v1.0/list")
            .with_status(200)
            .with_body(json!({"stationList": []}).to_string())
            .create_async()
            .await;

        let err = client(&server, None)
            .station_summary(&Credential::new("tok-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Fetch(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn rejected_credential_maps_to_auth_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/device/v1.0/currentData")
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server, None)
            .device_snapshot(&Credential::new("expired"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Auth(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn device_snapshot_keeps_raw_fields_in_order() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/device/v1.0/currentData")
            .match_body(Matcher::PartialJson(json!({"deviceSn": "SN123456"})))
            .with_status(200)
            .with_body(
                json!({"dataList": [
                    {"key": "P_INV1", "value": "1234,5", "unit": "W"},
                    {"key": "Et_ge0", "value": "9001.5", "unit": "kWh"},
                    {"key": "B_left_cap1", "value": 55}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let snapshot = client(&server, None)
            .device_snapshot(&Credential::new("tok-1"))
            .await
            .unwrap();

        assert_eq!(snapshot.fields.len(), 3);
        assert_eq!(snapshot.fields[0].key, "P_INV1");
        // Comma decimals survive the wire and resolve downstream.
        assert_eq!(fields::resolve(&snapshot, "P_INV1"), Some(1234.5));
        assert_eq!(fields::resolve(&snapshot, "B_left_cap1"), Some(55.0));
    }
}
