// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Homevolt Monitor.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use async_trait::async_trait;
use homevolt_core::{DeviceApi, FetchFailure, FetchResult};
use homevolt_types::{
    EmsResponse, Endpoint, ErrorReportEntry, NodeId, NodeInfo, NodeMetrics, StatusResponse,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, trace};

use crate::errors::{ClientError, ClientResult};

/// The device's web UI has a single account
const AUTH_USER: &str = "admin";

/// Connection parameters for one device
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub use_ssl: bool,
    pub connect_timeout: Duration,
    /// Total time allowed for one request
    pub read_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 80,
            password: None,
            use_ssl: false,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(20),
        }
    }
}

impl ClientSettings {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("use_ssl", &self.use_ssl)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// Homevolt local HTTP API client
///
/// One GET per call, no retries. Failures come back as [`FetchFailure`] so the coordinator
/// can classify them.
#[derive(Clone)]
pub struct HomevoltClient {
    base_url: String,
    password: Option<String>,
    client: Client,
}

impl fmt::Debug for HomevoltClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomevoltClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

impl HomevoltClient {
    pub fn new(settings: &ClientSettings) -> ClientResult<Self> {
        if settings.host.trim().is_empty() {
            return Err(ClientError::Config("Device host is empty".to_owned()));
        }
        let client = Self::with_base_url(settings.base_url(), settings)?;
        info!("🔋 Homevolt client for {}", client.base_url);
        Ok(client)
    }

    /// Client against an explicit base URL (test servers, reverse proxies)
    pub fn with_base_url(
        base_url: impl Into<String>,
        settings: &ClientSettings,
    ) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            password: settings.password.clone().filter(|p| !p.is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Setup-time connectivity check: one primary fetch
    pub async fn validate_connection(&self) -> FetchResult<EmsResponse> {
        let ems = self.fetch::<EmsResponse>(Endpoint::Ems, &[]).await?;
        info!(
            ecu_id = ?ems.ecu_id(),
            modules = ems.aggregated.bms_info.len(),
            sensors = ems.sensors.len(),
            "✅ Connected to Homevolt"
        );
        Ok(ems)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        query: &[(&str, String)],
    ) -> FetchResult<T> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        debug!("🔍 [HOMEVOLT] GET {url} {query:?}");

        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(password) = &self.password {
            request = request.basic_auth(AUTH_USER, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_failure(endpoint, &e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                error!("❌ [HOMEVOLT] Authentication failed for {endpoint}");
            } else {
                debug!("❌ [HOMEVOLT] {endpoint} returned {status}");
            }
            return Err(FetchFailure::HttpStatus {
                endpoint,
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_failure(endpoint, &e))?;
        trace!("   Body: {body}");

        serde_json::from_str(&body).map_err(|e| FetchFailure::Decode {
            endpoint,
            message: e.to_string(),
        })
    }
}

fn transport_failure(endpoint: Endpoint, error: &reqwest::Error) -> FetchFailure {
    if error.is_timeout() {
        FetchFailure::Timeout { endpoint }
    } else if error.is_decode() {
        FetchFailure::Decode {
            endpoint,
            message: error.to_string(),
        }
    } else {
        FetchFailure::Network {
            endpoint,
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl DeviceApi for HomevoltClient {
    async fn ems(&self) -> FetchResult<EmsResponse> {
        self.fetch(Endpoint::Ems, &[]).await
    }

    async fn error_report(&self) -> FetchResult<Vec<ErrorReportEntry>> {
        self.fetch(Endpoint::ErrorReport, &[]).await
    }

    async fn status(&self) -> FetchResult<StatusResponse> {
        self.fetch(Endpoint::Status, &[]).await
    }

    async fn nodes(&self) -> FetchResult<Vec<NodeInfo>> {
        self.fetch(Endpoint::Nodes, &[]).await
    }

    async fn node_metrics(&self, node: NodeId) -> FetchResult<NodeMetrics> {
        self.fetch(Endpoint::NodeMetrics, &[("node_id", node.to_string())])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homevolt_types::FailureKind;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn settings() -> ClientSettings {
        ClientSettings {
            host: "127.0.0.1".to_owned(),
            read_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ems_success_with_basic_auth() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ems.json")
            // admin:secret
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "$type": "ems_data",
                    "ts": 1_700_000_000,
                    "ems": [{"ecu_id": 7, "unknown_field": true}],
                    "aggregated": {"bms_info": [{"serial_number": "SN-1"}], "bms_data": [{"soc": 8100}]},
                    "sensors": [{"type": "grid", "node_id": 2, "euid": "a1b2c3d4e5f60708"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let settings = ClientSettings {
            password: Some("secret".to_owned()),
            ..settings()
        };
        let client = HomevoltClient::with_base_url(server.url(), &settings).unwrap();
        let ems = client.ems().await.unwrap();

        assert_eq!(ems.ecu_id(), Some(7));
        assert_eq!(ems.aggregated.bms_data[0].soc, 8100);
        assert_eq!(ems.sensors[0].node_id, 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_http_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/status.json")
            .with_status(401)
            .create_async()
            .await;

        let client = HomevoltClient::with_base_url(server.url(), &settings()).unwrap();
        let failure = client.status().await.unwrap_err();

        assert_eq!(failure.kind(), FailureKind::HttpStatus);
        assert!(failure.is_auth());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_http_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/error_report.json")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = HomevoltClient::with_base_url(server.url(), &settings()).unwrap();
        let failure = client.error_report().await.unwrap_err();

        assert_eq!(
            failure,
            FetchFailure::HttpStatus {
                endpoint: Endpoint::ErrorReport,
                status: 500,
                message: "boom".to_owned(),
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/nodes.json")
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let client = HomevoltClient::with_base_url(server.url(), &settings()).unwrap();
        let failure = client.nodes().await.unwrap_err();

        assert_eq!(failure.kind(), FailureKind::Decode);
        assert_eq!(failure.endpoint(), Endpoint::Nodes);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_node_metrics_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/node_metrics.json")
            .match_query(Matcher::UrlEncoded("node_id".into(), "3".into()))
            .with_status(200)
            .with_body(
                json!({"node_id": 3, "battery_voltage": 2.73, "temperature": 21.5, "usb_power": false})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = HomevoltClient::with_base_url(server.url(), &settings()).unwrap();
        let metrics = client.node_metrics(NodeId(3)).await.unwrap();

        assert_eq!(metrics.node_id, 3);
        assert!((metrics.battery_level() - 77.5).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refused_connection_is_network() {
        // Bind then drop to get a port with nothing listening
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let settings = ClientSettings {
            port,
            ..settings()
        };

        let client = HomevoltClient::new(&settings).unwrap();
        let failure = client.validate_connection().await.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::Network);
    }

    #[test]
    fn test_reqwest_errors_become_http_errors() {
        let err = Client::new().get("not a url").build().unwrap_err();
        let converted: ClientError = err.into();
        assert!(matches!(converted, ClientError::Http(_)));
        assert!(converted.to_string().starts_with("HTTP client error"));
    }

    #[test]
    fn test_empty_host_rejected_and_password_hidden() {
        assert!(matches!(
            HomevoltClient::new(&ClientSettings::default()),
            Err(ClientError::Config(_))
        ));

        let settings = ClientSettings {
            password: Some("hunter2".to_owned()),
            use_ssl: true,
            port: 443,
            ..settings()
        };
        assert_eq!(settings.base_url(), "https://127.0.0.1:443");
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
