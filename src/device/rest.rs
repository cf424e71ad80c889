//! RouterOS REST interface client
use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::config::DeviceConfig;
use crate::device::{DeviceClient, DeviceConnector};
use crate::error::{AgentError, Result};
use crate::transform::RawRecord;

/// Builds REST clients sharing one device configuration
pub struct RestConnector {
    config: DeviceConfig,
}

impl RestConnector {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }
}

impl DeviceConnector for RestConnector {
    fn client(&self, host: &str) -> Box<dyn DeviceClient> {
        Box::new(RestDeviceClient::new(host, &self.config))
    }
}

/// Session with one RouterOS device over its REST interface
///
/// The HTTP client is built on `connect` and dropped on `close`; commands
/// issued outside that window fail.
pub struct RestDeviceClient {
    host: String,
    base_url: String,
    username: String,
    password: String,
    accept_invalid_certs: bool,
    connect_timeout: std::time::Duration,
    http: Option<reqwest::Client>,
}

impl RestDeviceClient {
    pub fn new(host: &str, config: &DeviceConfig) -> Self {
        Self {
            host: host.to_string(),
            base_url: base_url(config.scheme.as_str(), host, config.port),
            username: config.username.clone(),
            password: config.password.clone(),
            accept_invalid_certs: config.accept_invalid_certs,
            connect_timeout: config.connect_timeout(),
            http: None,
        }
    }

    /// Root of the REST API, e.g. `https://10.0.0.1:443/rest`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn http(&self, command: &str) -> Result<&reqwest::Client> {
        self.http
            .as_ref()
            .ok_or_else(|| AgentError::command(command, "session is not connected"))
    }
}

#[async_trait]
impl DeviceClient for RestDeviceClient {
    async fn connect(&mut self) -> Result<()> {
        let http = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| AgentError::connect(&self.host, e))?;

        let response = http
            .get(format!("{}/system/identity", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| AgentError::connect(&self.host, e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AgentError::connect(&self.host, "authentication failed"));
            }
            status if !status.is_success() => {
                return Err(AgentError::connect(&self.host, format!("HTTP {}", status)));
            }
            _ => {}
        }

        debug!("Connected to {}", self.host);
        self.http = Some(http);
        Ok(())
    }

    async fn execute(&mut self, command: &str, args: &[(&str, &str)]) -> Result<Vec<RawRecord>> {
        let http = self.http(command)?;

        let body: Map<String, Value> = args
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();

        let response = http
            .post(format!("{}{}", self.base_url, command))
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::command(command, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::command(
                command,
                format!("HTTP {}: {}", status, text.trim()),
            ));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| AgentError::command(command, e))?;
        Ok(rows(reply))
    }

    async fn close(&mut self) -> Result<()> {
        if self.http.take().is_some() {
            debug!("Closed session to {}", self.host);
        }
        Ok(())
    }
}

fn base_url(scheme: &str, host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("{}://[{}]:{}/rest", scheme, host, port)
    } else {
        format!("{}://{}:{}/rest", scheme, host, port)
    }
}

/// Normalise a command reply into rows
fn rows(reply: Value) -> Vec<RawRecord> {
    match reply {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Value::Object(map) => vec![map],
        _ => Vec::new(),
    }
}
