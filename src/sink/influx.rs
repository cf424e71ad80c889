//! InfluxDB v2 write API sink
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::InfluxConfig;
use crate::connection::health::HealthCheck;
use crate::error::{AgentError, Result};
use crate::point::Point;
use crate::sink::Sink;
use crate::sink::line_protocol;

/// Buffers points as line protocol and writes them to an InfluxDB v2 bucket
pub struct InfluxSink {
    client: reqwest::Client,
    base_url: String,
    token: String,
    org: String,
    bucket: String,
    batch_size: usize,
    buffer: Mutex<Vec<String>>,
    name: String,
}

impl InfluxSink {
    /// Create a sink for the configured organisation and bucket
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        info!(
            "InfluxDB sink configured for {} (org {}, bucket {})",
            config.url, config.org, config.bucket
        );

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            batch_size: config.batch_size.max(1),
            buffer: Mutex::new(Vec::new()),
            name: format!("influx:{}", config.bucket),
        })
    }

    /// Number of lines waiting for the next flush
    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    async fn send(&self, body: String) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/api/v2/write", self.base_url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| AgentError::SinkFlush(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(AgentError::SinkFlush(format!("HTTP {}: {}", status, text.trim())))
    }
}

#[async_trait]
impl Sink for InfluxSink {
    fn write_point(&self, point: Point) -> Result<()> {
        let line = line_protocol::encode(&point).ok_or_else(|| {
            AgentError::SinkWrite(format!("{} point has no writable fields", point.measurement))
        })?;

        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| AgentError::SinkWrite("Lock poisoned".to_string()))?;
        buffer.push(line);
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        let lines = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|_| AgentError::SinkFlush("Lock poisoned".to_string()))?;
            std::mem::take(&mut *buffer)
        };

        if lines.is_empty() {
            return Ok(0);
        }

        let mut sent = 0;
        let mut first_error = None;

        for chunk in lines.chunks(self.batch_size) {
            match self.send(chunk.join("\n")).await {
                Ok(()) => sent += chunk.len(),
                Err(e) => {
                    warn!("Dropping {} lines after failed write: {}", chunk.len(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!("Flushed {} of {} lines to {}", sent, lines.len(), self.name);

        match first_error {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl HealthCheck for InfluxSink {
    async fn check_health(&self) -> anyhow::Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
