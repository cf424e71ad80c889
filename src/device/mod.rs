//! Device protocol client contract
use async_trait::async_trait;

use crate::error::Result;
use crate::transform::RawRecord;

/// RouterOS REST adapter
pub mod rest;
pub use rest::{RestConnector, RestDeviceClient};

#[cfg(test)]
pub mod scripted;

/// A session with one device
///
/// A client is created per device per cycle and owned by the collector
/// polling that device; it is never shared across tasks.
#[async_trait]
pub trait DeviceClient: Send {
    /// Open the session and authenticate
    async fn connect(&mut self) -> Result<()>;

    /// Run one read-only command and return its rows
    async fn execute(&mut self, command: &str, args: &[(&str, &str)]) -> Result<Vec<RawRecord>>;

    /// Release the session
    async fn close(&mut self) -> Result<()>;
}

/// Creates device clients
pub trait DeviceConnector: Send + Sync + 'static {
    /// A fresh, unconnected client for `host`
    fn client(&self, host: &str) -> Box<dyn DeviceClient>;
}
