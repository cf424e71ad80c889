//! Polls a fleet of RouterOS devices and writes normalised points to InfluxDB

pub mod collector;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod point;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod transform;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::collector::{CollectorConfig, DeviceCollector, DeviceReport};
    pub use crate::config::AgentConfig;
    pub use crate::connection::health::HealthCheck;
    pub use crate::device::{DeviceClient, DeviceConnector};
    pub use crate::error::{AgentError, Result};
    pub use crate::point::{FieldValue, Point};
    pub use crate::registry::{DeviceRegistry, StaticRegistry};
    pub use crate::scheduler::{CycleReport, Scheduler};
    pub use crate::sink::Sink;
    pub use crate::transform::{ClassificationTables, FieldClassifier, PointBuilder};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
