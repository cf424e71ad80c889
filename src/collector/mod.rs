//! Per-device collection

/// Command catalogue and capability gating
pub mod commands;

/// Collector configuration
pub mod config;

/// The per-device state machine
pub mod device;

pub use commands::{Capabilities, WirelessPackage, measurement_kind};
pub use config::{CollectorConfig, CollectorConfigBuilder};
pub use device::{DeviceCollector, DeviceReport};
