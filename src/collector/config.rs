use std::time::Duration;

use crate::config::DeviceConfig;

/// Deadlines and command additions for a device collector
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Deadline for opening a device session
    pub connect_timeout: Duration,
    /// Deadline for each command
    pub command_timeout: Duration,
    /// Commands issued after the base set
    pub extra_commands: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            extra_commands: Vec::new(),
        }
    }
}

impl From<&DeviceConfig> for CollectorConfig {
    fn from(device: &DeviceConfig) -> Self {
        CollectorConfigBuilder::new()
            .connect_timeout(device.connect_timeout())
            .command_timeout(device.command_timeout())
            .extra_commands(device.extra_commands.clone())
            .build()
    }
}

/// Builder for collector configuration
#[derive(Default)]
pub struct CollectorConfigBuilder {
    config: CollectorConfig,
}

impl CollectorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect deadline
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the per-command deadline
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the extra commands
    pub fn extra_commands(mut self, commands: Vec<String>) -> Self {
        self.config.extra_commands = commands;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CollectorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_device_config() {
        let device = DeviceConfig {
            connect_timeout: 3,
            command_timeout: 7,
            extra_commands: vec!["/system/health/print".to_string()],
            ..Default::default()
        };
        let config = CollectorConfig::from(&device);

        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.command_timeout, Duration::from_secs(7));
        assert_eq!(config.extra_commands, vec!["/system/health/print"]);
    }
}
