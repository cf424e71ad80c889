//! One device's poll: connect, inspect packages, collect, close
use log::{debug, error, info, warn};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::commands::{
    Capabilities, INTERFACE_COMMAND, INTERFACE_MEASUREMENT, MONITOR_TRAFFIC_COMMAND,
    PACKAGE_COMMAND, SESSION_COMMAND, SESSION_MEASUREMENT, measurement_kind,
};
use super::config::CollectorConfig;
use crate::device::{DeviceClient, DeviceConnector};
use crate::error::{AgentError, Result};
use crate::transform::{PointBuilder, RawRecord, single_tag};

/// Outcome of one device's pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceReport {
    pub host: String,
    /// Whether a session was opened
    pub connected: bool,
    pub commands_ok: usize,
    pub commands_failed: usize,
    pub interfaces: usize,
    pub interfaces_failed: usize,
    /// Points accepted by the sink
    pub points: usize,
}

impl DeviceReport {
    fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Default::default()
        }
    }
}

/// Polls devices one at a time; shareable across device tasks
pub struct DeviceCollector {
    connector: Arc<dyn DeviceConnector>,
    builder: Arc<PointBuilder>,
    config: CollectorConfig,
}

impl DeviceCollector {
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        builder: Arc<PointBuilder>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            connector,
            builder,
            config,
        }
    }

    /// Run one full pass over `host`
    ///
    /// Never fails: a connect failure ends the pass early, every other
    /// failure is logged and skipped. The session is closed on every path.
    pub async fn collect(&self, host: &str) -> DeviceReport {
        let mut report = DeviceReport::new(host);
        let mut client = self.connector.client(host);

        let connected = bounded(
            format!("connect to {}", host),
            self.config.connect_timeout,
            client.connect(),
        )
        .await;

        match connected {
            Ok(()) => {
                report.connected = true;
                self.poll(client.as_mut(), host, &mut report).await;
            }
            Err(e) => error!("Skipping {}: {}", host, e),
        }

        if let Err(e) = client.close().await {
            debug!("Closing session to {} failed: {}", host, e);
        }

        info!(
            "Polled {}: {} points, {} commands ok, {} failed, {} interfaces",
            host, report.points, report.commands_ok, report.commands_failed, report.interfaces
        );
        report
    }

    async fn poll(&self, client: &mut dyn DeviceClient, host: &str, report: &mut DeviceReport) {
        let capabilities = match self.run(client, PACKAGE_COMMAND, &[]).await {
            Ok(packages) => Capabilities::from_packages(&packages),
            Err(e) => {
                warn!("Package listing on {} failed, optional commands skipped: {}", host, e);
                Capabilities::default()
            }
        };
        debug!("{} capabilities: {:?}", host, capabilities);

        let no_tags = RawRecord::new();
        for command in capabilities.command_plan(&self.config.extra_commands) {
            match self.run(client, &command, &[]).await {
                Ok(rows) => {
                    report.commands_ok += 1;
                    let kind = measurement_kind(&command);
                    debug!("{} returned {} rows from {}", command, rows.len(), host);
                    for row in &rows {
                        if self.builder.emit(&kind, row, &no_tags, Some(host)) {
                            report.points += 1;
                        }
                    }
                }
                Err(e) => {
                    report.commands_failed += 1;
                    warn!("{} on {}: {}", command, host, e);
                }
            }
        }

        self.collect_interfaces(client, host, report).await;
        self.collect_sessions(client, host, report).await;
    }

    async fn collect_interfaces(
        &self,
        client: &mut dyn DeviceClient,
        host: &str,
        report: &mut DeviceReport,
    ) {
        let interfaces = match self.run(client, INTERFACE_COMMAND, &[]).await {
            Ok(rows) => {
                report.commands_ok += 1;
                rows
            }
            Err(e) => {
                report.commands_failed += 1;
                warn!("Listing interfaces on {} failed: {}", host, e);
                return;
            }
        };

        for interface in interfaces {
            let name = match interface.get("name").and_then(Value::as_str).map(str::trim) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    debug!("Skipping unnamed interface on {}", host);
                    continue;
                }
            };

            let args = [("interface", name.as_str()), ("once", "")];
            let sample = match self.run(client, MONITOR_TRAFFIC_COMMAND, &args).await {
                Ok(rows) => rows.into_iter().next().unwrap_or_default(),
                Err(e) => {
                    report.interfaces_failed += 1;
                    warn!("Sampling {} on {} failed: {}", name, host, e);
                    continue;
                }
            };

            let mut merged = interface;
            merged.extend(sample);
            merged.remove("name");

            report.interfaces += 1;
            let tags = single_tag("interface_name", name.as_str());
            if self.builder.emit(INTERFACE_MEASUREMENT, &merged, &tags, Some(host)) {
                report.points += 1;
            }
        }
    }

    async fn collect_sessions(
        &self,
        client: &mut dyn DeviceClient,
        host: &str,
        report: &mut DeviceReport,
    ) {
        let sessions = match self.run(client, SESSION_COMMAND, &[]).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!("No hotspot sessions from {}: {}", host, e);
                return;
            }
        };

        for session in &sessions {
            let tags = match session.get("user").and_then(Value::as_str) {
                Some(user) if !user.trim().is_empty() => single_tag("user", user.trim()),
                _ => RawRecord::new(),
            };
            if self.builder.emit(SESSION_MEASUREMENT, session, &tags, Some(host)) {
                report.points += 1;
            }
        }
    }

    async fn run(
        &self,
        client: &mut dyn DeviceClient,
        command: &str,
        args: &[(&str, &str)],
    ) -> Result<Vec<RawRecord>> {
        bounded(command, self.config.command_timeout, client.execute(command, args)).await
    }
}

/// Race `fut` against a deadline, surfacing expiry as a timeout error
async fn bounded<T, F>(operation: impl Into<String>, deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::timeout(operation, deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnknownFieldPolicy;
    use crate::device::scripted::{Reply, Script, ScriptedConnector};
    use crate::point::FieldValue;
    use crate::sink::MemorySink;
    use crate::transform::{ClassificationTables, FieldClassifier, HOST_TAG};
    use serde_json::json;

    const WIRELESS: &str = "/interface/wireless/registration-table/print";

    fn collector(connector: ScriptedConnector, sink: Arc<MemorySink>) -> DeviceCollector {
        let classifier = FieldClassifier::new(
            Arc::new(ClassificationTables::builtin()),
            UnknownFieldPolicy::Infer,
        );
        let builder = Arc::new(PointBuilder::new(classifier, sink));
        let config = CollectorConfig {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
            extra_commands: Vec::new(),
        };
        DeviceCollector::new(Arc::new(connector), builder, config)
    }

    fn router() -> Script {
        Script::default()
            .rows(
                PACKAGE_COMMAND,
                vec![
                    json!({"name": "routeros", "disabled": "false"}),
                    json!({"name": "wireless", "disabled": "false"}),
                ],
            )
            .rows(
                "/system/resource/print",
                vec![json!({"cpu-load": "37%", "uptime": "1d2h", "version": "7.14"})],
            )
            .rows(
                WIRELESS,
                vec![json!({"mac-address": "AA:BB", "signal-strength": "-55dBm@6Mbps"})],
            )
            .rows(
                INTERFACE_COMMAND,
                vec![
                    json!({"name": "ether1", "type": "ether", "rx-byte": "100"}),
                    json!({"type": "bridge"}),
                    json!({"name": "wlan1", "type": "wlan"}),
                ],
            )
            .rows(
                "/interface/monitor-traffic interface=ether1",
                vec![json!({"name": "ether1", "rx-bits-per-second": "1200", "rx-byte": "250"})],
            )
            .rows(
                "/interface/monitor-traffic interface=wlan1",
                vec![json!({"rx-bits-per-second": "0"})],
            )
            .rows(
                SESSION_COMMAND,
                vec![json!({"user": "guest", "address": "10.5.0.9", "uptime": "5m"})],
            )
    }

    #[tokio::test]
    async fn test_full_pass() {
        let sink = Arc::new(MemorySink::new("test"));
        let connector = ScriptedConnector::new().device("10.0.0.1", router());
        let log = Arc::clone(&connector.log);
        let report = collector(connector, sink.clone()).collect("10.0.0.1").await;

        assert!(report.connected);
        assert_eq!(report.commands_failed, 0);
        assert_eq!(report.interfaces, 2);
        assert_eq!(log.close_count("10.0.0.1"), 1);

        let resources = sink.points_for("system_resource");
        let resource = &resources[0];
        assert_eq!(resource.get_tag(HOST_TAG), Some("10.0.0.1"));
        assert_eq!(resource.get_field("cpu_load"), Some(&FieldValue::Integer(37)));
        assert_eq!(resource.get_field("uptime_seconds"), Some(&FieldValue::Integer(93_600)));
        assert!(resource.get_field("uptime").is_none());

        let wireless = sink.points_for("interface_wireless_registration_table");
        let wireless = &wireless[0];
        assert_eq!(wireless.get_field("signal_strength_dbm"), Some(&FieldValue::Integer(-55)));

        let interfaces = sink.points_for(INTERFACE_MEASUREMENT);
        assert_eq!(interfaces.len(), 2);
        let ether1 = interfaces
            .iter()
            .find(|p| p.get_tag("interface_name") == Some("ether1"))
            .unwrap();
        assert!(ether1.get_field("name").is_none());
        assert_eq!(ether1.get_field("rx_bits_per_second"), Some(&FieldValue::Integer(1200)));
        assert_eq!(ether1.get_field("rx_byte"), Some(&FieldValue::Integer(250)));

        let sessions = sink.points_for(SESSION_MEASUREMENT);
        let session = &sessions[0];
        assert_eq!(session.get_tag("user"), Some("guest"));
        assert_eq!(session.get_field("uptime_seconds"), Some(&FieldValue::Integer(300)));
    }

    #[tokio::test]
    async fn test_connect_failure_skips_device_and_closes() {
        let sink = Arc::new(MemorySink::new("test"));
        let connector = ScriptedConnector::new().device(
            "10.0.0.2",
            Script {
                connect_fails: true,
                ..router()
            },
        );
        let log = Arc::clone(&connector.log);
        let report = collector(connector, sink.clone()).collect("10.0.0.2").await;

        assert!(!report.connected);
        assert!(log.commands_for("10.0.0.2").is_empty());
        assert_eq!(log.close_count("10.0.0.2"), 1);
        assert!(sink.points().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let sink = Arc::new(MemorySink::new("test"));
        let connector = ScriptedConnector::new().device(
            "10.0.0.2",
            Script {
                connect_hangs: true,
                ..router()
            },
        );
        let log = Arc::clone(&connector.log);
        let report = collector(connector, sink).collect("10.0.0.2").await;

        assert!(!report.connected);
        assert_eq!(log.close_count("10.0.0.2"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout_is_isolated() {
        let sink = Arc::new(MemorySink::new("test"));
        let script = router().reply(WIRELESS, Reply::Hang);
        let connector = ScriptedConnector::new().device("10.0.0.1", script);
        let report = collector(connector, sink.clone()).collect("10.0.0.1").await;

        assert_eq!(report.commands_failed, 1);
        assert!(sink.points_for("interface_wireless_registration_table").is_empty());
        assert_eq!(sink.points_for("system_resource").len(), 1);
        assert_eq!(sink.points_for(INTERFACE_MEASUREMENT).len(), 2);
        assert_eq!(sink.points_for(SESSION_MEASUREMENT).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_command_is_timeout_error() {
        let sink = Arc::new(MemorySink::new("test"));
        let connector = ScriptedConnector::new().device("10.0.0.1", router().reply(WIRELESS, Reply::Hang));
        let mut client = connector.client("10.0.0.1");
        let collector = collector(connector, sink);

        client.connect().await.unwrap();
        let err = collector.run(client.as_mut(), WIRELESS, &[]).await.unwrap_err();

        assert!(err.is_timeout());
        match err {
            AgentError::Timeout { operation, after } => {
                assert_eq!(operation, WIRELESS);
                assert_eq!(after, Duration::from_secs(10));
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        let err = bounded("connect", Duration::from_secs(1), std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_package_listing_failure_skips_optional_commands() {
        let sink = Arc::new(MemorySink::new("test"));
        let script = router().reply(PACKAGE_COMMAND, Reply::Fail("no such command".into()));
        let connector = ScriptedConnector::new().device("10.0.0.1", script);
        let log = Arc::clone(&connector.log);
        collector(connector, sink.clone()).collect("10.0.0.1").await;

        let commands = log.commands_for("10.0.0.1");
        assert!(!commands.iter().any(|c| c == WIRELESS));
        assert!(commands.iter().any(|c| c == "/system/resource/print"));
        assert_eq!(sink.points_for("system_resource").len(), 1);
    }

    #[tokio::test]
    async fn test_interface_failure_is_isolated() {
        let sink = Arc::new(MemorySink::new("test"));
        let script = router().reply(
            "/interface/monitor-traffic interface=ether1",
            Reply::Fail("interface busy".into()),
        );
        let connector = ScriptedConnector::new().device("10.0.0.1", script);
        let report = collector(connector, sink.clone()).collect("10.0.0.1").await;

        assert_eq!(report.interfaces_failed, 1);
        let interfaces = sink.points_for(INTERFACE_MEASUREMENT);
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].get_tag("interface_name"), Some("wlan1"));
    }

    #[tokio::test]
    async fn test_missing_hotspot_is_not_a_failure() {
        let sink = Arc::new(MemorySink::new("test"));
        let script = router().reply(SESSION_COMMAND, Reply::Fail("no such command".into()));
        let connector = ScriptedConnector::new().device("10.0.0.1", script);
        let report = collector(connector, sink.clone()).collect("10.0.0.1").await;

        assert_eq!(report.commands_failed, 0);
        assert!(sink.points_for(SESSION_MEASUREMENT).is_empty());
    }
}
