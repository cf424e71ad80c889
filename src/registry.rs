//! Where the list of devices to poll comes from
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashSet;

use crate::config::DatabaseConfig;
use crate::connection::health::HealthCheck;
use crate::connection::postgres::PostgresProvider;
use crate::error::{AgentError, Result};

/// Source of device addresses, queried once per cycle
#[async_trait]
pub trait DeviceRegistry: Send + Sync + 'static {
    /// Current device addresses
    async fn list_devices(&self) -> Result<Vec<String>>;

    /// Release resources at shutdown
    async fn close(&self) {}

    /// Get a name for this registry
    fn name(&self) -> &str;
}

/// Trim, drop empties and de-duplicate, keeping first occurrences in order
pub fn normalize_hosts<I, S>(hosts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    hosts
        .into_iter()
        .filter_map(|h| {
            let h = h.as_ref().trim();
            (!h.is_empty() && seen.insert(h.to_string())).then(|| h.to_string())
        })
        .collect()
}

/// A fixed list of devices
pub struct StaticRegistry {
    hosts: Vec<String>,
}

impl StaticRegistry {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: normalize_hosts(hosts),
        }
    }
}

#[async_trait]
impl DeviceRegistry for StaticRegistry {
    async fn list_devices(&self) -> Result<Vec<String>> {
        Ok(self.hosts.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Devices read from a PostgreSQL table, with a static fallback
pub struct PostgresRegistry {
    provider: PostgresProvider,
    query: String,
    fallback: Vec<String>,
}

impl PostgresRegistry {
    pub fn new<I, S>(config: &DatabaseConfig, fallback: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let provider = PostgresProvider::new(config, "device-registry")
            .map_err(|e| AgentError::Registry(format!("{:#}", e)))?;

        Ok(Self {
            provider,
            query: config.query.clone(),
            fallback: normalize_hosts(fallback),
        })
    }

    async fn query_hosts(&self) -> anyhow::Result<Vec<String>> {
        let rows = self.provider.query(&self.query, &[]).await?;
        let mut hosts = Vec::with_capacity(rows.len());
        for row in rows {
            let host: Option<String> = row.try_get(0)?;
            if let Some(host) = host {
                hosts.push(host);
            }
        }
        Ok(normalize_hosts(hosts))
    }
}

#[async_trait]
impl DeviceRegistry for PostgresRegistry {
    async fn list_devices(&self) -> Result<Vec<String>> {
        match self.query_hosts().await {
            Ok(hosts) => {
                debug!("Registry returned {} devices", hosts.len());
                Ok(hosts)
            }
            Err(e) if !self.fallback.is_empty() => {
                warn!(
                    "Registry query failed ({:#}); using {} static hosts",
                    e,
                    self.fallback.len()
                );
                Ok(self.fallback.clone())
            }
            Err(e) => Err(AgentError::Registry(format!("{:#}", e))),
        }
    }

    async fn close(&self) {
        self.provider.close();
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[async_trait]
impl HealthCheck for PostgresRegistry {
    async fn check_health(&self) -> anyhow::Result<bool> {
        self.provider.check_health().await
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_REGISTRY_QUERY, SslMode};

    fn unreachable() -> DatabaseConfig {
        DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            name: "inventory".to_string(),
            username: "agent".to_string(),
            password: String::new(),
            ssl_mode: SslMode::Disable,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            query: DEFAULT_REGISTRY_QUERY.to_string(),
        }
    }

    #[test]
    fn test_normalize_hosts() {
        assert_eq!(
            normalize_hosts([" 10.0.0.1", "", "10.0.0.2 ", "10.0.0.1", "  "]),
            vec!["10.0.0.1", "10.0.0.2"]
        );
    }

    #[tokio::test]
    async fn test_static_registry() {
        let registry = StaticRegistry::new(["10.0.0.1", "10.0.0.1", "10.0.0.3"]);
        assert_eq!(
            registry.list_devices().await.unwrap(),
            vec!["10.0.0.1", "10.0.0.3"]
        );
    }

    #[tokio::test]
    async fn test_unreachable_database_falls_back() {
        let registry = PostgresRegistry::new(&unreachable(), ["10.9.9.9"]).unwrap();
        assert_eq!(registry.list_devices().await.unwrap(), vec!["10.9.9.9"]);
    }

    #[tokio::test]
    async fn test_unreachable_database_without_fallback_fails() {
        let registry = PostgresRegistry::new(&unreachable(), Vec::<String>::new()).unwrap();
        assert!(matches!(
            registry.list_devices().await,
            Err(AgentError::Registry(_))
        ));
    }
}
