use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use native_tls::{Certificate, Identity, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::{DatabaseConfig, SslMode};
use crate::connection::health::HealthCheck;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgreSQL connection provider
///
/// Building the provider does not connect; connections are opened lazily
/// by the pool, so an unreachable database surfaces on the first query.
pub struct PostgresProvider {
    name: String,
    pool: deadpool_postgres::Pool,
}

impl PostgresProvider {
    /// Create a new PostgreSQL connection provider
    pub fn new(config: &DatabaseConfig, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        debug!(
            "Creating PostgreSQL provider {} for {}:{}/{}",
            name, config.host, config.port, config.name
        );

        let pool = Self::create_pool(config)?;
        Ok(Self { name, pool })
    }

    /// Create a connection pool
    fn create_pool(config: &DatabaseConfig) -> Result<deadpool_postgres::Pool> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.name)
            .user(&config.username)
            .password(&config.password)
            .connect_timeout(CONNECT_TIMEOUT);

        let builder = match config.ssl_mode {
            SslMode::Disable => {
                debug!("Creating PostgreSQL pool with SSL disabled");
                let manager = deadpool_postgres::Manager::new(pg_config, tokio_postgres::NoTls);
                deadpool_postgres::Pool::builder(manager)
            }
            _ => {
                debug!(
                    "Creating PostgreSQL pool with SSL enabled (mode: {:?})",
                    config.ssl_mode
                );
                let connector = build_tls_connector(config)?;
                let tls = MakeTlsConnector::new(connector);
                let manager = deadpool_postgres::Manager::new(pg_config, tls);
                deadpool_postgres::Pool::builder(manager)
            }
        };

        builder
            .max_size(2)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .wait_timeout(Some(CONNECT_TIMEOUT))
            .create_timeout(Some(CONNECT_TIMEOUT))
            .build()
            .context("Failed to create connection pool")
    }

    /// Get a client from the pool
    pub async fn get_client(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .context("Failed to get client from pool")
    }

    /// Execute a query and get rows
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>> {
        let client = self.get_client().await?;
        client.query(sql, params).await.context("Query error")
    }

    /// Close the pool; later queries fail
    pub fn close(&self) {
        self.pool.close();
    }

    /// Provider name
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait::async_trait]
impl HealthCheck for PostgresProvider {
    async fn check_health(&self) -> Result<bool> {
        match self.get_client().await {
            Ok(client) => match client.execute("SELECT 1", &[]).await {
                Ok(_) => Ok(true),
                Err(e) => {
                    warn!("Database health check failed: {}", e);
                    Ok(false)
                }
            },
            Err(e) => {
                warn!("Database connection failed: {:#}", e);
                Ok(false)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build a TLS connector from a database config
fn build_tls_connector(config: &DatabaseConfig) -> Result<TlsConnector> {
    let mut builder = TlsConnector::builder();

    if let Some(ca_cert_path) = &config.ca_cert {
        let ca_cert = load_certificate(ca_cert_path)?;
        builder.add_root_certificate(ca_cert);
    }

    if let Some(client_cert_path) = &config.client_cert {
        if let Some(client_key_path) = &config.client_key {
            let identity = load_identity(client_cert_path, client_key_path)?;
            builder.identity(identity);
        } else {
            return Err(anyhow!("Client key not provided"));
        }
    }

    match config.ssl_mode {
        SslMode::VerifyCa | SslMode::VerifyFull => {
            builder.danger_accept_invalid_certs(false);
        }
        _ => {
            builder.danger_accept_invalid_certs(true);
        }
    }
    if config.ssl_mode == SslMode::VerifyCa {
        builder.danger_accept_invalid_hostnames(true);
    }

    builder.build().context("Failed to build TLS connector")
}

/// Load a certificate from a file
pub fn load_certificate<P: AsRef<Path>>(path: P) -> Result<Certificate> {
    let cert_data = fs::read(path).context("Failed to read certificate file")?;
    Certificate::from_pem(&cert_data).context("Invalid certificate format")
}

/// Load an identity from certificate and key files
pub fn load_identity<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<Identity> {
    let cert_data = fs::read(cert_path).context("Failed to read certificate file")?;
    let key_data = fs::read(key_path).context("Failed to read key file")?;
    Identity::from_pkcs8(&cert_data, &key_data).context("Invalid certificate or key format")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ssl_mode: SslMode) -> DatabaseConfig {
        DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            name: "inventory".to_string(),
            username: "agent".to_string(),
            password: String::new(),
            ssl_mode,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            query: crate::config::DEFAULT_REGISTRY_QUERY.to_string(),
        }
    }

    #[tokio::test]
    async fn test_unreachable_database_is_unhealthy() {
        let provider = PostgresProvider::new(&config(SslMode::Disable), "registry").unwrap();
        assert!(!provider.check_health().await.unwrap());
    }

    #[test]
    fn test_client_cert_without_key_is_rejected() {
        let mut cfg = config(SslMode::Require);
        assert!(build_tls_connector(&cfg).is_ok());

        cfg.client_cert = Some("/nonexistent/cert.pem".to_string());
        assert!(build_tls_connector(&cfg).is_err());
    }
}
