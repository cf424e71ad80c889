use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::time::Duration;
use tokio::time::timeout;

/// Trait for health check functionality
#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    /// Perform a health check
    async fn check_health(&self) -> Result<bool>;

    /// Get the name of this health check
    fn name(&self) -> &str;
}

/// Run one health check with a deadline and log the outcome
///
/// Never fails: an unhealthy or unreachable backend is reported as `false`.
pub async fn check_within<H: HealthCheck + ?Sized>(checker: &H, deadline: Duration) -> bool {
    match timeout(deadline, checker.check_health()).await {
        Ok(Ok(true)) => {
            info!("{} is reachable", checker.name());
            true
        }
        Ok(Ok(false)) => {
            warn!("{} reported unhealthy", checker.name());
            false
        }
        Ok(Err(e)) => {
            warn!("Health check for {} failed: {}", checker.name(), e);
            false
        }
        Err(_) => {
            warn!("Health check for {} timed out after {:?}", checker.name(), deadline);
            false
        }
    }
}
