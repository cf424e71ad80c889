//! Destinations for built points
use async_trait::async_trait;

use crate::error::Result;
use crate::point::Point;

/// InfluxDB v2 line-protocol sink
pub mod influx;
pub use influx::InfluxSink;

/// Line-protocol encoding
pub mod line_protocol;

/// In-memory sink for testing
pub mod memory;
pub use memory::MemorySink;

/// Destination for points
///
/// `write_point` only enqueues and may be called concurrently from many
/// device tasks; `flush` is the durability boundary.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Enqueue one point
    fn write_point(&self, point: Point) -> Result<()>;

    /// Transmit everything enqueued so far, returning the number of points sent
    async fn flush(&self) -> Result<usize>;

    /// Flush remaining points and release resources
    async fn close(&self) -> Result<()> {
        self.flush().await.map(|_| ())
    }

    /// Get a name for this sink
    fn name(&self) -> &str;
}
