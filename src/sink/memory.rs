use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{AgentError, Result};
use crate::point::Point;
use crate::sink::Sink;

/// A minimal in-memory sink for testing and dry runs
pub struct MemorySink {
    points: RwLock<Vec<Point>>,
    pending: AtomicUsize,
    flushes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_flush: AtomicBool,
    closed: AtomicBool,
    name: String,
}

impl MemorySink {
    /// Create a new memory sink
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            points: RwLock::new(Vec::new()),
            pending: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_flush: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            name: name.into(),
        }
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent flushes fail
    pub fn fail_flush(&self, fail: bool) {
        self.fail_flush.store(fail, Ordering::Relaxed);
    }

    /// All points accepted so far
    pub fn points(&self) -> Vec<Point> {
        self.points
            .read()
            .map(|points| points.clone())
            .unwrap_or_default()
    }

    /// Accepted points of one measurement
    pub fn points_for(&self, measurement: &str) -> Vec<Point> {
        self.points()
            .into_iter()
            .filter(|p| p.measurement == measurement)
            .collect()
    }

    /// Number of flush calls, successful or not
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn write_point(&self, point: Point) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(AgentError::SinkWrite("write rejected".to_string()));
        }

        let mut points = self
            .points
            .write()
            .map_err(|_| AgentError::SinkWrite("Lock poisoned".to_string()))?;
        points.push(point);
        self.pending.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        let pending = self.pending.swap(0, Ordering::Relaxed);

        if self.fail_flush.load(Ordering::Relaxed) {
            return Err(AgentError::SinkFlush(format!("{} points lost", pending)));
        }
        Ok(pending)
    }

    async fn close(&self) -> Result<()> {
        self.flush().await?;
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
