//! Load primitives used to inject simulated work.
//!
//! These are stateless helpers: a busy loop for CPU-bound work and a sleep
//! for I/O. [`DiskAccess`] wraps the I/O primitive so stores and simulators
//! can charge a fixed latency to every access; [`DiskOptions`] selects one
//! from configuration.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Spin a no-op loop `cycles` times.
pub fn simulate_cpu_load(cycles: u64) {
    for i in 0..cycles {
        std::hint::black_box(i);
    }
}

/// Suspend the current task for `ms` milliseconds.
pub async fn simulate_io_load(ms: u64) {
    if ms == 0 {
        return;
    }
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Latency model for a single storage access.
#[async_trait::async_trait]
pub trait DiskAccess: Send + Sync {
    async fn access(&self);
}

/// Disk access that only pays the latency; concurrent accesses never interact.
#[derive(Debug, Clone, Copy)]
pub struct UnsyncDisk {
    access_time_ms: u64,
}

impl UnsyncDisk {
    pub fn new(access_time_ms: u64) -> Self {
        Self { access_time_ms }
    }
}

#[async_trait::async_trait]
impl DiskAccess for UnsyncDisk {
    async fn access(&self) {
        simulate_io_load(self.access_time_ms).await;
    }
}

/// Cycles spent inside the shared log-append section of [`SerializedDisk`].
const LOG_APPEND_CYCLES: u64 = 10;

/// Disk access that pays the latency and then appends to a shared log.
///
/// The append is a short CPU-bound section guarded by one mutex, so heavy
/// parallel access serializes on it the way a single write-ahead log would.
#[derive(Debug, Default)]
pub struct SerializedDisk {
    access_time_ms: u64,
    log: Mutex<u64>,
}

impl SerializedDisk {
    pub fn new(access_time_ms: u64) -> Self {
        Self {
            access_time_ms,
            log: Mutex::new(0),
        }
    }

    /// Number of completed log appends.
    pub fn appends(&self) -> u64 {
        self.log.lock().map(|g| *g).unwrap_or_else(|p| *p.into_inner())
    }
}

#[async_trait::async_trait]
impl DiskAccess for SerializedDisk {
    async fn access(&self) {
        simulate_io_load(self.access_time_ms).await;
        let mut appends = self.log.lock().unwrap_or_else(|p| p.into_inner());
        simulate_cpu_load(LOG_APPEND_CYCLES);
        *appends += 1;
    }
}

/// Disk latency model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskKind {
    /// [`UnsyncDisk`]
    #[default]
    Unsync,
    /// [`SerializedDisk`]
    Serialized,
}

/// Configured disk: which model and how long one access takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskOptions {
    pub kind: DiskKind,
    pub access_ms: u64,
}

impl DiskOptions {
    pub fn build(&self) -> Arc<dyn DiskAccess> {
        match self.kind {
            DiskKind::Unsync => Arc::new(UnsyncDisk::new(self.access_ms)),
            DiskKind::Serialized => Arc::new(SerializedDisk::new(self.access_ms)),
        }
    }
}
