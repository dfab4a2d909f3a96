//! Test doubles for the datastore driver.
//!
//! [`FakeDriver`] stands in for PostgreSQL wherever the lifecycle matters but the data
//! does not: it counts connects and closes, can be told to refuse connections, and can
//! be flipped unhealthy to drive the connection monitor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::ConnectionError;
use crate::connection::Driver;

/// Handle returned by [`FakeDriver`]; each connect yields a fresh serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeHandle {
    /// Serial number of the connect that produced this handle.
    pub serial: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reachable: AtomicBool,
    healthy: AtomicBool,
    serial: AtomicU64,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// An in-process driver with observable behavior.  Clones share state.
#[derive(Debug, Clone)]
pub struct FakeDriver {
    counters: Arc<Counters>,
}

impl FakeDriver {
    /// A driver whose datastore is reachable and healthy.
    pub fn new() -> Self {
        let counters = Counters::default();
        counters.reachable.store(true, Ordering::SeqCst);
        counters.healthy.store(true, Ordering::SeqCst);
        Self {
            counters: Arc::new(counters),
        }
    }

    /// A driver whose datastore refuses every connection.
    pub fn unreachable() -> Self {
        let driver = Self::new();
        driver.counters.reachable.store(false, Ordering::SeqCst);
        driver
    }

    /// Makes subsequent probes succeed or fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.counters.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of successful connects.
    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Number of closes.
    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for FakeDriver {
    type Handle = FakeHandle;

    async fn connect(&self, uri: &str) -> Result<FakeHandle, ConnectionError> {
        if !self.counters.reachable.load(Ordering::SeqCst) {
            return Err(ConnectionError::Unreachable(format!(
                "connection refused: {}",
                uri
            )));
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let serial = self.counters.serial.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeHandle { serial })
    }

    async fn ping(&self, _handle: &FakeHandle) -> Result<(), ConnectionError> {
        if self.counters.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::Probe("server closed the connection".to_string()))
        }
    }

    async fn close(&self, _handle: &FakeHandle) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}
