//! # Datastore Connection Management
//!
//! The [`ConnectionManager`] owns the single datastore handle of the process.  It is
//! created by the startup orchestrator, hands clones of the handle to the resource
//! collaborators at wiring time, and closes the handle exactly once on shutdown.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected ──close()──▶ Disconnected
//!                                  │                 │  ▲
//!                                  └──err──▶ Errored │  │ probe ok
//!                                                    ▼  │
//!                                               Disconnected (probe failed)
//! ```
//!
//! Every transition after the initial connect is announced on a broadcast channel as a
//! [`ConnectionEvent`].  Subscribers are observers only; the built-in subscriber
//! ([`log_events`]) writes each event to the log.
//!
//! The [`Driver`] trait is the seam between the manager and the actual datastore.
//! [`PgDriver`] talks to PostgreSQL through a `sqlx` pool; tests substitute
//! [`crate::testing::FakeDriver`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::ConnectionError;

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 16;

/// Upper bound on pooled PostgreSQL connections.
const MAX_POOL_CONNECTIONS: u32 = 10;

/// How long the initial connect may wait for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

////////////////////////////////////////////// Driver //////////////////////////////////////////////

/// A datastore driver.
///
/// The handle it returns must be cheap to clone and safe to share across concurrently
/// running requests; the driver is responsible for multiplexing operations over it.
pub trait Driver: Send + Sync + 'static {
    /// The shared datastore handle.
    type Handle: Clone + Send + Sync + 'static;

    /// Opens a handle to the datastore at `uri`.
    fn connect(
        &self,
        uri: &str,
    ) -> impl Future<Output = Result<Self::Handle, ConnectionError>> + Send;

    /// Checks that `handle` is still usable.
    fn ping(&self, handle: &Self::Handle)
    -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Closes `handle`, waiting for in-flight work to finish.
    fn close(&self, handle: &Self::Handle) -> impl Future<Output = ()> + Send;
}

/// PostgreSQL driver backed by a `sqlx` connection pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDriver;

impl Driver for PgDriver {
    type Handle = PgPool;

    async fn connect(&self, uri: &str) -> Result<PgPool, ConnectionError> {
        PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(uri)
            .await
            .map_err(|e| ConnectionError::Unreachable(e.to_string()))
    }

    async fn ping(&self, handle: &PgPool) -> Result<(), ConnectionError> {
        sqlx::query("SELECT 1")
            .execute(handle)
            .await
            .map(|_| ())
            .map_err(|e| ConnectionError::Probe(e.to_string()))
    }

    async fn close(&self, handle: &PgPool) {
        handle.close().await;
    }
}

////////////////////////////////////////// State and Events /////////////////////////////////////////

/// Connection state as observed by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No usable handle.
    Disconnected,
    /// The initial connect is in progress.
    Connecting,
    /// The handle is usable.
    Connected,
    /// The initial connect failed.
    Errored,
}

/// Lifecycle notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handle became usable.
    Connected,
    /// A connection-level fault was detected after the initial connect.
    Error(String),
    /// The handle lost its usable state.
    Disconnected,
}

///////////////////////////////////////// ConnectionManager ////////////////////////////////////////

/// Owner of the single datastore handle.
pub struct ConnectionManager<D: Driver> {
    driver: D,
    uri: String,
    handle: Mutex<Slot<D::Handle>>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
}

enum Slot<H> {
    Empty,
    Live(H),
    Closed,
}

impl<D: Driver> ConnectionManager<D> {
    /// Creates a manager that will connect to `uri` with `driver`.
    pub fn new(driver: D, uri: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            driver,
            uri: uri.into(),
            handle: Mutex::new(Slot::Empty),
            state,
            events,
        }
    }

    /// The URI this manager connects to.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Subscribes to lifecycle events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Opens the datastore handle.
    ///
    /// Only one handle may be live per manager: calling this again while connected
    /// yields [`ConnectionError::AlreadyConnected`], and a closed manager stays closed.
    pub async fn connect(&self) -> Result<D::Handle, ConnectionError> {
        let mut slot = self.handle.lock().await;
        match *slot {
            Slot::Live(_) => return Err(ConnectionError::AlreadyConnected),
            Slot::Closed => return Err(ConnectionError::Closed),
            Slot::Empty => {}
        }
        if self.uri.trim().is_empty() {
            self.state.send_replace(ConnectionState::Errored);
            return Err(ConnectionError::MissingUri);
        }

        tracing::info!("attempting to connect to the datastore");
        self.state.send_replace(ConnectionState::Connecting);
        match self.driver.connect(&self.uri).await {
            Ok(handle) => {
                *slot = Slot::Live(handle.clone());
                self.state.send_replace(ConnectionState::Connected);
                self.emit(ConnectionEvent::Connected);
                Ok(handle)
            }
            Err(err) => {
                self.state.send_replace(ConnectionState::Errored);
                Err(err)
            }
        }
    }

    /// A clone of the live handle, if any.
    pub async fn handle(&self) -> Option<D::Handle> {
        match &*self.handle.lock().await {
            Slot::Live(handle) => Some(handle.clone()),
            Slot::Empty | Slot::Closed => None,
        }
    }

    /// Closes the handle.  Returns `true` if this call closed it and `false` if there was
    /// nothing to close; the driver's `close` runs at most once per manager.
    pub async fn close(&self) -> bool {
        let mut slot = self.handle.lock().await;
        let previous = std::mem::replace(&mut *slot, Slot::Closed);
        match previous {
            Slot::Live(handle) => {
                self.driver.close(&handle).await;
                self.state.send_replace(ConnectionState::Disconnected);
                self.emit(ConnectionEvent::Disconnected);
                true
            }
            Slot::Empty | Slot::Closed => false,
        }
    }

    /// Probes the handle every `interval` and announces state changes.
    ///
    /// A failed probe emits [`ConnectionEvent::Error`], followed by
    /// [`ConnectionEvent::Disconnected`] when the handle was previously usable.  A
    /// successful probe after a failure emits [`ConnectionEvent::Connected`].  Returns
    /// once the manager is closed.
    pub async fn monitor(self: Arc<Self>, interval: Duration) -> Result<(), ConnectionError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(handle) = self.handle().await else {
                return Ok(());
            };
            let outcome = self.driver.ping(&handle).await;
            // close() may have run while the probe was in flight
            if self.handle().await.is_none() {
                return Ok(());
            }
            self.observe_probe(outcome);
        }
    }

    fn observe_probe(&self, outcome: Result<(), ConnectionError>) {
        let current = self.state();
        match outcome {
            Ok(()) => {
                if current != ConnectionState::Connected {
                    self.state.send_replace(ConnectionState::Connected);
                    self.emit(ConnectionEvent::Connected);
                }
            }
            Err(err) => {
                self.emit(ConnectionEvent::Error(err.to_string()));
                if current == ConnectionState::Connected {
                    self.state.send_replace(ConnectionState::Disconnected);
                    self.emit(ConnectionEvent::Disconnected);
                }
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // no subscribers is not an error
        let _ = self.events.send(event);
    }
}

/// Logs every lifecycle event until the manager goes away.
pub async fn log_events(
    mut events: broadcast::Receiver<ConnectionEvent>,
) -> Result<(), ConnectionError> {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::Connected) => {
                tracing::info!("datastore connection established");
            }
            Ok(ConnectionEvent::Error(message)) => {
                tracing::error!(error = %message, "datastore connection error");
            }
            Ok(ConnectionEvent::Disconnected) => {
                tracing::warn!("datastore connection disconnected");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "connection event listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
