//! # Startup Orchestration
//!
//! [`start`] sequences the boot of the service and [`Running::serve`] runs it to
//! completion:
//!
//! ```text
//! config ─▶ connect ─▶ (seed) ─▶ compose ─▶ bind ─▶ serve ─┬─ interrupt ─▶ drain ─▶ close ─▶ exit 0
//!              │          │                                └─ escape ────────────▶ close ─▶ exit 1
//!              │          └─ interrupt ─▶ close ─▶ exit 0
//!              └─ failure ─▶ exit 1 (listener never bound)
//! ```
//!
//! A single [`Shutdown`] is watched from before the connection attempt until the server
//! has drained, so an interrupt during seeding or binding closes the handle the same way
//! an interrupt while serving does.
//!
//! The orchestrator is generic over the datastore [`Driver`] so the whole sequence can be
//! exercised against [`crate::testing::FakeDriver`].  The `wire` callback turns the live
//! handle into the resource collaborators; it runs exactly once, after the connection is
//! established.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::account::AccountStore;
use crate::config::{Config, ConfigError};
use crate::connection::{ConnectionManager, Driver, PgDriver, log_events};
use crate::guard::{Escape, Escapes, Guard};
use crate::router::{self, RouteTable, RouteTableError};
use crate::seed::{default_seed_accounts, seed_privileged_accounts};
use crate::sql::account::PgAccountStore;
use crate::sql::document::PgDocumentStore;
use crate::ConnectionError;

/// What the `wire` callback hands back to the orchestrator.
pub struct Services {
    /// The route table to compose.
    pub routes: RouteTable,
    /// Account storage, used for optional boot-time seeding.
    pub accounts: Arc<dyn AccountStore>,
}

impl Services {
    /// The production collaborators over a PostgreSQL pool.
    pub fn postgres(pool: &PgPool) -> Self {
        let accounts: Arc<dyn AccountStore> = Arc::new(PgAccountStore::new(pool.clone()));
        let documents = Arc::new(PgDocumentStore::new(pool.clone()));
        Self {
            routes: RouteTable::standard(accounts.clone(), documents),
            accounts,
        }
    }
}

/////////////////////////////////////////// StartupError ///////////////////////////////////////////

/// Fatal conditions that end the process.
#[derive(Debug)]
pub enum StartupError {
    /// The environment could not be parsed.
    Config(ConfigError),
    /// The datastore connection could not be established.
    Connect(ConnectionError),
    /// The route table is inconsistent.
    Routes(RouteTableError),
    /// The listener could not be bound.
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Why binding failed.
        source: std::io::Error,
    },
    /// The HTTP server failed while serving.
    Serve(std::io::Error),
    /// A guarded background task failed.
    Escaped(Escape),
}

impl StartupError {
    /// Process exit status for this failure.
    pub fn exit_status(&self) -> u8 {
        1
    }
}

impl Display for StartupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StartupError::Config(err) => write!(f, "invalid configuration: {}", err),
            StartupError::Connect(err) => write!(f, "could not connect to the datastore: {}", err),
            StartupError::Routes(err) => write!(f, "invalid route table: {}", err),
            StartupError::Bind { addr, source } => write!(f, "failed to bind to {}: {}", addr, source),
            StartupError::Serve(err) => write!(f, "server error: {}", err),
            StartupError::Escaped(escape) => write!(f, "{}", escape),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Config(err) => Some(err),
            StartupError::Connect(err) => Some(err),
            StartupError::Routes(err) => Some(err),
            StartupError::Bind { source, .. } => Some(source),
            StartupError::Serve(err) => Some(err),
            StartupError::Escaped(escape) => Some(escape),
        }
    }
}

impl From<ConfigError> for StartupError {
    fn from(err: ConfigError) -> Self {
        StartupError::Config(err)
    }
}

///////////////////////////////////////////// Shutdown /////////////////////////////////////////////

/// A shutdown request shared by startup and serving.
#[derive(Clone, Debug)]
pub struct Shutdown {
    requested: watch::Receiver<bool>,
}

/// Fires a [`Shutdown`].  Dropping every trigger without firing means shutdown is never
/// requested.
#[derive(Clone, Debug)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownTrigger {
    /// Requests shutdown.  Firing more than once is harmless.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// A shutdown and the trigger that fires it.
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, requested) = watch::channel(false);
        (ShutdownTrigger { tx: Arc::new(tx) }, Shutdown { requested })
    }

    /// A shutdown that is never requested.
    pub fn never() -> Self {
        Self::channel().1
    }

    /// A shutdown fired by the first interrupt.
    pub async fn on_interrupt() -> Self {
        let (trigger, shutdown) = Self::channel();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.fire();
        });
        // the listener installs its handler on first poll
        tokio::task::yield_now().await;
        shutdown
    }

    /// True once shutdown has been requested.
    pub fn requested(&self) -> bool {
        *self.requested.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait(&self) {
        let mut requested = self.requested.clone();
        if requested.wait_for(|requested| *requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

////////////////////////////////////////////// Running /////////////////////////////////////////////

/// How [`start`] ended when it did not fail.
pub enum Started<D: Driver> {
    /// Bound and ready to serve.
    Running(Running<D>),
    /// Shutdown was requested before the service was ready; the handle is closed.
    Interrupted,
}

/// A bound, not yet serving, service.
pub struct Running<D: Driver> {
    manager: Arc<ConnectionManager<D>>,
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
    guard: Guard,
    escapes: Escapes,
    shutdown: Shutdown,
}

impl<D: Driver> Running<D> {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The connection manager owning the datastore handle.
    pub fn connection(&self) -> &Arc<ConnectionManager<D>> {
        &self.manager
    }

    /// A guard whose escapes terminate the service.
    pub fn guard(&self) -> Guard {
        self.guard.clone()
    }

    /// Serves until shutdown is requested or a guarded task escapes.
    ///
    /// On shutdown the listener stops accepting, in-flight requests drain, and the
    /// datastore handle is closed.  On escape the server is dropped, the handle is closed,
    /// and the escape is returned.
    pub async fn serve(self) -> Result<(), StartupError> {
        let Running {
            manager,
            listener,
            app,
            guard,
            mut escapes,
            shutdown,
            ..
        } = self;
        // only the tasks themselves keep the escape channel open from here on
        drop(guard);

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await });
        let outcome = tokio::select! {
            result = async move { server.await } => result.map_err(StartupError::Serve),
            Some(escape) = escapes.next() => Err(StartupError::Escaped(escape)),
        };

        if manager.close().await {
            tracing::info!("datastore connection closed");
        }
        outcome
    }
}

////////////////////////////////////////////// start ///////////////////////////////////////////////

/// Connects, wires the collaborators, and binds the listener.
///
/// Nothing is bound unless the connection succeeds.  Any failure after connecting closes
/// the handle before returning.  If `shutdown` is requested before the listener is ready
/// the handle is closed and [`Started::Interrupted`] is returned.
pub async fn start<D, W>(
    config: Config,
    driver: D,
    wire: W,
    shutdown: Shutdown,
) -> Result<Started<D>, StartupError>
where
    D: Driver,
    W: FnOnce(&D::Handle) -> Services,
{
    tracing::info!(
        datastore_uri_present = config.database_url.is_some(),
        secret_present = config.secret_present,
        "loaded configuration"
    );

    let manager = Arc::new(ConnectionManager::new(
        driver,
        config.database_url.clone().unwrap_or_default(),
    ));
    let (guard, escapes) = Guard::channel();
    guard.spawn("connection-events", log_events(manager.subscribe()));

    let connected = tokio::select! {
        result = manager.connect() => Some(result),
        () = shutdown.wait() => None,
    };
    let handle = match connected {
        Some(Ok(handle)) => handle,
        Some(Err(err)) => {
            tracing::error!(error = %err, "failed to connect to the datastore");
            return Err(StartupError::Connect(err));
        }
        None => return Ok(interrupted(&manager).await),
    };

    let bound = tokio::select! {
        result = bind(&config, &manager, &guard, &handle, wire) => Some(result),
        () = shutdown.wait() => None,
    };
    match bound {
        Some(Ok((listener, local_addr, app))) if !shutdown.requested() => {
            Ok(Started::Running(Running {
                manager,
                listener,
                local_addr,
                app,
                guard,
                escapes,
                shutdown,
            }))
        }
        Some(Err(err)) => {
            manager.close().await;
            Err(err)
        }
        Some(Ok(_)) | None => Ok(interrupted(&manager).await),
    }
}

async fn interrupted<D: Driver>(manager: &ConnectionManager<D>) -> Started<D> {
    tracing::info!("startup interrupted");
    if manager.close().await {
        tracing::info!("datastore connection closed");
    }
    Started::Interrupted
}

async fn bind<D, W>(
    config: &Config,
    manager: &Arc<ConnectionManager<D>>,
    guard: &Guard,
    handle: &D::Handle,
    wire: W,
) -> Result<(TcpListener, SocketAddr, Router), StartupError>
where
    D: Driver,
    W: FnOnce(&D::Handle) -> Services,
{
    guard.spawn(
        "connection-monitor",
        manager.clone().monitor(config.health_check_interval),
    );

    let services = wire(handle);
    if config.seed_on_boot {
        let seeds = default_seed_accounts(&config.seed_password);
        seed_privileged_accounts(services.accounts.as_ref(), &seeds, config.bcrypt_cost).await;
    }

    let entry_points = services.routes.entry_points();
    let app = router::compose(services.routes, config).map_err(StartupError::Routes)?;

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| StartupError::Bind { addr, source })?;

    tracing::info!(%local_addr, "server listening");
    for entry_point in &entry_points {
        tracing::info!(route = %entry_point, "mounted");
    }
    tracing::info!(
        mode = %config.mode,
        secret_present = config.secret_present,
        "ready to accept requests"
    );
    Ok((listener, local_addr, app))
}

/// Resolves on the first interrupt.
///
/// If the handler cannot be installed the failure is logged and the future never
/// resolves, leaving shutdown to other signals.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("interrupt received, shutting down"),
        Err(err) => {
            tracing::error!(error = %err, "failed to install interrupt handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Runs the production service until interrupted.
pub async fn run(config: Config) -> ExitCode {
    let shutdown = Shutdown::on_interrupt().await;
    let outcome = match start(config, PgDriver, Services::postgres, shutdown).await {
        Ok(Started::Running(running)) => running.serve().await,
        Ok(Started::Interrupted) => Ok(()),
        Err(err) => Err(err),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "lifeecd exiting");
            ExitCode::from(err.exit_status())
        }
    }
}
