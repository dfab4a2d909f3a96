//! Process-level guard against unobserved asynchronous failures.
//!
//! Background work is spawned through a [`Guard`].  Every guarded task is watched: if it
//! returns an error or panics, the failure is logged and reported as an [`Escape`] on the
//! guard's channel.  The startup orchestrator treats any escape as fatal and terminates
//! with exit code 1 instead of serving on with broken invariants.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How a guarded task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeKind {
    /// The task returned an error.
    Error,
    /// The task panicked.
    Panic,
}

/// A failure that escaped a guarded task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escape {
    /// Name the task was spawned under.
    pub task: String,
    /// How it failed.
    pub kind: EscapeKind,
    /// The error or panic message.
    pub message: String,
}

impl Display for Escape {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let kind = match self.kind {
            EscapeKind::Error => "error",
            EscapeKind::Panic => "panic",
        };
        write!(f, "{} in task {}: {}", kind, self.task, self.message)
    }
}

impl std::error::Error for Escape {}

/// Spawns guarded tasks.  Clones report to the same [`Escapes`].
#[derive(Debug, Clone)]
pub struct Guard {
    tx: mpsc::UnboundedSender<Escape>,
}

/// Receiving side of a [`Guard`].
#[derive(Debug)]
pub struct Escapes {
    rx: mpsc::UnboundedReceiver<Escape>,
}

impl Guard {
    /// Creates a guard and the receiver its escapes are delivered to.
    pub fn channel() -> (Guard, Escapes) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Guard { tx }, Escapes { rx })
    }

    /// Spawns `future` as a task named `task`.
    ///
    /// The returned handle resolves once the task has finished and, if it failed, once
    /// the failure has been reported.  Aborting the handle does not abort the task.
    pub fn spawn<F, E>(&self, task: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let inner = tokio::spawn(future);
        let tx = self.tx.clone();
        let task = task.to_string();
        tokio::spawn(async move {
            let escape = match inner.await {
                Ok(Ok(())) => return,
                Ok(Err(err)) => Escape {
                    task,
                    kind: EscapeKind::Error,
                    message: err.to_string(),
                },
                Err(join_err) if join_err.is_panic() => Escape {
                    task,
                    kind: EscapeKind::Panic,
                    message: panic_message(join_err.into_panic()),
                },
                Err(_) => return,
            };
            tracing::error!(
                task = %escape.task,
                kind = ?escape.kind,
                message = %escape.message,
                "unhandled failure escaped a background task; shutting down"
            );
            // the orchestrator may already be gone
            let _ = tx.send(escape);
        })
    }
}

impl Escapes {
    /// Waits for the next escape.  Returns `None` once every [`Guard`] is dropped.
    pub async fn next(&mut self) -> Option<Escape> {
        self.rx.recv().await
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send + 'static>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task panicked".to_string()
    }
}
