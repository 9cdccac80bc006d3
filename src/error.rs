// Sync error taxonomy. None of these are fatal to the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Event stream could not be opened or broke; the client reconnects.
    #[error("event stream connection failed: {0}")]
    Connection(anyhow::Error),

    /// Entity vanished (or the daemon failed) between the event and the inspect call.
    #[error("inspect {kind} {id} failed: {error}")]
    Inspect {
        kind: &'static str,
        id: String,
        error: anyhow::Error,
    },

    #[error("list {kind} failed: {error}")]
    List {
        kind: &'static str,
        error: anyhow::Error,
    },

    /// Persistence failed; the next reconciliation pass repairs it.
    #[error("repository {operation} failed: {error}")]
    Repository {
        operation: &'static str,
        error: anyhow::Error,
    },

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("inbox full, event dropped")]
    QueueOverflow,

    #[error("event stream client already started")]
    AlreadyStarted,
}

impl SyncError {
    /// Short label used for logging and the `error` metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Connection(_) => "connection",
            SyncError::Inspect { .. } => "inspect",
            SyncError::List { .. } => "list",
            SyncError::Repository { .. } => "repository",
            SyncError::UnknownEventType(_) => "unknown_event_type",
            SyncError::QueueOverflow => "queue_overflow",
            SyncError::AlreadyStarted => "already_started",
        }
    }

    pub(crate) fn repository(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |error| SyncError::Repository { operation, error }
    }
}
