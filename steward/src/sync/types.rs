//! Shared types for the reconciliation engine: error taxonomy, context and
//! the progress callback handed in by interactive triggers.

use std::sync::Arc;

use thiserror::Error;

use crate::config::BaselineConfig;
use crate::directory::{DirectoryClient, DirectoryError};
use crate::sync::lock::SyncLock;

/// Errors raised inside a reconciliation run. Each is caught at the boundary
/// of the unit it threatens (channel > cohort > run) and degrades to a log
/// line; callers only ever see a boolean.
#[derive(Error, Debug)]
pub enum Error {
    /// Unparsable or missing config document. Fatal, aborts the whole run.
    #[error("invalid config document: {0}")]
    InvalidConfigDocument(String),

    /// Malformed cohort key. Skips that cohort only.
    #[error("invalid cohort key '{key}': {reason}")]
    InvalidConfigKey { key: String, reason: String },

    /// A remote create/edit/fetch failed. Skips the smallest enclosing unit.
    #[error("remote operation '{op}' failed on '{target}': {source}")]
    RemoteOperationFailed {
        op: &'static str,
        target: String,
        #[source]
        source: DirectoryError,
    },

    /// Persistence failure while loading or saving the applied document.
    #[error("config store error: {0}")]
    Store(String),
}

impl From<crate::config::ConfigError> for Error {
    fn from(e: crate::config::ConfigError) -> Self {
        match e {
            crate::config::ConfigError::Parse(e) => Error::InvalidConfigDocument(e.to_string()),
            e @ crate::config::ConfigError::Io { .. } => Error::Store(e.to_string()),
        }
    }
}

impl Error {
    pub(crate) fn remote(
        op: &'static str,
        target: impl Into<String>,
    ) -> impl FnOnce(DirectoryError) -> Error {
        let target = target.into();
        move |source| Error::RemoteOperationFailed { op, target, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Receives "Processing PGE_2027"-style status lines during a run, typically
/// wired to an interactive command's reply.
pub trait ProgressSink: Send + Sync {
    fn update(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn update(&self, message: &str) {
        self(message);
    }
}

pub(crate) fn report(progress: Option<&dyn ProgressSink>, message: &str) {
    if let Some(sink) = progress {
        sink.update(message);
    }
}

/// Shared context for every reconciliation trigger.
pub struct Context {
    pub directory: Arc<dyn DirectoryClient>,
    pub baseline: Arc<BaselineConfig>,
    pub lock: SyncLock,
}

impl Context {
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryClient>, baseline: Arc<BaselineConfig>) -> Self {
        Self {
            directory,
            baseline,
            lock: SyncLock::new(),
        }
    }
}
