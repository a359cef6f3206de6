use super::mode::Mode;
use super::task::TaskType;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while running maintenance.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("maintenance must be run by designated user: {owner}")]
    NotOwned { owner: String },

    #[error(
        "clock skew detected: local clock is out of sync with repository timestamp by more than allowed {max:?} (local: {local} repository: {repository})"
    )]
    ClockSkew {
        local: DateTime<Utc>,
        repository: DateTime<Utc>,
        max: Duration,
    },

    #[error("maintenance cancelled")]
    Cancelled,

    #[error("unknown mode {0}")]
    UnknownMode(Mode),

    #[error("unable to acquire maintenance lock: {0}")]
    Lock(#[source] std::io::Error),

    #[error("epoch manager: {0:#}")]
    EpochManager(#[source] anyhow::Error),

    #[error("{context}: {source:#}")]
    Storage {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{task}: {source:#}")]
    Task {
        task: TaskType,
        #[source]
        source: anyhow::Error,
    },

    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: Box<MaintenanceError>,
    },
}

impl MaintenanceError {
    pub fn storage(context: &'static str, source: anyhow::Error) -> Self {
        MaintenanceError::Storage { context, source }
    }

    /// Wraps this error with a short description of the step that failed.
    pub fn context(self, context: &'static str) -> Self {
        MaintenanceError::Context {
            context,
            source: Box::new(self),
        }
    }

    /// The innermost error, with every [`MaintenanceError::Context`] layer peeled off.
    pub fn root(&self) -> &MaintenanceError {
        let mut err = self;
        while let MaintenanceError::Context { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn is_not_owned(&self) -> bool {
        matches!(self.root(), MaintenanceError::NotOwned { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), MaintenanceError::Cancelled)
    }

    /// Task that failed, if the failure came from a task.
    pub fn failed_task(&self) -> Option<&TaskType> {
        match self.root() {
            MaintenanceError::Task { task, .. } => Some(task),
            _ => None,
        }
    }
}
