use super::TaskId;
use thiserror::Error;

/// Failures reported by a persistence engine collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Persistence engine is not initialized")]
    NotInitialized,

    #[error("Session is closed")]
    Closed,

    #[error("Engine error: {0}")]
    Backend(String),
}

/// Failures while constructing the persistence engine.
///
/// Every variant leaves the owning handle disabled, so later hook calls
/// short-circuit instead of failing again.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Cannot enable persistence without a valid data source")]
    NoDataSource,

    #[error(
        "Unknown dialect for driver '{driver}', set the property jpa.dialect in the configuration"
    )]
    UnknownDialect { driver: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Engine construction failed: {0}")]
    BuildFailed(#[source] EngineError),
}

/// Failures while demarcating a unit of work.
#[derive(Error, Debug)]
pub enum TxError {
    #[error("Failed to begin unit of work: {0}")]
    BeginFailed(#[source] EngineError),

    #[error("Commit failed: {0}")]
    CommitFailed(#[source] EngineError),

    #[error("Rollback failed: {0}")]
    RollbackFailed(#[source] EngineError),

    #[error("Unit of work already active for task {0}")]
    ReentrantBegin(TaskId),
}

pub type Result<T> = std::result::Result<T, TxError>;
