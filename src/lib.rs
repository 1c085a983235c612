// ============================================================================
// txscope Library
// ============================================================================
//
// Per-request unit-of-work lifecycle on top of a pluggable persistence
// engine: one explicit engine handle per application, one session and
// transaction per task, committed or rolled back when the task ends.
//
// ============================================================================

pub mod core;
pub mod config;
pub mod engine;
pub mod unit_of_work;
pub mod lifecycle;
pub mod web;

// Re-export main types for convenience
pub use crate::core::{DialectId, EngineError, EntityDescriptor, InitError, SchemaMode, TaskId, TxError};
pub use crate::config::{ConfigBag, PersistenceConfig};
pub use engine::{
    DataSource, EngineBuilder, EngineHandle, EngineSettings, NamedDataSource, PersistenceEngine,
    PersistenceSession, TypeLoader, resolve_dialect,
};
pub use lifecycle::{PersistencePlugin, WorkError};
pub use unit_of_work::{TaskContext, UnitOfWork, UnitOfWorkGuard, UnitOfWorkRegistry};
pub use web::{WebTxPolicy, WebUnitOfWork, with_unit_of_work};
