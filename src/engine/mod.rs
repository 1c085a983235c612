// ============================================================================
// Persistence Engine Integration
// ============================================================================
//
// The engine (entity mapping, SQL generation, pooling) lives outside this
// crate. It is reached only through the narrow traits below: a builder that
// turns `EngineSettings` into an engine, an engine that opens sessions, and
// sessions that demarcate one transaction at a time.
//
// ============================================================================

pub mod dialect;
pub mod handle;
pub mod memory;

use crate::core::{DialectId, EngineError, EntityDescriptor, SchemaMode, TransactionType};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use dialect::{HSQL_DIALECT, HSQL_DRIVER, known_dialect, resolve_dialect};
pub use handle::EngineHandle;

/// Opaque connection source handed to the engine
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Human readable name, used in diagnostics only
    fn name(&self) -> &str;
}

/// Resolves entity type names on behalf of the engine.
///
/// Applications that load mapped types from their own registry pass one to
/// the handle; engines use it instead of their built-in lookup.
pub trait TypeLoader: Send + Sync {
    fn resolve(&self, name: &str) -> Option<EntityDescriptor>;
}

/// One open session against the engine.
///
/// Sessions are used by a single task at a time, but the methods take
/// `&self` so the active session can be shared with collaborators of that
/// task through an `Arc`.
#[async_trait]
pub trait PersistenceSession: Send + Sync {
    fn id(&self) -> u64;

    async fn begin(&self) -> Result<(), EngineError>;

    async fn commit(&self) -> Result<(), EngineError>;

    async fn rollback(&self) -> Result<(), EngineError>;

    /// Release the session. Closing twice is harmless.
    async fn close(&self);
}

#[async_trait]
pub trait PersistenceEngine: Send + Sync {
    async fn open_session(&self) -> Result<Arc<dyn PersistenceSession>, EngineError>;

    async fn close(&self);
}

/// Constructs engines from resolved settings
#[async_trait]
pub trait EngineBuilder: Send + Sync {
    async fn build(&self, settings: EngineSettings) -> Result<Arc<dyn PersistenceEngine>, EngineError>;
}

/// Everything an engine needs to start.
#[derive(Clone)]
pub struct EngineSettings {
    pub data_source: Arc<dyn DataSource>,
    pub schema_mode: SchemaMode,
    pub dialect: DialectId,
    pub transaction_type: TransactionType,
    pub entities: Vec<EntityDescriptor>,
    pub type_loader: Option<Arc<dyn TypeLoader>>,
}

impl fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSettings")
            .field("data_source", &self.data_source.name())
            .field("schema_mode", &self.schema_mode)
            .field("dialect", &self.dialect)
            .field("transaction_type", &self.transaction_type)
            .field("entities", &self.entities.len())
            .field("type_loader", &self.type_loader.is_some())
            .finish()
    }
}

/// Data source identified only by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedDataSource {
    name: String,
}

impl NamedDataSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DataSource for NamedDataSource {
    fn name(&self) -> &str {
        &self.name
    }
}
