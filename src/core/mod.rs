pub mod error;
pub mod types;

pub use error::{EngineError, InitError, Result, TxError};
pub use types::{DialectId, EntityDescriptor, SchemaMode, TaskId, TransactionType};
