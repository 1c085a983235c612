//! Framework hook adapter.
//!
//! Maps the usual application and invocation hooks of a web framework onto
//! engine initialization and unit-of-work demarcation.

use crate::core::{EntityDescriptor, InitError, TxError};
use crate::engine::{DataSource, EngineHandle};
use crate::unit_of_work::{TaskContext, UnitOfWorkRegistry};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Failure of work run inside a unit of work
#[derive(Error, Debug)]
pub enum WorkError<E> {
    /// The work itself failed; its unit of work was rolled back
    #[error("{0}")]
    Work(E),

    #[error(transparent)]
    Tx(#[from] TxError),
}

pub struct PersistencePlugin {
    handle: Arc<EngineHandle>,
    registry: Arc<UnitOfWorkRegistry>,
}

impl PersistencePlugin {
    pub fn new(handle: Arc<EngineHandle>) -> Self {
        let registry = Arc::new(UnitOfWorkRegistry::new(Arc::clone(&handle)));
        Self { handle, registry }
    }

    pub fn handle(&self) -> &Arc<EngineHandle> {
        &self.handle
    }

    pub fn registry(&self) -> &Arc<UnitOfWorkRegistry> {
        &self.registry
    }

    pub async fn on_application_start<I>(
        &self,
        entities: I,
        data_source: Option<Arc<dyn DataSource>>,
    ) -> Result<(), InitError>
    where
        I: IntoIterator<Item = EntityDescriptor>,
    {
        self.handle.initialize(entities, data_source).await
    }

    pub async fn on_application_stop(&self) {
        self.handle.shutdown().await;
    }

    pub async fn before_invocation(&self, ctx: &TaskContext, readonly: bool) -> Result<(), TxError> {
        self.registry.begin(ctx, readonly).await
    }

    pub async fn after_invocation(&self, ctx: &TaskContext) -> Result<(), TxError> {
        self.registry.end(ctx, false).await
    }

    pub async fn on_invocation_exception(&self, ctx: &TaskContext) -> Result<(), TxError> {
        self.registry.end(ctx, true).await
    }

    /// Last hook of every invocation. Whatever is still bound at this point
    /// was never committed and is rolled back.
    pub async fn invocation_finally(&self, ctx: &TaskContext) -> Result<(), TxError> {
        self.registry.end(ctx, true).await
    }

    /// Run `work` inside a unit of work bound to `ctx`.
    ///
    /// Commits when the work returns `Ok`, rolls back when it returns `Err`
    /// or panics. A work error takes precedence over a failure to end the
    /// unit of work. Dropping the returned future before it completes also
    /// rolls the unit of work back.
    pub async fn run_in_unit_of_work<F, T, E>(
        &self,
        ctx: &TaskContext,
        readonly: bool,
        work: F,
    ) -> Result<T, WorkError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.registry.begin(ctx, readonly).await?;
        let guard = self.registry.guard(ctx);

        let result = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                if let Err(err) = self.registry.end(ctx, true).await {
                    warn!(task = %ctx, error = %err, "Rollback after panic failed");
                }
                guard.disarm();
                std::panic::resume_unwind(panic);
            }
        };

        let ended = self.registry.end(ctx, result.is_err()).await;
        guard.disarm();
        match (result, ended) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(WorkError::Tx(err)),
            (Err(err), Ok(())) => Err(WorkError::Work(err)),
            (Err(err), Err(tx_err)) => {
                warn!(task = %ctx, error = %tx_err, "Rollback after failed work errored");
                Err(WorkError::Work(err))
            }
        }
    }
}
