use super::{TaskContext, UnitOfWork};
use crate::core::{Result, TaskId, TxError};
use crate::engine::{EngineHandle, PersistenceSession};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Binds units of work to the tasks that opened them.
///
/// Each task moves between two states: no unit of work, or exactly one
/// active unit of work. Bindings are keyed by [`TaskId`], so tasks never
/// see each other's sessions.
pub struct UnitOfWorkRegistry {
    handle: Arc<EngineHandle>,
    bindings: RwLock<HashMap<TaskId, Arc<UnitOfWork>>>,
}

impl UnitOfWorkRegistry {
    pub fn new(handle: Arc<EngineHandle>) -> Self {
        Self {
            handle,
            bindings: RwLock::new(HashMap::new()),
        }
    }

    pub fn handle(&self) -> &Arc<EngineHandle> {
        &self.handle
    }

    /// Open a session, start its transaction and bind it to `ctx`.
    ///
    /// No-op while persistence is disabled. Fails with
    /// [`TxError::ReentrantBegin`] if the task already has a unit of work;
    /// the existing one is left untouched.
    pub async fn begin(&self, ctx: &TaskContext, readonly: bool) -> Result<()> {
        if !self.handle.is_enabled() {
            return Ok(());
        }

        let task = ctx.id();
        if self.bindings.read().await.contains_key(&task) {
            warn!(task = %ctx, "Unit of work already active");
            return Err(TxError::ReentrantBegin(task));
        }

        let session = self
            .handle
            .open_session()
            .await
            .map_err(TxError::BeginFailed)?;
        let pending = SessionGuard::new(&session);

        if let Err(err) = session.begin().await {
            pending.disarm();
            session.close().await;
            return Err(TxError::BeginFailed(err));
        }

        let unit = Arc::new(UnitOfWork::new(task, session, readonly));
        let mut bindings = self.bindings.write().await;
        if bindings.contains_key(&task) {
            drop(bindings);
            pending.disarm();
            warn!(task = %ctx, "Unit of work bound concurrently, discarding new session");
            discard(unit.session()).await;
            return Err(TxError::ReentrantBegin(task));
        }
        bindings.insert(task, unit);
        pending.disarm();
        debug!(task = %ctx, readonly, "Unit of work started");
        Ok(())
    }

    /// Finish the unit of work bound to `ctx`.
    ///
    /// Rolls back when the unit of work is read-only or `force_rollback`
    /// is set, commits otherwise. The binding is released before the
    /// engine is asked to finish, so it is gone whatever the outcome, and
    /// the session is always closed. If this future is dropped halfway the
    /// session is rolled back and closed in the background.
    pub async fn end(&self, ctx: &TaskContext, force_rollback: bool) -> Result<()> {
        if !self.handle.is_enabled() {
            return Ok(());
        }

        let Some(unit) = self.bindings.write().await.remove(&ctx.id()) else {
            return Ok(());
        };

        let finishing = SessionGuard::new(unit.session());
        let rollback = unit.is_readonly() || force_rollback;
        let outcome = if rollback {
            unit.session()
                .rollback()
                .await
                .map_err(TxError::RollbackFailed)
        } else {
            unit.session().commit().await.map_err(TxError::CommitFailed)
        };
        unit.session().close().await;
        finishing.disarm();

        match &outcome {
            Ok(()) => debug!(
                task = %ctx,
                rollback,
                elapsed_ms = unit.elapsed_ms(),
                "Unit of work finished"
            ),
            Err(err) => warn!(task = %ctx, error = %err, "Unit of work ended with an error"),
        }

        outcome
    }

    /// The unit of work bound to `ctx`, if any
    pub async fn current(&self, ctx: &TaskContext) -> Option<Arc<UnitOfWork>> {
        self.bindings.read().await.get(&ctx.id()).cloned()
    }

    /// Number of tasks with an active unit of work
    pub async fn active_count(&self) -> usize {
        self.bindings.read().await.len()
    }

    /// Guard the unit of work bound to `ctx` against cancellation.
    ///
    /// Hold the guard across the work between [`begin`](Self::begin) and
    /// [`end`](Self::end) and disarm it once `end` has returned. If the
    /// owning future is dropped first, the guard releases the binding and
    /// rolls the session back.
    pub fn guard(self: &Arc<Self>, ctx: &TaskContext) -> UnitOfWorkGuard {
        UnitOfWorkGuard {
            registry: Arc::clone(self),
            ctx: Some(ctx.clone()),
        }
    }
}

/// Rolls back the unit of work of a task whose future was dropped.
///
/// See [`UnitOfWorkRegistry::guard`].
#[must_use = "dropping the guard rolls back the unit of work"]
pub struct UnitOfWorkGuard {
    registry: Arc<UnitOfWorkRegistry>,
    ctx: Option<TaskContext>,
}

impl UnitOfWorkGuard {
    pub fn disarm(mut self) {
        self.ctx = None;
    }
}

impl Drop for UnitOfWorkGuard {
    fn drop(&mut self) {
        let Some(ctx) = self.ctx.take() else {
            return;
        };

        let unit = match self.registry.bindings.try_write() {
            Ok(mut bindings) => bindings.remove(&ctx.id()),
            Err(_) => {
                // Lock is busy, release the binding from a task instead
                let registry = Arc::clone(&self.registry);
                spawn_cleanup(async move {
                    if let Err(err) = registry.end(&ctx, true).await {
                        warn!(task = %ctx, error = %err, "Rollback of abandoned unit of work failed");
                    }
                });
                return;
            }
        };

        if let Some(unit) = unit {
            warn!(task = %ctx, "Unit of work abandoned, rolling back");
            let session = Arc::clone(unit.session());
            spawn_cleanup(async move { discard(&session).await });
        }
    }
}

/// Rolls back and closes a session that is no longer bound to any task if
/// dropped before being disarmed
struct SessionGuard(Option<Arc<dyn PersistenceSession>>);

impl SessionGuard {
    fn new(session: &Arc<dyn PersistenceSession>) -> Self {
        Self(Some(Arc::clone(session)))
    }

    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.0.take() {
            warn!(session = session.id(), "Session abandoned, rolling back");
            spawn_cleanup(async move { discard(&session).await });
        }
    }
}

fn spawn_cleanup<F>(cleanup: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(cleanup);
        }
        Err(_) => warn!("No runtime to roll back an abandoned session on"),
    }
}

async fn discard(session: &Arc<dyn PersistenceSession>) {
    if let Err(err) = session.rollback().await {
        warn!(session = session.id(), error = %err, "Rollback of discarded session failed");
    }
    session.close().await;
}
