// ============================================================================
// Unit of Work
// ============================================================================
//
// A unit of work is one open session plus its transaction, bound to the task
// that opened it. Tasks identify themselves with an explicit `TaskContext`.
//
// ============================================================================

pub mod context;
pub mod registry;

use crate::core::TaskId;
use crate::engine::PersistenceSession;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

pub use context::TaskContext;
pub use registry::{UnitOfWorkGuard, UnitOfWorkRegistry};

pub struct UnitOfWork {
    task: TaskId,
    session: Arc<dyn PersistenceSession>,
    readonly: bool,
    started_at: DateTime<Utc>,
}

impl UnitOfWork {
    pub(crate) fn new(task: TaskId, session: Arc<dyn PersistenceSession>, readonly: bool) -> Self {
        Self {
            task,
            session,
            readonly,
            started_at: Utc::now(),
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    /// The live session of this unit of work
    pub fn session(&self) -> &Arc<dyn PersistenceSession> {
        &self.session
    }

    /// Read-only units of work are always rolled back
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("task", &self.task)
            .field("session", &self.session.id())
            .field("readonly", &self.readonly)
            .field("started_at", &self.started_at)
            .finish()
    }
}
