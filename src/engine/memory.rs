//! In-process engine that performs no storage and records what its
//! sessions were asked to do.
//!
//! Useful for exercising transaction demarcation without a database, and
//! for asserting on commit/rollback decisions in tests.

use super::{EngineBuilder, EngineSettings, PersistenceEngine, PersistenceSession};
use crate::core::EngineError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    Opened,
    Begun,
    Committed,
    RolledBack,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: u64,
    pub kind: SessionEventKind,
}

/// Operations that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Build,
    Open,
    Begin,
    Commit,
    Rollback,
}

#[derive(Default)]
struct Faults {
    build: AtomicBool,
    open: AtomicBool,
    begin: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
}

impl Faults {
    fn flag(&self, point: FaultPoint) -> &AtomicBool {
        match point {
            FaultPoint::Build => &self.build,
            FaultPoint::Open => &self.open,
            FaultPoint::Begin => &self.begin,
            FaultPoint::Commit => &self.commit,
            FaultPoint::Rollback => &self.rollback,
        }
    }

    fn check(&self, point: FaultPoint) -> Result<(), EngineError> {
        if self.flag(point).load(Ordering::SeqCst) {
            return Err(EngineError::Backend(format!("injected {:?} failure", point)));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Shared {
    journal: Mutex<Vec<SessionEvent>>,
    faults: Faults,
}

impl Shared {
    fn journal(&self) -> MutexGuard<'_, Vec<SessionEvent>> {
        // The journal is append-only, a poisoned lock still holds valid events
        self.journal.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, session: u64, kind: SessionEventKind) {
        self.journal().push(SessionEvent { session, kind });
    }
}

/// Recording engine
pub struct MemoryEngine {
    shared: Arc<Shared>,
    next_session: AtomicU64,
    builds: AtomicUsize,
    closed: AtomicBool,
    settings: Mutex<Option<EngineSettings>>,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared::default()),
            next_session: AtomicU64::new(1),
            builds: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            settings: Mutex::new(None),
        })
    }

    /// Builder that hands out this engine
    pub fn builder(self: &Arc<Self>) -> MemoryEngineBuilder {
        MemoryEngineBuilder {
            engine: Arc::clone(self),
        }
    }

    pub fn fail_on(&self, point: FaultPoint, fail: bool) {
        self.shared.faults.flag(point).store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.shared.journal().clone()
    }

    /// Event kinds recorded for one session, in order
    pub fn events_for(&self, session: u64) -> Vec<SessionEventKind> {
        self.shared
            .journal()
            .iter()
            .filter(|e| e.session == session)
            .map(|e| e.kind)
            .collect()
    }

    fn count(&self, kind: SessionEventKind) -> usize {
        self.shared.journal().iter().filter(|e| e.kind == kind).count()
    }

    pub fn commits(&self) -> usize {
        self.count(SessionEventKind::Committed)
    }

    pub fn rollbacks(&self) -> usize {
        self.count(SessionEventKind::RolledBack)
    }

    pub fn sessions_opened(&self) -> usize {
        self.count(SessionEventKind::Opened)
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.sessions_opened() - self.count(SessionEventKind::Closed)
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Settings of the most recent successful build
    pub fn last_settings(&self) -> Option<EngineSettings> {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl PersistenceEngine for MemoryEngine {
    async fn open_session(&self) -> Result<Arc<dyn PersistenceSession>, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        self.shared.faults.check(FaultPoint::Open)?;

        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        self.shared.record(id, SessionEventKind::Opened);

        Ok(Arc::new(MemorySession {
            id,
            shared: Arc::clone(&self.shared),
            state: Mutex::new(SessionState::Idle),
        }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MemoryEngineBuilder {
    engine: Arc<MemoryEngine>,
}

#[async_trait]
impl EngineBuilder for MemoryEngineBuilder {
    async fn build(&self, settings: EngineSettings) -> Result<Arc<dyn PersistenceEngine>, EngineError> {
        self.engine.shared.faults.check(FaultPoint::Build)?;

        if let Some(loader) = &settings.type_loader {
            if let Some(missing) = settings
                .entities
                .iter()
                .find(|e| loader.resolve(&e.name).is_none())
            {
                return Err(EngineError::Backend(format!(
                    "entity type '{}' cannot be loaded",
                    missing.name
                )));
            }
        }

        *self
            .engine
            .settings
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(settings);
        self.engine.closed.store(false, Ordering::SeqCst);
        self.engine.builds.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::clone(&self.engine) as Arc<dyn PersistenceEngine>)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    InTransaction,
    Closed,
}

struct MemorySession {
    id: u64,
    shared: Arc<Shared>,
    state: Mutex<SessionState>,
}

impl MemorySession {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish(&self, point: FaultPoint, kind: SessionEventKind) -> Result<(), EngineError> {
        let mut state = self.state();
        match *state {
            SessionState::Closed => return Err(EngineError::Closed),
            SessionState::Idle => {
                return Err(EngineError::Backend("No active transaction".into()));
            }
            SessionState::InTransaction => {}
        }

        self.shared.faults.check(point)?;
        *state = SessionState::Idle;
        self.shared.record(self.id, kind);
        Ok(())
    }
}

#[async_trait]
impl PersistenceSession for MemorySession {
    fn id(&self) -> u64 {
        self.id
    }

    async fn begin(&self) -> Result<(), EngineError> {
        let mut state = self.state();
        match *state {
            SessionState::Closed => return Err(EngineError::Closed),
            SessionState::InTransaction => {
                return Err(EngineError::Backend("Transaction already active".into()));
            }
            SessionState::Idle => {}
        }

        self.shared.faults.check(FaultPoint::Begin)?;
        *state = SessionState::InTransaction;
        self.shared.record(self.id, SessionEventKind::Begun);
        Ok(())
    }

    async fn commit(&self) -> Result<(), EngineError> {
        self.finish(FaultPoint::Commit, SessionEventKind::Committed)
    }

    async fn rollback(&self) -> Result<(), EngineError> {
        self.finish(FaultPoint::Rollback, SessionEventKind::RolledBack)
    }

    async fn close(&self) {
        let mut state = self.state();
        if *state != SessionState::Closed {
            *state = SessionState::Closed;
            self.shared.record(self.id, SessionEventKind::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DialectId, EntityDescriptor, SchemaMode, TransactionType};
    use crate::engine::{NamedDataSource, TypeLoader};

    fn settings() -> EngineSettings {
        EngineSettings {
            data_source: Arc::new(NamedDataSource::new("mem")),
            schema_mode: SchemaMode::Update,
            dialect: DialectId::new("test"),
            transaction_type: TransactionType::ResourceLocal,
            entities: vec![EntityDescriptor::entity("app.User")],
            type_loader: None,
        }
    }

    #[test]
    fn test_session_lifecycle_is_recorded() {
        tokio_test::block_on(async {
            let engine = MemoryEngine::new();
            let session = engine.open_session().await.unwrap();

            session.begin().await.unwrap();
            session.commit().await.unwrap();
            session.close().await;
            session.close().await;

            assert_eq!(
                engine.events_for(session.id()),
                vec![
                    SessionEventKind::Opened,
                    SessionEventKind::Begun,
                    SessionEventKind::Committed,
                    SessionEventKind::Closed,
                ]
            );
            assert_eq!(engine.open_sessions(), 0);
        });
    }

    #[test]
    fn test_commit_without_transaction_fails() {
        tokio_test::block_on(async {
            let engine = MemoryEngine::new();
            let session = engine.open_session().await.unwrap();
            assert!(session.commit().await.is_err());
            assert_eq!(engine.commits(), 0);
        });
    }

    #[test]
    fn test_injected_commit_fault_keeps_transaction_open() {
        tokio_test::block_on(async {
            let engine = MemoryEngine::new();
            engine.fail_on(FaultPoint::Commit, true);

            let session = engine.open_session().await.unwrap();
            session.begin().await.unwrap();
            assert!(matches!(session.commit().await, Err(EngineError::Backend(_))));

            session.rollback().await.unwrap();
            assert_eq!(engine.rollbacks(), 1);
        });
    }

    #[test]
    fn test_closed_engine_refuses_sessions() {
        tokio_test::block_on(async {
            let engine = MemoryEngine::new();
            engine.close().await;
            assert!(matches!(engine.open_session().await, Err(EngineError::Closed)));
        });
    }

    struct OnlyUsers;

    impl TypeLoader for OnlyUsers {
        fn resolve(&self, name: &str) -> Option<EntityDescriptor> {
            (name == "app.User").then(|| EntityDescriptor::entity(name))
        }
    }

    #[test]
    fn test_builder_checks_entities_against_loader() {
        tokio_test::block_on(async {
            let engine = MemoryEngine::new();
            let builder = engine.builder();

            let mut with_loader = settings();
            with_loader.type_loader = Some(Arc::new(OnlyUsers));
            assert!(builder.build(with_loader.clone()).await.is_ok());

            with_loader.entities.push(EntityDescriptor::entity("app.Order"));
            assert!(builder.build(with_loader).await.is_err());
            assert_eq!(engine.build_count(), 1);
        });
    }
}
