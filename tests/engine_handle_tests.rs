/// Engine handle tests
///
/// Initialization, dialect selection and shutdown of the engine handle
/// Run with: cargo test --test engine_handle_tests

use std::sync::Arc;
use txscope::engine::memory::{FaultPoint, MemoryEngine};
use txscope::engine::{HSQL_DIALECT, HSQL_DRIVER};
use txscope::{
    DataSource, EngineError, EngineHandle, EntityDescriptor, InitError, NamedDataSource,
    PersistenceConfig, SchemaMode, TaskContext, TypeLoader, UnitOfWorkRegistry,
};

fn data_source() -> Option<Arc<dyn DataSource>> {
    Some(Arc::new(NamedDataSource::new("primary")))
}

fn no_entities() -> Vec<EntityDescriptor> {
    Vec::new()
}

fn handle_with(config: PersistenceConfig) -> (Arc<MemoryEngine>, Arc<EngineHandle>) {
    let engine = MemoryEngine::new();
    let handle = Arc::new(EngineHandle::new(config, Arc::new(engine.builder())));
    (engine, handle)
}

#[tokio::test]
async fn test_initialize_builds_engine_with_resolved_settings() {
    let config = PersistenceConfig::new()
        .driver(HSQL_DRIVER)
        .schema_mode(SchemaMode::CreateDrop);
    let (engine, handle) = handle_with(config);

    handle
        .initialize(vec![EntityDescriptor::entity("app.User")], data_source())
        .await
        .unwrap();

    assert!(handle.is_enabled());
    assert!(handle.is_initialized().await);

    let settings = engine.last_settings().unwrap();
    assert_eq!(settings.dialect.as_str(), HSQL_DIALECT);
    assert_eq!(settings.schema_mode, SchemaMode::CreateDrop);
    assert_eq!(settings.data_source.name(), "primary");
    assert!(settings.type_loader.is_none());
}

#[tokio::test]
async fn test_only_marked_entities_are_registered_once() {
    let (engine, handle) = handle_with(PersistenceConfig::new().driver(HSQL_DRIVER));

    let descriptors = vec![
        EntityDescriptor::entity("app.Order"),
        EntityDescriptor::plain("app.Helper"),
        EntityDescriptor::entity("app.User").table("users"),
        EntityDescriptor::entity("app.Order"),
    ];
    handle.initialize(descriptors, data_source()).await.unwrap();

    let names: Vec<String> = engine
        .last_settings()
        .unwrap()
        .entities
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["app.Order".to_string(), "app.User".to_string()]);
}

#[tokio::test]
async fn test_disabled_config_is_a_no_op() {
    let (engine, handle) = handle_with(PersistenceConfig::disabled().driver(HSQL_DRIVER));

    handle
        .initialize(vec![EntityDescriptor::entity("app.User")], data_source())
        .await
        .unwrap();

    assert!(!handle.is_enabled());
    assert!(!handle.is_initialized().await);
    assert_eq!(engine.build_count(), 0);
}

#[tokio::test]
async fn test_missing_data_source_disables_persistence() {
    let (engine, handle) = handle_with(PersistenceConfig::new().driver(HSQL_DRIVER));

    let err = handle.initialize(no_entities(), None).await.unwrap_err();
    assert!(matches!(err, InitError::NoDataSource));
    assert!(!handle.is_enabled());

    // Later calls are no-ops, even with a data source
    handle.initialize(no_entities(), data_source()).await.unwrap();
    assert_eq!(engine.build_count(), 0);

    let registry = UnitOfWorkRegistry::new(Arc::clone(&handle));
    let ctx = TaskContext::new();
    registry.begin(&ctx, false).await.unwrap();
    assert!(registry.current(&ctx).await.is_none());
    registry.end(&ctx, false).await.unwrap();
    assert_eq!(engine.sessions_opened(), 0);
}

#[tokio::test]
async fn test_unknown_dialect_disables_persistence() {
    let (engine, handle) = handle_with(PersistenceConfig::new().driver("com.unknown.Driver"));

    let err = handle.initialize(no_entities(), data_source()).await.unwrap_err();
    match err {
        InitError::UnknownDialect { driver } => assert_eq!(driver, "com.unknown.Driver"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!handle.is_enabled());
    assert_eq!(engine.build_count(), 0);
}

#[tokio::test]
async fn test_dialect_override_for_unknown_driver() {
    let config = PersistenceConfig::new()
        .driver("com.unknown.Driver")
        .dialect("X");
    let (engine, handle) = handle_with(config);

    handle.initialize(no_entities(), data_source()).await.unwrap();
    assert_eq!(engine.last_settings().unwrap().dialect.as_str(), "X");
}

#[tokio::test]
async fn test_build_failure_disables_persistence() {
    let (engine, handle) = handle_with(PersistenceConfig::new().driver(HSQL_DRIVER));
    engine.fail_on(FaultPoint::Build, true);

    let err = handle.initialize(no_entities(), data_source()).await.unwrap_err();
    assert!(matches!(err, InitError::BuildFailed(EngineError::Backend(_))));
    assert!(!handle.is_enabled());
    assert!(!handle.is_initialized().await);
}

#[tokio::test]
async fn test_initialize_twice_builds_once() {
    let (engine, handle) = handle_with(PersistenceConfig::new().driver(HSQL_DRIVER));

    handle.initialize(no_entities(), data_source()).await.unwrap();
    handle.initialize(no_entities(), data_source()).await.unwrap();

    assert_eq!(engine.build_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialize_builds_once() {
    let (engine, handle) = handle_with(PersistenceConfig::new().driver(HSQL_DRIVER));

    let mut handles = vec![];
    for _ in 0..8 {
        let handle = Arc::clone(&handle);
        handles.push(tokio::spawn(async move {
            handle
                .initialize(vec![EntityDescriptor::entity("app.User")], data_source())
                .await
        }));
    }

    for join in handles {
        join.await.unwrap().unwrap();
    }

    assert_eq!(engine.build_count(), 1);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let (engine, handle) = handle_with(PersistenceConfig::new().driver(HSQL_DRIVER));

    // Never initialized
    handle.shutdown().await;

    handle.initialize(no_entities(), data_source()).await.unwrap();
    handle.shutdown().await;
    handle.shutdown().await;

    assert!(engine.is_closed());
    assert!(!handle.is_initialized().await);
    assert!(matches!(
        handle.open_session().await,
        Err(EngineError::NotInitialized)
    ));
}

#[tokio::test]
async fn test_reinitialize_after_shutdown() {
    let (engine, handle) = handle_with(PersistenceConfig::new().driver(HSQL_DRIVER));

    handle.initialize(no_entities(), data_source()).await.unwrap();
    handle.shutdown().await;
    handle.initialize(no_entities(), data_source()).await.unwrap();

    assert_eq!(engine.build_count(), 2);
    assert!(!engine.is_closed());
    assert!(handle.open_session().await.is_ok());
}

struct Registered(Vec<&'static str>);

impl TypeLoader for Registered {
    fn resolve(&self, name: &str) -> Option<EntityDescriptor> {
        self.0
            .iter()
            .any(|known| *known == name)
            .then(|| EntityDescriptor::entity(name))
    }
}

#[tokio::test]
async fn test_type_loader_is_handed_to_engine() {
    let engine = MemoryEngine::new();
    let handle = EngineHandle::new(
        PersistenceConfig::new().driver(HSQL_DRIVER),
        Arc::new(engine.builder()),
    )
    .with_type_loader(Arc::new(Registered(vec!["app.User"])));

    handle
        .initialize(vec![EntityDescriptor::entity("app.User")], data_source())
        .await
        .unwrap();
    assert!(engine.last_settings().unwrap().type_loader.is_some());
}

#[tokio::test]
async fn test_type_loader_rejection_fails_initialization() {
    let engine = MemoryEngine::new();
    let handle = EngineHandle::new(
        PersistenceConfig::new().driver(HSQL_DRIVER),
        Arc::new(engine.builder()),
    )
    .with_type_loader(Arc::new(Registered(vec![])));

    let err = handle
        .initialize(vec![EntityDescriptor::entity("app.Ghost")], data_source())
        .await
        .unwrap_err();
    assert!(matches!(err, InitError::BuildFailed(_)));
    assert!(!handle.is_enabled());
}
