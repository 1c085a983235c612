use super::{DataSource, EngineBuilder, EngineSettings, PersistenceEngine, PersistenceSession, TypeLoader};
use super::dialect::resolve_dialect;
use crate::config::PersistenceConfig;
use crate::core::{EngineError, EntityDescriptor, InitError, TransactionType};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

/// Owner of the application's persistence engine.
///
/// Created by the composition root and shared by reference (usually an
/// `Arc`) with everything that opens units of work.
pub struct EngineHandle {
    config: PersistenceConfig,
    builder: Arc<dyn EngineBuilder>,
    type_loader: Option<Arc<dyn TypeLoader>>,
    /// Starts from the config flag, cleared for good when initialization fails
    enabled: AtomicBool,
    engine: RwLock<Option<Arc<dyn PersistenceEngine>>>,
    init_lock: Mutex<()>,
}

impl EngineHandle {
    pub fn new(config: PersistenceConfig, builder: Arc<dyn EngineBuilder>) -> Self {
        let enabled = AtomicBool::new(config.enabled);
        Self {
            config,
            builder,
            type_loader: None,
            enabled,
            engine: RwLock::new(None),
            init_lock: Mutex::new(()),
        }
    }

    /// Hand the engine an application-level type loader
    pub fn with_type_loader(mut self, loader: Arc<dyn TypeLoader>) -> Self {
        self.type_loader = Some(loader);
        self
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub async fn is_initialized(&self) -> bool {
        self.engine.read().await.is_some()
    }

    /// Build the engine from the mapped entities.
    ///
    /// Does nothing when the feature is disabled or an engine already
    /// exists. Any failure switches the feature off, so hook calls made
    /// afterwards become no-ops.
    pub async fn initialize<I>(
        &self,
        entities: I,
        data_source: Option<Arc<dyn DataSource>>,
    ) -> Result<(), InitError>
    where
        I: IntoIterator<Item = EntityDescriptor>,
    {
        if !self.is_enabled() || self.is_initialized().await {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if !self.is_enabled() || self.is_initialized().await {
            return Ok(());
        }

        match self.build_engine(entities, data_source).await {
            Ok(engine) => {
                *self.engine.write().await = Some(engine);
                Ok(())
            }
            Err(err) => {
                match &err {
                    InitError::NoDataSource => {
                        error!("Cannot enable persistence without a valid data source")
                    }
                    other => error!(error = %other, "Persistence initialization failed"),
                }
                self.enabled.store(false, Ordering::Release);
                info!("Persistence disabled");
                Err(err)
            }
        }
    }

    async fn build_engine<I>(
        &self,
        entities: I,
        data_source: Option<Arc<dyn DataSource>>,
    ) -> Result<Arc<dyn PersistenceEngine>, InitError>
    where
        I: IntoIterator<Item = EntityDescriptor>,
    {
        let data_source = data_source.ok_or(InitError::NoDataSource)?;
        self.config.validate()?;

        let driver = self.config.driver.as_deref().unwrap_or_default();
        let dialect = resolve_dialect(driver, &self.config)?;

        let mut mapped = BTreeMap::new();
        for descriptor in entities.into_iter().filter(|d| d.is_entity) {
            mapped.entry(descriptor.name.clone()).or_insert(descriptor);
        }
        for name in mapped.keys() {
            debug!(entity = %name, "Mapped entity");
        }

        let settings = EngineSettings {
            data_source,
            schema_mode: self.config.schema_mode,
            dialect,
            transaction_type: TransactionType::ResourceLocal,
            entities: mapped.into_values().collect(),
            type_loader: self.type_loader.clone(),
        };

        info!(
            data_source = settings.data_source.name(),
            dialect = %settings.dialect,
            schema_mode = %settings.schema_mode,
            entities = settings.entities.len(),
            "Initializing persistence"
        );

        self.builder
            .build(settings)
            .await
            .map_err(InitError::BuildFailed)
    }

    /// Open a raw session outside of any unit of work
    pub async fn open_session(&self) -> Result<Arc<dyn PersistenceSession>, EngineError> {
        let engine = self
            .engine
            .read()
            .await
            .clone()
            .ok_or(EngineError::NotInitialized)?;
        engine.open_session().await
    }

    /// Close the engine if there is one. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let engine = self.engine.write().await.take();
        if let Some(engine) = engine {
            engine.close().await;
            info!("Persistence engine closed");
        }
    }
}
