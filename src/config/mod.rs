pub mod bag;

use crate::core::{InitError, SchemaMode};
pub use bag::ConfigBag;

/// Feature flag key. Any boolean-like "on" value enables persistence.
pub const KEY_ENABLED: &str = "jpa";
/// Schema maintenance mode key
pub const KEY_DDL: &str = "jpa.ddl";
/// Dialect override key, consulted for drivers without a known dialect
pub const KEY_DIALECT: &str = "jpa.dialect";
/// Driver name used for dialect resolution
pub const KEY_DRIVER: &str = "db.driver";

/// Typed persistence configuration
///
/// Parsed from a [`ConfigBag`] or assembled with the builder methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Whether the persistence feature is switched on
    pub enabled: bool,

    /// Schema maintenance performed by the engine at startup
    pub schema_mode: SchemaMode,

    /// Explicit dialect for drivers without a known dialect
    pub dialect: Option<String>,

    /// Driver name of the configured data source
    pub driver: Option<String>,
}

impl PersistenceConfig {
    /// Create an enabled configuration with default settings
    pub fn new() -> Self {
        Self {
            enabled: true,
            schema_mode: SchemaMode::Update,
            dialect: None,
            driver: None,
        }
    }

    /// Create a configuration with the feature switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Read the persistence keys out of a configuration bag
    ///
    /// # Examples
    ///
    /// ```
    /// use txscope::{ConfigBag, PersistenceConfig, SchemaMode};
    ///
    /// let bag = ConfigBag::new()
    ///     .with("jpa", "enabled")
    ///     .with("db.driver", "org.hsqldb.jdbcDriver");
    ///
    /// let config = PersistenceConfig::from_bag(&bag).unwrap();
    /// assert!(config.enabled);
    /// assert_eq!(config.schema_mode, SchemaMode::Update);
    /// ```
    pub fn from_bag(bag: &ConfigBag) -> Result<Self, InitError> {
        let enabled = bag.get(KEY_ENABLED).map(is_truthy).unwrap_or(false);
        // jpa.ddl is only consulted when the feature is on
        let schema_mode = match bag.get_or(KEY_DDL, "update").parse::<SchemaMode>() {
            Ok(mode) => mode,
            Err(_) if !enabled => SchemaMode::default(),
            Err(err) => return Err(err),
        };

        Ok(Self {
            enabled,
            schema_mode,
            dialect: non_blank(bag.get(KEY_DIALECT)),
            driver: non_blank(bag.get(KEY_DRIVER)),
        })
    }

    /// Write the persistence keys back into a bag
    pub fn to_bag(&self) -> ConfigBag {
        let mut bag = ConfigBag::new()
            .with(KEY_ENABLED, if self.enabled { "enabled" } else { "disabled" })
            .with(KEY_DDL, self.schema_mode.as_str());
        if let Some(dialect) = &self.dialect {
            bag.set(KEY_DIALECT, dialect.as_str());
        }
        if let Some(driver) = &self.driver {
            bag.set(KEY_DRIVER, driver.as_str());
        }
        bag
    }

    /// Switch the feature on or off
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the schema mode
    pub fn schema_mode(mut self, mode: SchemaMode) -> Self {
        self.schema_mode = mode;
        self
    }

    /// Set the dialect override
    pub fn dialect(mut self, dialect: &str) -> Self {
        self.dialect = Some(dialect.to_string());
        self
    }

    /// Set the driver name
    pub fn driver(mut self, driver: &str) -> Self {
        self.driver = Some(driver.to_string());
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), InitError> {
        if self.dialect.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(InitError::InvalidConfig("jpa.dialect cannot be blank".into()));
        }

        if self.driver.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(InitError::InvalidConfig("db.driver cannot be blank".into()));
        }

        Ok(())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "enabled" | "true" | "on" | "yes" | "1"
    )
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
