use crate::config::PersistenceConfig;
use crate::core::{DialectId, InitError};

pub const HSQL_DRIVER: &str = "org.hsqldb.jdbcDriver";
pub const HSQL_DIALECT: &str = "org.hibernate.dialect.HSQLDialect";

const KNOWN_DIALECTS: &[(&str, &str)] = &[(HSQL_DRIVER, HSQL_DIALECT)];

/// Dialect for a driver the crate knows about, if any
pub fn known_dialect(driver: &str) -> Option<DialectId> {
    KNOWN_DIALECTS
        .iter()
        .find(|(known, _)| *known == driver)
        .map(|(_, dialect)| DialectId::new(*dialect))
}

/// Pick the dialect for `driver`.
///
/// Known drivers always map to their dialect, even when the configuration
/// carries an override. Other drivers need `jpa.dialect`.
///
/// # Examples
///
/// ```
/// use txscope::{PersistenceConfig, resolve_dialect};
///
/// let config = PersistenceConfig::new().dialect("com.acme.AcmeDialect");
/// let dialect = resolve_dialect("com.acme.Driver", &config).unwrap();
/// assert_eq!(dialect.as_str(), "com.acme.AcmeDialect");
///
/// assert!(resolve_dialect("com.acme.Driver", &PersistenceConfig::new()).is_err());
/// ```
pub fn resolve_dialect(driver: &str, config: &PersistenceConfig) -> Result<DialectId, InitError> {
    if let Some(dialect) = known_dialect(driver) {
        return Ok(dialect);
    }

    match config.dialect.as_deref().map(str::trim) {
        Some(dialect) if !dialect.is_empty() => Ok(DialectId::new(dialect)),
        _ => Err(InitError::UnknownDialect {
            driver: driver.to_string(),
        }),
    }
}
