use crate::core::InitError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat string key/value configuration, in the shape application
/// frameworks hand to their plugins (`jpa.ddl = update`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigBag {
    properties: BTreeMap<String, String>,
}

impl ConfigBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat JSON object.
    ///
    /// Strings are taken as-is, booleans and numbers are stringified and
    /// `null` entries are skipped. Nested values are rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use txscope::ConfigBag;
    ///
    /// let bag = ConfigBag::from_json_str(r#"{"jpa": true, "jpa.ddl": "create"}"#).unwrap();
    /// assert_eq!(bag.get("jpa"), Some("true"));
    /// assert_eq!(bag.get("jpa.ddl"), Some("create"));
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, InitError> {
        let raw: BTreeMap<String, Value> = serde_json::from_str(json)
            .map_err(|e| InitError::InvalidConfig(format!("config is not a JSON object: {}", e)))?;

        let mut bag = Self::new();
        for (key, value) in raw {
            match value {
                Value::Null => {}
                Value::String(s) => bag.set(key, s),
                Value::Bool(b) => bag.set(key, b.to_string()),
                Value::Number(n) => bag.set(key, n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(InitError::InvalidConfig(format!(
                        "property '{}' must be a scalar value",
                        key
                    )));
                }
            }
        }
        Ok(bag)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Value for `key`, or `default` when absent
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Builder-style `set`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigBag
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.set(k, v);
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_default() {
        let bag = ConfigBag::new().with("jpa.ddl", "create");
        assert_eq!(bag.get_or("jpa.ddl", "update"), "create");
        assert_eq!(bag.get_or("jpa.dialect", "fallback"), "fallback");
    }

    #[test]
    fn test_from_json_scalars() {
        let bag = ConfigBag::from_json_str(
            r#"{"jpa": "enabled", "db.pool": 5, "db.ssl": false, "jpa.dialect": null}"#,
        )
        .unwrap();

        assert_eq!(bag.get("jpa"), Some("enabled"));
        assert_eq!(bag.get("db.pool"), Some("5"));
        assert_eq!(bag.get("db.ssl"), Some("false"));
        assert!(!bag.contains("jpa.dialect"));
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn test_from_json_rejects_nested() {
        let err = ConfigBag::from_json_str(r#"{"jpa": {"ddl": "update"}}"#).unwrap_err();
        assert!(matches!(err, InitError::InvalidConfig(_)));

        assert!(ConfigBag::from_json_str("[1, 2]").is_err());
    }

    #[test]
    fn test_from_iterator() {
        let bag: ConfigBag = vec![("jpa", "enabled"), ("db.driver", "org.hsqldb.jdbcDriver")]
            .into_iter()
            .collect();
        assert_eq!(bag.get("db.driver"), Some("org.hsqldb.jdbcDriver"));
    }
}
