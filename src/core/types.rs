use super::InitError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of one logical task (request, job, fiber).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier selecting SQL-generation rules for a database product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialectId(String);

impl DialectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DialectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mapped type offered to the engine at initialization.
///
/// Discovery is the caller's business; only descriptors carrying the
/// entity marker are registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub table: Option<String>,
    pub is_entity: bool,
}

impl EntityDescriptor {
    /// Descriptor for a mapped entity
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            is_entity: true,
        }
    }

    /// Descriptor for a type without the entity marker
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            is_entity: false,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// Schema maintenance performed by the engine at startup (`jpa.ddl`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaMode {
    #[default]
    Update,
    Create,
    CreateDrop,
    Validate,
    None,
}

impl SchemaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaMode::Update => "update",
            SchemaMode::Create => "create",
            SchemaMode::CreateDrop => "create-drop",
            SchemaMode::Validate => "validate",
            SchemaMode::None => "none",
        }
    }
}

impl FromStr for SchemaMode {
    type Err = InitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(SchemaMode::Update),
            "create" => Ok(SchemaMode::Create),
            "create-drop" => Ok(SchemaMode::CreateDrop),
            "validate" => Ok(SchemaMode::Validate),
            "none" => Ok(SchemaMode::None),
            other => Err(InitError::InvalidConfig(format!(
                "unknown schema mode '{}' for jpa.ddl",
                other
            ))),
        }
    }
}

impl fmt::Display for SchemaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How transactions are demarcated. Units of work always drive their own
/// transactions, so only resource-local demarcation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionType {
    #[default]
    ResourceLocal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mode_parse() {
        assert_eq!("update".parse::<SchemaMode>().unwrap(), SchemaMode::Update);
        assert_eq!(" Create-Drop ".parse::<SchemaMode>().unwrap(), SchemaMode::CreateDrop);
        assert_eq!("none".parse::<SchemaMode>().unwrap(), SchemaMode::None);
        assert!(matches!(
            "drop-everything".parse::<SchemaMode>(),
            Err(InitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_entity_descriptor_builders() {
        let user = EntityDescriptor::entity("app.User").table("users");
        assert!(user.is_entity);
        assert_eq!(user.table.as_deref(), Some("users"));
        assert!(!EntityDescriptor::plain("app.Helper").is_entity);
    }
}
