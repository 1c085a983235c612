use crate::core::TaskId;
use std::fmt;
use std::sync::Arc;

/// Identity of the running request or task.
///
/// Created once per task and passed explicitly to every unit-of-work call.
/// Clones share the same identity.
#[derive(Clone, PartialEq, Eq)]
pub struct TaskContext {
    id: TaskId,
    label: Option<Arc<str>>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self {
            id: TaskId::new(),
            label: None,
        }
    }

    /// Context with a diagnostic label such as `"GET /users"`
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            label: Some(Arc::from(label.into())),
        }
    }

    /// Context for an existing task identity
    pub fn with_id(id: TaskId) -> Self {
        Self { id, label: None }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("label", &self.label())
            .finish()
    }
}

impl fmt::Display for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "{} ({})", self.id, label),
            None => write!(f, "{}", self.id),
        }
    }
}
