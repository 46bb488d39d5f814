//! Identities for components, message copies and flows.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a static pipeline component, assigned when the pipeline is built.
///
/// Repeated executions of the same component share the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Creates a component id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh id for a component built without an explicit one.
    #[must_use]
    pub fn generate(name: &str) -> Self {
        Self(format!("{name}#{}", Uuid::new_v4().simple()))
    }

    /// Derives the id of a child component from its parent's id and position.
    #[must_use]
    pub fn child(&self, position: usize, name: &str) -> Self {
        Self(format!("{}@{position}:{name}", self.0))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity of one in-flight message copy.
///
/// Derived from the runtime identity of the copy, never from its content.
/// Only compared and hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContextId(Uuid);

impl ExecutionContextId {
    /// Generates a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ExecutionContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a top-level message flow, shared by every copy split from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(Uuid);

impl FlowId {
    /// Generates a fresh flow id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_child() {
        let root = ComponentId::new("OrderProxy");
        let child = root.child(2, "call");
        assert_eq!(child.as_str(), "OrderProxy@2:call");
        assert_eq!(child.child(0, "log").to_string(), "OrderProxy@2:call@0:log");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ComponentId::generate("log");
        let b = ComponentId::generate("log");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("log#"));
    }

    #[test]
    fn test_execution_ids_are_unique() {
        let a = ExecutionContextId::new();
        let b = ExecutionContextId::new();
        assert_ne!(a, b);
        assert_eq!(a, ExecutionContextId::from_uuid(a.as_uuid()));
    }

    #[test]
    fn test_component_id_serializes_as_string() {
        let id = ComponentId::from("main");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""main""#);
    }
}
