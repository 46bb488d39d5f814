//! Mediators without children.

use super::{MediationScope, Mediator};
use crate::core::{ComponentId, ComponentKind, MediatorKind};
use crate::errors::MediationError;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Logs a message with the current payload.
#[derive(Debug)]
pub struct LogMediator {
    id: ComponentId,
    message: String,
    level: Level,
}

impl LogMediator {
    /// Creates a log mediator.
    #[must_use]
    pub fn new(message: impl Into<String>, level: Level) -> Self {
        Self {
            id: ComponentId::generate("log"),
            message: message.into(),
            level,
        }
    }

    /// Creates a log mediator logging at INFO.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, Level::INFO)
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }
}

impl Mediator for LogMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        "log"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Log)
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        let message_id = scope.message().execution_id();
        let payload = scope.message().payload();
        match self.level {
            Level::ERROR | Level::WARN => warn!(%message_id, %payload, "{}", self.message),
            Level::INFO => info!(%message_id, %payload, "{}", self.message),
            _ => debug!(%message_id, %payload, "{}", self.message),
        }
        Ok(true)
    }
}

/// Sets a message property.
#[derive(Debug)]
pub struct PropertyMediator {
    id: ComponentId,
    key: String,
    value: Value,
}

impl PropertyMediator {
    /// Creates a mediator setting `key` to `value`.
    #[must_use]
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Self {
            id: ComponentId::generate("property"),
            key: key.into(),
            value,
        }
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }
}

impl Mediator for PropertyMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.key
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Property)
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        scope
            .message()
            .set_property(self.key.clone(), self.value.clone());
        Ok(true)
    }
}
