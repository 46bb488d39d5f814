//! Mock mediators for testing.

use parking_lot::Mutex;
use serde_json::Value;

use crate::core::{ComponentId, ComponentKind, MediatorKind};
use crate::errors::MediationError;
use crate::mediators::{MediationScope, Mediator};

/// A mediator that records the payload of every message it sees.
#[derive(Debug)]
pub struct CountingMediator {
    id: ComponentId,
    name: String,
    seen: Mutex<Vec<Value>>,
}

impl CountingMediator {
    /// Creates a new counting mediator.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: ComponentId::new(format!("count:{name}")),
            name,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of times the mediator ran.
    #[must_use]
    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    /// Returns the payloads seen, in order.
    #[must_use]
    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.seen.lock().clear();
    }
}

impl Mediator for CountingMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Log)
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        self.seen.lock().push(scope.message().payload());
        Ok(true)
    }
}

/// A flow continuable mediator that suspends every message without parking
/// it anywhere; tests resume the message directly.
#[derive(Debug)]
pub struct SuspendingMediator {
    id: ComponentId,
    name: String,
    suspended: Mutex<usize>,
}

impl SuspendingMediator {
    /// Creates a new suspending mediator.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: ComponentId::new(format!("suspend:{name}")),
            name,
            suspended: Mutex::new(0),
        }
    }

    /// Returns how many messages suspended here.
    #[must_use]
    pub fn suspended(&self) -> usize {
        *self.suspended.lock()
    }
}

impl Mediator for SuspendingMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Call)
    }

    fn is_flow_continuable(&self) -> bool {
        true
    }

    fn mediate(&self, _scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        *self.suspended.lock() += 1;
        Ok(false)
    }
}
