//! Outbound calls.

use super::{MediationScope, Mediator};
use crate::core::{ComponentId, ComponentKind, MediatorKind};
use crate::engine::{PendingCall, PendingKind};
use crate::errors::MediationError;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

fn park(
    scope: &MediationScope<'_>,
    endpoint_id: &ComponentId,
    endpoint: &str,
    kind: PendingKind,
) {
    let endpoint_index =
        scope.open_component(endpoint_id, ComponentKind::Endpoint, endpoint, false);
    if kind == PendingKind::Send {
        // later siblings must not nest under the outstanding request
        if let Some(index) = endpoint_index {
            scope.message().remove_flow_index(index);
        }
    }
    scope.pending().park(PendingCall {
        message: Arc::clone(scope.message()),
        endpoint: endpoint.to_string(),
        endpoint_index,
        kind,
        parked_at: Utc::now(),
    });
    debug!(
        message_id = %scope.message().execution_id(),
        endpoint,
        kind = %kind,
        "Parked message for endpoint"
    );
}

/// Calls an endpoint and suspends the message until the response arrives.
#[derive(Debug)]
pub struct CallMediator {
    id: ComponentId,
    endpoint: String,
    endpoint_id: ComponentId,
}

impl CallMediator {
    /// Creates a call to `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let id = ComponentId::generate("call");
        let endpoint_id = id.child(0, &endpoint);
        Self {
            id,
            endpoint,
            endpoint_id,
        }
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self.endpoint_id = self.id.child(0, &self.endpoint);
        self
    }

    /// Returns the endpoint name.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Mediator for CallMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        "call"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Call)
    }

    fn is_flow_continuable(&self) -> bool {
        true
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        park(scope, &self.endpoint_id, &self.endpoint, PendingKind::Call);
        Ok(false)
    }
}

/// Sends a message to an endpoint and keeps mediating; the response is
/// handled by the out-sequence of the entry artifact.
#[derive(Debug)]
pub struct SendMediator {
    id: ComponentId,
    endpoint: String,
    endpoint_id: ComponentId,
}

impl SendMediator {
    /// Creates a send to `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let id = ComponentId::generate("send");
        let endpoint_id = id.child(0, &endpoint);
        Self {
            id,
            endpoint,
            endpoint_id,
        }
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self.endpoint_id = self.id.child(0, &self.endpoint);
        self
    }
}

impl Mediator for SendMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        "send"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Send)
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        park(scope, &self.endpoint_id, &self.endpoint, PendingKind::Send);
        Ok(true)
    }
}
