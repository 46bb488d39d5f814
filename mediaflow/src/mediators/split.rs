//! Mediators that split a message into copies.

use super::{MediationScope, Mediator, Resumable, Sequence};
use crate::context::MessageContext;
use crate::continuation::ContinuationNode;
use crate::core::{ComponentId, ComponentKind, MediatorKind};
use crate::errors::{ContinuationError, MediationError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Property holding the position of a copy among its siblings.
pub const ITERATION_PROPERTY: &str = "iteration.index";

const BODY_BRANCH: u32 = 0;

/// Returns the items found at `pointer` (or the payload root).
///
/// A value that is not an array is treated as a single item.
fn split_items(payload: &Value, pointer: Option<&str>) -> Vec<Value> {
    let target = match pointer {
        Some(pointer) => payload.pointer(pointer),
        None => Some(payload),
    };
    match target {
        Some(Value::Array(items)) => items.clone(),
        Some(item) => vec![item.clone()],
        None => Vec::new(),
    }
}

/// Writes `items` back at `pointer` (or replaces the payload root).
fn merge_items(payload: &mut Value, pointer: Option<&str>, items: Vec<Value>) {
    let merged = Value::Array(items);
    match pointer.and_then(|pointer| payload.pointer_mut(pointer)) {
        Some(slot) => *slot = merged,
        None if pointer.is_some() => {
            warn!(pointer = ?pointer, "Split path missing on merge; replacing payload");
            *payload = merged;
        }
        None => *payload = merged,
    }
}

fn copy_for(message: &MessageContext, item: Value, index: usize) -> Arc<MessageContext> {
    let copy = message.split_copy();
    copy.set_payload(item);
    copy.set_property(ITERATION_PROPERTY, Value::from(index));
    Arc::new(copy)
}

/// Splits the payload into items and mediates every item in its own message
/// copy. Each copy carries a deep clone of the continuation stack so it can
/// suspend and resume independently of its siblings.
#[derive(Debug)]
pub struct IterateMediator {
    id: ComponentId,
    items_at: Option<String>,
    continue_parent: bool,
    body: Arc<Sequence>,
}

impl IterateMediator {
    /// Creates an iterate over the payload root.
    #[must_use]
    pub fn new(body: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            id: ComponentId::generate("iterate"),
            items_at: None,
            continue_parent: false,
            body: Arc::new(Sequence::anonymous(body)),
        }
    }

    /// Splits the array found at a JSON pointer instead of the root.
    #[must_use]
    pub fn with_items_at(mut self, pointer: impl Into<String>) -> Self {
        self.items_at = Some(pointer.into());
        self
    }

    /// Lets the original message continue after the copies have been dispatched.
    #[must_use]
    pub fn with_continue_parent(mut self, continue_parent: bool) -> Self {
        self.continue_parent = continue_parent;
        self
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }
}

impl Mediator for IterateMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        "iterate"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Iterate)
    }

    fn is_flow_continuable(&self) -> bool {
        true
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        let message = scope.message();
        let items = split_items(&message.payload(), self.items_at.as_deref());
        debug!(
            message_id = %message.execution_id(),
            copies = items.len(),
            "Iterating message"
        );

        for (index, item) in items.into_iter().enumerate() {
            let copy = copy_for(message, item, index);
            let copy_scope = scope.for_message(&copy);
            scope
                .stacks()
                .add_sub_branch(&copy, BODY_BRANCH, scope.position());
            if self.body.mediate(&copy_scope)? {
                copy_scope.abandon();
            }
        }

        if self.continue_parent {
            return Ok(true);
        }
        scope.abandon();
        Ok(false)
    }

    fn as_resumable(&self) -> Option<&dyn Resumable> {
        Some(self)
    }

    fn structural_children(&self) -> Vec<Arc<dyn Mediator>> {
        vec![self.body.clone()]
    }
}

impl Resumable for IterateMediator {
    /// Resumes a copy inside the body. A copy never continues past the
    /// iterate, so this always stops the unwinding; a copy that ran the body
    /// to the end is abandoned, which marks it finished.
    fn resume(
        &self,
        scope: &MediationScope<'_>,
        node: &ContinuationNode,
    ) -> Result<bool, MediationError> {
        if node.branch_id() != Some(BODY_BRANCH) {
            return Err(ContinuationError::new("iterate", scope.position(), "expected the body branch").into());
        }
        if self.body.resume(scope, node)? {
            scope.abandon();
        }
        Ok(false)
    }
}

/// Mediates every item in a copy, one after another, and collects the
/// resulting payloads back onto the original message.
///
/// Bodies must complete without suspending.
#[derive(Debug)]
pub struct ForeachMediator {
    id: ComponentId,
    items_at: Option<String>,
    body: Arc<Sequence>,
}

impl ForeachMediator {
    /// Creates a foreach over the payload root.
    #[must_use]
    pub fn new(body: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            id: ComponentId::generate("foreach"),
            items_at: None,
            body: Arc::new(Sequence::anonymous(body)),
        }
    }

    /// Iterates the array found at a JSON pointer instead of the root.
    #[must_use]
    pub fn with_items_at(mut self, pointer: impl Into<String>) -> Self {
        self.items_at = Some(pointer.into());
        self
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }
}

impl Mediator for ForeachMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        "foreach"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Foreach)
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        let message = scope.message();
        let mut payload = message.payload();
        let items = split_items(&payload, self.items_at.as_deref());
        let mut results = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let copy = copy_for(message, item, index);
            let copy_scope = scope.for_message(&copy);
            scope
                .stacks()
                .add_sub_branch(&copy, BODY_BRANCH, scope.position());
            if !self.body.mediate(&copy_scope)? {
                scope.pending().take(copy.execution_id());
                copy_scope.abandon();
                return Err(ContinuationError::new("foreach", index, "foreach bodies cannot suspend").into());
            }
            results.push(copy.payload());
            copy_scope.abandon();
        }

        merge_items(&mut payload, self.items_at.as_deref(), results);
        message.set_payload(payload);
        Ok(true)
    }

    fn structural_children(&self) -> Vec<Arc<dyn Mediator>> {
        vec![self.body.clone()]
    }
}
