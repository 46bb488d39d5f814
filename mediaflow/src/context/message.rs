//! The per-copy message context.

use crate::continuation::ContinuationStack;
use crate::core::{ExecutionContextId, FlowId};
use crate::observability::SpanStore;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The artifact a message entered the engine through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Proxy service name.
    pub proxy: Option<String>,
    /// API name.
    pub api: Option<String>,
    /// API resource name.
    pub resource: Option<String>,
}

/// One in-flight message copy.
///
/// Shared as `Arc<MessageContext>`; it moves between workers across a
/// suspension, so all mutable state sits behind locks.
#[derive(Debug)]
pub struct MessageContext {
    execution_id: ExecutionContextId,
    flow_id: FlowId,
    origin: Option<ExecutionContextId>,
    continuation: ContinuationStack,
    continuation_enabled: bool,
    span_store: Option<Arc<SpanStore>>,
    entry: EntryPoint,
    payload: RwLock<serde_json::Value>,
    properties: RwLock<HashMap<String, serde_json::Value>>,
    parent_chain: Mutex<Vec<u32>>,
    fault: RwLock<Option<String>>,
    finished: AtomicBool,
}

impl MessageContext {
    /// Creates a message for a new flow with continuation tracking enabled and tracing off.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            execution_id: ExecutionContextId::new(),
            flow_id: FlowId::new(),
            origin: None,
            continuation: ContinuationStack::new(),
            continuation_enabled: true,
            span_store: None,
            entry: EntryPoint::default(),
            payload: RwLock::new(payload),
            properties: RwLock::new(HashMap::new()),
            parent_chain: Mutex::new(Vec::new()),
            fault: RwLock::new(None),
            finished: AtomicBool::new(false),
        }
    }

    /// Sets the flow id.
    #[must_use]
    pub fn with_flow_id(mut self, flow_id: FlowId) -> Self {
        self.flow_id = flow_id;
        self
    }

    /// Enables or disables continuation tracking.
    #[must_use]
    pub fn with_continuation(mut self, enabled: bool) -> Self {
        self.continuation_enabled = enabled;
        self
    }

    /// Attaches the span store of the flow, enabling tracing for this message.
    #[must_use]
    pub fn with_span_store(mut self, store: Arc<SpanStore>) -> Self {
        self.span_store = Some(store);
        self
    }

    /// Marks the message as received by a proxy service.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.entry.proxy = Some(proxy.into());
        self
    }

    /// Marks the message as received by an API resource.
    #[must_use]
    pub fn with_api(mut self, api: impl Into<String>, resource: impl Into<String>) -> Self {
        self.entry.api = Some(api.into());
        self.entry.resource = Some(resource.into());
        self
    }

    /// Replaces the continuation stack, e.g. with one restored for this message.
    #[must_use]
    pub fn with_continuation_stack(mut self, stack: ContinuationStack) -> Self {
        self.continuation = stack;
        self
    }

    /// Returns the identity of this copy.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionContextId {
        self.execution_id
    }

    /// Returns the flow this copy belongs to.
    #[must_use]
    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Returns the identity of the copy this one was split from.
    #[must_use]
    pub fn origin(&self) -> Option<ExecutionContextId> {
        self.origin
    }

    /// Returns the continuation stack.
    #[must_use]
    pub fn continuation(&self) -> &ContinuationStack {
        &self.continuation
    }

    /// Returns true if continuation state is recorded for this message.
    #[must_use]
    pub fn is_continuation_enabled(&self) -> bool {
        self.continuation_enabled
    }

    /// Returns true if spans are recorded for this message.
    #[must_use]
    pub fn is_tracing_enabled(&self) -> bool {
        self.span_store.is_some()
    }

    /// Returns the flow's span store.
    #[must_use]
    pub fn span_store(&self) -> Option<&Arc<SpanStore>> {
        self.span_store.as_ref()
    }

    /// Returns the entry point.
    #[must_use]
    pub fn entry(&self) -> &EntryPoint {
        &self.entry
    }

    /// Returns a copy of the payload.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        self.payload.read().clone()
    }

    /// Replaces the payload.
    pub fn set_payload(&self, payload: serde_json::Value) {
        *self.payload.write() = payload;
    }

    /// Gets a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<serde_json::Value> {
        self.properties.read().get(key).cloned()
    }

    /// Sets a property, overwriting any previous value.
    pub fn set_property(&self, key: impl Into<String>, value: serde_json::Value) {
        self.properties.write().insert(key.into(), value);
    }

    /// Flow index of the innermost open span of this message.
    #[must_use]
    pub fn current_flow_index(&self) -> Option<u32> {
        self.parent_chain.lock().last().copied()
    }

    /// Flow indices of the open spans of this message, outermost first.
    #[must_use]
    pub fn parent_chain(&self) -> Vec<u32> {
        self.parent_chain.lock().clone()
    }

    /// Pushes a newly opened span.
    pub fn push_flow_index(&self, flow_index: u32) {
        self.parent_chain.lock().push(flow_index);
    }

    /// Removes the innermost occurrence of `flow_index`. Returns false if absent.
    pub fn remove_flow_index(&self, flow_index: u32) -> bool {
        let mut chain = self.parent_chain.lock();
        match chain.iter().rposition(|idx| *idx == flow_index) {
            Some(pos) => {
                chain.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Replaces the open span chain.
    pub fn restore_parent_chain(&self, chain: Vec<u32>) {
        *self.parent_chain.lock() = chain;
    }

    /// Records that the message was routed to fault handling.
    pub fn mark_fault(&self, reason: impl Into<String>) {
        *self.fault.write() = Some(reason.into());
    }

    /// Records that mediation of this copy ended without suspending: the
    /// copy was abandoned and will not be resumed.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Returns true once the copy was abandoned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Returns the fault reason, if any.
    #[must_use]
    pub fn fault(&self) -> Option<String> {
        self.fault.read().clone()
    }

    /// Creates an independent copy for a split: new identity, same flow,
    /// deep-cloned continuation stack and a copy of the open span chain.
    #[must_use]
    pub fn split_copy(&self) -> Self {
        Self {
            execution_id: ExecutionContextId::new(),
            flow_id: self.flow_id,
            origin: Some(self.execution_id),
            continuation: self.continuation.deep_clone(),
            continuation_enabled: self.continuation_enabled,
            span_store: self.span_store.clone(),
            entry: self.entry.clone(),
            payload: RwLock::new(self.payload()),
            properties: RwLock::new(self.properties.read().clone()),
            parent_chain: Mutex::new(self.parent_chain()),
            fault: RwLock::new(None),
            finished: AtomicBool::new(false),
        }
    }

    /// Creates the context a response is mediated in: a split copy carrying `payload`.
    #[must_use]
    pub fn response_copy(&self, payload: serde_json::Value) -> Self {
        let copy = self.split_copy();
        copy.set_payload(payload);
        copy
    }
}
