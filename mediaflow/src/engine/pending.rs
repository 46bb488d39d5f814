//! Messages waiting for an endpoint response.

use crate::context::MessageContext;
use crate::core::{ExecutionContextId, FlowId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How a message reached the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    /// The message suspended and resumes from its continuation stack.
    Call,
    /// The message kept mediating; the response runs the out-sequence.
    Send,
}

impl fmt::Display for PendingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Send => write!(f, "send"),
        }
    }
}

/// A message parked at an endpoint.
#[derive(Debug, Clone)]
pub struct PendingCall {
    /// The parked message.
    pub message: Arc<MessageContext>,
    /// Endpoint name.
    pub endpoint: String,
    /// Flow index of the endpoint span, when traced.
    pub endpoint_index: Option<u32>,
    /// Call or send.
    pub kind: PendingKind,
    /// When the message was parked.
    pub parked_at: DateTime<Utc>,
}

/// Parked messages keyed by execution context, plus the number of copies of
/// each flow the engine is mediating right now.
///
/// A message copy has at most one outstanding request.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: DashMap<ExecutionContextId, PendingCall>,
    flows: DashMap<FlowId, FlowActivity>,
}

/// Copies of one flow that are parked or being mediated.
#[derive(Debug, Default, Clone, Copy)]
struct FlowActivity {
    parked: usize,
    running: usize,
}

impl PendingCalls {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a message, replacing an earlier request of the same copy.
    pub fn park(&self, call: PendingCall) {
        let execution_id = call.message.execution_id();
        let flow_id = call.message.flow_id();
        match self.calls.insert(execution_id, call) {
            Some(previous) => debug!(
                message_id = %execution_id,
                endpoint = %previous.endpoint,
                "Replaced outstanding request"
            ),
            None => self.flows.entry(flow_id).or_default().parked += 1,
        }
    }

    /// Removes and returns the parked message.
    pub fn take(&self, execution_id: ExecutionContextId) -> Option<PendingCall> {
        let (_, call) = self.calls.remove(&execution_id)?;
        if let Some(mut activity) = self.flows.get_mut(&call.message.flow_id()) {
            activity.parked = activity.parked.saturating_sub(1);
        }
        Some(call)
    }

    /// Returns true if the copy is parked.
    #[must_use]
    pub fn contains(&self, execution_id: ExecutionContextId) -> bool {
        self.calls.contains_key(&execution_id)
    }

    /// Returns the execution ids of all parked copies.
    #[must_use]
    pub fn execution_ids(&self) -> Vec<ExecutionContextId> {
        self.calls.iter().map(|entry| *entry.key()).collect()
    }

    /// Returns the number of parked messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns true if nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Returns the flow of a parked copy.
    #[must_use]
    pub fn flow_of(&self, execution_id: ExecutionContextId) -> Option<FlowId> {
        self.calls
            .get(&execution_id)
            .map(|call| call.message.flow_id())
    }

    /// Returns true if any copy of the flow is parked.
    #[must_use]
    pub fn has_flow(&self, flow_id: FlowId) -> bool {
        self.flows
            .get(&flow_id)
            .is_some_and(|activity| activity.parked > 0)
    }

    /// Counts a copy of the flow as running.
    ///
    /// Must happen before the copy is taken off the table, so the flow never
    /// looks idle while it moves from parked to running.
    pub fn enter(&self, flow_id: FlowId) {
        self.flows.entry(flow_id).or_default().running += 1;
    }

    /// Stops counting a copy as running. Returns true if the flow is now
    /// idle: nothing parked and nothing running.
    pub fn leave(&self, flow_id: FlowId) -> bool {
        let idle = match self.flows.get_mut(&flow_id) {
            Some(mut activity) => {
                activity.running = activity.running.saturating_sub(1);
                activity.running == 0 && activity.parked == 0
            }
            None => true,
        };
        if idle {
            self.flows.remove_if(&flow_id, |_, activity| {
                activity.running == 0 && activity.parked == 0
            });
        }
        idle
    }

    /// Drops every parked copy of a flow and returns how many were dropped.
    pub fn discard_flow(&self, flow_id: FlowId) -> usize {
        self.flows.remove(&flow_id);
        let mut dropped = 0;
        self.calls.retain(|_, call| {
            let keep = call.message.flow_id() != flow_id;
            if !keep {
                dropped += 1;
            }
            keep
        });
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parked(message: MessageContext, kind: PendingKind) -> PendingCall {
        PendingCall {
            message: Arc::new(message),
            endpoint: "backend".into(),
            endpoint_index: None,
            kind,
            parked_at: Utc::now(),
        }
    }

    #[test]
    fn test_park_and_take() {
        let pending = PendingCalls::new();
        let message = MessageContext::new(json!(null));
        let id = message.execution_id();

        pending.park(parked(message, PendingKind::Call));
        assert!(pending.contains(id));
        assert_eq!(pending.len(), 1);

        let call = pending.take(id).unwrap();
        assert_eq!(call.kind, PendingKind::Call);
        assert!(pending.take(id).is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_discard_flow() {
        let pending = PendingCalls::new();
        let message = MessageContext::new(json!(null));
        let copy = message.split_copy();
        let other = MessageContext::new(json!(null));
        let flow = message.flow_id();

        pending.park(parked(message, PendingKind::Call));
        pending.park(parked(copy, PendingKind::Send));
        pending.park(parked(other, PendingKind::Call));

        assert_eq!(pending.discard_flow(flow), 2);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_flow_is_idle_once_nothing_runs_or_waits() {
        let pending = PendingCalls::new();
        let message = MessageContext::new(json!(null));
        let copy = message.split_copy();
        let flow = message.flow_id();
        let copy_id = copy.execution_id();

        pending.enter(flow);
        pending.park(parked(copy, PendingKind::Call));
        assert!(!pending.leave(flow));
        assert!(pending.has_flow(flow));
        assert_eq!(pending.flow_of(copy_id), Some(flow));

        // the copy resumes on another worker while a sibling finishes
        pending.enter(flow);
        assert!(pending.take(copy_id).is_some());
        pending.enter(flow);
        assert!(!pending.leave(flow));
        assert!(pending.leave(flow));
        assert!(!pending.has_flow(flow));
    }
}
