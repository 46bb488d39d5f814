//! Span records: one per pipeline component invocation.

use crate::core::{ComponentId, ComponentKind, ExecutionContextId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Handle of a span opened by the tracing backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanHandle {
    /// Span id.
    pub span_id: Uuid,
    /// Trace id, shared with the parent span.
    pub trace_id: Uuid,
    /// When the span was opened.
    pub started_at: DateTime<Utc>,
}

impl SpanHandle {
    /// Creates a handle for a span under `parent`, or a new trace root.
    #[must_use]
    pub fn child_of(parent: Option<&SpanHandle>) -> Self {
        Self {
            span_id: Uuid::new_v4(),
            trace_id: parent.map_or_else(Uuid::new_v4, |parent| parent.trace_id),
            started_at: Utc::now(),
        }
    }
}

/// One recorded execution of a pipeline component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Key of this record in its span store.
    pub flow_index: u32,
    /// Index of the component that was open when this one started.
    pub flow_parent_index: Option<u32>,
    /// Static component identity.
    pub component_id: ComponentId,
    /// Component kind.
    pub component_kind: ComponentKind,
    /// Component name.
    pub component_name: String,
    /// Whether the component can suspend and resume.
    pub flow_continuable: bool,
    /// Present once the backend has opened the span.
    pub span: Option<SpanHandle>,
    /// When the span was closed.
    pub ended_at: Option<DateTime<Utc>>,
    /// Flow index of the resolved parent.
    pub resolved_parent: Option<u32>,
    /// Children already resolved against this record.
    pub child_structured_element_ids: HashSet<ComponentId>,
    /// Flow indices of the anonymous sub-sequences opened under this record, oldest first.
    pub anonymous_sequences: Vec<u32>,
    /// Message copies this record has observed.
    pub known_execution_context_ids: HashSet<ExecutionContextId>,
    /// The message copy that opened the record.
    pub opened_by: ExecutionContextId,
}

impl SpanRecord {
    /// Creates a record that has not been started yet.
    #[must_use]
    pub fn new(
        flow_index: u32,
        component_id: ComponentId,
        component_kind: ComponentKind,
        component_name: impl Into<String>,
        opened_by: ExecutionContextId,
    ) -> Self {
        Self {
            flow_index,
            flow_parent_index: None,
            component_id,
            component_kind,
            component_name: component_name.into(),
            flow_continuable: false,
            span: None,
            ended_at: None,
            resolved_parent: None,
            child_structured_element_ids: HashSet::new(),
            anonymous_sequences: Vec::new(),
            known_execution_context_ids: HashSet::from([opened_by]),
            opened_by,
        }
    }

    /// Sets the flow parent index.
    #[must_use]
    pub fn with_flow_parent_index(mut self, index: Option<u32>) -> Self {
        self.flow_parent_index = index;
        self
    }

    /// Marks the component as flow continuable.
    #[must_use]
    pub fn with_flow_continuable(mut self, flow_continuable: bool) -> Self {
        self.flow_continuable = flow_continuable;
        self
    }

    /// Attaches an opened span.
    #[must_use]
    pub fn with_span(mut self, span: SpanHandle) -> Self {
        self.span = Some(span);
        self
    }

    /// Returns true once the backend has opened the span.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.span.is_some()
    }

    /// Returns true while the span is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.span.is_some() && self.ended_at.is_none()
    }

    /// Returns true for `call` and `send` mediators.
    #[must_use]
    pub fn is_call_or_send(&self) -> bool {
        self.component_kind.is_call_or_send()
    }

    /// Returns true for anonymous sequences.
    #[must_use]
    pub fn is_anonymous_sequence(&self) -> bool {
        self.component_kind.is_anonymous_sequence()
    }

    /// Returns true if this record can parent an anonymous sequence.
    #[must_use]
    pub fn is_continuable_or_foreach(&self) -> bool {
        self.flow_continuable || self.component_kind.is_foreach()
    }

    /// Returns true for any flow continuable mediator, `call` or `send`.
    #[must_use]
    pub fn can_parent_endpoint(&self) -> bool {
        self.is_call_or_send() || (self.flow_continuable && self.component_kind.is_mediator())
    }

    /// Returns true if `id` has been seen by this record.
    #[must_use]
    pub fn knows(&self, id: ExecutionContextId) -> bool {
        self.known_execution_context_ids.contains(&id)
    }

    /// Converts to span attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        attrs.insert("component.id".to_string(), self.component_id.to_string());
        attrs.insert("component.kind".to_string(), self.component_kind.to_string());
        attrs.insert("component.name".to_string(), self.component_name.clone());
        attrs.insert("flow.index".to_string(), self.flow_index.to_string());

        if let Some(v) = self.flow_parent_index {
            attrs.insert("flow.parent_index".to_string(), v.to_string());
        }
        if let Some(v) = self.resolved_parent {
            attrs.insert("span.parent_index".to_string(), v.to_string());
        }
        if let Some(ref span) = self.span {
            attrs.insert("span.id".to_string(), span.span_id.to_string());
            attrs.insert("trace.id".to_string(), span.trace_id.to_string());
        }
        if self.flow_continuable {
            attrs.insert("component.flow_continuable".to_string(), "true".to_string());
        }

        attrs
    }
}
