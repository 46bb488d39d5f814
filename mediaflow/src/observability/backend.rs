//! Tracing backends that turn span records into spans.

use super::{SpanHandle, SpanRecord};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Level};

/// Receives span open/close requests for resolved span records.
pub trait TracingBackend: Send + Sync {
    /// Opens a span for `record` under `parent` and returns its handle.
    fn open_span(&self, record: &SpanRecord, parent: Option<&SpanRecord>) -> SpanHandle;

    /// Closes a previously opened span.
    fn close_span(&self, handle: &SpanHandle, record: &SpanRecord);
}

/// A backend that opens handles without exporting anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTracingBackend;

impl TracingBackend for NoOpTracingBackend {
    fn open_span(&self, _record: &SpanRecord, parent: Option<&SpanRecord>) -> SpanHandle {
        SpanHandle::child_of(parent.and_then(|parent| parent.span.as_ref()))
    }

    fn close_span(&self, _handle: &SpanHandle, _record: &SpanRecord) {}
}

/// A backend that logs span boundaries with `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingTracingBackend {
    level: Level,
}

impl Default for LoggingTracingBackend {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingTracingBackend {
    /// Creates a backend logging at `level` (DEBUG or INFO).
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl TracingBackend for LoggingTracingBackend {
    fn open_span(&self, record: &SpanRecord, parent: Option<&SpanRecord>) -> SpanHandle {
        let handle = SpanHandle::child_of(parent.and_then(|parent| parent.span.as_ref()));
        let parent_index = parent.map(|parent| parent.flow_index);
        if self.level == Level::INFO {
            info!(
                flow_index = record.flow_index,
                parent_index = ?parent_index,
                component = %record.component_name,
                kind = %record.component_kind,
                trace_id = %handle.trace_id,
                "Span opened"
            );
        } else {
            debug!(
                flow_index = record.flow_index,
                parent_index = ?parent_index,
                component = %record.component_name,
                kind = %record.component_kind,
                trace_id = %handle.trace_id,
                "Span opened"
            );
        }
        handle
    }

    fn close_span(&self, handle: &SpanHandle, record: &SpanRecord) {
        let duration_ms = record
            .ended_at
            .map(|ended| (ended - handle.started_at).num_milliseconds());
        if self.level == Level::INFO {
            info!(
                flow_index = record.flow_index,
                component = %record.component_name,
                duration_ms = ?duration_ms,
                "Span closed"
            );
        } else {
            debug!(
                flow_index = record.flow_index,
                component = %record.component_name,
                duration_ms = ?duration_ms,
                "Span closed"
            );
        }
    }
}

/// A span boundary seen by [`CollectingTracingBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SpanEvent {
    /// A span was opened.
    Opened {
        /// Flow index of the record.
        flow_index: u32,
        /// Flow index of the resolved parent.
        parent_index: Option<u32>,
        /// Component name.
        component: String,
    },
    /// A span was closed.
    Closed {
        /// Flow index of the record.
        flow_index: u32,
        /// Component name.
        component: String,
    },
}

/// A backend that collects span boundaries for inspection.
#[derive(Debug, Default)]
pub struct CollectingTracingBackend {
    events: RwLock<Vec<SpanEvent>>,
}

impl CollectingTracingBackend {
    /// Creates a new collecting backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<SpanEvent> {
        self.events.read().clone()
    }

    /// Returns `(component, parent index)` for every opened span, in order.
    #[must_use]
    pub fn opened(&self) -> Vec<(String, Option<u32>)> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                SpanEvent::Opened {
                    component,
                    parent_index,
                    ..
                } => Some((component.clone(), *parent_index)),
                SpanEvent::Closed { .. } => None,
            })
            .collect()
    }

    /// Returns the component names of closed spans, in order.
    #[must_use]
    pub fn closed(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                SpanEvent::Closed { component, .. } => Some(component.clone()),
                SpanEvent::Opened { .. } => None,
            })
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl TracingBackend for CollectingTracingBackend {
    fn open_span(&self, record: &SpanRecord, parent: Option<&SpanRecord>) -> SpanHandle {
        self.events.write().push(SpanEvent::Opened {
            flow_index: record.flow_index,
            parent_index: parent.map(|parent| parent.flow_index),
            component: record.component_name.clone(),
        });
        SpanHandle::child_of(parent.and_then(|parent| parent.span.as_ref()))
    }

    fn close_span(&self, _handle: &SpanHandle, record: &SpanRecord) {
        self.events.write().push(SpanEvent::Closed {
            flow_index: record.flow_index,
            component: record.component_name.clone(),
        });
    }
}
