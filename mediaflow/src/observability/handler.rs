//! Opens and closes component spans for messages that carry a span store.

use super::resolve::ParentResolver;
use super::{ContinuationSequenceEntry, SpanRecord, SpanStore, TracingBackend};
use crate::context::MessageContext;
use crate::continuation::{ContinuationNode, StackObserver};
use crate::core::{ComponentId, ComponentKind};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Records component invocations, resolves their parents and drives the backend.
pub struct SpanHandler {
    backend: Arc<dyn TracingBackend>,
    resolver: ParentResolver,
}

impl fmt::Debug for SpanHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanHandler")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl SpanHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(backend: Arc<dyn TracingBackend>, resolver: ParentResolver) -> Self {
        Self { backend, resolver }
    }

    /// Records and opens a span for a component about to run.
    ///
    /// Returns the new flow index, which becomes the innermost open span of
    /// the message. Returns `None` for messages without a span store.
    pub fn open(
        &self,
        ctx: &MessageContext,
        component_id: &ComponentId,
        kind: ComponentKind,
        name: &str,
        flow_continuable: bool,
    ) -> Option<u32> {
        let store = ctx.span_store()?;
        let flow_parent_index = ctx.current_flow_index();
        let execution_id = ctx.execution_id();

        let (record, parent_record) = {
            let mut table = store.write();
            let index = table.allocate_index();
            let mut record = SpanRecord::new(index, component_id.clone(), kind, name, execution_id)
                .with_flow_parent_index(flow_parent_index)
                .with_flow_continuable(flow_continuable);
            table.record(record.clone());

            let parent = self.resolver.resolve_in(&record, execution_id, &mut table);
            record.resolved_parent = parent;
            if let Some(recorded) = table.get_mut(index) {
                recorded.resolved_parent = parent;
            }
            if let Some(container) = parent.and_then(|parent| table.get_mut(parent)) {
                if kind.is_anonymous_sequence() {
                    container.anonymous_sequences.push(index);
                }
            }
            let parent_record = parent.and_then(|parent| table.get(parent)).cloned();
            (record, parent_record)
        };
        let index = record.flow_index;

        // the backend may read the store; unstarted records are never resolved as parents
        let handle = self.backend.open_span(&record, parent_record.as_ref());
        store.write().mark_started(index, handle);

        trace!(
            message_id = %execution_id,
            flow_index = index,
            flow_parent_index = ?flow_parent_index,
            component = name,
            "Opened component span"
        );
        ctx.push_flow_index(index);
        Some(index)
    }

    /// Closes the span at `index` and drops it from the message's open chain.
    pub fn close(&self, ctx: &MessageContext, index: u32) {
        let Some(store) = ctx.span_store() else {
            return;
        };
        let closed = {
            let mut table = store.write();
            table.mark_closed(index, Utc::now())
        };
        if let Some(record) = closed {
            if let Some(handle) = record.span.as_ref() {
                self.backend.close_span(handle, &record);
            }
            trace!(
                message_id = %ctx.execution_id(),
                flow_index = index,
                component = %record.component_name,
                "Closed component span"
            );
        }
        ctx.remove_flow_index(index);
    }

    /// Closes the innermost open span of the message.
    pub fn close_current(&self, ctx: &MessageContext) {
        if let Some(index) = ctx.current_flow_index() {
            self.close(ctx, index);
        }
    }

    /// Closes every span this message opened that is still open, newest first.
    pub fn close_all(&self, ctx: &MessageContext) {
        let Some(store) = ctx.span_store() else {
            return;
        };
        let execution_id = ctx.execution_id();
        let owned: Vec<u32> = {
            let table = store.read();
            table
                .active_spans()
                .into_iter()
                .filter(|record| record.opened_by == execution_id)
                .map(|record| record.flow_index)
                .collect()
        };
        for index in owned.iter().rev() {
            self.close(ctx, *index);
        }
        if !owned.is_empty() {
            debug!(
                message_id = %execution_id,
                closed = owned.len(),
                "Closed open spans of message"
            );
        }
    }

    /// Closes every span left on the message's open chain, innermost first.
    ///
    /// Unlike [`close_all`](Self::close_all) this includes spans another copy
    /// opened before this one was split off.
    pub fn close_chain(&self, ctx: &MessageContext) {
        for index in ctx.parent_chain().into_iter().rev() {
            self.close(ctx, index);
        }
    }

    /// Closes every span still open in a flow's store, newest first, and
    /// returns how many were closed.
    pub fn close_flow(&self, store: &SpanStore) -> usize {
        let open: Vec<u32> = store.read().active_indices().to_vec();
        let now = Utc::now();
        let mut closed = 0;
        for index in open.into_iter().rev() {
            let record = {
                let mut table = store.write();
                table.mark_closed(index, now)
            };
            if let Some(record) = record {
                if let Some(handle) = record.span.as_ref() {
                    self.backend.close_span(handle, &record);
                }
                closed += 1;
            }
        }
        closed
    }
}

impl StackObserver for SpanHandler {
    fn on_stack_push(&self, ctx: &MessageContext, node: &ContinuationNode) {
        let Some(store) = ctx.span_store() else {
            return;
        };
        store
            .write()
            .push_continuation_sequence(ContinuationSequenceEntry {
                execution_id: ctx.execution_id(),
                parent_index: node.stats_parent_index(),
                name: node.sequence_name().unwrap_or_default().to_string(),
                popped: false,
            });
    }

    fn on_stack_pop(&self, ctx: &MessageContext, node: &ContinuationNode) {
        if let Some(store) = ctx.span_store() {
            let name = node.sequence_name().unwrap_or_default();
            store.write().pop_continuation_sequence(ctx.execution_id(), name);
        }
    }

    fn on_stack_clear(&self, ctx: &MessageContext) {
        if let Some(store) = ctx.span_store() {
            store.write().pop_all_continuation_sequences(ctx.execution_id());
        }
        self.close_all(ctx);
    }
}
