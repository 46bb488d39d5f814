//! Span parent resolution.
//!
//! Strategies are tried in order: flow index, artifact ancestry, latest
//! active. A candidate is only accepted once its span has been opened; the
//! first accepted candidate wins. No parent at all starts a new trace.

mod ancestry;
mod flow_index;
mod latest_active;

pub use ancestry::AncestryStrategy;
pub use flow_index::FlowIndexStrategy;
pub use latest_active::LatestActiveStrategy;

use super::{SpanRecord, SpanStore, SpanTable};
use crate::context::MessageContext;
use crate::core::ExecutionContextId;
use crate::pipeline::ArtifactAncestryStore;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// One way of finding the parent of a span record.
pub trait ParentStrategy: Send + Sync {
    /// Strategy name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Returns the flow index of a parent candidate for `child`.
    ///
    /// `execution_id` identifies the message copy opening `child`.
    fn resolve(
        &self,
        child: &SpanRecord,
        execution_id: ExecutionContextId,
        table: &mut SpanTable,
    ) -> Option<u32>;
}

/// Runs the parent strategies in order.
pub struct ParentResolver {
    strategies: Vec<Box<dyn ParentStrategy>>,
}

impl fmt::Debug for ParentResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("ParentResolver")
            .field("strategies", &names)
            .finish()
    }
}

impl ParentResolver {
    /// Creates the standard resolver over a built ancestry store.
    #[must_use]
    pub fn new(ancestry: Arc<ArtifactAncestryStore>) -> Self {
        Self::with_strategies(vec![
            Box::new(FlowIndexStrategy),
            Box::new(AncestryStrategy::new(ancestry)),
            Box::new(LatestActiveStrategy),
        ])
    }

    /// Creates a resolver with custom strategies, tried in the given order.
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn ParentStrategy>>) -> Self {
        Self { strategies }
    }

    /// Resolves the parent of `child` in a locked table.
    ///
    /// The accepted parent learns the child's component and message identity.
    pub fn resolve_in(
        &self,
        child: &SpanRecord,
        execution_id: ExecutionContextId,
        table: &mut SpanTable,
    ) -> Option<u32> {
        for strategy in &self.strategies {
            let Some(candidate) = strategy.resolve(child, execution_id, table) else {
                continue;
            };
            let Some(parent) = table.get_mut(candidate).filter(|record| record.is_started()) else {
                trace!(
                    strategy = strategy.name(),
                    flow_index = child.flow_index,
                    candidate,
                    "Rejected parent candidate that has not started"
                );
                continue;
            };

            parent
                .child_structured_element_ids
                .insert(child.component_id.clone());
            parent.known_execution_context_ids.insert(execution_id);
            trace!(
                strategy = strategy.name(),
                flow_index = child.flow_index,
                parent = candidate,
                "Resolved span parent"
            );
            return Some(candidate);
        }

        trace!(flow_index = child.flow_index, "No parent; starting a new trace");
        None
    }

    /// Resolves the parent of `child` for the message `ctx`.
    pub fn resolve_parent(
        &self,
        child: &SpanRecord,
        store: &SpanStore,
        ctx: &MessageContext,
    ) -> Option<SpanRecord> {
        let mut table = store.write();
        let parent = self.resolve_in(child, ctx.execution_id(), &mut table)?;
        table.get(parent).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentId, ComponentKind, MediatorKind};
    use crate::observability::SpanHandle;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Recording {
        name: &'static str,
        answer: Option<u32>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ParentStrategy for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn resolve(&self, _: &SpanRecord, _: ExecutionContextId, _: &mut SpanTable) -> Option<u32> {
            self.calls.lock().push(self.name);
            self.answer
        }
    }

    fn started(index: u32, component: &str, kind: ComponentKind) -> SpanRecord {
        SpanRecord::new(index, component.into(), kind, component, ExecutionContextId::new())
            .with_span(SpanHandle::child_of(None))
    }

    #[test]
    fn test_call_parent_short_circuits() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let strategy = |name, answer| -> Box<dyn ParentStrategy> {
            Box::new(Recording {
                name,
                answer,
                calls: Arc::clone(&calls),
            })
        };
        let resolver = ParentResolver::with_strategies(vec![
            Box::new(FlowIndexStrategy),
            strategy("ancestry", Some(0)),
            strategy("latest_active", Some(0)),
        ]);

        let mut table = SpanTable::new(true);
        table.record(started(0, "seq", ComponentKind::Sequence));
        table.record(started(1, "call", ComponentKind::Mediator(MediatorKind::Call)));
        let endpoint = SpanRecord::new(2, "ep".into(), ComponentKind::Endpoint, "ep", ExecutionContextId::new())
            .with_flow_parent_index(Some(1));

        assert_eq!(resolver.resolve_in(&endpoint, endpoint.opened_by, &mut table), Some(1));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_unstarted_candidate_falls_through() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let resolver = ParentResolver::with_strategies(vec![
            Box::new(Recording { name: "first", answer: Some(1), calls: Arc::clone(&calls) }),
            Box::new(Recording { name: "second", answer: Some(0), calls: Arc::clone(&calls) }),
        ]);
        let mut table = SpanTable::new(true);
        table.record(started(0, "seq", ComponentKind::Sequence));
        table.record(SpanRecord::new(1, "idle".into(), ComponentKind::Sequence, "idle", ExecutionContextId::new()));

        let child = SpanRecord::new(2, "log".into(), ComponentKind::Mediator(MediatorKind::Log), "log", ExecutionContextId::new());
        assert_eq!(resolver.resolve_in(&child, child.opened_by, &mut table), Some(0));
        assert_eq!(*calls.lock(), vec!["first", "second"]);

        let parent = table.get(0).unwrap();
        assert!(parent.child_structured_element_ids.contains(&ComponentId::from("log")));
        assert!(parent.knows(child.opened_by));
    }

    #[test]
    fn test_first_span_has_no_parent() {
        let resolver = ParentResolver::new(Arc::new(ArtifactAncestryStore::new()));
        let ctx = MessageContext::new(json!(null));
        let store = SpanStore::new(ctx.flow_id());
        let first = SpanRecord::new(0, "main".into(), ComponentKind::Sequence, "main", ctx.execution_id());
        store.record(first.clone());

        assert!(resolver.resolve_parent(&first, &store, &ctx).is_none());
    }

    #[test]
    fn test_anonymous_child_of_container() {
        let resolver = ParentResolver::new(Arc::new(ArtifactAncestryStore::new()));
        let ctx = MessageContext::new(json!(null));

        for (continuable, expected) in [(true, Some(0)), (false, Some(5))] {
            let store = SpanStore::new(ctx.flow_id());
            store.record(
                started(5, "filter", ComponentKind::Mediator(MediatorKind::Filter))
                    .with_flow_continuable(true),
            );
            store.record(
                started(0, "container", ComponentKind::Mediator(MediatorKind::Property))
                    .with_flow_continuable(continuable),
            );
            let body = SpanRecord::new(1, "body".into(), ComponentKind::AnonymousSequence, "body", ctx.execution_id())
                .with_flow_parent_index(Some(0));
            store.record(body.clone());

            let parent = resolver.resolve_parent(&body, &store, &ctx);
            assert_eq!(parent.map(|p| p.flow_index), expected);
        }
    }
}
