//! Static structural ancestry of deployed components.

use super::PipelineGraph;
use crate::core::ComponentId;
use crate::mediators::Mediator;
use std::collections::HashMap;
use tracing::debug;

/// For every deployed component, the ids of its structural ancestors,
/// outermost first; the last entry is the immediate parent.
///
/// Anonymous sequences are transparent: components inside one list the
/// mediator that owns the sequence as their parent. Endpoints are never
/// recorded.
#[derive(Debug, Clone, Default)]
pub struct ArtifactAncestryStore {
    ancestors: HashMap<ComponentId, Vec<ComponentId>>,
}

impl ArtifactAncestryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the ancestors of `id`.
    pub fn insert(&mut self, id: ComponentId, ancestors: Vec<ComponentId>) {
        self.ancestors.insert(id, ancestors);
    }

    /// Walks every root of `graph` depth first.
    ///
    /// A component reachable along several paths keeps the first one.
    #[must_use]
    pub fn build(graph: &dyn PipelineGraph) -> Self {
        let mut store = Self::new();
        let mut path = Vec::new();
        for root in graph.roots() {
            store.visit(root.as_ref(), &mut path);
        }
        debug!(components = store.len(), "Built artifact ancestry");
        store
    }

    fn visit(&mut self, component: &dyn Mediator, path: &mut Vec<ComponentId>) {
        let kind = component.kind();
        if kind.is_endpoint() {
            return;
        }
        let transparent = kind.is_anonymous_sequence();
        if !transparent {
            let id = component.component_id().clone();
            self.ancestors
                .entry(id.clone())
                .or_insert_with(|| path.clone());
            path.push(id);
        }
        for child in component.structural_children() {
            self.visit(child.as_ref(), path);
        }
        if !transparent {
            path.pop();
        }
    }

    /// Returns the ancestors of `id`, outermost first.
    #[must_use]
    pub fn ancestors_of(&self, id: &ComponentId) -> Option<&[ComponentId]> {
        self.ancestors.get(id).map(Vec::as_slice)
    }

    /// Returns the immediate structural parent of `id`.
    #[must_use]
    pub fn parent_of(&self, id: &ComponentId) -> Option<&ComponentId> {
        self.ancestors.get(id)?.last()
    }

    /// Returns the number of recorded components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ancestors.len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ancestors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediators::{CallMediator, FilterMediator, LogMediator, Sequence};
    use crate::pipeline::{InMemoryPipelineGraph, ProxyService};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_build_records_structural_parents() {
        let log: Arc<dyn Mediator> = Arc::new(LogMediator::info("inner").with_id("log"));
        let call: Arc<dyn Mediator> = Arc::new(CallMediator::new("backend").with_id("call"));
        let filter: Arc<dyn Mediator> = Arc::new(
            FilterMediator::new(Arc::new(|_: &crate::context::MessageContext| true), vec![log, call])
                .with_id("filter"),
        );
        let graph = InMemoryPipelineGraph::new()
            .with_proxy(ProxyService::new("orders").with_in_sequence(vec![filter]));

        let store = ArtifactAncestryStore::build(&graph);
        let proxy_in = ComponentId::from("proxy:orders:proxy_in");

        assert_eq!(store.ancestors_of(&proxy_in), Some(&[][..]));
        assert_eq!(store.parent_of(&"filter".into()), Some(&proxy_in));
        // the then-branch is transparent
        assert_eq!(store.parent_of(&"log".into()), Some(&ComponentId::from("filter")));
        assert_eq!(
            store.ancestors_of(&"call".into()),
            Some(&[proxy_in.clone(), ComponentId::from("filter")][..])
        );
        assert!(store.parent_of(&ComponentId::from("call").child(0, "backend")).is_none());
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_first_path_wins() {
        let shared: Arc<dyn Mediator> = Arc::new(LogMediator::info("shared").with_id("shared"));
        let graph = InMemoryPipelineGraph::new()
            .with_sequence(Sequence::named("a", vec![shared.clone()]))
            .with_sequence(Sequence::named("b", vec![shared]));

        let store = ArtifactAncestryStore::build(&graph);
        assert_eq!(
            store.parent_of(&"shared".into()),
            Some(&ComponentId::from("sequence:a"))
        );
    }
}
