//! Shared state of a running engine.

use super::PendingCalls;
use crate::config::MediationConfig;
use crate::continuation::ContinuationStackManager;
use crate::observability::resolve::ParentResolver;
use crate::observability::{SpanHandler, SpanStoreRegistry, TracingBackend};
use crate::pipeline::{ArtifactAncestryStore, PipelineGraph};
use std::sync::Arc;

/// Everything mediators reach through their scope.
#[derive(Debug)]
pub struct MediationEnv {
    config: MediationConfig,
    graph: Arc<dyn PipelineGraph>,
    stacks: ContinuationStackManager,
    spans: Option<Arc<SpanHandler>>,
    pending: PendingCalls,
    stores: SpanStoreRegistry,
}

impl MediationEnv {
    /// Creates an environment for `graph`.
    ///
    /// The span handler only exists when tracing is enabled; it then
    /// observes every continuation stack change.
    #[must_use]
    pub fn new(
        config: MediationConfig,
        graph: Arc<dyn PipelineGraph>,
        backend: Arc<dyn TracingBackend>,
    ) -> Self {
        let ancestry = Arc::new(ArtifactAncestryStore::build(graph.as_ref()));
        let spans = config
            .tracing_enabled
            .then(|| Arc::new(SpanHandler::new(backend, ParentResolver::new(ancestry))));
        let stacks = match &spans {
            Some(handler) => ContinuationStackManager::new().with_observer(handler.clone()),
            None => ContinuationStackManager::new(),
        };
        let stores = SpanStoreRegistry::new(config.index_component_copies);

        Self {
            config,
            graph,
            stacks,
            spans,
            pending: PendingCalls::new(),
            stores,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MediationConfig {
        &self.config
    }

    /// Returns the pipeline graph.
    #[must_use]
    pub fn graph(&self) -> &dyn PipelineGraph {
        self.graph.as_ref()
    }

    /// Returns the continuation stack manager.
    #[must_use]
    pub fn stacks(&self) -> &ContinuationStackManager {
        &self.stacks
    }

    /// Returns the span handler when tracing is enabled.
    #[must_use]
    pub fn spans(&self) -> Option<&Arc<SpanHandler>> {
        self.spans.as_ref()
    }

    /// Returns the table of parked messages.
    #[must_use]
    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Returns the span stores of live flows.
    #[must_use]
    pub fn stores(&self) -> &SpanStoreRegistry {
        &self.stores
    }
}
