//! Test fixtures for mediation tests.

use serde_json::Value;
use std::sync::Arc;

use crate::config::MediationConfig;
use crate::context::MessageContext;
use crate::engine::MediationEngine;
use crate::mediators::Mediator;
use crate::observability::CollectingTracingBackend;
use crate::pipeline::InMemoryPipelineGraph;

/// Shares a mediator as a pipeline child.
#[must_use]
pub fn mediator<M: Mediator + 'static>(mediator: M) -> Arc<dyn Mediator> {
    Arc::new(mediator)
}

/// An engine over an in-memory graph with a collecting tracing backend.
#[derive(Debug, Clone)]
pub struct TestEngine {
    engine: MediationEngine,
    backend: Arc<CollectingTracingBackend>,
}

impl TestEngine {
    /// Creates an engine with tracing enabled.
    #[must_use]
    pub fn traced(graph: InMemoryPipelineGraph) -> Self {
        Self::with_config(graph, MediationConfig::default().with_tracing(true))
    }

    /// Creates an engine with tracing disabled.
    #[must_use]
    pub fn untraced(graph: InMemoryPipelineGraph) -> Self {
        Self::with_config(graph, MediationConfig::default())
    }

    /// Creates an engine with a custom configuration.
    #[must_use]
    pub fn with_config(graph: InMemoryPipelineGraph, config: MediationConfig) -> Self {
        let backend = Arc::new(CollectingTracingBackend::new());
        let engine = MediationEngine::with_backend(config, Arc::new(graph), backend.clone());
        Self { engine, backend }
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &MediationEngine {
        &self.engine
    }

    /// Returns the span boundaries seen by the engine.
    #[must_use]
    pub fn backend(&self) -> &CollectingTracingBackend {
        &self.backend
    }

    /// Prepares a message for a new flow.
    #[must_use]
    pub fn message(&self, payload: Value) -> Arc<MessageContext> {
        self.engine.prepare(MessageContext::new(payload))
    }

    /// Prepares a message entering through a proxy service.
    #[must_use]
    pub fn proxy_message(&self, proxy: &str, payload: Value) -> Arc<MessageContext> {
        self.engine
            .prepare(MessageContext::new(payload).with_proxy(proxy))
    }

    /// Prepares a message entering through an API resource.
    #[must_use]
    pub fn api_message(&self, api: &str, resource: &str, payload: Value) -> Arc<MessageContext> {
        self.engine
            .prepare(MessageContext::new(payload).with_api(api, resource))
    }
}
