//! Deployed artifacts and continuation dispatch.

use crate::context::MessageContext;
use crate::continuation::ContinuationNode;
use crate::core::SequenceKind;
use crate::errors::{ArtifactKind, ArtifactNotFoundError, ContinuationError, MediationError};
use crate::mediators::{Mediator, Sequence};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Lookup of deployed sequences by the names continuation nodes carry.
pub trait PipelineGraph: Send + Sync + Debug {
    /// Returns a named sequence.
    fn named_sequence(&self, name: &str) -> Option<Arc<Sequence>>;

    /// Returns the in, out or fault sequence of a proxy service.
    fn proxy_sequence(&self, proxy: &str, kind: SequenceKind) -> Option<Arc<Sequence>>;

    /// Returns the in, out or fault sequence of an API resource.
    fn api_sequence(&self, api: &str, resource: &str, kind: SequenceKind) -> Option<Arc<Sequence>>;

    /// Returns a template body.
    fn template(&self, name: &str) -> Option<Arc<Sequence>>;

    /// Every top-level sequence, for building the artifact ancestry.
    fn roots(&self) -> Vec<Arc<Sequence>>;
}

/// The in, out and fault sequences of an entry artifact.
#[derive(Debug, Clone, Default)]
struct EntrySequences {
    in_sequence: Option<Arc<Sequence>>,
    out_sequence: Option<Arc<Sequence>>,
    fault_sequence: Option<Arc<Sequence>>,
}

impl EntrySequences {
    fn get(&self, kind: SequenceKind) -> Option<Arc<Sequence>> {
        match kind {
            SequenceKind::ProxyIn | SequenceKind::ApiIn => self.in_sequence.clone(),
            SequenceKind::ProxyOut | SequenceKind::ApiOut => self.out_sequence.clone(),
            SequenceKind::ProxyFault | SequenceKind::ApiFault => self.fault_sequence.clone(),
            SequenceKind::Named | SequenceKind::Anonymous => None,
        }
    }

    fn set(&mut self, sequence: Sequence) {
        let sequence = Arc::new(sequence);
        match sequence.sequence_kind() {
            SequenceKind::ProxyIn | SequenceKind::ApiIn => self.in_sequence = Some(sequence),
            SequenceKind::ProxyOut | SequenceKind::ApiOut => self.out_sequence = Some(sequence),
            SequenceKind::ProxyFault | SequenceKind::ApiFault => {
                self.fault_sequence = Some(sequence);
            }
            SequenceKind::Named | SequenceKind::Anonymous => {}
        }
    }

    fn all(&self) -> impl Iterator<Item = Arc<Sequence>> + '_ {
        [&self.in_sequence, &self.out_sequence, &self.fault_sequence]
            .into_iter()
            .flatten()
            .cloned()
    }
}

/// A proxy service with its in, out and fault sequences.
#[derive(Debug, Clone)]
pub struct ProxyService {
    name: String,
    sequences: EntrySequences,
}

impl ProxyService {
    /// Creates a proxy service without sequences.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequences: EntrySequences::default(),
        }
    }

    /// Returns the proxy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the in-sequence.
    #[must_use]
    pub fn with_in_sequence(self, children: Vec<Arc<dyn Mediator>>) -> Self {
        self.with(SequenceKind::ProxyIn, children)
    }

    /// Sets the out-sequence.
    #[must_use]
    pub fn with_out_sequence(self, children: Vec<Arc<dyn Mediator>>) -> Self {
        self.with(SequenceKind::ProxyOut, children)
    }

    /// Sets the fault sequence.
    #[must_use]
    pub fn with_fault_sequence(self, children: Vec<Arc<dyn Mediator>>) -> Self {
        self.with(SequenceKind::ProxyFault, children)
    }

    fn with(mut self, kind: SequenceKind, children: Vec<Arc<dyn Mediator>>) -> Self {
        let sequence = Sequence::for_proxy(self.name.as_str(), kind, children);
        self.sequences.set(sequence);
        self
    }
}

/// A resource of a REST API with its in, out and fault sequences.
#[derive(Debug, Clone)]
pub struct ApiResource {
    api: String,
    resource: String,
    sequences: EntrySequences,
}

impl ApiResource {
    /// Creates a resource without sequences.
    #[must_use]
    pub fn new(api: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            resource: resource.into(),
            sequences: EntrySequences::default(),
        }
    }

    /// Returns the API name.
    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    /// Returns the resource name.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Sets the in-sequence.
    #[must_use]
    pub fn with_in_sequence(self, children: Vec<Arc<dyn Mediator>>) -> Self {
        self.with(SequenceKind::ApiIn, children)
    }

    /// Sets the out-sequence.
    #[must_use]
    pub fn with_out_sequence(self, children: Vec<Arc<dyn Mediator>>) -> Self {
        self.with(SequenceKind::ApiOut, children)
    }

    /// Sets the fault sequence.
    #[must_use]
    pub fn with_fault_sequence(self, children: Vec<Arc<dyn Mediator>>) -> Self {
        self.with(SequenceKind::ApiFault, children)
    }

    fn with(mut self, kind: SequenceKind, children: Vec<Arc<dyn Mediator>>) -> Self {
        let sequence = Sequence::for_api(self.api.as_str(), &self.resource, kind, children);
        self.sequences.set(sequence);
        self
    }
}

/// A pipeline graph held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineGraph {
    sequences: BTreeMap<String, Arc<Sequence>>,
    proxies: BTreeMap<String, ProxyService>,
    apis: BTreeMap<(String, String), ApiResource>,
    templates: BTreeMap<String, Arc<Sequence>>,
}

impl InMemoryPipelineGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploys a named sequence.
    #[must_use]
    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequences
            .insert(sequence.name().to_string(), Arc::new(sequence));
        self
    }

    /// Deploys a proxy service.
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyService) -> Self {
        self.proxies.insert(proxy.name.clone(), proxy);
        self
    }

    /// Deploys an API resource.
    #[must_use]
    pub fn with_api(mut self, resource: ApiResource) -> Self {
        self.apis
            .insert((resource.api.clone(), resource.resource.clone()), resource);
        self
    }

    /// Deploys a template.
    #[must_use]
    pub fn with_template(mut self, template: Sequence) -> Self {
        self.templates
            .insert(template.name().to_string(), Arc::new(template));
        self
    }
}

impl PipelineGraph for InMemoryPipelineGraph {
    fn named_sequence(&self, name: &str) -> Option<Arc<Sequence>> {
        self.sequences.get(name).cloned()
    }

    fn proxy_sequence(&self, proxy: &str, kind: SequenceKind) -> Option<Arc<Sequence>> {
        self.proxies.get(proxy)?.sequences.get(kind)
    }

    fn api_sequence(&self, api: &str, resource: &str, kind: SequenceKind) -> Option<Arc<Sequence>> {
        self.apis
            .get(&(api.to_string(), resource.to_string()))?
            .sequences
            .get(kind)
    }

    fn template(&self, name: &str) -> Option<Arc<Sequence>> {
        self.templates.get(name).cloned()
    }

    fn roots(&self) -> Vec<Arc<Sequence>> {
        self.sequences
            .values()
            .cloned()
            .chain(self.proxies.values().flat_map(|proxy| proxy.sequences.all()))
            .chain(self.apis.values().flat_map(|api| api.sequences.all()))
            .chain(self.templates.values().cloned())
            .collect()
    }
}

/// Maps the sequence entry of a continuation stack to the deployed sequence.
///
/// API sequences are looked up for the resource the message entered through.
pub fn resolve_sequence(
    graph: &dyn PipelineGraph,
    node: &ContinuationNode,
    ctx: &MessageContext,
) -> Result<Arc<Sequence>, MediationError> {
    let (Some(kind), Some(name)) = (node.sequence_kind(), node.sequence_name()) else {
        return Err(
            ContinuationError::new("continuation stack", node.position(), "entry is not a sequence")
                .into(),
        );
    };

    let found = match kind {
        SequenceKind::Named => graph
            .named_sequence(name)
            .ok_or_else(|| ArtifactNotFoundError::new(ArtifactKind::Sequence, name)),
        SequenceKind::ProxyIn | SequenceKind::ProxyOut | SequenceKind::ProxyFault => graph
            .proxy_sequence(name, kind)
            .ok_or_else(|| ArtifactNotFoundError::new(ArtifactKind::ProxyService, name)),
        SequenceKind::ApiIn | SequenceKind::ApiOut | SequenceKind::ApiFault => {
            let resource = ctx.entry().resource.as_deref().unwrap_or_default();
            graph
                .api_sequence(name, resource, kind)
                .ok_or_else(|| {
                    ArtifactNotFoundError::new(ArtifactKind::ApiResource, format!("{name}{resource}"))
                })
        }
        SequenceKind::Anonymous => {
            return Err(ContinuationError::new(
                name,
                node.position(),
                "anonymous sequences are never dispatched",
            )
            .into());
        }
    };
    Ok(found?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediators::LogMediator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn log() -> Arc<dyn Mediator> {
        Arc::new(LogMediator::info("hello"))
    }

    fn graph() -> InMemoryPipelineGraph {
        InMemoryPipelineGraph::new()
            .with_sequence(Sequence::named("main", vec![log()]))
            .with_proxy(
                ProxyService::new("orders")
                    .with_in_sequence(vec![log()])
                    .with_out_sequence(vec![]),
            )
            .with_api(ApiResource::new("shop", "/items").with_fault_sequence(vec![log()]))
            .with_template(Sequence::template("lookup", vec![]))
    }

    #[test]
    fn test_lookups() {
        let graph = graph();
        assert!(graph.named_sequence("main").is_some());
        assert!(graph.proxy_sequence("orders", SequenceKind::ProxyIn).is_some());
        assert!(graph.proxy_sequence("orders", SequenceKind::ProxyFault).is_none());
        assert!(graph
            .api_sequence("shop", "/items", SequenceKind::ApiFault)
            .is_some());
        assert!(graph.template("lookup").is_some());
        assert_eq!(graph.roots().len(), 5);
    }

    #[test]
    fn test_resolve_named_and_proxy() {
        let graph = graph();
        let ctx = MessageContext::new(json!(null));

        let main = resolve_sequence(&graph, &ContinuationNode::sequence(SequenceKind::Named, "main"), &ctx)
            .unwrap();
        assert_eq!(main.name(), "main");

        let proxy_in = resolve_sequence(
            &graph,
            &ContinuationNode::sequence(SequenceKind::ProxyIn, "orders"),
            &ctx,
        )
        .unwrap();
        assert_eq!(proxy_in.sequence_kind(), SequenceKind::ProxyIn);
    }

    #[test]
    fn test_resolve_api_uses_entry_resource() {
        let graph = graph();
        let ctx = MessageContext::new(json!(null)).with_api("shop", "/items");
        let node = ContinuationNode::sequence(SequenceKind::ApiFault, "shop");
        assert!(resolve_sequence(&graph, &node, &ctx).is_ok());

        let other = MessageContext::new(json!(null)).with_api("shop", "/other");
        let err = resolve_sequence(&graph, &node, &other).unwrap_err();
        assert!(matches!(err, MediationError::ArtifactNotFound(ref e) if e.kind == ArtifactKind::ApiResource));
    }

    #[test]
    fn test_missing_artifacts_are_fatal() {
        let graph = graph();
        let ctx = MessageContext::new(json!(null));

        let err = resolve_sequence(&graph, &ContinuationNode::sequence(SequenceKind::Named, "gone"), &ctx)
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "sequence 'gone' not found");

        let err = resolve_sequence(&graph, &ContinuationNode::sub_branch(0), &ctx).unwrap_err();
        assert!(matches!(err, MediationError::Continuation(_)));
    }
}
