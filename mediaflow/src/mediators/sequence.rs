//! Sequences and references to named sequences.

use super::{MediationScope, Mediator, Resumable};
use crate::continuation::ContinuationNode;
use crate::core::{ComponentId, ComponentKind, MediatorKind, SequenceKind};
use crate::errors::{ArtifactKind, ArtifactNotFoundError, ContinuationError, MediationError};
use std::sync::Arc;
use tracing::trace;

/// An ordered list of mediators.
///
/// Named, proxy and API sequences push a continuation entry while they run;
/// anonymous sequences and templates run inline in the branch their caller
/// opened and remove that branch when they complete.
#[derive(Debug)]
pub struct Sequence {
    id: ComponentId,
    name: String,
    component_kind: ComponentKind,
    sequence_kind: SequenceKind,
    children: Vec<Arc<dyn Mediator>>,
}

impl Sequence {
    fn build(
        id: ComponentId,
        name: String,
        component_kind: ComponentKind,
        sequence_kind: SequenceKind,
        children: Vec<Arc<dyn Mediator>>,
    ) -> Self {
        Self {
            id,
            name,
            component_kind,
            sequence_kind,
            children,
        }
    }

    /// Creates a named sequence.
    #[must_use]
    pub fn named(name: impl Into<String>, children: Vec<Arc<dyn Mediator>>) -> Self {
        let name = name.into();
        Self::build(
            ComponentId::new(format!("sequence:{name}")),
            name,
            ComponentKind::Sequence,
            SequenceKind::Named,
            children,
        )
    }

    /// Creates an inline sequence.
    #[must_use]
    pub fn anonymous(children: Vec<Arc<dyn Mediator>>) -> Self {
        Self::build(
            ComponentId::generate("anonymous"),
            "anonymous".to_string(),
            ComponentKind::AnonymousSequence,
            SequenceKind::Anonymous,
            children,
        )
    }

    /// Creates a template body.
    #[must_use]
    pub fn template(name: impl Into<String>, children: Vec<Arc<dyn Mediator>>) -> Self {
        let name = name.into();
        Self::build(
            ComponentId::new(format!("template:{name}")),
            name,
            ComponentKind::Template,
            SequenceKind::Anonymous,
            children,
        )
    }

    /// Creates one of the sequences of a proxy service.
    #[must_use]
    pub fn for_proxy(
        proxy: impl Into<String>,
        kind: SequenceKind,
        children: Vec<Arc<dyn Mediator>>,
    ) -> Self {
        let proxy = proxy.into();
        Self::build(
            ComponentId::new(format!("proxy:{proxy}:{kind}")),
            proxy,
            ComponentKind::ProxyService,
            kind,
            children,
        )
    }

    /// Creates one of the sequences of an API resource.
    #[must_use]
    pub fn for_api(
        api: impl Into<String>,
        resource: &str,
        kind: SequenceKind,
        children: Vec<Arc<dyn Mediator>>,
    ) -> Self {
        let api = api.into();
        Self::build(
            ComponentId::new(format!("api:{api}:{resource}:{kind}")),
            api,
            ComponentKind::ApiResource,
            kind,
            children,
        )
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }

    /// Where the sequence lives in the pipeline graph.
    #[must_use]
    pub fn sequence_kind(&self) -> SequenceKind {
        self.sequence_kind
    }

    /// Returns the child mediators.
    #[must_use]
    pub fn children(&self) -> &[Arc<dyn Mediator>] {
        &self.children
    }

    /// Runs the children from `start` to the end.
    ///
    /// The position of every flow continuable child is saved before it runs.
    pub fn mediate_from(
        &self,
        scope: &MediationScope<'_>,
        start: usize,
    ) -> Result<bool, MediationError> {
        for (position, child) in self.children.iter().enumerate().skip(start) {
            if child.is_flow_continuable() {
                scope.stacks().update_position(scope.message(), position);
            }
            if !scope.at(position).run_traced(child.as_ref())? {
                trace!(
                    message_id = %scope.message().execution_id(),
                    sequence = %self.name,
                    position,
                    "Sequence suspended"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn finish(&self, scope: &MediationScope<'_>, span: Option<u32>) {
        scope
            .stacks()
            .exit_sequence(scope.message(), self.sequence_kind);
        match span {
            Some(index) => scope.close_span(index),
            None => scope.close_current(),
        }
    }
}

impl Mediator for Sequence {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        self.component_kind
    }

    fn is_flow_continuable(&self) -> bool {
        true
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        let span = scope.open_component(&self.id, self.component_kind, &self.name, true);
        scope
            .stacks()
            .push_sequence(scope.message(), self.sequence_kind, &self.name);

        let done = self.mediate_from(scope, 0)?;
        if done {
            self.finish(scope, span);
        }
        Ok(done)
    }

    fn as_resumable(&self) -> Option<&dyn Resumable> {
        Some(self)
    }

    fn structural_children(&self) -> Vec<Arc<dyn Mediator>> {
        self.children.clone()
    }
}

impl Resumable for Sequence {
    fn resume(
        &self,
        scope: &MediationScope<'_>,
        node: &ContinuationNode,
    ) -> Result<bool, MediationError> {
        let position = node.position();
        // named sequences saved their own span when they were pushed
        let own_span = if self.sequence_kind.is_anonymous() {
            None
        } else {
            node.stats_parent_index()
        };
        // the span of the component at `position` is still open, unless the
        // chain was restored and ends at the sequence itself
        let close_child = || {
            if own_span.is_none() || scope.message().current_flow_index() != own_span {
                scope.close_current();
            }
        };

        match node.child() {
            None => close_child(),
            Some(branch) => {
                let child = self.children.get(position).ok_or_else(|| {
                    ContinuationError::new(self.name.as_str(), position, "no component at the saved position")
                })?;
                let resumable = child.as_resumable().ok_or_else(|| {
                    ContinuationError::new(child.name(), position, "component cannot resume a branch")
                })?;
                if !resumable.resume(&scope.at(position), branch)? {
                    return Ok(false);
                }
                close_child();
            }
        }

        let done = self.mediate_from(scope, position + 1)?;
        if done {
            self.finish(scope, own_span);
        }
        Ok(done)
    }
}

/// Runs a named sequence looked up in the pipeline graph.
#[derive(Debug)]
pub struct SequenceReference {
    id: ComponentId,
    target: String,
}

impl SequenceReference {
    /// Creates a reference to the named sequence `target`.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            id: ComponentId::generate(&format!("sequence-ref:{target}")),
            target,
        }
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }
}

impl Mediator for SequenceReference {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.target
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Sequence)
    }

    fn is_flow_continuable(&self) -> bool {
        true
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        let sequence = scope
            .graph()
            .named_sequence(&self.target)
            .ok_or_else(|| ArtifactNotFoundError::new(ArtifactKind::Sequence, self.target.as_str()))?;
        sequence.mediate(scope)
    }
}
