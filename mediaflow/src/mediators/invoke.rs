//! Template invocation with an optional prefetch step.

use super::{MediationScope, Mediator, Resumable, Sequence};
use crate::continuation::ContinuationNode;
use crate::core::{ComponentId, ComponentKind, MediatorKind};
use crate::errors::{ArtifactKind, ArtifactNotFoundError, ContinuationError, MediationError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

const TEMPLATE_BRANCH: u32 = 0;
const PREFETCH_BRANCH: u32 = 1;

/// Runs a template looked up in the pipeline graph.
///
/// Parameters are copied onto the message as properties. When a prefetch
/// mediator is set it runs first in branch 1; once it has completed the
/// branch is reset in place to branch 0 so a later resume never runs it again.
#[derive(Debug)]
pub struct InvokeMediator {
    id: ComponentId,
    template: String,
    prefetch: Option<Arc<dyn Mediator>>,
    params: BTreeMap<String, Value>,
}

impl InvokeMediator {
    /// Creates an invocation of `template`.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            id: ComponentId::generate(&format!("invoke:{template}")),
            template,
            prefetch: None,
            params: BTreeMap::new(),
        }
    }

    /// Sets the prefetch mediator.
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: Arc<dyn Mediator>) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    /// Adds a template parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }

    fn template_sequence(&self, scope: &MediationScope<'_>) -> Result<Arc<Sequence>, MediationError> {
        scope
            .graph()
            .template(&self.template)
            .ok_or_else(|| ArtifactNotFoundError::new(ArtifactKind::Template, self.template.as_str()).into())
    }

    /// Switches the branch to the template body and runs it.
    fn run_template(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        scope
            .stacks()
            .reset_leaf_branch(scope.message(), TEMPLATE_BRANCH);
        self.template_sequence(scope)?.mediate(scope)
    }
}

impl Mediator for InvokeMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.template
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Invoke)
    }

    fn is_flow_continuable(&self) -> bool {
        true
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        for (key, value) in &self.params {
            scope.message().set_property(key.clone(), value.clone());
        }

        let Some(prefetch) = &self.prefetch else {
            scope
                .stacks()
                .add_sub_branch(scope.message(), TEMPLATE_BRANCH, scope.position());
            return self.template_sequence(scope)?.mediate(scope);
        };

        scope
            .stacks()
            .add_sub_branch(scope.message(), PREFETCH_BRANCH, scope.position());
        let prefetch_scope = scope.at(0);
        if prefetch.is_flow_continuable() {
            scope.stacks().update_position(scope.message(), 0);
        }
        if !prefetch_scope.run_traced(prefetch.as_ref())? {
            return Ok(false);
        }
        self.run_template(scope)
    }

    fn as_resumable(&self) -> Option<&dyn Resumable> {
        Some(self)
    }

    fn structural_children(&self) -> Vec<Arc<dyn Mediator>> {
        self.prefetch.iter().cloned().collect()
    }
}

impl Resumable for InvokeMediator {
    fn resume(
        &self,
        scope: &MediationScope<'_>,
        node: &ContinuationNode,
    ) -> Result<bool, MediationError> {
        match node.branch_id() {
            Some(PREFETCH_BRANCH) => {
                let prefetch = self.prefetch.as_ref().ok_or_else(|| {
                    ContinuationError::new(self.template.as_str(), scope.position(), "no prefetch step")
                })?;
                if let Some(child) = node.child() {
                    let resumable = prefetch.as_resumable().ok_or_else(|| {
                        ContinuationError::new(prefetch.name(), 0, "prefetch step cannot resume a branch")
                    })?;
                    if !resumable.resume(&scope.at(0), child)? {
                        return Ok(false);
                    }
                }
                // the prefetch span is still open
                scope.close_current();
                debug!(
                    message_id = %scope.message().execution_id(),
                    template = %self.template,
                    "Prefetch completed; continuing with template"
                );
                self.run_template(scope)
            }
            Some(TEMPLATE_BRANCH) => self.template_sequence(scope)?.resume(scope, node),
            other => Err(ContinuationError::new(
                self.template.as_str(),
                scope.position(),
                format!("unexpected branch {other:?}"),
            )
            .into()),
        }
    }
}
