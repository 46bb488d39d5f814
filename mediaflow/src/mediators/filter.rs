//! Conditional branching.

use super::{MediationScope, Mediator, Resumable, Sequence};
use crate::context::MessageContext;
use crate::continuation::ContinuationNode;
use crate::core::{ComponentId, ComponentKind, MediatorKind};
use crate::errors::{ContinuationError, MediationError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Decides which branch of a [`FilterMediator`] runs.
pub type Predicate = Arc<dyn Fn(&MessageContext) -> bool + Send + Sync>;

const THEN_BRANCH: u32 = 0;
const ELSE_BRANCH: u32 = 1;

/// Runs the `then` branch when the predicate holds, the `else` branch otherwise.
pub struct FilterMediator {
    id: ComponentId,
    predicate: Predicate,
    then_branch: Arc<Sequence>,
    else_branch: Option<Arc<Sequence>>,
}

impl fmt::Debug for FilterMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterMediator")
            .field("id", &self.id)
            .field("then_branch", &self.then_branch)
            .field("else_branch", &self.else_branch)
            .finish_non_exhaustive()
    }
}

impl FilterMediator {
    /// Creates a filter with a `then` branch.
    #[must_use]
    pub fn new(predicate: Predicate, then_branch: Vec<Arc<dyn Mediator>>) -> Self {
        Self {
            id: ComponentId::generate("filter"),
            predicate,
            then_branch: Arc::new(Sequence::anonymous(then_branch)),
            else_branch: None,
        }
    }

    /// Creates a filter matching a message property against `expected`.
    #[must_use]
    pub fn property_equals(
        key: impl Into<String>,
        expected: Value,
        then_branch: Vec<Arc<dyn Mediator>>,
    ) -> Self {
        let key = key.into();
        let predicate: Predicate =
            Arc::new(move |ctx: &MessageContext| ctx.property(&key).is_some_and(|value| value == expected));
        Self::new(predicate, then_branch)
    }

    /// Sets the `else` branch.
    #[must_use]
    pub fn with_else(mut self, else_branch: Vec<Arc<dyn Mediator>>) -> Self {
        self.else_branch = Some(Arc::new(Sequence::anonymous(else_branch)));
        self
    }

    /// Overrides the component id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }

    fn branch(&self, branch_id: u32) -> Option<&Arc<Sequence>> {
        match branch_id {
            THEN_BRANCH => Some(&self.then_branch),
            ELSE_BRANCH => self.else_branch.as_ref(),
            _ => None,
        }
    }
}

impl Mediator for FilterMediator {
    fn component_id(&self) -> &ComponentId {
        &self.id
    }

    fn name(&self) -> &str {
        "filter"
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Mediator(MediatorKind::Filter)
    }

    fn is_flow_continuable(&self) -> bool {
        true
    }

    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError> {
        let branch_id = if (self.predicate)(scope.message()) {
            THEN_BRANCH
        } else {
            ELSE_BRANCH
        };
        let Some(body) = self.branch(branch_id) else {
            return Ok(true);
        };
        scope
            .stacks()
            .add_sub_branch(scope.message(), branch_id, scope.position());
        body.mediate(scope)
    }

    fn as_resumable(&self) -> Option<&dyn Resumable> {
        Some(self)
    }

    fn structural_children(&self) -> Vec<Arc<dyn Mediator>> {
        let mut children: Vec<Arc<dyn Mediator>> = vec![self.then_branch.clone()];
        if let Some(else_branch) = &self.else_branch {
            children.push(else_branch.clone());
        }
        children
    }
}

impl Resumable for FilterMediator {
    fn resume(
        &self,
        scope: &MediationScope<'_>,
        node: &ContinuationNode,
    ) -> Result<bool, MediationError> {
        let branch_id = node.branch_id().unwrap_or(THEN_BRANCH);
        let body = self.branch(branch_id).ok_or_else(|| {
            ContinuationError::new("filter", scope.position(), format!("no branch {branch_id}"))
        })?;
        body.resume(scope, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_predicate() {
        let filter = FilterMediator::property_equals("route", json!("fast"), vec![]);
        let ctx = MessageContext::new(json!(null));
        assert!(!(filter.predicate)(&ctx));
        ctx.set_property("route", json!("fast"));
        assert!((filter.predicate)(&ctx));
    }

    #[test]
    fn test_branches() {
        let filter = FilterMediator::new(Arc::new(|_: &MessageContext| true), vec![]);
        assert!(filter.branch(THEN_BRANCH).is_some());
        assert!(filter.branch(ELSE_BRANCH).is_none());
        assert_eq!(filter.structural_children().len(), 1);

        let filter = filter.with_else(vec![]);
        assert!(filter.branch(ELSE_BRANCH).is_some());
        assert_eq!(filter.structural_children().len(), 2);
    }
}
