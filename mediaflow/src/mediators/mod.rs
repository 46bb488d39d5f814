//! Mediators: the components sequences are built of.
//!
//! Mediation is synchronous. A mediator returns `Ok(true)` once the message
//! has moved past it and `Ok(false)` when the message suspended (or was
//! taken over by copies) and the caller must stop. Branching mediators
//! implement [`Resumable`] so a suspended message can re-enter them from a
//! saved [`ContinuationNode`].

mod call;
mod filter;
mod invoke;
mod leaf;
mod scope;
mod sequence;
mod split;

pub use call::{CallMediator, SendMediator};
pub use filter::{FilterMediator, Predicate};
pub use invoke::InvokeMediator;
pub use leaf::{LogMediator, PropertyMediator};
pub use scope::MediationScope;
pub use sequence::{Sequence, SequenceReference};
pub use split::{ForeachMediator, IterateMediator, ITERATION_PROPERTY};

use crate::continuation::ContinuationNode;
use crate::core::{ComponentId, ComponentKind};
use crate::errors::MediationError;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline components.
pub trait Mediator: Send + Sync + Debug {
    /// Static identity, assigned when the pipeline is built.
    fn component_id(&self) -> &ComponentId;

    /// Returns the name of the mediator.
    fn name(&self) -> &str;

    /// Returns the component kind.
    fn kind(&self) -> ComponentKind;

    /// Returns true if the mediator can suspend and later resume.
    fn is_flow_continuable(&self) -> bool {
        false
    }

    /// Mediates the message of `scope`.
    fn mediate(&self, scope: &MediationScope<'_>) -> Result<bool, MediationError>;

    /// Returns the resume entry point of branching mediators.
    fn as_resumable(&self) -> Option<&dyn Resumable> {
        None
    }

    /// Components nested in this one, for building the artifact ancestry.
    fn structural_children(&self) -> Vec<Arc<dyn Mediator>> {
        Vec::new()
    }
}

/// Re-entry point of a branching mediator.
pub trait Resumable {
    /// Continues mediation from `node`.
    ///
    /// Without a nested child the mediator continues just past
    /// `node.position()`; with one it first resumes the component at that
    /// position. Returns false if the message suspended again.
    fn resume(
        &self,
        scope: &MediationScope<'_>,
        node: &ContinuationNode,
    ) -> Result<bool, MediationError>;
}
