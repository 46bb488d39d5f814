//! The environment a mediator runs in.

use super::Mediator;
use crate::context::MessageContext;
use crate::continuation::ContinuationStackManager;
use crate::core::{ComponentId, ComponentKind};
use crate::engine::{MediationEnv, PendingCalls};
use crate::errors::MediationError;
use crate::pipeline::PipelineGraph;
use std::sync::Arc;
use tracing::debug;

/// A message, the engine environment and the position of the running
/// component within its parent's child list.
#[derive(Debug, Clone, Copy)]
pub struct MediationScope<'a> {
    env: &'a MediationEnv,
    message: &'a Arc<MessageContext>,
    position: usize,
}

impl<'a> MediationScope<'a> {
    /// Creates a scope at position 0.
    #[must_use]
    pub fn new(env: &'a MediationEnv, message: &'a Arc<MessageContext>) -> Self {
        Self {
            env,
            message,
            position: 0,
        }
    }

    /// The same scope at another position.
    #[must_use]
    pub fn at(&self, position: usize) -> Self {
        Self { position, ..*self }
    }

    /// The same scope for another message copy.
    #[must_use]
    pub fn for_message<'b>(&'b self, message: &'b Arc<MessageContext>) -> MediationScope<'b> {
        MediationScope {
            env: self.env,
            message,
            position: self.position,
        }
    }

    /// Returns the engine environment.
    #[must_use]
    pub fn env(&self) -> &'a MediationEnv {
        self.env
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &'a Arc<MessageContext> {
        self.message
    }

    /// Position of the running component within its parent.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the continuation stack manager.
    #[must_use]
    pub fn stacks(&self) -> &'a ContinuationStackManager {
        self.env.stacks()
    }

    /// Returns the pipeline graph.
    #[must_use]
    pub fn graph(&self) -> &'a dyn PipelineGraph {
        self.env.graph()
    }

    /// Returns the table of messages waiting for a response.
    #[must_use]
    pub fn pending(&self) -> &'a PendingCalls {
        self.env.pending()
    }

    /// Mediates `child` inside its own span.
    ///
    /// The span stays open when the child suspends; whoever resumes the
    /// message closes it.
    pub fn run_traced(&self, child: &dyn Mediator) -> Result<bool, MediationError> {
        let span = self.open_component(
            child.component_id(),
            child.kind(),
            child.name(),
            child.is_flow_continuable(),
        );
        let done = child.mediate(self)?;
        if done {
            if let Some(index) = span {
                self.close_span(index);
            }
        }
        Ok(done)
    }

    /// Opens a span for a component when the message is traced.
    pub fn open_component(
        &self,
        id: &ComponentId,
        kind: ComponentKind,
        name: &str,
        flow_continuable: bool,
    ) -> Option<u32> {
        self.env
            .spans()?
            .open(self.message, id, kind, name, flow_continuable)
    }

    /// Closes the span at `index`.
    pub fn close_span(&self, index: u32) {
        if let Some(spans) = self.env.spans() {
            spans.close(self.message, index);
        }
    }

    /// Closes the innermost open span of the message.
    pub fn close_current(&self) {
        if let Some(spans) = self.env.spans() {
            spans.close_current(self.message);
        }
    }

    /// Ends mediation of this message copy: empties its continuation stack and
    /// closes the spans it still has open.
    pub fn abandon(&self) {
        self.stacks().clear(self.message);
        if let Some(spans) = self.env.spans() {
            spans.close_all(self.message);
        }
        self.message.restore_parent_chain(Vec::new());
        self.message.mark_finished();
        debug!(message_id = %self.message.execution_id(), "Message copy finished");
    }
}
