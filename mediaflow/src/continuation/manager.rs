//! Continuation stack manager.
//!
//! Every operation is a no-op for messages with continuation tracking
//! disabled. Operations that expect a stack entry and find none log a warning
//! and do nothing: a pipeline redeployed while a message was in flight can
//! legitimately leave a message without its entry.

use super::{ContinuationNode, ContinuationStack};
use crate::context::MessageContext;
use crate::core::SequenceKind;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives notifications about continuation stack changes.
///
/// Notifications are only delivered for messages with tracing enabled, and
/// always after the stack has been changed.
pub trait StackObserver: Send + Sync {
    /// A sequence node was pushed.
    fn on_stack_push(&self, ctx: &MessageContext, node: &ContinuationNode);

    /// A sequence node was popped.
    fn on_stack_pop(&self, ctx: &MessageContext, node: &ContinuationNode);

    /// The stack was cleared.
    fn on_stack_clear(&self, ctx: &MessageContext);
}

/// Push/pop/update operations on message continuation stacks.
#[derive(Default, Clone)]
pub struct ContinuationStackManager {
    observer: Option<Arc<dyn StackObserver>>,
}

impl fmt::Debug for ContinuationStackManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationStackManager")
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl ContinuationStackManager {
    /// Creates a manager without an observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the observer notified of stack changes.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StackObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn observer_for(&self, ctx: &MessageContext) -> Option<&Arc<dyn StackObserver>> {
        if ctx.is_tracing_enabled() {
            self.observer.as_ref()
        } else {
            None
        }
    }

    fn stack(ctx: &MessageContext) -> Option<&ContinuationStack> {
        ctx.is_continuation_enabled().then(|| ctx.continuation())
    }

    fn capture_stats(ctx: &MessageContext, node: &mut ContinuationNode) {
        if ctx.is_tracing_enabled() {
            node.set_stats(ctx.current_flow_index(), Some(ctx.parent_chain()));
        }
    }

    /// Pushes a node for a named sequence. Anonymous sequences are ignored.
    pub fn push_sequence(&self, ctx: &MessageContext, kind: SequenceKind, name: &str) {
        let Some(stack) = Self::stack(ctx) else {
            return;
        };
        if kind.is_anonymous() {
            return;
        }

        let mut node = ContinuationNode::sequence(kind, name);
        Self::capture_stats(ctx, &mut node);
        stack.push(node.clone());
        debug!(
            message_id = %ctx.execution_id(),
            sequence = name,
            kind = %kind,
            depth = stack.len(),
            "Pushed sequence continuation"
        );

        if let Some(observer) = self.observer_for(ctx) {
            observer.on_stack_push(ctx, &node);
        }
    }

    /// Pops the top node.
    pub fn pop_sequence(&self, ctx: &MessageContext) -> Option<ContinuationNode> {
        let stack = Self::stack(ctx)?;
        let Some(node) = stack.pop() else {
            warn!(
                message_id = %ctx.execution_id(),
                "Continuation stack empty on sequence exit; skipping pop"
            );
            return None;
        };
        debug!(
            message_id = %ctx.execution_id(),
            sequence = node.sequence_name().unwrap_or_default(),
            depth = stack.len(),
            "Popped sequence continuation"
        );

        if let Some(observer) = self.observer_for(ctx) {
            observer.on_stack_pop(ctx, &node);
        }
        Some(node)
    }

    /// Leaves a sequence of the given kind: pops named sequences, removes the
    /// innermost branch for anonymous ones.
    pub fn exit_sequence(&self, ctx: &MessageContext, kind: SequenceKind) {
        if kind.is_anonymous() {
            self.remove_sub_branch(ctx);
        } else {
            self.pop_sequence(ctx);
        }
    }

    /// Removes the innermost branch below the top node.
    pub fn remove_sub_branch(&self, ctx: &MessageContext) -> Option<ContinuationNode> {
        let stack = Self::stack(ctx)?;
        match stack.with_top(ContinuationNode::remove_leaf_child) {
            Some(removed) => removed,
            None => {
                warn!(
                    message_id = %ctx.execution_id(),
                    "Continuation stack empty while leaving a branch; skipping"
                );
                None
            }
        }
    }

    /// Sets the position of the innermost node of the top entry.
    pub fn update_position(&self, ctx: &MessageContext, position: usize) {
        let Some(stack) = Self::stack(ctx) else {
            return;
        };
        if stack
            .with_top(|node| node.leaf_mut().set_position(position))
            .is_none()
        {
            warn!(
                message_id = %ctx.execution_id(),
                position,
                "Continuation stack empty on position update; skipping"
            );
        }
    }

    /// Records `position` on the innermost node, then opens a new branch below it.
    pub fn add_sub_branch(&self, ctx: &MessageContext, branch_id: u32, position: usize) {
        let Some(stack) = Self::stack(ctx) else {
            return;
        };
        let mut branch = ContinuationNode::sub_branch(branch_id);
        Self::capture_stats(ctx, &mut branch);

        let added = stack.with_top(|node| {
            node.leaf_mut().set_position(position);
            node.add_leaf_child(branch);
            node.depth()
        });
        match added {
            Some(depth) => debug!(
                message_id = %ctx.execution_id(),
                branch_id,
                position,
                depth,
                "Added sub-branch continuation"
            ),
            None => warn!(
                message_id = %ctx.execution_id(),
                branch_id,
                "Continuation stack empty on branch entry; skipping"
            ),
        }
    }

    /// Replaces the innermost branch in place with a fresh node for `branch_id`.
    pub fn reset_leaf_branch(&self, ctx: &MessageContext, branch_id: u32) {
        let Some(stack) = Self::stack(ctx) else {
            return;
        };
        match stack.with_top(|node| node.leaf_mut().reset_branch(branch_id)) {
            Some(true) => debug!(
                message_id = %ctx.execution_id(),
                branch_id,
                "Reset sub-branch continuation"
            ),
            Some(false) => warn!(
                message_id = %ctx.execution_id(),
                "Innermost continuation is not a branch; skipping reset"
            ),
            None => warn!(
                message_id = %ctx.execution_id(),
                "Continuation stack empty on branch reset; skipping"
            ),
        }
    }

    /// Returns a copy of the top node.
    #[must_use]
    pub fn peek(&self, ctx: &MessageContext) -> Option<ContinuationNode> {
        Self::stack(ctx)?.peek()
    }

    /// Returns the number of entries on the stack.
    #[must_use]
    pub fn depth(&self, ctx: &MessageContext) -> usize {
        Self::stack(ctx).map_or(0, ContinuationStack::len)
    }

    /// Empties the stack.
    pub fn clear(&self, ctx: &MessageContext) {
        let Some(stack) = Self::stack(ctx) else {
            return;
        };
        let removed = stack.clear();
        debug!(
            message_id = %ctx.execution_id(),
            removed,
            "Cleared continuation stack"
        );

        if let Some(observer) = self.observer_for(ctx) {
            observer.on_stack_clear(ctx);
        }
    }

    /// Deep-copies a node and its whole chain.
    #[must_use]
    pub fn clone_node(&self, node: &ContinuationNode) -> ContinuationNode {
        node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx() -> MessageContext {
        MessageContext::new(json!(null))
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl StackObserver for RecordingObserver {
        fn on_stack_push(&self, ctx: &MessageContext, node: &ContinuationNode) {
            // the node is already on the stack when observers run
            let depth = ctx.continuation().len();
            self.events
                .lock()
                .push(format!("push:{}:{depth}", node.sequence_name().unwrap_or_default()));
        }

        fn on_stack_pop(&self, _ctx: &MessageContext, node: &ContinuationNode) {
            self.events
                .lock()
                .push(format!("pop:{}", node.sequence_name().unwrap_or_default()));
        }

        fn on_stack_clear(&self, ctx: &MessageContext) {
            self.events
                .lock()
                .push(format!("clear:{}", ctx.continuation().len()));
        }
    }

    #[test]
    fn test_anonymous_sequences_are_not_pushed() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        manager.push_sequence(&ctx, SequenceKind::Anonymous, "inline");
        assert_eq!(manager.depth(&ctx), 0);
    }

    #[test]
    fn test_stack_balance() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        manager.push_sequence(&ctx, SequenceKind::ProxyIn, "OrderProxy");
        manager.push_sequence(&ctx, SequenceKind::Named, "enrich");
        manager.push_sequence(&ctx, SequenceKind::Named, "lookup");
        manager.pop_sequence(&ctx);
        manager.pop_sequence(&ctx);
        assert_eq!(manager.depth(&ctx), 1);
        manager.pop_sequence(&ctx);
        assert_eq!(manager.depth(&ctx), 0);
    }

    #[test]
    fn test_clear_always_empties() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        for depth in 0..5 {
            for i in 0..depth {
                manager.push_sequence(&ctx, SequenceKind::Named, &format!("s{i}"));
                manager.add_sub_branch(&ctx, 0, i);
            }
            manager.clear(&ctx);
            assert!(manager.peek(&ctx).is_none());
        }
    }

    #[test]
    fn test_operations_on_empty_stack_are_skipped() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        manager.update_position(&ctx, 3);
        manager.add_sub_branch(&ctx, 1, 2);
        manager.reset_leaf_branch(&ctx, 0);
        assert!(manager.remove_sub_branch(&ctx).is_none());
        assert!(manager.pop_sequence(&ctx).is_none());
        assert_eq!(manager.depth(&ctx), 0);
    }

    #[test]
    fn test_disabled_continuation_is_noop() {
        let manager = ContinuationStackManager::new();
        let ctx = MessageContext::new(json!(null)).with_continuation(false);
        manager.push_sequence(&ctx, SequenceKind::Named, "main");
        manager.add_sub_branch(&ctx, 0, 1);
        assert!(ctx.continuation().is_empty());
        assert!(manager.peek(&ctx).is_none());
    }

    #[test]
    fn test_update_position_targets_leaf() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        manager.push_sequence(&ctx, SequenceKind::Named, "main");
        manager.update_position(&ctx, 2);
        manager.add_sub_branch(&ctx, 0, 4);
        manager.update_position(&ctx, 1);

        let top = manager.peek(&ctx).unwrap();
        assert_eq!(top.position(), 4);
        assert_eq!(top.leaf().position(), 1);
        assert_eq!(top.leaf().branch_id(), Some(0));
    }

    #[test]
    fn test_branch_unwinding_scenario() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        manager.push_sequence(&ctx, SequenceKind::Named, "main");
        manager.add_sub_branch(&ctx, 0, 3);
        manager.add_sub_branch(&ctx, 1, 0);
        assert_eq!(manager.peek(&ctx).unwrap().depth(), 3);

        let removed = manager.remove_sub_branch(&ctx).unwrap();
        assert_eq!(removed.branch_id(), Some(1));
        let removed = manager.remove_sub_branch(&ctx).unwrap();
        assert_eq!(removed.branch_id(), Some(0));

        let mut expected = ContinuationNode::sequence(SequenceKind::Named, "main");
        expected.set_position(3);
        assert_eq!(manager.peek(&ctx), Some(expected));
        assert_eq!(manager.depth(&ctx), 1);
    }

    #[test]
    fn test_exit_sequence_dispatches_on_kind() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        manager.push_sequence(&ctx, SequenceKind::Named, "main");
        manager.add_sub_branch(&ctx, 0, 0);

        manager.exit_sequence(&ctx, SequenceKind::Anonymous);
        assert!(!manager.peek(&ctx).unwrap().has_child());

        manager.exit_sequence(&ctx, SequenceKind::Named);
        assert_eq!(manager.depth(&ctx), 0);
    }

    #[test]
    fn test_reset_leaf_branch() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        manager.push_sequence(&ctx, SequenceKind::Named, "main");
        manager.add_sub_branch(&ctx, 1, 2);
        manager.update_position(&ctx, 5);

        manager.reset_leaf_branch(&ctx, 0);
        let top = manager.peek(&ctx).unwrap();
        assert_eq!(top.position(), 2);
        assert_eq!(top.leaf().branch_id(), Some(0));
        assert_eq!(top.leaf().position(), 0);
    }

    #[test]
    fn test_clone_node_independence() {
        let manager = ContinuationStackManager::new();
        let ctx = ctx();
        manager.push_sequence(&ctx, SequenceKind::Named, "main");
        manager.add_sub_branch(&ctx, 0, 1);

        let original = manager.peek(&ctx).unwrap();
        let mut copy = manager.clone_node(&original);
        copy.leaf_mut().set_position(42);

        assert_eq!(original.leaf().position(), 0);
        manager.update_position(&ctx, 7);
        assert_eq!(copy.leaf().position(), 42);
    }

    #[test]
    fn test_observer_requires_tracing() {
        let observer = Arc::new(RecordingObserver::default());
        let manager = ContinuationStackManager::new().with_observer(observer.clone());

        let untraced = ctx();
        manager.push_sequence(&untraced, SequenceKind::Named, "main");
        manager.pop_sequence(&untraced);
        assert!(observer.events.lock().is_empty());

        let store = Arc::new(crate::observability::SpanStore::new(untraced.flow_id()));
        let traced = MessageContext::new(json!(null)).with_span_store(store);
        manager.push_sequence(&traced, SequenceKind::Named, "main");
        manager.push_sequence(&traced, SequenceKind::Named, "inner");
        manager.pop_sequence(&traced);
        manager.clear(&traced);

        assert_eq!(
            *observer.events.lock(),
            vec![
                "push:main:1".to_string(),
                "push:inner:2".to_string(),
                "pop:inner".to_string(),
                "clear:0".to_string(),
            ]
        );
    }

    #[test]
    fn test_stats_captured_when_tracing() {
        let manager = ContinuationStackManager::new();
        let store = Arc::new(crate::observability::SpanStore::new(crate::core::FlowId::new()));
        let ctx = MessageContext::new(json!(null)).with_span_store(store);
        ctx.push_flow_index(0);
        ctx.push_flow_index(2);

        manager.push_sequence(&ctx, SequenceKind::Named, "main");
        let top = manager.peek(&ctx).unwrap();
        assert_eq!(top.stats_parent_index(), Some(2));
        assert_eq!(top.stats_parent_chain(), Some(&[0, 2][..]));
    }
}
