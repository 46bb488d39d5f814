//! Per-message continuation stack.

use super::ContinuationNode;
use parking_lot::Mutex;

/// LIFO of root continuation nodes owned by one message.
///
/// Every access goes through a mutex so a message suspended on one worker can
/// be resumed on another.
#[derive(Debug, Default)]
pub struct ContinuationStack {
    nodes: Mutex<Vec<ContinuationNode>>,
}

impl ContinuationStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stack from existing root nodes, bottom first.
    #[must_use]
    pub fn from_nodes(nodes: Vec<ContinuationNode>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    /// Pushes a root node.
    pub fn push(&self, node: ContinuationNode) {
        self.nodes.lock().push(node);
    }

    /// Pops the top root node.
    pub fn pop(&self) -> Option<ContinuationNode> {
        self.nodes.lock().pop()
    }

    /// Returns a copy of the top root node.
    #[must_use]
    pub fn peek(&self) -> Option<ContinuationNode> {
        self.nodes.lock().last().cloned()
    }

    /// Runs `f` on the top root node while holding the lock.
    ///
    /// Returns `None` when the stack is empty.
    pub fn with_top<R>(&self, f: impl FnOnce(&mut ContinuationNode) -> R) -> Option<R> {
        self.nodes.lock().last_mut().map(f)
    }

    /// Removes every node and returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut nodes = self.nodes.lock();
        let removed = nodes.len();
        nodes.clear();
        removed
    }

    /// Returns the number of root nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Returns true if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    /// Returns copies of all root nodes, bottom first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ContinuationNode> {
        self.nodes.lock().clone()
    }

    /// Returns a fully independent copy of the stack and every node chain in it.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self::from_nodes(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SequenceKind;
    use std::sync::Arc;

    fn named(name: &str) -> ContinuationNode {
        ContinuationNode::sequence(SequenceKind::Named, name)
    }

    #[test]
    fn test_push_pop_order() {
        let stack = ContinuationStack::new();
        stack.push(named("outer"));
        stack.push(named("inner"));

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek().and_then(|n| n.sequence_name().map(String::from)), Some("inner".into()));
        assert_eq!(stack.pop().and_then(|n| n.sequence_name().map(String::from)), Some("inner".into()));
        assert_eq!(stack.pop().and_then(|n| n.sequence_name().map(String::from)), Some("outer".into()));
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_with_top_mutates_in_place() {
        let stack = ContinuationStack::new();
        assert!(stack.with_top(|node| node.set_position(1)).is_none());

        stack.push(named("main"));
        stack.with_top(|node| node.set_position(6));
        assert_eq!(stack.peek().map(|n| n.position()), Some(6));
    }

    #[test]
    fn test_clear_reports_removed() {
        let stack = ContinuationStack::new();
        for i in 0..4 {
            stack.push(named(&format!("s{i}")));
        }
        assert_eq!(stack.clear(), 4);
        assert!(stack.is_empty());
        assert_eq!(stack.clear(), 0);
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let stack = ContinuationStack::new();
        let mut node = named("main");
        node.add_leaf_child(ContinuationNode::sub_branch(0));
        stack.push(node);

        let copy = stack.deep_clone();
        copy.with_top(|n| n.leaf_mut().set_position(8));
        stack.with_top(|n| n.leaf_mut().set_position(2));

        assert_eq!(copy.peek().map(|n| n.leaf().position()), Some(8));
        assert_eq!(stack.peek().map(|n| n.leaf().position()), Some(2));
    }

    #[test]
    fn test_handoff_between_threads() {
        let stack = Arc::new(ContinuationStack::new());
        stack.push(named("main"));

        let worker = {
            let stack = Arc::clone(&stack);
            std::thread::spawn(move || {
                stack.with_top(|node| node.set_position(3));
                stack.pop()
            })
        };

        let popped = worker.join().unwrap();
        assert_eq!(popped.map(|n| n.position()), Some(3));
        assert!(stack.is_empty());
    }
}
