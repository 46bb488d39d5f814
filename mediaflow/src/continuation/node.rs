//! Continuation nodes: where in a (possibly nested) branch a message is.

use crate::core::SequenceKind;
use serde::{Deserialize, Serialize};

/// What a continuation node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeFrame {
    /// A named, separately resumable sequence. Only these sit at the root of a stack entry.
    Sequence {
        /// Where the sequence lives in the pipeline graph.
        kind: SequenceKind,
        /// The lookup name (sequence, proxy or API name).
        name: String,
    },
    /// One of the internal paths of a branching mediator.
    SubBranch {
        /// Which path: 0 is the default flow, other ids are mediator specific.
        branch_id: u32,
    },
}

/// A saved position inside a sequence, with an optional nested branch.
///
/// The nested branches form a singly-linked chain; each node owns at most one
/// live child. Running code only ever touches the leaf of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationNode {
    frame: NodeFrame,
    position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    child: Option<Box<ContinuationNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats_parent_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats_parent_chain: Option<Vec<u32>>,
}

impl ContinuationNode {
    /// Creates a sequence node positioned at the first child.
    #[must_use]
    pub fn sequence(kind: SequenceKind, name: impl Into<String>) -> Self {
        Self::with_frame(NodeFrame::Sequence {
            kind,
            name: name.into(),
        })
    }

    /// Creates a sub-branch node positioned at the first child.
    #[must_use]
    pub fn sub_branch(branch_id: u32) -> Self {
        Self::with_frame(NodeFrame::SubBranch { branch_id })
    }

    fn with_frame(frame: NodeFrame) -> Self {
        Self {
            frame,
            position: 0,
            child: None,
            stats_parent_index: None,
            stats_parent_chain: None,
        }
    }

    /// Returns the frame.
    #[must_use]
    pub fn frame(&self) -> &NodeFrame {
        &self.frame
    }

    /// Returns true for sequence nodes.
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(self.frame, NodeFrame::Sequence { .. })
    }

    /// Returns the sequence kind of a sequence node.
    #[must_use]
    pub fn sequence_kind(&self) -> Option<SequenceKind> {
        match &self.frame {
            NodeFrame::Sequence { kind, .. } => Some(*kind),
            NodeFrame::SubBranch { .. } => None,
        }
    }

    /// Returns the lookup name of a sequence node.
    #[must_use]
    pub fn sequence_name(&self) -> Option<&str> {
        match &self.frame {
            NodeFrame::Sequence { name, .. } => Some(name),
            NodeFrame::SubBranch { .. } => None,
        }
    }

    /// Returns the branch id of a sub-branch node.
    #[must_use]
    pub fn branch_id(&self) -> Option<u32> {
        match &self.frame {
            NodeFrame::SubBranch { branch_id } => Some(*branch_id),
            NodeFrame::Sequence { .. } => None,
        }
    }

    /// Index of the child component the owning list suspended at.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Sets the position of this node.
    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Returns the nested branch, if any.
    #[must_use]
    pub fn child(&self) -> Option<&ContinuationNode> {
        self.child.as_deref()
    }

    /// Returns true if a nested branch is attached.
    #[must_use]
    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }

    /// Number of nodes in the chain, this one included.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.child.as_ref().map_or(0, |child| child.depth())
    }

    /// Returns the innermost node of the chain.
    #[must_use]
    pub fn leaf(&self) -> &ContinuationNode {
        match self.child {
            Some(ref child) => child.leaf(),
            None => self,
        }
    }

    /// Returns the innermost node of the chain, mutably.
    pub fn leaf_mut(&mut self) -> &mut ContinuationNode {
        match self.child {
            Some(ref mut child) => child.leaf_mut(),
            None => self,
        }
    }

    /// Attaches `node` below the current leaf.
    pub fn add_leaf_child(&mut self, node: ContinuationNode) {
        self.leaf_mut().child = Some(Box::new(node));
    }

    /// Detaches and returns the current leaf. A node without children is left untouched.
    pub fn remove_leaf_child(&mut self) -> Option<ContinuationNode> {
        let child_has_child = self.child.as_ref()?.has_child();
        if child_has_child {
            self.child.as_mut()?.remove_leaf_child()
        } else {
            self.child.take().map(|child| *child)
        }
    }

    /// Turns a sub-branch node into a fresh node for `branch_id`, dropping its nested chain.
    ///
    /// Returns false (and changes nothing) for sequence nodes.
    pub fn reset_branch(&mut self, branch_id: u32) -> bool {
        match self.frame {
            NodeFrame::SubBranch { .. } => {
                self.frame = NodeFrame::SubBranch { branch_id };
                self.child = None;
                self.position = 0;
                true
            }
            NodeFrame::Sequence { .. } => false,
        }
    }

    /// Flow index of the span that was open when this node was captured.
    #[must_use]
    pub fn stats_parent_index(&self) -> Option<u32> {
        self.stats_parent_index
    }

    /// Open span chain at the time this node was captured.
    #[must_use]
    pub fn stats_parent_chain(&self) -> Option<&[u32]> {
        self.stats_parent_chain.as_deref()
    }

    /// Records the span-table cross reference carried across suspension.
    pub fn set_stats(&mut self, parent_index: Option<u32>, chain: Option<Vec<u32>>) {
        self.stats_parent_index = parent_index;
        self.stats_parent_chain = chain;
    }

    /// Sets the stats cross reference, builder style.
    #[must_use]
    pub fn with_stats(mut self, parent_index: Option<u32>, chain: Option<Vec<u32>>) -> Self {
        self.set_stats(parent_index, chain);
        self
    }
}
