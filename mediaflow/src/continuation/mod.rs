//! Continuation state: where in a nested, branching pipeline a message is.
//!
//! Each message owns a [`ContinuationStack`] of root nodes, one per named
//! sequence it has entered. Branches inside a sequence hang below the root as
//! a single-child chain of [`ContinuationNode`]s. The
//! [`ContinuationStackManager`] is the only component that mutates stacks
//! during mediation.

mod manager;
mod node;
mod stack;

#[cfg(test)]
mod continuation_tests;

pub use manager::{ContinuationStackManager, StackObserver};
pub use node::{ContinuationNode, NodeFrame};
pub use stack::ContinuationStack;
