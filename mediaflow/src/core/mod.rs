//! Core domain types for mediaflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Component, mediator and sequence kind enums
//! - Component, execution-context and flow identities

mod identity;
mod kind;

pub use identity::{ComponentId, ExecutionContextId, FlowId};
pub use kind::{ComponentKind, MediatorKind, SequenceKind};
