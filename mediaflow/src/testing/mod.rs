//! Testing utilities for mediation pipelines.
//!
//! This module provides:
//! - Mock mediators
//! - An engine fixture with a collecting tracing backend
//! - Assertions for continuation stacks and span trees

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_span_parent, assert_spans_balanced, assert_stack_empty, assert_stack_sequences,
};
pub use fixtures::{mediator, TestEngine};
pub use mocks::{CountingMediator, SuspendingMediator};
