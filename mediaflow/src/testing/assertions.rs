//! Assertions for continuation and span state.

use crate::context::MessageContext;
use crate::core::SequenceKind;
use crate::observability::CollectingTracingBackend;

/// Asserts that the continuation stack of `ctx` is empty.
///
/// # Panics
/// Panics if the stack holds any entry.
pub fn assert_stack_empty(ctx: &MessageContext) {
    let snapshot = ctx.continuation().snapshot();
    assert!(
        snapshot.is_empty(),
        "Expected empty continuation stack, found {snapshot:?}"
    );
}

/// Asserts the sequence entries of the continuation stack, bottom first.
///
/// # Panics
/// Panics if the entries differ.
pub fn assert_stack_sequences(ctx: &MessageContext, expected: &[(SequenceKind, &str)]) {
    let actual: Vec<(SequenceKind, String)> = ctx
        .continuation()
        .snapshot()
        .iter()
        .filter_map(|node| Some((node.sequence_kind()?, node.sequence_name()?.to_string())))
        .collect();
    let expected: Vec<(SequenceKind, String)> = expected
        .iter()
        .map(|(kind, name)| (*kind, (*name).to_string()))
        .collect();
    assert_eq!(actual, expected, "Unexpected continuation stack");
}

/// Asserts that the first span opened for `component` was parented under
/// the first span opened for `parent` (or had no parent).
///
/// # Panics
/// Panics if either span is missing or the parent differs.
pub fn assert_span_parent(
    backend: &CollectingTracingBackend,
    component: &str,
    parent: Option<&str>,
) {
    let opened = backend.opened();
    let index_of = |name: &str| opened.iter().position(|(component, _)| component == name);

    let Some(child) = index_of(component) else {
        panic!("No span opened for '{component}', opened: {opened:?}");
    };
    let expected = parent.map(|parent| {
        index_of(parent).unwrap_or_else(|| panic!("No span opened for '{parent}', opened: {opened:?}"))
    });
    // spans are opened in flow index order
    let actual = opened[child].1.map(|index| index as usize);
    assert_eq!(
        actual, expected,
        "Span '{component}' has parent {actual:?}, expected {expected:?} ({parent:?})"
    );
}

/// Asserts that every opened span was closed.
///
/// # Panics
/// Panics if the counts differ.
pub fn assert_spans_balanced(backend: &CollectingTracingBackend) {
    let opened = backend.opened().len();
    let closed = backend.closed().len();
    assert_eq!(
        opened, closed,
        "Opened {opened} spans but closed {closed}: {:?}",
        backend.events()
    );
}
