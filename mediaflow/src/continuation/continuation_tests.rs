//! Scenario tests for continuation stacks across suspension and copies.

use super::*;
use crate::context::MessageContext;
use crate::core::SequenceKind;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_suspend_and_resume_on_different_workers() {
    let manager = ContinuationStackManager::new();
    let ctx = Arc::new(MessageContext::new(json!({"id": 7})));
    manager.push_sequence(&ctx, SequenceKind::ProxyIn, "OrderProxy");
    manager.update_position(&ctx, 2);
    manager.add_sub_branch(&ctx, 0, 2);
    manager.update_position(&ctx, 1);

    let resumed = {
        let ctx = Arc::clone(&ctx);
        let manager = manager.clone();
        tokio::task::spawn_blocking(move || {
            let top = manager.peek(&ctx);
            manager.remove_sub_branch(&ctx);
            top
        })
        .await
        .unwrap()
    };

    let top = resumed.unwrap();
    assert_eq!(top.sequence_name(), Some("OrderProxy"));
    assert_eq!(top.leaf().position(), 1);
    assert_eq!(manager.peek(&ctx).map(|n| n.depth()), Some(1));
}

#[test]
fn test_split_copies_get_independent_stacks() {
    let manager = ContinuationStackManager::new();
    let original = MessageContext::new(json!(null));
    manager.push_sequence(&original, SequenceKind::Named, "main");
    manager.update_position(&original, 1);

    let copies: Vec<_> = (0..3).map(|_| original.split_copy()).collect();
    for (i, copy) in copies.iter().enumerate() {
        manager.add_sub_branch(copy, 0, 4);
        manager.update_position(copy, i);
    }

    let original_top = manager.peek(&original).unwrap();
    assert_eq!(original_top.position(), 1);
    assert!(!original_top.has_child());

    for (i, copy) in copies.iter().enumerate() {
        let top = manager.peek(copy).unwrap();
        assert_eq!(top.position(), 4);
        assert_eq!(top.leaf().position(), i);
    }
}

#[test]
fn test_nested_sequences_unwind_in_order() {
    let manager = ContinuationStackManager::new();
    let ctx = MessageContext::new(json!(null));
    let names = ["api", "enrich", "lookup", "audit"];
    for name in names {
        manager.push_sequence(&ctx, SequenceKind::Named, name);
        manager.add_sub_branch(&ctx, 0, 1);
    }

    let mut popped = Vec::new();
    while let Some(node) = manager.pop_sequence(&ctx) {
        popped.push(node.sequence_name().unwrap_or_default().to_string());
    }
    assert_eq!(popped, vec!["audit", "lookup", "enrich", "api"]);
}

#[test]
fn test_snapshot_survives_serialization() {
    let manager = ContinuationStackManager::new();
    let ctx = MessageContext::new(json!(null));
    manager.push_sequence(&ctx, SequenceKind::ApiIn, "Orders");
    manager.add_sub_branch(&ctx, 1, 3);
    manager.update_position(&ctx, 2);

    let saved = serde_json::to_string(&ctx.continuation().snapshot()).unwrap();
    let restored: Vec<ContinuationNode> = serde_json::from_str(&saved).unwrap();
    let resumed = MessageContext::new(json!(null))
        .with_continuation_stack(ContinuationStack::from_nodes(restored));

    assert_eq!(manager.peek(&resumed), manager.peek(&ctx));
}
