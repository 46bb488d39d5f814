//! Flow-index strategy: the component that was open when the child started.

use super::{LatestActiveStrategy, ParentStrategy};
use crate::core::ExecutionContextId;
use crate::observability::{SpanRecord, SpanTable};

/// Resolves through the child's flow parent index.
///
/// Endpoints only accept a `call` or `send` parent. When either side is an
/// anonymous sequence the parent must be flow continuable or a `foreach`;
/// otherwise the newest such record is used even if it has already closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowIndexStrategy;

impl ParentStrategy for FlowIndexStrategy {
    fn name(&self) -> &'static str {
        "flow_index"
    }

    fn resolve(
        &self,
        child: &SpanRecord,
        _execution_id: ExecutionContextId,
        table: &mut SpanTable,
    ) -> Option<u32> {
        let candidate = child
            .flow_parent_index
            .filter(|index| *index != child.flow_index)
            .and_then(|index| table.get(index));

        if child.component_kind.is_endpoint() {
            return match candidate {
                Some(parent) if parent.is_call_or_send() => Some(parent.flow_index),
                _ => LatestActiveStrategy::endpoint_parent(child, table),
            };
        }

        let candidate = candidate?;
        if !(child.is_anonymous_sequence() || candidate.is_anonymous_sequence()) {
            return Some(candidate.flow_index);
        }
        if candidate.is_continuable_or_foreach() {
            return Some(candidate.flow_index);
        }

        table
            .records()
            .rev()
            .find(|record| {
                record.flow_index != child.flow_index
                    && record.is_started()
                    && record.is_continuable_or_foreach()
            })
            .map(|record| record.flow_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ComponentId, ComponentKind, MediatorKind};
    use crate::observability::SpanHandle;

    fn started(index: u32, kind: ComponentKind, continuable: bool) -> SpanRecord {
        SpanRecord::new(
            index,
            ComponentId::from(format!("c{index}")),
            kind,
            format!("c{index}"),
            ExecutionContextId::new(),
        )
        .with_flow_continuable(continuable)
        .with_span(SpanHandle::child_of(None))
    }

    fn child(index: u32, parent: Option<u32>, kind: ComponentKind) -> SpanRecord {
        SpanRecord::new(index, ComponentId::from("child"), kind, "child", ExecutionContextId::new())
            .with_flow_parent_index(parent)
    }

    fn resolve(child: &SpanRecord, table: &mut SpanTable) -> Option<u32> {
        FlowIndexStrategy.resolve(child, child.opened_by, table)
    }

    #[test]
    fn test_plain_child_takes_flow_parent() {
        let mut table = SpanTable::new(true);
        table.record(started(0, ComponentKind::Sequence, true));
        table.record(started(1, ComponentKind::Mediator(MediatorKind::Log), false));

        let log = child(2, Some(1), ComponentKind::Mediator(MediatorKind::Property));
        assert_eq!(resolve(&log, &mut table), Some(1));
        assert_eq!(resolve(&child(2, None, ComponentKind::Sequence), &mut table), None);
        assert_eq!(resolve(&child(2, Some(7), ComponentKind::Sequence), &mut table), None);
    }

    #[test]
    fn test_endpoint_needs_call_or_send() {
        let mut table = SpanTable::new(true);
        table.record(started(0, ComponentKind::Sequence, true));
        table.record(started(1, ComponentKind::Mediator(MediatorKind::Send), false));
        table.mark_started(1, SpanHandle::child_of(None));
        assert_eq!(resolve(&child(2, Some(1), ComponentKind::Endpoint), &mut table), Some(1));

        let mut table = SpanTable::new(true);
        table.record(started(0, ComponentKind::Mediator(MediatorKind::Call), true));
        table.mark_started(0, SpanHandle::child_of(None));
        table.record(started(1, ComponentKind::Mediator(MediatorKind::Log), false));
        // the log is not a valid parent, the active call is
        assert_eq!(resolve(&child(2, Some(1), ComponentKind::Endpoint), &mut table), Some(0));
    }

    #[test]
    fn test_anonymous_child_under_continuable_container() {
        let mut table = SpanTable::new(true);
        table.record(started(0, ComponentKind::Mediator(MediatorKind::Iterate), true));
        let body = child(1, Some(0), ComponentKind::AnonymousSequence);
        assert_eq!(resolve(&body, &mut table), Some(0));
    }

    #[test]
    fn test_anonymous_child_falls_back_to_backward_scan() {
        let mut table = SpanTable::new(true);
        table.record(started(0, ComponentKind::Mediator(MediatorKind::Filter), true));
        table.record(started(1, ComponentKind::Mediator(MediatorKind::Foreach), false));
        table.record(started(2, ComponentKind::Mediator(MediatorKind::Log), false));
        table.mark_closed(1, chrono::Utc::now());

        let body = child(3, Some(2), ComponentKind::AnonymousSequence);
        // the closed foreach still qualifies
        assert_eq!(resolve(&body, &mut table), Some(1));
    }

    #[test]
    fn test_scan_skips_unstarted_records() {
        let mut table = SpanTable::new(true);
        table.record(started(0, ComponentKind::Mediator(MediatorKind::Filter), true));
        let pending = SpanRecord::new(
            1,
            ComponentId::from("pending"),
            ComponentKind::Mediator(MediatorKind::Filter),
            "pending",
            ExecutionContextId::new(),
        )
        .with_flow_continuable(true);
        table.record(pending);
        table.record(started(2, ComponentKind::Mediator(MediatorKind::Log), false));

        let body = child(3, Some(2), ComponentKind::AnonymousSequence);
        assert_eq!(resolve(&body, &mut table), Some(0));
    }
}
