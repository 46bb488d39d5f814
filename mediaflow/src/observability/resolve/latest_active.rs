//! Latest-active strategy: the most recently opened span that is still open.

use super::ParentStrategy;
use crate::core::ExecutionContextId;
use crate::observability::{SpanRecord, SpanTable};

/// Picks the newest active span; endpoints only accept call, send or
/// flow continuable mediators.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestActiveStrategy;

impl LatestActiveStrategy {
    /// Newest active span that can parent an endpoint.
    #[must_use]
    pub fn endpoint_parent(child: &SpanRecord, table: &SpanTable) -> Option<u32> {
        table
            .active_spans()
            .into_iter()
            .rev()
            .find(|record| record.flow_index != child.flow_index && record.can_parent_endpoint())
            .map(|record| record.flow_index)
    }
}

impl ParentStrategy for LatestActiveStrategy {
    fn name(&self) -> &'static str {
        "latest_active"
    }

    fn resolve(
        &self,
        child: &SpanRecord,
        _execution_id: ExecutionContextId,
        table: &mut SpanTable,
    ) -> Option<u32> {
        if child.component_kind.is_endpoint() {
            return Self::endpoint_parent(child, table);
        }
        table
            .active_indices()
            .iter()
            .rev()
            .copied()
            .find(|index| *index != child.flow_index)
    }
}
