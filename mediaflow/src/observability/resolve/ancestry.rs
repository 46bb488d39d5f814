//! Ancestry strategy: the static structural parent of the child.

use super::ParentStrategy;
use crate::core::{ComponentId, ExecutionContextId};
use crate::observability::{SpanRecord, SpanTable};
use crate::pipeline::ArtifactAncestryStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Resolves through the artifact ancestry built with the pipeline graph.
#[derive(Debug, Clone)]
pub struct AncestryStrategy {
    ancestry: Arc<ArtifactAncestryStore>,
}

impl AncestryStrategy {
    /// Creates the strategy over a built ancestry store.
    #[must_use]
    pub fn new(ancestry: Arc<ArtifactAncestryStore>) -> Self {
        Self { ancestry }
    }
}

impl ParentStrategy for AncestryStrategy {
    fn name(&self) -> &'static str {
        "ancestry"
    }

    fn resolve(
        &self,
        child: &SpanRecord,
        execution_id: ExecutionContextId,
        table: &mut SpanTable,
    ) -> Option<u32> {
        let parent_id = self.ancestry.parent_of(&child.component_id)?;
        let parent = table.get_by_component_id(parent_id)?;

        if !parent.anonymous_sequences.is_empty() {
            let container = parent.flow_index;
            return anonymous_sub_sequence(container, child, execution_id, table);
        }
        if !parent.child_structured_element_ids.contains(&child.component_id) {
            return Some(parent.flow_index);
        }
        unclaimed_copy(parent_id, child, table)
    }
}

/// First copy of `parent_id` that has not yet parented `child`'s component.
///
/// Falls back to the last copy examined when every copy is claimed.
fn unclaimed_copy(parent_id: &ComponentId, child: &SpanRecord, table: &SpanTable) -> Option<u32> {
    let copies: Box<dyn Iterator<Item = &SpanRecord> + '_> = if table.indexes_copies() {
        Box::new(
            table
                .copies_of(parent_id)
                .iter()
                .filter_map(|index| table.get(*index)),
        )
    } else {
        Box::new(table.records().filter(|record| record.component_id == *parent_id))
    };

    let mut last = None;
    for copy in copies {
        if !copy.child_structured_element_ids.contains(&child.component_id) {
            return Some(copy.flow_index);
        }
        last = Some(copy.flow_index);
    }
    debug!(
        component = %child.component_id,
        parent = %parent_id,
        "Every copy of the parent is claimed; using the last one"
    );
    last
}

/// Picks the anonymous sub-sequence of `container` that `child`'s message runs in.
fn anonymous_sub_sequence(
    container: u32,
    child: &SpanRecord,
    execution_id: ExecutionContextId,
    table: &mut SpanTable,
) -> Option<u32> {
    let sub_sequences = table.get(container)?.anonymous_sequences.clone();

    let known_by = |table: &SpanTable, id: ExecutionContextId| {
        sub_sequences
            .iter()
            .rev()
            .copied()
            .find(|index| table.get(*index).is_some_and(|record| record.knows(id)))
    };

    if let Some(index) = known_by(&*table, execution_id) {
        return Some(index);
    }

    let seen: HashSet<ExecutionContextId> = sub_sequences
        .iter()
        .filter_map(|index| table.get(*index))
        .flat_map(|record| record.known_execution_context_ids.iter().copied())
        .collect();

    let mut visited = HashSet::new();
    let mut cursor = child.flow_parent_index;
    while let Some(index) = cursor {
        if !visited.insert(index) {
            break;
        }
        let Some(ancestor) = table.get(index) else {
            break;
        };
        let next = ancestor.flow_parent_index;
        let linked = ancestor
            .known_execution_context_ids
            .iter()
            .copied()
            .find(|id| seen.contains(id));
        if let Some(linked) = linked {
            propagate_identity(table, index, execution_id);
            if let Some(target) = known_by(&*table, linked) {
                if let Some(record) = table.get_mut(target) {
                    record.known_execution_context_ids.insert(execution_id);
                }
                return Some(target);
            }
        }
        cursor = next;
    }

    debug!(
        message_id = %execution_id,
        container,
        "Message copy not linked to any anonymous sub-sequence; using the newest"
    );
    sub_sequences.last().copied()
}

/// Records `execution_id` on `start` and every record above it.
fn propagate_identity(table: &mut SpanTable, start: u32, execution_id: ExecutionContextId) {
    let mut visited = HashSet::new();
    let mut cursor = Some(start);
    while let Some(index) = cursor {
        if !visited.insert(index) {
            break;
        }
        let Some(record) = table.get_mut(index) else {
            break;
        };
        record.known_execution_context_ids.insert(execution_id);
        cursor = record.flow_parent_index;
    }
}
