//! Per-flow span store and the registry of live stores.

use super::{SpanHandle, SpanRecord};
use crate::core::{ComponentId, ExecutionContextId, FlowId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A named sequence pushed onto a continuation stack while tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationSequenceEntry {
    /// Message copy that pushed the sequence.
    pub execution_id: ExecutionContextId,
    /// Flow index that was open when the sequence was pushed.
    pub parent_index: Option<u32>,
    /// Sequence lookup name.
    pub name: String,
    /// Set once the sequence has been popped.
    pub popped: bool,
}

/// Span records of one flow, in creation order.
#[derive(Debug, Default)]
pub struct SpanTable {
    records: Vec<SpanRecord>,
    positions: HashMap<u32, usize>,
    by_component: HashMap<ComponentId, Vec<u32>>,
    active: Vec<u32>,
    next_index: u32,
    continuation_sequences: Vec<ContinuationSequenceEntry>,
    index_copies: bool,
}

impl SpanTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(index_copies: bool) -> Self {
        Self {
            index_copies,
            ..Self::default()
        }
    }

    /// Returns true if component copies are looked up through the secondary index.
    #[must_use]
    pub fn indexes_copies(&self) -> bool {
        self.index_copies
    }

    /// Reserves the next flow index.
    pub fn allocate_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Inserts a record under its own flow index, replacing any previous one.
    pub fn record(&mut self, record: SpanRecord) {
        let index = record.flow_index;
        self.next_index = self.next_index.max(index + 1);

        if let Some(&pos) = self.positions.get(&index) {
            let previous = std::mem::replace(&mut self.records[pos], record);
            if let Some(copies) = self.by_component.get_mut(&previous.component_id) {
                copies.retain(|i| *i != index);
            }
            self.active.retain(|i| *i != index);
        } else {
            self.positions.insert(index, self.records.len());
            self.records.push(record);
        }

        let pos = self.positions[&index];
        let record = &self.records[pos];
        self.by_component
            .entry(record.component_id.clone())
            .or_default()
            .push(index);
        if record.is_active() {
            self.active.push(index);
        }
    }

    /// Gets a record by its flow index.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&SpanRecord> {
        self.positions.get(&index).map(|&pos| &self.records[pos])
    }

    /// Gets a record by its flow index, mutably.
    pub fn get_mut(&mut self, index: u32) -> Option<&mut SpanRecord> {
        let pos = *self.positions.get(&index)?;
        self.records.get_mut(pos)
    }

    /// Gets the most recent record of a component.
    #[must_use]
    pub fn get_by_component_id(&self, id: &ComponentId) -> Option<&SpanRecord> {
        self.by_component
            .get(id)
            .and_then(|copies| copies.last())
            .and_then(|&index| self.get(index))
    }

    /// Flow indices of every record of a component, oldest first.
    #[must_use]
    pub fn copies_of(&self, id: &ComponentId) -> &[u32] {
        self.by_component.get(id).map_or(&[], Vec::as_slice)
    }

    /// All records in creation order.
    pub fn records(&self) -> impl DoubleEndedIterator<Item = &SpanRecord> {
        self.records.iter()
    }

    /// Records whose span is open, in creation order.
    #[must_use]
    pub fn active_spans(&self) -> Vec<&SpanRecord> {
        self.active.iter().filter_map(|&index| self.get(index)).collect()
    }

    /// Flow indices of the records whose span is open, in creation order.
    #[must_use]
    pub fn active_indices(&self) -> &[u32] {
        &self.active
    }

    /// Attaches an opened span and moves the record into the active list.
    pub fn mark_started(&mut self, index: u32, span: SpanHandle) -> bool {
        let Some(record) = self.get_mut(index) else {
            return false;
        };
        let was_active = record.is_active();
        record.span = Some(span);
        if !was_active {
            self.active.push(index);
        }
        true
    }

    /// Closes a record and removes it from the active list.
    ///
    /// Returns the record as closed, or `None` if it was not open.
    pub fn mark_closed(&mut self, index: u32, at: DateTime<Utc>) -> Option<SpanRecord> {
        let record = self.get_mut(index)?;
        if !record.is_active() {
            return None;
        }
        record.ended_at = Some(at);
        let closed = record.clone();
        if let Some(pos) = self.active.iter().rposition(|i| *i == index) {
            self.active.remove(pos);
        }
        Some(closed)
    }

    /// Remembers a named sequence pushed onto a continuation stack.
    pub fn push_continuation_sequence(&mut self, entry: ContinuationSequenceEntry) {
        self.continuation_sequences.push(entry);
    }

    /// Marks the latest unpopped entry for sequence `name` as popped.
    ///
    /// Entries pushed by `execution_id` win; otherwise the entry was pushed by
    /// the copy this message took the continuation stack over from.
    pub fn pop_continuation_sequence(
        &mut self,
        execution_id: ExecutionContextId,
        name: &str,
    ) -> bool {
        let position = self
            .continuation_sequences
            .iter()
            .rposition(|entry| {
                !entry.popped && entry.name == name && entry.execution_id == execution_id
            })
            .or_else(|| {
                self.continuation_sequences
                    .iter()
                    .rposition(|entry| !entry.popped && entry.name == name)
            });
        match position {
            Some(position) => {
                self.continuation_sequences[position].popped = true;
                true
            }
            None => false,
        }
    }

    /// Marks every sequence pushed by `execution_id` as popped and returns how
    /// many were still open.
    pub fn pop_all_continuation_sequences(&mut self, execution_id: ExecutionContextId) -> usize {
        let mut popped = 0;
        for entry in &mut self.continuation_sequences {
            if entry.execution_id == execution_id && !entry.popped {
                entry.popped = true;
                popped += 1;
            }
        }
        popped
    }

    /// Entries of sequences some message copy entered and never left.
    pub fn unpopped_continuation_sequences(
        &self,
    ) -> impl Iterator<Item = &ContinuationSequenceEntry> {
        self.continuation_sequences.iter().filter(|entry| !entry.popped)
    }

    /// Continuation sequence entries in push order.
    #[must_use]
    pub fn continuation_sequences(&self) -> &[ContinuationSequenceEntry] {
        &self.continuation_sequences
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Span table of one top-level message flow, shared by all its copies.
#[derive(Debug)]
pub struct SpanStore {
    flow_id: FlowId,
    table: RwLock<SpanTable>,
}

impl SpanStore {
    /// Creates a store that indexes component copies.
    #[must_use]
    pub fn new(flow_id: FlowId) -> Self {
        Self::with_copy_index(flow_id, true)
    }

    /// Creates a store, choosing how component copies are looked up.
    #[must_use]
    pub fn with_copy_index(flow_id: FlowId, index_copies: bool) -> Self {
        Self {
            flow_id,
            table: RwLock::new(SpanTable::new(index_copies)),
        }
    }

    /// Returns the flow id.
    #[must_use]
    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Locks the table for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, SpanTable> {
        self.table.read()
    }

    /// Locks the table for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, SpanTable> {
        self.table.write()
    }

    /// Inserts a record.
    pub fn record(&self, record: SpanRecord) {
        self.table.write().record(record);
    }

    /// Gets a copy of a record by flow index.
    #[must_use]
    pub fn get_by_flow_index(&self, index: u32) -> Option<SpanRecord> {
        self.table.read().get(index).cloned()
    }

    /// Gets a copy of the most recent record of a component.
    #[must_use]
    pub fn get_by_component_id(&self, id: &ComponentId) -> Option<SpanRecord> {
        self.table.read().get_by_component_id(id).cloned()
    }

    /// Copies of the records whose span is open, in creation order.
    #[must_use]
    pub fn active_spans(&self) -> Vec<SpanRecord> {
        self.table
            .read()
            .active_spans()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

/// Live span stores keyed by flow.
#[derive(Debug, Default)]
pub struct SpanStoreRegistry {
    stores: DashMap<FlowId, Arc<SpanStore>>,
    index_copies: bool,
}

impl SpanStoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(index_copies: bool) -> Self {
        Self {
            stores: DashMap::new(),
            index_copies,
        }
    }

    /// Returns the store of a flow, creating it on first use.
    pub fn get_or_create(&self, flow_id: FlowId) -> Arc<SpanStore> {
        self.stores
            .entry(flow_id)
            .or_insert_with(|| {
                debug!(flow_id = %flow_id, "Created span store");
                Arc::new(SpanStore::with_copy_index(flow_id, self.index_copies))
            })
            .value()
            .clone()
    }

    /// Returns the store of a flow.
    #[must_use]
    pub fn get(&self, flow_id: FlowId) -> Option<Arc<SpanStore>> {
        self.stores.get(&flow_id).map(|store| store.value().clone())
    }

    /// Discards the store of a completed flow.
    pub fn remove(&self, flow_id: FlowId) -> Option<Arc<SpanStore>> {
        self.stores.remove(&flow_id).map(|(_, store)| store)
    }

    /// Number of live stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Returns true if no store is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
