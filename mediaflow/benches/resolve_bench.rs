//! Benchmarks for span parent resolution.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use mediaflow::core::{ComponentId, ComponentKind, ExecutionContextId, MediatorKind};
use mediaflow::observability::{ParentResolver, SpanHandle, SpanRecord, SpanTable};
use mediaflow::pipeline::ArtifactAncestryStore;
use std::sync::Arc;

const COPIES: u32 = 256;
const NOISE_PER_COPY: u32 = 8;

/// A flow where `parent` ran `COPIES` times between unrelated components and
/// every copy but the middle one has already parented `child`.
fn table_with_copies(index_copies: bool) -> SpanTable {
    let mut table = SpanTable::new(index_copies);
    let owner = ExecutionContextId::new();
    let parent = ComponentId::from("parent");
    let child = ComponentId::from("child");

    for copy in 0..COPIES {
        for _ in 0..NOISE_PER_COPY {
            let index = table.allocate_index();
            table.record(
                SpanRecord::new(
                    index,
                    ComponentId::from(format!("noise-{index}")),
                    ComponentKind::Mediator(MediatorKind::Log),
                    "log",
                    owner,
                )
                .with_span(SpanHandle::child_of(None)),
            );
        }
        let index = table.allocate_index();
        let mut record = SpanRecord::new(
            index,
            parent.clone(),
            ComponentKind::Sequence,
            "parent",
            owner,
        )
        .with_span(SpanHandle::child_of(None));
        if copy != COPIES / 2 {
            record.child_structured_element_ids.insert(child.clone());
        }
        table.record(record);
    }
    table
}

fn resolver() -> ParentResolver {
    let mut ancestry = ArtifactAncestryStore::new();
    ancestry.insert(ComponentId::from("child"), vec![ComponentId::from("parent")]);
    ParentResolver::new(Arc::new(ancestry))
}

fn resolve_benchmark(c: &mut Criterion) {
    let resolver = resolver();
    let owner = ExecutionContextId::new();

    for (name, index_copies) in [("unclaimed_copy_indexed", true), ("unclaimed_copy_scan", false)] {
        c.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let mut table = table_with_copies(index_copies);
                    let index = table.allocate_index();
                    let child = SpanRecord::new(
                        index,
                        ComponentId::from("child"),
                        ComponentKind::Mediator(MediatorKind::Log),
                        "child",
                        owner,
                    );
                    table.record(child.clone());
                    (table, child)
                },
                |(mut table, child)| black_box(resolver.resolve_in(&child, owner, &mut table)),
                BatchSize::SmallInput,
            );
        });
    }
}

criterion_group!(benches, resolve_benchmark);
criterion_main!(benches);
