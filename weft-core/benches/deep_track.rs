//! Benchmarks comparing eager re-traversal against the memoized tracker
//! cache on a clean store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use weft_core::deep::{deep_track, track_store};
use weft_core::store::StoreNode;

/// Build a uniform tree: `breadth` children per node, `depth` levels,
/// leaves at the bottom.
fn build_tree(depth: usize, breadth: usize) -> StoreNode {
    let node = StoreNode::object();
    for i in 0..breadth {
        if depth == 0 {
            node.set(format!("leaf{i}"), i as i64).unwrap();
        } else {
            node.set(format!("child{i}"), build_tree(depth - 1, breadth))
                .unwrap();
        }
    }
    node
}

fn bench_deep_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_tracking");

    let store = build_tree(4, 4);
    group.bench_function("eager_retraversal", |b| {
        b.iter(|| {
            black_box(deep_track(store.clone()));
        })
    });

    // Prime the tracker cache; with no writes in between, every repeat
    // traversal hits the memoized fast path.
    let store = build_tree(4, 4);
    track_store(store.clone());
    group.bench_function("memoized_retraversal", |b| {
        b.iter(|| {
            black_box(track_store(store.clone()));
        })
    });

    group.finish();
}

criterion_group!(benches, bench_deep_tracking);
criterion_main!(benches);
