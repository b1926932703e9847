use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use schemaroute::{
    PathFinder, PathSegmenter, SchemaGraph, SearchState, SearchStrategy,
    bench_utils::{SchemaShape, entity_name, generate_schema},
};

const LINE_SEED: u64 = 0xA11E;
const TREE_SEED: u64 = 0x7EE5;
const RANDOM_SEED: u64 = 0x5EED;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);

fn bench_scale() -> usize {
    #[cfg(feature = "bench-ci")]
    {
        200
    }
    #[cfg(not(feature = "bench-ci"))]
    {
        1_000
    }
}

fn prepared_graphs() -> Vec<(&'static str, SchemaGraph)> {
    let count = bench_scale();
    let shapes = [
        ("line", SchemaShape::Line, LINE_SEED),
        ("tree", SchemaShape::Tree { fanout: 4 }, TREE_SEED),
        (
            "random",
            SchemaShape::Random {
                fanout: 4,
                extra: count,
            },
            RANDOM_SEED,
        ),
    ];
    shapes
        .into_iter()
        .map(|(label, shape, seed)| {
            let description = generate_schema(shape, count, seed);
            let graph = SchemaGraph::from_description(&description).expect("graph");
            (label, graph)
        })
        .collect()
}

fn bench_find_path(c: &mut Criterion) {
    let graphs = prepared_graphs();
    let source = entity_name(0);
    let target = entity_name(bench_scale() - 1);
    let mut group = c.benchmark_group("find_path");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for (label, graph) in &graphs {
        for strategy in [SearchStrategy::AStar, SearchStrategy::Dijkstra] {
            let finder = PathFinder::new(graph, strategy);
            let mut state = SearchState::new();
            group.bench_with_input(
                BenchmarkId::new(format!("{strategy:?}"), label),
                &(),
                |b, _| {
                    b.iter(|| {
                        let path = finder
                            .find_with(&mut state, &source, &target)
                            .expect("path");
                        criterion::black_box(path.total_distance())
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_segment(c: &mut Criterion) {
    let graphs = prepared_graphs();
    let source = entity_name(0);
    let target = entity_name(bench_scale() - 1);
    let mut group = c.benchmark_group("segment");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for (label, graph) in &graphs {
        let path = PathFinder::new(graph, SearchStrategy::AStar)
            .find(&source, &target)
            .expect("path");
        group.bench_with_input(BenchmarkId::from_parameter(label), &path, |b, path| {
            b.iter(|| criterion::black_box(PathSegmenter::segment(path).len()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_find_path, bench_segment);
criterion_main!(benches);
