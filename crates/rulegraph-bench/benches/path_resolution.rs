//! Relationship path resolution benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rulegraph_bench::fixtures::{BenchContext, Scale};
use rulegraph_core::catalog::ClassListFilter;
use rulegraph_core::query::{RelationUseCounter, RelationshipDirection};
use rulegraph_core::{CatalogConfig, RelationshipPathOptions};

fn bench_immediate_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths/immediate");

    for scale in [Scale::Tiny, Scale::Small, Scale::Medium] {
        let ctx = BenchContext::with_scale(scale).unwrap();
        let source = ctx.node(0).unwrap();
        let options = RelationshipPathOptions::new(source, RelationshipDirection::BOTH);

        group.bench_with_input(BenchmarkId::new("cold", scale.classes()), &options, |b, options| {
            b.iter(|| {
                ctx.catalog.clear_caches();
                let mut counter = RelationUseCounter::new();
                black_box(ctx.catalog.resolve_relationship_paths(options, &mut counter));
            });
        });

        group.bench_with_input(BenchmarkId::new("cached", scale.classes()), &options, |b, options| {
            b.iter(|| {
                let mut counter = RelationUseCounter::new();
                black_box(ctx.catalog.resolve_relationship_paths(options, &mut counter));
            });
        });
    }

    group.finish();
}

fn bench_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths/depth");
    let ctx = BenchContext::with_scale(Scale::Small).unwrap();
    let source = ctx.node(0).unwrap();

    for depth in [0, 1, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let options = RelationshipPathOptions::new(source, RelationshipDirection::FORWARD).depth(depth);
            b.iter(|| {
                ctx.catalog.clear_caches();
                let mut counter = RelationUseCounter::new();
                black_box(ctx.catalog.resolve_relationship_paths(&options, &mut counter));
            });
        });
    }

    group.finish();
}

fn bench_recursive(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths/recursive");

    for max_depth in [4, 16, 64] {
        let ctx = BenchContext::with_config(Scale::Medium, CatalogConfig::default().max_traversal_depth(max_depth)).unwrap();
        let source = ctx.node(0).unwrap();
        let options = RelationshipPathOptions::new(source, RelationshipDirection::FORWARD).depth(-1);

        group.bench_with_input(BenchmarkId::from_parameter(max_depth), &options, |b, options| {
            b.iter(|| {
                ctx.catalog.clear_caches();
                let mut counter = RelationUseCounter::new();
                black_box(ctx.catalog.resolve_relationship_paths(options, &mut counter));
            });
        });
    }

    group.finish();
}

fn bench_class_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths/class_list");
    let ctx = BenchContext::with_scale(Scale::Medium).unwrap();

    group.bench_function("schema_wildcard", |b| {
        b.iter(|| black_box(ClassListFilter::parse(ctx.catalog.schemas(), "Bench:*", true)));
    });

    let listed: Vec<String> = (0..32).map(|i| format!("Node{}", i)).collect();
    let text = format!("Bench:{};E:Bench:Node3Kind0", listed.join(","));
    group.bench_function("explicit_with_exclusion", |b| {
        b.iter(|| black_box(ClassListFilter::parse(ctx.catalog.schemas(), &text, true)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_immediate_paths,
    bench_depth,
    bench_recursive,
    bench_class_list,
);

criterion_main!(benches);
