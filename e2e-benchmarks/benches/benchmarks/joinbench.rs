use criterion::{black_box, criterion_group, BenchmarkId, Criterion};

use common::database::Database;
use common::statement::Statement;
use common::testutil::random_table;
use e2e_benchmarks::{run_query as run, three_tables, THREE_WAY};
use optimizer::OptimizerConfig;

fn bench_join_tiny(c: &mut Criterion) {
    let mut db = Database::new("bench");
    db.add_table(random_table("testA", vec!["a", "b"], 10, 10, 1));
    db.add_table(random_table("testB", vec!["a", "b"], 10, 10, 2));
    c.bench_function("join_tiny", |b| {
        b.iter(|| {
            run(
                black_box(&db),
                "select * from testA, testB where testA.a = testB.a",
                true,
            )
        })
    });
}

fn bench_join_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_order");
    for rows in [20usize, 60].iter() {
        let db = three_tables(*rows);
        group.bench_with_input(BenchmarkId::new("rearranged", rows), &db, |b, db| {
            b.iter(|| run(black_box(db), THREE_WAY, true))
        });
        group.bench_with_input(BenchmarkId::new("as_written", rows), &db, |b, db| {
            b.iter(|| run(black_box(db), THREE_WAY, false))
        });
    }
    group.finish();
}

fn bench_optimize_only(c: &mut Criterion) {
    let db = three_tables(20);
    let stmt = Statement::select(THREE_WAY);
    c.bench_function("optimize_three_way", |b| {
        b.iter(|| {
            optimizer::Optimizer::new(&db, OptimizerConfig::default())
                .optimize(black_box(&stmt))
                .map(|plan| plan.snapshots.len())
        })
    });
}

criterion_group! {
    name = joinbench;
    config = Criterion::default().sample_size(10);
    targets =
    bench_join_tiny,
    bench_join_order,
    bench_optimize_only,
}
