use criterion::{criterion_group, criterion_main, Criterion};
use tandem::prelude::*;

fn make_table(rows: usize, groups: usize) -> Table {
    let mut keys = Vec::with_capacity(rows);
    let mut labels = Vec::with_capacity(rows);
    let mut values = Vec::with_capacity(rows);
    for i in 0..rows {
        keys.push(Scalar::I64((i % groups) as i64));
        labels.push(Scalar::Str(format!("label-{}", i % 7)));
        values.push(Scalar::F64((i % 10) as f64));
    }
    Table {
        columns: vec![
            Column::new("key", keys),
            Column::new("label", labels),
            Column::new("value", values),
        ],
    }
}

/// Join a fact table to a small dimension table, then sum per label.
fn pipeline(strategy: OffloadStrategy, facts: &Table, dims: &Table) -> Value {
    let session = Session::new(EngineConfig::default().with_strategy(strategy)).unwrap();
    let f = session.from_table(facts.clone()).unwrap();
    let d = session
        .from_table(dims.clone())
        .unwrap()
        .select(&["key", "value"])
        .unwrap()
        .rename(&[("value", "weight")])
        .unwrap();
    let joined = f.merge(&d, &["key"], JoinType::Inner).unwrap();
    let grouped = joined
        .groupby(&["label"])
        .unwrap()
        .select(&["weight"])
        .unwrap()
        .sum()
        .unwrap();
    grouped.compute().unwrap().as_ref().clone()
}

fn bench_backends(c: &mut Criterion) {
    let facts = make_table(20_000, 100);
    let dims = make_table(100, 100);

    let mut group = c.benchmark_group("join_groupby");
    for strategy in [
        OffloadStrategy::Never,
        OffloadStrategy::Always,
        OffloadStrategy::Best,
    ] {
        group.bench_function(strategy.to_string(), |b| {
            b.iter(|| pipeline(strategy, &facts, &dims))
        });
    }
    group.finish();
}

fn bench_sort_head(c: &mut Criterion) {
    let facts = make_table(20_000, 1_000);
    let session = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Never)).unwrap();
    let df = session.from_table(facts).unwrap();
    c.bench_function("sort_head_in_memory", |b| {
        b.iter(|| {
            let top = df
                .sort_values(&["value", "key"], false)
                .unwrap()
                .head(10)
                .unwrap();
            top.to_table().unwrap()
        })
    });
}

criterion_group!(benches, bench_backends, bench_sort_head);
criterion_main!(benches);
