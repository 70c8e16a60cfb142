//! Backend transparency: every strategy yields the same rows.

use std::cmp::Ordering;

use tandem::prelude::*;
use tandem_core::types::scalar_tuple_cmp;

/// Strategy variants under test, labelled for assertion messages.
fn configs() -> Vec<(&'static str, EngineConfig)> {
    let base = EngineConfig::default();
    let mut pipelined = base.clone().with_strategy(OffloadStrategy::Always);
    pipelined.materialize_intermediates = false;
    vec![
        ("never", base.clone().with_strategy(OffloadStrategy::Never)),
        ("always", base.clone().with_strategy(OffloadStrategy::Always)),
        ("always-pipelined", pipelined),
        ("best", base.with_strategy(OffloadStrategy::Best)),
    ]
}

fn rows(t: &Table) -> Vec<Vec<Scalar>> {
    (0..t.num_rows()).map(|i| t.row(i)).collect()
}

fn sorted_rows(t: &Table) -> Vec<Vec<Scalar>> {
    let mut r = rows(t);
    r.sort_by(|a, b| scalar_tuple_cmp(a, b));
    r
}

fn ints(values: &[i64]) -> Vec<Scalar> {
    values.iter().map(|v| Scalar::I64(*v)).collect()
}

/// Run `build` in a fresh session per strategy and check all tables agree.
fn check<F>(ordered: bool, build: F) -> Table
where
    F: Fn(&Session) -> DataFrame,
{
    let mut reference: Option<(Vec<String>, Vec<Vec<Scalar>>)> = None;
    let mut first = None;
    for (label, config) in configs() {
        let session = Session::new(config).unwrap();
        let df = build(&session);
        let table = df
            .to_table()
            .unwrap_or_else(|e| panic!("{label}: {e}"));
        let got = if ordered { rows(&table) } else { sorted_rows(&table) };
        match &reference {
            None => {
                reference = Some((table.column_names(), got));
                first = Some(table);
            }
            Some((cols, want)) => {
                assert_eq!(&table.column_names(), cols, "{label}: columns differ");
                assert_eq!(&got, want, "{label}: rows differ");
            }
        }
    }
    first.unwrap()
}

fn table_a(s: &Session) -> DataFrame {
    s.from_rows(
        &["c0", "c1"],
        vec![ints(&[1, 10]), ints(&[2, 20]), ints(&[3, 30])],
    )
    .unwrap()
}

fn table_b(s: &Session) -> DataFrame {
    s.from_rows(
        &["c0", "c1"],
        vec![ints(&[2, 200]), ints(&[3, 300]), ints(&[4, 400])],
    )
    .unwrap()
}

#[test]
fn test_merge_on_shared_key() {
    let out = check(false, |s| {
        table_a(s)
            .merge(&table_b(s), &["c0"], JoinType::Inner)
            .unwrap()
    });
    assert_eq!(out.column_names(), vec!["c0", "c1_x", "c1_y"]);
    assert_eq!(
        sorted_rows(&out),
        vec![ints(&[2, 20, 200]), ints(&[3, 30, 300])]
    );
}

#[test]
fn test_left_merge_keeps_unmatched_rows() {
    let out = check(false, |s| {
        s.merge(&table_a(s), &table_b(s), &["c0"], JoinType::Left)
            .unwrap()
    });
    assert_eq!(
        sorted_rows(&out),
        vec![
            vec![Scalar::I64(1), Scalar::I64(10), Scalar::Null],
            ints(&[2, 20, 200]),
            ints(&[3, 30, 300]),
        ]
    );
}

#[test]
fn test_join_on_differently_named_keys() {
    let out = check(false, |s| {
        let a = table_a(s);
        let b = table_b(s).rename(&[("c0", "key")]).unwrap();
        a.join_on(&b, &["c0"], &["key"], JoinType::Inner).unwrap()
    });
    assert_eq!(out.column_names(), vec!["c0", "c1_x", "key", "c1_y"]);
    assert_eq!(out.num_rows(), 2);
}

#[test]
fn test_groupby_sum() {
    let out = check(false, |s| {
        s.from_rows(
            &["c0", "v"],
            vec![ints(&[1, 10]), ints(&[1, 20]), ints(&[2, 5])],
        )
        .unwrap()
        .groupby(&["c0"])
        .unwrap()
        .sum()
        .unwrap()
    });
    assert_eq!(sorted_rows(&out), vec![ints(&[1, 30]), ints(&[2, 5])]);
}

#[test]
fn test_groupby_aggregations() {
    let data = |s: &Session| {
        s.from_rows(
            &["k", "x", "y"],
            vec![
                vec![Scalar::from("a"), Scalar::I64(2), Scalar::F64(0.5)],
                vec![Scalar::from("a"), Scalar::I64(3), Scalar::F64(1.5)],
                vec![Scalar::from("b"), Scalar::I64(0), Scalar::Null],
            ],
        )
        .unwrap()
    };

    let out = check(false, |s| data(s).groupby(&["k"]).unwrap().mean().unwrap());
    assert_eq!(
        sorted_rows(&out),
        vec![
            vec![Scalar::from("a"), Scalar::F64(2.5), Scalar::F64(1.0)],
            vec![Scalar::from("b"), Scalar::F64(0.0), Scalar::Null],
        ]
    );

    let out = check(false, |s| {
        data(s)
            .groupby(&["k"])
            .unwrap()
            .select(&["x"])
            .unwrap()
            .prod()
            .unwrap()
    });
    assert_eq!(out.column_names(), vec!["k", "x"]);
    assert_eq!(
        sorted_rows(&out),
        vec![
            vec![Scalar::from("a"), Scalar::I64(6)],
            vec![Scalar::from("b"), Scalar::I64(0)],
        ]
    );

    let out = check(false, |s| {
        data(s)
            .groupby(&["k"])
            .unwrap()
            .select(&["x"])
            .unwrap()
            .any()
            .unwrap()
    });
    assert_eq!(
        sorted_rows(&out),
        vec![
            vec![Scalar::from("a"), Scalar::Bool(true)],
            vec![Scalar::from("b"), Scalar::Bool(false)],
        ]
    );

    let out = check(false, |s| data(s).groupby(&["k"]).unwrap().count().unwrap());
    assert_eq!(
        sorted_rows(&out),
        vec![
            vec![Scalar::from("a"), Scalar::I64(2), Scalar::I64(2)],
            vec![Scalar::from("b"), Scalar::I64(1), Scalar::I64(0)],
        ]
    );
}

#[test]
fn test_scalar_aggregates_collapse() {
    for (label, config) in configs() {
        let s = Session::new(config).unwrap();
        let a = table_a(&s);

        let total = a.col("c1").unwrap().sum().unwrap().compute().unwrap();
        assert_eq!(total.as_scalar(), Some(&Scalar::I64(60)), "{label}");

        let maxes = a.max().unwrap().compute().unwrap();
        assert_eq!(
            maxes.as_series(),
            Some(
                &[
                    ("c0".to_string(), Scalar::I64(3)),
                    ("c1".to_string(), Scalar::I64(30))
                ][..]
            ),
            "{label}"
        );

        let all_positive = a
            .col("c1")
            .unwrap()
            .gt(0i64)
            .unwrap()
            .all()
            .unwrap()
            .compute()
            .unwrap();
        assert_eq!(all_positive.as_scalar(), Some(&Scalar::Bool(true)), "{label}");
    }
}

#[test]
fn test_integer_sum_overflow_fails_everywhere() {
    for (label, config) in configs() {
        let s = Session::new(config).unwrap();
        let df = s
            .from_rows(&["v"], vec![vec![Scalar::I64(i64::MAX)], vec![Scalar::I64(1)]])
            .unwrap();
        let total = df.col("v").unwrap().sum().unwrap();
        assert!(total.compute().is_err(), "{label}");

        let product = df.col("v").unwrap().prod().unwrap().compute().unwrap();
        assert_eq!(product.as_scalar(), Some(&Scalar::I64(i64::MAX)), "{label}");
    }
}

#[test]
fn test_projection_and_filter() {
    let out = check(true, |s| {
        let a = table_a(s);
        let c1 = a.col("c1").unwrap();
        let keep = c1.ge(20i64).unwrap().and(&c1.ne(30i64).unwrap()).unwrap();
        a.filter(&keep).unwrap().select(&["c1"]).unwrap()
    });
    assert_eq!(rows(&out), vec![ints(&[20])]);
}

#[test]
fn test_filter_on_boolean_column() {
    let out = check(true, |s| {
        let df = s
            .from_rows(
                &["name", "active"],
                vec![
                    vec![Scalar::from("x"), Scalar::Bool(true)],
                    vec![Scalar::from("y"), Scalar::Bool(false)],
                    vec![Scalar::from("z"), Scalar::Bool(true)],
                ],
            )
            .unwrap();
        let active = df.col("active").unwrap();
        df.filter(&active).unwrap()
    });
    assert_eq!(
        rows(&out),
        vec![
            vec![Scalar::from("x"), Scalar::Bool(true)],
            vec![Scalar::from("z"), Scalar::Bool(true)],
        ]
    );
}

#[test]
fn test_string_predicates() {
    let out = check(true, |s| {
        let df = s
            .from_rows(
                &["name"],
                vec![
                    vec![Scalar::from("apple")],
                    vec![Scalar::Null],
                    vec![Scalar::from("banana")],
                    vec![Scalar::from("avocado")],
                ],
            )
            .unwrap();
        let name = df.col("name").unwrap();
        let keep = name
            .like("a%")
            .unwrap()
            .or(&name.is_null().unwrap())
            .unwrap();
        df.filter(&keep).unwrap()
    });
    assert_eq!(
        rows(&out),
        vec![
            vec![Scalar::from("apple")],
            vec![Scalar::Null],
            vec![Scalar::from("avocado")],
        ]
    );
}

#[test]
fn test_like_counts_characters_not_bytes() {
    let out = check(true, |s| {
        let df = s
            .from_rows(
                &["word"],
                vec![
                    vec![Scalar::from("café")],
                    vec![Scalar::from("cafe")],
                    vec![Scalar::from("cafés")],
                ],
            )
            .unwrap();
        df.filter(&df.col("word").unwrap().like("caf_").unwrap()).unwrap()
    });
    assert_eq!(
        rows(&out),
        vec![vec![Scalar::from("café")], vec![Scalar::from("cafe")]]
    );
}

#[test]
fn test_assignment_round_trip() {
    let out = check(true, |s| {
        let mut df = table_a(s);
        let sum = df.col("c0").unwrap().add(&df.col("c1").unwrap()).unwrap();
        df.assign("c2", &sum).unwrap();
        df.col("c2").unwrap()
    });
    assert_eq!(rows(&out), vec![ints(&[11]), ints(&[22]), ints(&[33])]);
}

#[test]
fn test_assignment_keeps_earlier_views() {
    for (label, config) in configs() {
        let s = Session::new(config).unwrap();
        let mut df = table_a(&s);
        let before = df.select(&["c1"]).unwrap();
        let before_total = before.sum().unwrap();

        let scaled = df.col("c1").unwrap().mul(10i64).unwrap();
        df.assign("c1", &scaled).unwrap();
        df.assign("flag", true).unwrap();

        assert_eq!(
            rows(&before.to_table().unwrap()),
            vec![ints(&[10]), ints(&[20]), ints(&[30])],
            "{label}"
        );
        assert_eq!(
            before_total.compute().unwrap().as_scalar(),
            Some(&Scalar::I64(60)),
            "{label}"
        );
        let now = df.to_table().unwrap();
        assert_eq!(now.column_names(), vec!["c0", "c1", "flag"], "{label}");
        assert_eq!(now.row(2), vec![Scalar::I64(3), Scalar::I64(300), Scalar::Bool(true)], "{label}");
    }
}

#[test]
fn test_arithmetic_operators() {
    type Op = fn(&DataFrame, &DataFrame) -> tandem::Result<DataFrame>;
    let cases: Vec<(Op, Scalar)> = vec![
        (|a, b| a.div(b), Scalar::F64(-3.5)),
        (|a, b| a.rem(b), Scalar::I64(-1)),
        (|a, b| a.bitxor(b), Scalar::I64(-7 ^ 2)),
        (|a, b| a.bitand(b), Scalar::I64(-7 & 2)),
        (|a, b| a.bitor(b), Scalar::I64(-7 | 2)),
        (|a, _| a.neg(), Scalar::I64(7)),
        (|_, b| b.bitnot(), Scalar::I64(!2)),
        (|a, b| a.sub(b), Scalar::I64(-9)),
    ];
    for (op, want) in cases {
        let out = check(true, |s| {
            let df = s
                .from_rows(&["a", "b"], vec![ints(&[7, 2]), ints(&[-7, 2]), ints(&[6, 4])])
                .unwrap();
            op(&df.col("a").unwrap(), &df.col("b").unwrap()).unwrap()
        });
        assert_eq!(rows(&out)[1], vec![want]);
    }
}

#[test]
fn test_sort_head_union_rename_dedup() {
    let out = check(true, |s| {
        let a = table_a(s);
        let b = table_b(s);
        a.union(&[&b])
            .unwrap()
            .sort_values(&["c1"], false)
            .unwrap()
            .head(4)
            .unwrap()
    });
    assert_eq!(
        rows(&out),
        vec![ints(&[4, 400]), ints(&[3, 300]), ints(&[2, 200]), ints(&[3, 30])]
    );

    let out = check(false, |s| {
        let a = table_a(s);
        s.concat(&[&a, &a])
            .unwrap()
            .drop_duplicates()
            .unwrap()
            .rename(&[("c1", "value")])
            .unwrap()
    });
    assert_eq!(out.column_names(), vec!["c0", "value"]);
    assert_eq!(
        sorted_rows(&out),
        vec![ints(&[1, 10]), ints(&[2, 20]), ints(&[3, 30])]
    );
}

#[test]
fn test_multi_key_sort() {
    let out = check(true, |s| {
        s.from_rows(
            &["g", "v"],
            vec![ints(&[2, 1]), ints(&[1, 5]), ints(&[2, 9]), ints(&[1, 3])],
        )
        .unwrap()
        .sort_values(&["g", "v"], true)
        .unwrap()
    });
    assert_eq!(
        rows(&out),
        vec![ints(&[1, 3]), ints(&[1, 5]), ints(&[2, 1]), ints(&[2, 9])]
    );
}

#[test]
fn test_results_are_memoized() {
    for (label, config) in configs() {
        let s = Session::new(config).unwrap();
        let joined = table_a(&s)
            .merge(&table_b(&s), &["c0"], JoinType::Inner)
            .unwrap()
            .sort_values(&["c0"], true)
            .unwrap();
        let first = joined.compute().unwrap();
        let after_first = s.stats().unwrap();
        let second = joined.compute().unwrap();
        assert_eq!(first, second, "{label}");
        assert_eq!(s.stats().unwrap(), after_first, "{label}: work was repeated");
    }
}

#[test]
fn test_pipelined_mode_creates_one_table() {
    let run = |materialize: bool| {
        let mut config = EngineConfig::default().with_strategy(OffloadStrategy::Always);
        config.materialize_intermediates = materialize;
        let s = Session::new(config).unwrap();
        let a = table_a(&s);
        let c1 = a.col("c1").unwrap();
        let big = a.filter(&c1.gt(10i64).unwrap()).unwrap();
        let sorted = big.sort_values(&["c1"], false).unwrap();
        let top = sorted.head(1).unwrap();
        let before = s.stats().unwrap();
        let table = top.to_table().unwrap();
        assert_eq!(rows(&table), vec![ints(&[3, 30])]);
        let after = s.stats().unwrap();
        (after.tables_created - before.tables_created, sorted.sql().unwrap())
    };

    let (created, _) = run(true);
    assert_eq!(created, 3);
    let (created, sql) = run(false);
    assert_eq!(created, 1);
    assert!(sql.starts_with("WITH "), "unmaterialized ancestors become CTEs: {sql}");
}
