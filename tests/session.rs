//! Session configuration, database file lifecycle, ingestion and fallbacks.

use std::io::Write;

use tandem::prelude::*;
use tandem::store::StoreError;

fn sample(s: &Session) -> DataFrame {
    s.from_rows(
        &["c0", "c1"],
        vec![
            vec![Scalar::I64(1), Scalar::I64(10)],
            vec![Scalar::I64(2), Scalar::I64(20)],
            vec![Scalar::I64(3), Scalar::I64(30)],
        ],
    )
    .unwrap()
}

#[test]
fn test_missing_strategy_is_a_config_error() {
    let mut config = EngineConfig::default();
    config.strategy = None;
    let s = Session::new(config).unwrap();
    let df = sample(&s);

    // Base tables are already in memory and need no decision.
    assert_eq!(df.to_table().unwrap().num_rows(), 3);

    let err = df.col("c0").unwrap().to_table().unwrap_err();
    assert!(matches!(err, ExecError::Core(Error::Config(_))));

    s.set_strategy(Some(OffloadStrategy::Never)).unwrap();
    assert_eq!(s.strategy().unwrap(), Some(OffloadStrategy::Never));
    assert_eq!(df.col("c0").unwrap().to_table().unwrap().num_rows(), 3);
}

#[test]
fn test_strategy_from_environment() {
    std::env::set_var("TANDEM_STRATEGY", "sometimes");
    let err = Session::from_env().unwrap_err();
    assert!(matches!(err, ExecError::Core(Error::Config(_))));

    std::env::set_var("TANDEM_STRATEGY", "never");
    let s = Session::from_env().unwrap();
    std::env::remove_var("TANDEM_STRATEGY");
    assert_eq!(s.strategy().unwrap(), Some(OffloadStrategy::Never));
}

#[test]
fn test_switching_database_file_reloads_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.db");
    let second = dir.path().join("second.db");
    let s = Session::new(
        EngineConfig::default()
            .with_strategy(OffloadStrategy::Always)
            .with_database_path(first.to_string_lossy()),
    )
    .unwrap();
    assert_eq!(s.database_file().unwrap(), first);

    let df = sample(&s);
    let big = df.filter(&df.col("c1").unwrap().gt(10i64).unwrap()).unwrap();
    assert_eq!(big.to_table().unwrap().num_rows(), 2);
    assert!(first.exists());

    s.set_database_file(&second, true).unwrap();
    assert!(!first.exists());
    assert_eq!(s.database_file().unwrap(), second);

    // The cached result survives; nothing runs again for it.
    let before = s.stats().unwrap();
    assert_eq!(big.to_table().unwrap().num_rows(), 2);
    assert_eq!(s.stats().unwrap(), before);

    // New work offloads what it needs into the new file.
    let total = big.col("c1").unwrap().sum().unwrap();
    assert_eq!(total.compute().unwrap().as_scalar(), Some(&Scalar::I64(50)));
    let after = s.stats().unwrap();
    assert!(after.tables_loaded > before.tables_loaded);
    assert!(second.exists());
}

#[test]
fn test_storage_grows_with_offloaded_results() {
    let s = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Always)).unwrap();
    let df = sample(&s);
    let loaded = s.storage_size().unwrap();
    assert!(loaded > 0, "base tables are bulk loaded on creation");

    let big = df.filter(&df.col("c1").unwrap().gt(10i64).unwrap()).unwrap();
    big.compute().unwrap();
    assert!(s.storage_size().unwrap() > loaded);

    s.close(true).unwrap();
    assert!(matches!(
        s.storage_size().unwrap_err(),
        ExecError::Store(StoreError::Closed)
    ));
}

#[test]
fn test_close_keeps_or_deletes_user_files() {
    let dir = tempfile::tempdir().unwrap();
    for (delete, file) in [(false, "kept.db"), (true, "gone.db")] {
        let path = dir.path().join(file);
        let s = Session::new(
            EngineConfig::default()
                .with_strategy(OffloadStrategy::Always)
                .with_database_path(path.to_string_lossy()),
        )
        .unwrap();
        let df = sample(&s);
        df.head(1).unwrap().compute().unwrap();

        s.close(delete).unwrap();
        assert_eq!(path.exists(), !delete, "{file}");

        let err = df.head(2).unwrap().compute().unwrap_err();
        assert!(matches!(err, ExecError::Store(StoreError::Closed)), "{file}: {err}");
    }
}

#[test]
fn test_temp_database_removed_with_session() {
    let s = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Always)).unwrap();
    let df = sample(&s);
    df.head(2).unwrap().compute().unwrap();
    let path = s.database_file().unwrap();
    assert!(path.exists());

    drop(df);
    drop(s);
    assert!(!path.exists());
}

#[test]
fn test_describe_runs_in_memory_under_always() {
    let s = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Always)).unwrap();
    let described = sample(&s).describe().unwrap();
    let c0_total = described.col("c0").unwrap().sum().unwrap();

    // The fallback result must exist in memory before SQLite can use it.
    let err = c0_total.compute().unwrap_err();
    assert!(matches!(
        err,
        ExecError::Core(Error::BackendUnreachable {
            backend: Backend::Relational,
            ..
        })
    ));

    let table = described.to_table().unwrap();
    assert_eq!(table.column_names(), vec!["statistic", "c0", "c1"]);
    let stats = table.column("statistic").unwrap();
    let mean_at = stats
        .values
        .iter()
        .position(|v| v == &Scalar::from("mean"))
        .unwrap();
    assert_eq!(table.column("c1").unwrap().values[mean_at], Scalar::F64(20.0));

    // Now it is bulk loaded on demand.
    assert!(c0_total.compute().is_ok());
}

#[test]
fn test_apply_custom_function() {
    let s = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Best)).unwrap();
    let df = sample(&s);
    let output = Schema::new(vec![Field::new("total", DataType::Int64, false)]);
    let summed = df
        .apply("row_total", output, |t: &Table| {
            let totals = (0..t.num_rows())
                .map(|i| {
                    let row = t.row(i);
                    Scalar::I64(row.iter().filter_map(Scalar::as_i64).sum())
                })
                .collect();
            Ok(Table::new(vec![Column::new("total", totals)])?)
        })
        .unwrap();

    let doubled = summed.col("total").unwrap().mul(2i64).unwrap();
    let out = doubled.to_table().unwrap();
    assert_eq!(
        out.column("total").unwrap().values,
        vec![Scalar::I64(22), Scalar::I64(44), Scalar::I64(66)]
    );
}

#[test]
fn test_read_csv_and_json() {
    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("people.csv");
    let mut f = std::fs::File::create(&csv_path).unwrap();
    writeln!(f, "name,age").unwrap();
    writeln!(f, "ann,31").unwrap();
    writeln!(f, "bob,").unwrap();
    writeln!(f, "cy,17").unwrap();
    drop(f);

    let json_path = dir.path().join("ages.json");
    std::fs::write(
        &json_path,
        r#"[{"name": "ann", "city": "oslo"}, {"name": "cy", "city": "rome"}]"#,
    )
    .unwrap();

    let s = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Always)).unwrap();
    let people = s.read_csv(&csv_path).unwrap();
    let cities = s.read_json(&json_path).unwrap();
    assert_eq!(people.columns().unwrap(), vec!["name", "age"]);

    let joined = people
        .merge(&cities, &["name"], JoinType::Inner)
        .unwrap()
        .sort_values(&["name"], true)
        .unwrap();
    let out = joined.to_table().unwrap();
    assert_eq!(out.column_names(), vec!["name", "age", "city"]);
    assert_eq!(
        out.row(0),
        vec![Scalar::from("ann"), Scalar::I64(31), Scalar::from("oslo")]
    );

    let missing = people
        .filter(&people.col("age").unwrap().is_null().unwrap())
        .unwrap();
    assert_eq!(missing.to_table().unwrap().row(0)[0], Scalar::from("bob"));
}

#[test]
fn test_operands_from_other_sessions_are_rejected() {
    let s1 = Session::new(EngineConfig::default()).unwrap();
    let s2 = Session::new(EngineConfig::default()).unwrap();
    let a = sample(&s1);
    let b = sample(&s2);

    assert!(matches!(
        s1.concat(&[&a, &b]).unwrap_err(),
        ExecError::Core(Error::Construction(_))
    ));
    assert!(matches!(
        a.col("c0").unwrap().eq(&b.col("c0").unwrap()).unwrap_err(),
        ExecError::Core(Error::Construction(_))
    ));
}

#[test]
fn test_number_to_text_comparison_is_rejected() {
    let s = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Always)).unwrap();
    let df = sample(&s);
    assert!(matches!(
        df.col("c1").unwrap().gt("5").unwrap_err(),
        ExecError::Core(Error::Construction(_))
    ));
}

#[test]
fn test_sql_text_reflects_current_materialization() {
    let s = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Never)).unwrap();
    let df = sample(&s);
    let sel = df.filter(&df.col("c0").unwrap().ge(2i64).unwrap()).unwrap();
    let sorted = sel.sort_values(&["c1"], false).unwrap();

    let sql = sorted.sql().unwrap();
    assert!(sql.starts_with("WITH "), "{sql}");
    assert!(sql.contains("ORDER BY"), "{sql}");
    assert!(sql.contains(&df.name().unwrap()), "{sql}");
}

#[test]
fn test_session_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Session>();
    assert_send_sync::<DataFrame>();

    let s = Session::new(EngineConfig::default().with_strategy(OffloadStrategy::Never)).unwrap();
    let df = sample(&s);
    let handle = std::thread::spawn(move || {
        let total = df.col("c1").unwrap().sum().unwrap();
        total.compute().unwrap().as_scalar().cloned()
    });
    assert_eq!(handle.join().unwrap(), Some(Scalar::I64(60)));
}
