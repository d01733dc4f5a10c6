use std::collections::HashSet;

use sqlineage::{
    LineageError, ScriptLineage,
    config::LineageConfig,
    frontend::SqlParserFrontEnd,
    lineage::{CatalogIndex, Table},
    test_utils::{LINEAGE_TESTS_FILE, TestColumnEdge, TestLineage, TestLineageData},
};

fn load_tests() -> TestLineageData {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml")
}

fn run(test: &TestLineage) -> ScriptLineage {
    let config = test.config();
    let catalog = test
        .catalog()
        .index(config.case_insensitive)
        .expect("Cannot index test catalog");
    let front_end = SqlParserFrontEnd::from_config(&config);
    ScriptLineage::from_sql(&test.sql, &front_end, &catalog, &config)
}

fn table_names(tables: impl IntoIterator<Item = Table>) -> HashSet<String> {
    tables.into_iter().map(|table| table.to_string()).collect()
}

fn expected_names(tables: &[String]) -> HashSet<String> {
    tables.iter().cloned().collect()
}

#[test]
fn test_lineage() {
    let test_lineage_data = load_tests();

    for test in &test_lineage_data.tests {
        println!("Testing lineage for SQL: {}", &test.sql);

        let lineage = run(test);
        for failure in lineage.failures() {
            println!(
                "Could not extract lineage for statement {} due to: {:?}",
                failure.index, failure.error
            );
        }
        assert_eq!(lineage.failures().count(), 0);

        assert_eq!(
            table_names(lineage.source_tables()),
            expected_names(&test.source_tables)
        );
        assert_eq!(
            table_names(lineage.target_tables()),
            expected_names(&test.target_tables)
        );
        assert_eq!(
            table_names(lineage.intermediate_tables()),
            expected_names(&test.intermediate_tables)
        );

        if let Some(expected_columns) = test.expected_columns() {
            let columns: HashSet<TestColumnEdge> = lineage
                .column_lineage()
                .iter()
                .map(|edge| TestColumnEdge(edge.source.to_string(), edge.target.to_string()))
                .collect();
            assert_eq!(columns, expected_columns);
        }
    }
}

#[test]
fn test_lineage_is_idempotent() {
    let test_lineage_data = load_tests();

    for test in &test_lineage_data.tests {
        let first = run(test);
        let second = run(test);
        assert_eq!(first.column_lineage(), second.column_lineage());
        assert_eq!(first.source_tables(), second.source_tables());
        assert_eq!(first.target_tables(), second.target_tables());
        assert_eq!(
            first.table_graph().edges().collect::<Vec<_>>(),
            second.table_graph().edges().collect::<Vec<_>>()
        );
    }
}

#[test]
fn test_sequential_and_parallel_runs_agree() {
    let test_lineage_data = load_tests();
    let sql = test_lineage_data
        .tests
        .iter()
        .map(|test| test.sql.trim().trim_end_matches(';'))
        .collect::<Vec<_>>()
        .join("\n;\n");

    let run_with = |parallel: bool| {
        let config = LineageConfig {
            parallel,
            ..LineageConfig::default()
        };
        let front_end = SqlParserFrontEnd::from_config(&config);
        ScriptLineage::from_sql(&sql, &front_end, &CatalogIndex::default(), &config)
    };

    let sequential = run_with(false);
    let parallel = run_with(true);
    assert_eq!(sequential.reports().len(), parallel.reports().len());
    assert_eq!(sequential.column_lineage(), parallel.column_lineage());
    assert_eq!(
        sequential.table_graph().edges().collect::<Vec<_>>(),
        parallel.table_graph().edges().collect::<Vec<_>>()
    );
}

#[test]
fn test_failing_statements_do_not_stop_the_script() {
    let sql = "
        INSERT INTO tab2 SELECT a FROM tab1;
        SELEC broken FROM nowhere;
        INSERT INTO tab3 SELECT a FROM tab2;
    ";
    let config = LineageConfig::default();
    let front_end = SqlParserFrontEnd::from_config(&config);
    let lineage = ScriptLineage::from_sql(sql, &front_end, &CatalogIndex::default(), &config);

    let failures: Vec<usize> = lineage.failures().map(|report| report.index).collect();
    assert_eq!(failures, vec![1]);
    assert!(matches!(
        lineage.reports()[1].error,
        Some(LineageError::FrontEnd { index: 1, .. })
    ));
    assert_eq!(
        table_names(lineage.intermediate_tables()),
        HashSet::from(["tab2".to_owned()])
    );
}

#[test]
fn test_depth_limit_is_reported_per_statement() {
    let nested = (0..10).fold("SELECT a FROM tab1".to_owned(), |query, level| {
        format!("SELECT a FROM ({}) d{}", query, level)
    });
    let sql = format!("INSERT INTO tab2 {};\nINSERT INTO tab3 SELECT a FROM tab1", nested);
    let config = LineageConfig {
        max_depth: 4,
        ..LineageConfig::default()
    };
    let front_end = SqlParserFrontEnd::from_config(&config);
    let lineage = ScriptLineage::from_sql(&sql, &front_end, &CatalogIndex::default(), &config);

    assert!(matches!(
        lineage.reports()[0].error,
        Some(LineageError::TooDeeplyNested { limit: 4 })
    ));
    assert!(lineage.reports()[1].error.is_none());
    assert_eq!(
        table_names(lineage.target_tables()),
        HashSet::from(["tab3".to_owned()])
    );
}
