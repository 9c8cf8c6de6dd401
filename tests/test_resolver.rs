use std::collections::HashSet;

use sttm::{
    ast::StatementKind,
    classifier::classify,
    functions::FunctionNames,
    parser::{ResolveOptions, resolve, scan_statement},
    test_utils::{RESOLVER_TESTS_FILE, TestResolverData},
};

fn names(tables: &indexmap::IndexSet<sttm::ast::QualifiedTableName>) -> HashSet<String> {
    tables.iter().map(|table| table.as_str().to_owned()).collect()
}

#[test]
fn test_resolver_cases() {
    let resolver_test_file =
        std::fs::read_to_string(RESOLVER_TESTS_FILE).expect("Cannot open resolver test cases");
    let test_resolver_data: TestResolverData =
        toml::from_str(&resolver_test_file).expect("Cannot parse test cases defined in toml");
    let options = ResolveOptions::default();

    for test in test_resolver_data.tests {
        println!("Testing resolver for SQL: {}", &test.sql);
        assert_eq!(classify(&test.sql), test.kind);

        let resolved = resolve(&test.sql, test.kind, &options);
        if test.fails {
            assert!(resolved.is_err(), "Expected resolver error");
            continue;
        }
        let resolved = resolved.unwrap_or_else(|err| panic!("Could not resolve due to: {}", err));

        assert_eq!(
            names(&resolved.sources),
            test.sources.iter().cloned().collect::<HashSet<_>>()
        );
        assert_eq!(
            names(&resolved.targets),
            test.targets.iter().cloned().collect::<HashSet<_>>()
        );
    }
}

#[test]
fn test_names_are_case_insensitive() {
    let options = ResolveOptions::default();
    let sqls = [
        "insert into Dw.Out select * from Stg.In_Table",
        "INSERT INTO DW.OUT SELECT * FROM STG.IN_TABLE",
        "Insert Into dw.out Select * From stg.in_table",
    ];
    for sql in sqls {
        let resolved = resolve(sql, StatementKind::Insert, &options).unwrap();
        assert_eq!(names(&resolved.targets), HashSet::from(["DW.OUT".to_owned()]));
        assert_eq!(
            names(&resolved.sources),
            HashSet::from(["STG.IN_TABLE".to_owned()])
        );
    }
}

#[test]
fn test_sources_keep_encounter_order() {
    let resolved = resolve(
        "SELECT * FROM z.c JOIN z.a ON 1 = 1 JOIN z.b ON 1 = 1 JOIN z.a ON 1 = 1",
        StatementKind::Select,
        &ResolveOptions::default(),
    )
    .unwrap();
    let sources: Vec<_> = resolved.sources.iter().map(|t| t.as_str()).collect();
    assert_eq!(sources, vec!["Z.C", "Z.A", "Z.B"]);
}

#[test]
fn test_configured_function_names_are_not_tables() {
    let sql = "SELECT * FROM my_udf, db.real_table";
    let default = resolve(sql, StatementKind::Select, &ResolveOptions::default()).unwrap();
    assert_eq!(default.sources.len(), 2);

    let options = ResolveOptions {
        functions: FunctionNames::new(&["my_udf".to_owned()]),
        ..ResolveOptions::default()
    };
    let filtered = resolve(sql, StatementKind::Select, &options).unwrap();
    assert_eq!(
        names(&filtered.sources),
        HashSet::from(["DB.REAL_TABLE".to_owned()])
    );
}

#[test]
fn test_subqueries_past_depth_limit_are_pruned() {
    let sql = "INSERT INTO t SELECT * FROM (SELECT * FROM (SELECT * FROM deep.x) y) z, shallow.s";
    let options = ResolveOptions {
        max_subquery_depth: 1,
        ..ResolveOptions::default()
    };
    let scan = scan_statement(sql, StatementKind::Insert, &options).unwrap();
    assert_eq!(scan.pruned_subqueries, 1);

    let resolved = scan.resolve(StatementKind::Insert);
    assert_eq!(names(&resolved.sources), HashSet::from(["SHALLOW.S".to_owned()]));
    assert_eq!(names(&resolved.targets), HashSet::from(["T".to_owned()]));

    let unlimited = resolve(sql, StatementKind::Insert, &ResolveOptions::default()).unwrap();
    assert!(
        unlimited
            .sources
            .contains(&"DEEP.X".parse::<sttm::ast::QualifiedTableName>().unwrap())
    );
}

#[test]
fn test_deeply_nested_parentheses_do_not_overflow() {
    let depth = 1000;
    let sql = format!(
        "SELECT {}1{} FROM db.t",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    assert!(resolve(&sql, StatementKind::Select, &ResolveOptions::default()).is_err());
}

#[test]
fn test_cte_names_are_not_sources() {
    let scan = scan_statement(
        "WITH a AS (SELECT * FROM raw.a), b AS (SELECT * FROM a) INSERT INTO out.t SELECT * FROM b",
        StatementKind::Insert,
        &ResolveOptions::default(),
    )
    .unwrap();
    assert_eq!(scan.ctes.names().collect::<Vec<_>>(), vec!["A", "B"]);

    let resolved = scan.resolve(StatementKind::Insert);
    assert_eq!(names(&resolved.sources), HashSet::from(["RAW.A".to_owned()]));
}

#[test]
fn test_resolving_twice_is_identical() {
    let sql = "MERGE INTO dw.t t USING (SELECT * FROM stg.a a JOIN stg.b b ON a.id = b.id) s ON t.id = s.id WHEN MATCHED THEN UPDATE SET v = s.v";
    let options = ResolveOptions::default();
    let first = resolve(sql, StatementKind::Merge, &options).unwrap();
    let second = resolve(sql, StatementKind::Merge, &options).unwrap();
    assert_eq!(first, second);
    assert_eq!(names(&first.targets), HashSet::from(["DW.T".to_owned()]));
}

#[test]
fn test_statements_without_lineage_resolve_empty() {
    let options = ResolveOptions::default();
    let sqls = [
        ("DELETE FROM dw.t WHERE id IN (SELECT id FROM stg.d)", StatementKind::Delete),
        ("CREATE INDEX idx_a ON mart.daily (d)", StatementKind::Create),
        ("TRUNCATE TABLE dw.t", StatementKind::Truncate),
    ];
    for (sql, kind) in sqls {
        assert!(resolve(sql, kind, &options).unwrap().is_empty());
    }
    assert!(!resolve("SELECT * FROM db.t", StatementKind::Select, &options)
        .unwrap()
        .is_empty());
}

#[test]
fn test_merged_statements_fail_instead_of_mixing_tables() {
    let err = resolve(
        "INSERT INTO a.t1 SELECT * FROM b.s1\nINSERT INTO c.t2 SELECT * FROM d.s2",
        StatementKind::Insert,
        &ResolveOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("another statement"), "{}", err);
}
