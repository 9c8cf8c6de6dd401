use sttm::{
    ast::StatementKind,
    config::LineageConfig,
    export::{
        EDGE_LABEL, EDGES_FILE, ExportOptions, MAPPINGS_FILE, MappingLayout, NODES_FILE,
        export_mappings_csv, graph_edges, graph_nodes, read_edges, read_nodes, write_artifacts,
    },
    lineage::extract_lineage,
};

const LOG: &str = "\
2024-06-01 03:00:00 INFO: Running query: INSERT INTO mart.revenue
SELECT * FROM sales.orders o JOIN sales.refunds r ON o.id = r.order_id;
2024-06-01 03:00:00 INFO: Running query: INSERT INTO mart.revenue
SELECT * FROM sales.orders o JOIN sales.refunds r ON o.id = r.order_id;
INSERT INTO audit.runs (id) VALUES (1);
";

#[test]
fn test_write_and_read_artifacts() {
    let lineage = extract_lineage(LOG, &LineageConfig::default()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let options = ExportOptions::default();

    let paths = write_artifacts(&lineage, &options, &out_dir).unwrap();
    assert_eq!(paths.mappings, out_dir.join(MAPPINGS_FILE));
    assert_eq!(paths.nodes, out_dir.join(NODES_FILE));
    assert_eq!(paths.edges, out_dir.join(EDGES_FILE));

    let csv = std::fs::read_to_string(&paths.mappings).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines[0], "source,target,timestamp,statement_kind");
    assert_eq!(lines.len(), 1 + 5);
    assert_eq!(lines[5], "AUDIT.RUNS,AUDIT.RUNS,,INSERT");

    let nodes = read_nodes(&paths.nodes).unwrap();
    assert_eq!(nodes, graph_nodes(&lineage));
    assert_eq!(
        nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
        vec!["SALES.ORDERS", "SALES.REFUNDS", "AUDIT.RUNS", "MART.REVENUE"]
    );

    let edges = read_edges(&paths.edges).unwrap();
    assert_eq!(edges, graph_edges(&lineage, &options));
    assert_eq!(edges.len(), 5);
    for (i, edge) in edges.iter().enumerate() {
        assert_eq!(edge.id, format!("e{}", i));
        assert_eq!(edge.label, EDGE_LABEL);
        assert!(nodes.iter().any(|node| node.id == edge.from));
        assert!(nodes.iter().any(|node| node.id == edge.to));
    }
    assert_eq!(edges[4].timestamp, None);
    assert_eq!(edges[0].statement_kind, Some(StatementKind::Insert));
}

#[test]
fn test_dedupe_keeps_first_occurrence() {
    let lineage = extract_lineage(LOG, &LineageConfig::default()).unwrap();
    let options = ExportOptions {
        layout: MappingLayout::Pair,
        dedupe: true,
    };

    let edges = graph_edges(&lineage, &options);
    assert_eq!(edges.len(), 3);
    assert_eq!(edges[2].id, "e2");

    let csv = String::from_utf8(export_mappings_csv(&lineage, &options).unwrap()).unwrap();
    assert_eq!(
        csv,
        "source,target,timestamp,statement_kind\n\
         SALES.ORDERS,MART.REVENUE,2024-06-01 03:00:00,INSERT\n\
         SALES.REFUNDS,MART.REVENUE,2024-06-01 03:00:00,INSERT\n\
         AUDIT.RUNS,AUDIT.RUNS,,INSERT\n"
    );
}

#[test]
fn test_target_layout() {
    let lineage = extract_lineage(LOG, &LineageConfig::default()).unwrap();
    let options = ExportOptions {
        layout: MappingLayout::Target,
        dedupe: false,
    };
    let csv = String::from_utf8(export_mappings_csv(&lineage, &options).unwrap()).unwrap();
    assert_eq!(
        csv,
        "target,sources,timestamp,statement_kind\n\
         MART.REVENUE,SALES.ORDERS|SALES.REFUNDS,2024-06-01 03:00:00,INSERT\n\
         AUDIT.RUNS,AUDIT.RUNS,,INSERT\n"
    );
}

#[test]
fn test_empty_lineage_exports_headers_only() {
    let lineage = extract_lineage("nothing to see here", &LineageConfig::default()).unwrap();
    let csv = export_mappings_csv(&lineage, &ExportOptions::default()).unwrap();
    assert_eq!(
        String::from_utf8(csv).unwrap(),
        "source,target,timestamp,statement_kind\n"
    );
    assert!(graph_nodes(&lineage).is_empty());
    assert!(graph_edges(&lineage, &ExportOptions::default()).is_empty());
}
