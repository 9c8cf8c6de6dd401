//! Export of a [`Lineage`] as a CSV mapping table and as JSON Lines graph files.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use indexmap::{IndexMap, IndexSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ast::{QualifiedTableName, StatementKind};
use crate::error::LineageError;
use crate::lineage::{Lineage, LineageMapping};

pub const MAPPINGS_FILE: &str = "mappings.csv";
pub const NODES_FILE: &str = "nodes.jsonl";
pub const EDGES_FILE: &str = "edges.jsonl";

pub const EDGE_LABEL: &str = "TO_TARGET";

/// Separator between source names in the `target` CSV layout.
pub const SOURCES_SEPARATOR: &str = "|";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingLayout {
    /// One row per (source, target) mapping.
    #[default]
    Pair,
    /// One row per (target, timestamp, kind) with its sources joined.
    Target,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportOptions {
    pub layout: MappingLayout,
    /// Drop repeated (source, target, timestamp, kind) mappings, keeping the first.
    pub dedupe: bool,
}

/// `id` and `name` are the full qualified name, `label` its last segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl GraphNode {
    fn from_table(table: &QualifiedTableName) -> Self {
        Self {
            id: table.as_str().to_owned(),
            label: table.label().to_owned(),
            name: table.as_str().to_owned(),
            schema: table.schema().map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_kind: Option<StatementKind>,
}

/// Paths written by [`write_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub mappings: PathBuf,
    pub nodes: PathBuf,
    pub edges: PathBuf,
}

/// Mappings in emission order, optionally without repeats.
pub fn exported_mappings<'a>(
    lineage: &'a Lineage,
    options: &ExportOptions,
) -> Vec<&'a LineageMapping> {
    if options.dedupe {
        lineage
            .mappings
            .iter()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    } else {
        lineage.mappings.iter().collect()
    }
}

fn csv_error(err: csv::Error) -> LineageError {
    LineageError::Csv(err)
}

pub fn export_mappings_csv(
    lineage: &Lineage,
    options: &ExportOptions,
) -> Result<Vec<u8>, LineageError> {
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());

    match options.layout {
        MappingLayout::Pair => {
            writer
                .write_record(["source", "target", "timestamp", "statement_kind"])
                .map_err(csv_error)?;
            for mapping in exported_mappings(lineage, options) {
                let kind = mapping.statement_kind.to_string();
                writer
                    .write_record([
                        mapping.source.as_str(),
                        mapping.target.as_str(),
                        mapping.timestamp.as_deref().unwrap_or_default(),
                        kind.as_str(),
                    ])
                    .map_err(csv_error)?;
            }
        }
        MappingLayout::Target => {
            writer
                .write_record(["target", "sources", "timestamp", "statement_kind"])
                .map_err(csv_error)?;
            for ((target, timestamp, kind), sources) in group_by_target(lineage) {
                let sources = sources
                    .iter()
                    .map(|source| source.as_str())
                    .collect::<Vec<_>>()
                    .join(SOURCES_SEPARATOR);
                let kind = kind.to_string();
                writer
                    .write_record([
                        target.as_str(),
                        sources.as_str(),
                        timestamp.unwrap_or_default(),
                        kind.as_str(),
                    ])
                    .map_err(csv_error)?;
            }
        }
    }

    writer
        .into_inner()
        .map_err(|err| LineageError::Output(err.into_error()))
}

type TargetKey<'a> = (&'a QualifiedTableName, Option<&'a str>, StatementKind);

fn group_by_target(
    lineage: &Lineage,
) -> IndexMap<TargetKey<'_>, IndexSet<&QualifiedTableName>> {
    let mut groups: IndexMap<TargetKey<'_>, IndexSet<&QualifiedTableName>> = IndexMap::new();
    for mapping in &lineage.mappings {
        groups
            .entry((
                &mapping.target,
                mapping.timestamp.as_deref(),
                mapping.statement_kind,
            ))
            .or_default()
            .insert(&mapping.source);
    }
    groups
}

/// One node per registered table, sources first.
pub fn graph_nodes(lineage: &Lineage) -> Vec<GraphNode> {
    lineage
        .registry
        .tables()
        .into_iter()
        .map(GraphNode::from_table)
        .collect()
}

/// One edge per exported mapping, numbered `e0`, `e1`, ...
pub fn graph_edges(lineage: &Lineage, options: &ExportOptions) -> Vec<GraphEdge> {
    exported_mappings(lineage, options)
        .into_iter()
        .enumerate()
        .map(|(i, mapping)| GraphEdge {
            id: format!("e{}", i),
            from: mapping.source.as_str().to_owned(),
            to: mapping.target.as_str().to_owned(),
            label: EDGE_LABEL.to_owned(),
            timestamp: mapping.timestamp.clone(),
            statement_kind: Some(mapping.statement_kind),
        })
        .collect()
}

pub fn write_jsonl<W: Write, T: Serialize>(items: &[T], mut writer: W) -> Result<(), LineageError> {
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Blank lines are ignored.
pub fn read_jsonl<R: BufRead, T: DeserializeOwned>(reader: R) -> Result<Vec<T>, LineageError> {
    let mut items = vec![];
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(serde_json::from_str(&line)?);
    }
    Ok(items)
}

fn open_read(path: &Path) -> Result<BufReader<File>, LineageError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| LineageError::Io {
            path: path.to_path_buf(),
            source,
        })
}

pub fn read_nodes(path: &Path) -> Result<Vec<GraphNode>, LineageError> {
    read_jsonl(open_read(path)?)
}

pub fn read_edges(path: &Path) -> Result<Vec<GraphEdge>, LineageError> {
    read_jsonl(open_read(path)?)
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<(), LineageError>,
) -> Result<(), LineageError> {
    let write_error = |source: std::io::Error| LineageError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = BufWriter::new(File::create(path).map_err(write_error)?);
    write(&mut file)?;
    file.flush().map_err(write_error)
}

/// Writes the mapping table and both graph files into `dir`, creating it if needed.
pub fn write_artifacts(
    lineage: &Lineage,
    options: &ExportOptions,
    dir: &Path,
) -> Result<ArtifactPaths, LineageError> {
    std::fs::create_dir_all(dir).map_err(|source| LineageError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let paths = ArtifactPaths {
        mappings: dir.join(MAPPINGS_FILE),
        nodes: dir.join(NODES_FILE),
        edges: dir.join(EDGES_FILE),
    };

    let csv = export_mappings_csv(lineage, options)?;
    write_file(&paths.mappings, |file| Ok(file.write_all(&csv)?))?;
    write_file(&paths.nodes, |file| write_jsonl(&graph_nodes(lineage), file))?;
    write_file(&paths.edges, |file| {
        write_jsonl(&graph_edges(lineage, options), file)
    })?;

    log::info!("Wrote lineage artifacts to {}", dir.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ResolvedTables;
    use crate::lineage::LineageAggregator;

    fn lineage() -> Lineage {
        let mut aggregator = LineageAggregator::new();
        let tables = ResolvedTables {
            sources: ["SALES.ORDERS", "SALES.CUSTOMERS"]
                .iter()
                .map(|name| name.parse().unwrap())
                .collect(),
            targets: ["DW.FACT"].iter().map(|name| name.parse().unwrap()).collect(),
        };
        aggregator.add_statement(&tables, Some("2024-01-01 10:00:00"), StatementKind::Insert);
        aggregator.add_statement(&tables, Some("2024-01-01 10:00:00"), StatementKind::Insert);
        aggregator.finish()
    }

    #[test]
    fn test_pair_layout_with_dedupe() {
        let options = ExportOptions {
            layout: MappingLayout::Pair,
            dedupe: true,
        };
        let csv = String::from_utf8(export_mappings_csv(&lineage(), &options).unwrap()).unwrap();
        assert_eq!(
            csv,
            "source,target,timestamp,statement_kind\n\
             SALES.ORDERS,DW.FACT,2024-01-01 10:00:00,INSERT\n\
             SALES.CUSTOMERS,DW.FACT,2024-01-01 10:00:00,INSERT\n"
        );
    }

    #[test]
    fn test_target_layout_groups_sources() {
        let options = ExportOptions {
            layout: MappingLayout::Target,
            dedupe: false,
        };
        let csv = String::from_utf8(export_mappings_csv(&lineage(), &options).unwrap()).unwrap();
        assert_eq!(
            csv,
            "target,sources,timestamp,statement_kind\n\
             DW.FACT,SALES.ORDERS|SALES.CUSTOMERS,2024-01-01 10:00:00,INSERT\n"
        );
    }

    #[test]
    fn test_graph_nodes_and_edges() {
        let lineage = lineage();
        let nodes = graph_nodes(&lineage);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].label, "ORDERS");
        assert_eq!(nodes[0].name, "SALES.ORDERS");
        assert_eq!(nodes[0].schema.as_deref(), Some("SALES"));

        let edges = graph_edges(&lineage, &ExportOptions::default());
        assert_eq!(edges.len(), 4);
        assert_eq!(edges[3].id, "e3");
        assert_eq!(
            serde_json::to_string(&edges[0]).unwrap(),
            r#"{"id":"e0","from":"SALES.ORDERS","to":"DW.FACT","label":"TO_TARGET","timestamp":"2024-01-01 10:00:00","statementKind":"INSERT"}"#
        );
    }
}
