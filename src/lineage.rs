use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use rayon::prelude::*;
use serde::Serialize;

use crate::ast::{QualifiedTableName, ResolvedTables, StatementKind, StatementUnit};
use crate::classifier::classify;
use crate::cleaner::NoiseCleaner;
use crate::config::LineageConfig;
use crate::error::LineageError;
use crate::parser::{ResolveOptions, resolve};
use crate::segmenter::Segmenter;

/// File extensions picked up when the input path is a directory.
pub const INPUT_EXTENSIONS: &[&str] = &["sql", "log", "txt"];

/// One source-to-target edge, emitted once per (target, source) pair of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LineageMapping {
    pub source: QualifiedTableName,
    pub target: QualifiedTableName,
    pub timestamp: Option<String>,
    pub statement_kind: StatementKind,
}

/// Every table seen across the run, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableRegistry {
    pub all_sources: IndexSet<QualifiedTableName>,
    pub all_targets: IndexSet<QualifiedTableName>,
}

impl TableRegistry {
    /// Union of sources and targets, sources first.
    pub fn tables(&self) -> IndexSet<&QualifiedTableName> {
        self.all_sources.iter().chain(&self.all_targets).collect()
    }

    pub fn contains(&self, table: &QualifiedTableName) -> bool {
        self.all_sources.contains(table) || self.all_targets.contains(table)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineageStats {
    /// Statement units handed to the aggregator.
    pub statements: usize,
    pub resolved: usize,
    /// Units whose classification carries no lineage.
    pub skipped: usize,
    /// Units the resolver rejected.
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Lineage {
    pub mappings: Vec<LineageMapping>,
    pub registry: TableRegistry,
    pub stats: LineageStats,
}

/// What happened to one statement unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    Resolved {
        kind: StatementKind,
        timestamp: Option<String>,
        tables: ResolvedTables,
    },
    Skipped,
    Failed {
        kind: StatementKind,
        error: String,
    },
}

/// Folds per-statement results into the run's mappings and table registry.
#[derive(Debug, Default)]
pub struct LineageAggregator {
    lineage: Lineage,
}

impl LineageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the tables of one statement and emits the cross product of its
    /// targets and sources. A statement without targets only feeds the registry.
    pub fn add_statement(
        &mut self,
        tables: &ResolvedTables,
        timestamp: Option<&str>,
        kind: StatementKind,
    ) {
        let registry = &mut self.lineage.registry;
        registry.all_sources.extend(tables.sources.iter().cloned());
        registry.all_targets.extend(tables.targets.iter().cloned());

        for target in &tables.targets {
            for source in &tables.sources {
                self.lineage.mappings.push(LineageMapping {
                    source: source.clone(),
                    target: target.clone(),
                    timestamp: timestamp.map(str::to_owned),
                    statement_kind: kind,
                });
            }
        }
    }

    pub fn add_outcome(&mut self, outcome: StatementOutcome) {
        self.lineage.stats.statements += 1;
        match outcome {
            StatementOutcome::Resolved {
                kind,
                timestamp,
                tables,
            } => {
                self.lineage.stats.resolved += 1;
                self.add_statement(&tables, timestamp.as_deref(), kind);
            }
            StatementOutcome::Skipped => self.lineage.stats.skipped += 1,
            StatementOutcome::Failed { .. } => self.lineage.stats.failed += 1,
        }
    }

    pub fn finish(self) -> Lineage {
        self.lineage
    }
}

/// The segment, classify, clean and resolve pipeline for one configuration.
#[derive(Debug, Clone)]
pub struct LineageExtractor {
    segmenter: Segmenter,
    cleaner: NoiseCleaner,
    options: ResolveOptions,
    parallel: bool,
}

impl LineageExtractor {
    pub fn new(config: &LineageConfig) -> Result<Self, LineageError> {
        config.validate()?;
        Ok(Self {
            segmenter: Segmenter::new(config.min_statement_len),
            cleaner: NoiseCleaner::new(&config.noise_patterns)?,
            options: config.resolve_options(),
            parallel: config.parallel,
        })
    }

    pub fn segment(&self, blob: &str) -> Vec<StatementUnit> {
        self.segmenter.segment(blob)
    }

    pub fn process_unit(&self, unit: &StatementUnit) -> StatementOutcome {
        let kind = classify(&unit.text);
        if !kind.has_lineage() {
            log::debug!("Skipping statement #{}: no lineage keyword", unit.index);
            return StatementOutcome::Skipped;
        }

        let sql = self.cleaner.clean(&unit.text);
        match resolve(&sql, kind, &self.options) {
            Ok(tables) => {
                if tables.is_empty() {
                    log::debug!("Statement #{} ({}) references no tables", unit.index, kind);
                }
                StatementOutcome::Resolved {
                    kind,
                    timestamp: unit.approximate_timestamp.clone(),
                    tables,
                }
            }
            Err(err) => {
                log::warn!(
                    "Could not extract lineage from statement #{} ({}): {}",
                    unit.index,
                    kind,
                    err
                );
                StatementOutcome::Failed {
                    kind,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Outcomes are returned in unit order whether or not `parallel` is set.
    pub fn process_units(&self, units: &[StatementUnit]) -> Vec<StatementOutcome> {
        if self.parallel && !units.is_empty() {
            let n_chunks = std::cmp::max(
                1,
                units.len()
                    / std::thread::available_parallelism()
                        .map(|n| n.get())
                        .unwrap_or(1),
            );
            units
                .par_chunks(n_chunks)
                .flat_map_iter(|chunk| chunk.iter().map(|unit| self.process_unit(unit)))
                .collect()
        } else {
            units.iter().map(|unit| self.process_unit(unit)).collect()
        }
    }

    pub fn extract_into(&self, blob: &str, aggregator: &mut LineageAggregator) {
        let units = self.segment(blob);
        for outcome in self.process_units(&units) {
            aggregator.add_outcome(outcome);
        }
    }

    pub fn extract(&self, blob: &str) -> Lineage {
        let mut aggregator = LineageAggregator::new();
        self.extract_into(blob, &mut aggregator);
        aggregator.finish()
    }
}

/// Extracts table lineage from one raw blob.
///
/// Only an invalid configuration is an error. Statements that cannot be resolved
/// are counted in [`LineageStats::failed`] and the run goes on.
pub fn extract_lineage(blob: &str, config: &LineageConfig) -> Result<Lineage, LineageError> {
    let extractor = LineageExtractor::new(config)?;
    let lineage = extractor.extract(blob);
    log::info!(
        "Extracted {} mappings from {} statements ({} skipped, {} failed)",
        lineage.mappings.len(),
        lineage.stats.statements,
        lineage.stats.skipped,
        lineage.stats.failed
    );
    Ok(lineage)
}

/// Reads a file, or every matching file of a directory sorted by path.
///
/// All inputs are read before any is processed, so a read failure produces no
/// partial lineage.
pub fn read_inputs(path: &Path) -> Result<Vec<(PathBuf, String)>, LineageError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| LineageError::Io { path, source }
    };

    let files = if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(io_error(path))?
            .filter_map(|res| res.ok())
            .map(|entry| entry.path())
            .filter(|file| {
                file.is_file()
                    && file.extension().is_some_and(|ext| {
                        INPUT_EXTENSIONS
                            .iter()
                            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
                    })
            })
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    files
        .into_iter()
        .map(|file| {
            let contents = std::fs::read_to_string(&file).map_err(io_error(&file))?;
            Ok::<_, LineageError>((file, contents))
        })
        .collect()
}

/// Extracts lineage from a file or a directory of log files into one result.
pub fn extract_lineage_from_path(
    path: &Path,
    config: &LineageConfig,
) -> Result<Lineage, LineageError> {
    let inputs = read_inputs(path)?;
    let extractor = LineageExtractor::new(config)?;
    let mut aggregator = LineageAggregator::new();
    for (file, blob) in &inputs {
        log::debug!("Processing {}", file.display());
        extractor.extract_into(blob, &mut aggregator);
    }
    let lineage = aggregator.finish();
    log::info!(
        "Extracted {} mappings from {} files",
        lineage.mappings.len(),
        inputs.len()
    );
    Ok(lineage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> QualifiedTableName {
        name.parse().unwrap()
    }

    #[test]
    fn test_cross_product_and_registry() {
        let mut aggregator = LineageAggregator::new();
        let tables = ResolvedTables {
            sources: [table("a"), table("b")].into_iter().collect(),
            targets: [table("x"), table("y")].into_iter().collect(),
        };
        aggregator.add_statement(&tables, Some("2024-01-01 10:00:00"), StatementKind::Insert);
        let lineage = aggregator.finish();

        let pairs: Vec<_> = lineage
            .mappings
            .iter()
            .map(|m| (m.source.as_str(), m.target.as_str()))
            .collect();
        assert_eq!(pairs, vec![("A", "X"), ("B", "X"), ("A", "Y"), ("B", "Y")]);
        assert_eq!(lineage.registry.tables().len(), 4);
    }

    #[test]
    fn test_statement_without_targets_feeds_registry_only() {
        let mut aggregator = LineageAggregator::new();
        aggregator.add_outcome(StatementOutcome::Resolved {
            kind: StatementKind::Select,
            timestamp: None,
            tables: ResolvedTables {
                sources: [table("db.orders")].into_iter().collect(),
                targets: IndexSet::new(),
            },
        });
        aggregator.add_outcome(StatementOutcome::Skipped);
        let lineage = aggregator.finish();

        assert!(lineage.mappings.is_empty());
        assert!(lineage.registry.contains(&table("DB.ORDERS")));
        assert_eq!(lineage.stats.statements, 2);
        assert_eq!(lineage.stats.skipped, 1);
    }
}
