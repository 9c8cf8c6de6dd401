//! # sttm
//!
//! A library for extracting table-level source-to-target lineage from SQL statements
//! buried in noisy query logs.
//!
//! # Features
//!
//! - Split raw log blobs into statement units, carrying the closest log timestamp.
//! - Classify statements by their leading keyword, looking through `WITH` clauses.
//! - Strip log prefixes, footers and comment lines without touching the SQL.
//! - Resolve source and target tables through aliases, CTEs and nested subqueries.
//! - Export a CSV mapping table and JSON Lines node and edge files for graph loaders.
//!
//! # Example
//!
//! ```rust,no_run
//! use sttm::{
//!     config::LineageConfig,
//!     export::{export_mappings_csv, graph_edges},
//!     lineage::extract_lineage,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     env_logger::init();
//!
//!     let blob = r#"
//!         2024-01-01 10:00:00 INFO: Running query: INSERT INTO dw.fact_sales
//!         SELECT o.id, c.name
//!         FROM sales.orders o JOIN sales.customers c ON o.cid = c.id;
//!         Query completed in 12ms
//!     "#;
//!     let config = LineageConfig::default();
//!     let lineage = extract_lineage(blob, &config)?;
//!     for mapping in &lineage.mappings {
//!         println!("{} -> {}", mapping.source, mapping.target);
//!     }
//!
//!     let csv = export_mappings_csv(&lineage, &config.export)?;
//!     println!("{}", String::from_utf8(csv)?);
//!     println!("{:?}", graph_edges(&lineage, &config.export));
//!     Ok(())
//! }
//! ```
pub mod ast;
pub mod classifier;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod export;
pub mod functions;
pub mod lineage;
pub mod parser;
pub mod scanner;
pub mod segmenter;
pub mod test_utils;
