//! Run configuration (`sttm.toml`).
//!
//! ```toml
//! min_statement_len = 10
//! max_subquery_depth = 16
//! parallel = false
//! function_names = ["MY_UDF"]
//! noise_patterns = ["^\\s*job_id="]
//!
//! [export]
//! layout = "pair"
//! dedupe = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LineageError;
use crate::export::ExportOptions;
use crate::functions::FunctionNames;
use crate::parser::{DEFAULT_MAX_SUBQUERY_DEPTH, ResolveOptions};
use crate::segmenter::DEFAULT_MIN_STATEMENT_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LineageConfig {
    /// Candidates shorter than this (in characters) are discarded by the segmenter.
    pub min_statement_len: usize,
    /// Subqueries nested deeper than this are skipped.
    pub max_subquery_depth: usize,
    /// Resolve statements on the rayon thread pool.
    pub parallel: bool,
    /// Additional names that are never table references.
    pub function_names: Vec<String>,
    /// Additional regexes; matching lines are stripped before resolution.
    pub noise_patterns: Vec<String>,
    pub export: ExportOptions,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            min_statement_len: DEFAULT_MIN_STATEMENT_LEN,
            max_subquery_depth: DEFAULT_MAX_SUBQUERY_DEPTH,
            parallel: false,
            function_names: vec![],
            noise_patterns: vec![],
            export: ExportOptions::default(),
        }
    }
}

impl LineageConfig {
    pub fn from_toml(toml: &str) -> Result<Self, LineageError> {
        let config: LineageConfig =
            toml::from_str(toml).map_err(|err| LineageError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, LineageError> {
        let contents = std::fs::read_to_string(path).map_err(|source| LineageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<(), LineageError> {
        if self.max_subquery_depth == 0 {
            return Err(LineageError::Config(
                "max_subquery_depth must be at least 1".to_owned(),
            ));
        }
        if let Some(name) = self.function_names.iter().find(|name| name.trim().is_empty()) {
            return Err(LineageError::Config(format!(
                "empty function name {:?} in function_names",
                name
            )));
        }
        Ok(())
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            max_subquery_depth: self.max_subquery_depth,
            functions: FunctionNames::new(&self.function_names),
        }
    }
}
