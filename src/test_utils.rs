use std::fmt::Display;

use serde::Deserialize;

use crate::ast::StatementKind;

pub const RESOLVER_TESTS_FILE: &str = "tests/resolver_tests.toml";
pub const SEGMENTATION_TESTS_FILE: &str = "tests/segmentation_tests.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct TestResolver {
    pub sql: String,
    pub kind: StatementKind,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    /// The resolver must reject the statement.
    #[serde(default)]
    pub fails: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestResolverData {
    pub tests: Vec<TestResolver>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestStatement {
    /// Expected start of the unit text.
    pub starts_with: String,
    pub kind: StatementKind,
    pub timestamp: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestSegmentation {
    pub blob: String,
    pub statements: Vec<TestStatement>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestSegmentationData {
    pub tests: Vec<TestSegmentation>,
}

impl Display for TestResolverData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
