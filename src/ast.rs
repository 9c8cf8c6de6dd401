use std::{fmt::Display, str::FromStr};

use anyhow::anyhow;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use strum_macros::EnumDiscriminants;

/// A statement candidate cut out of a raw blob by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementUnit {
    /// Position of the unit in segmentation order.
    pub index: usize,
    pub text: String,
    pub approximate_timestamp: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Merge,
    Truncate,
    Alter,
    Other,
}

impl StatementKind {
    /// `Other` statements never reach the resolver.
    pub fn has_lineage(&self) -> bool {
        !matches!(self, StatementKind::Other)
    }
}

/// Upper-cased, dot-separated table name of one to four segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedTableName(String);

impl QualifiedTableName {
    pub const MAX_SEGMENTS: usize = 4;

    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> anyhow::Result<Self> {
        if segments.is_empty() || segments.len() > Self::MAX_SEGMENTS {
            return Err(anyhow!(
                "Table name must have between 1 and {} segments, found {}.",
                Self::MAX_SEGMENTS,
                segments.len()
            ));
        }
        let mut normalized = Vec::with_capacity(segments.len());
        for segment in segments {
            let segment = segment.as_ref().trim();
            if segment.is_empty() {
                return Err(anyhow!("Found empty segment in table name."));
            }
            normalized.push(segment.to_uppercase());
        }
        Ok(Self(normalized.join(".")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    pub fn segment_count(&self) -> usize {
        self.segments().count()
    }

    /// Last segment, used as the display label of graph nodes.
    pub fn label(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Everything before the last segment, if the name is qualified.
    pub fn schema(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(schema, _)| schema)
    }
}

impl FromStr for QualifiedTableName {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let segments = name.split('.').collect::<Vec<_>>();
        Self::from_segments(&segments)
    }
}

impl TryFrom<String> for QualifiedTableName {
    type Error = anyhow::Error;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<QualifiedTableName> for String {
    fn from(name: QualifiedTableName) -> Self {
        name.0
    }
}

impl Display for QualifiedTableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Statement-scoped alias bindings, keyed by the upper-cased alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable(IndexMap<String, QualifiedTableName>);

impl AliasTable {
    pub fn insert(&mut self, alias: &str, table: QualifiedTableName) {
        self.0.insert(alias.to_uppercase(), table);
    }

    /// Replaces `name` with the table it aliases, if it is an alias.
    pub fn resolve(&self, name: &QualifiedTableName) -> QualifiedTableName {
        if name.segment_count() == 1 {
            if let Some(table) = self.0.get(name.as_str()) {
                return table.clone();
            }
        }
        name.clone()
    }
}

/// Names bound by `WITH name AS (...)` inside one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CteNameSet(IndexSet<String>);

impl CteNameSet {
    pub fn insert(&mut self, name: &str) {
        self.0.insert(name.to_uppercase());
    }

    pub fn contains(&self, table: &QualifiedTableName) -> bool {
        table.segment_count() == 1 && self.0.contains(table.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|name| name.as_str())
    }
}

/// Tables read and written by one statement, in encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedTables {
    pub sources: IndexSet<QualifiedTableName>,
    pub targets: IndexSet<QualifiedTableName>,
}

impl ResolvedTables {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.targets.is_empty()
    }
}

#[derive(PartialEq, Clone, Debug, EnumDiscriminants)]
#[strum_discriminants(name(TokenTypeVariant))]
pub enum TokenType {
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Semicolon,
    Star,
    Operator(String),

    Identifier(String),
    QuotedIdentifier(String),
    String(String),
    Number(String),

    // Reserved keywords
    Alter,
    As,
    Create,
    Cross,
    Delete,
    Except,
    From,
    Full,
    Group,
    Having,
    Inner,
    Insert,
    Intersect,
    Into,
    Join,
    Lateral,
    Left,
    Limit,
    Merge,
    Natural,
    On,
    Or,
    Order,
    Outer,
    Qualify,
    Right,
    Select,
    Set,
    Truncate,
    Union,
    Update,
    Using,
    Where,
    Window,
    With,

    Eof,
}

impl TokenTypeVariant {
    pub(crate) fn variant_str(&self) -> &str {
        match self {
            TokenTypeVariant::LeftParen => "(",
            TokenTypeVariant::RightParen => ")",
            TokenTypeVariant::Comma => ",",
            TokenTypeVariant::Dot => ".",
            TokenTypeVariant::Semicolon => ";",
            TokenTypeVariant::Star => "*",
            TokenTypeVariant::Operator => "operator",
            TokenTypeVariant::Identifier => "identifier",
            TokenTypeVariant::QuotedIdentifier => "quoted identifier",
            TokenTypeVariant::String => "string",
            TokenTypeVariant::Number => "number",
            TokenTypeVariant::Alter => "ALTER",
            TokenTypeVariant::As => "AS",
            TokenTypeVariant::Create => "CREATE",
            TokenTypeVariant::Cross => "CROSS",
            TokenTypeVariant::Delete => "DELETE",
            TokenTypeVariant::Except => "EXCEPT",
            TokenTypeVariant::From => "FROM",
            TokenTypeVariant::Full => "FULL",
            TokenTypeVariant::Group => "GROUP",
            TokenTypeVariant::Having => "HAVING",
            TokenTypeVariant::Inner => "INNER",
            TokenTypeVariant::Insert => "INSERT",
            TokenTypeVariant::Intersect => "INTERSECT",
            TokenTypeVariant::Into => "INTO",
            TokenTypeVariant::Join => "JOIN",
            TokenTypeVariant::Lateral => "LATERAL",
            TokenTypeVariant::Left => "LEFT",
            TokenTypeVariant::Limit => "LIMIT",
            TokenTypeVariant::Merge => "MERGE",
            TokenTypeVariant::Natural => "NATURAL",
            TokenTypeVariant::On => "ON",
            TokenTypeVariant::Or => "OR",
            TokenTypeVariant::Order => "ORDER",
            TokenTypeVariant::Outer => "OUTER",
            TokenTypeVariant::Qualify => "QUALIFY",
            TokenTypeVariant::Right => "RIGHT",
            TokenTypeVariant::Select => "SELECT",
            TokenTypeVariant::Set => "SET",
            TokenTypeVariant::Truncate => "TRUNCATE",
            TokenTypeVariant::Union => "UNION",
            TokenTypeVariant::Update => "UPDATE",
            TokenTypeVariant::Using => "USING",
            TokenTypeVariant::Where => "WHERE",
            TokenTypeVariant::Window => "WINDOW",
            TokenTypeVariant::With => "WITH",
            TokenTypeVariant::Eof => "EOF",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenType,
    pub lexeme: String,
    pub line: u32,
    pub col: u32,
}
