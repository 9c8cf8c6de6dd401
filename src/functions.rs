/// Names that show up after `FROM`/`JOIN` in noisy statements but never denote
/// a durable table, such as functions whose argument list was lost in the log
/// and keywords that precede a parenthesised expression.
pub(crate) const KNOWN_FUNCTIONS: &[&str] = &[
    "AND",
    "ANY_VALUE",
    "ARRAY_AGG",
    "AVG",
    "BETWEEN",
    "CASE",
    "CAST",
    "COALESCE",
    "CONCAT",
    "COUNT",
    "CURRENT_DATE",
    "CURRENT_TIMESTAMP",
    "DATE_TRUNC",
    "DENSE_RANK",
    "ELSE",
    "END",
    "EXISTS",
    "EXTRACT",
    "FIRST_VALUE",
    "FLATTEN",
    "GENERATE_SERIES",
    "GREATEST",
    "IF",
    "IFNULL",
    "IN",
    "IS",
    "LAG",
    "LAST_VALUE",
    "LEAD",
    "LEAST",
    "LOWER",
    "MAX",
    "MIN",
    "NOT",
    "NTILE",
    "NULL",
    "NULLIF",
    "NVL",
    "OR",
    "RANK",
    "ROW_NUMBER",
    "SAFE_CAST",
    "SPLIT",
    "STRING_AGG",
    "SUBSTRING",
    "SUM",
    "THEN",
    "TRIM",
    "UNNEST",
    "UPPER",
    "WHEN",
];

/// Function-name filter used by the resolver, extensible through configuration.
#[derive(Debug, Clone)]
pub struct FunctionNames {
    extra: Vec<String>,
}

impl FunctionNames {
    pub fn new(extra: &[String]) -> Self {
        Self {
            extra: extra.iter().map(|name| name.trim().to_uppercase()).collect(),
        }
    }

    /// `name` must already be upper-cased.
    pub fn contains(&self, name: &str) -> bool {
        KNOWN_FUNCTIONS.binary_search(&name).is_ok() || self.extra.iter().any(|n| n == name)
    }
}

impl Default for FunctionNames {
    fn default() -> Self {
        Self::new(&[])
    }
}
