use std::sync::LazyLock;

use regex::{Regex, RegexSet};

use crate::classifier::STATEMENT_KEYWORDS;
use crate::error::LineageError;
use crate::segmenter::STATEMENT_KEYWORD_RE;

static LOG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*(?:
            \[?\d{4}-\d{2}-\d{2}[\sT]\d{2}:\d{2}:\d{2}[^\s\]]*\]?
          | (?:INFO|DEBUG|WARN|WARNING|ERROR|TRACE)\s*:
          | running\s+query\s*:
          | (?:created|populated)\s+\S+\s+\S+\s+\d{4}-\d{2}-\d{2}
        )",
    )
    .expect("valid log prefix regex")
});

static FOOTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:query\s+completed|affected\s+rows\s*:|rows\s+affected\s*:|execution\s+time\s*:)")
        .expect("valid footer regex")
});

static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-{3,}|={3,}|\*{3,}|_{3,}|~{3,})\s*$").expect("valid separator regex")
});

/// Characters a line of SQL can start with besides letters and digits.
const SQL_LEADING_CHARS: &str = "()[],'\"`.*=<>!+-/|@$:?%;_#";

/// Characters that never appear in a prose log line but are common in SQL.
const SQL_PUNCTUATION: &str = "()[],'\"`.*=<>;";

/// Clause words that may open a line of SQL in any letter case.
const CLAUSE_WORDS: &[&str] = &[
    "AND", "AS", "CASE", "CROSS", "ELSE", "END", "EXCEPT", "FROM", "FULL", "GROUP", "HAVING",
    "INNER", "INTERSECT", "INTO", "JOIN", "LEFT", "LIMIT", "NATURAL", "ON", "OR", "ORDER",
    "OUTER", "QUALIFY", "RIGHT", "SET", "THEN", "UNION", "USING", "VALUES", "WHEN", "WHERE",
    "WINDOW",
];

/// Words that only show up in SQL, never in a sentence.
const SQL_ONLY_WORDS: &[&str] = &["AS", "JOIN", "USING"];

/// A sentence such as `Loaded results from cache`: a capitalized word that is not a
/// SQL keyword, followed by plain words.
fn is_prose(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some(&first) = words.first() else {
        return false;
    };
    let mut chars = first.chars();
    let capitalized = chars.next().is_some_and(|c| c.is_uppercase())
        && first.chars().count() > 1
        && chars.all(|c| c.is_lowercase());

    words.len() >= 3
        && capitalized
        && !STATEMENT_KEYWORDS
            .iter()
            .chain(CLAUSE_WORDS)
            .any(|keyword| first.eq_ignore_ascii_case(keyword))
        && !line.chars().any(|c| SQL_PUNCTUATION.contains(c))
        && !words
            .iter()
            .any(|word| SQL_ONLY_WORDS.iter().any(|sql| word.eq_ignore_ascii_case(sql)))
}

/// `#tmp` is a T-SQL temp table, `# note` a comment.
fn is_hash_comment(line: &str) -> bool {
    line.strip_prefix('#').is_some_and(|rest| {
        !rest
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '#')
    })
}

/// Strips log decoration from a statement unit while leaving the SQL untouched.
///
/// Lines are handled independently:
/// - log prefixes (timestamps, `INFO:`, `Running query:`) are cut up to the first
///   statement keyword, or the line is dropped when none follows
/// - completion footers (`Query completed`, `Affected rows:`) truncate the line
/// - comment, separator and prose lines are dropped, where prose is either a line
///   starting with neither SQL nor an identifier, or a capitalized sentence without
///   SQL punctuation (`Loaded results from cache`)
/// - lines matching a configured noise pattern are dropped
#[derive(Debug, Clone, Default)]
pub struct NoiseCleaner {
    extra_patterns: Option<RegexSet>,
}

impl NoiseCleaner {
    pub fn new(extra_patterns: &[String]) -> Result<Self, LineageError> {
        if extra_patterns.is_empty() {
            return Ok(Self::default());
        }
        let set = RegexSet::new(extra_patterns)
            .map_err(|err| LineageError::Config(format!("invalid noise pattern: {}", err)))?;
        Ok(Self {
            extra_patterns: Some(set),
        })
    }

    pub fn clean(&self, text: &str) -> String {
        text.lines()
            .filter_map(|line| self.clean_line(line))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_owned()
    }

    fn clean_line<'a>(&self, line: &'a str) -> Option<&'a str> {
        if self
            .extra_patterns
            .as_ref()
            .is_some_and(|set| set.is_match(line))
        {
            return None;
        }

        let mut line = line;
        if let Some(prefix) = LOG_PREFIX_RE.find(line) {
            let rest = &line[prefix.end()..];
            let keyword = STATEMENT_KEYWORD_RE.find(rest)?;
            line = &rest[keyword.start()..];
        }
        if let Some(footer) = FOOTER_RE.find(line) {
            line = &line[..footer.start()];
        }

        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with("--")
            || is_hash_comment(trimmed)
            || SEPARATOR_RE.is_match(trimmed)
            || is_prose(trimmed)
        {
            return None;
        }
        let first = trimmed.chars().next()?;
        if !(first.is_alphanumeric() || SQL_LEADING_CHARS.contains(first)) {
            return None;
        }
        Some(line.trim_end())
    }
}
