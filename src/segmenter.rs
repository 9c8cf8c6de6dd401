use std::sync::LazyLock;

use regex::Regex;

use crate::ast::StatementUnit;
use crate::classifier::STATEMENT_KEYWORDS;

pub const DEFAULT_MIN_STATEMENT_LEN: usize = 10;

pub(crate) static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}").expect("valid timestamp regex")
});

pub(crate) static STATEMENT_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", STATEMENT_KEYWORDS.join("|")))
        .expect("valid statement keyword regex")
});

/// Characters that end a log prefix right before a statement (`INFO: SELECT`, `sql> SELECT`).
const PREFIX_DELIMITERS: &[char] = &[':', '>', ']', '|'];

/// Byte offset of the first statement keyword that starts a line or follows a log
/// prefix delimiter.
pub(crate) fn find_statement_start(text: &str) -> Option<usize> {
    STATEMENT_KEYWORD_RE
        .find_iter(text)
        .map(|m| m.start())
        .find(|&start| {
            let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
            match text[line_start..start].trim_end().chars().last() {
                None => true,
                Some(c) => PREFIX_DELIMITERS.contains(&c),
            }
        })
}

fn last_timestamp(text: &str) -> Option<String> {
    TIMESTAMP_RE
        .find_iter(text)
        .last()
        .map(|m| m.as_str().to_owned())
}

/// Whether `line` is a log line announcing a statement, e.g. `INFO: Running query: INSERT ...`.
fn is_logged_statement(line: &str) -> bool {
    find_statement_start(line).is_some_and(|start| !line[..start].trim().is_empty())
}

/// Whether a new statement starts after the newline at `i`: either a blank line
/// followed by a statement start, or a log line announcing a statement.
fn is_boundary(blob: &str, i: usize) -> bool {
    let rest = &blob[i + 1..];
    let mut lines = rest.split('\n');
    let next_line = lines.next().unwrap_or_default();
    if is_logged_statement(next_line) {
        return true;
    }
    next_line.trim().is_empty()
        && lines
            .find(|line| !line.trim().is_empty())
            .is_some_and(|line| find_statement_start(line).is_some())
}

/// Splits a blob into chunks at `;`, at blank lines followed by a statement start and
/// before every log line that announces a statement.
///
/// `;` does not split inside a single-quoted literal or a `--` comment. Neither state
/// survives a line break, so a stray apostrophe in log prose only affects its own line.
fn split_chunks(blob: &str) -> Vec<&str> {
    let mut chunks = vec![];
    let mut chunk_start = 0;
    let mut in_quote = false;
    let mut in_comment = false;
    let mut chars = blob.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => {
                in_quote = false;
                in_comment = false;
                if is_boundary(blob, i) {
                    chunks.push(&blob[chunk_start..i]);
                    chunk_start = i + 1;
                }
            }
            _ if in_comment => {}
            '\'' => in_quote = !in_quote,
            '-' if !in_quote && chars.peek().is_some_and(|&(_, next)| next == '-') => {
                in_comment = true;
            }
            ';' if !in_quote => {
                chunks.push(&blob[chunk_start..i]);
                chunk_start = i + 1;
            }
            _ => {}
        }
    }
    chunks.push(&blob[chunk_start..]);
    chunks
}

/// Cuts a raw blob into statement units.
#[derive(Debug, Clone)]
pub struct Segmenter {
    min_statement_len: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_STATEMENT_LEN)
    }
}

impl Segmenter {
    pub fn new(min_statement_len: usize) -> Self {
        Self { min_statement_len }
    }

    /// Never fails: a blob without statements yields no units.
    pub fn segment(&self, blob: &str) -> Vec<StatementUnit> {
        let mut units = vec![];
        let mut pending_timestamp: Option<String> = None;

        for chunk in split_chunks(blob) {
            let Some(start) = find_statement_start(chunk) else {
                if let Some(timestamp) = last_timestamp(chunk) {
                    pending_timestamp = Some(timestamp);
                }
                continue;
            };

            let preamble = &chunk[..start];
            let timestamp = last_timestamp(preamble).or_else(|| pending_timestamp.clone());
            let text = chunk[start..].trim();

            if text.chars().count() < self.min_statement_len {
                log::debug!("Discarding short statement candidate {:?}", text);
                pending_timestamp = timestamp;
                continue;
            }

            pending_timestamp = None;
            units.push(StatementUnit {
                index: units.len(),
                text: text.to_owned(),
                approximate_timestamp: timestamp,
            });
        }

        log::debug!("Segmented {} statement units", units.len());
        units
    }
}

/// Segments `blob` with the default minimum statement length.
pub fn segment(blob: &str) -> Vec<StatementUnit> {
    Segmenter::default().segment(blob)
}
