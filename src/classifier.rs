use crate::ast::StatementKind;

/// Keywords that open a statement. `DROP` and the transaction keywords delimit
/// statements but carry no lineage.
pub const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "MERGE", "TRUNCATE",
    "BEGIN", "COMMIT", "ROLLBACK", "WITH",
];

fn keyword_kind(word: &str) -> Option<StatementKind> {
    let kind = match word.to_ascii_uppercase().as_str() {
        "SELECT" => StatementKind::Select,
        "INSERT" => StatementKind::Insert,
        "UPDATE" => StatementKind::Update,
        "DELETE" => StatementKind::Delete,
        "CREATE" => StatementKind::Create,
        "MERGE" => StatementKind::Merge,
        "TRUNCATE" => StatementKind::Truncate,
        "ALTER" => StatementKind::Alter,
        "DROP" | "BEGIN" | "COMMIT" | "ROLLBACK" => StatementKind::Other,
        _ => return None,
    };
    Some(kind)
}

/// Classifies a statement by its leading keyword.
///
/// A leading `WITH` clause is skipped: the kind is taken from the first keyword
/// found outside the CTE bodies. Anything else classifies as `Other`.
pub fn classify(text: &str) -> StatementKind {
    let mut in_with = false;
    for (word, depth) in Words::new(text) {
        if in_with {
            if depth == 0 {
                if let Some(kind) = keyword_kind(word) {
                    return kind;
                }
            }
            continue;
        }
        if word.eq_ignore_ascii_case("with") {
            in_with = true;
            continue;
        }
        return keyword_kind(word).unwrap_or(StatementKind::Other);
    }
    StatementKind::Other
}

/// Words of a SQL text with their parenthesis depth, skipping literals and comments.
struct Words<'a> {
    text: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Words<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            depth: 0,
        }
    }

    fn skip_until(&mut self, end: &str) {
        match self.text[self.pos..].find(end) {
            Some(offset) => self.pos += offset + end.len(),
            None => self.pos = self.text.len(),
        }
    }
}

impl<'a> Iterator for Words<'a> {
    type Item = (&'a str, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(c) = self.text[self.pos..].chars().next() {
            let rest = &self.text[self.pos..];
            if rest.starts_with("--") {
                self.skip_until("\n");
                continue;
            }
            if rest.starts_with("/*") {
                self.pos += 2;
                self.skip_until("*/");
                continue;
            }
            match c {
                '\'' | '"' | '`' => {
                    self.pos += 1;
                    self.skip_until(&c.to_string());
                }
                '(' => {
                    self.depth += 1;
                    self.pos += 1;
                }
                ')' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.pos += 1;
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = self.pos;
                    let len = rest
                        .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                        .unwrap_or(rest.len());
                    self.pos += len;
                    let text = self.text;
                    return Some((&text[start..self.pos], self.depth));
                }
                c => self.pos += c.len_utf8(),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_keyword() {
        assert_eq!(classify("insert into t values (1)"), StatementKind::Insert);
        assert_eq!(
            classify("CREATE OR REPLACE TABLE t AS SELECT 1"),
            StatementKind::Create
        );
        assert_eq!(classify("  Delete from t"), StatementKind::Delete);
        assert_eq!(classify("TRUNCATE TABLE t"), StatementKind::Truncate);
        assert_eq!(classify("ALTER TABLE t ADD c INT"), StatementKind::Alter);
    }

    #[test]
    fn test_non_lineage_keywords_are_other() {
        assert_eq!(classify("DROP TABLE t"), StatementKind::Other);
        assert_eq!(classify("BEGIN TRANSACTION"), StatementKind::Other);
        assert_eq!(classify("COMMIT"), StatementKind::Other);
        assert_eq!(classify("GRANT SELECT ON t TO bob"), StatementKind::Other);
        assert_eq!(classify("Query completed"), StatementKind::Other);
        assert_eq!(classify(""), StatementKind::Other);
    }

    #[test]
    fn test_with_clause_is_transparent() {
        assert_eq!(
            classify("WITH x AS (SELECT * FROM a) INSERT INTO t SELECT * FROM x"),
            StatementKind::Insert
        );
        assert_eq!(
            classify("with x as (select 1), y as (select 2) select * from x, y"),
            StatementKind::Select
        );
    }

    #[test]
    fn test_leading_comment_is_skipped() {
        assert_eq!(
            classify("/* job: 'nightly' */ -- run\nMERGE INTO t USING s ON 1=1"),
            StatementKind::Merge
        );
    }
}
