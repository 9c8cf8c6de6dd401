use anyhow::anyhow;
use indexmap::IndexSet;
use strum::IntoDiscriminant;

use crate::ast::{
    AliasTable, CteNameSet, QualifiedTableName, ResolvedTables, StatementKind, Token, TokenType,
    TokenTypeVariant,
};
use crate::functions::FunctionNames;
use crate::scanner::Scanner;

pub const DEFAULT_MAX_SUBQUERY_DEPTH: usize = 16;

/// Hard cap on parenthesis nesting of any kind, subquery or expression.
const MAX_GROUP_NESTING: usize = 256;

/// Words that can follow a table reference without being its alias.
const NON_ALIAS_WORDS: &[&str] = &[
    "ANTI",
    "ASOF",
    "CLUSTER",
    "CONNECT",
    "DEFAULT",
    "DISTRIBUTE",
    "FETCH",
    "FINAL",
    "FOR",
    "MATCH_RECOGNIZE",
    "MINUS",
    "OFFSET",
    "OUTPUT",
    "OVERWRITE",
    "PARTITION",
    "PIVOT",
    "RETURNING",
    "SAMPLE",
    "SEMI",
    "SORT",
    "START",
    "STRAIGHT_JOIN",
    "TABLE",
    "TABLESAMPLE",
    "UNPIVOT",
    "VALUES",
    "WHEN",
];

/// Words that end a `FROM` list, besides the reserved clause keywords.
const FROM_LIST_END_WORDS: &[&str] = &[
    "CLUSTER",
    "DISTRIBUTE",
    "FETCH",
    "OFFSET",
    "RETURNING",
    "SORT",
    "VALUES",
    "WHEN",
];

/// Words after which a statement head keyword is part of the current statement,
/// e.g. `THEN INSERT` in a merge, `DO UPDATE` in an upsert or `FOR UPDATE` in a query.
const EMBEDDED_HEAD_PREFIXES: &[&str] = &["DO", "FOR", "KEY", "THEN"];

/// Modifiers allowed between `CREATE [OR REPLACE]` and `TABLE`/`VIEW`.
const CREATE_MODIFIERS: &[&str] = &[
    "DYNAMIC",
    "EXTERNAL",
    "GLOBAL",
    "ICEBERG",
    "LOCAL",
    "MATERIALIZED",
    "MULTISET",
    "RECURSIVE",
    "SECURE",
    "TEMP",
    "TEMPORARY",
    "TRANSIENT",
    "UNLOGGED",
    "VOLATILE",
];

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub max_subquery_depth: usize,
    pub functions: FunctionNames,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_subquery_depth: DEFAULT_MAX_SUBQUERY_DEPTH,
            functions: FunctionNames::default(),
        }
    }
}

/// Everything one pass over a statement found, before aliases and CTEs are applied.
#[derive(Debug, Default, Clone)]
pub struct StatementScan {
    pub targets: IndexSet<QualifiedTableName>,
    pub sources: IndexSet<QualifiedTableName>,
    pub aliases: AliasTable,
    pub ctes: CteNameSet,
    pub has_select: bool,
    pub has_values: bool,
    /// Subqueries skipped for exceeding the depth limit.
    pub pruned_subqueries: usize,
}

impl StatementScan {
    pub fn resolve(&self, kind: StatementKind) -> ResolvedTables {
        let mut sources = IndexSet::new();
        for source in &self.sources {
            let resolved = self.aliases.resolve(source);
            if self.ctes.contains(&resolved) {
                log::debug!("Dropping CTE `{}` from sources", resolved);
                continue;
            }
            sources.insert(resolved);
        }

        let targets: IndexSet<QualifiedTableName> = self
            .targets
            .iter()
            .map(|target| self.aliases.resolve(target))
            .collect();

        // A literal-values insert has no upstream table: the target stands in for it.
        if kind == StatementKind::Insert && self.has_values && !self.has_select {
            sources.extend(targets.iter().cloned());
        }

        ResolvedTables { sources, targets }
    }
}

pub struct Parser<'a> {
    source_tokens: &'a [Token],
    curr: usize,
    kind: StatementKind,
    options: &'a ResolveOptions,
    nesting: usize,
    head_seen: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], kind: StatementKind, options: &'a ResolveOptions) -> Self {
        Self {
            source_tokens: tokens,
            curr: 0,
            kind,
            options,
            nesting: 0,
            head_seen: false,
        }
    }

    pub fn parse(&mut self) -> anyhow::Result<StatementScan> {
        let mut scan = StatementScan::default();
        if self.source_tokens.is_empty() {
            return Ok(scan);
        }

        self.parse_clauses(&mut scan, 0, true)?;
        if !self.is_at_end() {
            return Err(anyhow!(self.error(self.peek(), "Found unbalanced `)`.")));
        }

        let needs_target = matches!(
            self.kind,
            StatementKind::Insert | StatementKind::Update | StatementKind::Merge
        );
        if needs_target && scan.targets.is_empty() {
            return Err(anyhow!(
                "Could not find the target table of {} statement.",
                self.kind
            ));
        }
        Ok(scan)
    }

    fn peek_prev(&self) -> &'a Token {
        &self.source_tokens[self.curr - 1]
    }

    fn peek(&self) -> &'a Token {
        &self.source_tokens[self.curr]
    }

    fn peek_next_i(&self, i: usize) -> &'a Token {
        if self.curr + i >= self.source_tokens.len() {
            &self.source_tokens[self.source_tokens.len() - 1] // Eof
        } else {
            &self.source_tokens[self.curr + i]
        }
    }

    fn advance(&mut self) -> &'a Token {
        if !self.is_at_end() {
            // Do not advance if we peek Eof
            self.curr += 1;
        }
        self.peek_prev()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenType::Eof
    }

    fn check_token_type(&self, token_type: TokenTypeVariant) -> bool {
        self.peek().kind.discriminant() == token_type
    }

    fn match_token_type(&mut self, token_type: TokenTypeVariant) -> bool {
        if self.check_token_type(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_non_reserved_keyword(&self, value: &str) -> bool {
        match &self.peek().kind {
            TokenType::Identifier(ident) => ident.eq_ignore_ascii_case(value),
            _ => false,
        }
    }

    fn match_non_reserved_keyword(&mut self, value: &str) -> bool {
        if self.check_non_reserved_keyword(value) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_non_reserved_keyword(&mut self, value: &str) -> anyhow::Result<&'a Token> {
        if self.check_non_reserved_keyword(value) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", value.to_uppercase());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn consume(&mut self, token_type: TokenTypeVariant) -> anyhow::Result<&'a Token> {
        if self.check_token_type(token_type) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", token_type.variant_str());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn error(&self, token: &Token, message: &str) -> String {
        format!(
            "[line {}, col {}] Error {}: {}",
            token.line,
            token.col,
            &format!("at '{}'", token.lexeme),
            message
        )
    }

    fn is_head(&self, kind: StatementKind) -> bool {
        self.nesting == 0 && !self.head_seen && self.kind == kind
    }

    /// A head keyword at the top level that belongs to neither this statement's head
    /// nor one of its clauses: two statements were merged into one unit.
    fn is_foreign_head(&self) -> bool {
        let checked_kind = matches!(
            self.kind,
            StatementKind::Select
                | StatementKind::Insert
                | StatementKind::Update
                | StatementKind::Merge
                | StatementKind::Create
        );
        if !checked_kind || self.nesting > 0 || self.curr == 0 {
            return false;
        }
        let prev = &self.peek_prev().lexeme;
        !EMBEDDED_HEAD_PREFIXES
            .iter()
            .any(|word| prev.eq_ignore_ascii_case(word))
    }

    fn ends_from_list(&self) -> bool {
        match &self.peek().kind {
            TokenType::Identifier(word) => FROM_LIST_END_WORDS
                .iter()
                .any(|end| word.eq_ignore_ascii_case(end)),
            kind => matches!(
                kind.discriminant(),
                TokenTypeVariant::Where
                    | TokenTypeVariant::Group
                    | TokenTypeVariant::Having
                    | TokenTypeVariant::Qualify
                    | TokenTypeVariant::Window
                    | TokenTypeVariant::Order
                    | TokenTypeVariant::Limit
                    | TokenTypeVariant::Union
                    | TokenTypeVariant::Except
                    | TokenTypeVariant::Intersect
                    | TokenTypeVariant::Select
                    | TokenTypeVariant::Set
                    | TokenTypeVariant::Semicolon
            ),
        }
    }

    // clauses -> ( group | from_list | join | using | with | head | token )*
    fn parse_clauses(
        &mut self,
        scan: &mut StatementScan,
        depth: usize,
        in_query: bool,
    ) -> anyhow::Result<()> {
        // Set after a FROM list or a join, so that `JOIN b ON ..., c` keeps reading tables.
        let mut in_from = false;
        loop {
            if in_from && self.ends_from_list() {
                in_from = false;
            }
            match self.peek().kind.discriminant() {
                TokenTypeVariant::Eof | TokenTypeVariant::RightParen => return Ok(()),
                TokenTypeVariant::LeftParen => {
                    self.advance();
                    self.parse_group(scan, depth, false)?;
                }
                TokenTypeVariant::From if in_query => {
                    self.advance();
                    self.parse_from_list(scan, depth)?;
                    in_from = true;
                }
                TokenTypeVariant::Join => {
                    self.advance();
                    self.parse_from_item(scan, depth)?;
                    in_from = in_query;
                }
                TokenTypeVariant::Comma if in_from => {
                    self.advance();
                    self.parse_from_item(scan, depth)?;
                }
                TokenTypeVariant::Using => {
                    self.advance();
                    // `JOIN ... USING (col)` is a column list, `MERGE ... USING src` a source.
                    if !self.check_token_type(TokenTypeVariant::LeftParen) {
                        self.parse_from_item(scan, depth)?;
                    }
                }
                TokenTypeVariant::With => {
                    self.advance();
                    self.parse_with(scan, depth)?;
                }
                TokenTypeVariant::Select => {
                    self.advance();
                    scan.has_select = true;
                }
                TokenTypeVariant::Insert if self.is_head(StatementKind::Insert) => {
                    self.advance();
                    self.parse_insert_target(scan)?;
                }
                TokenTypeVariant::Update if self.is_head(StatementKind::Update) => {
                    self.advance();
                    self.parse_update_target(scan)?;
                }
                TokenTypeVariant::Merge if self.is_head(StatementKind::Merge) => {
                    self.advance();
                    self.parse_merge_target(scan)?;
                }
                TokenTypeVariant::Create if self.is_head(StatementKind::Create) => {
                    self.advance();
                    self.parse_create_target(scan)?;
                }
                TokenTypeVariant::Insert
                | TokenTypeVariant::Update
                | TokenTypeVariant::Merge
                | TokenTypeVariant::Create
                    if self.is_foreign_head() =>
                {
                    return Err(anyhow!(self.error(
                        self.peek(),
                        "Found the start of another statement."
                    )));
                }
                TokenTypeVariant::Identifier if self.check_non_reserved_keyword("values") => {
                    let after_default = self.curr > 0
                        && matches!(
                            &self.peek_prev().kind,
                            TokenType::Identifier(prev) if prev.eq_ignore_ascii_case("default")
                        );
                    if !after_default {
                        scan.has_values = true;
                    }
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // group -> "(" ( query_expr | from_list | expr ) ")"
    // Called with the left parenthesis already consumed.
    fn parse_group(
        &mut self,
        scan: &mut StatementScan,
        depth: usize,
        is_from_item: bool,
    ) -> anyhow::Result<()> {
        let is_subquery = self.check_token_type(TokenTypeVariant::Select)
            || self.check_token_type(TokenTypeVariant::With);

        if is_subquery && depth + 1 > self.options.max_subquery_depth {
            log::warn!(
                "{} Skipping subquery nested deeper than {} levels.",
                self.error(self.peek(), "Subquery too deep."),
                self.options.max_subquery_depth
            );
            scan.pruned_subqueries += 1;
            return self.skip_group();
        }
        if self.nesting >= MAX_GROUP_NESTING {
            return Err(anyhow!(self.error(
                self.peek(),
                &format!("Parentheses nested deeper than {}.", MAX_GROUP_NESTING)
            )));
        }

        let depth = if is_subquery { depth + 1 } else { depth };
        self.nesting += 1;
        let result = self.parse_clauses(scan, depth, is_subquery || is_from_item);
        self.nesting -= 1;
        result?;

        self.consume(TokenTypeVariant::RightParen)?;
        Ok(())
    }

    /// Skips a group without collecting anything, left parenthesis already consumed.
    fn skip_group(&mut self) -> anyhow::Result<()> {
        let mut open = 1usize;
        loop {
            match self.peek().kind.discriminant() {
                TokenTypeVariant::Eof => {
                    return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
                }
                TokenTypeVariant::LeftParen => open += 1,
                TokenTypeVariant::RightParen => {
                    open -= 1;
                    if open == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    // from_list -> from_item ( "," from_item )*
    fn parse_from_list(&mut self, scan: &mut StatementScan, depth: usize) -> anyhow::Result<()> {
        self.parse_from_item(scan, depth)?;
        while self.match_token_type(TokenTypeVariant::Comma) {
            self.parse_from_item(scan, depth)?;
        }
        Ok(())
    }

    // from_item -> ["LATERAL" | "ONLY"] ( "(" group ")" [alias] | path "(" args ")" [alias] | path [alias] )
    fn parse_from_item(&mut self, scan: &mut StatementScan, depth: usize) -> anyhow::Result<()> {
        while self.match_token_type(TokenTypeVariant::Lateral)
            || self.match_non_reserved_keyword("only")
        {}

        match self.peek().kind.discriminant() {
            TokenTypeVariant::LeftParen => {
                self.advance();
                self.parse_group(scan, depth, true)?;
                // Derived tables are named by their alias, which is not a durable table.
                self.parse_alias();
            }
            TokenTypeVariant::Identifier | TokenTypeVariant::QuotedIdentifier => {
                let name = self.parse_qualified_name()?;

                if self.match_token_type(TokenTypeVariant::LeftParen) {
                    log::debug!("Skipping table function `{}`", name);
                    self.parse_group(scan, depth, false)?;
                    self.parse_alias();
                    return Ok(());
                }

                if name.segment_count() == 1 && self.options.functions.contains(name.as_str()) {
                    log::debug!("Ignoring function name `{}` in table position", name);
                    self.parse_alias();
                    return Ok(());
                }

                if let Some(alias) = self.parse_alias() {
                    scan.aliases.insert(&alias, name.clone());
                }
                scan.sources.insert(name);
            }
            _ => {
                log::debug!(
                    "{}",
                    self.error(self.peek(), "No table reference after FROM/JOIN.")
                );
            }
        }
        Ok(())
    }

    // alias -> "AS" identifier | identifier
    fn parse_alias(&mut self) -> Option<String> {
        if self.check_token_type(TokenTypeVariant::As) {
            return match &self.peek_next_i(1).kind {
                TokenType::Identifier(alias) | TokenType::QuotedIdentifier(alias) => {
                    self.advance();
                    self.advance();
                    Some(alias.clone())
                }
                // `AS` introduces something else here, e.g. `CREATE TABLE t AS SELECT`.
                _ => None,
            };
        }

        match &self.peek().kind {
            TokenType::Identifier(alias)
                if !NON_ALIAS_WORDS
                    .iter()
                    .any(|word| alias.eq_ignore_ascii_case(word)) =>
            {
                self.advance();
                Some(alias.clone())
            }
            TokenType::QuotedIdentifier(alias) => {
                self.advance();
                Some(alias.clone())
            }
            _ => None,
        }
    }

    // path -> identifier ( "." identifier )*
    fn parse_qualified_name(&mut self) -> anyhow::Result<QualifiedTableName> {
        let mut segments: Vec<String> = vec![];
        let first = self.advance();
        let is_identifier = matches!(
            first.kind,
            TokenType::Identifier(_) | TokenType::QuotedIdentifier(_)
        );
        if !is_identifier || !Self::push_segments(first, &mut segments) {
            return Err(anyhow!(self.error(first, "Expected table name.")));
        }

        while self.match_token_type(TokenTypeVariant::Dot) {
            // `db..table` skips the default schema.
            if self.check_token_type(TokenTypeVariant::Dot) {
                continue;
            }
            let segment = self.advance();
            if !Self::push_segments(segment, &mut segments) {
                return Err(anyhow!(self.error(segment, "Expected table name segment.")));
            }
        }

        QualifiedTableName::from_segments(&segments)
            .map_err(|err| anyhow!(self.error(self.peek_prev(), &err.to_string())))
    }

    /// Appends the name segments carried by `token`. Any word, even a reserved one, can
    /// follow a dot.
    fn push_segments(token: &Token, segments: &mut Vec<String>) -> bool {
        match &token.kind {
            TokenType::Identifier(ident) => segments.push(ident.clone()),
            TokenType::QuotedIdentifier(ident) => {
                segments.extend(ident.split('.').map(|part| part.to_owned()));
            }
            TokenType::Eof => return false,
            _ if !token.lexeme.is_empty()
                && token
                    .lexeme
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$') =>
            {
                segments.push(token.lexeme.clone())
            }
            _ => return false,
        }
        true
    }

    // with -> "WITH" ["RECURSIVE"] cte ( "," cte )*
    // cte -> identifier [ "(" columns ")" ] "AS" [ ["NOT"] "MATERIALIZED" ] "(" query_expr ")"
    // Anything else after WITH (`WITH (NOLOCK)`, `WITH TIME ZONE`) is left to the caller.
    fn parse_with(&mut self, scan: &mut StatementScan, depth: usize) -> anyhow::Result<()> {
        self.match_non_reserved_keyword("recursive");
        loop {
            let start = self.curr;
            let name = match &self.peek().kind {
                TokenType::Identifier(name) | TokenType::QuotedIdentifier(name) => name.clone(),
                _ => return Ok(()),
            };
            self.advance();

            if self.match_token_type(TokenTypeVariant::LeftParen) {
                self.skip_group()?;
            }
            if !self.match_token_type(TokenTypeVariant::As) {
                self.curr = start;
                return Ok(());
            }
            self.match_non_reserved_keyword("not");
            self.match_non_reserved_keyword("materialized");
            if !self.match_token_type(TokenTypeVariant::LeftParen) {
                self.curr = start;
                return Ok(());
            }

            scan.ctes.insert(&name);
            self.parse_group(scan, depth, false)?;

            if !self.match_token_type(TokenTypeVariant::Comma) {
                return Ok(());
            }
        }
    }

    // insert -> "INSERT" ["OVERWRITE" | "IGNORE"] ["INTO"] ["TABLE"] path [alias]
    fn parse_insert_target(&mut self, scan: &mut StatementScan) -> anyhow::Result<()> {
        self.head_seen = true;
        let mut has_into = false;
        loop {
            if self.match_token_type(TokenTypeVariant::Into)
                || self.match_non_reserved_keyword("overwrite")
            {
                has_into = true;
            } else if !(self.match_non_reserved_keyword("ignore")
                || self.match_non_reserved_keyword("table"))
            {
                break;
            }
        }
        if !has_into {
            return Err(anyhow!(self.error(self.peek(), "Expected `INTO`.")));
        }

        let target = self.parse_qualified_name()?;
        if let Some(alias) = self.parse_alias() {
            scan.aliases.insert(&alias, target.clone());
        }
        scan.targets.insert(target);
        Ok(())
    }

    // update -> "UPDATE" ["ONLY"] path [alias] ( "SET" | join | "," )
    fn parse_update_target(&mut self, scan: &mut StatementScan) -> anyhow::Result<()> {
        self.head_seen = true;
        self.match_non_reserved_keyword("only");
        let target = self.parse_qualified_name()?;
        let alias = self.parse_alias();

        let continues_update = matches!(
            self.peek().kind.discriminant(),
            TokenTypeVariant::Set
                | TokenTypeVariant::Comma
                | TokenTypeVariant::Join
                | TokenTypeVariant::Inner
                | TokenTypeVariant::Left
                | TokenTypeVariant::Right
                | TokenTypeVariant::Full
                | TokenTypeVariant::Cross
                | TokenTypeVariant::Natural
        );
        if !continues_update {
            return Err(anyhow!(self.error(self.peek(), "Expected `SET`.")));
        }

        if let Some(alias) = alias {
            scan.aliases.insert(&alias, target.clone());
        }
        scan.targets.insert(target);
        Ok(())
    }

    // merge -> "MERGE" ["INTO"] path [alias] "USING" ...
    fn parse_merge_target(&mut self, scan: &mut StatementScan) -> anyhow::Result<()> {
        self.head_seen = true;
        self.match_token_type(TokenTypeVariant::Into);
        let target = self.parse_qualified_name()?;
        let alias = self.parse_alias();
        if !self.check_token_type(TokenTypeVariant::Using) {
            return Err(anyhow!(self.error(self.peek(), "Expected `USING`.")));
        }

        if let Some(alias) = alias {
            scan.aliases.insert(&alias, target.clone());
        }
        scan.targets.insert(target);
        Ok(())
    }

    // create -> "CREATE" ["OR" "REPLACE"] modifier* ("TABLE" | "VIEW") ["IF" "NOT" "EXISTS"] path
    fn parse_create_target(&mut self, scan: &mut StatementScan) -> anyhow::Result<()> {
        self.head_seen = true;
        if self.match_token_type(TokenTypeVariant::Or) {
            self.consume_non_reserved_keyword("replace")?;
        }

        loop {
            if self.match_non_reserved_keyword("table") || self.match_non_reserved_keyword("view")
            {
                break;
            }
            let is_modifier = match &self.peek().kind {
                TokenType::Identifier(word) => CREATE_MODIFIERS
                    .iter()
                    .any(|modifier| word.eq_ignore_ascii_case(modifier)),
                _ => false,
            };
            if !is_modifier {
                log::debug!(
                    "CREATE of `{}` is not a table, skipping its body",
                    self.peek().lexeme
                );
                while !self.is_at_end() {
                    self.advance();
                }
                return Ok(());
            }
            self.advance();
        }

        if self.match_non_reserved_keyword("if") {
            self.consume_non_reserved_keyword("not")?;
            self.consume_non_reserved_keyword("exists")?;
        }

        let target = self.parse_qualified_name()?;
        scan.targets.insert(target);
        Ok(())
    }
}

/// Runs the clause scanner over one cleaned statement.
pub fn scan_statement(
    sql: &str,
    kind: StatementKind,
    options: &ResolveOptions,
) -> anyhow::Result<StatementScan> {
    let mut scanner = Scanner::new(sql);
    scanner.scan()?;

    log::trace!("Tokens:");
    scanner
        .tokens()
        .iter()
        .for_each(|tok| log::trace!("{:?}", tok));

    let mut parser = Parser::new(scanner.tokens(), kind, options);
    parser.parse()
}

/// Resolves the tables read and written by one cleaned statement.
///
/// `Delete` and `Other` statements short-circuit to empty sets.
pub fn resolve(
    sql: &str,
    kind: StatementKind,
    options: &ResolveOptions,
) -> anyhow::Result<ResolvedTables> {
    if !kind.has_lineage() || kind == StatementKind::Delete {
        return Ok(ResolvedTables::default());
    }
    log::debug!(
        "Resolving {} {}",
        kind,
        sql.chars().take(60).collect::<String>()
    );

    let scan = scan_statement(sql, kind, options)?;
    Ok(scan.resolve(kind))
}
