use anyhow::anyhow;

use crate::ast::{Token, TokenType};

pub struct Scanner {
    source_chars: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: u32,
    col: u32,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            source_chars: source.chars().collect(),
            tokens: vec![],
            start: 0,
            current: 0,
            line: 1,
            col: 0,
        }
    }

    pub fn tokens(&self) -> &Vec<Token> {
        &self.tokens
    }

    fn advance(&mut self) -> char {
        let c = self.source_chars[self.current];
        self.current += 1;
        self.col += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source_chars[self.current]
        }
    }

    fn peek_next_i(&self, i: usize) -> char {
        if self.current + i >= self.source_chars.len() {
            '\0'
        } else {
            self.source_chars[self.current + i]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() != expected {
            return false;
        };

        self.advance();
        true
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.tokens.push(Token {
            kind: token_type,
            lexeme: self.current_source_str(),
            line: self.line,
            col: self.col,
        });
    }

    fn current_source_str(&self) -> String {
        self.source_chars[self.start..self.current].iter().collect()
    }

    fn reset(&mut self) {
        self.tokens.clear();
        self.start = 0;
        self.current = 0;
        self.col = 1;
        self.line = 1;
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.col = 1;
    }

    pub fn scan(&mut self) -> anyhow::Result<()> {
        self.reset();
        while self.current < self.source_chars.len() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.tokens.push(Token {
            kind: TokenType::Eof,
            lexeme: String::from("eof"),
            line: self.line,
            col: self.col,
        });

        Ok(())
    }

    /// Consumes up to and including `delimiter`. A doubled delimiter is an escaped one.
    fn scan_delimited(&mut self, delimiter: char, what: &str) -> anyhow::Result<String> {
        let mut content = String::new();
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error_str(&format!("Found unterminated {}", what))));
            }
            let c = self.advance();
            if c == '\n' {
                self.new_line();
            }
            if c == '\\' && delimiter != '`' && !self.is_at_end() {
                content.push(c);
                content.push(self.advance());
                continue;
            }
            if c == delimiter {
                if self.peek() == delimiter {
                    content.push(self.advance());
                    continue;
                }
                break;
            }
            content.push(c);
        }
        Ok(content)
    }

    fn match_number(&mut self) {
        loop {
            let peek_char = self.peek();
            if peek_char.is_ascii_digit() || peek_char == '.' || peek_char == '_' {
                self.advance();
            } else if (peek_char == 'e' || peek_char == 'E')
                && (self.peek_next_i(1).is_ascii_digit()
                    || (matches!(self.peek_next_i(1), '+' | '-')
                        && self.peek_next_i(2).is_ascii_digit()))
            {
                self.advance();
                self.advance();
            } else {
                break;
            }
        }
        self.add_token(TokenType::Number(self.current_source_str()));
    }

    fn match_keyword_or_identifier(&mut self) {
        loop {
            let peek_char = self.peek();
            if !(peek_char.is_alphanumeric() || peek_char == '_' || peek_char == '$') {
                break;
            }
            self.advance();
        }
        let identifier = self.current_source_str();

        match identifier.to_lowercase().as_str() {
            "alter" => self.add_token(TokenType::Alter),
            "as" => self.add_token(TokenType::As),
            "create" => self.add_token(TokenType::Create),
            "cross" => self.add_token(TokenType::Cross),
            "delete" => self.add_token(TokenType::Delete),
            "except" => self.add_token(TokenType::Except),
            "from" => self.add_token(TokenType::From),
            "full" => self.add_token(TokenType::Full),
            "group" => self.add_token(TokenType::Group),
            "having" => self.add_token(TokenType::Having),
            "inner" => self.add_token(TokenType::Inner),
            "insert" => self.add_token(TokenType::Insert),
            "intersect" => self.add_token(TokenType::Intersect),
            "into" => self.add_token(TokenType::Into),
            "join" => self.add_token(TokenType::Join),
            "lateral" => self.add_token(TokenType::Lateral),
            "left" => self.add_token(TokenType::Left),
            "limit" => self.add_token(TokenType::Limit),
            "merge" => self.add_token(TokenType::Merge),
            "natural" => self.add_token(TokenType::Natural),
            "on" => self.add_token(TokenType::On),
            "or" => self.add_token(TokenType::Or),
            "order" => self.add_token(TokenType::Order),
            "outer" => self.add_token(TokenType::Outer),
            "qualify" => self.add_token(TokenType::Qualify),
            "right" => self.add_token(TokenType::Right),
            "select" => self.add_token(TokenType::Select),
            "set" => self.add_token(TokenType::Set),
            "truncate" => self.add_token(TokenType::Truncate),
            "union" => self.add_token(TokenType::Union),
            "update" => self.add_token(TokenType::Update),
            "using" => self.add_token(TokenType::Using),
            "where" => self.add_token(TokenType::Where),
            "window" => self.add_token(TokenType::Window),
            "with" => self.add_token(TokenType::With),
            _ => self.add_token(TokenType::Identifier(identifier)),
        }
    }

    fn scan_token(&mut self) -> anyhow::Result<()> {
        let curr_char = self.advance();
        match curr_char {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            ',' => self.add_token(TokenType::Comma),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.match_number();
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '/' => {
                if self.match_char('*') {
                    loop {
                        if self.is_at_end() {
                            return Err(anyhow!(self.error_str("Found unterminated comment")));
                        }
                        if self.peek() == '*' && self.peek_next_i(1) == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        if self.advance() == '\n' {
                            self.new_line();
                        }
                    }
                } else {
                    self.add_token(TokenType::Operator(String::from("/")))
                }
            }
            '#' => {
                // T-SQL temp tables (`#tmp`, `##global`), otherwise a MySQL line comment.
                if self.peek().is_alphanumeric() || matches!(self.peek(), '_' | '#') {
                    self.match_temp_table_identifier();
                } else {
                    self.skip_line_comment();
                }
            }
            '-' => {
                if self.match_char('-') {
                    self.skip_line_comment();
                } else {
                    self.add_token(TokenType::Operator(String::from("-")))
                }
            }
            '\n' => {
                self.new_line();
            }
            '\r' | ' ' | '\t' => {}

            '\'' => {
                let content = self.scan_delimited('\'', "string")?;
                self.add_token(TokenType::String(content));
            }
            '"' => {
                let content = self.scan_delimited('"', "quoted identifier")?;
                self.add_token(TokenType::QuotedIdentifier(content));
            }
            '`' => {
                let content = self.scan_delimited('`', "quoted identifier")?;
                if content.is_empty() {
                    return Err(anyhow!(self.error_str("Found empty quoted identifier.")));
                }
                self.add_token(TokenType::QuotedIdentifier(content));
            }
            '[' => {
                // T-SQL bracketed identifier, otherwise an array subscript.
                if self.peek().is_alphabetic() || self.peek() == '_' {
                    let content = self.scan_delimited(']', "bracketed identifier")?;
                    self.add_token(TokenType::QuotedIdentifier(content));
                } else {
                    self.add_token(TokenType::Operator(String::from("[")));
                }
            }

            c if c.is_ascii_digit() => self.match_number(),

            c if c.is_alphabetic() || c == '_' => self.match_keyword_or_identifier(),

            c if c.is_whitespace() => {}

            c if c.is_ascii_punctuation() || !c.is_control() => {
                self.add_token(TokenType::Operator(c.to_string()));
            }

            _ => {
                return Err(anyhow!(self.error_str(&format!(
                    "Found unexpected character while scanning: {:?}",
                    curr_char
                ))));
            }
        }
        Ok(())
    }

    fn match_temp_table_identifier(&mut self) {
        while self.peek().is_alphanumeric() || matches!(self.peek(), '_' | '$' | '#') {
            self.advance();
        }
        self.add_token(TokenType::Identifier(self.current_source_str()));
    }

    fn skip_line_comment(&mut self) {
        loop {
            let peek_char = self.peek();
            if peek_char == '\n' || peek_char == '\0' {
                break;
            }
            self.advance();
        }
    }

    fn error_str(&self, error: &str) -> String {
        format!(
            "[line: {}, col: {}] Scanner error: {}",
            self.line, self.col, error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenType> {
        let mut scanner = Scanner::new(sql);
        scanner.scan().unwrap();
        scanner.tokens().iter().map(|tok| tok.kind.clone()).collect()
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("select From JOIN"),
            vec![
                TokenType::Select,
                TokenType::From,
                TokenType::Join,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_quoted_identifiers_and_comments() {
        assert_eq!(
            kinds("`p.d.t` \"My Table\" [dbo] -- trailing\n/* block */ x"),
            vec![
                TokenType::QuotedIdentifier("p.d.t".to_owned()),
                TokenType::QuotedIdentifier("My Table".to_owned()),
                TokenType::QuotedIdentifier("dbo".to_owned()),
                TokenType::Identifier("x".to_owned()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_hash_starts_temp_table_or_comment() {
        assert_eq!(
            kinds("#tmp ##global # note\nx"),
            vec![
                TokenType::Identifier("#tmp".to_owned()),
                TokenType::Identifier("##global".to_owned()),
                TokenType::Identifier("x".to_owned()),
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_escaped_quote_in_string() {
        assert_eq!(
            kinds("'it''s'"),
            vec![TokenType::String("it's".to_owned()), TokenType::Eof]
        );
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let mut scanner = Scanner::new("select 'oops from t");
        assert!(scanner.scan().is_err());
    }
}
