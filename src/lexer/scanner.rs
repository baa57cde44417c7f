//! Scanner for Siftlang source code.

use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The scanner transforms source text into a stream of tokens.
///
/// Scanning never fails: unterminated strings, unterminated regexes and
/// unknown characters become [`TokenKind::Illegal`] tokens which the
/// parser reports as syntax errors.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    start_pos: usize,
    start_line: usize,
    start_column: usize,
    /// Kind of the previous token, used to decide whether a `/` starts a
    /// regex literal or is division.
    prev_kind: Option<TokenKind>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
            prev_kind: None,
        }
    }

    /// Scan all tokens from the source, ending with an EOF token.
    pub fn scan_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.scan_token();
            let is_eof = token.kind == TokenKind::Eof;
            self.prev_kind = Some(token.kind.clone());
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        tokens
    }

    /// Scan the next token.
    fn scan_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            return Token::eof(self.current_pos, self.line, self.column);
        };

        match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            ',' => self.make_token(TokenKind::Comma),
            ';' => self.make_token(TokenKind::Semicolon),
            '+' => self.make_token(TokenKind::Plus),
            '-' => self.make_token(TokenKind::Minus),
            '%' => self.make_token(TokenKind::Percent),
            '√' => self.make_token(TokenKind::Root),

            '*' => {
                if self.match_char('*') {
                    self.make_token(TokenKind::Power)
                } else {
                    self.make_token(TokenKind::Star)
                }
            }
            '/' => {
                if self.regex_allowed() {
                    self.scan_regex()
                } else {
                    self.make_token(TokenKind::Slash)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.make_token(TokenKind::Assign)
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual)
                } else if self.match_char('~') {
                    self.make_token(TokenKind::NotMatch)
                } else {
                    self.make_token(TokenKind::Bang)
                }
            }
            '~' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::Match)
                } else {
                    self.make_token(TokenKind::Illegal("~".to_string()))
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.make_token(TokenKind::And)
                } else {
                    self.make_token(TokenKind::Illegal("&".to_string()))
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.make_token(TokenKind::Or)
                } else {
                    self.make_token(TokenKind::Illegal("|".to_string()))
                }
            }

            '"' => self.scan_string(),

            c if c.is_ascii_digit() => self.scan_number(c),

            c if c.is_alphabetic() || c == '_' || c == '$' => self.scan_identifier(c),

            _ => self.make_token(TokenKind::Illegal(c.to_string())),
        }
    }

    /// A `/` starts a regex literal anywhere an operand may start.
    fn regex_allowed(&self) -> bool {
        match &self.prev_kind {
            Some(kind) => !kind.ends_operand(),
            None => true,
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self) -> Token {
        let mut value = String::new();

        loop {
            match self.peek() {
                None | Some('\n') => {
                    // Unterminated: hand back what we saw.
                    return self.make_token(TokenKind::Illegal(format!("\"{}", value)));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => {
                            self.advance();
                            value.push('\n');
                        }
                        Some('t') => {
                            self.advance();
                            value.push('\t');
                        }
                        Some('r') => {
                            self.advance();
                            value.push('\r');
                        }
                        Some('\\') => {
                            self.advance();
                            value.push('\\');
                        }
                        Some('"') => {
                            self.advance();
                            value.push('"');
                        }
                        Some(c) => {
                            self.advance();
                            value.push(c);
                        }
                        None => {
                            return self.make_token(TokenKind::Illegal(format!("\"{}", value)));
                        }
                    }
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        self.make_token(TokenKind::StringLiteral(value))
    }

    /// Scan a `/pattern/flags` regex literal.
    ///
    /// Escapes are kept verbatim for the regex engine, except `\/` which
    /// unescapes to a plain slash. Flags fold in as an inline group so the
    /// stored pattern is self-contained.
    fn scan_regex(&mut self) -> Token {
        let mut pattern = String::new();

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return self.make_token(TokenKind::Illegal(format!("/{}", pattern)));
                }
                Some('/') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('/') => {
                            self.advance();
                            pattern.push('/');
                        }
                        Some(c) => {
                            self.advance();
                            pattern.push('\\');
                            pattern.push(c);
                        }
                        None => {
                            return self
                                .make_token(TokenKind::Illegal(format!("/{}\\", pattern)));
                        }
                    }
                }
                Some(c) => {
                    self.advance();
                    pattern.push(c);
                }
            }
        }

        let mut flags = String::new();
        while let Some(c) = self.peek() {
            if c == 'i' || c == 'm' || c == 's' {
                flags.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let text = if flags.is_empty() {
            pattern
        } else {
            format!("(?{}){}", flags, pattern)
        };

        self.make_token(TokenKind::RegexLiteral(text))
    }

    fn scan_number(&mut self, first: char) -> Token {
        let mut value = String::from(first);
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                value.push(c);
                self.advance();
            } else if c == '.' && !is_float && matches!(self.peek_next(), Some(n) if n.is_ascii_digit())
            {
                is_float = true;
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            match value.parse::<f64>() {
                Ok(n) => self.make_token(TokenKind::FloatLiteral(n)),
                Err(_) => self.make_token(TokenKind::Illegal(value)),
            }
        } else {
            match value.parse::<i64>() {
                Ok(n) => self.make_token(TokenKind::IntLiteral(n)),
                Err(_) => self.make_token(TokenKind::Illegal(value)),
            }
        }
    }

    /// Identifiers may start with `$` (stripped at lookup time) and may
    /// contain `.` after the first character, for field paths.
    fn scan_identifier(&mut self, first: char) -> Token {
        let mut value = String::from(first);

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = TokenKind::keyword(&value).unwrap_or(TokenKind::Identifier(value));
        self.make_token(kind)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            self.column += 1;
            Some((pos, c))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.current_pos..].chars();
        iter.next();
        iter.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            scan("(){}[];,"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Semicolon,
                TokenKind::Comma,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            scan("42 3.14"),
            vec![
                TokenKind::IntLiteral(42),
                TokenKind::FloatLiteral(3.14),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            scan(r#""he\tsaid \"hi\"""#),
            vec![
                TokenKind::StringLiteral("he\tsaid \"hi\"".to_string()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_illegal() {
        let kinds = scan("\"oops");
        assert!(matches!(kinds[0], TokenKind::Illegal(_)));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            scan("if else return true false"),
            vec![
                TokenKind::If,
                TokenKind::Else,
                TokenKind::Return,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            scan("+ - * ** % == != <= >= ~= !~ && || !"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Power,
                TokenKind::Percent,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Match,
                TokenKind::NotMatch,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_dollar_and_dotted_identifiers() {
        assert_eq!(
            scan("$Author Request.Path"),
            vec![
                TokenKind::Identifier("$Author".to_string()),
                TokenKind::Identifier("Request.Path".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            scan("1 // comment\n2"),
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::IntLiteral(2),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_regex_literal_with_flags() {
        assert_eq!(
            scan("Message ~= /panic/i"),
            vec![
                TokenKind::Identifier("Message".to_string()),
                TokenKind::Match,
                TokenKind::RegexLiteral("(?i)panic".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_regex_escaped_slash() {
        assert_eq!(
            scan(r"x ~= /a\/b\d/"),
            vec![
                TokenKind::Identifier("x".to_string()),
                TokenKind::Match,
                TokenKind::RegexLiteral(r"a/b\d".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_slash_after_operand_is_division() {
        assert_eq!(
            scan("6 / 2"),
            vec![
                TokenKind::IntLiteral(6),
                TokenKind::Slash,
                TokenKind::IntLiteral(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_square_root() {
        assert_eq!(
            scan("√9"),
            vec![TokenKind::Root, TokenKind::IntLiteral(9), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unknown_character_is_illegal() {
        assert_eq!(
            scan("@"),
            vec![TokenKind::Illegal("@".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Scanner::new("1\n2\n3").scan_tokens();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[2].span.line, 3);
    }
}
