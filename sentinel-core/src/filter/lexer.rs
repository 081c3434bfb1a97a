//! Hand-written lexer for the filter expression language (§6).

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Match,
    NotMatch,
    And,
    Or,
    Not,
    In,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub byte_pos: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub byte_pos: usize,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, ch)) = next {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn error(&self, message: impl Into<String>, byte_pos: usize) -> LexError {
        LexError {
            message: message.into(),
            byte_pos,
            line: self.line,
            column: self.column,
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }

        let (start, ch) = match self.advance() {
            Some(pair) => pair,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    byte_pos: self.source.len(),
                    line: self.line,
                    column: self.column,
                })
            }
        };
        let (line, column) = (self.line, self.column.saturating_sub(1));

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '=' => {
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Eq
                } else if self.peek_char() == Some('~') {
                    self.advance();
                    TokenKind::Match
                } else {
                    return Err(self.error("expected '==' or '=~'", start));
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Ne
                } else if self.peek_char() == Some('~') {
                    self.advance();
                    TokenKind::NotMatch
                } else {
                    return Err(self.error("expected '!=' or '!~'", start));
                }
            }
            '<' => {
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '"' | '\'' => TokenKind::Str(self.scan_string(ch, start)?),
            '0'..='9' => TokenKind::Int(self.scan_number(start, ch)?),
            c if c == '_' || c.is_ascii_alphabetic() => {
                let ident = self.scan_ident(c);
                match ident.to_ascii_uppercase().as_str() {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    "NOT" => TokenKind::Not,
                    "IN" => TokenKind::In,
                    _ => TokenKind::Ident(ident),
                }
            }
            other => {
                return Err(self.error(format!("unexpected character '{other}'"), start));
            }
        };

        Ok(Token {
            kind,
            byte_pos: start,
            line,
            column,
        })
    }

    fn scan_ident(&mut self, first: char) -> String {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        s
    }

    fn scan_number(&mut self, start: usize, first: char) -> Result<i64, LexError> {
        let mut s = String::new();
        s.push(first);

        if first == '0' && self.peek_char() == Some('x') {
            s.push('x');
            self.advance();
            while let Some(c) = self.peek_char() {
                if c.is_ascii_hexdigit() {
                    s.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            return i64::from_str_radix(s.trim_start_matches("0x"), 16)
                .map_err(|e| self.error(format!("invalid hex literal: {e}"), start));
        }

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        s.parse::<i64>()
            .map_err(|e| self.error(format!("invalid integer literal: {e}"), start))
    }

    fn scan_string(&mut self, quote: char, start: usize) -> Result<String, LexError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated string literal", start)),
                Some((_, c)) if c == quote => break,
                Some((_, '\\')) => match self.advance() {
                    Some((_, '"')) => s.push('"'),
                    Some((_, '\'')) => s.push('\''),
                    Some((_, '\\')) => s.push('\\'),
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 'r')) => s.push('\r'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, other)) => {
                        return Err(self.error(format!("invalid escape '\\{other}'"), start))
                    }
                    None => return Err(self.error("unterminated escape sequence", start)),
                },
                Some((_, c)) => s.push(c),
            }
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_comparison() {
        assert_eq!(
            kinds("link.flags.up == 1"),
            vec![
                TokenKind::Ident("link.flags.up".into()),
                TokenKind::Eq,
                TokenKind::Int(1),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("a and B or NOT c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::And,
                TokenKind::Ident("B".into()),
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hex_literal() {
        assert_eq!(kinds("0x1F"), vec![TokenKind::Int(31), TokenKind::Eof]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\nb\"c""#),
            vec![TokenKind::Str("a\nb\"c".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn list_literal_tokens() {
        assert_eq!(
            kinds("[1, 2, 3]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::Comma,
                TokenKind::Int(3),
                TokenKind::RBracket,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
    }
}
