use crate::error::LexError;
use miette::{Report, SourceSpan};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword; keywords are matched positionally by the parser.
    Ident(String),
    Int(i64),
    Float(f64),
    /// String literal, already unquoted.
    Str(String),
    Punct(char),
    Eof,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "{}", name),
            TokenKind::Int(v) => write!(f, "{}", v),
            TokenKind::Float(v) => write!(f, "{}", v),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::Punct(c) => write!(f, "{}", c),
            TokenKind::Eof => write!(f, "EOF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
}

impl Token {
    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(n) if n == name)
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    position: usize,
    start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            tokens: vec![],
            position: 0,
            start: 0,
        }
    }

    pub fn lex(mut self) -> Result<Vec<Token>, Report> {
        while self.position < self.source.len() {
            self.start = self.position;
            let c = match self.source[self.position..].chars().next() {
                Some(c) => c,
                None => break,
            };
            self.position += c.len_utf8();

            let token = match c {
                ' ' | '\r' | '\t' | '\n' => continue,
                '/' => {
                    if self.match_char('/') {
                        while self.position < self.source.len() && !self.match_char('\n') {
                            if let Some(c) = self.peek() {
                                self.position += c.len_utf8();
                            }
                        }
                        continue;
                    } else if self.match_char('*') {
                        let mut nesting = 1;
                        while nesting > 0 && self.position < self.source.len() {
                            if let Some(c) = self.peek() {
                                self.position += c.len_utf8();
                                match c {
                                    '/' if self.match_char('*') => nesting += 1,
                                    '*' if self.match_char('/') => nesting -= 1,
                                    _ => {}
                                }
                            }
                        }
                        if nesting > 0 {
                            return Err(LexError::UnterminatedComment {
                                span: (self.start..self.position).into(),
                                src: self.source.to_string(),
                            }
                            .into());
                        }
                        continue;
                    } else {
                        self.create_token(TokenKind::Punct('/'))
                    }
                }
                '"' => {
                    let rest = &self.source[self.start..];
                    match rest[1..].find('"') {
                        Some(pos) => {
                            let end_offset = pos + 1;
                            self.position = self.start + end_offset + 1;
                            self.create_token(TokenKind::Str(rest[1..end_offset].to_string()))
                        }
                        None => {
                            return Err(LexError::UnterminatedString {
                                span: (self.start..self.source.len()).into(),
                                src: self.source.to_string(),
                            }
                            .into());
                        }
                    }
                }
                'a'..='z' | 'A'..='Z' | '_' => {
                    let rest = &self.source[self.start..];
                    let end_offset = rest
                        .find(|c: char| !c.is_alphanumeric() && c != '_')
                        .unwrap_or(rest.len());
                    self.position = self.start + end_offset;

                    let literal = &self.source[self.start..self.position];
                    self.create_token(TokenKind::Ident(literal.to_string()))
                }
                '0'..='9' => {
                    let rest = &self.source[self.start..];
                    let first_part = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
                    self.position = self.start + first_part;

                    // A '.' only continues the number if a digit follows, so
                    // `p.x` after an int token stays a field access.
                    let after = &self.source[self.position..];
                    let is_float = after.starts_with('.')
                        && after[1..].chars().next().is_some_and(|c| c.is_ascii_digit());

                    if is_float {
                        self.position += 1;
                        let rest_after_dot = &self.source[self.position..];
                        let second_part = rest_after_dot
                            .find(|c: char| !c.is_ascii_digit())
                            .unwrap_or(rest_after_dot.len());
                        self.position += second_part;

                        let literal = &self.source[self.start..self.position];
                        match literal.parse() {
                            Ok(value) => self.create_token(TokenKind::Float(value)),
                            Err(_) => {
                                return Err(LexError::UnexpectedCharacter {
                                    span: self.start.into(),
                                    src: self.source.to_string(),
                                    character: c,
                                }
                                .into());
                            }
                        }
                    } else {
                        let literal = &self.source[self.start..self.position];
                        match literal.parse() {
                            Ok(value) => self.create_token(TokenKind::Int(value)),
                            Err(_) => {
                                return Err(LexError::UnexpectedCharacter {
                                    span: self.start.into(),
                                    src: self.source.to_string(),
                                    character: c,
                                }
                                .into());
                            }
                        }
                    }
                }
                '(' | ')' | '{' | '}' | '[' | ']' | ',' | '.' | ';' | ':' | '=' | '+' | '-'
                | '*' | '%' | '<' | '>' | '!' | '&' | '|' => self.create_token(TokenKind::Punct(c)),
                _ => {
                    return Err(LexError::UnexpectedCharacter {
                        span: self.start.into(),
                        src: self.source.to_string(),
                        character: c,
                    }
                    .into());
                }
            };
            self.tokens.push(token);
        }

        let eof_offset = self.source.len().saturating_sub(1);
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            span: SourceSpan::from(eof_offset),
        });
        Ok(self.tokens)
    }

    fn create_token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            span: SourceSpan::new(self.start.into(), self.position - self.start),
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        let next = match self.peek() {
            None => return false,
            Some(c) => c,
        };

        if next == expected {
            self.position += next.len_utf8();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn punct_and_idents() {
        assert_eq!(
            kinds("var x: int;"),
            vec![
                TokenKind::Ident("var".into()),
                TokenKind::Ident("x".into()),
                TokenKind::Punct(':'),
                TokenKind::Ident("int".into()),
                TokenKind::Punct(';'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_followed_by_field_access_is_not_a_float() {
        assert_eq!(
            kinds("p.x"),
            vec![
                TokenKind::Ident("p".into()),
                TokenKind::Punct('.'),
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("1.5"),
            vec![TokenKind::Float(1.5), TokenKind::Eof]
        );
    }

    #[test]
    fn strings_are_unquoted() {
        assert_eq!(
            kinds("\"hello\""),
            vec![TokenKind::Str("hello".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // comment\n/* nested /* comment */ */ 2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn duration_suffix_lexes_as_int_then_ident() {
        assert_eq!(
            kinds("500ms"),
            vec![
                TokenKind::Int(500),
                TokenKind::Ident("ms".into()),
                TokenKind::Eof
            ]
        );
    }
}
