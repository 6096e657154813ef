//! Tokenizer for the EU4 text format.
//!
//! The format only has four kinds of lexemes: `{`, `}`, `=` and items. Items
//! are either quoted strings or maximal runs of anything that is not
//! whitespace, a brace, `=` or `#`. Comments run from `#` to the end of the
//! line. Whitespace, including line breaks, carries no meaning.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{LexError, Position};

/// A lexeme scanned from EU4 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `=`
    Equals,
    /// An identifier, number or quoted string, verbatim. Quotes are stripped.
    Item(String),
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::LeftBrace => "'{'".to_string(),
            Token::RightBrace => "'}'".to_string(),
            Token::Equals => "'='".to_string(),
            Token::Item(s) => format!("item '{}'", s),
        }
    }
}

/// A token together with the position of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub position: Position,
}

/// Lazy, single-pass token stream over a string slice.
///
/// Yields `Err` once on the first unrecognized input and then stops.
pub struct Tokenizer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        let src = src.strip_prefix('\u{feff}').unwrap_or(src);
        Self {
            src,
            chars: src.char_indices().peekable(),
            line: 1,
            column: 1,
            failed: false,
        }
    }

    fn position(&mut self) -> Position {
        let offset = self
            .chars
            .peek()
            .map(|&(i, _)| i)
            .unwrap_or(self.src.len());
        Position {
            line: self.line,
            column: self.column,
            offset,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_comment(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// A quote with no closing partner is not a string opener: the item is
    /// then a bare run starting at the quote, as in `'s-Hertogenbosch`.
    fn quoted(&mut self, quote: char, start: Position) -> Result<Token, LexError> {
        let body_start = start.offset + quote.len_utf8();
        let Some(len) = self.src[body_start..].find(quote) else {
            return self.bare(start);
        };
        let end = body_start + len;
        while let Some(&(i, _)) = self.chars.peek() {
            if i > end {
                break;
            }
            self.bump();
        }
        Ok(Token::Item(self.src[body_start..end].to_string()))
    }

    fn bare(&mut self, start: Position) -> Result<Token, LexError> {
        let mut end = start.offset;
        while let Some(&(i, c)) = self.chars.peek() {
            if is_delimiter(c) {
                break;
            }
            if c.is_control() {
                let position = self.position();
                return Err(LexError::UnexpectedChar { found: c, position });
            }
            end = i + c.len_utf8();
            self.bump();
        }
        Ok(Token::Item(self.src[start.offset..end].to_string()))
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '=' | '#')
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Spanned, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let &(_, c) = self.chars.peek()?;
            let position = self.position();
            let token = match c {
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '#' => {
                    self.skip_comment();
                    continue;
                }
                '{' => {
                    self.bump();
                    Ok(Token::LeftBrace)
                }
                '}' => {
                    self.bump();
                    Ok(Token::RightBrace)
                }
                '=' => {
                    self.bump();
                    Ok(Token::Equals)
                }
                '"' | '\'' => self.quoted(c, position),
                c if c.is_control() => Err(LexError::UnexpectedChar { found: c, position }),
                _ => self.bare(position),
            };
            return Some(match token {
                Ok(token) => Ok(Spanned { token, position }),
                Err(e) => {
                    self.failed = true;
                    Err(e)
                }
            });
        }
    }
}

/// Tokenizes a whole buffer eagerly. Mostly useful for tests and tooling.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Tokenizer::new(src)
        .map(|r| r.map(|spanned| spanned.token))
        .collect()
}
