//! Parser turning a token stream into a [`Block`].
//!
//! Grammar, with the ambiguities resolved in this order:
//!
//! ```text
//! result   := keyvalue*
//! keyvalue := ITEM '=' value
//! value    := ITEM
//!           | '{' '}'             -> Value::Empty
//!           | '{' keyvalue+ '}'   -> Value::Block
//!           | '{' value+ '}'      -> Value::Tuple (even for a single value)
//! ```
//!
//! The parser keeps an explicit stack of open blocks instead of recursing.
//! Nesting is capped at [`DEFAULT_MAX_DEPTH`] braces unless configured
//! otherwise: dropping, cloning, comparing and printing a [`Value`] all walk
//! the tree recursively, so deeper input is rejected with
//! [`ParseError::TooDeep`].

use std::iter::Peekable;

use crate::error::{Error, ParseError, Position};
use crate::token::{Spanned, Token, Tokenizer};
use crate::value::{Block, Value};

/// Brace nesting accepted by [`Parser::new`]. Game files stay far below it.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// How a finished brace block attaches to its parent.
enum Slot {
    Root,
    Keyed(String),
    Bare,
}

enum Body {
    Empty,
    Pairs(Vec<(String, Value)>),
    Values(Vec<Value>),
}

struct Frame {
    slot: Slot,
    opened: Position,
    body: Body,
}

impl Frame {
    fn push_pair(&mut self, key: String, value: Value, at: Position) -> Result<(), ParseError> {
        match &mut self.body {
            Body::Empty => self.body = Body::Pairs(vec![(key, value)]),
            Body::Pairs(pairs) => pairs.push((key, value)),
            Body::Values(_) => {
                return Err(ParseError::MixedBlock {
                    found: Token::Item(key).describe(),
                    position: at,
                });
            }
        }
        Ok(())
    }

    fn push_value(&mut self, value: Value, at: Position) -> Result<(), ParseError> {
        match &mut self.body {
            Body::Empty => self.body = Body::Values(vec![value]),
            Body::Values(values) => values.push(value),
            Body::Pairs(_) => {
                return Err(ParseError::MixedBlock {
                    found: offending(&value),
                    position: at,
                });
            }
        }
        Ok(())
    }
}

/// The token that introduced `value`, for error messages.
fn offending(value: &Value) -> String {
    match value {
        Value::Scalar(s) => Token::Item(s.clone()).describe(),
        _ => Token::LeftBrace.describe(),
    }
}

fn finish(body: Body) -> Value {
    match body {
        Body::Empty => Value::Empty,
        Body::Pairs(pairs) => Value::Block(Block::from_pairs(pairs)),
        Body::Values(values) => Value::Tuple(values),
    }
}

/// Stack-based parser over a lazy token stream.
pub struct Parser<'a> {
    tokens: Peekable<Tokenizer<'a>>,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            tokens: Tokenizer::new(src).peekable(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Sets how many braces may be open at once.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Pushes a frame for a `{` at `position`, enforcing the depth limit.
    fn open(&self, stack: &mut Vec<Frame>, slot: Slot, position: Position) -> Result<(), Error> {
        // the root frame is not a brace
        if stack.len() > self.max_depth {
            return Err(ParseError::TooDeep {
                limit: self.max_depth,
                position,
            }
            .into());
        }
        stack.push(Frame {
            slot,
            opened: position,
            body: Body::Empty,
        });
        Ok(())
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, Error> {
        self.tokens.next().transpose().map_err(Error::from)
    }

    /// Consumes a following `=` if there is one.
    fn eat_equals(&mut self) -> Result<bool, Error> {
        match self.tokens.peek() {
            Some(Ok(Spanned {
                token: Token::Equals,
                ..
            })) => {
                self.tokens.next();
                Ok(true)
            }
            Some(Err(_)) => match self.tokens.next() {
                Some(Err(e)) => Err(e.into()),
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }

    /// Parses the whole input into one top-level block.
    pub fn parse(mut self) -> Result<Block, Error> {
        let mut stack = vec![Frame {
            slot: Slot::Root,
            opened: Position::start(),
            body: Body::Empty,
        }];

        loop {
            let depth = stack.len();
            let Some(Spanned { token, position }) = self.next_token()? else {
                let Some(frame) = stack.pop() else {
                    return Ok(Block::new());
                };
                if depth > 1 {
                    return Err(ParseError::UnterminatedBlock {
                        opened: frame.opened,
                    }
                    .into());
                }
                return Ok(match frame.body {
                    Body::Pairs(pairs) => Block::from_pairs(pairs),
                    _ => Block::new(),
                });
            };

            match token {
                Token::Item(item) => {
                    if self.eat_equals()? {
                        self.assignment(&mut stack, item, position)?;
                    } else if depth == 1 {
                        return Err(ParseError::UnexpectedToken {
                            found: format!("item '{}'", item),
                            expected: "'=' after a top-level key",
                            position,
                        }
                        .into());
                    } else if let Some(top) = stack.last_mut() {
                        top.push_value(Value::Scalar(item), position)?;
                    }
                }
                Token::LeftBrace if depth > 1 => {
                    if let Some(top) = stack.last() {
                        if let Body::Pairs(_) = top.body {
                            return Err(ParseError::MixedBlock {
                                found: Token::LeftBrace.describe(),
                                position,
                            }
                            .into());
                        }
                    }
                    self.open(&mut stack, Slot::Bare, position)?;
                }
                Token::RightBrace if depth > 1 => {
                    if let Some(Frame { slot, opened, body }) = stack.pop() {
                        let value = finish(body);
                        if let Some(parent) = stack.last_mut() {
                            match slot {
                                Slot::Keyed(key) => parent.push_pair(key, value, opened)?,
                                Slot::Bare => parent.push_value(value, opened)?,
                                Slot::Root => {}
                            }
                        }
                    }
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        found: other.describe(),
                        expected: if depth > 1 {
                            "a key, a value or '}'"
                        } else {
                            "a key"
                        },
                        position,
                    }
                    .into());
                }
            }
        }
    }

    /// Handles the right-hand side of `key =`.
    fn assignment(&mut self, stack: &mut Vec<Frame>, key: String, at: Position) -> Result<(), Error> {
        match self.next_token()? {
            Some(Spanned {
                token: Token::Item(item),
                ..
            }) => {
                if let Some(top) = stack.last_mut() {
                    top.push_pair(key, Value::Scalar(item), at)?;
                }
                Ok(())
            }
            Some(Spanned {
                token: Token::LeftBrace,
                position,
            }) => {
                if let Some(top) = stack.last() {
                    if let Body::Values(_) = top.body {
                        return Err(ParseError::MixedBlock {
                            found: Token::Item(key).describe(),
                            position: at,
                        }
                        .into());
                    }
                }
                self.open(stack, Slot::Keyed(key), position)
            }
            Some(Spanned {
                token: Token::RightBrace,
                position,
            }) => Err(ParseError::MissingValue { key, position }.into()),
            Some(Spanned {
                token: Token::Equals,
                position,
            }) => Err(ParseError::UnexpectedToken {
                found: Token::Equals.describe(),
                expected: "a value",
                position,
            }
            .into()),
            None => Err(ParseError::MissingValue { key, position: at }.into()),
        }
    }
}
