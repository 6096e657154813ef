//! A parser library for Europa Universalis text files.
//!
//! This library provides a tokenizer and parser for the Clausewitz text
//! format, which is loosely based on braces `{}` and `key = value`
//! assignments, typically encoded in `WINDOWS_1252`.
//!
//! Parsing produces a [`Block`]: an ordered mapping in which repeated keys
//! and `add_`/`remove_` keys coalesce into [`Value::List`], unlabeled brace
//! contents become [`Value::Tuple`] and `{ }` becomes [`Value::Empty`].

pub mod de;
mod error;
mod parser;
mod token;
mod value;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use encoding_rs::WINDOWS_1252;
use encoding_rs_io::DecodeReaderBytesBuilder;

pub use de::{DeError, from_block, from_value};
pub use error::{Error, LexError, ParseError, Position};
pub use parser::{DEFAULT_MAX_DEPTH, Parser};
pub use token::{Spanned, Token, Tokenizer, tokenize};
pub use value::{ADD_PREFIX, Block, REMOVE_PREFIX, Value, is_accumulating_key};

/// Parses an in-memory buffer. Empty or comment-only input yields an empty block.
pub fn parse_str(src: &str) -> Result<Block, Error> {
    Parser::new(src).parse()
}

/// Reads a file, decoding Windows-1252 unless a byte order mark says otherwise.
pub fn read_to_string(path: &Path) -> Result<String, Error> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(
        DecodeReaderBytesBuilder::new()
            .encoding(Some(WINDOWS_1252))
            .build(file),
    );
    let mut contents = String::new();
    reader.read_to_string(&mut contents).map_err(io_err)?;
    Ok(contents)
}

/// Reads and parses a whole file.
pub fn read_file(path: &Path) -> Result<Block, Error> {
    log::debug!("parsing {}", path.display());
    let contents = read_to_string(path)?;
    parse_str(&contents)
}
