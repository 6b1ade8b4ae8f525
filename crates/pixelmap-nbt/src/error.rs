//! Error type for the streaming reader.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NbtError {
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("root tag is not a compound (got type {got})")]
    ExpectedCompound { got: u8 },
    #[error("unknown tag type {0}")]
    UnknownTagType(u8),
    #[error("negative length {0}")]
    NegativeLength(i32),
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,
    #[error("nesting deeper than {limit}")]
    NestingTooDeep { limit: usize },
}
