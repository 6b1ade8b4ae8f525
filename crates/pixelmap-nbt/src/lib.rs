//! Streaming NBT reader.
//!
//! Supports both byte orders in one walker: big-endian for Java saves
//! (Anvil/Alpha/Beta), little-endian for Bedrock. Instead of materialising a
//! tree, the reader drives a visitor with one callback per named tag (inside
//! a compound) and one per unnamed value (inside a list); returning `true`
//! from a callback drains the remainder of that subtree without visiting it.

pub mod error;
pub mod reader;
pub mod value;

pub use error::NbtError;
pub use reader::{parse, Visitor};
pub use value::{IntArray, LongArray, Tag, TagType, Value};

/// Byte order of an NBT stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}
