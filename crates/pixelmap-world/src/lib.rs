//! World model and on-disk save readers.
//!
//! Covers the four save generations this renderer understands: Anvil
//! (`region/r.X.Z.mca`), Beta/McRegion (`.mcr`), Alpha (base-36 directories
//! of `c.X.Z.dat`) and Bedrock (a LevelDB `db/` directory), plus the shared
//! chunk/section/palette model they all decode into.

pub mod alpha;
pub mod anvil;
pub mod bedrock;
pub mod chunk;
pub mod fd;
pub mod leveldb;
pub mod light;
pub mod lonely;
pub mod palette;
pub mod region;
pub mod save;

use std::path::PathBuf;

use thiserror::Error;

pub use chunk::{BlockOrder, Chunk, Palette, PaletteKind, Section, Tile};
pub use fd::FdGate;
pub use save::SaveKind;

#[derive(Error, Debug)]
pub enum WorldError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Compress(#[from] pixelmap_codec::CompressError),
    #[error("nbt: {0}")]
    Nbt(#[from] pixelmap_nbt::NbtError),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("region header truncated")]
    TruncatedHeader,
    #[error("chunk offset outside of file")]
    ChunkBounds,
    #[error("chunk outside of its sectors")]
    SectorBounds,
    #[error("unsupported compression kind {0}")]
    UnsupportedCompression(u8),
    #[error("leveldb footer truncated")]
    TruncatedFooter,
    #[error("leveldb magic mismatch")]
    BadMagic,
    #[error("leveldb block outside of file")]
    BlockBounds,
    #[error("unsupported leveldb block compressor {0}")]
    UnsupportedBlockCompression(u8),
    #[error("log record type {0} out of sequence")]
    LogFragment(u8),
    #[error("log batch truncated")]
    TruncatedLog,
    #[error("unknown log record type {0}")]
    UnknownRecordType(u8),
    #[error("unknown log batch tag {0}")]
    UnknownBatchTag(u8),
    #[error("sub-chunk storage truncated")]
    TruncatedSubChunk,
    #[error("unknown sub-chunk version {0}")]
    UnknownSubChunkVersion(u8),
}
