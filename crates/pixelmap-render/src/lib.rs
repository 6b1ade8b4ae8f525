//! Rasterisation: block-pass chains over chunk columns, region and world
//! assembly, block colors and the streaming PNG writer.

pub mod block_color;
pub mod chunk;
pub mod color;
pub mod image;
pub mod pass;
pub mod ray;
pub mod region;
pub mod world;

use std::path::PathBuf;

use thiserror::Error;

pub use block_color::BlockColor;
pub use chunk::{fill_palette, render_chunk, ChunkScratch};
pub use color::{BlendMode, Rgba};
pub use pass::{build_chain, BlockPass, ColorMode, PassOptions};
pub use region::{render_region, RegionScratch};
pub use world::render_world;

/// Pixels per chunk edge.
pub const CHUNK_WIDTH: usize = 16;
/// Chunks per region edge.
pub const REGION_CHUNKS: usize = 32;
/// Pixels per region edge.
pub const REGION_WIDTH: usize = CHUNK_WIDTH * REGION_CHUNKS;

/// Output granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// One PNG per chunk under `r.<rx>.<rz>/` directories.
    Chunk,
    /// One 512x512 PNG per region.
    Region,
    /// A single PNG over the world bounding box.
    Image,
    /// As `Image`, but assembled straight from chunk scratches.
    ImageDirect,
    /// One pixel per chunk.
    ChunkTiny,
    /// One pixel per region.
    RegionTiny,
}

impl RenderMode {
    /// Whether the final image is a single file (as opposed to a tree of
    /// per-chunk/per-region files).
    pub fn single_file(self) -> bool {
        !matches!(self, RenderMode::Chunk | RenderMode::Region)
    }
}

/// Everything the render stages need besides the chunk itself.
pub struct RenderSettings {
    pub mode: RenderMode,
    pub output: PathBuf,
    pub colors: BlockColor,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("png: {0}")]
    Png(#[from] png::EncodingError),
    #[error("image dimensions are empty")]
    EmptyImage,
}
