//! Per-save orchestration shared state and the chunk pipeline every format
//! funnels through: decompress, pre-scan, parse, palette fill, pass chain.

pub mod alpha;
pub mod bedrock;
pub mod java;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pixelmap_nbt::Endian;
use pixelmap_render::{render_chunk, BlockPass, ChunkScratch, RenderSettings};
use pixelmap_world::alpha::ColumnVisitor;
use pixelmap_world::anvil::{visitor_for, VersionScan};
use pixelmap_world::light::LightSource;
use pixelmap_world::region::{ChunkBlob, CompressionKind};
use pixelmap_world::{Chunk, FdGate};

use crate::pool::{TaskHandle, ThreadPool};
use crate::progress::{DelayedAccumulator, EventHandler};
use crate::stats::{ErrorClass, RunStats};

/// Parser family a Java-side chunk payload goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JavaFormat {
    /// Anvil: pre-scan for the data version, then the matching generation.
    Anvil,
    /// The unpaletted 128-tall column of Alpha and Beta saves.
    Column,
}

/// Worker-facing progress sink: totals go straight through, per-item
/// increments coalesce through the delayed accumulators.
pub struct ProgressTap {
    pub total_chunks: Arc<EventHandler<u64>>,
    pub total_render: Arc<EventHandler<u64>>,
    pub finished_chunks: DelayedAccumulator,
    pub finished_render: DelayedAccumulator,
}

impl ProgressTap {
    pub fn total_chunks(&self, n: u64) {
        self.total_chunks.call(n);
    }

    pub fn total_render(&self, n: u64) {
        self.total_render.call(n);
    }

    pub fn finished_chunk(&self, n: u64) {
        self.finished_chunks.add(n);
    }

    pub fn finished_render(&self, n: u64) {
        self.finished_render.add(n);
    }

    pub fn flush(&self) {
        self.finished_chunks.flush();
        self.finished_render.flush();
    }
}

/// Everything one render run shares across its tasks.
pub struct RunContext {
    pub run: Arc<AtomicBool>,
    pub pool: ThreadPool,
    pub settings: Arc<RenderSettings>,
    pub chain: Arc<Vec<BlockPass>>,
    pub progress: Arc<ProgressTap>,
    pub stats: Arc<RunStats>,
    pub gate: FdGate,
    pub lights: Arc<LightSource>,
    pub use_lonely: bool,
    pub night: bool,
}

impl RunContext {
    /// The cooperative run flag, consulted at every stage boundary.
    pub fn running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }
}

/// Inflate a chunk blob. Unknown and custom kinds count as type errors,
/// failed streams as compression errors.
pub fn decompress(blob: &ChunkBlob, stats: &RunStats) -> Option<Vec<u8>> {
    use pixelmap_codec::compress;

    let result = match blob.kind {
        CompressionKind::Zlib => compress::inflate_zlib(&blob.data),
        CompressionKind::Gzip => compress::inflate_gzip(&blob.data),
        CompressionKind::Lz4 => compress::inflate_lz4(&blob.data),
        CompressionKind::Uncompressed | CompressionKind::Raw => Ok(blob.data.to_vec()),
        CompressionKind::Custom => {
            stats.report_with(ErrorClass::Kind, "custom chunk compression");
            return None;
        }
        CompressionKind::Unknown(byte) => {
            stats.report_with(ErrorClass::Kind, format!("unknown compression {byte}"));
            return None;
        }
    };
    match result {
        Ok(data) if !data.is_empty() => Some(data),
        Ok(_) => {
            stats.report_with(ErrorClass::Compression, "empty chunk payload");
            None
        }
        Err(err) => {
            stats.report_with(ErrorClass::Compression, err.to_string());
            None
        }
    }
}

/// The full per-chunk path. `None` means the chunk contributed nothing;
/// the reason has been counted.
pub fn work_chunk(ctx: &RunContext, blob: ChunkBlob, format: JavaFormat) -> Option<ChunkScratch> {
    if !ctx.running() {
        return None;
    }
    let data = decompress(&blob, &ctx.stats)?;
    if !ctx.running() {
        return None;
    }

    let mut chunk = Chunk::new();
    chunk.set_x(blob.x);
    chunk.set_z(blob.z);
    match format {
        JavaFormat::Anvil => {
            let mut scan = VersionScan::new(&mut chunk);
            if let Err(err) = pixelmap_nbt::parse(&data, Endian::Big, &mut scan) {
                ctx.stats.report_with(ErrorClass::Parse, err.to_string());
                return None;
            }
            let mut visitor = visitor_for(&mut chunk);
            if let Err(err) = pixelmap_nbt::parse(&data, Endian::Big, &mut visitor) {
                ctx.stats.report_with(ErrorClass::Parse, err.to_string());
                return None;
            }
        }
        JavaFormat::Column => {
            let mut visitor = ColumnVisitor::new(&mut chunk);
            if let Err(err) = pixelmap_nbt::parse(&data, Endian::Big, &mut visitor) {
                ctx.stats.report_with(ErrorClass::Parse, err.to_string());
                return None;
            }
        }
    }
    drop(data);

    if !ctx.running() {
        return None;
    }
    if !chunk.is_valid() {
        ctx.stats.report(ErrorClass::EmptyChunks);
        return None;
    }

    render_parsed_chunk(ctx, &chunk)
}

/// Render an already-parsed chunk, firing the finished event on success.
pub fn render_parsed_chunk(ctx: &RunContext, chunk: &Chunk) -> Option<ChunkScratch> {
    if !ctx.running() {
        return None;
    }
    match render_chunk(chunk, &ctx.chain, &ctx.settings) {
        Ok(Some(scratch)) => {
            ctx.stats.chunk_rendered();
            ctx.progress.finished_chunk(1);
            Some(scratch)
        }
        Ok(None) => {
            ctx.stats.report(ErrorClass::EmptyChunks);
            None
        }
        Err(err) => {
            ctx.stats.report_with(ErrorClass::EmptyChunks, err.to_string());
            None
        }
    }
}

/// A chunk render either completed inline or runs on the pool.
pub enum ChunkResult {
    Ready(Option<ChunkScratch>),
    Pending(TaskHandle<Option<ChunkScratch>>),
}

impl ChunkResult {
    pub fn wait(self) -> Option<ChunkScratch> {
        match self {
            ChunkResult::Ready(scratch) => scratch,
            ChunkResult::Pending(handle) => handle.wait().flatten(),
        }
    }
}
