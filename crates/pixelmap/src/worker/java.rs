//! Region-save orchestration, shared by Anvil and Beta worlds.
//!
//! One scan pass over the headers collects totals and seeds the lonely
//! detector. Each surviving region becomes a task at a strictly decreasing
//! priority; it submits (or inlines) its chunk renders and a continuation
//! one priority lower that rolls the scratches into the region buffer, so
//! the pool finishes a region before starting the next. A final barrier
//! stitches the region buffers into the world image.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use pixelmap_render::{render_region, render_world, RegionScratch, RenderMode};
use pixelmap_world::lonely::RegionCluster;
use pixelmap_world::region::{self, RegionFile, RegionKind};

use crate::pool::{TaskHandle, Transaction};
use crate::stats::ErrorClass;
use crate::worker::{work_chunk, ChunkResult, JavaFormat, RunContext};
use crate::PixelMapError;

pub fn run(
    ctx: &Arc<RunContext>,
    path: &Path,
    kind: RegionKind,
    format: JavaFormat,
) -> Result<(), PixelMapError> {
    let mut files = region::scan(path, kind)?;

    let mut lonely = RegionCluster::new();
    let mut total_chunks = 0u64;
    for file in &mut files {
        if let Err(err) = file.load_header(&ctx.gate) {
            ctx.stats.report_with(ErrorClass::EmptyRegions, err.to_string());
            continue;
        }
        if file.chunk_count() == 0 {
            continue;
        }
        total_chunks += file.chunk_count() as u64;
        if ctx.use_lonely {
            lonely.add_region(file);
        }
    }
    if ctx.use_lonely {
        lonely.process();
    }
    ctx.progress.total_chunks(total_chunks);
    ctx.progress.total_render(total_chunks);

    let total_regions = files.iter().filter(|f| f.chunk_count() > 0).count();

    let mut transaction = Transaction::new();
    let mut handles: Vec<TaskHandle<Option<TaskHandle<Option<RegionScratch>>>>> = Vec::new();
    let mut priority = 0i32;
    for file in files {
        if !ctx.running() {
            break;
        }
        if !file.header_loaded() {
            continue;
        }
        if file.chunk_count() == 0 {
            ctx.stats.report(ErrorClass::EmptyRegions);
            continue;
        }
        if ctx.use_lonely && lonely.is_lonely((file.x, file.z)) {
            ctx.stats.report(ErrorClass::LonelyRegions);
            ctx.stats.report_n(ErrorClass::LonelyChunks, file.chunk_count() as u64);
            continue;
        }

        let ctx_task = Arc::clone(ctx);
        let prio = priority;
        handles.push(transaction.enqueue(prio, move || {
            work_region(&ctx_task, file, prio, total_regions, format)
        }));
        // Leave room between a region and its continuation.
        priority -= 2;

        if transaction.len() >= ctx.pool.size() {
            ctx.pool.commit(&mut transaction);
        }
    }
    ctx.pool.commit(&mut transaction);
    ctx.pool.wait();

    let mut regions: HashMap<(i32, i32), RegionScratch> = HashMap::new();
    for handle in handles {
        let Some(Some(continuation)) = handle.wait() else { continue };
        let Some(Some(scratch)) = continuation.wait() else { continue };
        if scratch.has_data() {
            regions.insert((scratch.x, scratch.z), scratch);
        }
    }
    ctx.progress.flush();

    if ctx.running() {
        render_world(&regions, &ctx.settings)?;
    } else {
        ctx.pool.abort();
    }
    Ok(())
}

/// The region task body: extract and render the chunks, then hand a
/// continuation to the pool that assembles the region scratch and releases
/// the file cache.
fn work_region(
    ctx: &Arc<RunContext>,
    mut file: RegionFile,
    priority: i32,
    total_regions: usize,
    format: JavaFormat,
) -> Option<TaskHandle<Option<RegionScratch>>> {
    if !ctx.running() {
        return None;
    }
    let (x, z) = (file.x, file.z);

    // The tiny region mode needs no chunk data at all.
    if ctx.settings.mode == RenderMode::RegionTiny {
        let chunk_count = file.chunk_count() as u64;
        return match render_region(x, z, Vec::new(), &ctx.settings) {
            Ok((scratch, _)) => {
                ctx.progress.finished_chunk(chunk_count);
                ctx.progress.finished_render(chunk_count);
                Some(TaskHandle::ready(Some(scratch)))
            }
            Err(err) => {
                ctx.stats.report_with(ErrorClass::EmptyRegions, err.to_string());
                None
            }
        };
    }

    if let Err(err) = file.load_data(&ctx.gate) {
        ctx.stats.report_with(ErrorClass::EmptyRegions, err.to_string());
        return None;
    }

    let mut results: Vec<ChunkResult> = Vec::with_capacity(file.chunk_count());
    let mut transaction = Transaction::new();
    let slots: Vec<usize> = file.populated().collect();
    for slot in slots {
        if !ctx.running() {
            break;
        }
        let blob = match file.chunk(slot, &ctx.gate) {
            Ok(Some(blob)) => blob,
            Ok(None) => continue,
            Err(err) => {
                ctx.stats.report_with(ErrorClass::Parse, err.to_string());
                continue;
            }
        };

        // With fewer regions than workers the pool has headroom for chunk
        // tasks; otherwise inline parsing keeps the region's memory local.
        if total_regions < ctx.pool.size() {
            let ctx_task = Arc::clone(ctx);
            results.push(ChunkResult::Pending(transaction.enqueue(priority, move || {
                work_chunk(&ctx_task, blob, format)
            })));
            if transaction.len() >= ctx.pool.size() {
                ctx.pool.commit(&mut transaction);
            }
        } else {
            results.push(ChunkResult::Ready(work_chunk(ctx, blob, format)));
        }
    }
    ctx.pool.commit(&mut transaction);

    if !ctx.running() {
        return None;
    }

    let ctx_cont = Arc::clone(ctx);
    Some(ctx.pool.enqueue(priority - 1, move || {
        let mut chunks = Vec::with_capacity(results.len());
        for result in results {
            if let Some(scratch) = result.wait() {
                chunks.push(scratch);
            }
        }
        file.release();
        drop(file);
        if !ctx_cont.running() {
            return None;
        }
        match render_region(x, z, chunks, &ctx_cont.settings) {
            Ok((scratch, drawn)) => {
                ctx_cont.progress.finished_render(drawn as u64);
                Some(scratch)
            }
            Err(err) => {
                ctx_cont.stats.report_with(ErrorClass::EmptyRegions, err.to_string());
                None
            }
        }
    }))
}
