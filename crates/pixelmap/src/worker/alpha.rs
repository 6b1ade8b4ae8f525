//! Alpha-save orchestration: loose chunk files bucketed by their enclosing
//! region coordinate, then the same region/continuation scheduling as the
//! region saves.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use pixelmap_render::{render_region, render_world, RegionScratch};
use pixelmap_world::alpha::{self, AlphaFile};
use pixelmap_world::lonely::ChunkFlood;
use pixelmap_world::region::{ChunkBlob, CompressionKind};

use crate::pool::{TaskHandle, Transaction};
use crate::stats::ErrorClass;
use crate::worker::{work_chunk, ChunkResult, JavaFormat, RunContext};
use crate::PixelMapError;

pub fn run(ctx: &Arc<RunContext>, path: &Path) -> Result<(), PixelMapError> {
    let files = alpha::scan(path)?;

    let mut lonely = ChunkFlood::new();
    if ctx.use_lonely {
        for file in &files {
            lonely.add_chunk((file.x, file.z));
        }
        lonely.process();
    }
    ctx.progress.total_chunks(files.len() as u64);
    ctx.progress.total_render(files.len() as u64);

    let mut buckets: BTreeMap<(i32, i32), Vec<AlphaFile>> = BTreeMap::new();
    for file in files {
        if ctx.use_lonely && lonely.is_lonely_chunk((file.x, file.z)) {
            ctx.stats.report(ErrorClass::LonelyChunks);
            continue;
        }
        buckets.entry((file.x >> 5, file.z >> 5)).or_default().push(file);
    }
    if ctx.use_lonely {
        for &(rx, rz) in buckets.keys() {
            if lonely.is_lonely_region((rx, rz)) {
                ctx.stats.report(ErrorClass::LonelyRegions);
            }
        }
    }

    let total_regions = buckets.len();
    let mut transaction = Transaction::new();
    let mut handles: Vec<TaskHandle<Option<TaskHandle<Option<RegionScratch>>>>> = Vec::new();
    let mut priority = 0i32;
    for ((rx, rz), bucket) in buckets {
        if !ctx.running() {
            break;
        }
        let ctx_task = Arc::clone(ctx);
        let prio = priority;
        handles.push(transaction.enqueue(prio, move || {
            work_bucket(&ctx_task, rx, rz, bucket, prio, total_regions)
        }));
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

fn work_bucket(
    ctx: &Arc<RunContext>,
    rx: i32,
    rz: i32,
    bucket: Vec<AlphaFile>,
    priority: i32,
    total_regions: usize,
) -> Option<TaskHandle<Option<RegionScratch>>> {
    if !ctx.running() {
        return None;
    }
    let mut results: Vec<ChunkResult> = Vec::with_capacity(bucket.len());
    let mut transaction = Transaction::new();
    for file in bucket {
        if !ctx.running() {
            break;
        }
        // Alpha chunk files are always gzip-compressed NBT.
        let data = match file.read(&ctx.gate) {
            Ok(data) => data,
            Err(err) => {
                ctx.stats.report_with(ErrorClass::Parse, err.to_string());
                continue;
            }
        };
        let blob = ChunkBlob {
            x: file.x,
            z: file.z,
            kind: CompressionKind::Gzip,
            data: Bytes::from(data),
        };
        if total_regions < ctx.pool.size() {
            let ctx_task = Arc::clone(ctx);
            results.push(ChunkResult::Pending(transaction.enqueue(priority, move || {
                work_chunk(&ctx_task, blob, JavaFormat::Column)
            })));
            if transaction.len() >= ctx.pool.size() {
                ctx.pool.commit(&mut transaction);
            }
        } else {
            results.push(ChunkResult::Ready(work_chunk(ctx, blob, JavaFormat::Column)));
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
        if !ctx_cont.running() {
            return None;
        }
        match render_region(rx, rz, chunks, &ctx_cont.settings) {
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
