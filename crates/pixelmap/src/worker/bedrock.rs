//! Bedrock orchestration: one parse task per `.ldb` snapshot, pairwise
//! world merges oldest-first on the pool, a main-thread replay of the log
//! (newer than every snapshot), then region-bucketed rendering.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use pixelmap_render::chunk::merge_scratch;
use pixelmap_render::{render_region, render_world, ChunkScratch, RegionScratch};
use pixelmap_world::bedrock::World;
use pixelmap_world::leveldb;
use pixelmap_world::lonely::ChunkFlood;

use crate::pool::{TaskHandle, Transaction};
use crate::stats::ErrorClass;
use crate::worker::{render_parsed_chunk, RunContext};
use crate::PixelMapError;

/// A parsed world plus the chunk scratches already rendered from it. The
/// chunks are drained into scratches as soon as a file is parsed so merges
/// only reindex what overlaps.
pub struct WorldSlice {
    world: World,
    render: HashMap<(i32, i32), ChunkScratch>,
}

impl WorldSlice {
    fn new(world: World) -> Self {
        Self { world, render: HashMap::new() }
    }

    /// Render every chunk still held by the world.
    fn draw(&mut self, ctx: &RunContext) {
        let chunks: Vec<_> = self.world.drain_chunks().collect();
        for (pos, chunk) in chunks {
            if !ctx.running() {
                return;
            }
            if let Some(scratch) = render_parsed_chunk(ctx, &chunk) {
                self.render.insert(pos, scratch);
            }
        }
    }

    /// Merge a newer slice over this one.
    fn merge(&mut self, incoming: WorldSlice) {
        self.world.merge(incoming.world);
        for (pos, scratch) in incoming.render {
            match self.render.entry(pos) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    merge_scratch(entry.get_mut(), &scratch);
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(scratch);
                }
            }
        }
    }
}

pub fn run(ctx: &Arc<RunContext>, path: &Path, dimension: i32) -> Result<(), PixelMapError> {
    let dir = leveldb::scan(path)?;
    ctx.progress.total_chunks(dir.tables.len() as u64 + 1);

    let mut handles: VecDeque<TaskHandle<Option<WorldSlice>>> = VecDeque::new();
    let mut transaction = Transaction::new();
    for table in dir.tables {
        if !ctx.running() {
            break;
        }
        let ctx_task = Arc::clone(ctx);
        handles.push_back(transaction.enqueue(1, move || work_table(&ctx_task, &table, dimension)));
        if transaction.len() >= ctx.pool.size() {
            ctx.pool.commit(&mut transaction);
        }
    }
    ctx.pool.commit(&mut transaction);

    // Pairwise merges; each one depends on two earlier results, and the
    // descending priorities make the chain resolve front to back.
    let mut priority = 0i32;
    while handles.len() > 1 {
        if !ctx.running() {
            break;
        }
        let first = handles.pop_front().unwrap();
        let second = handles.pop_front().unwrap();
        let ctx_task = Arc::clone(ctx);
        handles.push_back(transaction.enqueue(priority, move || {
            merge_slices(&ctx_task, first, second)
        }));
        priority -= 1;
        if transaction.len() >= ctx.pool.size() {
            ctx.pool.commit(&mut transaction);
        }
    }
    ctx.pool.commit(&mut transaction);

    if !ctx.running() {
        ctx.pool.abort();
        return Ok(());
    }

    // The log replays on this thread; its content postdates every table.
    let mut log_slice = None;
    if let Some(log_path) = dir.log {
        let name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("log").to_string();
        let mut world = World::new(name, dimension);
        match std::fs::read(&log_path) {
            Ok(data) => {
                let stats = Arc::clone(&ctx.stats);
                let result = leveldb::parse_log(&data, |key, value| {
                    if let Err(err) = world.apply(key, value) {
                        stats.report_with(ErrorClass::Parse, err.to_string());
                    }
                });
                match result {
                    Ok(()) => {
                        ctx.progress.finished_chunk(1);
                        let mut slice = WorldSlice::new(world);
                        slice.draw(ctx);
                        log_slice = Some(slice);
                    }
                    Err(err) => {
                        ctx.stats.report_with(ErrorClass::Parse, err.to_string());
                    }
                }
            }
            Err(err) => {
                ctx.stats.report_with(ErrorClass::Parse, err.to_string());
            }
        }
    }

    ctx.pool.wait();
    ctx.progress.flush();

    let merged = handles.pop_front().and_then(|handle| handle.wait()).flatten();
    let mut finished = match (merged, log_slice) {
        (Some(mut snapshots), Some(log)) => {
            snapshots.merge(log);
            snapshots
        }
        (Some(snapshots), None) => snapshots,
        (None, Some(log)) => log,
        (None, None) => return Ok(()),
    };

    if !ctx.running() {
        ctx.pool.abort();
        return Ok(());
    }

    ctx.progress.total_render(finished.render.len() as u64);

    let mut buckets: HashMap<(i32, i32), Vec<ChunkScratch>> = HashMap::new();
    for ((cx, cz), scratch) in finished.render.drain() {
        buckets.entry((cx >> 5, cz >> 5)).or_default().push(scratch);
    }

    let mut region_handles = Vec::with_capacity(buckets.len());
    for ((rx, rz), chunks) in buckets {
        let ctx_task = Arc::clone(ctx);
        region_handles.push(transaction.enqueue(1, move || {
            if !ctx_task.running() {
                return None;
            }
            match render_region(rx, rz, chunks, &ctx_task.settings) {
                Ok((scratch, drawn)) => {
                    ctx_task.progress.finished_render(drawn as u64);
                    Some(scratch)
                }
                Err(err) => {
                    ctx_task.stats.report_with(ErrorClass::EmptyRegions, err.to_string());
                    None
                }
            }
        }));
    }
    ctx.pool.commit(&mut transaction);
    ctx.pool.wait();

    let mut regions: HashMap<(i32, i32), RegionScratch> = HashMap::new();
    for handle in region_handles {
        let Some(Some(scratch)) = handle.wait() else { continue };
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

/// Parse one snapshot table into a world slice and render its chunks.
fn work_table(ctx: &RunContext, path: &Path, dimension: i32) -> Option<WorldSlice> {
    if !ctx.running() {
        return None;
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("table").to_string();
    let data = {
        let _permit = ctx.gate.acquire();
        match std::fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                ctx.stats.report_with(ErrorClass::Parse, err.to_string());
                return None;
            }
        }
    };

    let mut world = World::new(name, dimension);
    let stats = &ctx.stats;
    match leveldb::parse_table(&data, |key, value| {
        if let Err(err) = world.apply(key, value) {
            stats.report_with(ErrorClass::Parse, err.to_string());
        }
    }) {
        Ok(summary) => {
            stats.report_n(ErrorClass::Kind, summary.skipped_blocks as u64);
        }
        Err(err) => {
            stats.report_with(ErrorClass::Parse, err.to_string());
            return Some(WorldSlice::new(World::new(String::new(), dimension)));
        }
    }
    drop(data);

    if ctx.use_lonely {
        let mut lonely = ChunkFlood::new();
        for (&pos, _) in world.chunks() {
            lonely.add_chunk(pos);
        }
        lonely.process();
        let before = world.len();
        world.retain(|pos, _| !lonely.is_lonely_chunk(*pos));
        ctx.stats.report_n(ErrorClass::LonelyChunks, (before - world.len()) as u64);
    }

    if ctx.night {
        world.generate_block_light(&ctx.lights);
    }

    ctx.progress.finished_chunk(1);

    let mut slice = WorldSlice::new(world);
    slice.draw(ctx);
    Some(slice)
}

/// Merge two pending slices, newer (by file name) over older.
fn merge_slices(
    ctx: &RunContext,
    first: TaskHandle<Option<WorldSlice>>,
    second: TaskHandle<Option<WorldSlice>>,
) -> Option<WorldSlice> {
    let a = first.wait().flatten();
    let b = second.wait().flatten();
    if !ctx.running() {
        return None;
    }
    match (a, b) {
        (Some(a), Some(b)) => {
            let (mut older, newer) =
                if a.world.name <= b.world.name { (a, b) } else { (b, a) };
            older.merge(newer);
            Some(older)
        }
        (Some(slice), None) | (None, Some(slice)) => Some(slice),
        (None, None) => None,
    }
}
