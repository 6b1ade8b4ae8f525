//! World-level render stage: bounding box over the populated regions, then
//! one streamed PNG with a single row slice fetched from each region per
//! output row.

use std::collections::HashMap;

use crate::image::save_png;
use crate::region::RegionScratch;
use crate::{RenderError, RenderMode, RenderSettings, CHUNK_WIDTH, REGION_CHUNKS, REGION_WIDTH};

#[derive(Debug, Clone, Copy)]
struct Bounds {
    ax: i32,
    az: i32,
    bx: i32,
    bz: i32,
}

fn bounds(regions: &HashMap<(i32, i32), RegionScratch>) -> Option<Bounds> {
    let mut it = regions.iter().filter(|(_, r)| r.has_data()).map(|(&pos, _)| pos);
    let (x, z) = it.next()?;
    let mut b = Bounds { ax: x, az: z, bx: x, bz: z };
    for (x, z) in it {
        b.ax = b.ax.min(x);
        b.bx = b.bx.max(x);
        b.az = b.az.min(z);
        b.bz = b.bz.max(z);
    }
    Some(b)
}

/// Stitch the final image for the single-file modes. Per-chunk and
/// per-region outputs were already written by the earlier stages.
pub fn render_world(
    regions: &HashMap<(i32, i32), RegionScratch>,
    settings: &RenderSettings,
) -> Result<(), RenderError> {
    let Some(b) = bounds(regions) else { return Ok(()) };
    let width = (1 + b.bx - b.ax) as usize;
    let height = (1 + b.bz - b.az) as usize;
    let comment = format!("origin={},{} regions={}x{}", b.ax, b.az, width, height);

    match settings.mode {
        RenderMode::Chunk | RenderMode::Region => Ok(()),
        RenderMode::Image => save_png(
            &settings.output,
            (width * REGION_WIDTH) as u32,
            (height * REGION_WIDTH) as u32,
            &comment,
            |bz, row| {
                let rz = bz as i32 / REGION_WIDTH as i32 + b.az;
                let tile_row = bz as usize % REGION_WIDTH;
                for rx in b.ax..=b.bx {
                    let Some(region) = regions.get(&(rx, rz)) else { continue };
                    if region.pixels.is_empty() {
                        continue;
                    }
                    let dst = (rx - b.ax) as usize * REGION_WIDTH;
                    let src = tile_row * REGION_WIDTH;
                    row[dst..dst + REGION_WIDTH]
                        .copy_from_slice(&region.pixels[src..src + REGION_WIDTH]);
                }
            },
        ),
        RenderMode::ImageDirect => save_png(
            &settings.output,
            (width * REGION_WIDTH) as u32,
            (height * REGION_WIDTH) as u32,
            &comment,
            |bz, row| {
                let rz = bz as i32 / REGION_WIDTH as i32 + b.az;
                let chunk_row = (bz as usize / CHUNK_WIDTH) % REGION_CHUNKS;
                let tile_row = bz as usize % CHUNK_WIDTH;
                for rx in b.ax..=b.bx {
                    let Some(region) = regions.get(&(rx, rz)) else { continue };
                    if region.chunk_pixels.is_empty() {
                        continue;
                    }
                    let base = (rx - b.ax) as usize * REGION_WIDTH;
                    for cx in 0..REGION_CHUNKS {
                        let chunk = &region.chunk_pixels[chunk_row * REGION_CHUNKS + cx];
                        if chunk.is_empty() {
                            continue;
                        }
                        let dst = base + cx * CHUNK_WIDTH;
                        let src = tile_row * CHUNK_WIDTH;
                        row[dst..dst + CHUNK_WIDTH]
                            .copy_from_slice(&chunk[src..src + CHUNK_WIDTH]);
                    }
                }
            },
        ),
        RenderMode::ChunkTiny => save_png(
            &settings.output,
            (width * REGION_CHUNKS) as u32,
            (height * REGION_CHUNKS) as u32,
            &comment,
            |bz, row| {
                let rz = bz as i32 / REGION_CHUNKS as i32 + b.az;
                let tile_row = bz as usize % REGION_CHUNKS;
                for rx in b.ax..=b.bx {
                    let Some(region) = regions.get(&(rx, rz)) else { continue };
                    if region.pixels.is_empty() {
                        continue;
                    }
                    let dst = (rx - b.ax) as usize * REGION_CHUNKS;
                    let src = tile_row * REGION_CHUNKS;
                    row[dst..dst + REGION_CHUNKS]
                        .copy_from_slice(&region.pixels[src..src + REGION_CHUNKS]);
                }
            },
        ),
        RenderMode::RegionTiny => save_png(
            &settings.output,
            width as u32,
            height as u32,
            &comment,
            |bz, row| {
                let rz = bz as i32 + b.az;
                for rx in b.ax..=b.bx {
                    let Some(region) = regions.get(&(rx, rz)) else { continue };
                    if let Some(&pixel) = region.pixels.first() {
                        row[(rx - b.ax) as usize] = pixel;
                    }
                }
            },
        ),
    }
}
