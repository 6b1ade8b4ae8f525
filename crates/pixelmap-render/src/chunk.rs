//! Chunk-level render stage: run the block-pass chain over all 256 columns
//! and produce (or directly write) the chunk scratch.

use pixelmap_world::chunk::{Palette, PaletteKind};
use pixelmap_world::Chunk;

use crate::block_color::BlockColor;
use crate::color::{blend_over, Rgba};
use crate::image::save_png;
use crate::pass::{run_chain, BlockPass, BlockPassData};
use crate::ray::Vec3;
use crate::{RenderError, RenderMode, RenderSettings, CHUNK_WIDTH, REGION_CHUNKS};

/// Rendered pixels of one chunk, plus the RGBA palette they came from.
#[derive(Debug, Clone)]
pub struct ChunkScratch {
    pub x: i32,
    pub z: i32,
    pub palette: Vec<Rgba>,
    /// 16x16 pixels; a single pixel in the tiny mode; empty when this mode
    /// renders elsewhere.
    pub pixels: Vec<Rgba>,
}

/// Resolve a chunk's block palette into RGBA through the color table.
pub fn fill_palette(chunk: &Chunk, colors: &BlockColor) -> Vec<Rgba> {
    match chunk.palette() {
        Palette::Unset => Vec::new(),
        Palette::Ids(ids) => {
            ids.iter().map(|&id| colors.color(colors.index_of_id(id))).collect()
        }
        Palette::Names(names) => {
            names.iter().map(|name| colors.color(colors.index_of_name(name))).collect()
        }
    }
}

fn render_pixels(chunk: &Chunk, chain: &[BlockPass], palette: &[Rgba]) -> Vec<Rgba> {
    let mut pixels = vec![Rgba::TRANSPARENT; CHUNK_WIDTH * CHUNK_WIDTH];
    for bz in 0..CHUNK_WIDTH {
        for bx in 0..CHUNK_WIDTH {
            let mut data = BlockPassData {
                palette,
                chunk,
                dir: Vec3::new(0.0, -1.0, 0.0),
                pos: Vec3::new(bx as f32, chunk.max_y() as f32, bz as f32),
                color: Rgba::TRANSPARENT,
            };
            run_chain(chain, &mut data);
            pixels[bz * CHUNK_WIDTH + bx] = data.color;
        }
    }
    pixels
}

/// Render one chunk for the configured mode. Returns `None` when the chunk
/// has nothing to draw (no palette, or every entry transparent).
pub fn render_chunk(
    chunk: &Chunk,
    chain: &[BlockPass],
    settings: &RenderSettings,
) -> Result<Option<ChunkScratch>, RenderError> {
    let needs_palette = !matches!(settings.mode, RenderMode::ChunkTiny | RenderMode::RegionTiny);
    let palette = fill_palette(chunk, &settings.colors);
    if needs_palette {
        if chunk.palette_kind() == PaletteKind::Unset {
            return Ok(None);
        }
        if palette.is_empty() || !palette.iter().any(|c| c.a > 0) {
            return Ok(None);
        }
    }

    let mut scratch = ChunkScratch { x: chunk.x(), z: chunk.z(), palette, pixels: Vec::new() };
    match settings.mode {
        RenderMode::Chunk => {
            let pixels = render_pixels(chunk, chain, &scratch.palette);
            let rx = chunk.x().div_euclid(REGION_CHUNKS as i32);
            let rz = chunk.z().div_euclid(REGION_CHUNKS as i32);
            let cx = chunk.x().rem_euclid(REGION_CHUNKS as i32);
            let cz = chunk.z().rem_euclid(REGION_CHUNKS as i32);
            let dir = settings.output.join(format!("r.{rx}.{rz}"));
            std::fs::create_dir_all(&dir)?;
            let path = dir.join(format!("chunk.{cx}.{cz}.png"));
            let comment = format!("chunk={},{}", chunk.x(), chunk.z());
            save_png(&path, CHUNK_WIDTH as u32, CHUNK_WIDTH as u32, &comment, |y, row| {
                let offset = y as usize * CHUNK_WIDTH;
                row.copy_from_slice(&pixels[offset..offset + CHUNK_WIDTH]);
            })?;
        }
        RenderMode::Region | RenderMode::Image | RenderMode::ImageDirect => {
            scratch.pixels = render_pixels(chunk, chain, &scratch.palette);
        }
        RenderMode::ChunkTiny => {
            scratch.pixels = vec![Rgba::opaque(255, 0, 0)];
        }
        RenderMode::RegionTiny => {}
    }
    Ok(Some(scratch))
}

/// Blend a newer scratch over an existing one, pixel by pixel. Used when
/// two Bedrock snapshots both rendered the same chunk.
pub fn merge_scratch(base: &mut ChunkScratch, over: &ChunkScratch) {
    if base.pixels.is_empty() {
        base.pixels = over.pixels.clone();
    } else if base.pixels.len() == over.pixels.len() {
        for (dst, &src) in base.pixels.iter_mut().zip(over.pixels.iter()) {
            *dst = blend_over(src, *dst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{build_chain, PassOptions};
    use pixelmap_world::chunk::{BlockOrder, Section, SECTION_AREA, SECTION_TILES};
    use std::path::PathBuf;

    fn stone_chunk(x: i32, z: i32) -> Chunk {
        let mut chunk = Chunk::new();
        chunk.set_x(x);
        chunk.set_z(z);
        chunk.set_palette_kind(PaletteKind::Namespace);
        chunk.push_palette_name("minecraft:stone".into());
        let mut section = Section::new(0, BlockOrder::Yzx);
        section.set_blocks(&[0; SECTION_TILES]);
        chunk.insert_section(section);
        chunk.set_heightmap(vec![6; SECTION_AREA]);
        chunk
    }

    fn settings(mode: RenderMode) -> RenderSettings {
        RenderSettings {
            mode,
            output: std::env::temp_dir()
                .join(format!("pixelmap_chunkstage_{}", rand::random::<u64>())),
            colors: BlockColor::parse("minecraft:stone = 804020\n"),
        }
    }

    #[test]
    fn image_mode_renders_uniform_tile() {
        let chunk = stone_chunk(0, 0);
        let chain = build_chain(&PassOptions::default());
        let settings = settings(RenderMode::Image);
        let scratch = render_chunk(&chunk, &chain, &settings).unwrap().unwrap();
        assert_eq!(scratch.pixels.len(), 256);
        assert!(scratch.pixels.iter().all(|&p| p == Rgba::opaque(128, 64, 32)));
    }

    #[test]
    fn unknown_palette_is_skipped() {
        let mut chunk = Chunk::new();
        chunk.set_palette_kind(PaletteKind::Namespace);
        chunk.push_palette_name("minecraft:unknown_to_the_table".into());
        let mut section = Section::new(0, BlockOrder::Yzx);
        section.set_blocks(&[0; SECTION_TILES]);
        chunk.insert_section(section);

        let chain = build_chain(&PassOptions::default());
        let settings = settings(RenderMode::Image);
        assert!(render_chunk(&chunk, &chain, &settings).unwrap().is_none());
    }

    #[test]
    fn chunk_mode_writes_file() {
        let chunk = stone_chunk(33, -1);
        let chain = build_chain(&PassOptions::default());
        let settings = settings(RenderMode::Chunk);
        std::fs::create_dir_all(&settings.output).unwrap();
        render_chunk(&chunk, &chain, &settings).unwrap().unwrap();
        // Chunk (33, -1) lives in region (1, -1) at offset (1, 31).
        let path: PathBuf = settings.output.join("r.1.-1").join("chunk.1.31.png");
        assert!(path.is_file());
        std::fs::remove_dir_all(&settings.output).ok();
    }

    #[test]
    fn tiny_mode_is_single_pixel() {
        let chunk = stone_chunk(0, 0);
        let chain = build_chain(&PassOptions::default());
        let settings = settings(RenderMode::ChunkTiny);
        let scratch = render_chunk(&chunk, &chain, &settings).unwrap().unwrap();
        assert_eq!(scratch.pixels, vec![Rgba::opaque(255, 0, 0)]);
    }

    #[test]
    fn merge_blends_newer_on_top() {
        let mut base = ChunkScratch {
            x: 0,
            z: 0,
            palette: Vec::new(),
            pixels: vec![Rgba::opaque(10, 10, 10); 4],
        };
        let over = ChunkScratch {
            x: 0,
            z: 0,
            palette: Vec::new(),
            pixels: vec![Rgba::opaque(200, 200, 200); 4],
        };
        merge_scratch(&mut base, &over);
        assert!(base.pixels.iter().all(|&p| p == Rgba::opaque(200, 200, 200)));
    }
}
