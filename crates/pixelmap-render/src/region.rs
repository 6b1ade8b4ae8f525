//! Region-level render stage: gather up to 1024 chunk scratches into the
//! region-granularity buffer, or write the per-region PNG directly.

use crate::chunk::ChunkScratch;
use crate::color::Rgba;
use crate::image::save_png;
use crate::{RenderError, RenderMode, RenderSettings, CHUNK_WIDTH, REGION_CHUNKS, REGION_WIDTH};

/// Rendered pixels of one region.
#[derive(Debug, Clone, Default)]
pub struct RegionScratch {
    pub x: i32,
    pub z: i32,
    /// 512x512 for image mode, 32x32 for the chunk-tiny mode, one pixel for
    /// region-tiny; empty when this mode rendered to disk already.
    pub pixels: Vec<Rgba>,
    /// Per-chunk rows for the direct image mode, indexed `cz * 32 + cx`.
    pub chunk_pixels: Vec<Vec<Rgba>>,
}

impl RegionScratch {
    pub fn has_data(&self) -> bool {
        !self.pixels.is_empty() || self.chunk_pixels.iter().any(|c| !c.is_empty())
    }
}

fn slot(x: i32, z: i32) -> usize {
    let cx = x.rem_euclid(REGION_CHUNKS as i32) as usize;
    let cz = z.rem_euclid(REGION_CHUNKS as i32) as usize;
    cz * REGION_CHUNKS + cx
}

/// Assemble one region from its chunk scratches. Returns the scratch and
/// how many chunks contributed pixels.
pub fn render_region(
    x: i32,
    z: i32,
    chunks: Vec<ChunkScratch>,
    settings: &RenderSettings,
) -> Result<(RegionScratch, usize), RenderError> {
    let mut scratch = RegionScratch { x, z, ..Default::default() };
    let drawn = chunks.iter().filter(|c| !c.pixels.is_empty()).count();
    match settings.mode {
        RenderMode::Chunk => {}
        RenderMode::Region => {
            if drawn > 0 {
                write_region_png(x, z, &chunks, settings)?;
            }
        }
        RenderMode::Image => {
            if drawn > 0 {
                scratch.pixels = vec![Rgba::TRANSPARENT; REGION_WIDTH * REGION_WIDTH];
                for chunk in &chunks {
                    if chunk.pixels.is_empty() {
                        continue;
                    }
                    let cx = chunk.x.rem_euclid(REGION_CHUNKS as i32) as usize;
                    let cz = chunk.z.rem_euclid(REGION_CHUNKS as i32) as usize;
                    for row in 0..CHUNK_WIDTH {
                        let dst = (cz * CHUNK_WIDTH + row) * REGION_WIDTH + cx * CHUNK_WIDTH;
                        let src = row * CHUNK_WIDTH;
                        scratch.pixels[dst..dst + CHUNK_WIDTH]
                            .copy_from_slice(&chunk.pixels[src..src + CHUNK_WIDTH]);
                    }
                }
            }
        }
        RenderMode::ImageDirect => {
            if drawn > 0 {
                scratch.chunk_pixels = vec![Vec::new(); REGION_CHUNKS * REGION_CHUNKS];
                for mut chunk in chunks {
                    if chunk.pixels.is_empty() {
                        continue;
                    }
                    scratch.chunk_pixels[slot(chunk.x, chunk.z)] = std::mem::take(&mut chunk.pixels);
                }
            }
            return Ok((scratch, drawn));
        }
        RenderMode::ChunkTiny => {
            if drawn > 0 {
                scratch.pixels = vec![Rgba::TRANSPARENT; REGION_CHUNKS * REGION_CHUNKS];
                for chunk in &chunks {
                    if let Some(&pixel) = chunk.pixels.first() {
                        scratch.pixels[slot(chunk.x, chunk.z)] = pixel;
                    }
                }
            }
        }
        RenderMode::RegionTiny => {
            scratch.pixels = vec![Rgba::opaque(255, 0, 0)];
        }
    }
    Ok((scratch, drawn))
}

/// The standalone `r.<x>.<z>.png` of the region output mode. Empty chunks
/// leave transparent rows.
fn write_region_png(
    x: i32,
    z: i32,
    chunks: &[ChunkScratch],
    settings: &RenderSettings,
) -> Result<(), RenderError> {
    let mut slots: Vec<Option<&ChunkScratch>> = vec![None; REGION_CHUNKS * REGION_CHUNKS];
    for chunk in chunks {
        if !chunk.pixels.is_empty() {
            slots[slot(chunk.x, chunk.z)] = Some(chunk);
        }
    }
    let path = settings.output.join(format!("r.{x}.{z}.png"));
    let comment = format!("region={x},{z}");
    save_png(&path, REGION_WIDTH as u32, REGION_WIDTH as u32, &comment, |bz, row| {
        let cz = bz as usize / CHUNK_WIDTH;
        let tile_row = bz as usize % CHUNK_WIDTH;
        for cx in 0..REGION_CHUNKS {
            if let Some(chunk) = slots[cz * REGION_CHUNKS + cx] {
                let src = tile_row * CHUNK_WIDTH;
                row[cx * CHUNK_WIDTH..(cx + 1) * CHUNK_WIDTH]
                    .copy_from_slice(&chunk.pixels[src..src + CHUNK_WIDTH]);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_color::BlockColor;

    fn chunk_scratch(x: i32, z: i32, color: Rgba) -> ChunkScratch {
        ChunkScratch {
            x,
            z,
            palette: vec![color],
            pixels: vec![color; CHUNK_WIDTH * CHUNK_WIDTH],
        }
    }

    fn settings(mode: RenderMode) -> RenderSettings {
        RenderSettings {
            mode,
            output: std::env::temp_dir()
                .join(format!("pixelmap_regionstage_{}", rand::random::<u64>())),
            colors: BlockColor::default(),
        }
    }

    #[test]
    fn image_mode_places_chunks() {
        let settings = settings(RenderMode::Image);
        let red = Rgba::opaque(255, 0, 0);
        let blue = Rgba::opaque(0, 0, 255);
        let (scratch, drawn) = render_region(
            0,
            0,
            vec![chunk_scratch(0, 0, red), chunk_scratch(2, 1, blue)],
            &settings,
        )
        .unwrap();
        assert_eq!(drawn, 2);
        assert_eq!(scratch.pixels.len(), REGION_WIDTH * REGION_WIDTH);
        assert_eq!(scratch.pixels[0], red);
        // Chunk (2,1): pixel at (2*16, 1*16).
        assert_eq!(scratch.pixels[16 * REGION_WIDTH + 32], blue);
        // Untouched area stays transparent.
        assert_eq!(scratch.pixels[200 * REGION_WIDTH + 200], Rgba::TRANSPARENT);
    }

    #[test]
    fn negative_coordinates_wrap_into_slots() {
        let settings = settings(RenderMode::Image);
        let red = Rgba::opaque(255, 0, 0);
        // Chunk (-1, -1) is the bottom-right chunk of region (-1, -1).
        let (scratch, _) =
            render_region(-1, -1, vec![chunk_scratch(-1, -1, red)], &settings).unwrap();
        let last = (31 * CHUNK_WIDTH) * REGION_WIDTH + 31 * CHUNK_WIDTH;
        assert_eq!(scratch.pixels[last], red);
    }

    #[test]
    fn region_mode_writes_png_and_no_scratch() {
        let settings = settings(RenderMode::Region);
        std::fs::create_dir_all(&settings.output).unwrap();
        let (scratch, drawn) = render_region(
            3,
            -2,
            vec![chunk_scratch(96, -64, Rgba::opaque(1, 2, 3))],
            &settings,
        )
        .unwrap();
        assert_eq!(drawn, 1);
        assert!(!scratch.has_data());
        assert!(settings.output.join("r.3.-2.png").is_file());
        std::fs::remove_dir_all(&settings.output).ok();
    }

    #[test]
    fn empty_region_mode_writes_nothing() {
        let settings = settings(RenderMode::Region);
        std::fs::create_dir_all(&settings.output).unwrap();
        let (_, drawn) = render_region(0, 0, Vec::new(), &settings).unwrap();
        assert_eq!(drawn, 0);
        assert!(!settings.output.join("r.0.0.png").exists());
        std::fs::remove_dir_all(&settings.output).ok();
    }

    #[test]
    fn chunk_tiny_packs_one_pixel_per_chunk() {
        let settings = settings(RenderMode::ChunkTiny);
        let mut chunk = chunk_scratch(1, 0, Rgba::opaque(9, 9, 9));
        chunk.pixels = vec![Rgba::opaque(9, 9, 9)];
        let (scratch, _) = render_region(0, 0, vec![chunk], &settings).unwrap();
        assert_eq!(scratch.pixels.len(), REGION_CHUNKS * REGION_CHUNKS);
        assert_eq!(scratch.pixels[1], Rgba::opaque(9, 9, 9));
    }

    #[test]
    fn direct_mode_keeps_chunk_rows() {
        let settings = settings(RenderMode::ImageDirect);
        let red = Rgba::opaque(255, 0, 0);
        let (scratch, _) = render_region(0, 0, vec![chunk_scratch(5, 7, red)], &settings).unwrap();
        assert!(scratch.has_data());
        assert_eq!(scratch.chunk_pixels[7 * REGION_CHUNKS + 5].len(), 256);
        assert!(scratch.chunk_pixels[0].is_empty());
    }
}
