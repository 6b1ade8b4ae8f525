//! Block passes: per-column pixel production over a chunk.
//!
//! A chain always starts with the default pass (heightmap lookup) and is
//! then extended from the render options; every pass mutates the shared
//! position/color state in place.

use pixelmap_world::Chunk;

use crate::color::{blend_weighted, interpolate, BlendMode, Rgba};
use crate::ray::{Ray, Vec3};

/// State threaded through one column's pass chain.
pub struct BlockPassData<'a> {
    pub palette: &'a [Rgba],
    pub chunk: &'a Chunk,
    pub dir: Vec3,
    pub pos: Vec3,
    pub color: Rgba,
}

impl BlockPassData<'_> {
    fn tile_color(&self, pos: Vec3) -> Rgba {
        let tile = self.chunk.tile(pos.x.floor() as i32, pos.y.floor() as i32, pos.z.floor() as i32);
        self.palette.get(tile.index as usize).copied().unwrap_or(Rgba::TRANSPARENT)
    }

    fn in_column(&self, y: f32) -> bool {
        let y = y.floor() as i32;
        y >= self.chunk.min_y() && y <= self.chunk.max_y()
    }

    fn below_column(&self, y: f32) -> bool {
        (y.floor() as i32) < self.chunk.min_y()
    }
}

/// Linear projection of `p` from `[a1, b1]` onto `[a2, b2]`.
fn proj(p: f32, a1: f32, b1: f32, a2: f32, b2: f32) -> f32 {
    if b1 == a1 {
        return a2;
    }
    ((p - a1) / (b1 - a1)) * (b2 - a2) + a2
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockPass {
    Default,
    Opaque,
    Blend(BlendMode),
    Heightmap,
    Gray,
    ColorGradient,
    Heightline(i32),
    Night,
    Slice(i32),
    Cave,
}

impl BlockPass {
    pub fn apply(&self, data: &mut BlockPassData<'_>) {
        match *self {
            BlockPass::Default => default_pass(data),
            BlockPass::Opaque => opaque_pass(data),
            BlockPass::Blend(mode) => blend_pass(data, mode),
            BlockPass::Heightmap => heightmap_pass(data),
            BlockPass::Gray => gray_pass(data),
            BlockPass::ColorGradient => gradient_pass(data),
            BlockPass::Heightline(frequency) => heightline_pass(data, frequency),
            BlockPass::Night => night_pass(data),
            BlockPass::Slice(y) => slice_pass(data, y),
            BlockPass::Cave => cave_pass(data),
        }
    }
}

/// Drop to the column's surface from the cached heightmap and take that
/// tile's color. Without a heightmap the ray starts at the chunk top and
/// the opacity pass finds the surface.
fn default_pass(data: &mut BlockPassData<'_>) {
    let x = data.pos.x.floor() as i32;
    let z = data.pos.z.floor() as i32;
    match data.chunk.height(x, z) {
        Some(h) => {
            data.pos.y = (h - 1) as f32;
            if data.below_column(data.pos.y) {
                return;
            }
        }
        None => {
            if data.chunk.max_y() < data.chunk.min_y() {
                return;
            }
            data.pos.y = data.chunk.max_y() as f32;
        }
    }
    data.color = data.tile_color(data.pos);
}

/// Walk down to the first block that draws anything and force it opaque.
fn opaque_pass(data: &mut BlockPassData<'_>) {
    let mut block = data.color;
    let mut ray = Ray::new(data.pos, data.dir);
    while data.in_column(data.pos.y) {
        block = data.tile_color(data.pos);
        if block.has_color() || block.a == 255 {
            break;
        }
        data.pos = ray.next();
    }
    data.color = if data.below_column(data.pos.y) { Rgba::TRANSPARENT } else { block };
    if data.color.has_color() {
        data.color.a = 255;
    }
}

/// Walk down while the accumulated alpha is translucent, compositing each
/// tile through the configured mode.
fn blend_pass(data: &mut BlockPassData<'_>, mode: BlendMode) {
    let mut block = data.color;
    let mut curr = data.color;
    let mut ray = Ray::new(data.pos, data.dir);
    while curr.a < 255 && data.in_column(data.pos.y) {
        curr = data.tile_color(data.pos);
        block = mode.apply(curr, block);
        data.pos = ray.next();
    }
    data.color = if data.below_column(data.pos.y) { Rgba::TRANSPARENT } else { block };
}

/// Darken with altitude.
fn heightmap_pass(data: &mut BlockPassData<'_>) {
    let y = proj(
        data.pos.y,
        data.chunk.min_y() as f32,
        data.chunk.max_y() as f32,
        0.0,
        255.0,
    );
    data.color = blend_weighted(Rgba::new(0, 0, 0, 127), data.color, y as i32);
}

/// Replace the color with a grey level derived from altitude.
fn gray_pass(data: &mut BlockPassData<'_>) {
    let y = proj(
        data.pos.y,
        data.chunk.min_y() as f32,
        data.chunk.max_y() as f32,
        0.0,
        255.0,
    )
    .clamp(0.0, 255.0) as u8;
    data.color = Rgba::opaque(y, y, y);
}

const GRADIENT: [Rgba; 6] = [
    Rgba::opaque(0x7F, 0x00, 0xFF), // violet
    Rgba::opaque(0x00, 0x00, 0xFF), // blue
    Rgba::opaque(0x00, 0xFF, 0xFF), // cyan
    Rgba::opaque(0x00, 0xFF, 0x00), // green
    Rgba::opaque(0xFF, 0xFF, 0x00), // yellow
    Rgba::opaque(0xFF, 0x00, 0x00), // red
];

/// Replace the color with a five-segment blue-to-red altitude gradient.
fn gradient_pass(data: &mut BlockPassData<'_>) {
    let t = proj(
        data.pos.y,
        data.chunk.min_y() as f32,
        data.chunk.max_y() as f32,
        0.0,
        255.0,
    )
    .clamp(0.0, 255.0);
    let step = 256.0 / 5.0;
    let bin = ((t / step) as usize).min(4);
    let norm = (t - bin as f32 * step) / step;
    data.color = interpolate(GRADIENT[bin], GRADIENT[bin + 1], norm);
}

/// Darken every `frequency` levels of altitude.
fn heightline_pass(data: &mut BlockPassData<'_>, frequency: i32) {
    if frequency > 0 && (data.pos.y.floor() as i32).rem_euclid(frequency) == 0 {
        data.color = blend_weighted(Rgba::new(0, 0, 0, 128), data.color, 160);
    }
}

/// Darken by the block light of the tile above the surface.
fn night_pass(data: &mut BlockPassData<'_>) {
    let above = data.pos - data.dir;
    let tile = data.chunk.tile(
        above.x.floor() as i32,
        above.y.floor() as i32,
        above.z.floor() as i32,
    );
    let light = 0.9f32.powi(i32::from(15 - tile.block_light()));
    data.color = interpolate(data.color, Rgba::opaque(0, 0, 0), 1.0 - light);
}

/// Clamp the ray start to a fixed altitude and take that tile's color.
fn slice_pass(data: &mut BlockPassData<'_>, y: i32) {
    if data.pos.y > y as f32 {
        data.pos.y = y as f32;
    }
    data.color = data.tile_color(data.pos);
}

/// Walk through the first contiguous opaque layer and render the first
/// open layer below it.
fn cave_pass(data: &mut BlockPassData<'_>) {
    let mut above = true;
    let mut c = Rgba::TRANSPARENT;
    let mut prev: u8 = 0;
    let mut ray = Ray::new(data.pos, data.dir);
    while (c.a < 255 || above) && !data.below_column(data.pos.y) {
        if c.a > prev {
            prev = c.a;
        }
        data.pos = ray.next();
        c = data.tile_color(data.pos);
        if prev == 255 && c.a < 255 {
            above = false;
        }
    }
    if data.below_column(data.pos.y) {
        c = Rgba::TRANSPARENT;
    }
    data.color = c;
}

/// Color replacement mode from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Default,
    Gray,
    Color,
}

impl ColorMode {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "default" => Self::Default,
            "gray" => Self::Gray,
            "color" => Self::Color,
            _ => return None,
        })
    }
}

/// Pass-chain options distilled from the render configuration.
#[derive(Debug, Clone)]
pub struct PassOptions {
    pub color_mode: ColorMode,
    pub blend: BlendMode,
    pub opaque: bool,
    pub slice: Option<i32>,
    pub heightline: Option<i32>,
    pub height_gradient: bool,
    pub night: bool,
    pub cave: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::Default,
            blend: BlendMode::Legacy,
            opaque: false,
            slice: None,
            heightline: None,
            height_gradient: false,
            night: false,
            cave: false,
        }
    }
}

/// Assemble the active chain: default first, slice before cave, opacity
/// policy is opaque or blend, and the gray/color modes exclude the
/// gradient, heightline and night decorations.
pub fn build_chain(options: &PassOptions) -> Vec<BlockPass> {
    let mut passes = vec![BlockPass::Default];
    if let Some(y) = options.slice {
        passes.push(BlockPass::Slice(y));
    }
    if options.cave {
        passes.push(BlockPass::Cave);
    }
    passes.push(if options.opaque {
        BlockPass::Opaque
    } else {
        BlockPass::Blend(options.blend)
    });
    match options.color_mode {
        ColorMode::Gray => passes.push(BlockPass::Gray),
        ColorMode::Color => passes.push(BlockPass::ColorGradient),
        ColorMode::Default => {
            if options.height_gradient {
                passes.push(BlockPass::Heightmap);
            }
            if let Some(n) = options.heightline {
                if n > 0 && n < 256 {
                    passes.push(BlockPass::Heightline(n));
                }
            }
            if options.night {
                passes.push(BlockPass::Night);
            }
        }
    }
    passes
}

/// Run a chain over one column state.
pub fn run_chain(chain: &[BlockPass], data: &mut BlockPassData<'_>) {
    for pass in chain {
        pass.apply(data);
    }
}
