//! Render configuration: an explicit struct for every recognised option
//! plus a free-form extras map for plugin-style arguments.

use std::collections::BTreeMap;
use std::path::PathBuf;

use pixelmap_render::{BlendMode, ColorMode, PassOptions, RenderMode};

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Worker count; defaults to the available parallelism, clamped so a
    /// descriptor remains free per worker.
    pub threads: Option<usize>,
    pub dimension: i32,
    /// Block color file; the built-in table when absent.
    pub colors: Option<PathBuf>,
    /// Light-source file for night rendering; built-in table when absent.
    pub lightsource: Option<PathBuf>,
    pub mode: ColorMode,
    pub blend: BlendMode,
    pub slice: Option<i32>,
    pub heightline: Option<i32>,
    pub opaque: bool,
    pub height_gradient: bool,
    pub night: bool,
    pub image: RenderMode,
    pub cave: bool,
    pub no_lonely: bool,
    /// Uninterpreted key/value arguments, e.g. for external pass pipelines.
    pub extras: BTreeMap<String, String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            threads: None,
            dimension: 0,
            colors: None,
            lightsource: None,
            mode: ColorMode::Default,
            blend: BlendMode::Legacy,
            slice: None,
            heightline: None,
            opaque: false,
            height_gradient: false,
            night: false,
            image: RenderMode::Image,
            cave: false,
            no_lonely: false,
            extras: BTreeMap::new(),
        }
    }
}

impl RenderConfig {
    pub fn pass_options(&self) -> PassOptions {
        PassOptions {
            color_mode: self.mode,
            blend: self.blend,
            opaque: self.opaque,
            slice: self.slice,
            heightline: self.heightline,
            height_gradient: self.height_gradient,
            night: self.night,
            cave: self.cave,
        }
    }

    pub fn effective_threads(&self, fd_capacity: usize) -> usize {
        let requested = self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        });
        requested.max(1).min(fd_capacity.saturating_sub(1).max(1))
    }
}

/// Output granularity names as accepted on the command line.
pub fn image_mode_from_name(name: &str) -> Option<RenderMode> {
    Some(match name {
        "chunk" => RenderMode::Chunk,
        "region" | "map" => RenderMode::Region,
        "image" => RenderMode::Image,
        "image_direct" | "direct" => RenderMode::ImageDirect,
        "tiny_chunk" => RenderMode::ChunkTiny,
        "tiny_region" => RenderMode::RegionTiny,
        _ => return None,
    })
}
