//! Anvil chunk decoding across the four on-disk generations.
//!
//! A chunk is parsed twice: a cheap pre-scan pulls out `DataVersion` (or the
//! Beta-era `V` byte) and fixes the palette kind, then the matching
//! generation visitor extracts sections, palettes, lights and heightmaps.

use std::collections::HashMap;

use pixelmap_codec::nibble::{unpack_packed, unpack_spanning};
use pixelmap_nbt::{Tag, Visitor};

use crate::chunk::{BlockOrder, Chunk, PaletteKind, Section, SECTION_AREA, SECTION_TILES};
use crate::palette::{translate_ids, translate_names, IdTable};

// https://minecraft.wiki/w/Data_version
pub const DATA_VERSION_1_13: i32 = 1444;
pub const DATA_VERSION_1_16: i32 = 2566;
pub const DATA_VERSION_1_18: i32 = 2860;

/// Pre-scan visitor: only the data version and position, everything else
/// skipped without decoding.
pub struct VersionScan<'c> {
    chunk: &'c mut Chunk,
}

impl<'c> VersionScan<'c> {
    pub fn new(chunk: &'c mut Chunk) -> Self {
        Self { chunk }
    }
}

impl Visitor for VersionScan<'_> {
    fn tag(&mut self, tag: &Tag<'_>) -> bool {
        if tag.name.is_empty() || tag.is_name("Level") {
            return false;
        }
        if self.chunk.data_version() == 0 && tag.is_name("V") {
            self.chunk.set_data_version(tag.value.as_i32().unwrap_or(0));
            self.chunk.set_palette_kind(PaletteKind::BlockId);
        } else if tag.is_name("DataVersion") {
            let dv = tag.value.as_i32().unwrap_or(0);
            self.chunk.set_data_version(dv);
            self.chunk.set_palette_kind(if dv < DATA_VERSION_1_13 {
                PaletteKind::BlockId
            } else {
                PaletteKind::Namespace
            });
        }
        true
    }
}

/// The generation visitor matching a chunk's data version.
pub enum AnvilVisitor<'c> {
    V3(V3<'c>),
    V13(V13<'c>),
    V18(V18<'c>),
}

pub fn visitor_for(chunk: &mut Chunk) -> AnvilVisitor<'_> {
    let dv = chunk.data_version();
    if chunk.palette_kind() == PaletteKind::Unset {
        chunk.set_palette_kind(if dv < DATA_VERSION_1_13 {
            PaletteKind::BlockId
        } else {
            PaletteKind::Namespace
        });
    }
    if dv < DATA_VERSION_1_13 {
        AnvilVisitor::V3(V3::new(chunk))
    } else if dv < DATA_VERSION_1_18 {
        AnvilVisitor::V13(V13::new(chunk, dv < DATA_VERSION_1_16))
    } else {
        AnvilVisitor::V18(V18::new(chunk))
    }
}

impl Visitor for AnvilVisitor<'_> {
    fn tag(&mut self, tag: &Tag<'_>) -> bool {
        match self {
            AnvilVisitor::V3(v) => v.tag(tag),
            AnvilVisitor::V13(v) => v.tag(tag),
            AnvilVisitor::V18(v) => v.tag(tag),
        }
    }
}

fn collect_words(arr: &pixelmap_nbt::LongArray<'_>) -> Vec<u64> {
    arr.iter().map(|v| v as u64).collect()
}

/// Unpack a 16x16 heightmap from its packed long array.
fn unpack_heightmap(words: &[u64], spanning: bool, offset: i32) -> Vec<i32> {
    let bits = words.len() / (SECTION_AREA / 64);
    if bits == 0 {
        return Vec::new();
    }
    let mut raw = vec![0u16; SECTION_AREA];
    if spanning {
        unpack_spanning(words, &mut raw, bits);
    } else {
        unpack_packed(words, &mut raw, bits);
    }
    raw.into_iter().map(|v| i32::from(v) - offset).collect()
}

/// Pre-1.13 sections: flat 8-bit `Blocks` with the optional `Add` nibble
/// widening ids to 12 bits and `Data` in the top nibble.
pub struct V3<'c> {
    chunk: &'c mut Chunk,
    table: IdTable,
    blocks: Vec<u16>,
    y: i32,
    block_light: Option<Vec<u8>>,
    sky_light: Option<Vec<u8>>,
    sections_left: i32,
}

impl<'c> V3<'c> {
    pub fn new(chunk: &'c mut Chunk) -> Self {
        Self {
            chunk,
            table: IdTable::new(),
            blocks: Vec::new(),
            y: 0,
            block_light: None,
            sky_light: None,
            sections_left: 0,
        }
    }

    fn flush_section(&mut self) {
        let mut blocks = std::mem::take(&mut self.blocks);
        let block_light = self.block_light.take();
        let sky_light = self.sky_light.take();
        if !blocks.is_empty() {
            let mut section = Section::new(self.y, BlockOrder::Yzx);
            if let Some(l) = block_light {
                section.set_block_light(&l);
            }
            if let Some(l) = sky_light {
                section.set_sky_light(&l);
            }
            translate_ids(self.chunk, section, &mut self.table, &mut blocks);
        }
        self.y = 0;
        self.sections_left -= 1;
    }

    fn blocks_mut(&mut self) -> &mut Vec<u16> {
        if self.blocks.is_empty() {
            self.blocks.resize(SECTION_TILES, 0);
        }
        &mut self.blocks
    }
}

impl Visitor for V3<'_> {
    fn tag(&mut self, tag: &Tag<'_>) -> bool {
        if self.sections_left > 0 {
            if tag.is_end() {
                self.flush_section();
            } else if tag.is_name("Y") {
                self.y = tag.value.as_i32().unwrap_or(0);
            } else if tag.is_name("BlockLight") {
                self.block_light = tag.value.as_byte_array().map(<[u8]>::to_vec);
            } else if tag.is_name("SkyLight") {
                self.sky_light = tag.value.as_byte_array().map(<[u8]>::to_vec);
            } else if tag.is_name("Blocks") {
                if let Some(d) = tag.value.as_byte_array() {
                    let blocks = self.blocks_mut();
                    for (i, &v) in d.iter().enumerate().take(SECTION_TILES) {
                        blocks[i] = (blocks[i] & 0xFF00) | u16::from(v);
                    }
                }
            } else if tag.is_name("Add") {
                if let Some(d) = tag.value.as_byte_array() {
                    let blocks = self.blocks_mut();
                    let n = (d.len() * 2).min(SECTION_TILES);
                    for (i, block) in blocks.iter_mut().enumerate().take(n) {
                        *block = (*block & 0xF0FF)
                            | (u16::from(pixelmap_codec::nibble::nibble4(d, i)) << 8);
                    }
                }
            } else if tag.is_name("Data") {
                if let Some(d) = tag.value.as_byte_array() {
                    let blocks = self.blocks_mut();
                    let n = (d.len() * 2).min(SECTION_TILES);
                    for (i, block) in blocks.iter_mut().enumerate().take(n) {
                        *block = (*block & 0x0FFF)
                            | (u16::from(pixelmap_codec::nibble::nibble4(d, i)) << 12);
                    }
                }
            }
        } else if tag.is_name("Sections") {
            self.sections_left = tag.value.list_len();
        } else if tag.is_name("xPos") {
            self.chunk.set_x(tag.value.as_i32().unwrap_or(0));
        } else if tag.is_name("zPos") {
            self.chunk.set_z(tag.value.as_i32().unwrap_or(0));
        } else if tag.is_name("HeightMap") {
            if let Some(arr) = tag.value.as_int_array() {
                self.chunk.set_heightmap(arr.to_vec());
            }
        } else if tag.is_name("Entities")
            || tag.is_name("PostProcessing")
            || tag.is_name("TileEntities")
            || tag.is_name("TileTicks")
        {
            return true;
        }
        false
    }
}

/// 1.13–1.17 sections: a `Palette` list of named compounds and packed
/// `BlockStates`, spanning words before 1.16 and per-word padded after.
pub struct V13<'c> {
    chunk: &'c mut Chunk,
    spanning: bool,
    seen: HashMap<String, u16>,
    names: Vec<String>,
    blocks: Vec<u16>,
    y: i32,
    block_light: Option<Vec<u8>>,
    sky_light: Option<Vec<u8>>,
    sections_left: i32,
    palettes_left: i32,
    in_heightmaps: bool,
}

impl<'c> V13<'c> {
    pub fn new(chunk: &'c mut Chunk, spanning: bool) -> Self {
        Self {
            chunk,
            spanning,
            seen: HashMap::new(),
            names: Vec::new(),
            blocks: Vec::new(),
            y: 0,
            block_light: None,
            sky_light: None,
            sections_left: 0,
            palettes_left: 0,
            in_heightmaps: false,
        }
    }

    fn flush_section(&mut self) {
        let names = std::mem::take(&mut self.names);
        let mut blocks = std::mem::take(&mut self.blocks);
        let block_light = self.block_light.take();
        let sky_light = self.sky_light.take();
        if !names.is_empty() && !blocks.is_empty() {
            let mut section = Section::new(self.y, BlockOrder::Yzx);
            if let Some(l) = block_light {
                section.set_block_light(&l);
            }
            if let Some(l) = sky_light {
                section.set_sky_light(&l);
            }
            translate_names(self.chunk, section, &mut self.seen, &mut blocks, names);
        }
        self.y = 0;
        self.sections_left -= 1;
    }
}

impl Visitor for V13<'_> {
    fn tag(&mut self, tag: &Tag<'_>) -> bool {
        if self.in_heightmaps {
            if tag.is_end() {
                self.in_heightmaps = false;
            } else if tag.is_name("WORLD_SURFACE") {
                if let Some(arr) = tag.value.as_long_array() {
                    let words = collect_words(&arr);
                    self.chunk.set_heightmap(unpack_heightmap(&words, self.spanning, 0));
                }
            }
        } else if self.palettes_left > 0 {
            if tag.is_end() {
                self.palettes_left -= 1;
            } else if tag.is_name("Name") {
                if let Some(name) = tag.value.as_str() {
                    self.names.push(name.to_string());
                }
            } else if tag.is_name("Properties") {
                return true;
            }
        } else if self.sections_left > 0 {
            if tag.is_end() {
                self.flush_section();
            } else if tag.is_name("Y") {
                self.y = tag.value.as_i32().unwrap_or(0);
            } else if tag.is_name("BlockLight") {
                self.block_light = tag.value.as_byte_array().map(<[u8]>::to_vec);
            } else if tag.is_name("SkyLight") {
                self.sky_light = tag.value.as_byte_array().map(<[u8]>::to_vec);
            } else if tag.is_name("Palette") {
                self.palettes_left = tag.value.list_len();
                self.names.reserve(self.palettes_left as usize);
            } else if tag.is_name("BlockStates") {
                if let Some(arr) = tag.value.as_long_array() {
                    let words = collect_words(&arr);
                    let bits = words.len() / (SECTION_TILES / 64);
                    if bits > 0 {
                        self.blocks.resize(SECTION_TILES, 0);
                        if self.spanning {
                            unpack_spanning(&words, &mut self.blocks, bits);
                        } else {
                            unpack_packed(&words, &mut self.blocks, bits);
                        }
                    }
                }
            }
        } else if tag.is_name("Sections") {
            self.sections_left = tag.value.list_len();
        } else if tag.is_name("xPos") {
            self.chunk.set_x(tag.value.as_i32().unwrap_or(0));
        } else if tag.is_name("zPos") {
            self.chunk.set_z(tag.value.as_i32().unwrap_or(0));
        } else if tag.is_name("Heightmaps") {
            self.in_heightmaps = true;
        } else if tag.is_name("Structures")
            || tag.is_name("CarvingMasks")
            || tag.is_name("Entities")
            || tag.is_name("PostProcessing")
            || tag.is_name("TileEntities")
            || tag.is_name("TileTicks")
        {
            return true;
        }
        false
    }
}

/// 1.18+ chunks: sections live under lowercase `sections` with a nested
/// `block_states` compound; a one-entry palette has no `data` field and the
/// heightmap carries a 64-block offset.
pub struct V18<'c> {
    chunk: &'c mut Chunk,
    seen: HashMap<String, u16>,
    names: Vec<String>,
    words: Vec<u64>,
    y: i32,
    block_light: Option<Vec<u8>>,
    sky_light: Option<Vec<u8>>,
    sections_left: i32,
    palettes_left: i32,
    in_heightmaps: bool,
    in_block_states: bool,
}

impl<'c> V18<'c> {
    pub fn new(chunk: &'c mut Chunk) -> Self {
        Self {
            chunk,
            seen: HashMap::new(),
            names: Vec::new(),
            words: Vec::new(),
            y: 0,
            block_light: None,
            sky_light: None,
            sections_left: 0,
            palettes_left: 0,
            in_heightmaps: false,
            in_block_states: false,
        }
    }

    fn flush_section(&mut self) {
        let names = std::mem::take(&mut self.names);
        let words = std::mem::take(&mut self.words);
        let block_light = self.block_light.take();
        let sky_light = self.sky_light.take();
        if !names.is_empty() {
            let mut blocks = if names.len() == 1 {
                vec![0u16]
            } else {
                let bits = words.len() / (SECTION_TILES / 64);
                let mut blocks = vec![0u16; SECTION_TILES];
                if bits > 0 {
                    unpack_packed(&words, &mut blocks, bits);
                }
                blocks
            };
            let mut section = Section::new(self.y, BlockOrder::Yzx);
            if let Some(l) = block_light {
                section.set_block_light(&l);
            }
            if let Some(l) = sky_light {
                section.set_sky_light(&l);
            }
            translate_names(self.chunk, section, &mut self.seen, &mut blocks, names);
        }
        self.y = 0;
        self.sections_left -= 1;
    }
}

impl Visitor for V18<'_> {
    fn tag(&mut self, tag: &Tag<'_>) -> bool {
        if self.in_heightmaps {
            if tag.is_end() {
                self.in_heightmaps = false;
            } else if tag.is_name("WORLD_SURFACE") {
                if let Some(arr) = tag.value.as_long_array() {
                    let words = collect_words(&arr);
                    self.chunk.set_heightmap(unpack_heightmap(&words, false, 64));
                }
            }
        } else if self.palettes_left > 0 {
            if tag.is_end() {
                self.palettes_left -= 1;
            } else if tag.is_name("Name") {
                if let Some(name) = tag.value.as_str() {
                    self.names.push(name.to_string());
                }
            } else if tag.is_name("Properties") {
                return true;
            }
        } else if self.in_block_states {
            if tag.is_end() {
                self.in_block_states = false;
            } else if tag.is_name("palette") {
                self.palettes_left = tag.value.list_len();
                self.names.reserve(self.palettes_left as usize);
            } else if tag.is_name("data") {
                if let Some(arr) = tag.value.as_long_array() {
                    self.words = collect_words(&arr);
                }
            }
        } else if self.sections_left > 0 {
            if tag.is_end() {
                self.flush_section();
            } else if tag.is_name("Y") {
                // Rarely an Int instead of a Byte.
                self.y = tag.value.as_i32().unwrap_or(0);
            } else if tag.is_name("BlockLight") {
                self.block_light = tag.value.as_byte_array().map(<[u8]>::to_vec);
            } else if tag.is_name("SkyLight") {
                self.sky_light = tag.value.as_byte_array().map(<[u8]>::to_vec);
            } else if tag.is_name("block_states") {
                self.in_block_states = true;
            } else if tag.is_name("biomes") {
                return true;
            }
        } else if tag.is_name("sections") {
            self.sections_left = tag.value.list_len();
        } else if tag.is_name("xPos") {
            self.chunk.set_x(tag.value.as_i32().unwrap_or(0));
        } else if tag.is_name("zPos") {
            self.chunk.set_z(tag.value.as_i32().unwrap_or(0));
        } else if tag.is_name("yPos") {
            self.chunk.set_y_base(tag.value.as_i32().unwrap_or(0));
        } else if tag.is_name("Heightmaps") {
            self.in_heightmaps = true;
        } else if tag.is_name("blending_data")
            || tag.is_name("block_entities")
            || tag.is_name("block_ticks")
            || tag.is_name("fluid_ticks")
            || tag.is_name("structures")
            || tag.is_name("CarvingMasks")
            || tag.is_name("Entities")
            || tag.is_name("Lights")
            || tag.is_name("PostProcessing")
        {
            return true;
        }
        false
    }
}
