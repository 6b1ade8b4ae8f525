//! Alpha saves: loose gzip-compressed `c.X.Z.dat` chunk files nested in two
//! levels of base-36 directories, plus the unpaletted 128-tall column
//! decoder that Beta region chunks share.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use pixelmap_codec::nibble::nibble4;
use pixelmap_nbt::{Tag, Visitor};

use crate::chunk::{BlockOrder, Chunk, PaletteKind, Section, SECTION_AREA, SECTION_TILES};
use crate::fd::FdGate;
use crate::palette::{translate_ids, IdTable};
use crate::WorldError;

/// Sections in a 128-tall column.
const COLUMN_SECTIONS: usize = 8;

/// One chunk file, already positioned from its name.
#[derive(Debug, Clone)]
pub struct AlphaFile {
    pub x: i32,
    pub z: i32,
    pub path: PathBuf,
}

impl AlphaFile {
    pub fn read(&self, gate: &FdGate) -> Result<Vec<u8>, WorldError> {
        let _permit = gate.acquire();
        let mut file = File::open(&self.path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

fn is_base36(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
}

fn base36(s: &str) -> Option<i32> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if !is_base36(digits) {
        return None;
    }
    let mut value: i64 = 0;
    for c in digits.chars() {
        let d = c.to_digit(36)? as i64;
        value = value * 36 + d;
        if value > i64::from(i32::MAX) {
            return None;
        }
    }
    Some(if neg { -(value as i32) } else { value as i32 })
}

/// Parse `c.<base36 x>.<base36 z>.dat`.
pub fn parse_chunk_name(name: &str) -> Option<(i32, i32)> {
    let rest = name.strip_prefix("c.")?;
    let rest = rest.strip_suffix(".dat")?;
    let (x, z) = rest.split_once('.')?;
    Some((base36(x)?, base36(z)?))
}

/// Walk the two base-36 directory levels and collect the chunk files.
pub fn scan(path: &Path) -> Result<Vec<AlphaFile>, WorldError> {
    if !path.is_dir() {
        return Err(WorldError::NotADirectory(path.to_path_buf()));
    }
    let mut files = Vec::new();
    for outer in std::fs::read_dir(path)? {
        let outer = outer?;
        if !outer.file_type()?.is_dir() {
            continue;
        }
        let Some(outer_name) = outer.file_name().to_str().map(String::from) else { continue };
        if !is_base36(&outer_name) {
            continue;
        }
        for inner in std::fs::read_dir(outer.path())? {
            let inner = inner?;
            if !inner.file_type()?.is_dir() {
                continue;
            }
            let Some(inner_name) = inner.file_name().to_str().map(String::from) else { continue };
            if !is_base36(&inner_name) {
                continue;
            }
            for entry in std::fs::read_dir(inner.path())? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    continue;
                }
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if let Some((x, z)) = parse_chunk_name(name) {
                    files.push(AlphaFile { x, z, path: entry.path() });
                }
            }
        }
    }
    files.sort_by_key(|f| (f.x, f.z));
    Ok(files)
}

/// Visitor for the unpaletted column layout (`Level` with flat `Blocks`,
/// `Data`, `BlockLight`, `SkyLight` byte arrays in XZY order). Used for
/// Alpha chunk files and Beta region chunks alike. Ids are promoted to
/// `(data << 12) | id` before palette compaction.
pub struct ColumnVisitor<'c> {
    chunk: &'c mut Chunk,
    table: IdTable,
    blocks: Vec<Vec<u16>>,
    block_light: Vec<Option<Vec<u8>>>,
    sky_light: Vec<Option<Vec<u8>>>,
    in_level: bool,
}

impl<'c> ColumnVisitor<'c> {
    pub fn new(chunk: &'c mut Chunk) -> Self {
        chunk.set_palette_kind(PaletteKind::BlockId);
        Self {
            chunk,
            table: IdTable::new(),
            blocks: vec![Vec::new(); COLUMN_SECTIONS],
            block_light: vec![None; COLUMN_SECTIONS],
            sky_light: vec![None; COLUMN_SECTIONS],
            in_level: false,
        }
    }

    /// Source index of the column layout for a position in section `n`.
    fn column_index(x: usize, y: usize, z: usize, n: usize) -> usize {
        (x << 11) | (z << 7) | (y + (n << 4))
    }

    /// Section-local YZX index.
    fn section_index(x: usize, y: usize, z: usize) -> usize {
        (y << 8) | (z << 4) | x
    }

    fn apply_blocks(&mut self, src: &[u8]) {
        for n in 0..COLUMN_SECTIONS {
            let b = &mut self.blocks[n];
            if b.is_empty() {
                b.resize(SECTION_TILES, 0);
            }
            for x in 0..16 {
                for y in 0..16 {
                    for z in 0..16 {
                        let si = Self::column_index(x, y, z, n);
                        if si >= src.len() {
                            continue;
                        }
                        let di = Self::section_index(x, y, z);
                        b[di] = (b[di] & 0xFF00) | u16::from(src[si]);
                    }
                }
            }
        }
    }

    fn apply_data(&mut self, src: &[u8]) {
        let count = src.len() * 2;
        for n in 0..COLUMN_SECTIONS {
            let b = &mut self.blocks[n];
            if b.is_empty() {
                b.resize(SECTION_TILES, 0);
            }
            for x in 0..16 {
                for y in 0..16 {
                    for z in 0..16 {
                        let si = Self::column_index(x, y, z, n);
                        if si >= count {
                            continue;
                        }
                        let di = Self::section_index(x, y, z);
                        b[di] = (b[di] & 0x0FFF) | (u16::from(nibble4(src, si)) << 12);
                    }
                }
            }
        }
    }

    fn unpack_light(src: &[u8], n: usize) -> Vec<u8> {
        let count = src.len() * 2;
        let mut out = vec![0u8; SECTION_TILES];
        for x in 0..16 {
            for y in 0..16 {
                for z in 0..16 {
                    let si = Self::column_index(x, y, z, n);
                    if si >= count {
                        continue;
                    }
                    out[Self::section_index(x, y, z)] = nibble4(src, si);
                }
            }
        }
        out
    }

    fn finish_level(&mut self) {
        for n in 0..COLUMN_SECTIONS {
            let mut blocks = std::mem::take(&mut self.blocks[n]);
            if blocks.is_empty() {
                continue;
            }
            let mut section = Section::new(n as i32, BlockOrder::Yzx);
            if let Some(light) = self.block_light[n].take() {
                section.update_block_light(&light);
            }
            if let Some(light) = self.sky_light[n].take() {
                section.update_sky_light(&light);
            }
            translate_ids(self.chunk, section, &mut self.table, &mut blocks);
        }
        self.in_level = false;
    }
}

impl Visitor for ColumnVisitor<'_> {
    fn tag(&mut self, tag: &Tag<'_>) -> bool {
        if self.in_level {
            if tag.is_end() {
                self.finish_level();
            } else if tag.is_name("xPos") {
                self.chunk.set_x(tag.value.as_i32().unwrap_or(0));
            } else if tag.is_name("zPos") {
                self.chunk.set_z(tag.value.as_i32().unwrap_or(0));
            } else if tag.is_name("Blocks") {
                if let Some(src) = tag.value.as_byte_array() {
                    self.apply_blocks(src);
                }
            } else if tag.is_name("Data") {
                if let Some(src) = tag.value.as_byte_array() {
                    self.apply_data(src);
                }
            } else if tag.is_name("BlockLight") {
                if let Some(src) = tag.value.as_byte_array() {
                    for n in 0..COLUMN_SECTIONS {
                        self.block_light[n] = Some(Self::unpack_light(src, n));
                    }
                }
            } else if tag.is_name("SkyLight") {
                if let Some(src) = tag.value.as_byte_array() {
                    for n in 0..COLUMN_SECTIONS {
                        self.sky_light[n] = Some(Self::unpack_light(src, n));
                    }
                }
            } else if tag.is_name("HeightMap") {
                if let Some(src) = tag.value.as_byte_array() {
                    let hm: Vec<i32> =
                        src.iter().take(SECTION_AREA).map(|&b| i32::from(b as i8)).collect();
                    self.chunk.set_heightmap(hm);
                }
            } else {
                return true;
            }
            return false;
        }
        if tag.name.is_empty() && !tag.is_end() {
            return false;
        }
        if tag.is_name("Level") {
            self.in_level = true;
            return false;
        }
        true
    }
}
