//! Region file containers: Anvil `r.X.Z.mca` and Beta/McRegion `r.X.Z.mcr`.
//!
//! A region file holds up to 32x32 chunks behind two 4096-byte header
//! sectors: 1024 packed `(offset:24 BE, sector_count:8)` entries followed by
//! 1024 big-endian timestamps. The file body is cached as one `Bytes`
//! buffer so chunk blobs are reference-counted slices and the file handle
//! can close immediately.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use pixelmap_codec::endian;

use crate::fd::FdGate;
use crate::WorldError;

pub const SECTOR: usize = 4096;
pub const HEADER_SECTORS: u32 = 2;
pub const REGION_CHUNKS: usize = 1024;
/// Chunks per region edge.
pub const REGION_WIDTH: i32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Anvil,
    Beta,
}

impl RegionKind {
    pub fn extension(self) -> &'static str {
        match self {
            RegionKind::Anvil => "mca",
            RegionKind::Beta => "mcr",
        }
    }
}

/// Chunk payload compression, from the byte ahead of the payload. The top
/// bit (external `.mcc` storage) is stripped before this mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    Raw,
    Gzip,
    Zlib,
    Uncompressed,
    Lz4,
    /// Named custom algorithm (127); recognised but not decodable.
    Custom,
    Unknown(u8),
}

impl CompressionKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Raw,
            1 => Self::Gzip,
            2 => Self::Zlib,
            3 => Self::Uncompressed,
            4 => Self::Lz4,
            127 => Self::Custom,
            other => Self::Unknown(other),
        }
    }
}

/// One chunk's compressed payload, positioned in world chunk coordinates.
#[derive(Debug, Clone)]
pub struct ChunkBlob {
    pub x: i32,
    pub z: i32,
    pub kind: CompressionKind,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, Default)]
struct HeaderEntry {
    offset: u32,
    sectors: u8,
    #[allow(dead_code)]
    timestamp: i32,
}

/// A single region file. Opened lazily: `load_header` reads the two header
/// sectors, `load_data` pulls the body into memory for chunk extraction.
pub struct RegionFile {
    pub x: i32,
    pub z: i32,
    kind: RegionKind,
    dir: PathBuf,
    headers: Vec<HeaderEntry>,
    cache: Option<Bytes>,
    chunk_count: usize,
}

impl RegionFile {
    pub fn new(x: i32, z: i32, kind: RegionKind, dir: PathBuf) -> Self {
        Self { x, z, kind, dir, headers: Vec::new(), cache: None, chunk_count: 0 }
    }

    pub fn file_name(&self) -> String {
        format!("r.{}.{}.{}", self.x, self.z, self.kind.extension())
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(self.file_name())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn header_loaded(&self) -> bool {
        !self.headers.is_empty()
    }

    /// Read the offset and timestamp tables.
    pub fn load_header(&mut self, gate: &FdGate) -> Result<(), WorldError> {
        if self.header_loaded() {
            return Ok(());
        }
        let _permit = gate.acquire();
        let mut file = File::open(self.path())?;

        let mut table = [0u8; SECTOR];
        file.read_exact(&mut table).map_err(|_| WorldError::TruncatedHeader)?;
        let mut headers = vec![HeaderEntry::default(); REGION_CHUNKS];
        let mut count = 0usize;
        for (i, header) in headers.iter_mut().enumerate() {
            header.offset = endian::u24_be(&table[i * 4..]);
            header.sectors = table[i * 4 + 3];
            if header.offset >= HEADER_SECTORS {
                count += 1;
            }
        }
        file.read_exact(&mut table).map_err(|_| WorldError::TruncatedHeader)?;
        for (i, header) in headers.iter_mut().enumerate() {
            header.timestamp = endian::i32_be(&table[i * 4..]);
        }

        self.headers = headers;
        self.chunk_count = count;
        Ok(())
    }

    /// Cache the file body past the header sectors.
    pub fn load_data(&mut self, gate: &FdGate) -> Result<(), WorldError> {
        if self.cache.is_some() {
            return Ok(());
        }
        self.load_header(gate)?;
        let _permit = gate.acquire();
        let mut file = File::open(self.path())?;
        file.seek(SeekFrom::Start((SECTOR * HEADER_SECTORS as usize) as u64))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.cache = Some(Bytes::from(buf));
        Ok(())
    }

    /// Drop the cached body. Outstanding blobs keep their slices alive.
    pub fn release(&mut self) {
        self.cache = None;
    }

    pub fn contains_chunk(&self, cx: i32, cz: i32) -> bool {
        let i = ((cx & 31) + ((cz & 31) << 5)) as usize;
        self.headers.get(i).map_or(false, |h| h.offset >= HEADER_SECTORS)
    }

    /// Extract the blob for one header slot. `None` for unpopulated slots.
    pub fn chunk(&self, index: usize, gate: &FdGate) -> Result<Option<ChunkBlob>, WorldError> {
        let header = match self.headers.get(index) {
            Some(h) if h.offset >= HEADER_SECTORS => *h,
            _ => return Ok(None),
        };
        let cache = self.cache.as_ref().ok_or(WorldError::ChunkBounds)?;

        let offset = (header.offset - HEADER_SECTORS) as usize * SECTOR;
        if offset + 5 > cache.len() {
            return Err(WorldError::ChunkBounds);
        }
        let length = endian::u32_be(&cache[offset..]) as usize;
        if length == 0 || offset + 4 + length > cache.len() {
            return Err(WorldError::ChunkBounds);
        }
        if length + 4 > SECTOR * header.sectors as usize {
            return Err(WorldError::SectorBounds);
        }

        let cx = self.x * REGION_WIDTH + (index as i32 & 31);
        let cz = self.z * REGION_WIDTH + (index as i32 >> 5);
        let compression = cache[offset + 4];

        // Oversized chunks move their payload to a sibling c.X.Z.mcc file;
        // the header keeps the compression kind in the low seven bits.
        if compression & 0x80 != 0 {
            let kind = CompressionKind::from_byte(compression & 0x7F);
            let path = self.dir.join(format!("c.{}.{}.mcc", cx, cz));
            let _permit = gate.acquire();
            let data = std::fs::read(&path)?;
            return Ok(Some(ChunkBlob { x: cx, z: cz, kind, data: Bytes::from(data) }));
        }

        Ok(Some(ChunkBlob {
            x: cx,
            z: cz,
            kind: CompressionKind::from_byte(compression),
            data: cache.slice(offset + 5..offset + 4 + length),
        }))
    }

    /// Header-only stand-in for detector tests.
    #[cfg(test)]
    pub(crate) fn fake(x: i32, z: i32, populated: &[(i32, i32)]) -> Self {
        let mut file = Self::new(x, z, RegionKind::Anvil, PathBuf::new());
        file.headers = vec![HeaderEntry::default(); REGION_CHUNKS];
        for &(cx, cz) in populated {
            let i = ((cx & 31) + ((cz & 31) << 5)) as usize;
            file.headers[i].offset = HEADER_SECTORS;
            file.headers[i].sectors = 1;
            file.chunk_count += 1;
        }
        file
    }

    /// Indices of the populated header slots.
    pub fn populated(&self) -> impl Iterator<Item = usize> + '_ {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.offset >= HEADER_SECTORS)
            .map(|(i, _)| i)
    }
}

/// Parse `r.<x>.<z>.<ext>`, rejecting anything else.
fn parse_region_name(name: &str, ext: &str) -> Option<(i32, i32)> {
    let rest = name.strip_prefix("r.")?;
    let rest = rest.strip_suffix(ext)?;
    let rest = rest.strip_suffix('.')?;
    let (x, z) = rest.split_once('.')?;
    Some((x.parse().ok()?, z.parse().ok()?))
}

/// Discover every region file of one kind in a directory, sorted by
/// coordinates so work is scheduled deterministically.
pub fn scan(path: &Path, kind: RegionKind) -> Result<Vec<RegionFile>, WorldError> {
    if !path.is_dir() {
        return Err(WorldError::NotADirectory(path.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((x, z)) = parse_region_name(name, kind.extension()) {
            files.push(RegionFile::new(x, z, kind, path.to_path_buf()));
        }
    }
    files.sort_by_key(|f| (f.x, f.z));
    Ok(files)
}
