//! Hand parser for the Bedrock LevelDB store.
//!
//! A save's `db/` directory holds immutable `.ldb` snapshot tables plus one
//! append-only `.log`. Tables are read through their footer (metaindex and
//! index block handles, 8-byte magic), the index block yields the data block
//! handles, and each block is a run of prefix-compressed key/value entries
//! terminated by a restart-offset array. Snapshots are ordered oldest-first
//! by file name so later tables override earlier ones during the world
//! merge; the log is newer than all of them.

use std::path::{Path, PathBuf};

use pixelmap_codec::compress::{inflate_zlib, inflate_zlib_raw};
use pixelmap_codec::endian;
use pixelmap_codec::varint::VarintCursor;
use tracing::debug;

use crate::WorldError;

const FOOTER_SIZE: usize = 48;
const MAGIC: u64 = 0xdb47_7524_8b80_fb57;

const LOG_BLOCK_SIZE: usize = 32 * 1024;
const LOG_HEADER_SIZE: usize = 7;

// Block compressor bytes.
const COMPRESSOR_RAW: u8 = 0;
const COMPRESSOR_SNAPPY: u8 = 1;
const COMPRESSOR_ZLIB: u8 = 2;
const COMPRESSOR_ZSTD: u8 = 3;
const COMPRESSOR_ZLIB_RAW: u8 = 4;

// Log record fragment types.
const RECORD_FULL: u8 = 1;
const RECORD_FIRST: u8 = 2;
const RECORD_MIDDLE: u8 = 3;
const RECORD_LAST: u8 = 4;

/// Chunk value kinds this renderer acts on. Other kinds exist and are
/// deliberately ignored.
pub const VALUE_DATA_3D: u8 = 43;
pub const VALUE_VERSION: u8 = 44;
pub const VALUE_DATA_2D: u8 = 45;
pub const VALUE_SUB_CHUNK_PREFIX: u8 = 47;
pub const VALUE_LEGACY_VERSION: u8 = 118;

/// A decoded chunk key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkKey {
    pub x: i32,
    pub z: i32,
    pub dimension: i32,
    pub kind: u8,
    /// Sub-chunk y index, present for `SubChunkPrefix` keys.
    pub index: Option<i8>,
}

/// Chunk keys come in eight fixed lengths; anything else (scoreboards,
/// player data, string-keyed metadata) is not a chunk.
pub fn is_chunk_key(key: &[u8]) -> bool {
    matches!(key.len(), 9 | 10 | 13 | 14 | 17 | 18 | 21 | 22)
}

/// Decode `x:i32 LE, z:i32 LE, [dimension:i32 LE,] kind:u8[, index:i8]`.
/// The dimension is present iff the key length is 13, 14, 21 or 22; the
/// sub-chunk index iff the length is even.
pub fn read_chunk_key(key: &[u8]) -> ChunkKey {
    let mut pos = 0usize;
    let x = endian::i32_le(&key[pos..]);
    pos += 4;
    let z = endian::i32_le(&key[pos..]);
    pos += 4;
    let dimension = if matches!(key.len(), 13 | 14 | 21 | 22) {
        let d = endian::i32_le(&key[pos..]);
        pos += 4;
        d
    } else {
        0
    };
    let kind = key[pos];
    pos += 1;
    let index = if key.len() % 2 == 0 { Some(key[pos] as i8) } else { None };
    ChunkKey { x, z, dimension, kind, index }
}

/// The files making up one store.
pub struct LevelDbDir {
    pub tables: Vec<PathBuf>,
    pub log: Option<PathBuf>,
}

/// Discover `.ldb` tables (sorted oldest-first by name) and the `.log`.
pub fn scan(path: &Path) -> Result<LevelDbDir, WorldError> {
    if !path.is_dir() {
        return Err(WorldError::NotADirectory(path.to_path_buf()));
    }
    let mut tables = Vec::new();
    let mut log = None;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("ldb") => tables.push(path),
            Some("log") => log = Some(path),
            _ => {}
        }
    }
    tables.sort();
    Ok(LevelDbDir { tables, log })
}

/// Outcome of a table parse: blocks whose compressor is unsupported are
/// skipped and counted rather than failing the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableSummary {
    pub skipped_blocks: usize,
}

fn read_block_handle(cur: &mut VarintCursor<'_>) -> Option<(u64, u64)> {
    let offset = cur.read_u64()?;
    let size = cur.read_u64()?;
    Some((offset, size))
}

/// Decompress one block given its trailing type byte.
fn load_block(kind: u8, data: &[u8]) -> Result<Vec<u8>, WorldError> {
    match kind {
        COMPRESSOR_RAW => Ok(data.to_vec()),
        COMPRESSOR_ZLIB => Ok(inflate_zlib(data)?),
        COMPRESSOR_ZLIB_RAW => Ok(inflate_zlib_raw(data)?),
        COMPRESSOR_SNAPPY | COMPRESSOR_ZSTD => {
            Err(WorldError::UnsupportedBlockCompression(kind))
        }
        other => Err(WorldError::UnsupportedBlockCompression(other)),
    }
}

/// Iterator over the prefix-compressed entries of a decompressed block.
struct BlockEntries<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    prev_key: Vec<u8>,
}

impl<'a> BlockEntries<'a> {
    /// The restart array and its count trail the entry data.
    fn new(block: &'a [u8]) -> Option<Self> {
        if block.len() < 4 {
            return None;
        }
        let num_restarts = endian::u32_le(&block[block.len() - 4..]) as usize;
        let trailer = num_restarts.checked_mul(4)?.checked_add(4)?;
        let end = block.len().checked_sub(trailer)?;
        Some(Self { data: block, pos: 0, end, prev_key: Vec::new() })
    }

    fn next_entry(&mut self) -> Option<(Vec<u8>, &'a [u8])> {
        if self.pos >= self.end {
            return None;
        }
        let mut cur = VarintCursor::new(&self.data[self.pos..self.end]);
        let shared = cur.read_u32()? as usize;
        let unshared = cur.read_u32()? as usize;
        let value_len = cur.read_u32()? as usize;
        let base = self.pos + cur.pos();
        if shared > self.prev_key.len() || base + unshared + value_len > self.end {
            return None;
        }
        let mut key = Vec::with_capacity(shared + unshared);
        key.extend_from_slice(&self.prev_key[..shared]);
        key.extend_from_slice(&self.data[base..base + unshared]);
        let value = &self.data[base + unshared..base + unshared + value_len];
        self.pos = base + unshared + value_len;
        self.prev_key = key.clone();
        Some((key, value))
    }
}

/// Parse one `.ldb` table, invoking `visit` per key/value entry.
pub fn parse_table(
    data: &[u8],
    mut visit: impl FnMut(&[u8], &[u8]),
) -> Result<TableSummary, WorldError> {
    if data.len() < FOOTER_SIZE {
        return Err(WorldError::TruncatedFooter);
    }
    let magic = endian::u64_le(&data[data.len() - 8..]);
    if magic != MAGIC {
        return Err(WorldError::BadMagic);
    }
    let footer = &data[data.len() - FOOTER_SIZE..];
    let mut cur = VarintCursor::new(footer);
    // Metaindex handle is present but unused here.
    cur.skip().ok_or(WorldError::TruncatedFooter)?;
    cur.skip().ok_or(WorldError::TruncatedFooter)?;
    let (index_offset, index_size) =
        read_block_handle(&mut cur).ok_or(WorldError::TruncatedFooter)?;

    let (index_offset, index_size) = (index_offset as usize, index_size as usize);
    if index_offset + index_size + 1 > data.len() {
        return Err(WorldError::BlockBounds);
    }
    let index_kind = data[index_offset + index_size];
    let index_block = load_block(index_kind, &data[index_offset..index_offset + index_size])?;

    // Collect the data block handles before touching any block, so a bad
    // handle fails the file early.
    let mut handles = Vec::new();
    let mut entries = BlockEntries::new(&index_block).ok_or(WorldError::BlockBounds)?;
    while let Some((_, value)) = entries.next_entry() {
        let mut cur = VarintCursor::new(value);
        let (offset, size) = read_block_handle(&mut cur).ok_or(WorldError::BlockBounds)?;
        handles.push((offset as usize, size as usize));
    }

    let mut summary = TableSummary::default();
    for (offset, size) in handles {
        if offset + size + 1 > data.len() {
            return Err(WorldError::BlockBounds);
        }
        let kind = data[offset + size];
        let block = match load_block(kind, &data[offset..offset + size]) {
            Ok(block) => block,
            Err(WorldError::UnsupportedBlockCompression(kind)) => {
                debug!(kind, "skipping block with unsupported compressor");
                summary.skipped_blocks += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        let mut entries = BlockEntries::new(&block).ok_or(WorldError::BlockBounds)?;
        while let Some((key, value)) = entries.next_entry() {
            visit(&key, value);
        }
    }
    Ok(summary)
}

/// Parse the append-only log: 32 KiB pages of fragment records reassembled
/// into write batches, each batch a sequence of put/delete entries. Deletes
/// are visited with an empty value.
pub fn parse_log(data: &[u8], mut visit: impl FnMut(&[u8], &[u8])) -> Result<(), WorldError> {
    let mut batches: Vec<Vec<u8>> = Vec::new();
    let mut fragment: Vec<u8> = Vec::new();
    let mut pos = 0usize;

    while pos + LOG_HEADER_SIZE <= data.len() {
        // Records never straddle a page; trailing page bytes are padding.
        let page_used = pos % LOG_BLOCK_SIZE;
        if page_used > LOG_BLOCK_SIZE - LOG_HEADER_SIZE {
            pos += LOG_BLOCK_SIZE - page_used;
            continue;
        }
        let _crc = endian::u32_le(&data[pos..]);
        let length = endian::u16_le(&data[pos + 4..]) as usize;
        let kind = data[pos + 6];
        pos += LOG_HEADER_SIZE;
        if pos + length > data.len() {
            break;
        }
        let payload = &data[pos..pos + length];
        match kind {
            RECORD_FULL => {
                if !fragment.is_empty() {
                    return Err(WorldError::LogFragment(kind));
                }
                batches.push(payload.to_vec());
            }
            RECORD_FIRST => {
                if !fragment.is_empty() {
                    return Err(WorldError::LogFragment(kind));
                }
                fragment.extend_from_slice(payload);
            }
            RECORD_MIDDLE => {
                if fragment.is_empty() {
                    return Err(WorldError::LogFragment(kind));
                }
                fragment.extend_from_slice(payload);
            }
            RECORD_LAST => {
                if fragment.is_empty() {
                    return Err(WorldError::LogFragment(kind));
                }
                fragment.extend_from_slice(payload);
                batches.push(std::mem::take(&mut fragment));
            }
            other => return Err(WorldError::UnknownRecordType(other)),
        }
        pos += length;
    }

    for batch in batches {
        // Sequence number and entry count lead each batch.
        if batch.len() < 12 {
            continue;
        }
        let _sequence = endian::u64_le(&batch);
        let _count = endian::u32_le(&batch[8..]);
        let mut pos = 12usize;
        while pos < batch.len() {
            let tag = batch[pos];
            pos += 1;
            let mut cur = VarintCursor::new(&batch[pos..]);
            match tag {
                0 => {
                    let key_len = cur.read_u32().ok_or(WorldError::TruncatedLog)? as usize;
                    let base = pos + cur.pos();
                    if base + key_len > batch.len() {
                        break;
                    }
                    visit(&batch[base..base + key_len], &[]);
                    pos = base + key_len;
                }
                1 => {
                    let key_len = cur.read_u32().ok_or(WorldError::TruncatedLog)? as usize;
                    let key_base = pos + cur.pos();
                    if key_base + key_len > batch.len() {
                        break;
                    }
                    let mut cur2 = VarintCursor::new(&batch[key_base + key_len..]);
                    let val_len = cur2.read_u32().ok_or(WorldError::TruncatedLog)? as usize;
                    let val_base = key_base + key_len + cur2.pos();
                    if val_base + val_len > batch.len() {
                        break;
                    }
                    visit(
                        &batch[key_base..key_base + key_len],
                        &batch[val_base..val_base + val_len],
                    );
                    pos = val_base + val_len;
                }
                other => return Err(WorldError::UnknownBatchTag(other)),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelmap_codec::varint;

    fn push_entry(out: &mut Vec<u8>, prev: &[u8], key: &[u8], value: &[u8]) {
        let shared = prev.iter().zip(key.iter()).take_while(|(a, b)| a == b).count();
        varint::write_u32(out, shared as u32);
        varint::write_u32(out, (key.len() - shared) as u32);
        varint::write_u32(out, value.len() as u32);
        out.extend_from_slice(&key[shared..]);
        out.extend_from_slice(value);
    }

    fn finish_block(mut contents: Vec<u8>) -> Vec<u8> {
        contents.extend_from_slice(&0u32.to_le_bytes()); // restart offset
        contents.extend_from_slice(&1u32.to_le_bytes()); // num restarts
        contents
    }

    /// Minimal one-data-block table: block, type+crc, index, footer.
    fn build_table(entries: &[(&[u8], &[u8])], block_kind: u8, raw_block: Option<Vec<u8>>) -> Vec<u8> {
        let mut block = Vec::new();
        let mut prev: Vec<u8> = Vec::new();
        for (key, value) in entries {
            push_entry(&mut block, &prev, key, value);
            prev = key.to_vec();
        }
        let block = raw_block.unwrap_or_else(|| finish_block(block));

        let mut file = Vec::new();
        let data_offset = 0u64;
        let data_size = block.len() as u64;
        file.extend_from_slice(&block);
        file.push(block_kind);
        file.extend_from_slice(&[0u8; 4]); // crc, unchecked

        let index_offset = file.len() as u64;
        let mut index = Vec::new();
        let mut handle = Vec::new();
        varint::write_u64(&mut handle, data_offset);
        varint::write_u64(&mut handle, data_size);
        push_entry(&mut index, &[], b"k", &handle);
        let index = finish_block(index);
        let index_size = index.len() as u64;
        file.extend_from_slice(&index);
        file.push(COMPRESSOR_RAW);
        file.extend_from_slice(&[0u8; 4]);

        let mut footer = Vec::new();
        varint::write_u64(&mut footer, 0); // metaindex handle
        varint::write_u64(&mut footer, 0);
        varint::write_u64(&mut footer, index_offset);
        varint::write_u64(&mut footer, index_size);
        footer.resize(FOOTER_SIZE - 8, 0);
        footer.extend_from_slice(&MAGIC.to_le_bytes());
        file.extend_from_slice(&footer);
        file
    }

    #[test]
    fn table_roundtrip_with_prefix_compression() {
        let entries: Vec<(&[u8], &[u8])> = vec![
            (b"chunk-aa", b"one"),
            (b"chunk-ab", b"two"),
            (b"other", b"three"),
        ];
        let file = build_table(&entries, COMPRESSOR_RAW, None);
        let mut seen = Vec::new();
        let summary = parse_table(&file, |k, v| {
            seen.push((k.to_vec(), v.to_vec()));
        })
        .unwrap();
        assert_eq!(summary.skipped_blocks, 0);
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (b"chunk-aa".to_vec(), b"one".to_vec()));
        assert_eq!(seen[1], (b"chunk-ab".to_vec(), b"two".to_vec()));
        assert_eq!(seen[2], (b"other".to_vec(), b"three".to_vec()));
    }

    #[test]
    fn zlib_block_is_inflated() {
        use std::io::Write;
        let mut contents = Vec::new();
        push_entry(&mut contents, &[], b"key", b"value");
        let block = finish_block(contents);
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&block).unwrap();
        let compressed = enc.finish().unwrap();

        let file = build_table(&[], COMPRESSOR_ZLIB, Some(compressed));
        let mut seen = Vec::new();
        parse_table(&file, |k, v| seen.push((k.to_vec(), v.to_vec()))).unwrap();
        assert_eq!(seen, vec![(b"key".to_vec(), b"value".to_vec())]);
    }

    #[test]
    fn snappy_block_is_counted_not_fatal() {
        let file = build_table(&[(b"key".as_slice(), b"value".as_slice())], COMPRESSOR_SNAPPY, None);
        let mut seen = 0;
        let summary = parse_table(&file, |_, _| seen += 1).unwrap();
        assert_eq!(summary.skipped_blocks, 1);
        assert_eq!(seen, 0);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut file = build_table(&[], COMPRESSOR_RAW, None);
        let len = file.len();
        file[len - 1] ^= 0xFF;
        assert!(matches!(parse_table(&file, |_, _| {}), Err(WorldError::BadMagic)));
    }

    #[test]
    fn short_file_is_rejected() {
        assert!(matches!(parse_table(&[0u8; 10], |_, _| {}), Err(WorldError::TruncatedFooter)));
    }

    fn build_log(records: &[(u8, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (kind, payload) in records {
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
            out.push(*kind);
            out.extend_from_slice(payload);
        }
        out
    }

    fn build_batch(entries: &[(&[u8], Option<&[u8]>)]) -> Vec<u8> {
        let mut batch = Vec::new();
        batch.extend_from_slice(&1u64.to_le_bytes());
        batch.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (key, value) in entries {
            match value {
                Some(value) => {
                    batch.push(1);
                    varint::write_u32(&mut batch, key.len() as u32);
                    batch.extend_from_slice(key);
                    varint::write_u32(&mut batch, value.len() as u32);
                    batch.extend_from_slice(value);
                }
                None => {
                    batch.push(0);
                    varint::write_u32(&mut batch, key.len() as u32);
                    batch.extend_from_slice(key);
                }
            }
        }
        batch
    }

    #[test]
    fn log_full_record() {
        let batch = build_batch(&[(b"alpha", Some(b"1")), (b"beta", None)]);
        let log = build_log(&[(RECORD_FULL, &batch)]);
        let mut seen = Vec::new();
        parse_log(&log, |k, v| seen.push((k.to_vec(), v.to_vec()))).unwrap();
        assert_eq!(seen, vec![(b"alpha".to_vec(), b"1".to_vec()), (b"beta".to_vec(), vec![])]);
    }

    #[test]
    fn log_fragmented_record() {
        let batch = build_batch(&[(b"key", Some(b"split-value"))]);
        let (a, rest) = batch.split_at(5);
        let (b, c) = rest.split_at(4);
        let log = build_log(&[(RECORD_FIRST, a), (RECORD_MIDDLE, b), (RECORD_LAST, c)]);
        let mut seen = Vec::new();
        parse_log(&log, |k, v| seen.push((k.to_vec(), v.to_vec()))).unwrap();
        assert_eq!(seen, vec![(b"key".to_vec(), b"split-value".to_vec())]);
    }

    #[test]
    fn log_middle_without_first_errors() {
        let log = build_log(&[(RECORD_MIDDLE, b"x")]);
        assert!(matches!(parse_log(&log, |_, _| {}), Err(WorldError::LogFragment(_))));
    }

    #[test]
    fn chunk_key_lengths() {
        let mut key = Vec::new();
        key.extend_from_slice(&10i32.to_le_bytes());
        key.extend_from_slice(&(-5i32).to_le_bytes());
        key.push(VALUE_VERSION);
        assert!(is_chunk_key(&key));
        let parsed = read_chunk_key(&key);
        assert_eq!((parsed.x, parsed.z, parsed.dimension), (10, -5, 0));
        assert_eq!(parsed.kind, VALUE_VERSION);
        assert_eq!(parsed.index, None);

        // Sub-chunk key with dimension: 14 bytes.
        let mut key = Vec::new();
        key.extend_from_slice(&1i32.to_le_bytes());
        key.extend_from_slice(&2i32.to_le_bytes());
        key.extend_from_slice(&1i32.to_le_bytes());
        key.push(VALUE_SUB_CHUNK_PREFIX);
        key.push((-4i8) as u8);
        assert!(is_chunk_key(&key));
        let parsed = read_chunk_key(&key);
        assert_eq!((parsed.x, parsed.z, parsed.dimension), (1, 2, 1));
        assert_eq!(parsed.kind, VALUE_SUB_CHUNK_PREFIX);
        assert_eq!(parsed.index, Some(-4));

        assert!(!is_chunk_key(b"player_server_data"));
    }

    #[test]
    fn scan_sorts_tables_oldest_first() {
        let dir = std::env::temp_dir().join(format!("pixelmap_ldb_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("000010.ldb"), b"").unwrap();
        std::fs::write(dir.join("000002.ldb"), b"").unwrap();
        std::fs::write(dir.join("000011.log"), b"").unwrap();
        std::fs::write(dir.join("CURRENT"), b"").unwrap();
        let found = scan(&dir).unwrap();
        let names: Vec<_> = found
            .tables
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["000002.ldb", "000010.ldb"]);
        assert!(found.log.is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
