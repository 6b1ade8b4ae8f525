//! Bedrock world assembly: chunk values decoded out of the LevelDB store,
//! per-snapshot `World`s that merge oldest-to-newest, and the night-mode
//! block-light flood.

use std::collections::HashMap;

use pixelmap_codec::endian;
use pixelmap_codec::nibble::{nibble4, unpack_packed_u32};
use pixelmap_nbt::{Endian, Tag, Visitor};
use tracing::debug;

use crate::chunk::{BlockOrder, Chunk, Palette, PaletteKind, Section, SECTION_AREA, SECTION_TILES};
use crate::leveldb::{self, ChunkKey};
use crate::light::LightSource;
use crate::palette::{translate_ids, translate_names, IdTable};
use crate::WorldError;

/// The chunks of one dimension as seen by one store file. Ordered by file
/// name: an earlier name means older content.
pub struct World {
    pub name: String,
    dimension: i32,
    chunks: HashMap<(i32, i32), Chunk>,
    /// Name-to-index assignments per chunk, shared across its sub-chunks.
    ns_cache: HashMap<(i32, i32), HashMap<String, u16>>,
}

impl World {
    pub fn new(name: impl Into<String>, dimension: i32) -> Self {
        Self {
            name: name.into(),
            dimension,
            chunks: HashMap::new(),
            ns_cache: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> i32 {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = (&(i32, i32), &Chunk)> {
        self.chunks.iter()
    }

    pub fn drain_chunks(&mut self) -> impl Iterator<Item = ((i32, i32), Chunk)> + '_ {
        self.ns_cache.clear();
        self.chunks.drain()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&(i32, i32), &Chunk) -> bool) {
        self.chunks.retain(|pos, chunk| keep(pos, chunk));
    }

    fn chunk_mut(&mut self, x: i32, z: i32) -> &mut Chunk {
        self.chunks.entry((x, z)).or_insert_with(|| {
            let mut chunk = Chunk::new();
            chunk.set_x(x);
            chunk.set_z(z);
            chunk
        })
    }

    /// Apply one store entry. Non-chunk keys, other dimensions and value
    /// kinds without render relevance are ignored.
    pub fn apply(&mut self, key: &[u8], value: &[u8]) -> Result<(), WorldError> {
        if value.is_empty() || !leveldb::is_chunk_key(key) {
            return Ok(());
        }
        let key = leveldb::read_chunk_key(key);
        if key.dimension != self.dimension {
            return Ok(());
        }
        match key.kind {
            leveldb::VALUE_DATA_3D => self.apply_data_3d(&key, value),
            leveldb::VALUE_SUB_CHUNK_PREFIX => self.apply_sub_chunk(&key, value)?,
            leveldb::VALUE_VERSION
            | leveldb::VALUE_DATA_2D
            | leveldb::VALUE_LEGACY_VERSION => {}
            kind => debug!(kind, len = value.len(), "ignoring chunk value"),
        }
        Ok(())
    }

    /// `Data3D`: 256 little-endian u16 heights (with a 64 offset), then
    /// biome data this renderer does not use.
    fn apply_data_3d(&mut self, key: &ChunkKey, value: &[u8]) {
        if value.len() < SECTION_AREA * 2 {
            return;
        }
        let mut heightmap = Vec::with_capacity(SECTION_AREA);
        for i in 0..SECTION_AREA {
            heightmap.push(i32::from(endian::i16_le(&value[i * 2..])) - 64);
        }
        self.chunk_mut(key.x, key.z).set_heightmap(heightmap);
    }

    fn apply_sub_chunk(&mut self, key: &ChunkKey, value: &[u8]) -> Result<(), WorldError> {
        let (x, z) = (key.x, key.z);
        if value.is_empty() {
            return Err(WorldError::TruncatedSubChunk);
        }
        let version = value[0];
        let mut pos = 1usize;
        let mut y = key.index.map_or(0, i32::from);

        match version {
            // Pre-flattening: 4096 raw ids plus a data nibble array, XZY.
            0 | 2..=7 => {
                if value.len() < pos + SECTION_TILES + SECTION_TILES / 2 {
                    return Err(WorldError::TruncatedSubChunk);
                }
                let ids = &value[pos..pos + SECTION_TILES];
                let data = &value[pos + SECTION_TILES..pos + SECTION_TILES + SECTION_TILES / 2];
                let mut blocks = vec![0u16; SECTION_TILES];
                for (i, block) in blocks.iter_mut().enumerate() {
                    *block = u16::from(ids[i]) | (u16::from(nibble4(data, i)) << 12);
                }
                let chunk = self.chunk_mut(x, z);
                chunk.set_palette_kind(PaletteKind::BlockId);
                // Ids are not tracked across sub-chunks in this layout.
                let mut table = IdTable::new();
                let section = Section::new(y, BlockOrder::Xzy);
                translate_ids(chunk, section, &mut table, &mut blocks);
                Ok(())
            }
            // Palettized storages. Version 8 adds the layer count, version
            // 9 also stores the sub-chunk y. Only layer 0 is rendered; any
            // trailer after it stays unread.
            1 | 8 | 9 => {
                let layers = if version >= 8 {
                    let n = *value.get(pos).ok_or(WorldError::TruncatedSubChunk)?;
                    pos += 1;
                    n
                } else {
                    1
                };
                if version >= 9 {
                    let stored = *value.get(pos).ok_or(WorldError::TruncatedSubChunk)? as i8;
                    pos += 1;
                    y = i32::from(stored);
                }
                if layers == 0 {
                    return Ok(());
                }
                self.read_storage(x, z, y, &value[pos..])
            }
            other => Err(WorldError::UnknownSubChunkVersion(other)),
        }
    }

    /// One palettized storage layer: a header byte (bits-per-block in the
    /// upper seven bits), packed u32 words, then a palette of little-endian
    /// NBT compounds carrying `name`.
    fn read_storage(&mut self, x: i32, z: i32, y: i32, data: &[u8]) -> Result<(), WorldError> {
        let header = *data.first().ok_or(WorldError::TruncatedSubChunk)?;
        let mut pos = 1usize;
        if header & 1 == 1 {
            // Runtime (network) serialization never appears on disk.
            return Ok(());
        }
        let bits = (header >> 1) as usize;

        let mut blocks;
        if bits == 0 {
            // Single-entry palette covering the whole sub-chunk.
            blocks = vec![0u16];
        } else {
            let words_len = SECTION_TILES.div_ceil(32 / bits);
            if data.len() < pos + words_len * 4 {
                return Err(WorldError::TruncatedSubChunk);
            }
            let words: Vec<u32> = (0..words_len)
                .map(|i| endian::u32_le(&data[pos + i * 4..]))
                .collect();
            pos += words_len * 4;
            blocks = vec![0u16; SECTION_TILES];
            unpack_packed_u32(&words, &mut blocks, bits);
        }

        if data.len() < pos + 4 {
            return Err(WorldError::TruncatedSubChunk);
        }
        let palette_len = endian::u32_le(&data[pos..]) as usize;
        pos += 4;

        struct GrabName(Option<String>);
        impl Visitor for GrabName {
            fn tag(&mut self, tag: &Tag<'_>) -> bool {
                if tag.is_name("name") {
                    if let Some(name) = tag.value.as_str() {
                        self.0 = Some(name.to_string());
                    }
                    return false;
                }
                !tag.name.is_empty()
            }
        }

        let mut names = Vec::with_capacity(palette_len);
        for _ in 0..palette_len {
            if pos >= data.len() {
                return Err(WorldError::TruncatedSubChunk);
            }
            let mut grab = GrabName(None);
            let used = pixelmap_nbt::parse(&data[pos..], Endian::Little, &mut grab)?;
            pos += used;
            names.push(grab.0.unwrap_or_default());
        }

        let mut seen = self.ns_cache.remove(&(x, z)).unwrap_or_default();
        let chunk = self.chunk_mut(x, z);
        chunk.set_palette_kind(PaletteKind::Namespace);
        let section = Section::new(y, BlockOrder::Xzy);
        translate_names(chunk, section, &mut seen, &mut blocks, names);
        self.ns_cache.insert((x, z), seen);
        Ok(())
    }

    /// Merge `incoming` (the newer side) over this world, chunk by chunk.
    pub fn merge(&mut self, incoming: World) {
        self.ns_cache.clear();
        for (pos, chunk) in incoming.chunks {
            match self.chunks.entry(pos) {
                std::collections::hash_map::Entry::Occupied(mut e) => e.get_mut().merge(chunk),
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(chunk);
                }
            }
        }
    }

    /// Regenerate block light for night rendering: seed every configured
    /// emitter at its intensity and flood outward through air, one level
    /// lost per step.
    pub fn generate_block_light(&mut self, lights: &LightSource) {
        if self.chunks.is_empty() {
            return;
        }
        let mut y_min = i32::MAX;
        let mut y_max = i32::MIN;
        for chunk in self.chunks.values() {
            y_min = y_min.min(chunk.min_y());
            y_max = y_max.max(chunk.max_y());
        }
        if y_min > y_max {
            return;
        }

        let mut queues: Vec<Vec<(i32, i32, i32)>> = vec![Vec::new(); 15];
        let mut levels: HashMap<(i32, i32, i32), Box<[u8; SECTION_TILES]>> = HashMap::new();
        let mut airs: HashMap<(i32, i32), u16> = HashMap::new();

        let xzy = |x: i32, y: i32, z: i32| -> usize {
            let (x, y, z) = (x.rem_euclid(16) as usize, y.rem_euclid(16) as usize, z.rem_euclid(16) as usize);
            (x * 16 + z) * 16 + y
        };

        for (&(cx, cz), chunk) in &self.chunks {
            let Palette::Names(names) = chunk.palette() else { continue };
            let mut emitters: HashMap<u16, u8> = HashMap::new();
            for (i, name) in names.iter().enumerate() {
                if let Some(power) = lights.power(name) {
                    emitters.insert(i as u16, power);
                }
                if name == "minecraft:air" {
                    airs.insert((cx, cz), i as u16);
                }
            }
            if emitters.is_empty() {
                continue;
            }
            for lx in 0..16 {
                for lz in 0..16 {
                    let mut y = y_max;
                    while y >= y_min {
                        if !chunk.has_section_at(y) {
                            y -= 16;
                            continue;
                        }
                        if let Some(&power) = emitters.get(&chunk.tile(lx, y, lz).index) {
                            if (1..=15).contains(&power) {
                                let wx = cx * 16 + lx;
                                let wz = cz * 16 + lz;
                                queues[(15 - power) as usize].push((wx, y, wz));
                                let sy = y.div_euclid(16);
                                levels
                                    .entry((cx, sy, cz))
                                    .or_insert_with(|| Box::new([0u8; SECTION_TILES]))
                                    [xzy(lx, y, lz)] = power;
                            }
                        }
                        y -= 1;
                    }
                }
            }
        }

        const DIRECTIONS: [(i32, i32, i32); 6] =
            [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)];
        for step in 0..14usize {
            let power = 15 - step as u8 - 1;
            let frontier = std::mem::take(&mut queues[step]);
            for (x, y, z) in frontier {
                for (dx, dy, dz) in DIRECTIONS {
                    let (nx, ny, nz) = (x + dx, y + dy, z + dz);
                    let (cx, cz) = (nx.div_euclid(16), nz.div_euclid(16));
                    let Some(chunk) = self.chunks.get(&(cx, cz)) else { continue };
                    if !chunk.has_section_at(ny) {
                        continue;
                    }
                    let sy = ny.div_euclid(16);
                    let idx = xzy(nx, ny, nz);
                    let cell = levels
                        .entry((cx, sy, cz))
                        .or_insert_with(|| Box::new([0u8; SECTION_TILES]));
                    if cell[idx] < power {
                        cell[idx] = power;
                        let is_air =
                            airs.get(&(cx, cz)) == Some(&chunk.tile(nx, ny, nz).index);
                        if step < 13 && is_air {
                            queues[step + 1].push((nx, ny, nz));
                        }
                    }
                }
            }
        }

        for ((cx, sy, cz), light) in levels {
            if let Some(chunk) = self.chunks.get_mut(&(cx, cz)) {
                chunk.update_section_light(sy, &light[..]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub_chunk_key(x: i32, z: i32, index: i8) -> Vec<u8> {
        let mut key = Vec::new();
        key.extend_from_slice(&x.to_le_bytes());
        key.extend_from_slice(&z.to_le_bytes());
        key.push(leveldb::VALUE_SUB_CHUNK_PREFIX);
        key.push(index as u8);
        key
    }

    fn palette_entry(name: &str) -> Vec<u8> {
        // Little-endian NBT: Compound "" { name: String, version: Int }.
        let mut d = Vec::new();
        d.push(10u8);
        d.extend_from_slice(&0i16.to_le_bytes());
        d.push(8);
        d.extend_from_slice(&4i16.to_le_bytes());
        d.extend_from_slice(b"name");
        d.extend_from_slice(&(name.len() as i16).to_le_bytes());
        d.extend_from_slice(name.as_bytes());
        d.push(3);
        d.extend_from_slice(&7i16.to_le_bytes());
        d.extend_from_slice(b"version");
        d.extend_from_slice(&17i32.to_le_bytes());
        d.push(0);
        d
    }

    /// Version-9 sub-chunk, one storage layer, 1 bit per block, tile 0 set
    /// to palette entry 1.
    fn sub_chunk_value_v9(y: i8, names: &[&str]) -> Vec<u8> {
        let mut v = Vec::new();
        v.push(9u8); // version
        v.push(1); // layers
        v.push(y as u8);
        v.push(1 << 1); // bits=1, persistence
        let words = SECTION_TILES / 32;
        for i in 0..words {
            let word: u32 = if i == 0 { 1 } else { 0 };
            v.extend_from_slice(&word.to_le_bytes());
        }
        v.extend_from_slice(&(names.len() as u32).to_le_bytes());
        for name in names {
            v.extend_from_slice(&palette_entry(name));
        }
        v
    }

    #[test]
    fn sub_chunk_v9_decodes() {
        let mut world = World::new("000005.ldb", 0);
        let key = sub_chunk_key(2, -1, 3);
        let value = sub_chunk_value_v9(3, &["minecraft:air", "minecraft:stone"]);
        world.apply(&key, &value).unwrap();

        let chunk = world.chunks.get(&(2, -1)).unwrap();
        assert_eq!(chunk.palette_kind(), PaletteKind::Namespace);
        let Palette::Names(names) = chunk.palette() else { panic!() };
        // XZY index 0 is x=0 z=0 y=0 of section 3.
        let set = chunk.tile(0, 3 * 16, 0);
        let unset = chunk.tile(0, 3 * 16 + 1, 0);
        assert_eq!(names[set.index as usize], "minecraft:stone");
        assert_eq!(names[unset.index as usize], "minecraft:air");
    }

    #[test]
    fn sub_chunk_v9_prefers_stored_y() {
        let mut world = World::new("a", 0);
        let key = sub_chunk_key(0, 0, 7);
        let value = sub_chunk_value_v9(-2, &["minecraft:stone"]);
        world.apply(&key, &value).unwrap();
        let chunk = world.chunks.get(&(0, 0)).unwrap();
        assert!(chunk.section(-2).is_some());
        assert!(chunk.section(7).is_none());
    }

    #[test]
    fn single_entry_palette_fills_section() {
        let mut world = World::new("a", 0);
        let mut value = Vec::new();
        value.push(9u8);
        value.push(1);
        value.push(0); // y
        value.push(0); // header: bits 0
        value.extend_from_slice(&1u32.to_le_bytes());
        value.extend_from_slice(&palette_entry("minecraft:bedrock"));
        world.apply(&sub_chunk_key(0, 0, 0), &value).unwrap();
        let chunk = world.chunks.get(&(0, 0)).unwrap();
        assert_eq!(chunk.tile(9, 9, 9).index, 0);
        let Palette::Names(names) = chunk.palette() else { panic!() };
        assert_eq!(names, &["minecraft:bedrock"]);
    }

    #[test]
    fn legacy_sub_chunk_promotes_data_values() {
        let mut world = World::new("a", 0);
        let mut value = vec![0u8]; // version 0
        let mut ids = vec![0u8; SECTION_TILES];
        ids[0] = 56; // x=0 z=0 y=0 in XZY order
        value.extend_from_slice(&ids);
        let mut data = vec![0u8; SECTION_TILES / 2];
        data[0] = 0x02;
        value.extend_from_slice(&data);
        world.apply(&sub_chunk_key(0, 0, 1), &value).unwrap();

        let chunk = world.chunks.get(&(0, 0)).unwrap();
        let Palette::Ids(ids) = chunk.palette() else { panic!() };
        let tile = chunk.tile(0, 16, 0);
        assert_eq!(ids[tile.index as usize], (2 << 12) | 56);
    }

    #[test]
    fn data_3d_heightmap_offset() {
        let mut world = World::new("a", 0);
        let mut key = Vec::new();
        key.extend_from_slice(&0i32.to_le_bytes());
        key.extend_from_slice(&0i32.to_le_bytes());
        key.push(leveldb::VALUE_DATA_3D);
        let mut value = Vec::new();
        for _ in 0..SECTION_AREA {
            value.extend_from_slice(&70i16.to_le_bytes());
        }
        value.extend_from_slice(&[0u8; 16]); // biome tail, ignored
        world.apply(&key, &value).unwrap();
        let chunk = world.chunks.get(&(0, 0)).unwrap();
        assert_eq!(chunk.height(4, 4), Some(6));
    }

    #[test]
    fn other_dimension_is_filtered() {
        let mut world = World::new("a", 0);
        let mut key = Vec::new();
        key.extend_from_slice(&0i32.to_le_bytes());
        key.extend_from_slice(&0i32.to_le_bytes());
        key.extend_from_slice(&1i32.to_le_bytes()); // nether
        key.push(leveldb::VALUE_SUB_CHUNK_PREFIX);
        key.push(0);
        let value = sub_chunk_value_v9(0, &["minecraft:netherrack"]);
        world.apply(&key, &value).unwrap();
        assert!(world.is_empty());
    }

    #[test]
    fn merge_newer_overrides() {
        let mut older = World::new("000002.ldb", 0);
        older
            .apply(&sub_chunk_key(0, 0, 0), &sub_chunk_value_v9(0, &["minecraft:dirt"]))
            .unwrap();
        let mut newer = World::new("000005.ldb", 0);
        newer
            .apply(&sub_chunk_key(0, 0, 0), &sub_chunk_value_v9(0, &["minecraft:stone"]))
            .unwrap();

        older.merge(newer);
        let chunk = older.chunks.get(&(0, 0)).unwrap();
        let Palette::Names(names) = chunk.palette() else { panic!() };
        let tile = chunk.tile(5, 5, 5);
        assert_eq!(names[tile.index as usize], "minecraft:stone");
    }

    #[test]
    fn block_light_floods_through_air() {
        let mut world = World::new("a", 0);
        // A sub-chunk of air with one glowstone at (8, 8, 8).
        let mut value = Vec::new();
        value.push(9u8);
        value.push(1);
        value.push(0);
        value.push(1 << 1); // 1 bit
        let mut words = vec![0u32; SECTION_TILES / 32];
        let idx = (8 * 16 + 8) * 16 + 8; // XZY
        words[idx / 32] |= 1 << (idx % 32);
        for w in &words {
            value.extend_from_slice(&w.to_le_bytes());
        }
        value.extend_from_slice(&2u32.to_le_bytes());
        value.extend_from_slice(&palette_entry("minecraft:air"));
        value.extend_from_slice(&palette_entry("minecraft:glowstone"));
        world.apply(&sub_chunk_key(0, 0, 0), &value).unwrap();

        let lights = LightSource::builtin();
        world.generate_block_light(&lights);

        let chunk = world.chunks.get(&(0, 0)).unwrap();
        assert_eq!(chunk.tile(8, 8, 8).block_light(), 15);
        assert_eq!(chunk.tile(9, 8, 8).block_light(), 14);
        assert_eq!(chunk.tile(10, 8, 8).block_light(), 13);
        // Distance 6 in manhattan terms.
        assert_eq!(chunk.tile(8 + 3, 8 + 3, 8).block_light(), 9);
    }
}
