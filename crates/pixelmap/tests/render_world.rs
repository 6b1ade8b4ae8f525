//! End-to-end renders over synthetic saves written to temp directories.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pixelmap::{PixelMap, PixelMapError, RenderConfig, RenderMode};

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pixelmap_e2e_{tag}_{}", rand::random::<u64>()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn read_png(path: &Path) -> (u32, u32, Vec<u8>, Vec<(String, String)>) {
    let decoder = png::Decoder::new(File::open(path).unwrap());
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).unwrap();
    buf.truncate(info.buffer_size());
    let texts = reader
        .info()
        .uncompressed_latin1_text
        .iter()
        .map(|t| (t.keyword.clone(), t.text.clone()))
        .collect();
    (info.width, info.height, buf, texts)
}

fn pixel(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let off = ((y * width + x) * 4) as usize;
    [data[off], data[off + 1], data[off + 2], data[off + 3]]
}

// --- Anvil fixture -------------------------------------------------------

/// Big-endian NBT scribbler.
struct Nbt(Vec<u8>);

impl Nbt {
    fn root() -> Self {
        let mut doc = Nbt(Vec::new());
        doc.0.push(10);
        doc.0.extend_from_slice(&0i16.to_be_bytes());
        doc
    }

    fn name(&mut self, ty: u8, name: &str) {
        self.0.push(ty);
        self.0.extend_from_slice(&(name.len() as i16).to_be_bytes());
        self.0.extend_from_slice(name.as_bytes());
    }

    fn int(&mut self, name: &str, v: i32) {
        self.name(3, name);
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    fn byte(&mut self, name: &str, v: i8) {
        self.name(1, name);
        self.0.push(v as u8);
    }

    fn string(&mut self, name: &str, v: &str) {
        self.name(8, name);
        self.0.extend_from_slice(&(v.len() as i16).to_be_bytes());
        self.0.extend_from_slice(v.as_bytes());
    }

    fn long_array(&mut self, name: &str, values: &[i64]) {
        self.name(12, name);
        self.0.extend_from_slice(&(values.len() as i32).to_be_bytes());
        for v in values {
            self.0.extend_from_slice(&v.to_be_bytes());
        }
    }

    fn list(&mut self, name: &str, elem: u8, len: i32) {
        self.name(9, name);
        self.0.push(elem);
        self.0.extend_from_slice(&len.to_be_bytes());
    }

    fn compound(&mut self, name: &str) {
        self.name(10, name);
    }

    fn end(&mut self) {
        self.0.push(0);
    }
}

/// Heightmap long array: 9-bit fields, value 70 everywhere (70 - 64 = 6,
/// so columns surface at y = 5).
fn surface_words() -> Vec<i64> {
    let mut word: u64 = 0;
    for k in 0..7 {
        word |= 70u64 << (9 * k);
    }
    vec![word as i64; 37]
}

/// A 1.18-generation chunk: one all-stone section at Y=0.
fn stone_chunk_nbt(x: i32, z: i32) -> Vec<u8> {
    let mut doc = Nbt::root();
    doc.int("DataVersion", 3218);
    doc.int("xPos", x);
    doc.int("zPos", z);
    doc.int("yPos", 0);
    doc.list("sections", 10, 1);
    doc.byte("Y", 0);
    doc.compound("block_states");
    doc.list("palette", 10, 1);
    doc.string("Name", "minecraft:stone");
    doc.end();
    doc.end(); // block_states
    doc.end(); // section
    doc.compound("Heightmaps");
    doc.long_array("WORLD_SURFACE", &surface_words());
    doc.end();
    doc.end(); // root
    doc.0
}

/// Write an `.mca` region containing uncompressed chunk payloads at the
/// given local offsets.
fn write_region(path: &Path, rx: i32, rz: i32, chunks: &[(i32, i32)]) {
    let mut file = vec![0u8; 4096 * 2];
    let mut sectors: Vec<u8> = Vec::new();
    for (i, &(cx, cz)) in chunks.iter().enumerate() {
        let slot = ((cx & 31) + ((cz & 31) << 5)) as usize;
        let sector_index = 2 + i;
        file[slot * 4] = ((sector_index >> 16) & 0xFF) as u8;
        file[slot * 4 + 1] = ((sector_index >> 8) & 0xFF) as u8;
        file[slot * 4 + 2] = (sector_index & 0xFF) as u8;
        file[slot * 4 + 3] = 1;

        let payload = stone_chunk_nbt(rx * 32 + cx, rz * 32 + cz);
        assert!(payload.len() + 5 <= 4096, "fixture chunk must fit one sector");
        let mut sector = vec![0u8; 4096];
        sector[..4].copy_from_slice(&((payload.len() + 1) as u32).to_be_bytes());
        sector[4] = 3; // uncompressed
        sector[5..5 + payload.len()].copy_from_slice(&payload);
        sectors.extend_from_slice(&sector);
    }
    file.extend_from_slice(&sectors);
    std::fs::write(path, file).unwrap();
}

fn anvil_world(dir: &Path, regions: &[(i32, i32, Vec<(i32, i32)>)]) -> PathBuf {
    let world = dir.join("world");
    let region_dir = world.join("region");
    std::fs::create_dir_all(&region_dir).unwrap();
    for (rx, rz, chunks) in regions {
        write_region(&region_dir.join(format!("r.{rx}.{rz}.mca")), *rx, *rz, chunks);
    }
    world
}

fn stone_colors(dir: &Path) -> PathBuf {
    let path = dir.join("colors.conf");
    std::fs::write(&path, "minecraft:stone = 804020\n").unwrap();
    path
}

// --- Tests ---------------------------------------------------------------

#[test]
fn region_mode_renders_single_chunk_region() {
    let dir = temp_dir("region");
    let world = anvil_world(&dir, &[(0, 0, vec![(0, 0)])]);
    let out = dir.join("out");

    let mut config = RenderConfig::default();
    config.image = RenderMode::Region;
    config.threads = Some(2);
    config.no_lonely = true;
    config.colors = Some(stone_colors(&dir));

    let map = PixelMap::new(config);
    let summary = map.render(&world, &out, Arc::new(AtomicBool::new(false))).unwrap();
    assert_eq!(summary.chunks_rendered, 1);

    let (w, h, data, texts) = read_png(&out.join("r.0.0.png"));
    assert_eq!((w, h), (512, 512));
    assert!(texts.iter().any(|(k, _)| k == "mcdata"));
    // Top-left 16x16 tile is uniform stone.
    for y in 0..16 {
        for x in 0..16 {
            assert_eq!(pixel(&data, w, x, y), [128, 64, 32, 255], "at {x},{y}");
        }
    }
    // Everything else transparent.
    assert_eq!(pixel(&data, w, 16, 0), [0, 0, 0, 0]);
    assert_eq!(pixel(&data, w, 0, 16), [0, 0, 0, 0]);
    assert_eq!(pixel(&data, w, 300, 300), [0, 0, 0, 0]);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn image_mode_stitches_regions() {
    let dir = temp_dir("image");
    // Two chunks in region (0,0), one in region (1,0).
    let world = anvil_world(
        &dir,
        &[(0, 0, vec![(0, 0), (1, 0)]), (1, 0, vec![(0, 5)])],
    );
    let out = dir.join("map.png");

    let mut config = RenderConfig::default();
    config.image = RenderMode::Image;
    config.threads = Some(2);
    config.no_lonely = true;
    config.colors = Some(stone_colors(&dir));

    let map = PixelMap::new(config);
    let summary = map.render(&world, &out, Arc::new(AtomicBool::new(false))).unwrap();
    assert_eq!(summary.chunks_rendered, 3);

    let (w, h, data, _) = read_png(&out);
    assert_eq!((w, h), (1024, 512));
    assert_eq!(pixel(&data, w, 0, 0), [128, 64, 32, 255]);
    assert_eq!(pixel(&data, w, 17, 3), [128, 64, 32, 255]);
    // Chunk (0,5) of region (1,0): pixels at x 512.., y 80..
    assert_eq!(pixel(&data, w, 512 + 3, 80 + 3), [128, 64, 32, 255]);
    assert_eq!(pixel(&data, w, 200, 200), [0, 0, 0, 0]);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn lonely_region_is_skipped() {
    let dir = temp_dir("lonely");
    // A connected 2-chunk region and a single-chunk region far away.
    let world = anvil_world(
        &dir,
        &[(0, 0, vec![(0, 0), (1, 0)]), (5, 5, vec![(7, 7)])],
    );
    let out = dir.join("out");

    let mut config = RenderConfig::default();
    config.image = RenderMode::Region;
    config.threads = Some(2);
    config.colors = Some(stone_colors(&dir));

    let map = PixelMap::new(config);
    let summary = map.render(&world, &out, Arc::new(AtomicBool::new(false))).unwrap();
    assert_eq!(summary.chunks_rendered, 2);
    assert_eq!(summary.count(pixelmap::ErrorClass::LonelyRegions), 1);
    assert!(out.join("r.0.0.png").is_file());
    assert!(!out.join("r.5.5.png").exists());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn progress_totals_match_finished() {
    use std::sync::atomic::AtomicU64;

    let dir = temp_dir("progress");
    let world = anvil_world(&dir, &[(0, 0, (0..8).map(|i| (i, 0)).collect())]);
    let out = dir.join("out");

    let mut config = RenderConfig::default();
    config.image = RenderMode::Region;
    config.threads = Some(2);
    config.no_lonely = true;
    config.colors = Some(stone_colors(&dir));

    let map = PixelMap::new(config);
    let total = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicU64::new(0));
    {
        let total = Arc::clone(&total);
        map.events().total_chunks.add(move |n| {
            total.store(n, Ordering::SeqCst);
        });
        let finished = Arc::clone(&finished);
        map.events().finished_chunks.add(move |n| {
            finished.fetch_add(n, Ordering::SeqCst);
        });
    }
    map.render(&world, &out, Arc::new(AtomicBool::new(false))).unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 8);
    assert_eq!(finished.load(Ordering::SeqCst), 8);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn clearing_the_run_flag_aborts() {
    let dir = temp_dir("abort");
    // Enough chunks that the render comfortably outlives the first
    // coalesced progress flush on one worker.
    let regions: Vec<(i32, i32, Vec<(i32, i32)>)> = (0..6)
        .map(|rx| {
            let chunks = (0..32)
                .flat_map(|cz| (0..32).map(move |cx| (cx, cz)))
                .collect();
            (rx, 0, chunks)
        })
        .collect();
    let world = anvil_world(&dir, &regions);
    let out = dir.join("out");

    let mut config = RenderConfig::default();
    config.image = RenderMode::Region;
    config.threads = Some(1);
    config.no_lonely = true;
    config.colors = Some(stone_colors(&dir));

    let map = PixelMap::new(config);
    let run = Arc::new(AtomicBool::new(false));
    {
        let run = Arc::clone(&run);
        map.events().finished_chunks.add(move |_| {
            run.store(false, Ordering::SeqCst);
        });
    }
    match map.render(&world, &out, Arc::clone(&run)) {
        Err(PixelMapError::Aborted(summary)) => {
            assert!(summary.chunks_rendered >= 1);
            assert!(summary.chunks_rendered < 6144);
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(!run.load(Ordering::SeqCst));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn unknown_save_is_an_error() {
    let dir = temp_dir("unknown");
    let map = PixelMap::new(RenderConfig::default());
    let result = map.render(&dir, &dir.join("out.png"), Arc::new(AtomicBool::new(false)));
    assert!(matches!(result, Err(PixelMapError::UnknownSave(_))));
    std::fs::remove_dir_all(&dir).ok();
}
