//! Row-streaming PNG writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::color::Rgba;
use crate::RenderError;

/// Keyword of the single metadata text chunk.
pub const METADATA_KEY: &str = "mcdata";

/// Write `width x height` RGBA rows produced by `rows`, which is called
/// exactly `height` times with increasing row indices and a transparent
/// row buffer to fill.
pub fn save_png(
    path: &Path,
    width: u32,
    height: u32,
    comment: &str,
    mut rows: impl FnMut(u32, &mut [Rgba]),
) -> Result<(), RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::EmptyImage);
    }
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    if !comment.is_empty() {
        encoder.add_text_chunk(METADATA_KEY.to_string(), comment.to_string())?;
    }
    let mut writer = encoder.write_header()?;
    let mut stream = writer.stream_writer()?;

    let mut row = vec![Rgba::TRANSPARENT; width as usize];
    let mut bytes = vec![0u8; width as usize * 4];
    for y in 0..height {
        row.fill(Rgba::TRANSPARENT);
        rows(y, &mut row);
        for (chunk, px) in bytes.chunks_exact_mut(4).zip(row.iter()) {
            chunk[0] = px.r;
            chunk[1] = px.g;
            chunk[2] = px.b;
            chunk[3] = px.a;
        }
        stream.write_all(&bytes)?;
    }
    stream.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pixelmap_png_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
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

    #[test]
    fn rows_are_written_in_order_with_metadata() {
        let path = temp_file("rows.png");
        let mut calls = Vec::new();
        save_png(&path, 4, 3, "unit=test", |y, row| {
            calls.push(y);
            for (x, px) in row.iter_mut().enumerate() {
                *px = Rgba::new(x as u8, y as u8, 7, 255);
            }
        })
        .unwrap();
        assert_eq!(calls, [0, 1, 2]);

        let (w, h, data, texts) = read_png(&path);
        assert_eq!((w, h), (4, 3));
        assert_eq!(&data[0..4], &[0, 0, 7, 255]);
        // Row 2, column 3.
        let off = (2 * 4 + 3) * 4;
        assert_eq!(&data[off..off + 4], &[3, 2, 7, 255]);
        assert_eq!(texts, vec![(METADATA_KEY.to_string(), "unit=test".to_string())]);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn unfilled_rows_stay_transparent() {
        let path = temp_file("clear.png");
        save_png(&path, 2, 2, "", |_, _| {}).unwrap();
        let (_, _, data, texts) = read_png(&path);
        assert!(data.iter().all(|&b| b == 0));
        assert!(texts.is_empty());
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn zero_size_is_rejected() {
        let path = temp_file("empty.png");
        assert!(matches!(save_png(&path, 0, 5, "", |_, _| {}), Err(RenderError::EmptyImage)));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
