//! Full-buffer decompression for the chunk payload formats. No caller needs
//! streaming; every chunk is inflated into a fresh vector.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("gzip: {0}")]
    Gzip(std::io::Error),
    #[error("zlib: {0}")]
    Zlib(std::io::Error),
    #[error("zlib-raw: {0}")]
    ZlibRaw(std::io::Error),
    #[error("lz4: {0}")]
    Lz4(std::io::Error),
}

pub fn inflate_gzip(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(CompressError::Gzip)?;
    Ok(out)
}

pub fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(CompressError::Zlib)?;
    Ok(out)
}

/// Deflate stream without the zlib header, as used by LevelDB block type 4.
pub fn inflate_zlib_raw(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut out = Vec::new();
    DeflateDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(CompressError::ZlibRaw)?;
    Ok(out)
}

pub fn inflate_lz4(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut decoder = lz4::Decoder::new(data).map_err(CompressError::Lz4)?;
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(CompressError::Lz4)?;
    Ok(out)
}
