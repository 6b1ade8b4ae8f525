//! Save-kind detection from the directory layout, and per-dimension data
//! paths.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Anvil,
    Beta,
    Alpha,
    Bedrock,
    Unknown,
}

fn dir_has_extension(path: &Path, ext: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else { return false };
    for entry in entries.flatten() {
        let p = entry.path();
        if p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(ext) {
            return true;
        }
    }
    false
}

fn looks_like_alpha(path: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else { return false };
    for entry in entries.flatten() {
        let p = entry.path();
        if !p.is_dir() {
            continue;
        }
        let Some(name) = p.file_name().and_then(|n| n.to_str()) else { continue };
        if !name.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()) || name.is_empty() {
            continue;
        }
        // One base-36 level is enough of a signal when paired with a
        // level.dat; loose chunk files confirm it.
        if path.join("level.dat").is_file() {
            return true;
        }
        if let Ok(inner) = std::fs::read_dir(&p) {
            for inner in inner.flatten() {
                if inner.path().is_dir() {
                    return true;
                }
            }
        }
    }
    false
}

/// Identify the save generation from a world directory: `region/`
/// distinguishes Anvil from Beta by file extension, `db/` marks Bedrock,
/// base-36 subdirectories mark Alpha. A bare directory of region or table
/// files is accepted too.
pub fn detect(path: &Path) -> SaveKind {
    if !path.is_dir() {
        return SaveKind::Unknown;
    }
    let region = path.join("region");
    if region.is_dir() {
        if dir_has_extension(&region, "mcr") && !dir_has_extension(&region, "mca") {
            return SaveKind::Beta;
        }
        return SaveKind::Anvil;
    }
    if path.join("db").is_dir() {
        return SaveKind::Bedrock;
    }
    if dir_has_extension(path, "mca") {
        return SaveKind::Anvil;
    }
    if dir_has_extension(path, "mcr") {
        return SaveKind::Beta;
    }
    if dir_has_extension(path, "ldb") {
        return SaveKind::Bedrock;
    }
    if looks_like_alpha(path) {
        return SaveKind::Alpha;
    }
    SaveKind::Unknown
}

/// Directory actually holding chunk data for a dimension of the save.
pub fn data_path(path: &Path, kind: SaveKind, dimension: i32) -> PathBuf {
    match kind {
        SaveKind::Anvil | SaveKind::Beta => {
            let region = path.join("region");
            if region.is_dir() {
                if dimension != 0 {
                    path.join(format!("DIM{dimension}")).join("region")
                } else {
                    region
                }
            } else {
                path.to_path_buf()
            }
        }
        SaveKind::Bedrock => {
            let db = path.join("db");
            if db.is_dir() {
                db
            } else {
                path.to_path_buf()
            }
        }
        SaveKind::Alpha => {
            if dimension != 0 {
                path.join(format!("DIM{dimension}"))
            } else {
                path.to_path_buf()
            }
        }
        SaveKind::Unknown => path.to_path_buf(),
    }
}
