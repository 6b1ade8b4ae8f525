//! Block color table: legacy numeric ids and namespaced names to RGBA.
//!
//! The conf grammar is one rule per line,
//! `<ids and names...> = <hex>|<r g b [a]>` with `#` comments. Numeric ids
//! may carry `:damage` suffixes which fold into the id's top nibble. An
//! unknown block resolves to a sentinel index whose color is fully
//! transparent; legacy lookups retry with the data value stripped.

use std::collections::HashMap;
use std::path::Path;

use crate::color::Rgba;
use crate::RenderError;

/// Shipped color table, also written out by `--createcolor`.
pub const BUILTIN_CONF: &str = include_str!("blockcolor.conf");

#[derive(Debug, Default, Clone)]
pub struct BlockColor {
    ids: HashMap<u16, u32>,
    names: HashMap<String, u32>,
    colors: Vec<Rgba>,
}

impl BlockColor {
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_CONF)
    }

    pub fn read(path: &Path) -> Result<Self, RenderError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parse a conf text. Malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut table = Self::default();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((lhs, rhs)) = line.split_once('=') else { continue };
            let Some(color) = parse_color(rhs.trim()) else { continue };
            let Some((ids, names)) = parse_blocks(lhs.trim()) else { continue };
            if ids.is_empty() && names.is_empty() {
                continue;
            }
            let index = table.colors.len() as u32;
            for id in ids {
                table.ids.insert(id, index);
            }
            for name in names {
                table.names.insert(name, index);
            }
            table.colors.push(color);
        }
        table
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Sentinel index for unknown blocks; resolves to transparent.
    pub fn sentinel(&self) -> u32 {
        self.colors.len() as u32
    }

    pub fn index_of_id(&self, id: u16) -> u32 {
        match self.ids.get(&id) {
            Some(&index) => index,
            None if id > 0xFF => self.index_of_id(id & 0xFF),
            None => self.sentinel(),
        }
    }

    pub fn index_of_name(&self, name: &str) -> u32 {
        self.names.get(name).copied().unwrap_or_else(|| self.sentinel())
    }

    pub fn color(&self, index: u32) -> Rgba {
        self.colors.get(index as usize).copied().unwrap_or(Rgba::TRANSPARENT)
    }
}

/// Left side: whitespace-separated numeric ids (with optional `:damage`
/// lists) and namespace ids.
fn parse_blocks(lhs: &str) -> Option<(Vec<u16>, Vec<String>)> {
    let mut ids = Vec::new();
    let mut names = Vec::new();
    for token in lhs.split_whitespace() {
        if token.chars().next()?.is_ascii_digit() {
            let mut parts = token.split(':');
            let id: u16 = parts.next()?.parse().ok()?;
            let mut got_damage = false;
            for damage in parts {
                let damage: u16 = damage.parse().ok()?;
                if damage > 0x0F {
                    return None;
                }
                ids.push(id | (damage << 12));
                got_damage = true;
            }
            if !got_damage {
                ids.push(id);
            }
        } else {
            names.push(token.to_string());
        }
    }
    Some((ids, names))
}

/// Right side: one `RRGGBB`/`RRGGBBAA` hex token, or 3-4 decimal bytes.
fn parse_color(rhs: &str) -> Option<Rgba> {
    let tokens: Vec<&str> = rhs.split_whitespace().collect();
    match tokens.len() {
        1 => {
            let token = tokens[0];
            if !token.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            match token.len() {
                6 => {
                    let v = u32::from_str_radix(token, 16).ok()?;
                    Some(Rgba::opaque((v >> 16) as u8, (v >> 8) as u8, v as u8))
                }
                8 => {
                    let v = u32::from_str_radix(token, 16).ok()?;
                    Some(Rgba::new((v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8))
                }
                _ => None,
            }
        }
        3 | 4 => {
            let mut parts = tokens.iter().map(|t| t.parse::<u8>());
            let r = parts.next()?.ok()?;
            let g = parts.next()?.ok()?;
            let b = parts.next()?.ok()?;
            let a = match parts.next() {
                Some(v) => v.ok()?,
                None => 255,
            };
            Some(Rgba::new(r, g, b, a))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_nonempty() {
        let colors = BlockColor::builtin();
        assert!(!colors.is_empty());
        let stone = colors.color(colors.index_of_name("minecraft:stone"));
        assert_eq!(stone.a, 255);
        // Air is transparent but known.
        let air_index = colors.index_of_name("minecraft:air");
        assert_ne!(air_index, colors.sentinel());
        assert_eq!(colors.color(air_index).a, 0);
    }

    #[test]
    fn hex_and_decimal_colors() {
        let colors = BlockColor::parse(
            "minecraft:one = 804020\n\
             minecraft:two = 80402010\n\
             minecraft:three = 1 2 3\n\
             minecraft:four = 1 2 3 4\n",
        );
        assert_eq!(colors.color(colors.index_of_name("minecraft:one")), Rgba::new(128, 64, 32, 255));
        assert_eq!(colors.color(colors.index_of_name("minecraft:two")), Rgba::new(128, 64, 32, 16));
        assert_eq!(colors.color(colors.index_of_name("minecraft:three")), Rgba::new(1, 2, 3, 255));
        assert_eq!(colors.color(colors.index_of_name("minecraft:four")), Rgba::new(1, 2, 3, 4));
    }

    #[test]
    fn shared_color_for_many_blocks() {
        let colors = BlockColor::parse("1 2:3:4 minecraft:stone = 456789\n");
        let expected = Rgba::new(0x45, 0x67, 0x89, 255);
        assert_eq!(colors.color(colors.index_of_id(1)), expected);
        assert_eq!(colors.color(colors.index_of_id(2 | (3 << 12))), expected);
        assert_eq!(colors.color(colors.index_of_id(2 | (4 << 12))), expected);
        assert_eq!(colors.color(colors.index_of_name("minecraft:stone")), expected);
        // Plain id 2 was never assigned.
        assert_eq!(colors.index_of_id(2), colors.sentinel());
    }

    #[test]
    fn data_value_fallback() {
        let colors = BlockColor::parse("17 = 705030\n");
        // 17 with damage 2 falls back to the plain id.
        assert_eq!(colors.color(colors.index_of_id(17 | (2 << 12))), Rgba::new(0x70, 0x50, 0x30, 255));
    }

    #[test]
    fn unknown_blocks_are_transparent() {
        let colors = BlockColor::parse("minecraft:stone = 7d7d7d\n");
        assert_eq!(colors.color(colors.index_of_name("minecraft:unheard_of")), Rgba::TRANSPARENT);
        assert_eq!(colors.color(colors.index_of_id(200)), Rgba::TRANSPARENT);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let colors = BlockColor::parse(
            "minecraft:good = 102030\n\
             no equals sign here\n\
             minecraft:bad = xyz\n\
             minecraft:worse = 1 2\n\
             5:99 = 102030\n",
        );
        assert_ne!(colors.index_of_name("minecraft:good"), colors.sentinel());
        assert_eq!(colors.index_of_name("minecraft:bad"), colors.sentinel());
        assert_eq!(colors.colors.len(), 1);
    }

    #[test]
    fn comments_are_stripped() {
        let colors = BlockColor::parse("# full line\nminecraft:stone = 7d7d7d # trailing\n");
        assert_ne!(colors.index_of_name("minecraft:stone"), colors.sentinel());
    }
}
