//! Light-source table for night rendering: block name to emitted intensity.

use std::collections::HashMap;
use std::path::Path;

use crate::WorldError;

/// Shipped defaults, same grammar as user-supplied files.
const BUILTIN: &str = "\
# Block light emitters, 1-15.
minecraft:beacon = 15
minecraft:campfire = 15
minecraft:conduit = 15
minecraft:end_gateway = 15
minecraft:end_portal = 15
minecraft:fire = 15
minecraft:froglight = 15
minecraft:glowstone = 15
minecraft:jack_o_lantern = 15
minecraft:lantern = 15
minecraft:lava = 15
minecraft:lava_cauldron = 15
minecraft:respawn_anchor = 15
minecraft:sea_lantern = 15
minecraft:shroomlight = 15
minecraft:cave_vines = 14
minecraft:end_rod = 14
minecraft:torch = 14
minecraft:wall_torch = 14
minecraft:blast_furnace = 13
minecraft:furnace = 13
minecraft:smoker = 13
minecraft:candle = 12
minecraft:glow_lichen = 7
minecraft:redstone_torch = 7
minecraft:sculk_catalyst = 6
minecraft:amethyst_cluster = 5
minecraft:soul_fire = 10
minecraft:soul_lantern = 10
minecraft:soul_torch = 10
minecraft:crying_obsidian = 10
minecraft:enchanting_table = 7
minecraft:ender_chest = 7
minecraft:magma_block = 3
minecraft:brewing_stand = 1
minecraft:brown_mushroom = 1
minecraft:dragon_egg = 1
minecraft:end_portal_frame = 1
minecraft:sculk_sensor = 1
";

/// Parsed emitter table.
#[derive(Debug, Default, Clone)]
pub struct LightSource {
    powers: HashMap<String, u8>,
}

impl LightSource {
    pub fn builtin() -> Self {
        Self::parse(BUILTIN)
    }

    pub fn read(path: &Path) -> Result<Self, WorldError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Lines of `<namespace id> = <1-15>`, `#` starts a comment. Malformed
    /// lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut powers = HashMap::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else { continue };
            let name = name.trim();
            let Ok(power) = value.trim().parse::<u8>() else { continue };
            if name.is_empty() || !(1..=15).contains(&power) {
                continue;
            }
            powers.insert(name.to_string(), power);
        }
        Self { powers }
    }

    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }

    pub fn power(&self, name: &str) -> Option<u8> {
        self.powers.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_common_emitters() {
        let lights = LightSource::builtin();
        assert_eq!(lights.power("minecraft:glowstone"), Some(15));
        assert_eq!(lights.power("minecraft:torch"), Some(14));
        assert_eq!(lights.power("minecraft:stone"), None);
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let lights = LightSource::parse(
            "# comment\n\
             minecraft:lava = 15 # hot\n\
             justtext\n\
             minecraft:too_much = 16\n\
             minecraft:zero = 0\n\
             = 5\n\
             minecraft:ok = 3\n",
        );
        assert_eq!(lights.power("minecraft:lava"), Some(15));
        assert_eq!(lights.power("minecraft:ok"), Some(3));
        assert_eq!(lights.power("minecraft:too_much"), None);
        assert_eq!(lights.power("minecraft:zero"), None);
    }
}
