//! Per-section palette compaction.
//!
//! Format visitors produce raw block values (numeric ids or indices into a
//! section-local name list); these routines rewrite them into indices of the
//! growing per-chunk palette, allocating a slot the first time a value is
//! seen, then attach the section to the chunk.

use std::collections::HashMap;

use crate::chunk::{Chunk, Section};

const UNASSIGNED: u16 = u16::MAX;

/// Reverse lookup for the 16-bit block-id space. One per chunk parse.
pub struct IdTable(Box<[u16]>);

impl Default for IdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IdTable {
    pub fn new() -> Self {
        Self(vec![UNASSIGNED; 1 << 16].into_boxed_slice())
    }
}

/// Compact raw block ids into the chunk's id palette and insert the section.
pub fn translate_ids(chunk: &mut Chunk, mut section: Section, table: &mut IdTable, blocks: &mut [u16]) {
    let mut next = chunk.palette_len() as u16;
    for block in blocks.iter_mut() {
        let slot = &mut table.0[*block as usize];
        if *slot == UNASSIGNED {
            chunk.push_palette_id(*block);
            *slot = next;
            *block = next;
            next += 1;
        } else {
            *block = *slot;
        }
    }
    section.set_blocks(blocks);
    chunk.insert_section(section);
}

/// Compact namespace-palette indices into the chunk's name palette and
/// insert the section. `seen` carries name assignments across sections of
/// the same chunk; only names actually referenced by a tile are added.
pub fn translate_names(
    chunk: &mut Chunk,
    mut section: Section,
    seen: &mut HashMap<String, u16>,
    blocks: &mut [u16],
    names: Vec<String>,
) {
    struct Slot {
        name: Option<String>,
        index: u16,
    }

    let mut next = chunk.palette_len() as u16;
    let mut slots: Vec<Slot> = names
        .into_iter()
        .map(|name| match seen.get(&name) {
            Some(&index) => Slot { name: None, index },
            None => Slot { name: Some(name), index: UNASSIGNED },
        })
        .collect();

    for block in blocks.iter_mut() {
        let Some(slot) = slots.get_mut(*block as usize) else {
            // Index outside the declared palette; treat as the first entry.
            *block = 0;
            continue;
        };
        if slot.index == UNASSIGNED {
            let name = slot.name.take().unwrap_or_default();
            seen.insert(name.clone(), next);
            chunk.push_palette_name(name);
            slot.index = next;
            next += 1;
        }
        *block = slot.index;
    }
    section.set_blocks(blocks);
    chunk.insert_section(section);
}
