//! Section reordering
//!
//! A section is a heading plus every block after it up to the next heading
//! (of any level) or the end of the document. Moving a section swaps it with
//! its neighbour; blocks before the first heading never move. Neither does a
//! trailing blank block (the file's final newline).

use crate::document::{parse, serialize};
use crate::error::Result;
use crate::types::{Block, Document};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Which neighbour to swap with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            _ => Err(format!("unknown direction: {}", s)),
        }
    }
}

/// Number of blocks that take part in moves
fn movable_len(blocks: &[Block]) -> usize {
    match blocks.last() {
        Some(Block::Unrecognized { raw_text }) if raw_text.trim().is_empty() => blocks.len() - 1,
        _ => blocks.len(),
    }
}

/// Block range of the section starting at `heading`
fn section_at(blocks: &[Block], heading: usize) -> Range<usize> {
    let end = blocks[heading + 1..]
        .iter()
        .position(Block::is_heading)
        .map_or(blocks.len(), |offset| heading + 1 + offset);
    heading..end
}

/// Swap the section starting at block `index` with its neighbour.
///
/// Returns `None` without touching anything when `index` is out of bounds,
/// does not point at a heading, or there is no section in that direction.
pub fn move_section(document: &Document, index: usize, direction: Direction) -> Option<Document> {
    let blocks = &document.blocks[..movable_len(&document.blocks)];
    if !blocks.get(index)?.is_heading() {
        return None;
    }

    let current = section_at(blocks, index);
    let (first, second) = match direction {
        Direction::Up => {
            let previous_heading = blocks[..index].iter().rposition(Block::is_heading)?;
            (section_at(blocks, previous_heading), current)
        }
        Direction::Down => {
            if current.end >= blocks.len() {
                return None;
            }
            let next = section_at(blocks, current.end);
            (current, next)
        }
    };

    let mut reordered = Vec::with_capacity(blocks.len());
    reordered.extend_from_slice(&blocks[..first.start]);
    reordered.extend_from_slice(&blocks[second.clone()]);
    reordered.extend_from_slice(&blocks[first.clone()]);
    reordered.extend_from_slice(&document.blocks[second.end..]);

    Some(Document {
        header: document.header.clone(),
        blocks: reordered,
    })
}

/// Text-level [`move_section`]: parse, move, re-serialize.
pub fn move_section_in_text(text: &str, index: usize, direction: Direction) -> Result<Option<String>> {
    let document = parse(text)?;
    Ok(move_section(&document, index, direction).map(|moved| serialize(&moved)))
}
