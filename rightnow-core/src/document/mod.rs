//! Document grammar
//!
//! Pure conversion between document text and [`Document`]. No I/O.
//!
//! ## Body grammar
//!
//! The body is read one line at a time by [`classify`]:
//!
//! | Line | Result |
//! |------|--------|
//! | `## Title` (1-6 `#`, a space, text) | [`Block::Heading`] |
//! | `- [ ] text`, `  * [x] text`, `[X] text` | [`Block::Task`] |
//! | anything else | [`Block::Unrecognized`], consecutive lines merged |
//!
//! Lines after a task belong to it (as `details`) until a blank line, a
//! heading, or another task.
//!
//! ## Round trip
//!
//! Every block remembers the exact lines it came from, and blocks are joined
//! with `\n`, so `serialize(&parse(text)?) == text` for any text that parses.
//! A trailing `\r` is split off heading and task lines before they are
//! classified and put back when they are rendered.

pub mod header;
pub mod inline;

pub use header::{Header, DEFAULT_BREAK_DURATION, DEFAULT_WORK_DURATION};
pub use inline::{InlineParts, SESSION_SCHEME};

use crate::error::Result;
use crate::types::{Block, Document, Task};
use regex::Regex;
use std::sync::OnceLock;

/// Classification of one body line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Heading {
        level: u8,
        text: &'a str,
    },
    Task {
        prefix: &'a str,
        mark: char,
        rest: &'a str,
    },
    /// Empty or whitespace-only
    Blank,
    Other,
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6}) (.*)$").expect("heading pattern is valid"))
}

fn task_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*(?:[-*+] )?)\[([ xX])\] (.*)$").expect("task pattern is valid")
    })
}

/// Split one trailing `\r` off a line
fn strip_cr(line: &str) -> (&str, bool) {
    match line.strip_suffix('\r') {
        Some(line) => (line, true),
        None => (line, false),
    }
}

/// Classify a single body line (without its newline)
pub fn classify(line: &str) -> Line<'_> {
    if let Some(caps) = heading_regex().captures(line) {
        if let (Some(marks), Some(text)) = (caps.get(1), caps.get(2)) {
            return Line::Heading {
                level: marks.as_str().len() as u8,
                text: text.as_str(),
            };
        }
    }

    if let Some(caps) = task_regex().captures(line) {
        if let (Some(prefix), Some(mark), Some(rest)) = (caps.get(1), caps.get(2), caps.get(3)) {
            return Line::Task {
                prefix: prefix.as_str(),
                mark: mark.as_str().chars().next().unwrap_or(' '),
                rest: rest.as_str(),
            };
        }
    }

    if line.trim().is_empty() {
        Line::Blank
    } else {
        Line::Other
    }
}

/// Parse document text.
///
/// Fails only when the header block is not valid YAML or is not a mapping.
pub fn parse(text: &str) -> Result<Document> {
    let (header, body) = Header::split(text)?;
    Ok(Document {
        header,
        blocks: parse_body(body),
    })
}

fn parse_body(body: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    if body.is_empty() {
        return blocks;
    }

    let lines: Vec<&str> = body.split('\n').collect();
    let mut unrecognized: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let (line, crlf) = strip_cr(lines[i]);
        match classify(line) {
            Line::Heading { level, text } => {
                flush_unrecognized(&mut blocks, &mut unrecognized);
                blocks.push(Block::Heading {
                    level,
                    text: text.to_string(),
                    crlf,
                });
                i += 1;
            }
            Line::Task { prefix, mark, rest } => {
                flush_unrecognized(&mut blocks, &mut unrecognized);
                i += 1;

                let details_start = i;
                while i < lines.len() && classify(strip_cr(lines[i]).0) == Line::Other {
                    i += 1;
                }
                let details = (i > details_start).then(|| lines[details_start..i].join("\n"));

                let parts = inline::extract(rest);
                blocks.push(Block::Task(Task {
                    prefix: prefix.to_string(),
                    completed: (mark != ' ').then_some(mark),
                    name: parts.name,
                    details,
                    task_id: parts.task_id,
                    session_status: parts.session_status,
                    crlf,
                }));
            }
            Line::Blank | Line::Other => {
                unrecognized.push(lines[i]);
                i += 1;
            }
        }
    }
    flush_unrecognized(&mut blocks, &mut unrecognized);

    blocks
}

fn flush_unrecognized(blocks: &mut Vec<Block>, pending: &mut Vec<&str>) {
    if pending.is_empty() {
        return;
    }
    blocks.push(Block::Unrecognized {
        raw_text: pending.join("\n"),
    });
    pending.clear();
}

/// Render a document back to text
pub fn serialize(document: &Document) -> String {
    let mut out = document.header.render();
    let body: Vec<String> = document.blocks.iter().map(render_block).collect();
    out.push_str(&body.join("\n"));
    out
}

/// Render one block, details included
pub fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, text, crlf } => {
            let end = if *crlf { "\r" } else { "" };
            format!("{} {}{}", "#".repeat(usize::from(*level)), text, end)
        }
        Block::Task(task) => render_task(task),
        Block::Unrecognized { raw_text } => raw_text.clone(),
    }
}

fn render_task(task: &Task) -> String {
    let mut out = format!(
        "{}[{}] {}",
        task.prefix,
        task.completed.unwrap_or(' '),
        inline::render(
            &task.name,
            task.task_id.as_deref(),
            task.session_status.as_ref()
        )
    );
    if task.crlf {
        out.push('\r');
    }
    if let Some(details) = &task.details {
        out.push('\n');
        out.push_str(details);
    }
    out
}
