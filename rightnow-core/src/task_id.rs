//! Task identifier generation
//!
//! Identifiers look like `abc.write-report`: a short random lowercase prefix
//! and a label derived from the task name. The prefix is what keeps two
//! tasks with the same name apart.

use crate::clock::{Clock, SystemClock};
use crate::types::{Document, Task};
use rand::Rng;
use std::collections::HashSet;

/// Longest label kept from a task name
const MAX_LABEL_LEN: usize = 40;
/// Random prefixes tried per prefix length before giving up on that length
const ATTEMPTS_PER_LENGTH: usize = 100;
const FALLBACK_LABEL: &str = "task";

/// Build the label part of an identifier from a task name.
///
/// `"Call Mom -- about Sunday!"` becomes `"call-mom-about-sunday"`.
pub fn label_for(name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();

    let hyphenated = kept.split_whitespace().collect::<Vec<_>>().join("-");

    let mut collapsed = String::with_capacity(hyphenated.len());
    for c in hyphenated.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    let label: String = collapsed
        .trim_matches('-')
        .chars()
        .take(MAX_LABEL_LEN)
        .collect();

    if label.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        label
    }
}

/// Generate an identifier for `name` that is not in `existing`.
pub fn generate(name: &str, existing: &HashSet<String>) -> String {
    generate_with(name, existing, &mut rand::rng(), &SystemClock)
}

/// [`generate`] with an explicit randomness source and clock.
///
/// Tries 3-letter prefixes, then 4-letter prefixes, and as a last resort
/// appends the current epoch milliseconds to a 4-letter candidate.
pub fn generate_with<R: Rng>(
    name: &str,
    existing: &HashSet<String>,
    rng: &mut R,
    clock: &dyn Clock,
) -> String {
    let label = label_for(name);

    for len in [3, 4] {
        for _ in 0..ATTEMPTS_PER_LENGTH {
            let candidate = format!("{}.{}", random_prefix(rng, len), label);
            if !existing.contains(&candidate) {
                return candidate;
            }
        }
    }

    tracing::warn!(
        label = %label,
        "identifier prefixes exhausted, falling back to timestamp suffix"
    );
    format!("{}.{}-{}", random_prefix(rng, 4), label, clock.now_ms())
}

/// Give `task` an identifier if it has none, registering it in `existing`.
pub fn ensure(task: &mut Task, existing: &mut HashSet<String>) {
    if task.task_id.is_some() {
        return;
    }
    let id = generate(&task.name, existing);
    existing.insert(id.clone());
    task.task_id = Some(id);
}

/// Give every task in the document an identifier, in document order.
///
/// Returns how many identifiers were added.
pub fn assign_missing_ids(document: &mut Document) -> usize {
    let mut existing = document.task_ids();
    let mut added = 0;
    for task in document.tasks_mut() {
        if task.task_id.is_none() {
            ensure(task, &mut existing);
            added += 1;
        }
    }
    added
}

fn random_prefix<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect()
}
