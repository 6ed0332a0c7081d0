//! YAML header block
//!
//! The header sits between a `---` line at the very top of the file and the
//! next `---` line. Only a handful of keys mean anything to rightnow; every
//! other key is kept as-is.
//!
//! ```text
//! ---
//! pomodoro_settings:
//!   work_duration: 25
//!   break_duration: 5
//! right_now:
//!   work_state: working
//!   state_transitions:
//!     started_at: 1700000000000
//!     ends_at: 1700001500000
//!   active_task_id: abc.write-report
//! ---
//! ```
//!
//! Typed getters never rewrite what they read: a malformed value reads as
//! absent (or as the default duration) but is written back unchanged unless
//! a caller replaces it through a setter.

use crate::error::{Error, Result};
use crate::types::{StateTransitions, StateTransitionsPatch, WorkState};
use serde_yaml::{Mapping, Value};

/// Default `pomodoro_settings.work_duration` in minutes
pub const DEFAULT_WORK_DURATION: u64 = 25;
/// Default `pomodoro_settings.break_duration` in minutes
pub const DEFAULT_BREAK_DURATION: u64 = 5;

const MARKER: &str = "---";

const SETTINGS: &str = "pomodoro_settings";
const RIGHT_NOW: &str = "right_now";
const TRANSITIONS: &str = "state_transitions";

/// Header fields plus enough of the original text to re-emit it verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    /// Header text as parsed, both markers and the trailing newline included
    raw: Option<String>,
    /// Fields as they were parsed; when `fields` still equals this, `raw` is reused
    parsed: Mapping,
    fields: Mapping,
}

impl Header {
    /// Whether the document has (or will be written with) a header block
    pub fn is_present(&self) -> bool {
        self.raw.is_some() || !self.fields.is_empty()
    }

    /// All header fields, including ones rightnow does not interpret
    pub fn fields(&self) -> &Mapping {
        &self.fields
    }

    // ----- typed getters -----

    pub fn work_duration(&self) -> u64 {
        self.duration(&[SETTINGS, "work_duration"])
            .unwrap_or(DEFAULT_WORK_DURATION)
    }

    pub fn break_duration(&self) -> u64 {
        self.duration(&[SETTINGS, "break_duration"])
            .unwrap_or(DEFAULT_BREAK_DURATION)
    }

    /// Minutes for the timed phase of `state`; planning is untimed
    pub fn duration_for(&self, state: WorkState) -> Option<u64> {
        match state {
            WorkState::Working => Some(self.work_duration()),
            WorkState::Break => Some(self.break_duration()),
            WorkState::Planning => None,
        }
    }

    pub fn work_state(&self) -> Option<WorkState> {
        self.get(&[RIGHT_NOW, "work_state"])
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn state_transitions(&self) -> StateTransitions {
        StateTransitions {
            started_at: self
                .get(&[RIGHT_NOW, TRANSITIONS, "started_at"])
                .and_then(Value::as_i64),
            ends_at: self
                .get(&[RIGHT_NOW, TRANSITIONS, "ends_at"])
                .and_then(Value::as_i64),
        }
    }

    pub fn active_task_id(&self) -> Option<&str> {
        self.get(&[RIGHT_NOW, "active_task_id"])
            .and_then(Value::as_str)
    }

    // ----- setters -----

    pub fn set_work_state(&mut self, state: Option<WorkState>) {
        let path = [RIGHT_NOW, "work_state"];
        match state {
            Some(state) => self.set(&path, Value::String(state.as_str().to_string())),
            None => self.remove(&path),
        }
    }

    /// Replace both timestamps; `None` removes the key
    pub fn set_state_transitions(&mut self, transitions: StateTransitions) {
        for (key, value) in [
            ("started_at", transitions.started_at),
            ("ends_at", transitions.ends_at),
        ] {
            let path = [RIGHT_NOW, TRANSITIONS, key];
            match value {
                Some(ms) => self.set(&path, Value::Number(ms.into())),
                None => self.remove(&path),
            }
        }
    }

    /// Touch only the timestamps the patch names, leaving the others as
    /// they are on disk (even when they are not valid numbers)
    pub fn patch_state_transitions(&mut self, patch: StateTransitionsPatch) {
        for (key, change) in [("started_at", patch.started_at), ("ends_at", patch.ends_at)] {
            let path = [RIGHT_NOW, TRANSITIONS, key];
            match change {
                Some(Some(ms)) => self.set(&path, Value::Number(ms.into())),
                Some(None) => self.remove(&path),
                None => {}
            }
        }
    }

    pub fn set_active_task_id(&mut self, task_id: Option<&str>) {
        let path = [RIGHT_NOW, "active_task_id"];
        match task_id {
            Some(id) => self.set(&path, Value::String(id.to_string())),
            None => self.remove(&path),
        }
    }

    // ----- raw access -----

    /// Look up a nested value by key path
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut value = self.fields.get(*first)?;
        for key in rest {
            value = value.as_mapping()?.get(*key)?;
        }
        Some(value)
    }

    /// Set a nested value, creating intermediate mappings.
    ///
    /// An intermediate key holding a non-mapping value is replaced.
    pub fn set(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut map = &mut self.fields;
        for key in parents {
            let slot = map
                .entry(Value::String(key.to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !slot.is_mapping() {
                *slot = Value::Mapping(Mapping::new());
            }
            map = match slot {
                Value::Mapping(inner) => inner,
                _ => unreachable!("slot was just made a mapping"),
            };
        }
        map.insert(Value::String(last.to_string()), value);
    }

    /// Remove a nested value; missing keys are ignored.
    ///
    /// Parent mappings left empty by the removal go too.
    pub fn remove(&mut self, path: &[&str]) {
        remove_in(&mut self.fields, path);
    }

    fn duration(&self, path: &[&str]) -> Option<u64> {
        self.get(path).and_then(Value::as_u64).filter(|m| *m > 0)
    }

    // ----- text -----

    /// Split `text` into a header and the body that follows it.
    ///
    /// Text without an opening `---` line, or with no closing `---` line,
    /// has no header and is returned whole as the body.
    pub(crate) fn split(text: &str) -> Result<(Header, &str)> {
        let Some((raw, yaml, body)) = split_markers(text) else {
            return Ok((Header::default(), text));
        };

        let fields = match serde_yaml::from_str::<Value>(yaml) {
            Ok(Value::Mapping(map)) => map,
            Ok(Value::Null) => Mapping::new(),
            Ok(other) => {
                return Err(Error::Parse(format!(
                    "header must be a mapping, found {}",
                    value_kind(&other)
                )))
            }
            Err(e) => return Err(Error::Parse(format!("invalid header: {}", e))),
        };

        Ok((
            Header {
                raw: Some(raw.to_string()),
                parsed: fields.clone(),
                fields,
            },
            body,
        ))
    }

    /// Render the header block, reusing the parsed text when nothing changed.
    pub(crate) fn render(&self) -> String {
        if let Some(raw) = &self.raw {
            if self.fields == self.parsed {
                return raw.clone();
            }
        } else if self.fields.is_empty() {
            return String::new();
        }

        let mut out = String::from(MARKER);
        out.push('\n');
        if !self.fields.is_empty() {
            match serde_yaml::to_string(&self.fields) {
                Ok(yaml) => out.push_str(&yaml),
                // A mapping of plain YAML values always serializes.
                Err(e) => tracing::error!(error = %e, "failed to render header"),
            }
        }
        out.push_str(MARKER);
        out.push('\n');
        out
    }
}

/// Returns `(whole header text, yaml between markers, body)`.
fn split_markers(text: &str) -> Option<(&str, &str, &str)> {
    let first_end = text.find('\n')?;
    if text[..first_end].trim_end_matches('\r') != MARKER {
        return None;
    }

    let yaml_start = first_end + 1;
    let mut pos = yaml_start;
    while pos < text.len() {
        let rest = &text[pos..];
        let (line, next) = match rest.find('\n') {
            Some(i) => (&rest[..i], pos + i + 1),
            None => (rest, text.len()),
        };
        if line.trim_end_matches('\r') == MARKER {
            return Some((&text[..next], &text[yaml_start..pos], &text[next..]));
        }
        pos = next;
    }
    None
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Returns whether a key was removed
fn remove_in(map: &mut Mapping, path: &[&str]) -> bool {
    match path {
        [] => false,
        [last] => map.shift_remove(*last).is_some(),
        [key, rest @ ..] => {
            let Some(Value::Mapping(inner)) = map.get_mut(*key) else {
                return false;
            };
            let removed = remove_in(inner, rest);
            if removed && inner.is_empty() {
                map.shift_remove(*key);
            }
            removed
        }
    }
}
