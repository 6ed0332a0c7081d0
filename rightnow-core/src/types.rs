//! Core domain types for rightnow
//!
//! A [`Document`] is one plain-text file: a YAML [`Header`] followed by an
//! ordered list of body [`Block`]s. Block order is the only structure; there
//! is no heading tree.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Header** | YAML block between `---` markers at the top of the file |
//! | **Block** | One parsed unit of the body (heading, task, or anything else) |
//! | **Task identifier** | `[prefix.label]` token naming a task, unique per document |
//! | **Session badge** | `[Status](todos://session/<id>)` token linking a task to a session |
//! | **Work state** | Pomodoro phase: planning, working, or on a break |

use crate::document::header::Header;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ============================================
// Document
// ============================================

/// A parsed document.
///
/// `serialize(parse(text))` reproduces `text` exactly as long as nothing was
/// changed in between.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub header: Header,
    pub blocks: Vec<Block>,
}

impl Document {
    /// Iterate all tasks in document order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Task(task) => Some(task),
            _ => None,
        })
    }

    /// Iterate all tasks mutably in document order
    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.blocks.iter_mut().filter_map(|block| match block {
            Block::Task(task) => Some(task),
            _ => None,
        })
    }

    /// Find a task by its identifier
    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks()
            .find(|task| task.task_id.as_deref() == Some(task_id))
    }

    /// Find a task by its identifier, mutably
    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks_mut()
            .find(|task| task.task_id.as_deref() == Some(task_id))
    }

    /// All task identifiers currently in use
    pub fn task_ids(&self) -> HashSet<String> {
        self.tasks().filter_map(|task| task.task_id.clone()).collect()
    }

    /// Append a task after the last non-blank block.
    ///
    /// A trailing blank block (the file's final newline) stays last so the
    /// file keeps ending the way it did. The new line takes the line ending
    /// of the last task already in the document.
    pub fn push_task(&mut self, mut task: Task) {
        if let Some(last) = self.tasks().last() {
            task.crlf |= last.crlf;
        }
        let at = match self.blocks.last() {
            Some(Block::Unrecognized { raw_text }) if raw_text.trim().is_empty() => {
                self.blocks.len() - 1
            }
            _ => self.blocks.len(),
        };
        self.blocks.insert(at, Block::Task(task));
    }
}

// ============================================
// Blocks
// ============================================

/// One unit of the document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `#` to `######`, a space, then text
    Heading {
        level: u8,
        text: String,
        /// Line ended with `\r\n`
        crlf: bool,
    },
    /// A checkbox line plus any detail lines under it
    Task(Task),
    /// Lines matching neither form, kept byte-for-byte (blank lines included)
    Unrecognized { raw_text: String },
}

impl Block {
    pub fn is_heading(&self) -> bool {
        matches!(self, Block::Heading { .. })
    }
}

// ============================================
// Tasks
// ============================================

/// A checkbox line such as `- [x] Write report [abc.write-report]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Indentation and bullet before the checkbox, e.g. `"- "` or `"  * "`
    pub prefix: String,
    /// `None` for `[ ]`, otherwise the mark character (`x` or `X`)
    pub completed: Option<char>,
    /// Task text with identifier and badge tokens removed
    pub name: String,
    /// Lines following the task line, verbatim, joined by `\n`
    pub details: Option<String>,
    /// `prefix.label` without brackets
    pub task_id: Option<String>,
    pub session_status: Option<SessionStatus>,
    /// Task line ended with `\r\n`
    pub crlf: bool,
}

impl Task {
    /// A new incomplete `- [ ]` task
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            prefix: "- ".to_string(),
            completed: None,
            name: name.into(),
            details: None,
            task_id: None,
            session_status: None,
            crlf: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.is_some()
    }

    /// Flip between `[ ]` and `[x]`
    pub fn toggle(&mut self) {
        self.completed = match self.completed {
            Some(_) => None,
            None => Some('x'),
        };
    }
}

// ============================================
// Session badges
// ============================================

/// State shown in a task's session badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Running,
    Waiting,
    Stopped,
}

impl SessionState {
    /// Returns the label used inside the badge brackets
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Running => "Running",
            SessionState::Waiting => "Waiting",
            SessionState::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(SessionState::Running),
            "Waiting" => Ok(SessionState::Waiting),
            "Stopped" => Ok(SessionState::Stopped),
            _ => Err(format!("unknown session state: {}", s)),
        }
    }
}

/// Session number from a badge URL.
///
/// Kept as its decimal digits so ids of any magnitude (and any leading
/// zeros) survive a round trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Accepts a non-empty string of ASCII digits
    pub fn parse(digits: &str) -> Option<Self> {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(digits.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl TryFrom<String> for SessionId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid session id: {}", value))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed `[Status](todos://session/<id>)` badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub status: SessionState,
    pub session_id: SessionId,
}

// ============================================
// Timer state
// ============================================

/// Pomodoro phase stored under `right_now.work_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    Planning,
    Working,
    Break,
}

impl WorkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkState::Planning => "planning",
            WorkState::Working => "working",
            WorkState::Break => "break",
        }
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(WorkState::Planning),
            "working" => Ok(WorkState::Working),
            "break" => Ok(WorkState::Break),
            _ => Err(format!("unknown work state: {}", s)),
        }
    }
}

/// Timer bounds stored under `right_now.state_transitions` (epoch ms)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransitions {
    pub started_at: Option<i64>,
    /// Absent while planning
    pub ends_at: Option<i64>,
}

/// Partial update for [`StateTransitions`].
///
/// `None` leaves a field alone, `Some(None)` removes it, `Some(Some(ms))` sets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateTransitionsPatch {
    pub started_at: Option<Option<i64>>,
    pub ends_at: Option<Option<i64>>,
}

impl StateTransitionsPatch {
    pub fn apply(&self, base: StateTransitions) -> StateTransitions {
        StateTransitions {
            started_at: self.started_at.unwrap_or(base.started_at),
            ends_at: self.ends_at.unwrap_or(base.ends_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_accepts_only_digits() {
        assert!(SessionId::parse("42").is_some());
        assert!(SessionId::parse("0042").is_some());
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("-1").is_none());
        assert!(SessionId::parse("12a").is_none());

        let huge = "123456789012345678901234567890";
        assert_eq!(SessionId::parse(huge).unwrap().as_str(), huge);
        assert_eq!(SessionId::from(7u64).to_string(), "7");
    }

    #[test]
    fn test_work_state_round_trip() {
        for state in [WorkState::Planning, WorkState::Working, WorkState::Break] {
            assert_eq!(state.as_str().parse::<WorkState>().unwrap(), state);
        }
        assert!("Working".parse::<WorkState>().is_err());
    }

    #[test]
    fn test_task_toggle() {
        let mut task = Task::new("Write report");
        assert!(!task.is_complete());
        task.toggle();
        assert_eq!(task.completed, Some('x'));
        task.toggle();
        assert!(!task.is_complete());
    }

    #[test]
    fn test_transitions_patch() {
        let base = StateTransitions {
            started_at: Some(1),
            ends_at: Some(2),
        };
        let patch = StateTransitionsPatch {
            started_at: Some(Some(10)),
            ends_at: Some(None),
        };
        assert_eq!(
            patch.apply(base),
            StateTransitions {
                started_at: Some(10),
                ends_at: None,
            }
        );
        assert_eq!(StateTransitionsPatch::default().apply(base), base);
    }

    #[test]
    fn test_push_task_keeps_trailing_newline_last() {
        let mut doc = Document {
            header: Header::default(),
            blocks: vec![
                Block::Task(Task::new("one")),
                Block::Unrecognized {
                    raw_text: String::new(),
                },
            ],
        };
        doc.push_task(Task::new("two"));
        assert_eq!(doc.tasks().count(), 2);
        assert!(matches!(doc.blocks.last(), Some(Block::Unrecognized { .. })));
    }
}
