//! Inline task metadata
//!
//! The text after a task's checkbox may end with two optional tokens, always
//! in this order and each preceded by a single space:
//!
//! ```text
//! Write report [abc.write-report] [Running](todos://session/42)
//! ^ name       ^ task identifier  ^ session badge
//! ```
//!
//! The badge is stripped first since it is textually last, then the
//! identifier. Anything that merely looks like a token (no leading space,
//! another scheme, an unknown status, a non-numeric id) stays in the name.

use crate::types::{SessionId, SessionState, SessionStatus};
use regex::Regex;
use std::sync::OnceLock;

/// URL scheme used by session badges
pub const SESSION_SCHEME: &str = "todos";

/// Task text split into name and metadata tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineParts {
    pub name: String,
    pub task_id: Option<String>,
    pub session_status: Option<SessionStatus>,
}

fn badge_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*) \[(Running|Waiting|Stopped)\]\(todos://session/([0-9]+)\)$")
            .expect("badge pattern is valid")
    })
}

fn task_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*) \[([a-z]{3,4}\.[a-z0-9-]+)\]$").expect("task id pattern is valid")
    })
}

/// Whether `id` has the `prefix.label` shape of a task identifier
pub fn is_task_id(id: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{3,4}\.[a-z0-9-]+$").expect("task id pattern is valid"))
        .is_match(id)
}

/// Split the text after a checkbox into name, identifier, and badge.
pub fn extract(text: &str) -> InlineParts {
    let mut rest = text;

    let session_status = badge_regex().captures(rest).and_then(|caps| {
        let status = caps.get(2)?.as_str().parse::<SessionState>().ok()?;
        let session_id = SessionId::parse(caps.get(3)?.as_str())?;
        rest = caps.get(1)?.as_str();
        Some(SessionStatus { status, session_id })
    });

    let task_id = task_id_regex().captures(rest).and_then(|caps| {
        let id = caps.get(2)?.as_str().to_string();
        rest = caps.get(1)?.as_str();
        Some(id)
    });

    InlineParts {
        name: rest.to_string(),
        task_id,
        session_status,
    }
}

/// Inverse of [`extract`]
pub fn render(
    name: &str,
    task_id: Option<&str>,
    session_status: Option<&SessionStatus>,
) -> String {
    let mut out = String::from(name);
    if let Some(id) = task_id {
        out.push_str(" [");
        out.push_str(id);
        out.push(']');
    }
    if let Some(badge) = session_status {
        out.push_str(&format!(
            " [{}]({}://session/{})",
            badge.status, SESSION_SCHEME, badge.session_id
        ));
    }
    out
}
