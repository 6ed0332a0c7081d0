//! rightnow - plain-text task list and focus timer
//!
//! Reads and edits a single Markdown document. Every command goes through the
//! document manager, so edits made in an editor at the same time are
//! re-read before anything is written.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Recent documents: $XDG_DATA_HOME/rightnow/recent.json
//! - Logs: $XDG_STATE_HOME/rightnow/rightnow.log
//! - Config: $XDG_CONFIG_HOME/rightnow/config.toml

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use rightnow_core::{
    Block, Config, Direction, DocumentManager, LoadedDocumentState, ManagerOptions, SessionId,
    SessionState, SessionStatus, Snapshot, WorkState,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rightnow")]
#[command(about = "Plain-text task list and focus timer")]
#[command(version)]
struct Args {
    /// Document to operate on (defaults to `[document] default_path`)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the document's tasks and timer state
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start a work interval
    Work,
    /// Start a break
    Break,
    /// Stop the timer and go back to planning
    Plan,
    /// Set or clear the active task
    Active {
        /// Task identifier, e.g. abc.write-report
        task_id: Option<String>,
        /// Clear the active task
        #[arg(long, conflicts_with = "task_id")]
        clear: bool,
    },
    /// Move the section starting at a heading up or down
    Move {
        /// Block index of the heading (as printed by `show`)
        index: usize,
        /// up or down
        direction: Direction,
    },
    /// Give every task without an identifier a new one
    Ids,
    /// Append a new task
    Add {
        /// Task name
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },
    /// Check or uncheck a task
    Toggle {
        /// Task identifier
        task_id: String,
    },
    /// Set or clear a task's session badge
    Session {
        /// Task identifier
        task_id: String,
        /// running, waiting, or stopped
        #[arg(long, requires = "id", value_parser = parse_session_state)]
        status: Option<SessionState>,
        /// Numeric session id
        #[arg(long, requires = "status")]
        id: Option<String>,
    },
    /// Print the document every time it changes until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        rightnow_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let path = args
        .file
        .clone()
        .or_else(|| config.document.resolved_default_path())
        .context("no document given; pass --file or set [document] default_path")?;

    tracing::info!(path = %path.display(), "rightnow starting");

    let mut options = ManagerOptions::from_config(&config);
    if !matches!(args.command, Command::Watch) {
        options.watcher = None;
    }
    let manager = DocumentManager::new(options);
    manager
        .load(&path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;

    let result = run(&manager, args.command).await;
    manager.shutdown();
    result
}

async fn run(manager: &DocumentManager, command: Command) -> Result<()> {
    match command {
        Command::Show { json } => {
            let state = current(manager)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&to_json(&state))?);
            } else {
                print_state(&state);
            }
        }
        Command::Work => set_work_state(manager, WorkState::Working).await?,
        Command::Break => set_work_state(manager, WorkState::Break).await?,
        Command::Plan => set_work_state(manager, WorkState::Planning).await?,
        Command::Active { task_id, clear } => {
            if !clear && task_id.is_none() {
                let state = current(manager)?;
                match state.document.header.active_task_id() {
                    Some(id) => println!("{}", id),
                    None => println!("No active task"),
                }
                return Ok(());
            }
            if let Some(id) = &task_id {
                let state = current(manager)?;
                if state.document.find_task(id).is_none() {
                    anyhow::bail!("No task with identifier '{}'", id);
                }
            }
            manager
                .set_active_task(task_id.as_deref())
                .await
                .context("failed to set active task")?;
            match task_id {
                Some(id) => println!("Active task: {}", id),
                None => println!("Active task cleared"),
            }
        }
        Command::Move { index, direction } => {
            let moved = manager
                .move_section(index, direction)
                .await
                .context("failed to move section")?;
            if moved {
                println!("Moved section at {} {:?}", index, direction);
            } else {
                println!("Nothing to move");
            }
        }
        Command::Ids => {
            let added = manager
                .assign_missing_task_ids()
                .await
                .context("failed to assign identifiers")?;
            println!("Assigned {} identifier(s)", added);
        }
        Command::Add { name } => {
            let name = name.join(" ");
            match manager.add_task(&name).await.context("failed to add task")? {
                Some(id) => println!("Added [{}] {}", id, name),
                None => anyhow::bail!("Document could not be updated"),
            }
        }
        Command::Toggle { task_id } => {
            let state = current(manager)?;
            if state.document.find_task(&task_id).is_none() {
                anyhow::bail!("No task with identifier '{}'", task_id);
            }
            manager
                .toggle_task(&task_id)
                .await
                .context("failed to toggle task")?;
            let state = current(manager)?;
            let done = state
                .document
                .find_task(&task_id)
                .is_some_and(|task| task.is_complete());
            println!("{} {}", if done { "Checked" } else { "Unchecked" }, task_id);
        }
        Command::Session {
            task_id,
            status,
            id,
        } => {
            let session = match (status, id) {
                (Some(status), Some(id)) => {
                    let session_id = SessionId::parse(&id)
                        .with_context(|| format!("session id must be digits, got '{}'", id))?;
                    Some(SessionStatus { status, session_id })
                }
                _ => None,
            };
            manager
                .set_task_session(&task_id, session)
                .await
                .context("failed to set session")?;
            println!("Updated session for {}", task_id);
        }
        Command::Watch => watch(manager).await?,
    }
    Ok(())
}

fn parse_session_state(value: &str) -> std::result::Result<SessionState, String> {
    match value.to_ascii_lowercase().as_str() {
        "running" => Ok(SessionState::Running),
        "waiting" => Ok(SessionState::Waiting),
        "stopped" => Ok(SessionState::Stopped),
        _ => Err(format!("expected running, waiting, or stopped, got '{}'", value)),
    }
}

fn current(manager: &DocumentManager) -> Result<Snapshot> {
    manager.snapshot().context("no document loaded")
}

async fn set_work_state(manager: &DocumentManager, state: WorkState) -> Result<()> {
    let changed = manager
        .set_work_state(state)
        .await
        .context("failed to change work state")?;
    if !changed {
        println!("Already {}", state);
        return Ok(());
    }
    let snapshot = current(manager)?;
    match snapshot.state_transitions.ends_at {
        Some(ends_at) => println!("{} until {}", state, format_time(ends_at)),
        None => println!("{}", state),
    }
    Ok(())
}

async fn watch(manager: &DocumentManager) -> Result<()> {
    manager.subscribe(|state: Snapshot| async move {
        println!("---- {}", Local::now().format("%H:%M:%S"));
        print_state(&state);
    });

    println!("Watching, press Ctrl-C to stop");
    if let Some(state) = manager.snapshot() {
        print_state(&state);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Interrupted, stopping watch");
    Ok(())
}

fn format_time(epoch_ms: i64) -> String {
    DateTime::from_timestamp_millis(epoch_ms)
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

fn print_state(state: &LoadedDocumentState) {
    let header = &state.document.header;
    let work_state = state
        .work_state
        .map(|s| s.to_string())
        .unwrap_or_else(|| "idle".to_string());

    match state.state_transitions.ends_at {
        Some(ends_at) => println!(
            "{} ({}, until {})",
            state.full_path.display(),
            work_state,
            format_time(ends_at)
        ),
        None => println!("{} ({})", state.full_path.display(), work_state),
    }
    if let Some(active) = header.active_task_id() {
        println!("Active: {}", active);
    }
    println!(
        "Durations: work {}m, break {}m",
        header.work_duration(),
        header.break_duration()
    );

    for (index, block) in state.document.blocks.iter().enumerate() {
        match block {
            Block::Heading { level, text, .. } => {
                println!("{:>4}  {} {}", index, "#".repeat(usize::from(*level)), text);
            }
            Block::Task(task) => {
                let mut line = format!(
                    "      [{}] {}",
                    if task.is_complete() { "x" } else { " " },
                    task.name
                );
                if let Some(id) = &task.task_id {
                    line.push_str(&format!("  ({})", id));
                }
                if let Some(session) = &task.session_status {
                    line.push_str(&format!("  {} #{}", session.status, session.session_id));
                }
                println!("{}", line);
            }
            Block::Unrecognized { .. } => {}
        }
    }
}

fn to_json(state: &LoadedDocumentState) -> serde_json::Value {
    let header = &state.document.header;
    let blocks: Vec<serde_json::Value> = state
        .document
        .blocks
        .iter()
        .enumerate()
        .filter_map(|(index, block)| match block {
            Block::Heading { level, text, .. } => Some(serde_json::json!({
                "index": index,
                "type": "heading",
                "level": level,
                "text": text,
            })),
            Block::Task(task) => Some(serde_json::json!({
                "index": index,
                "type": "task",
                "name": task.name,
                "completed": task.is_complete(),
                "task_id": task.task_id,
                "session": task.session_status,
            })),
            Block::Unrecognized { .. } => None,
        })
        .collect();

    serde_json::json!({
        "path": state.full_path,
        "work_state": state.work_state,
        "state_transitions": state.state_transitions,
        "active_task_id": header.active_task_id(),
        "work_duration": header.work_duration(),
        "break_duration": header.break_duration(),
        "blocks": blocks,
    })
}
