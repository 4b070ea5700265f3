//! Append-only event log shared with the mini-games.
//!
//! Each line is one independent JSON object. The client writes its own lifecycle entries
//! (`Join`, `Ready`); the games it launches append their results to the same file. The whole file
//! is what gets pushed to the host, so it is never rewritten nor read back.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Serialize;
use time::{format_description::parse, OffsetDateTime};
use tracing::{instrument, trace};

/// A single line of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Local time, second precision
    pub timestamp: String,
    /// Phase of the session the event belongs to (`Lobby`, `R1`, `Final`...)
    pub game_stage: String,
    #[serde(rename = "PlayerID")]
    /// Author of the event
    pub player_id: String,
    #[serde(rename = "Action")]
    /// What happened (`Join`, `Ready`...)
    pub action: String,
    #[serde(rename = "Result", skip_serializing_if = "Option::is_none")]
    /// Outcome of a game, when the entry closes one
    pub result: Option<String>,
    #[serde(rename = "Score", skip_serializing_if = "Option::is_none")]
    /// Score reached in that game
    pub score: Option<i64>,
}

impl LogEntry {
    /// An entry stamped with the current local time.
    pub fn now(stage: &str, player_id: &str, action: &str) -> LogEntry {
        LogEntry {
            timestamp: local_timestamp(),
            game_stage: stage.to_string(),
            player_id: player_id.to_string(),
            action: action.to_string(),
            result: None,
            score: None,
        }
    }

    /// Attach a result and a score to the entry.
    pub fn with_result(mut self, result: &str, score: i64) -> LogEntry {
        self.result = Some(result.to_string());
        self.score = Some(score);
        self
    }
}

fn local_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    parse("[year]-[month]-[day] [hour]:[minute]:[second]")
        .ok()
        .and_then(|format| now.format(&format).ok())
        .unwrap_or_else(|| now.unix_timestamp().to_string())
}

/// Writer of the event log. Opened once by the entry point, flushed after every entry and on drop.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    file: File,
}

impl EventLog {
    /// Open (or create) the log at `path` in append mode.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<EventLog> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("could not open event log {}", path.display()))?;
        Ok(EventLog { path, file })
    }

    /// Location of the log on disk, for the games and the uploader.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `entry` as one JSON line.
    #[instrument(skip(self), fields(action = %entry.action))]
    pub fn append(&mut self, entry: &LogEntry) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(entry).context("could not serialize log entry")?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .with_context(|| format!("could not write to {}", self.path.display()))?;
        trace!("appended {}", line.trim_end());
        Ok(())
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}
