//! Coarse per-game summaries kept on the host device.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::state::GameState;

/// File the summaries are appended to, one JSON object per line.
pub const HISTORY_FILE_NAME: &str = "history.jsonl";

/// What is remembered about a finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub start_time: u64,
    pub end_time: u64,
    pub player_count: usize,
    /// Name of the top scorer; ties go to the first by player id.
    pub winner: Option<String>,
}

impl HistorySummary {
    /// Summarize a game. Returns `None` until it has reached game over.
    pub fn from_state(state: &GameState) -> Option<Self> {
        let end_time = state.ended_at?;
        Some(Self {
            start_time: state.started_at.unwrap_or(end_time),
            end_time,
            player_count: state.players.len(),
            winner: state.leaders().first().map(|p| p.name.clone()),
        })
    }
}

/// Errors from the history store.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only log of finished games.
pub trait HistoryStore {
    fn append(&self, summary: &HistorySummary) -> Result<(), HistoryError>;
}

/// [`HistoryStore`] writing JSON lines to a file.
#[derive(Debug, Clone)]
pub struct JsonlHistory {
    path: PathBuf,
}

impl JsonlHistory {
    /// Store in `dir`/[`HISTORY_FILE_NAME`].
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(HISTORY_FILE_NAME),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every summary written so far. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<HistorySummary>, HistoryError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut summaries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            summaries.push(serde_json::from_str(&line)?);
        }
        Ok(summaries)
    }
}

impl HistoryStore for JsonlHistory {
    fn append(&self, summary: &HistorySummary) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(summary)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        tracing::debug!(path = %self.path.display(), "History appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Player, PlayerId, Stage};
    use decoy_config::GameConfig;

    fn finished_game() -> GameState {
        let mut state = GameState::new(GameConfig::default());
        for (id, points) in [("p1", 8), ("p2", 13), ("p3", 13)] {
            state.players.insert(
                PlayerId::from(id),
                Player {
                    id: PlayerId::from(id),
                    name: id.to_uppercase(),
                    avatar_url: None,
                    connected: true,
                    points,
                    last_seen: 0,
                },
            );
        }
        state.stage = Stage::GameOver;
        state.started_at = Some(1_000);
        state.ended_at = Some(9_000);
        state
    }

    #[test]
    fn test_summary_requires_game_over() {
        assert_eq!(
            HistorySummary::from_state(&GameState::new(GameConfig::default())),
            None
        );
        let summary = HistorySummary::from_state(&finished_game()).unwrap();
        assert_eq!(summary.player_count, 3);
        assert_eq!(summary.winner.as_deref(), Some("P2"));
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistory::in_dir(dir.path());
        assert!(store.read_all().unwrap().is_empty());

        let summary = HistorySummary::from_state(&finished_game()).unwrap();
        store.append(&summary).unwrap();
        store.append(&summary).unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert_eq!(store.read_all().unwrap(), vec![summary.clone(), summary]);
    }
}
