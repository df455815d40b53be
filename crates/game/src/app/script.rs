use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tileroom_engine::{Coordinates, RoomEvent};

#[derive(Debug, Error)]
pub(crate) enum SessionScriptError {
    #[error("failed to read session script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse session script: {message}")]
    Parse { message: String },
    #[error("session script validation failed at {path}: {message}")]
    Invalid { path: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct BoardSize {
    pub width: u32,
    pub height: u32,
}

impl Default for BoardSize {
    fn default() -> Self {
        Self {
            width: 8,
            height: 8,
        }
    }
}

/// A room message the scripted server emits once the session clock reaches `at`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct TimedRoomEvent {
    pub at: f32,
    #[serde(flatten)]
    pub event: RoomEvent,
}

/// A local tile click, as if the player had pressed on the board.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TimedClick {
    pub at: f32,
    pub col: i32,
    pub row: i32,
}

impl TimedClick {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.col, self.row)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SessionScript {
    pub player_id: String,
    #[serde(default)]
    pub board: BoardSize,
    #[serde(default)]
    pub events: Vec<TimedRoomEvent>,
    #[serde(default)]
    pub clicks: Vec<TimedClick>,
    /// Answer the player's move requests with a straight-line path.
    #[serde(default)]
    pub echo_moves: bool,
    /// Session clock at which the run ends. Defaults to a few seconds after the last entry.
    #[serde(default)]
    pub end_at: Option<f32>,
}

const SETTLE_SECONDS: f32 = 5.0;

impl SessionScript {
    pub fn load(path: &Path) -> Result<Self, SessionScriptError> {
        let raw = fs::read_to_string(path).map_err(|source| SessionScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, SessionScriptError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let mut script =
            match serde_path_to_error::deserialize::<_, SessionScript>(&mut deserializer) {
                Ok(script) => script,
                Err(error) => {
                    let path = error.path().to_string();
                    let source = error.into_inner();
                    let message = if path.is_empty() || path == "." {
                        source.to_string()
                    } else {
                        format!("at {path}: {source}")
                    };
                    return Err(SessionScriptError::Parse { message });
                }
            };
        script.validate()?;
        script.events.sort_by(|a, b| a.at.total_cmp(&b.at));
        script.clicks.sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(script)
    }

    pub fn end_at(&self) -> f32 {
        self.end_at.unwrap_or_else(|| {
            let last_event = self.events.iter().map(|e| e.at).fold(0.0, f32::max);
            let last_click = self.clicks.iter().map(|c| c.at).fold(0.0, f32::max);
            last_event.max(last_click) + SETTLE_SECONDS
        })
    }

    fn validate(&self) -> Result<(), SessionScriptError> {
        if self.player_id.trim().is_empty() {
            return Err(invalid("player_id", "must not be empty"));
        }
        if self.board.width == 0 || self.board.height == 0 {
            return Err(invalid(
                "board",
                format!(
                    "expected non-empty board, got {}x{}",
                    self.board.width, self.board.height
                ),
            ));
        }
        for (idx, event) in self.events.iter().enumerate() {
            validate_time(&format!("events[{idx}].at"), event.at)?;
        }
        for (idx, click) in self.clicks.iter().enumerate() {
            validate_time(&format!("clicks[{idx}].at"), click.at)?;
        }
        if let Some(end_at) = self.end_at {
            validate_time("end_at", end_at)?;
        }
        Ok(())
    }
}

fn validate_time(path: &str, at: f32) -> Result<(), SessionScriptError> {
    if at.is_finite() && at >= 0.0 {
        Ok(())
    } else {
        Err(invalid(path, format!("expected finite time >= 0, got {at}")))
    }
}

fn invalid(path: &str, message: impl Into<String>) -> SessionScriptError {
    SessionScriptError::Invalid {
        path: path.to_string(),
        message: message.into(),
    }
}
