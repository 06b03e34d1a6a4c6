use serde::{Serialize, Deserialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Preparing,
    Generating,
    Finalizing,
    Complete,
    Error,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Error)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Stage::Preparing | Stage::Generating | Stage::Finalizing)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Preparing => "preparing",
            Stage::Generating => "generating",
            Stage::Finalizing => "finalizing",
            Stage::Complete => "complete",
            Stage::Error => "error",
        };
        f.write_str(s)
    }
}

/// What the progress indicator shows.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientProgressState {
    pub stage: Stage,
    /// Whole percent, 0..=100.
    pub progress: u8,
    pub message: String,
}

impl ClientProgressState {
    pub fn idle() -> Self {
        Self { stage: Stage::Idle, progress: 0, message: String::new() }
    }
}

impl Default for ClientProgressState {
    fn default() -> Self {
        Self::idle()
    }
}
