//! The recoverer's observable state (design component C8).

use serde::{Deserialize, Serialize};

/// Linear progression; `Succeeded`, `DownloadFailed`, and `ImportFailed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Inactive,
    Downloading,
    DownloadFailed,
    Importing,
    ImportFailed,
    Succeeded,
}

/// `Clone + Debug + PartialEq + Serialize` so an HTTP surface can hand
/// this straight to a JSON encoder without a hand-mapped view type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryState {
    pub stage: Stage,
    pub failure_reason: Option<String>,
}

impl RecoveryState {
    pub fn inactive() -> Self {
        RecoveryState {
            stage: Stage::Inactive,
            failure_reason: None,
        }
    }
}

impl Default for RecoveryState {
    fn default() -> Self {
        RecoveryState::inactive()
    }
}
