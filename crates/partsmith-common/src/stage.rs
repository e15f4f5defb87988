//! Per-stage lifecycle types.

use serde::{Deserialize, Serialize};

/// Lifecycle of one stage within a run.
///
/// `Pending → Streaming → Summarizing → Completed`, or `Streaming → Errored`.
/// Retries stay in `Streaming`; nothing ever returns to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    #[default]
    Pending,
    Streaming,
    Summarizing,
    Completed,
    Errored,
}

impl StageState {
    /// Check if the stage is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: StageState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Streaming)
                | (Self::Pending, Self::Errored)
                | (Self::Streaming, Self::Streaming)
                | (Self::Streaming, Self::Summarizing)
                | (Self::Streaming, Self::Errored)
                | (Self::Summarizing, Self::Completed)
        )
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageState::Pending => write!(f, "pending"),
            StageState::Streaming => write!(f, "streaming"),
            StageState::Summarizing => write!(f, "summarizing"),
            StageState::Completed => write!(f, "completed"),
            StageState::Errored => write!(f, "errored"),
        }
    }
}

/// Output of a stage that reached `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Section title the content belongs to.
    pub section: String,
    /// Concatenation of every fragment of the successful attempt.
    pub content: String,
    /// Short digest committed to session memory.
    pub summary: String,
}
