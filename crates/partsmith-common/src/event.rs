//! Events emitted by a tutorial run.
//!
//! A run produces exactly one `ProjectTitle`, the overview fragments, then
//! for every catalog stage its fragments followed by one `SectionComplete`
//! or `StageError`, and finally one `PipelineComplete`.
//!
//! Fragments are emitted at least once: when a stage attempt fails half-way
//! and is retried, the fragments of the failed attempt have already been
//! sent and are not retracted. Consumers that want the authoritative text of
//! a section should use the `content` of its `SectionComplete` event.

use serde::{Deserialize, Serialize};

/// One unit of the streamed tutorial.
///
/// Serialized with an `event` tag, one JSON object per line:
///
/// ```text
/// {"event":"project_title","project_title":"Line-following robot"}
/// {"event":"project_overview_fragment","project_overview":"..."}
/// {"event":"section_fragment","section":"Wiring","content":"..."}
/// {"event":"section_complete","section":"Wiring","content":"..."}
/// {"event":"stage_error","section":"Wiring","content":"Error generating content: ..."}
/// {"event":"pipeline_complete"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    ProjectTitle {
        project_title: String,
    },
    ProjectOverviewFragment {
        project_overview: String,
    },
    SectionFragment {
        section: String,
        content: String,
    },
    SectionComplete {
        section: String,
        content: String,
    },
    /// A stage that ended in the errored state; `content` is a human-readable
    /// message shown in place of the section.
    StageError {
        section: String,
        content: String,
    },
    PipelineComplete,
}

impl PipelineEvent {
    /// Section title carried by the event, if any.
    pub fn section(&self) -> Option<&str> {
        match self {
            Self::SectionFragment { section, .. }
            | Self::SectionComplete { section, .. }
            | Self::StageError { section, .. } => Some(section),
            _ => None,
        }
    }

    /// True for the event that closes a stage (`SectionComplete` / `StageError`).
    pub fn is_stage_terminal(&self) -> bool {
        matches!(self, Self::SectionComplete { .. } | Self::StageError { .. })
    }

    /// Serialize as a single newline-terminated JSON line.
    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
