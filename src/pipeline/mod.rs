//! Tutorial pipeline: runs the overview and every catalog stage in order and
//! relays what the model writes as a stream of [`PipelineEvent`]s.
//!
//! [`PipelineEvent`]: partsmith_common::PipelineEvent

mod executor;
mod orchestrator;

pub use executor::{OVERVIEW_SECTION, StageEvent, StageExecutor, StageInput, StageTarget, clamp_summary};
pub use orchestrator::{EventStream, PipelineOrchestrator};

use std::time::Duration;

use crate::config::{PipelineConfig, SummaryStrategy};

/// Runtime knobs of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub memory_capacity: usize,
    /// Total attempts per stage, including the first
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Wall-clock cap on one attempt
    pub stage_timeout: Duration,
    pub summary: SummaryStrategy,
    pub summary_max_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            memory_capacity: config.memory_capacity,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            stage_timeout: Duration::from_secs(config.stage_timeout_secs),
            summary: config.summary,
            summary_max_chars: config.summary_max_chars,
        }
    }
}
