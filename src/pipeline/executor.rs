//! Runs a single stage to a terminal state.

use async_stream::stream;
use futures::{Stream, StreamExt};
use partsmith_common::{ImageRef, StageResult, StageState};
use std::sync::Arc;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use super::PipelineSettings;
use crate::catalog::Stage;
use crate::config::SummaryStrategy;
use crate::errors::ModelError;
use crate::memory::SessionMemory;
use crate::model::{ModelClient, ModelRequest, RequestKind};
use crate::prompts::{overview_prompt, summary_prompt};

pub use crate::catalog::OVERVIEW_SECTION;

/// Which stage to run.
#[derive(Debug, Clone, Copy)]
pub enum StageTarget<'a> {
    /// Project details; prompt built from the raw project name only
    Overview,
    /// A catalog section; prompt built from its template and session memory
    Section(&'a Stage),
}

/// Everything a stage needs besides memory.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub project: &'a str,
    pub target: StageTarget<'a>,
    pub image: Option<&'a ImageRef>,
}

impl<'a> StageInput<'a> {
    pub fn overview(project: &'a str, image: Option<&'a ImageRef>) -> Self {
        Self {
            project,
            target: StageTarget::Overview,
            image,
        }
    }

    pub fn section(project: &'a str, stage: &'a Stage, image: Option<&'a ImageRef>) -> Self {
        Self {
            project,
            target: StageTarget::Section(stage),
            image,
        }
    }

    pub fn section_title(&self) -> &'a str {
        match self.target {
            StageTarget::Overview => OVERVIEW_SECTION,
            StageTarget::Section(stage) => &stage.title,
        }
    }
}

/// Output of a running stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// Non-empty text, relayed as soon as the model produced it
    Fragment(String),
    Completed(StageResult),
    Errored { section: String, message: String },
}

impl StageEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageEvent::Fragment(_))
    }
}

/// Executes one stage with retries, a per-attempt timeout and summarisation.
#[derive(Clone)]
pub struct StageExecutor {
    model: Arc<dyn ModelClient>,
    settings: PipelineSettings,
}

impl StageExecutor {
    pub fn new(model: Arc<dyn ModelClient>, settings: PipelineSettings) -> Self {
        Self { model, settings }
    }

    /// Run the stage described by `input`.
    ///
    /// Yields every non-empty fragment, then exactly one terminal event.
    /// Fragments of a failed attempt are not retracted when a retry succeeds.
    /// For catalog sections the summary is appended to `memory` before the
    /// `Completed` event is yielded; the overview never touches memory.
    pub fn run<'a>(
        &'a self,
        input: StageInput<'a>,
        memory: &'a mut SessionMemory,
    ) -> impl Stream<Item = StageEvent> + Send + 'a {
        stream! {
            let section = input.section_title().to_string();
            let project = input.project;
            let request = build_request(&input, memory);
            let max_attempts = self.settings.max_attempts.max(1);
            let mut state = StageState::Pending;
            let mut attempt = 0u32;

            info!(project, stage = %section, "Stage started");

            let outcome = loop {
                attempt += 1;
                transition(&mut state, StageState::Streaming, &section);
                let deadline = Instant::now() + self.settings.stage_timeout;
                let mut content = String::new();

                let streamed = match timeout_at(deadline, self.model.stream(&request)).await {
                    Err(_) => Err(self.timeout_error()),
                    Ok(Err(err)) => Err(err),
                    Ok(Ok(mut fragments)) => loop {
                        match timeout_at(deadline, fragments.next()).await {
                            Err(_) => break Err(self.timeout_error()),
                            Ok(None) => break Ok(()),
                            Ok(Some(Err(err))) => break Err(err),
                            Ok(Some(Ok(fragment))) => {
                                if fragment.is_empty() {
                                    continue;
                                }
                                content.push_str(&fragment);
                                yield StageEvent::Fragment(fragment);
                            }
                        }
                    },
                };

                let result = match streamed {
                    Ok(()) if content.trim().is_empty() => {
                        Err(ModelError::malformed("model returned no text"))
                    }
                    Ok(()) => Ok(content),
                    Err(err) => Err(err),
                };

                match result {
                    Ok(content) => break Ok(content),
                    Err(err) if err.is_retryable() && attempt < max_attempts => {
                        warn!(
                            project,
                            stage = %section,
                            attempt,
                            max_attempts,
                            error = %err,
                            "Attempt failed, retrying"
                        );
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                    Err(err) => break Err(err),
                }
            };

            match outcome {
                Ok(content) => {
                    transition(&mut state, StageState::Summarizing, &section);
                    let summary = match input.target {
                        StageTarget::Overview => clamp_summary(&content, self.settings.summary_max_chars),
                        StageTarget::Section(_) => {
                            let summary = self.summarize(project, &section, &content).await;
                            memory.append(summary.clone());
                            summary
                        }
                    };
                    transition(&mut state, StageState::Completed, &section);
                    info!(project, stage = %section, attempt, chars = content.len(), "Stage completed");
                    yield StageEvent::Completed(StageResult {
                        section,
                        content,
                        summary,
                    });
                }
                Err(err) => {
                    transition(&mut state, StageState::Errored, &section);
                    warn!(project, stage = %section, attempt, error = %err, "Stage errored");
                    yield StageEvent::Errored {
                        section,
                        message: format!("Error generating content: {}", err),
                    };
                }
            }
        }
    }

    async fn summarize(&self, project: &str, section: &str, content: &str) -> String {
        let max_chars = self.settings.summary_max_chars;
        if self.settings.summary == SummaryStrategy::Truncate {
            return clamp_summary(content, max_chars);
        }

        let request = ModelRequest::new(
            RequestKind::Summary {
                title: section.to_string(),
            },
            summary_prompt(project, section, content),
        );
        match timeout(self.settings.stage_timeout, self.model.complete(&request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => clamp_summary(&text, max_chars),
            Ok(Ok(_)) => {
                warn!(project, stage = section, "Empty summary, truncating content instead");
                clamp_summary(content, max_chars)
            }
            Ok(Err(err)) => {
                warn!(project, stage = section, error = %err, "Summary failed, truncating content instead");
                clamp_summary(content, max_chars)
            }
            Err(_) => {
                warn!(project, stage = section, "Summary timed out, truncating content instead");
                clamp_summary(content, max_chars)
            }
        }
    }

    fn timeout_error(&self) -> ModelError {
        ModelError::unavailable(format!(
            "no response within {}s",
            self.settings.stage_timeout.as_secs()
        ))
    }
}

fn build_request(input: &StageInput<'_>, memory: &SessionMemory) -> ModelRequest {
    let request = match input.target {
        StageTarget::Overview => ModelRequest::new(RequestKind::Overview, overview_prompt(input.project)),
        StageTarget::Section(stage) => ModelRequest::new(
            RequestKind::Section {
                title: stage.title.clone(),
            },
            stage.render_prompt(input.project, &memory.render()),
        ),
    };
    request.with_context(input.image.cloned())
}

fn transition(state: &mut StageState, next: StageState, section: &str) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal stage transition {} -> {} for '{}'",
        state,
        next,
        section
    );
    debug!(stage = section, from = %state, to = %next, "Stage transition");
    *state = next;
}

/// Collapse whitespace and cut to at most `max_chars` characters, ending
/// with an ellipsis when something was dropped.
pub fn clamp_summary(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = collapsed.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}
