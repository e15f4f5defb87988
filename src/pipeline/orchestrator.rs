//! Runs a whole tutorial: title, overview, then each catalog stage in order.

use async_stream::stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use partsmith_common::{PipelineEvent, ProjectRequest};
use std::pin::pin;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

use super::executor::{StageEvent, StageExecutor, StageInput};
use super::PipelineSettings;
use crate::catalog::StageCatalog;
use crate::config::PipelineConfig;
use crate::errors::{ConfigError, PipelineError};
use crate::export::TutorialDocument;
use crate::memory::SessionMemory;
use crate::model::ModelClient;

/// Events of one run. Lazy, finite and not restartable; dropping it cancels
/// the run before the next model call.
pub type EventStream = BoxStream<'static, PipelineEvent>;

/// Sequences stages for tutorial runs.
///
/// Cheap to clone and safe to share: the model client and catalog are
/// read-only, and every run gets its own [`SessionMemory`].
#[derive(Clone)]
pub struct PipelineOrchestrator {
    model: Arc<dyn ModelClient>,
    catalog: Arc<StageCatalog>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(model: Arc<dyn ModelClient>, catalog: Arc<StageCatalog>, settings: PipelineSettings) -> Self {
        Self {
            model,
            catalog,
            settings,
        }
    }

    /// Build from configuration: the catalog named in `[pipeline]`, or the
    /// built-in tutorial.
    pub fn from_config(config: &PipelineConfig, model: Arc<dyn ModelClient>) -> Result<Self, ConfigError> {
        let catalog = StageCatalog::load_or_default(config.catalog.as_deref())?;
        Ok(Self::new(model, Arc::new(catalog), PipelineSettings::from(config)))
    }

    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Start a run.
    ///
    /// The request is validated before anything else; an empty project name
    /// fails here without a single model call. Nothing runs until the returned
    /// stream is polled.
    pub fn run(&self, request: ProjectRequest) -> Result<EventStream, PipelineError> {
        self.start(request, None)
    }

    /// Start a run that also hands over the finished tutorial.
    ///
    /// The receiver resolves once the run reaches `pipeline_complete`. The
    /// document holds the final content of each stage, never fragments of a
    /// failed attempt. A run dropped before completion closes the channel.
    pub fn run_with_document(
        &self,
        request: ProjectRequest,
    ) -> Result<(EventStream, oneshot::Receiver<TutorialDocument>), PipelineError> {
        let (tx, rx) = oneshot::channel();
        let events = self.start(request, Some(tx))?;
        Ok((events, rx))
    }

    fn start(
        &self,
        request: ProjectRequest,
        finished: Option<oneshot::Sender<TutorialDocument>>,
    ) -> Result<EventStream, PipelineError> {
        let project = request.project().trim().to_string();
        if project.is_empty() {
            return Err(PipelineError::EmptyProjectName);
        }

        let executor = StageExecutor::new(self.model.clone(), self.settings.clone());
        let catalog = self.catalog.clone();
        let image = request.image().cloned();
        let memory_capacity = self.settings.memory_capacity;

        let events = stream! {
            let mut guard = RunGuard::new(&project, catalog.len());
            let mut memory = SessionMemory::new(memory_capacity);
            let mut document = TutorialDocument::new(project.clone());

            info!(project = %project, stages = catalog.len(), image = image.is_some(), "Pipeline run started");
            yield PipelineEvent::ProjectTitle {
                project_title: project.clone(),
            };

            {
                let mut overview = pin!(executor.run(StageInput::overview(&project, image.as_ref()), &mut memory));
                while let Some(event) = overview.next().await {
                    match event {
                        StageEvent::Fragment(text) => {
                            yield PipelineEvent::ProjectOverviewFragment {
                                project_overview: text,
                            };
                        }
                        StageEvent::Completed(result) => document.set_overview(result.content),
                        StageEvent::Errored { section, message } => {
                            document.push_failed(section.clone(), message.clone());
                            yield PipelineEvent::StageError {
                                section,
                                content: message,
                            };
                        }
                    }
                }
            }

            for stage in catalog.stages() {
                let mut events = pin!(executor.run(StageInput::section(&project, stage, image.as_ref()), &mut memory));
                while let Some(event) = events.next().await {
                    match event {
                        StageEvent::Fragment(text) => {
                            yield PipelineEvent::SectionFragment {
                                section: stage.title.clone(),
                                content: text,
                            };
                        }
                        StageEvent::Completed(result) => {
                            document.push_completed(result.section.clone(), result.content.clone());
                            yield PipelineEvent::SectionComplete {
                                section: result.section,
                                content: result.content,
                            };
                        }
                        StageEvent::Errored { section, message } => {
                            document.push_failed(section.clone(), message.clone());
                            yield PipelineEvent::StageError {
                                section,
                                content: message,
                            };
                        }
                    }
                }
                guard.stage_done();
            }

            guard.finish();
            info!(project = %project, "Pipeline run complete");
            if let Some(finished) = finished {
                let _ = finished.send(document);
            }
            yield PipelineEvent::PipelineComplete;
        };

        Ok(events.boxed())
    }
}

/// Logs a run that was dropped by its consumer before finishing.
struct RunGuard {
    project: String,
    total: usize,
    done: usize,
    finished: bool,
}

impl RunGuard {
    fn new(project: &str, total: usize) -> Self {
        Self {
            project: project.to_string(),
            total,
            done: 0,
            finished: false,
        }
    }

    fn stage_done(&mut self) {
        self.done += 1;
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                project = %self.project,
                completed_stages = self.done,
                total_stages = self.total,
                "Consumer disconnected, pipeline run cancelled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ModelError;
    use crate::model::{RequestKind, Script, ScriptedModel};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn orchestrator(model: Arc<ScriptedModel>, titles: &[&str]) -> PipelineOrchestrator {
        let catalog = StageCatalog::from_titles(titles.iter().copied()).unwrap();
        let settings = PipelineSettings {
            retry_delay: Duration::ZERO,
            ..PipelineSettings::default()
        };
        PipelineOrchestrator::new(model, Arc::new(catalog), settings)
    }

    #[tokio::test]
    async fn test_whitespace_project_is_rejected_before_model_calls() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = orchestrator(model.clone(), &["A"]);
        let result = pipeline.run(ProjectRequest::new("   "));
        assert!(matches!(result, Err(PipelineError::EmptyProjectName)));
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = orchestrator(model.clone(), &["A"]);
        let events = pipeline.run(ProjectRequest::new("Robot")).unwrap();
        assert!(model.calls().is_empty());
        drop(events);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_project_name_is_trimmed() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = orchestrator(model, &["A"]);
        let mut events = pipeline.run(ProjectRequest::new("  Robot \n")).unwrap();
        assert_eq!(
            events.next().await,
            Some(PipelineEvent::ProjectTitle {
                project_title: "Robot".into()
            })
        );
    }

    #[tokio::test]
    async fn test_image_is_attached_to_every_generation_call() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = orchestrator(model.clone(), &["A", "B"]);
        let image = partsmith_common::ImageRef::new("/tmp/parts.png", "image/png");
        let request = ProjectRequest::new("Robot").with_image(image.clone());
        let _: Vec<_> = pipeline.run(request).unwrap().collect().await;

        for call in model.calls() {
            if call.kind.label() != "summary" {
                assert_eq!(call.context.as_ref(), Some(&image), "{}", call.kind);
            }
        }
    }

    #[tokio::test]
    async fn test_document_overview_is_the_successful_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let model = Arc::new(ScriptedModel::new(move |request| match &request.kind {
            RequestKind::Overview if counter.fetch_add(1, Ordering::SeqCst) == 0 => Script::FailMidStream {
                fragments: vec!["STALE-PARTIAL ".into()],
                error: ModelError::unavailable("connection reset"),
            },
            RequestKind::Overview => Script::text("Real overview."),
            kind => Script::text(crate::model::echo_answer(kind)),
        }));
        let pipeline = orchestrator(model, &["A"]);

        let (events, document) = pipeline.run_with_document(ProjectRequest::new("Robot")).unwrap();
        let events: Vec<_> = events.collect().await;
        let document = document.await.unwrap();

        // The stale fragment was relayed, but only the retry reaches the document
        assert!(events.contains(&PipelineEvent::ProjectOverviewFragment {
            project_overview: "STALE-PARTIAL ".into()
        }));
        assert_eq!(document.overview, "Real overview.");
        assert!(!document.to_markdown().contains("STALE-PARTIAL"));
        assert_eq!(document.sections.len(), 1);
        assert_eq!(document.sections[0].content, "OK-A");
    }

    #[tokio::test]
    async fn test_document_records_failed_stages() {
        let model = Arc::new(ScriptedModel::new(|request| match &request.kind {
            RequestKind::Overview => Script::Fail(ModelError::rejected("blocked")),
            RequestKind::Section { title } if title == "B" => Script::Fail(ModelError::rejected("no")),
            kind => Script::text(crate::model::echo_answer(kind)),
        }));
        let pipeline = orchestrator(model, &["A", "B"]);

        let (events, document) = pipeline.run_with_document(ProjectRequest::new("Robot")).unwrap();
        let _: Vec<_> = events.collect().await;
        let document = document.await.unwrap();

        assert!(document.overview.is_empty());
        let titles: Vec<_> = document.sections.iter().map(|s| (s.title.as_str(), s.failed)).collect();
        assert_eq!(
            titles,
            vec![(crate::pipeline::OVERVIEW_SECTION, true), ("A", false), ("B", true)]
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_hands_over_no_document() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = orchestrator(model, &["A", "B"]);

        let (mut events, document) = pipeline.run_with_document(ProjectRequest::new("Robot")).unwrap();
        events.next().await;
        drop(events);
        assert!(document.await.is_err());
    }
}
