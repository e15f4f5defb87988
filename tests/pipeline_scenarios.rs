//! End-to-end pipeline scenarios against the scripted model.

use futures::StreamExt;
use partsmith::catalog::StageCatalog;
use partsmith::config::SummaryStrategy;
use partsmith::errors::{ModelError, PipelineError};
use partsmith::model::{ModelRequest, RequestKind, Script, ScriptedModel};
use partsmith::pipeline::{OVERVIEW_SECTION, PipelineOrchestrator, PipelineSettings};
use partsmith_common::{PipelineEvent, ProjectRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn settings() -> PipelineSettings {
    PipelineSettings {
        retry_delay: Duration::ZERO,
        ..PipelineSettings::default()
    }
}

fn pipeline_with(model: Arc<ScriptedModel>, titles: &[&str], settings: PipelineSettings) -> PipelineOrchestrator {
    let catalog = StageCatalog::from_titles(titles.iter().copied()).unwrap();
    PipelineOrchestrator::new(model, Arc::new(catalog), settings)
}

fn pipeline(model: Arc<ScriptedModel>, titles: &[&str]) -> PipelineOrchestrator {
    pipeline_with(model, titles, settings())
}

async fn run_all(pipeline: &PipelineOrchestrator, project: &str) -> Vec<PipelineEvent> {
    pipeline
        .run(ProjectRequest::new(project))
        .unwrap()
        .collect()
        .await
}

fn section_title(request: &ModelRequest) -> Option<&str> {
    match &request.kind {
        RequestKind::Section { title } => Some(title),
        _ => None,
    }
}

fn terminal_sections(events: &[PipelineEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.is_stage_terminal())
        .filter_map(|e| e.section().map(str::to_string))
        .collect()
}

// =============================================================================
// Event sequence
// =============================================================================

mod event_sequence {
    use super::*;

    #[tokio::test]
    async fn test_two_stage_scenario_exact_sequence() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = pipeline(model, &["Overview", "Wiring"]);

        let events = run_all(&pipeline, "Line-following robot").await;

        assert_eq!(
            events,
            vec![
                PipelineEvent::ProjectTitle {
                    project_title: "Line-following robot".into()
                },
                PipelineEvent::ProjectOverviewFragment {
                    project_overview: "OK-overview".into()
                },
                PipelineEvent::SectionFragment {
                    section: "Overview".into(),
                    content: "OK-Overview".into()
                },
                PipelineEvent::SectionComplete {
                    section: "Overview".into(),
                    content: "OK-Overview".into()
                },
                PipelineEvent::SectionFragment {
                    section: "Wiring".into(),
                    content: "OK-Wiring".into()
                },
                PipelineEvent::SectionComplete {
                    section: "Wiring".into(),
                    content: "OK-Wiring".into()
                },
                PipelineEvent::PipelineComplete,
            ]
        );
    }

    #[tokio::test]
    async fn test_event_counts_for_any_catalog_size() {
        for k in [1usize, 3, 7, 12] {
            let titles: Vec<String> = (1..=k).map(|i| format!("Stage {i}")).collect();
            let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
            let model = Arc::new(ScriptedModel::new(|request| match &request.kind {
                RequestKind::Section { title } => {
                    Script::Fragments(vec![format!("{title} part 1 "), format!("{title} part 2")])
                }
                kind => Script::text(format!("{}", kind)),
            }));
            let events = run_all(&pipeline(model, &refs), "Robot").await;

            let count = |pred: fn(&PipelineEvent) -> bool| events.iter().filter(|e| pred(e)).count();
            assert_eq!(count(|e| matches!(e, PipelineEvent::ProjectTitle { .. })), 1);
            assert!(count(|e| matches!(e, PipelineEvent::ProjectOverviewFragment { .. })) >= 1);
            assert_eq!(count(|e| matches!(e, PipelineEvent::SectionComplete { .. })), k);
            assert_eq!(count(|e| matches!(e, PipelineEvent::SectionFragment { .. })), 2 * k);
            assert_eq!(count(|e| matches!(e, PipelineEvent::PipelineComplete)), 1);
            assert_eq!(events.last(), Some(&PipelineEvent::PipelineComplete));
        }
    }

    #[tokio::test]
    async fn test_fragments_precede_their_completion_and_keep_order() {
        let model = Arc::new(ScriptedModel::new(|request| match &request.kind {
            RequestKind::Section { .. } => Script::Fragments(vec!["a".into(), "b".into(), "c".into()]),
            kind => Script::text(kind.label()),
        }));
        let events = run_all(&pipeline(model, &["One", "Two"]), "Robot").await;

        let mut current: Option<String> = None;
        let mut seen = String::new();
        for event in &events {
            match event {
                PipelineEvent::SectionFragment { section, content } => {
                    if current.as_deref() != Some(section.as_str()) {
                        current = Some(section.clone());
                        seen.clear();
                    }
                    seen.push_str(content);
                }
                PipelineEvent::SectionComplete { section, content } => {
                    assert_eq!(current.as_deref(), Some(section.as_str()));
                    assert_eq!(&seen, content);
                    assert_eq!(content, "abc");
                }
                _ => {}
            }
        }
        assert_eq!(terminal_sections(&events), vec!["One", "Two"]);
    }

    #[tokio::test]
    async fn test_stage_order_is_deterministic() {
        let titles = ["Overview", "Components", "Wiring", "Code", "Testing"];
        let first = run_all(&pipeline(Arc::new(ScriptedModel::echo()), &titles), "Robot").await;
        let second = run_all(&pipeline(Arc::new(ScriptedModel::echo()), &titles), "Robot").await;

        assert_eq!(first, second);
        assert_eq!(terminal_sections(&first), titles);
    }

    #[tokio::test]
    async fn test_default_catalog_runs_twelve_sections() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = PipelineOrchestrator::new(
            model.clone(),
            Arc::new(StageCatalog::default_tutorial()),
            settings(),
        );
        let events = run_all(&pipeline, "Weather station").await;
        assert_eq!(terminal_sections(&events).len(), 12);
        assert_eq!(model.count("section"), 12);
        assert_eq!(model.count("overview"), 1);
        assert_eq!(model.count("summary"), 12);
    }
}

// =============================================================================
// Failures and retries
// =============================================================================

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_stage_retries_exactly_max_attempts() {
        let model = Arc::new(ScriptedModel::new(|request| match section_title(request) {
            Some("Wiring") => Script::Fail(ModelError::unavailable("503 Service Unavailable")),
            _ => Script::text("fine"),
        }));
        let events = run_all(&pipeline(model.clone(), &["Overview", "Wiring", "Testing"]), "Robot").await;

        let wiring_calls = model
            .calls()
            .iter()
            .filter(|c| section_title(c) == Some("Wiring"))
            .count();
        assert_eq!(wiring_calls, 3);

        let wiring_error = events.iter().find_map(|e| match e {
            PipelineEvent::StageError { section, content } if section == "Wiring" => Some(content.clone()),
            _ => None,
        });
        let message = wiring_error.expect("Wiring should have errored");
        assert!(message.starts_with("Error generating content: "));
        assert!(message.contains("503"));

        assert_eq!(terminal_sections(&events), vec!["Overview", "Wiring", "Testing"]);
        assert_eq!(events.last(), Some(&PipelineEvent::PipelineComplete));
    }

    #[tokio::test]
    async fn test_retry_bound_is_configurable() {
        let model = Arc::new(ScriptedModel::new(|request| match request.kind {
            RequestKind::Section { .. } => Script::Fail(ModelError::unavailable("timeout")),
            _ => Script::text("fine"),
        }));
        let settings = PipelineSettings {
            max_attempts: 5,
            ..settings()
        };
        run_all(&pipeline_with(model.clone(), &["Only"], settings), "Robot").await;
        assert_eq!(model.count("section"), 5);
    }

    #[tokio::test]
    async fn test_rejected_stage_two_of_three() {
        let model = Arc::new(ScriptedModel::new(|request| match &request.kind {
            RequestKind::Section { title } if title == "Two" => {
                Script::Fail(ModelError::rejected("SAFETY: blocked"))
            }
            RequestKind::Section { title } => Script::text(format!("OK-{title}")),
            kind => Script::text(kind.label()),
        }));
        let events = run_all(&pipeline(model.clone(), &["One", "Two", "Three"]), "Robot").await;

        let terminals: Vec<&PipelineEvent> = events.iter().filter(|e| e.is_stage_terminal()).collect();
        assert!(matches!(terminals[0], PipelineEvent::SectionComplete { section, .. } if section == "One"));
        match terminals[1] {
            PipelineEvent::StageError { section, content } => {
                assert_eq!(section, "Two");
                assert!(!content.is_empty());
            }
            other => panic!("Expected StageError, got {:?}", other),
        }
        assert!(matches!(terminals[2], PipelineEvent::SectionComplete { section, .. } if section == "Three"));
        assert_eq!(events.last(), Some(&PipelineEvent::PipelineComplete));

        // Rejections are never retried
        let two_calls = model.calls().iter().filter(|c| section_title(c) == Some("Two")).count();
        assert_eq!(two_calls, 1);
    }

    #[tokio::test]
    async fn test_partial_fragments_then_successful_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let model = Arc::new(ScriptedModel::new(move |request| match request.kind {
            RequestKind::Section { .. } => {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Script::FailMidStream {
                        fragments: vec!["Connect the ".into()],
                        error: ModelError::unavailable("connection reset"),
                    }
                } else {
                    Script::Fragments(vec!["Connect the motor ".into(), "driver.".into()])
                }
            }
            _ => Script::text("ok"),
        }));
        let events = run_all(&pipeline(model, &["Wiring"]), "Robot").await;

        let fragments: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::SectionFragment { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        // Fragments of the failed attempt stay in the stream
        assert_eq!(fragments, vec!["Connect the ", "Connect the motor ", "driver."]);

        // The completed content only holds the successful attempt
        assert!(events.contains(&PipelineEvent::SectionComplete {
            section: "Wiring".into(),
            content: "Connect the motor driver.".into(),
        }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_output_is_not_retried() {
        let model = Arc::new(ScriptedModel::new(|request| match request.kind {
            RequestKind::Section { .. } => Script::Fail(ModelError::malformed("bad frame")),
            _ => Script::text("ok"),
        }));
        let events = run_all(&pipeline(model.clone(), &["A", "B"]), "Robot").await;
        assert_eq!(model.count("section"), 2);
        let errors = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::StageError { .. }))
            .count();
        assert_eq!(errors, 2);
        assert_eq!(events.last(), Some(&PipelineEvent::PipelineComplete));
    }

    #[tokio::test]
    async fn test_overview_failure_is_reported_and_run_continues() {
        let model = Arc::new(ScriptedModel::new(|request| match request.kind {
            RequestKind::Overview => Script::Fail(ModelError::rejected("nope")),
            RequestKind::Section { ref title } => Script::text(format!("OK-{title}")),
            _ => Script::text("summary"),
        }));
        let events = run_all(&pipeline(model, &["A"]), "Robot").await;

        assert!(matches!(
            &events[1],
            PipelineEvent::StageError { section, .. } if section == OVERVIEW_SECTION
        ));
        assert!(events.contains(&PipelineEvent::SectionComplete {
            section: "A".into(),
            content: "OK-A".into(),
        }));
        assert_eq!(events.last(), Some(&PipelineEvent::PipelineComplete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_model_times_out_as_unavailable() {
        let model = Arc::new(ScriptedModel::new(|request| match request.kind {
            RequestKind::Section { .. } => Script::Hang,
            _ => Script::text("ok"),
        }));
        let settings = PipelineSettings {
            stage_timeout: Duration::from_secs(5),
            max_attempts: 2,
            ..settings()
        };
        let events = run_all(&pipeline_with(model.clone(), &["Stuck"], settings), "Robot").await;

        match events.iter().find(|e| e.is_stage_terminal()) {
            Some(PipelineEvent::StageError { section, content }) => {
                assert_eq!(section, "Stuck");
                assert!(content.contains("no response within 5s"));
            }
            other => panic!("Expected StageError, got {:?}", other),
        }
        // A timeout is transient, so it was retried
        assert_eq!(model.count("section"), 2);
    }

    #[tokio::test]
    async fn test_empty_project_name_makes_no_model_calls() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = pipeline(model.clone(), &["A"]);

        for name in ["", "   ", "\n\t"] {
            let result = pipeline.run(ProjectRequest::new(name));
            assert!(matches!(result, Err(PipelineError::EmptyProjectName)));
        }
        assert!(model.calls().is_empty());
    }
}

// =============================================================================
// Session memory across stages
// =============================================================================

mod memory {
    use super::*;

    const TEMPLATE_TITLES: [&str; 3] = ["First", "Second", "Third"];

    #[tokio::test]
    async fn test_summaries_flow_into_later_prompts() {
        let model = Arc::new(ScriptedModel::echo());
        run_all(&pipeline(model.clone(), &TEMPLATE_TITLES), "Robot").await;

        let prompts: Vec<(String, String)> = model
            .calls()
            .iter()
            .filter_map(|c| section_title(c).map(|t| (t.to_string(), c.prompt.clone())))
            .collect();

        assert!(prompts[0].1.contains("No previous sections yet."));
        assert!(prompts[1].1.contains("Summary of First"));
        assert!(!prompts[1].1.contains("Summary of Second"));
        assert!(prompts[2].1.contains("Summary of First\n\nSummary of Second"));
    }

    #[tokio::test]
    async fn test_memory_capacity_evicts_oldest_summary() {
        let model = Arc::new(ScriptedModel::echo());
        let settings = PipelineSettings {
            memory_capacity: 2,
            ..settings()
        };
        run_all(&pipeline_with(model.clone(), &["A", "B", "C", "D"], settings), "Robot").await;

        let last_prompt = model
            .calls()
            .iter()
            .filter(|c| section_title(c) == Some("D"))
            .map(|c| c.prompt.clone())
            .next()
            .unwrap();
        assert!(!last_prompt.contains("Summary of A"));
        assert!(last_prompt.contains("Summary of B\n\nSummary of C"));
    }

    #[tokio::test]
    async fn test_failed_stage_adds_no_summary() {
        let model = Arc::new(ScriptedModel::new(|request| match &request.kind {
            RequestKind::Section { title } if title == "B" => Script::Fail(ModelError::rejected("no")),
            kind => Script::text(partsmith::model::echo_answer(kind)),
        }));
        run_all(&pipeline(model.clone(), &["A", "B", "C"]), "Robot").await;

        let prompt_c = model
            .calls()
            .iter()
            .find(|c| section_title(c) == Some("C"))
            .map(|c| c.prompt.clone())
            .unwrap();
        assert!(prompt_c.contains("Summary of A"));
        assert!(!prompt_c.contains("Summary of B"));
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_share_memory() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = pipeline(model.clone(), &["Only"]);

        let (a, b) = tokio::join!(run_all(&pipeline, "Robot"), run_all(&pipeline, "Lamp"));
        assert_eq!(a.last(), Some(&PipelineEvent::PipelineComplete));
        assert_eq!(b.last(), Some(&PipelineEvent::PipelineComplete));

        // Every run starts with empty memory, so no prompt carries a summary
        for call in model.calls() {
            if section_title(&call).is_some() {
                assert!(call.prompt.contains("No previous sections yet."));
            }
        }
    }

    #[tokio::test]
    async fn test_truncate_strategy_makes_no_summary_calls() {
        let model = Arc::new(ScriptedModel::new(|request| match &request.kind {
            RequestKind::Section { title } => Script::text(format!("Full text of {title}. {}", "x ".repeat(300))),
            kind => Script::text(kind.label()),
        }));
        let settings = PipelineSettings {
            summary: SummaryStrategy::Truncate,
            summary_max_chars: 40,
            ..settings()
        };
        run_all(&pipeline_with(model.clone(), &["A", "B"], settings), "Robot").await;

        assert_eq!(model.count("summary"), 0);
        let prompt_b = model
            .calls()
            .iter()
            .find(|c| section_title(c) == Some("B"))
            .map(|c| c.prompt.clone())
            .unwrap();
        assert!(prompt_b.contains("Full text of A."));
        assert!(prompt_b.contains('…'));
    }

    #[tokio::test]
    async fn test_summary_failure_falls_back_to_truncation() {
        let model = Arc::new(ScriptedModel::new(|request| match &request.kind {
            RequestKind::Summary { .. } => Script::Fail(ModelError::unavailable("quota")),
            RequestKind::Section { title } => Script::text(format!("Body of {title}")),
            kind => Script::text(kind.label()),
        }));
        let events = run_all(&pipeline(model.clone(), &["A", "B"]), "Robot").await;

        assert_eq!(terminal_sections(&events), vec!["A", "B"]);
        let prompt_b = model
            .calls()
            .iter()
            .find(|c| section_title(c) == Some("B"))
            .map(|c| c.prompt.clone())
            .unwrap();
        assert!(prompt_b.contains("Body of A"));
    }
}

// =============================================================================
// Cancellation
// =============================================================================

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn test_dropping_stream_stops_further_model_calls() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = pipeline(model.clone(), &["One", "Two", "Three"]);

        let mut events = pipeline.run(ProjectRequest::new("Robot")).unwrap();
        while let Some(event) = events.next().await {
            if matches!(event, PipelineEvent::SectionComplete { .. }) {
                break;
            }
        }
        drop(events);

        assert_eq!(model.count("section"), 1);
        assert_eq!(model.count("overview"), 1);
    }

    #[tokio::test]
    async fn test_dropping_before_first_poll_makes_no_calls() {
        let model = Arc::new(ScriptedModel::echo());
        let pipeline = pipeline(model.clone(), &["One"]);
        drop(pipeline.run(ProjectRequest::new("Robot")).unwrap());
        assert!(model.calls().is_empty());
    }
}
