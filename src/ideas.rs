//! Project suggestions from a photo of parts.

use partsmith_common::{IdeasReport, ImageRef};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::errors::ModelError;
use crate::memory::IdeasMemory;
use crate::model::{ModelClient, ModelRequest, RequestKind};
use crate::prompts::ideas_prompt;

/// Previous titles shown to the model on each request.
const PREVIOUS_SAMPLE: usize = 5;

/// Asks the model for components and project ideas in an image.
///
/// Suggested titles are remembered across requests so later calls can steer
/// away from repeats.
pub struct IdeasService {
    model: Arc<dyn ModelClient>,
    memory: Mutex<IdeasMemory>,
}

impl IdeasService {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            model,
            memory: Mutex::new(IdeasMemory::default()),
        }
    }

    /// Analyze `image`. Output the parser cannot read yields an empty report.
    pub async fn analyze(&self, image: ImageRef) -> Result<IdeasReport, ModelError> {
        let previous = {
            let memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
            memory.sample(PREVIOUS_SAMPLE, &mut rand::thread_rng())
        };

        let request = ModelRequest::new(RequestKind::Ideas, ideas_prompt(&previous)).with_context(Some(image));
        let text = self.model.complete(&request).await?;

        let Some(report) = parse_ideas(&text) else {
            warn!(response = %text, "Unexpected format in ideas response");
            return Ok(IdeasReport::default());
        };

        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_ideas(&report.project_ideas);
        info!(
            components = report.components.len(),
            ideas = report.project_ideas.len(),
            "Generated project ideas"
        );
        Ok(report)
    }

    /// Number of titles currently remembered.
    pub fn remembered(&self) -> usize {
        self.memory.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Split a `Components:` / `Project Ideas:` answer into its two lists.
pub fn parse_ideas(text: &str) -> Option<IdeasReport> {
    let (head, ideas) = text.split_once("Project Ideas:")?;
    let (_, components) = head.split_once("Components:")?;

    let components = components
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    let project_ideas = ideas
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    Some(IdeasReport {
        components,
        project_ideas,
    })
}
