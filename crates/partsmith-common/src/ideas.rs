use serde::{Deserialize, Serialize};

/// Result of analysing a photo of parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeasReport {
    /// Components the model identified in the photo.
    pub components: Vec<String>,
    /// Suggested projects, one entry per idea line (e.g. `"1. Beacon: ..."`).
    pub project_ideas: Vec<String>,
}

impl IdeasReport {
    pub fn is_empty(&self) -> bool {
        self.project_ideas.is_empty()
    }
}
