use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Opaque handle to an image that a model call may attach as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Where the image bytes live on disk.
    pub path: PathBuf,
    /// MIME type sent alongside the bytes (e.g. `image/png`).
    pub mime_type: String,
}

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Input of one tutorial run: the chosen project and an optional photo.
///
/// Immutable once built; the orchestrator owns it for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRequest {
    project: String,
    image: Option<ImageRef>,
}

impl ProjectRequest {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            image: None,
        }
    }

    /// Attach a reference image to the request.
    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn image(&self) -> Option<&ImageRef> {
        self.image.as_ref()
    }
}
