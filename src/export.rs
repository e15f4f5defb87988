//! Finished tutorials and their Markdown export.

use std::path::Path;

use crate::errors::StorageError;

/// One section of an assembled tutorial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorialSection {
    pub title: String,
    pub content: String,
    /// `content` is an error message rather than generated text
    pub failed: bool,
}

/// A finished tutorial, assembled from the final result of every stage.
///
/// Built by the orchestrator rather than from streamed fragments, so text
/// from an aborted attempt never reaches the export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TutorialDocument {
    pub title: String,
    pub overview: String,
    pub sections: Vec<TutorialSection>,
}

impl TutorialDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Replace the overview with the final text of the overview stage.
    pub fn set_overview(&mut self, content: impl Into<String>) {
        self.overview = content.into();
    }

    pub fn push_completed(&mut self, section: impl Into<String>, content: impl Into<String>) {
        self.sections.push(TutorialSection {
            title: section.into(),
            content: content.into(),
            failed: false,
        });
    }

    pub fn push_failed(&mut self, section: impl Into<String>, message: impl Into<String>) {
        self.sections.push(TutorialSection {
            title: section.into(),
            content: message.into(),
            failed: true,
        });
    }

    /// Render as Markdown: `# title`, the overview, then one `##` block per
    /// section.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        if !self.overview.trim().is_empty() {
            out.push_str(self.overview.trim());
            out.push_str("\n\n");
        }
        for section in &self.sections {
            out.push_str(&format!("## {}\n\n", section.title));
            if section.failed {
                out.push_str(&format!("> {}\n\n", section.content.trim()));
            } else {
                out.push_str(section.content.trim());
                out.push_str("\n\n");
            }
        }
        out.truncate(out.trim_end().len());
        out.push('\n');
        out
    }
}

/// Write the Markdown rendering of `document` to `path`, creating parent
/// directories as needed.
pub async fn write_markdown(document: &TutorialDocument, path: &Path) -> Result<(), StorageError> {
    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, document.to_markdown())
        .await
        .map_err(write_err)
}
