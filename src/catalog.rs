//! Stage catalog: the ordered list of tutorial sections.
//!
//! The catalog is configuration data. It is built once at start-up (the
//! built-in 12-section tutorial, or a TOML file) and shared read-only across
//! runs. Adding, removing or reordering sections never touches the
//! orchestrator.
//!
//! # Catalog File Format
//!
//! ```toml
//! [[stages]]
//! title = "Overview"
//!
//! [[stages]]
//! title = "Wiring"
//! ordinal = 2
//! template = "Explain the wiring of {project} for {section}. Context: {memory}"
//! ```
//!
//! `ordinal` defaults to the 1-based position and `template` to the shared
//! section prompt.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::ConfigError;
use crate::prompts::{NO_HISTORY, SECTION_TEMPLATE, fill_template, has_placeholder};

/// Placeholders every stage template must contain.
pub const REQUIRED_PLACEHOLDERS: [&str; 3] = ["project", "section", "memory"];

/// Section name of the overview stage on the wire. Reserved: no catalog
/// section may use it.
pub const OVERVIEW_SECTION: &str = "Project Overview";

/// Sections of the built-in tutorial, in order.
pub const DEFAULT_SECTION_TITLES: [&str; 12] = [
    "1. Project Overview and Objectives",
    "2. Components and Tools Needed",
    "3. Setting Up Your Workspace and Safety Tips",
    "4. Written Wiring Instructions (If Applicable)",
    "5. Setting Up Your Development Environment",
    "6. Core Code: Writing and Explanation",
    "7. Code Expansion: Adding Features",
    "8. Code Testing and Debugging",
    "9. Final Integration: Bringing It All Together",
    "10. Troubleshooting and Optimization",
    "11. Best Practices and Precautions",
    "12. Project Conclusion and Next Steps",
];

/// One tutorial section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Execution order, unique within the catalog
    pub ordinal: u32,
    /// Human-readable section title, unique within the catalog
    pub title: String,
    /// Prompt template with `{project}`, `{section}` and `{memory}`
    pub template: String,
}

impl Stage {
    pub fn new(ordinal: u32, title: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            ordinal,
            title: title.into(),
            template: template.into(),
        }
    }

    /// Build the prompt for this stage.
    ///
    /// An empty `memory` is replaced by a short placeholder sentence.
    pub fn render_prompt(&self, project: &str, memory: &str) -> String {
        let memory = if memory.trim().is_empty() {
            NO_HISTORY
        } else {
            memory
        };
        fill_template(
            &self.template,
            &[
                ("project", project),
                ("section", &self.title),
                ("memory", memory),
            ],
        )
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    stages: Vec<StageEntry>,
}

#[derive(Debug, Deserialize)]
struct StageEntry {
    title: String,
    #[serde(default)]
    ordinal: Option<u32>,
    #[serde(default)]
    template: Option<String>,
}

/// Validated, ordinal-sorted list of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCatalog {
    stages: Vec<Stage>,
}

impl StageCatalog {
    /// Validate and sort `stages`.
    pub fn new(mut stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::InvalidCatalog(
                "catalog must contain at least one stage".into(),
            ));
        }

        let mut ordinals = HashSet::new();
        let mut titles = HashSet::new();
        for stage in &stages {
            if stage.title.trim().is_empty() {
                return Err(ConfigError::InvalidCatalog(format!(
                    "stage {} has an empty title",
                    stage.ordinal
                )));
            }
            if stage.title.trim().eq_ignore_ascii_case(OVERVIEW_SECTION) {
                return Err(ConfigError::InvalidCatalog(format!(
                    "title '{}' is reserved for the overview stage",
                    stage.title
                )));
            }
            if !ordinals.insert(stage.ordinal) {
                return Err(ConfigError::InvalidCatalog(format!(
                    "duplicate ordinal {}",
                    stage.ordinal
                )));
            }
            if !titles.insert(stage.title.as_str()) {
                return Err(ConfigError::InvalidCatalog(format!(
                    "duplicate title '{}'",
                    stage.title
                )));
            }
            for name in REQUIRED_PLACEHOLDERS {
                if !has_placeholder(&stage.template, name) {
                    return Err(ConfigError::InvalidCatalog(format!(
                        "template of '{}' is missing the {{{}}} placeholder",
                        stage.title, name
                    )));
                }
            }
        }

        stages.sort_by_key(|stage| stage.ordinal);
        Ok(Self { stages })
    }

    /// The built-in 12-section tutorial.
    pub fn default_tutorial() -> Self {
        Self {
            stages: DEFAULT_SECTION_TITLES
                .iter()
                .zip(1u32..)
                .map(|(title, ordinal)| Stage::new(ordinal, *title, SECTION_TEMPLATE))
                .collect(),
        }
    }

    /// Catalog with the shared template for each title, numbered in order.
    pub fn from_titles<I, S>(titles: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stages = titles
            .into_iter()
            .zip(1u32..)
            .map(|(title, ordinal)| Stage::new(ordinal, title, SECTION_TEMPLATE))
            .collect();
        Self::new(stages)
    }

    /// Parse a catalog from TOML; `origin` is only used in errors.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: CatalogFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        let stages = file
            .stages
            .into_iter()
            .zip(1u32..)
            .map(|(entry, position)| {
                Stage::new(
                    entry.ordinal.unwrap_or(position),
                    entry.title,
                    entry.template.unwrap_or_else(|| SECTION_TEMPLATE.to_string()),
                )
            })
            .collect();
        Self::new(stages)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Load `path` if given, otherwise the built-in tutorial.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default_tutorial()),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|stage| stage.title.as_str())
    }
}
