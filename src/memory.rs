//! Short-term memory carried between stages and between idea requests.

use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

/// Default number of stage summaries kept per run.
pub const DEFAULT_MEMORY_CAPACITY: usize = 5;

/// Default number of suggested project titles remembered across requests.
pub const DEFAULT_IDEAS_CAPACITY: usize = 25;

/// Bounded FIFO of stage summaries for a single run.
///
/// Never shared between runs: the orchestrator creates one per run.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl SessionMemory {
    /// Create an empty memory. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a summary, evicting the oldest one once over capacity.
    pub fn append(&mut self, summary: impl Into<String>) {
        self.entries.push_back(summary.into());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// All entries in insertion order, separated by a blank line.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SessionMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

static NUMBERED_IDEA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\.\s*(.+)$").expect("numbered idea pattern is valid")
});

/// Titles of previously suggested projects, used to steer the model away
/// from repeating itself. Unlike [`SessionMemory`] this is process-wide.
#[derive(Debug, Clone)]
pub struct IdeasMemory {
    titles: VecDeque<String>,
    capacity: usize,
}

impl IdeasMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            titles: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember the titles of freshly suggested ideas.
    pub fn add_ideas<S: AsRef<str>>(&mut self, ideas: &[S]) {
        for idea in ideas {
            let title = Self::extract_title(idea.as_ref());
            if title.is_empty() {
                continue;
            }
            self.titles.push_back(title);
        }
        while self.titles.len() > self.capacity {
            self.titles.pop_front();
        }
    }

    /// Up to `n` remembered titles in random order.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<String> {
        let titles: Vec<&String> = self.titles.iter().collect();
        titles
            .choose_multiple(rng, n.min(titles.len()))
            .map(|title| (*title).clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// `"2. Plant Monitor: waters plants"` → `"Plant Monitor"`.
    pub fn extract_title(idea: &str) -> String {
        let idea = idea.trim();
        let body = NUMBERED_IDEA
            .captures(idea)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(idea);
        let title = body.split(':').next().unwrap_or(body);
        title.trim().trim_matches('*').trim().to_string()
    }
}

impl Default for IdeasMemory {
    fn default() -> Self {
        Self::new(DEFAULT_IDEAS_CAPACITY)
    }
}
