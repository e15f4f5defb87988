//! Model client abstraction.
//!
//! The pipeline only talks to [`ModelClient`]. Production uses
//! [`GeminiClient`]; tests and offline runs use [`ScriptedModel`].

mod gemini;
mod scripted;

pub use gemini::{GeminiClient, SseDecoder, parse_stream_payload};
pub use scripted::{Script, ScriptedModel, echo_answer};

use async_trait::async_trait;
use futures::stream::BoxStream;
use partsmith_common::ImageRef;
use std::fmt;
use std::sync::Arc;

use crate::config::{ModelConfig, ModelProvider};
use crate::errors::{ConfigError, ModelError};

/// Text fragments of one streamed model call, in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String, ModelError>>;

/// What a model request is for. Used for logging and by test doubles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Ideas,
    Overview,
    Section { title: String },
    Summary { title: String },
}

impl RequestKind {
    pub fn label(&self) -> &str {
        match self {
            RequestKind::Ideas => "ideas",
            RequestKind::Overview => "overview",
            RequestKind::Section { .. } => "section",
            RequestKind::Summary { .. } => "summary",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Section { title } | RequestKind::Summary { title } => {
                write!(f, "{} '{}'", self.label(), title)
            }
            _ => write!(f, "{}", self.label()),
        }
    }
}

/// A single prompt sent to the model, optionally with an image attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub kind: RequestKind,
    pub prompt: String,
    pub context: Option<ImageRef>,
}

impl ModelRequest {
    pub fn new(kind: RequestKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<ImageRef>) -> Self {
        self.context = context;
        self
    }
}

/// Trait for generating text with a language model.
///
/// Both calls are fresh requests; a client keeps no conversation state.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate the whole answer at once.
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;

    /// Start a streamed generation.
    ///
    /// An `Err` here means the call never started. Errors after that arrive
    /// as items of the stream.
    async fn stream(&self, request: &ModelRequest) -> Result<FragmentStream, ModelError>;
}

/// Build the configured model client.
pub fn build_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, ConfigError> {
    match config.provider {
        ModelProvider::Echo => Ok(Arc::new(ScriptedModel::echo())),
        ModelProvider::Gemini => Ok(Arc::new(GeminiClient::new(config)?)),
    }
}
