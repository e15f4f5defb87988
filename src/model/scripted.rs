//! Deterministic in-process model.
//!
//! Backs the `echo` provider and every test that needs to control what the
//! model says, fails with, or how long it takes.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::sync::Mutex;

use super::{FragmentStream, ModelClient, ModelRequest, RequestKind};
use crate::errors::ModelError;

/// Canned answer for the ideas request of the echo model.
const ECHO_IDEAS: &str = "Components:
- Arduino Uno
- Breadboard
- LED
- 220 ohm resistor

Project Ideas:
1. Blinking Beacon: an LED that pulses in a configurable pattern.
2. Night Light: an LED that turns on when the room goes dark.
3. Morse Sender: spell out messages typed over serial as light.
4. Reaction Timer: measure how fast you press a button after the LED.";

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with these fragments (joined for `complete`).
    Fragments(Vec<String>),
    /// Fail before producing anything.
    Fail(ModelError),
    /// Emit some fragments, then fail.
    FailMidStream {
        fragments: Vec<String>,
        error: ModelError,
    },
    /// Never answer.
    Hang,
}

impl Script {
    pub fn text(text: impl Into<String>) -> Self {
        Script::Fragments(vec![text.into()])
    }
}

type Responder = dyn Fn(&ModelRequest) -> Script + Send + Sync;

/// Model whose behaviour is decided per request by a closure.
///
/// Every request is recorded so tests can assert on prompts and call counts.
pub struct ScriptedModel {
    responder: Box<Responder>,
    calls: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> Script + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Offline model answering `OK-overview`, `OK-<section>` and
    /// `Summary of <section>`.
    pub fn echo() -> Self {
        Self::new(|request| Script::text(echo_answer(&request.kind)))
    }

    /// Requests received so far, in order.
    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of requests of the given kind label (`"section"`, ...).
    pub fn count(&self, label: &str) -> usize {
        self.calls()
            .iter()
            .filter(|request| request.kind.label() == label)
            .count()
    }

    fn respond(&self, request: &ModelRequest) -> Script {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        (self.responder)(request)
    }
}

/// Answer of the echo model for a request kind.
pub fn echo_answer(kind: &RequestKind) -> String {
    match kind {
        RequestKind::Ideas => ECHO_IDEAS.to_string(),
        RequestKind::Overview => "OK-overview".to_string(),
        RequestKind::Section { title } => format!("OK-{}", title),
        RequestKind::Summary { title } => format!("Summary of {}", title),
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        match self.respond(request) {
            Script::Fragments(fragments) => Ok(fragments.concat()),
            Script::Fail(error) | Script::FailMidStream { error, .. } => Err(error),
            Script::Hang => futures::future::pending().await,
        }
    }

    async fn stream(&self, request: &ModelRequest) -> Result<FragmentStream, ModelError> {
        match self.respond(request) {
            Script::Fragments(fragments) => Ok(stream::iter(fragments.into_iter().map(Ok)).boxed()),
            Script::Fail(error) => Err(error),
            Script::FailMidStream { fragments, error } => Ok(stream::iter(
                fragments
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error))),
            )
            .boxed()),
            Script::Hang => Ok(stream::pending().boxed()),
        }
    }
}
