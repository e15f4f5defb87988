//! Google Gemini REST client.
//!
//! `complete` calls `models/{model}:generateContent`; `stream` calls
//! `models/{model}:streamGenerateContent?alt=sse` and decodes the SSE body
//! incrementally.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{FragmentStream, ModelClient, ModelRequest};
use crate::config::ModelConfig;
use crate::errors::{ConfigError, ModelError};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Finish reasons that mean the model refused to answer.
const BLOCKING_FINISH_REASONS: [&str; 4] = ["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT"];

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    /// Whole-request cap for `complete`; streams are only idle-bounded
    request_timeout: Duration,
}

impl GeminiClient {
    /// Build a client from config. Fails without an API key.
    pub fn new(config: &ModelConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?
            .to_string();

        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder()
            .read_timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            api_key,
            temperature: config.temperature,
            request_timeout,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    async fn build_body(&self, request: &ModelRequest) -> Result<GenerateContentRequest, ModelError> {
        let mut parts = vec![Part::Text {
            text: request.prompt.clone(),
        }];

        if let Some(image) = &request.context {
            let bytes = tokio::fs::read(image.path()).await.map_err(|e| {
                ModelError::rejected(format!(
                    "cannot read image {}: {}",
                    image.path().display(),
                    e
                ))
            })?;
            parts.push(Part::InlineData {
                inline_data: InlineDataPayload {
                    mime_type: image.mime_type.clone(),
                    data: BASE64.encode(bytes),
                },
            });
        }

        Ok(GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        })
    }

    /// Send `body`. `timeout` bounds the whole exchange, body included; without
    /// it only connect and read-idle limits apply.
    async fn post(
        &self,
        url: String,
        body: &GenerateContentRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ModelError> {
        let mut builder = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(map_http_error(status, &text))
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        debug!(kind = %request.kind, model = %self.model, "generateContent");
        let body = self.build_body(request).await?;
        let response = self
            .post(self.endpoint("generateContent"), &body, Some(self.request_timeout))
            .await?;
        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::malformed(format!("invalid response body: {}", e)))?;

        extract_text(&parsed)?
            .ok_or_else(|| ModelError::malformed("Gemini returned no text in the response candidates"))
    }

    async fn stream(&self, request: &ModelRequest) -> Result<FragmentStream, ModelError> {
        debug!(kind = %request.kind, model = %self.model, "streamGenerateContent");
        let body = self.build_body(request).await?;
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        // The stage executor caps the total duration of a stream
        let response = self.post(url, &body, None).await?;
        Ok(sse_fragments(response).boxed())
    }
}

fn sse_fragments(mut response: reqwest::Response) -> impl Stream<Item = Result<String, ModelError>> + Send {
    async_stream::try_stream! {
        let mut decoder = SseDecoder::default();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ModelError::unavailable(format!("stream interrupted: {}", e)))?
        {
            for payload in decoder.push(&chunk) {
                if let Some(text) = parse_stream_payload(&payload)? {
                    yield text;
                }
            }
        }
        for payload in decoder.finish() {
            if let Some(text) = parse_stream_payload(&payload)? {
                yield text;
            }
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

impl ErrorBody {
    fn describe(&self, fallback: &str) -> String {
        let message = self.message.clone().unwrap_or_else(|| fallback.to_string());
        match &self.status {
            Some(status) if !status.is_empty() => format!("{}: {}", status, message),
            _ => message,
        }
    }
}

/// Classify a non-success HTTP status. Rate limits, timeouts and server
/// errors are transient; everything else is a rejection.
fn map_http_error(status: StatusCode, body: &str) -> ModelError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| wrapper.error.describe(body))
        .unwrap_or_else(|_| body.to_string());
    let message = format!("HTTP {}: {}", status.as_u16(), message);

    if is_transient_status(status.as_u16()) {
        ModelError::unavailable(message)
    } else {
        ModelError::rejected(message)
    }
}

fn is_transient_status(code: u16) -> bool {
    code == 408 || code == 429 || (500..600).contains(&code)
}

/// Concatenated text of the first candidate, or a rejection if the prompt or
/// candidate was blocked.
fn extract_text(response: &GenerateContentResponse) -> Result<Option<String>, ModelError> {
    if let Some(error) = &response.error {
        let message = error.describe("error in response");
        return Err(match error.code {
            Some(code) if is_transient_status(code) => ModelError::unavailable(message),
            _ => ModelError::rejected(message),
        });
    }

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(ModelError::rejected(format!("prompt blocked: {}", reason)));
    }

    let Some(candidate) = response.candidates.first() else {
        return Ok(None);
    };

    let text: String = candidate
        .content
        .iter()
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .collect();

    if text.is_empty()
        && let Some(reason) = candidate.finish_reason.as_deref()
        && BLOCKING_FINISH_REASONS.contains(&reason)
    {
        return Err(ModelError::rejected(format!("response blocked: {}", reason)));
    }

    Ok((!text.is_empty()).then_some(text))
}

/// Decode one SSE `data:` payload of a streamed response into its text.
///
/// Returns `Ok(None)` for payloads that carry no text (keep-alives,
/// `[DONE]`, a final chunk with only usage metadata).
pub fn parse_stream_payload(payload: &str) -> Result<Option<String>, ModelError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }
    let response: GenerateContentResponse = serde_json::from_str(payload)
        .map_err(|e| ModelError::malformed(format!("invalid stream chunk: {}", e)))?;
    extract_text(&response)
}

/// Incremental Server-Sent-Events decoder.
///
/// Bytes are buffered until a blank line ends a frame, so multi-byte UTF-8
/// sequences split across network chunks are decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return the `data` payloads of every completed frame.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some((end, separator)) = find_frame_end(&self.pending) {
            let frame: Vec<u8> = self.pending.drain(..end + separator).collect();
            if let Some(data) = frame_data(&frame[..end]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<String> {
        let frame = std::mem::take(&mut self.pending);
        frame_data(&frame).into_iter().collect()
    }
}

fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, 2));
    let crlf = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| (pos, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn frame_data(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let lines: Vec<&str> = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}
