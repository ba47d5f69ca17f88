use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use scribe_core::errors::LlmError;
use scribe_core::provider::{ApiKey, Completion, CompletionRequest, LlmClient};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Client for the Anthropic Messages API, non-streaming.
///
/// Each workflow step is a single bounded completion, so there is no SSE
/// plumbing here — the whole reply body is read and the text blocks are
/// concatenated.
pub struct AnthropicClient {
    client: Client,
    api_key: ApiKey,
    model: String,
    request_timeout: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: ApiKey, model: Option<&str>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build a client from `ANTHROPIC_API_KEY` (required) and `SCRIBE_MODEL`
    /// (optional) environment variables.
    pub fn from_env() -> Result<Self, LlmError> {
        let key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| LlmError::AuthenticationFailed("ANTHROPIC_API_KEY is not set".into()))?;
        let model = std::env::var("SCRIBE_MODEL").ok();
        Ok(Self::new(ApiKey(key.into()), model.as_deref()))
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Concatenate the `text` content blocks of a Messages API reply.
fn parse_response(body: &str) -> Result<Completion, LlmError> {
    let resp: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::MalformedResponse(format!("invalid response JSON: {e}")))?;

    let text: String = resp
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .collect();

    if text.is_empty() {
        return Err(LlmError::MalformedResponse(
            "response contained no text blocks".into(),
        ));
    }

    Ok(Completion {
        text,
        input_tokens: resp.usage.input_tokens,
        output_tokens: resp.usage.output_tokens,
    })
}

fn retry_after_header(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
        };

        let send = self
            .client
            .post(API_URL)
            .header("x-api-key", self.api_key.0.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let resp = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| LlmError::Timeout(self.request_timeout))?
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = retry_after_header(&resp);
            let text = resp.text().await.unwrap_or_default();
            let mut err = LlmError::from_status(status, text);
            if let LlmError::RateLimited { retry_after: hint } = &mut err {
                *hint = retry_after;
            }
            return Err(err);
        }

        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let completion = parse_response(&text)?;
        debug!(
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "completion received"
        );
        Ok(completion)
    }
}
