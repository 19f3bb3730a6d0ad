//! Generation client: an ordered list of strategies, each tried once.

use async_trait::async_trait;
use pulpit_core::{PulpitError, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

/// One generation attempt, shared by every strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCall {
    /// Conversation context, user message and style hints.
    pub input: String,
    /// Persona rules for strategies that take an explicit system message.
    pub system_instruction: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Performs the remote call and returns the decoded body.
    async fn call(&self, call: &GenerationCall) -> Result<Value>;

    /// Pulls plain text out of a decoded body, `None` for unknown shapes.
    fn extract(&self, body: &Value) -> Option<String> {
        extract_text(body)
    }
}

/// Recognizes the Responses shape (`output_text` or `output[].content[]`)
/// and the Chat Completions shape (`choices[0].message.content`).
pub fn extract_text(body: &Value) -> Option<String> {
    if let Some(text) = nonempty(body.get("output_text")) {
        return Some(text);
    }

    if let Some(items) = body.get("output").and_then(Value::as_array) {
        for item in items {
            let Some(contents) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for content in contents {
                if content.get("type").and_then(Value::as_str) == Some("output_text") {
                    if let Some(text) = nonempty(content.get("text")) {
                        return Some(text);
                    }
                }
            }
        }
    }

    nonempty(
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content")),
    )
}

fn nonempty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn transport_error(e: reqwest::Error) -> PulpitError {
    PulpitError::GenerationTransport {
        message: e.to_string(),
        connect: e.is_connect() || e.is_timeout(),
    }
}

async fn post_json<T: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    api_key: &str,
    body: &T,
) -> Result<Value> {
    let resp = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(transport_error)?;
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(PulpitError::GenerationStatus { status, body });
    }
    resp.json::<Value>()
        .await
        .map_err(|e| PulpitError::GenerationDecode(e.to_string()))
}

#[derive(Debug, Serialize)]
struct PromptReference {
    id: String,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    prompt: PromptReference,
    input: &'a str,
    max_output_tokens: u32,
    temperature: f64,
}

/// Primary call: a stored prompt template plus the built input.
pub struct ResponsesStrategy {
    client: Client,
    api_base: String,
    api_key: String,
    prompt_id: String,
}

impl ResponsesStrategy {
    pub fn new(client: Client, api_base: &str, api_key: String, prompt_id: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            prompt_id,
        }
    }
}

#[async_trait]
impl GenerationStrategy for ResponsesStrategy {
    fn name(&self) -> &str {
        "responses"
    }

    async fn call(&self, call: &GenerationCall) -> Result<Value> {
        let req = ResponsesRequest {
            prompt: PromptReference {
                id: self.prompt_id.clone(),
            },
            input: &call.input,
            max_output_tokens: call.max_tokens,
            temperature: call.temperature,
        };
        let url = format!("{}/responses", self.api_base);
        tracing::info!(
            "Responses request: prompt={} max_output_tokens={}",
            self.prompt_id,
            call.max_tokens
        );
        post_json(&self.client, &url, &self.api_key, &req).await
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Fallback call: plain chat completion with the persona as system message.
pub struct ChatCompletionsStrategy {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsStrategy {
    pub fn new(client: Client, api_base: &str, api_key: String, model: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl GenerationStrategy for ChatCompletionsStrategy {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn call(&self, call: &GenerationCall) -> Result<Value> {
        let req = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: &call.system_instruction,
                },
                ApiMessage {
                    role: "user",
                    content: &call.input,
                },
            ],
            max_tokens: call.max_tokens,
            temperature: call.temperature,
        };
        let url = format!("{}/chat/completions", self.api_base);
        tracing::info!("Chat completion request: model={} max_tokens={}", self.model, call.max_tokens);
        post_json(&self.client, &url, &self.api_key, &req).await
    }
}

/// Tries each strategy once, in order, until one answers.
pub struct InferenceService {
    strategies: Vec<Box<dyn GenerationStrategy>>,
}

impl InferenceService {
    pub fn new(strategies: Vec<Box<dyn GenerationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Responses-style primary with a Chat Completions fallback, sharing one client.
    pub fn openai(api_base: &str, api_key: &str, prompt_id: &str, fallback_model: &str) -> Self {
        let client = Client::new();
        Self::new(vec![
            Box::new(ResponsesStrategy::new(
                client.clone(),
                api_base,
                api_key.to_string(),
                prompt_id.to_string(),
            )),
            Box::new(ChatCompletionsStrategy::new(
                client,
                api_base,
                api_key.to_string(),
                fallback_model.to_string(),
            )),
        ])
    }

    /// `Ok(None)` when a call succeeded but its body had no recognizable text;
    /// that is not retried. The last strategy's error is returned when all fail.
    pub async fn generate(&self, call: &GenerationCall) -> Result<Option<String>> {
        let mut last_error = None;
        for strategy in &self.strategies {
            match strategy.call(call).await {
                Ok(body) => {
                    tracing::info!("Generation via {} succeeded", strategy.name());
                    let text = strategy.extract(&body);
                    if text.is_none() {
                        tracing::warn!(
                            "Unknown response format from {}: {}",
                            strategy.name(),
                            body
                        );
                    }
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!("Generation via {} failed: {e}", strategy.name());
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(PulpitError::NoStrategy))
    }
}
