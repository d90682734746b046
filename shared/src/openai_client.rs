use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use openai::chat::{ChatCompletionMessage, ChatCompletionMessageRole};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::Settings;
use crate::error::PipelineError;
use crate::output_schema::OutputSchema;

/// A rendered prompt plus the key its reply must carry back.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptedRequest {
    pub correlation_key: String,
    pub prompt: String,
}

impl PromptedRequest {
    pub fn new(correlation_key: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            correlation_key: correlation_key.into(),
            prompt: prompt.into(),
        }
    }
}

/// Arguments the service produced for the schema's function.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredResult {
    pub correlation_key: String,
    pub payload: Value,
}

impl StructuredResult {
    /// Decode the payload into typed records. Missing fields, values outside
    /// an enumeration and out-of-range scales are all `MalformedOutput`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PipelineError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            PipelineError::malformed(format!("{}: {e}", self.correlation_key))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReply {
    pub correlation_key: String,
    pub result: Result<StructuredResult, PipelineError>,
}

/// Schema-constrained access to the text-generation service.
///
/// Implementations must not cache across calls and must not retry
/// `ServiceUnavailable`; retry policy belongs to whoever wraps the client.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn invoke_one(
        &self,
        request: &PromptedRequest,
        schema: &OutputSchema,
    ) -> Result<StructuredResult, PipelineError>;

    /// Upper bound on requests in flight during `invoke_batch`.
    fn max_parallel(&self) -> usize {
        1
    }

    /// Dispatch all requests concurrently and return one reply per request,
    /// in request order regardless of completion order.
    async fn invoke_batch(
        &self,
        requests: Vec<PromptedRequest>,
        schema: &OutputSchema,
    ) -> Vec<BatchReply> {
        let limit = self.max_parallel().max(1);
        let mut replies: Vec<(usize, BatchReply)> = stream::iter(requests.into_iter().enumerate())
            .map(|(idx, req)| async move {
                let result = match self.invoke_one(&req, schema).await {
                    Ok(res) if res.correlation_key != req.correlation_key => {
                        Err(PipelineError::ContractViolation(format!(
                            "reply key {} does not match request key {}",
                            res.correlation_key, req.correlation_key
                        )))
                    }
                    other => other,
                };
                (
                    idx,
                    BatchReply {
                        correlation_key: req.correlation_key,
                        result,
                    },
                )
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        replies.sort_by_key(|(idx, _)| *idx);
        replies.into_iter().map(|(_, reply)| reply).collect()
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_parallel: usize,
}

impl OpenAiConfig {
    pub fn from_settings(settings: &Settings, model: &str) -> Self {
        Self {
            api_key: settings.openai_api_key.clone(),
            api_base: settings.openai_api_base.clone(),
            model: model.to_string(),
            temperature: settings.openai_temperature,
            timeout: Duration::from_millis(settings.openai_timeout_ms),
            max_parallel: settings.max_parallel,
        }
    }
}

/// `GenerationClient` over the chat-completions endpoint, using one forced
/// function tool per request.
pub struct OpenAiClient {
    http: Client,
    cfg: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatCompletionMessage],
    temperature: f32,
    tools: Vec<Value>,
    tool_choice: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| PipelineError::unavailable(format!("http client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.cfg.api_base.trim_end_matches('/'))
    }

    async fn call(&self, prompt: &str, schema: &OutputSchema) -> Result<Value, PipelineError> {
        let messages = vec![ChatCompletionMessage {
            role: ChatCompletionMessageRole::User,
            content: Some(prompt.to_string()),
            ..Default::default()
        }];
        let req = ChatRequest {
            model: &self.cfg.model,
            messages: &messages,
            temperature: self.cfg.temperature,
            tools: vec![schema.tool()],
            tool_choice: schema.tool_choice(),
        };

        debug!(
            model = %self.cfg.model,
            function = %schema.function_name,
            "\u{2192} OpenAI request"
        );
        let res = self
            .http
            .post(self.endpoint())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.cfg.api_key))
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                error!("network error to OpenAI: {e}");
                PipelineError::unavailable(e.to_string())
            })?;

        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| PipelineError::unavailable(e.to_string()))?;
        debug!(
            %status,
            "\u{2190} body = {}",
            String::from_utf8_lossy(&bytes[..bytes.len().min(1024)])
        );

        if !status.is_success() {
            warn!(%status, model = %self.cfg.model, "OpenAI returned non-success status");
            return Err(PipelineError::unavailable(format!("HTTP {}", status.as_u16())));
        }

        let chat: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::malformed(format!("not a chat completion: {e}")))?;
        let call = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.tool_calls)
            .and_then(|calls| {
                calls
                    .into_iter()
                    .find(|c| c.function.name == schema.function_name)
            })
            .ok_or_else(|| {
                PipelineError::malformed(format!(
                    "no `{}` tool call in reply",
                    schema.function_name
                ))
            })?;

        parse_arguments(&call.function.arguments)
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn invoke_one(
        &self,
        request: &PromptedRequest,
        schema: &OutputSchema,
    ) -> Result<StructuredResult, PipelineError> {
        let payload = tokio::time::timeout(self.cfg.timeout, self.call(&request.prompt, schema))
            .await
            .map_err(|_| {
                warn!(key = %request.correlation_key, "OpenAI call timed out");
                PipelineError::unavailable(format!(
                    "timeout after {}ms",
                    self.cfg.timeout.as_millis()
                ))
            })??;
        Ok(StructuredResult {
            correlation_key: request.correlation_key.clone(),
            payload,
        })
    }

    fn max_parallel(&self) -> usize {
        self.cfg.max_parallel
    }
}

/// Decode tool-call arguments. A single surrounding code fence is removed;
/// anything else that is not a JSON object is `MalformedOutput`.
pub fn parse_arguments(raw: &str) -> Result<Value, PipelineError> {
    let t = strip_code_fences(raw.trim()).trim();
    match serde_json::from_str::<Value>(t) {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(other) => Err(PipelineError::malformed(format!(
            "expected JSON object, got {other}"
        ))),
        Err(e) => Err(PipelineError::malformed(format!("invalid JSON arguments: {e}"))),
    }
}

fn strip_code_fences(s: &str) -> &str {
    let s = s.strip_prefix("```json").unwrap_or(s);
    let s = s.strip_prefix("```").unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s
}
