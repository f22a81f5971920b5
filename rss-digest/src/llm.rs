use crate::config::LlmConfig;
use crate::types::{ModelError, ModelInvoker};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
}

impl fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiChatModel {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ModelError::Permanent(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            temperature: config.temperature,
        })
    }

    /// Reads the key from the environment variable named in `config`.
    pub fn from_env(config: &LlmConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ModelError::Permanent(format!("{} is not set", config.api_key_env))
        })?;
        Self::new(api_key, config)
    }
}

#[async_trait]
impl ModelInvoker for OpenAiChatModel {
    async fn invoke(&self, prompt: &str, model_id: &str) -> Result<String, ModelError> {
        let request = ChatCompletionRequest {
            model: model_id,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Permanent(format!("malformed response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| ModelError::Permanent("no choices in response".to_string()))
    }
}

/// Rate limits and server-side failures are worth another attempt; any other
/// rejection will not change on retry.
pub fn classify_status(status: StatusCode, body: &str) -> ModelError {
    let message = format!("API returned {}: {}", status, body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ModelError::Transient(message)
    } else {
        ModelError::Permanent(message)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Retries transient failures of the wrapped model with exponential backoff.
/// Permanent failures are returned immediately.
pub struct RetryingModel {
    inner: Arc<dyn ModelInvoker>,
    max_retries: u32,
    initial_delay: Duration,
}

impl RetryingModel {
    pub fn new(inner: Arc<dyn ModelInvoker>, max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            initial_delay,
        }
    }

    pub fn from_config(inner: Arc<dyn ModelInvoker>, config: &LlmConfig) -> Self {
        Self::new(inner, config.max_retries, Duration::from_millis(config.retry_delay_ms))
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            max_interval: self.initial_delay * 32,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ModelInvoker for RetryingModel {
    async fn invoke(&self, prompt: &str, model_id: &str) -> Result<String, ModelError> {
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            match self.inner.invoke(prompt, model_id).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.initial_delay);
                    warn!(
                        "Model {} attempt {} failed, retrying in {:?}: {}",
                        model_id, attempt, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!("Model {} gave up after {} retries: {}", model_id, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

struct Script {
    model_id: String,
    needle: Option<String>,
    reply: Result<String, ModelError>,
    /// Remaining uses; `None` means unlimited.
    remaining: Option<usize>,
}

/// Scriptable model for development and tests. Replies are chosen by model id
/// and an optional substring of the prompt; every call is counted.
#[derive(Default)]
pub struct MockModel {
    scripts: Mutex<Vec<Script>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String)>>,
    response_delay_ms: u64,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    /// Default reply for every prompt sent to `model_id`.
    pub fn respond(self, model_id: &str, reply: &str) -> Self {
        self.script(model_id, None, Ok(reply.to_string()), None)
    }

    /// Reply used when the prompt to `model_id` contains `needle`.
    pub fn respond_when(self, model_id: &str, needle: &str, reply: &str) -> Self {
        self.script(model_id, Some(needle), Ok(reply.to_string()), None)
    }

    pub fn fail_when(self, model_id: &str, needle: &str, error: ModelError) -> Self {
        self.script(model_id, Some(needle), Err(error), None)
    }

    /// Fails the next `times` calls to `model_id` before falling through to
    /// the other scripts.
    pub fn fail_times(self, model_id: &str, times: usize, error: ModelError) -> Self {
        self.script(model_id, None, Err(error), Some(times))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, model_id: &str) -> usize {
        self.prompts
            .lock()
            .map(|prompts| prompts.iter().filter(|(model, _)| model == model_id).count())
            .unwrap_or(0)
    }

    /// Every `(model_id, prompt)` pair received, in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn script(
        mut self,
        model_id: &str,
        needle: Option<&str>,
        reply: Result<String, ModelError>,
        remaining: Option<usize>,
    ) -> Self {
        if let Ok(scripts) = self.scripts.get_mut() {
            scripts.push(Script {
                model_id: model_id.to_string(),
                needle: needle.map(str::to_string),
                reply,
                remaining,
            });
        }
        self
    }

    fn pick(&self, prompt: &str, model_id: &str) -> Result<String, ModelError> {
        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| ModelError::Permanent("mock scripts poisoned".to_string()))?;

        let applies = |s: &Script| {
            s.model_id == model_id
                && s.remaining != Some(0)
                && s.needle.as_deref().map_or(true, |n| prompt.contains(n))
        };

        // Limited scripts first, then needle matches, then the model default
        let index = scripts
            .iter()
            .position(|s| s.remaining.is_some() && applies(s))
            .or_else(|| scripts.iter().position(|s| s.needle.is_some() && applies(s)))
            .or_else(|| scripts.iter().position(|s| applies(s)));

        match index {
            Some(i) => {
                let script = &mut scripts[i];
                if let Some(left) = script.remaining.as_mut() {
                    *left -= 1;
                }
                script.reply.clone()
            }
            None => Err(ModelError::Permanent(format!(
                "no scripted reply for model {}",
                model_id
            ))),
        }
    }
}

#[async_trait]
impl ModelInvoker for MockModel {
    async fn invoke(&self, prompt: &str, model_id: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((model_id.to_string(), prompt.to_string()));
        }
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
        self.pick(prompt, model_id)
    }
}
