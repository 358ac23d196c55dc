use std::time::{Duration, Instant};

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::errors::TransportError;
use crate::models::message::Message;
use crate::models::tool::Tool;

use super::stream::{JsonObjectScanner, MessageAccumulator};
use super::wire::{messages_to_contents, response_to_message, tools_to_declarations};
use super::ChatTransport;

/// Bounds both the plain HTTP call and the total lifetime of a stream.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_HOST: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub verbose: bool,
}

impl GeminiConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: 8192,
            verbose: false,
        }
    }
}

pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.config.host.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn payload(&self, messages: &[Message], tools: &[Tool]) -> Value {
        let mut payload = json!({
            "contents": messages_to_contents(messages),
            "generationConfig": { "maxOutputTokens": self.config.max_output_tokens },
        });
        if !tools.is_empty() {
            payload
                .as_object_mut()
                .unwrap()
                .insert("tools".to_string(), tools_to_declarations(tools));
        }
        payload
    }

    async fn post(&self, method: &str, payload: &Value) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .post(self.url(method))
            .header("x-goog-api-key", &self.config.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }

        // Pull the upstream error message out of the body if there is one.
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
            })
            .unwrap_or(body);
        Err(TransportError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatTransport for GeminiClient {
    async fn send(&self, messages: &[Message], tools: &[Tool]) -> Result<Message, TransportError> {
        let payload = self.payload(messages, tools);
        let response = self.post("generateContent", &payload).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        response_to_message(&body)
    }

    async fn send_stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<BoxStream<'static, Result<Message, TransportError>>, TransportError> {
        let payload = self.payload(messages, tools);
        let response = self.post("streamGenerateContent", &payload).await?;
        let verbose = self.config.verbose;

        let mut bytes = response.bytes_stream();
        let deadline = Instant::now() + REQUEST_TIMEOUT;

        Ok(Box::pin(try_stream! {
            let mut scanner = JsonObjectScanner::new(verbose);
            let mut accumulator = MessageAccumulator::new();
            let mut last: Option<Message> = None;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let chunk = match tokio::time::timeout(remaining, bytes.next()).await {
                    Err(_) => Err(TransportError::Timeout(REQUEST_TIMEOUT))?,
                    Ok(None) => break,
                    Ok(Some(chunk)) => chunk.map_err(TransportError::Request)?,
                };

                for object in scanner.feed(&chunk) {
                    if accumulator.absorb(&object) {
                        let snapshot = accumulator.snapshot();
                        last = Some(snapshot.clone());
                        yield snapshot;
                    }
                }
            }

            if let Some(message) = accumulator.finish(last.as_ref()) {
                yield message;
            }
        }))
    }
}
