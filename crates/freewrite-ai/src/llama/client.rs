//! HTTP client for llama-server's OpenAI-compatible API.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DEFAULT_LLAMA_PORT;
use crate::error::RuntimeError;
use crate::runtime::{GenerationParams, TokenCallback, TokenFlow};

/// Client for communicating with llama-server.
pub struct LlamaCppClient {
    client: reqwest::Client,
    base_url: String,
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// One server-sent chunk of a streamed completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Token(String),
    Done,
    Skip,
}

impl LlamaCppClient {
    /// Create a new client with default URL (localhost:11435).
    pub fn new() -> Self {
        Self::with_port(DEFAULT_LLAMA_PORT)
    }

    /// Create a new client with a custom URL.
    pub fn with_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a new client with a custom port on localhost.
    pub fn with_port(port: u16) -> Self {
        Self::with_url(format!("http://127.0.0.1:{}", port))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server is running and healthy.
    pub async fn check_health(&self) -> Result<(), RuntimeError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    RuntimeError::ServerNotRunning(self.base_url.clone())
                } else {
                    RuntimeError::Http(e)
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RuntimeError::ServerNotRunning(self.base_url.clone()))
        }
    }

    /// Stream a chat completion for a single user message.
    ///
    /// Returns as soon as the server signals the end of the stream or
    /// `on_token` asks to stop; dropping the response closes the connection.
    pub async fn stream_chat(
        &self,
        prompt: &str,
        params: &GenerationParams,
        on_token: &mut TokenCallback<'_>,
    ) -> Result<(), RuntimeError> {
        let request = ChatCompletionRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: true,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RuntimeError::ServerNotRunning(self.base_url.clone())
                } else {
                    RuntimeError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Api(format!("{}: {}", status, text)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);

            // Events are newline-delimited; keep a partial line for the next chunk.
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match parse_event(String::from_utf8_lossy(&line).trim())? {
                    StreamEvent::Token(piece) => {
                        if on_token(&piece) == TokenFlow::Stop {
                            debug!("Token callback stopped the stream");
                            return Ok(());
                        }
                    }
                    StreamEvent::Done => return Ok(()),
                    StreamEvent::Skip => {}
                }
            }
        }

        Ok(())
    }
}

impl Default for LlamaCppClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_event(line: &str) -> Result<StreamEvent, RuntimeError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(StreamEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(StreamEvent::Token)
        .unwrap_or(StreamEvent::Skip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        let client = LlamaCppClient::new();
        assert_eq!(client.base_url(), "http://127.0.0.1:11435");
    }

    #[test]
    fn test_custom_port() {
        let client = LlamaCppClient::with_port(9000);
        assert_eq!(client.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn parses_content_deltas() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_event(line).unwrap(), StreamEvent::Token("Hel".to_string()));
    }

    #[test]
    fn role_only_and_comment_lines_are_skipped() {
        let role = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_event(role).unwrap(), StreamEvent::Skip);
        assert_eq!(parse_event(": keep-alive").unwrap(), StreamEvent::Skip);
        assert_eq!(parse_event("").unwrap(), StreamEvent::Skip);
    }

    #[test]
    fn done_marker_ends_the_stream() {
        assert_eq!(parse_event("data: [DONE]").unwrap(), StreamEvent::Done);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(matches!(
            parse_event("data: {not json"),
            Err(RuntimeError::Json(_))
        ));
    }
}
