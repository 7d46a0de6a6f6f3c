//! Ollama HTTP client (native `/api/*` endpoints)

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ChatRequest, GenerateRequest, InferenceTransport};
use crate::error::{BackendError, BackendResult};

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the channel handed out by `generate_stream`
const STREAM_BUFFER: usize = 64;

/// Ollama API client.
///
/// The pooled HTTP client lives behind a lock so `close()` can drop it while
/// other holders of the `Arc` still exist; later calls fail with
/// [`BackendError::Closed`].
pub struct OllamaClient {
    client: RwLock<Option<Client>>,
    host: String,
    timeout: Duration,
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("client", &"<reqwest::Client>")
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A model present in the local Ollama store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

impl OllamaClient {
    /// Create a client for `host` with a per-request timeout
    pub fn new(host: impl Into<String>, timeout: Duration) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        let host = host.into().trim_end_matches('/').to_string();
        info!("Ollama client initialized: {}", host);

        Ok(Self {
            client: RwLock::new(Some(client)),
            host,
            timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_closed(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Release the connection pool. Idempotent.
    pub fn close(&self) {
        let dropped = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if dropped.is_some() {
            info!("Ollama client closed");
        }
    }

    fn http(&self) -> BackendResult<Client> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BackendError::Closed)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> BackendResult<Response> {
        let response = self
            .http()?
            .post(self.url(path))
            .json(body)
            .send()
            .await?;
        ensure_success(response).await
    }

    /// True when the server answers its banner. Never errors.
    pub async fn check_health(&self) -> bool {
        let client = match self.http() {
            Ok(client) => client,
            Err(_) => return false,
        };
        match client.get(&self.host).send().await {
            Ok(response) => match response.text().await {
                Ok(text) => text.contains("Ollama is running"),
                Err(e) => {
                    warn!("Health check failed reading body: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Health check failed: {}", e);
                false
            }
        }
    }

    /// Models available locally
    pub async fn list_models(&self) -> BackendResult<Vec<LocalModel>> {
        let response = self.http()?.get(self.url("/api/tags")).send().await?;
        let response = ensure_success(response).await?;
        let tags: TagsResponse = response.json().await?;
        info!("Found {} local models", tags.models.len());
        Ok(tags.models)
    }

    /// Generate with incremental delivery.
    ///
    /// Chunks arrive on the returned channel in order. The channel closes when
    /// the backend reports `done` or the body ends; a decode or transport
    /// failure is sent as the final item.
    pub async fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> BackendResult<mpsc::Receiver<BackendResult<String>>> {
        let body = GenerateBody::new(&request, true);
        let mut response = self.post("/api/generate", &body).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        for line in drain_lines(&mut buffer) {
                            if !forward_generate_line(&tx, &line).await {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                }
            }

            let rest = String::from_utf8_lossy(&buffer).trim().to_string();
            if !rest.is_empty() {
                forward_generate_line(&tx, &rest).await;
            }
        });

        Ok(rx)
    }

    /// Download a model, logging progress lines at debug level
    pub async fn pull_model(&self, name: &str) -> BackendResult<()> {
        info!("Pulling model: {}", name);
        let mut response = self
            .post("/api/pull", &serde_json::json!({ "name": name }))
            .await?;

        let mut buffer: Vec<u8> = Vec::new();
        while let Some(bytes) = response.chunk().await? {
            buffer.extend_from_slice(&bytes);
            for line in drain_lines(&mut buffer) {
                let status: PullStatus = serde_json::from_str(&line)?;
                if let Some(error) = status.error {
                    return Err(BackendError::Unavailable(format!(
                        "pull of {} failed: {}",
                        name, error
                    )));
                }
                if let Some(status) = status.status {
                    debug!("Pull status: {}", status);
                }
            }
        }

        info!("Model {} pulled successfully", name);
        Ok(())
    }

    /// Raw model metadata from `/api/show`
    pub async fn show_model(&self, name: &str) -> BackendResult<Value> {
        let response = self
            .post("/api/show", &serde_json::json!({ "name": name }))
            .await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl InferenceTransport for OllamaClient {
    fn backend_name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: GenerateRequest) -> BackendResult<String> {
        debug!(
            "Sending generate request to {} ({} prompt bytes)",
            request.model,
            request.prompt.len()
        );
        let body = GenerateBody::new(&request, false);
        let response = self.post("/api/generate", &body).await?;
        let chunk: GenerateChunk = response.json().await?;
        Ok(chunk.response)
    }

    async fn chat(&self, request: ChatRequest) -> BackendResult<Value> {
        debug!(
            "Sending chat request to {} with {} messages",
            request.model,
            request.messages.len()
        );
        let body = ChatBody::new(&request);
        let response = self.post("/api/chat", &body).await?;
        Ok(response.json().await?)
    }
}

async fn ensure_success(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Sends one decoded chunk. Returns false when the stream should stop.
async fn forward_generate_line(
    tx: &mpsc::Sender<BackendResult<String>>,
    line: &str,
) -> bool {
    match serde_json::from_str::<GenerateChunk>(line) {
        Ok(chunk) => {
            if !chunk.response.is_empty() && tx.send(Ok(chunk.response)).await.is_err() {
                return false;
            }
            !chunk.done
        }
        Err(e) => {
            let _ = tx.send(Err(e.into())).await;
            false
        }
    }
}

/// Split complete newline-terminated lines off the front of `buffer`
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: Options,
}

impl<'a> GenerateBody<'a> {
    fn new(request: &'a GenerateRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream,
            options: Options {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: Options,
}

impl<'a> ChatBody<'a> {
    fn new(request: &'a ChatRequest) -> Self {
        let messages = request
            .messages
            .iter()
            .map(|turn| WireMessage {
                role: match turn.role {
                    crate::types::Role::User => "user",
                    crate::types::Role::Assistant => "assistant",
                },
                content: &turn.content,
            })
            .collect();

        Self {
            model: &request.model,
            messages,
            stream: false,
            options: Options {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Debug, Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConversationTurn;

    fn client() -> OllamaClient {
        OllamaClient::new("http://localhost:11434/", DEFAULT_TIMEOUT).unwrap()
    }

    fn generate_request() -> GenerateRequest {
        GenerateRequest {
            model: "llama3.2".to_string(),
            prompt: "Hello".to_string(),
            system: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    #[test]
    fn test_client_creation_trims_host() {
        let client = client();
        assert_eq!(client.host(), "http://localhost:11434");
        assert_eq!(client.timeout(), Duration::from_secs(60));
        assert!(!client.is_closed());
    }

    #[test]
    fn test_client_debug() {
        let debug_output = format!("{:?}", client());
        assert!(debug_output.contains("OllamaClient"));
        assert!(debug_output.contains("http://localhost:11434"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_calls() {
        let client = client();
        client.close();
        client.close();
        assert!(client.is_closed());

        let err = client.generate(generate_request()).await.unwrap_err();
        assert_eq!(err, BackendError::Closed);
        assert!(!client.check_health().await);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let client = OllamaClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = client.generate(generate_request()).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {:?}", err);
        assert!(!client.check_health().await);
    }

    #[test]
    fn test_generate_body_omits_unset_fields() {
        let request = generate_request();
        let json = serde_json::to_value(GenerateBody::new(&request, false)).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], false);
        assert!(json.get("system").is_none());
        assert!(json["options"].get("num_predict").is_none());
    }

    #[test]
    fn test_generate_body_with_system_and_cap() {
        let request = GenerateRequest {
            system: Some("Be terse".to_string()),
            max_tokens: Some(256),
            ..generate_request()
        };
        let json = serde_json::to_value(GenerateBody::new(&request, true)).unwrap();
        assert_eq!(json["system"], "Be terse");
        assert_eq!(json["stream"], true);
        assert_eq!(json["options"]["num_predict"], 256);
    }

    #[test]
    fn test_chat_body_is_exactly_the_history() {
        let request = ChatRequest {
            model: "qwen2.5:7b".to_string(),
            messages: vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("hello"),
            ],
            temperature: 0.3,
            max_tokens: Some(4096),
        };
        let json = serde_json::to_value(ChatBody::new(&request)).unwrap();
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "hi");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"], "hello");
        assert!(json.get("system").is_none());
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 4096);
    }

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buffer = b"{\"response\":\"a\"}\n\n{\"response\":\"b\"}\n{\"resp".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec!["{\"response\":\"a\"}", "{\"response\":\"b\"}"]);
        assert_eq!(buffer, b"{\"resp".to_vec());
    }

    #[tokio::test]
    async fn test_forward_generate_line() {
        let (tx, mut rx) = mpsc::channel(4);
        assert!(forward_generate_line(&tx, r#"{"response":"Hel","done":false}"#).await);
        assert!(!forward_generate_line(&tx, r#"{"response":"lo","done":true}"#).await);
        assert!(!forward_generate_line(&tx, "not json").await);
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().unwrap(), "Hel");
        assert_eq!(rx.recv().await.unwrap().unwrap(), "lo");
        assert!(matches!(rx.recv().await.unwrap(), Err(BackendError::Decode(_))));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_tags_response_defaults() {
        let tags: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(tags.models.is_empty());

        let tags: TagsResponse =
            serde_json::from_str(r#"{"models":[{"name":"llama3.2:latest","size":42}]}"#).unwrap();
        assert_eq!(tags.models[0].name, "llama3.2:latest");
        assert_eq!(tags.models[0].size, 42);
    }
}
