use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use url::Url;

use crate::upstream::{UpstreamError, endpoint, send_json, start_request};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Client for Meilisearch chat workspaces.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl ChatClient {
    pub fn new(http: reqwest::Client, base_url: Url, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }

    /// Runs a completion and returns the concatenated assistant text.
    ///
    /// The upstream answers with an event stream of OpenAI-style chunks;
    /// `choices[0].delta.content` of each chunk is appended until
    /// `data: [DONE]`.
    pub async fn create_chat_completion(
        &self,
        workspace_uid: &str,
        messages: &[ChatMessage],
        model: &str,
        stream: bool,
    ) -> Result<String, UpstreamError> {
        let url = endpoint(
            &self.base_url,
            &["chats", workspace_uid, "chat", "completions"],
            &[],
        )?;
        let body = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });

        tracing::info!(event = "chat_completion_started", workspace_uid, "Creating chat completion");
        let mut response =
            start_request(&self.http, url, Method::POST, self.api_key.as_deref(), Some(&body))
                .await?;

        let mut collector = CompletionCollector::default();
        while let Some(chunk) = response.chunk().await.map_err(UpstreamError::Body)? {
            if collector.feed(&chunk) {
                break;
            }
        }
        collector.finish();
        Ok(collector.text)
    }

    pub async fn get_chat_workspaces(
        &self,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Value, UpstreamError> {
        let mut query = Vec::new();
        if let Some(offset) = offset {
            query.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        let url = endpoint(&self.base_url, &["chats"], &query)?;
        send_json(&self.http, url, Method::GET, self.api_key.as_deref(), None).await
    }

    pub async fn get_workspace_settings(&self, workspace_uid: &str) -> Result<Value, UpstreamError> {
        let url = endpoint(&self.base_url, &["chats", workspace_uid, "settings"], &[])?;
        send_json(&self.http, url, Method::GET, self.api_key.as_deref(), None).await
    }

    pub async fn update_workspace_settings(
        &self,
        workspace_uid: &str,
        settings: &Map<String, Value>,
    ) -> Result<Value, UpstreamError> {
        let url = endpoint(&self.base_url, &["chats", workspace_uid, "settings"], &[])?;
        let body = Value::Object(settings.clone());
        send_json(
            &self.http,
            url,
            Method::PATCH,
            self.api_key.as_deref(),
            Some(&body),
        )
        .await
    }
}

/// Incremental parser for a streamed completion. Bytes may split lines
/// (and UTF-8 sequences) anywhere, so input is buffered until a newline.
#[derive(Debug, Default)]
struct CompletionCollector {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl CompletionCollector {
    /// Returns `true` once the terminal `[DONE]` marker was seen.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&String::from_utf8_lossy(&line));
            if self.done {
                return true;
            }
        }
        false
    }

    fn finish(&mut self) {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.consume_line(&String::from_utf8_lossy(&rest));
        }
    }

    fn consume_line(&mut self, line: &str) {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        let Ok(chunk) = serde_json::from_str::<Value>(data) else {
            return;
        };
        if let Some(delta) = chunk
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            self.text.push_str(delta);
        }
    }
}
