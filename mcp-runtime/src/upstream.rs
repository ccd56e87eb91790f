use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use url::Url;

use crate::util::parse_response_body;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to reach Meilisearch at {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Meilisearch returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to read Meilisearch response: {0}")]
    Body(reqwest::Error),
    #[error("unexpected Meilisearch response: {0}")]
    Decode(String),
    #[error("invalid request path: {0}")]
    Path(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Sends one authenticated request and returns the parsed body.
///
/// Shared by the Meilisearch and chat clients.
pub(crate) async fn send_json(
    http: &reqwest::Client,
    url: Url,
    method: Method,
    api_key: Option<&str>,
    body: Option<&Value>,
) -> Result<Value, UpstreamError> {
    let response = start_request(http, url, method, api_key, body).await?;
    let bytes = response.bytes().await.map_err(UpstreamError::Body)?;
    Ok(parse_response_body(&bytes))
}

/// Sends a request and returns the response once its status is known to be
/// successful; the body is left unread for streaming callers.
pub(crate) async fn start_request(
    http: &reqwest::Client,
    url: Url,
    method: Method,
    api_key: Option<&str>,
    body: Option<&Value>,
) -> Result<reqwest::Response, UpstreamError> {
    let display_url = url.to_string();
    let mut request = http.request(method.clone(), url);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    tracing::debug!(
        event = "upstream_request",
        method = %method,
        url = %display_url,
        has_auth_header = api_key.is_some(),
        "Meilisearch request"
    );

    let response = request
        .send()
        .await
        .map_err(|source| UpstreamError::Connection {
            url: display_url.clone(),
            source,
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 401 {
        tracing::warn!(
            event = "upstream_auth_failed",
            url = %display_url,
            has_auth_header = api_key.is_some(),
            "Meilisearch rejected the credentials"
        );
    }
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Builds `base/segment/segment?query`, percent-encoding each segment.
pub(crate) fn endpoint(
    base: &Url,
    segments: &[&str],
    query: &[(String, String)],
) -> Result<Url, UpstreamError> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| UpstreamError::Path(format!("{base} cannot be a base URL")))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchRequest {
    pub q: String,
    pub limit: u64,
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            q: query.into(),
            limit: 20,
            offset: 0,
            filter: None,
            sort: None,
        }
    }
}

/// Filters accepted by `GET /tasks`, `POST /tasks/cancel`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub pairs: Vec<(String, String)>,
}

impl TaskQuery {
    pub fn push(&mut self, key: &str, value: impl ToString) {
        self.pairs.push((key.to_string(), value.to_string()));
    }

    pub fn push_list<T: ToString>(&mut self, key: &str, values: &[T]) {
        let joined = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.push(key, joined);
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub database_size: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub indexes_count: usize,
    pub indexes_info: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMetrics {
    pub number_of_documents: u64,
    pub field_distribution: Value,
    pub is_indexing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_size: Option<u64>,
}

/// Named Meilisearch operations. Each method is one upstream call unless
/// documented otherwise.
#[derive(Debug, Clone)]
pub struct MeilisearchClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    health_check_timeout: Duration,
}

impl MeilisearchClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        api_key: Option<String>,
        health_check_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            health_check_timeout,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn call(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        let url = endpoint(&self.base_url, segments, query)?;
        send_json(&self.http, url, method, self.api_key.as_deref(), body).await
    }

    async fn get(&self, segments: &[&str]) -> Result<Value, UpstreamError> {
        self.call(Method::GET, segments, &[], None).await
    }

    /// `true` when `/health` answers `{"status": "available"}` within the
    /// health-check timeout. Never fails.
    pub async fn is_healthy(&self) -> bool {
        let probe = tokio::time::timeout(self.health_check_timeout, self.get(&["health"])).await;
        match probe {
            Ok(Ok(body)) => body.get("status").and_then(Value::as_str) == Some("available"),
            Ok(Err(err)) => {
                tracing::debug!(event = "health_probe_failed", error = %err, "Meilisearch health check failed");
                false
            }
            Err(_) => {
                tracing::debug!(event = "health_probe_timeout", "Meilisearch health check timed out");
                false
            }
        }
    }

    pub async fn version(&self) -> Result<Value, UpstreamError> {
        self.get(&["version"]).await
    }

    pub async fn stats(&self) -> Result<Value, UpstreamError> {
        self.get(&["stats"]).await
    }

    pub async fn index_stats(&self, index_uid: &str) -> Result<Value, UpstreamError> {
        self.get(&["indexes", index_uid, "stats"]).await
    }

    pub async fn list_indexes(
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
        self.call(Method::GET, &["indexes"], &query, None).await
    }

    pub async fn create_index(
        &self,
        uid: &str,
        primary_key: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let mut body = json!({ "uid": uid });
        if let Some(pk) = primary_key {
            body["primaryKey"] = Value::String(pk.to_string());
        }
        self.call(Method::POST, &["indexes"], &[], Some(&body)).await
    }

    pub async fn delete_index(&self, uid: &str) -> Result<Value, UpstreamError> {
        self.call(Method::DELETE, &["indexes", uid], &[], None).await
    }

    pub async fn get_documents(
        &self,
        index_uid: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Value, UpstreamError> {
        let body = json!({ "offset": offset, "limit": limit });
        self.call(
            Method::POST,
            &["indexes", index_uid, "documents", "fetch"],
            &[],
            Some(&body),
        )
        .await
    }

    /// Add or replace documents.
    pub async fn add_documents(
        &self,
        index_uid: &str,
        documents: &[Value],
        primary_key: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        let query: Vec<(String, String)> = primary_key
            .map(|pk| vec![("primaryKey".to_string(), pk.to_string())])
            .unwrap_or_default();
        let body = Value::Array(documents.to_vec());
        self.call(
            Method::PUT,
            &["indexes", index_uid, "documents"],
            &query,
            Some(&body),
        )
        .await
    }

    pub async fn get_settings(&self, index_uid: &str) -> Result<Value, UpstreamError> {
        self.get(&["indexes", index_uid, "settings"]).await
    }

    pub async fn update_settings(
        &self,
        index_uid: &str,
        settings: &Map<String, Value>,
    ) -> Result<Value, UpstreamError> {
        let body = Value::Object(settings.clone());
        self.call(
            Method::PATCH,
            &["indexes", index_uid, "settings"],
            &[],
            Some(&body),
        )
        .await
    }

    pub async fn search_index(
        &self,
        index_uid: &str,
        request: &SearchRequest,
    ) -> Result<Value, UpstreamError> {
        let body = serde_json::to_value(request).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        self.call(
            Method::POST,
            &["indexes", index_uid, "search"],
            &[],
            Some(&body),
        )
        .await
    }

    /// Searches every index and keeps the ones with hits. Makes one call to
    /// list indexes plus one per index; per-index failures are skipped.
    pub async fn search_all(&self, request: &SearchRequest) -> Result<Value, UpstreamError> {
        let indexes = self.list_indexes(None, None).await?;
        let mut results = Map::new();
        for uid in result_uids(&indexes) {
            match self.search_index(&uid, request).await {
                Ok(result) => {
                    let has_hits = result
                        .get("hits")
                        .and_then(Value::as_array)
                        .is_some_and(|hits| !hits.is_empty());
                    if has_hits {
                        results.insert(uid, result);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        event = "index_search_skipped",
                        index_uid = %uid,
                        error = %err,
                        "Failed to search index"
                    );
                }
            }
        }
        Ok(json!({
            "multi_index": true,
            "query": request.q,
            "results": results,
        }))
    }

    pub async fn get_task(&self, task_uid: u64) -> Result<Value, UpstreamError> {
        self.get(&["tasks", &task_uid.to_string()]).await
    }

    pub async fn get_tasks(&self, query: &TaskQuery) -> Result<Value, UpstreamError> {
        self.call(Method::GET, &["tasks"], &query.pairs, None).await
    }

    pub async fn cancel_tasks(&self, query: &TaskQuery) -> Result<Value, UpstreamError> {
        self.call(Method::POST, &["tasks", "cancel"], &query.pairs, None)
            .await
    }

    pub async fn get_keys(
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
        self.call(Method::GET, &["keys"], &query, None).await
    }

    pub async fn create_key(&self, options: &Value) -> Result<Value, UpstreamError> {
        self.call(Method::POST, &["keys"], &[], Some(options)).await
    }

    pub async fn delete_key(&self, key: &str) -> Result<Value, UpstreamError> {
        self.call(Method::DELETE, &["keys", key], &[], None).await
    }

    /// Stats plus per-index stats.
    pub async fn health_status(&self) -> Result<HealthStatus, UpstreamError> {
        let stats = self.stats().await?;
        let indexes = self.list_indexes(None, None).await?;
        let uids = result_uids(&indexes);

        let mut indexes_info = Vec::with_capacity(uids.len());
        for uid in &uids {
            let index_stats = self.index_stats(uid).await?;
            indexes_info.push(json!({
                "uid": uid,
                "documents_count": index_stats.get("numberOfDocuments").cloned().unwrap_or(Value::Null),
                "is_indexing": index_stats.get("isIndexing").cloned().unwrap_or(Value::Null),
            }));
        }

        let last_update = match stats.get("lastUpdate").and_then(Value::as_str) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| UpstreamError::Decode(format!("lastUpdate '{raw}': {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(HealthStatus {
            is_healthy: true,
            database_size: stats
                .get("databaseSize")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
            last_update,
            indexes_count: uids.len(),
            indexes_info,
        })
    }

    pub async fn index_metrics(&self, index_uid: &str) -> Result<IndexMetrics, UpstreamError> {
        let stats = self.index_stats(index_uid).await?;
        let number_of_documents = stats
            .get("numberOfDocuments")
            .and_then(Value::as_u64)
            .ok_or_else(|| UpstreamError::Decode("missing numberOfDocuments".to_string()))?;
        Ok(IndexMetrics {
            number_of_documents,
            field_distribution: stats
                .get("fieldDistribution")
                .cloned()
                .unwrap_or_else(|| json!({})),
            is_indexing: stats
                .get("isIndexing")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            index_size: stats.get("indexSize").and_then(Value::as_u64),
        })
    }

    /// Version plus database-level stats.
    pub async fn system_information(&self) -> Result<Value, UpstreamError> {
        let version = self.version().await?;
        let stats = self.stats().await?;
        Ok(json!({
            "version": version,
            "database_size": stats.get("databaseSize").cloned().unwrap_or(Value::Null),
            "last_update": stats.get("lastUpdate").cloned().unwrap_or(Value::Null),
            "indexes": stats.get("indexes").cloned().unwrap_or_else(|| json!({})),
        }))
    }
}

fn result_uids(list: &Value) -> Vec<String> {
    list.get("results")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("uid").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::SocketAddr;

    use axum::Router;

    /// Serves `router` on an ephemeral local port for the life of the test.
    pub async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test upstream");
        });
        format!("http://{addr}")
    }
}
