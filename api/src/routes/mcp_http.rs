use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{RawQuery, State};
use axum::http::header::{ACCEPT, AUTHORIZATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use meilisearch_mcp_core::auth::TOKEN_HEADER;
use meilisearch_mcp_core::{JsonRpcRequest, JsonRpcResponse, ProtocolError};
use meilisearch_mcp_runtime::McpMethod;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{rpc_error, rpc_response, status_for, unauthorized_plain, unauthorized_rpc};
use crate::middleware::cors::preflight;
use crate::routes::health::health_check;
use crate::state::AppState;
use crate::subscribers::Subscription;

const STREAM_PATHS: [&str; 3] = ["/mcp", "/sse", "/v1/sse"];
const MESSAGE_PATHS: [&str; 2] = ["/message", "/v1/message"];

pub fn router() -> Router<AppState> {
    let mut router = Router::new().route("/", get(root).options(preflight));
    for path in STREAM_PATHS {
        router = router.route(
            path,
            get(open_stream).post(post_message).options(preflight),
        );
    }
    for path in MESSAGE_PATHS {
        router = router.route(path, post(post_message).options(preflight));
    }
    router
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    state.auth.check(
        header_str(headers, AUTHORIZATION.as_str()),
        header_str(headers, TOKEN_HEADER),
    )
}

/// `GET /` doubles as the event stream for clients that only know the
/// server root.
async fn root(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let wants_stream = header_str(&headers, ACCEPT.as_str())
        .is_some_and(|accept| accept.contains("text/event-stream"))
        || query.as_deref().is_some_and(|query| {
            query
                .split('&')
                .any(|pair| pair.split('=').next() == Some("sse"))
        });

    if wants_stream {
        open_stream(State(state), headers).await
    } else {
        health_check(State(state)).await
    }
}

async fn open_stream(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        tracing::warn!(event = "mcp_unauthorized", endpoint = "stream", "Rejected event stream without valid token");
        return unauthorized_plain();
    }

    let subscription = state.subscribers.subscribe();
    Sse::new(event_stream(
        subscription,
        state.shutdown.clone(),
        state.settings.sse_ping_interval,
    ))
    .into_response()
}

enum Tick {
    Shutdown,
    Message(Option<Arc<JsonRpcResponse>>),
    Idle,
}

/// An opening comment, then queued messages as `data:` events with a
/// comment ping whenever the queue stays quiet for `ping_interval`. Ends on
/// shutdown. The subscription lives inside the stream, so dropping the
/// stream for any reason unregisters it.
fn event_stream(
    subscription: Subscription,
    shutdown: CancellationToken,
    ping_interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let opening = stream::once(async { Ok(Event::default().comment("connection established")) });

    let updates = stream::unfold(
        (subscription, shutdown),
        move |(mut subscription, shutdown)| async move {
            loop {
                let tick = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => Tick::Shutdown,
                    next = tokio::time::timeout(ping_interval, subscription.recv()) => match next {
                        Ok(message) => Tick::Message(message),
                        Err(_) => Tick::Idle,
                    },
                };

                let event = match tick {
                    Tick::Shutdown | Tick::Message(None) => return None,
                    Tick::Idle => Event::default().comment("ping"),
                    Tick::Message(Some(message)) => match Event::default().json_data(&*message) {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!(
                                event = "sse_encode_failed",
                                subscriber = %subscription.id(),
                                error = %err,
                                "Dropping message that could not be encoded"
                            );
                            continue;
                        }
                    },
                };
                return Some((Ok(event), (subscription, shutdown)));
            }
        },
    );

    opening.chain(updates)
}

async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if !authorized(&state, &headers) {
        tracing::warn!(event = "mcp_unauthorized", endpoint = "message", "Rejected message without valid token");
        return unauthorized_rpc();
    }
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(event = "mcp_body_rejected", error = %rejection, "Request body could not be read");
            return rpc_error(
                rejection.status(),
                Value::Null,
                &ProtocolError::invalid_request(rejection.body_text()),
            );
        }
    };

    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(event = "mcp_parse_error", error = %err, "Request body is not JSON");
            return rpc_error(StatusCode::BAD_REQUEST, Value::Null, &ProtocolError::Parse);
        }
    };
    if incoming.is_array() {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            Value::Null,
            &ProtocolError::invalid_request("batch requests are not supported"),
        );
    }
    let request = match JsonRpcRequest::from_value(incoming) {
        Ok(request) => request,
        Err(rejected) => {
            return rpc_response(StatusCode::BAD_REQUEST, &rejected.into_response());
        }
    };

    let method = McpMethod::parse(&request.method);
    let Some(response) = state.server.handle_request(&request).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    if method.is_known() && !method.replies_inline() && !state.subscribers.is_empty() {
        let delivered = state.subscribers.broadcast(response.clone());
        if delivered > 0 {
            tracing::debug!(event = "mcp_response_broadcast", method = %method.as_str(), delivered, "Response sent to event streams");
            return StatusCode::ACCEPTED.into_response();
        }
    }

    rpc_response(status_for(&response), &response)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, BodyDataStream, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use futures::StreamExt;
    use meilisearch_mcp_core::AuthGate;
    use meilisearch_mcp_runtime::McpServer;
    use meilisearch_mcp_runtime::context::{ConnectionSettings, ContextHandle};
    use meilisearch_mcp_runtime::registry::{ToolCall, ToolRegistry, handler};
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::routes;
    use crate::state::{AppState, HttpSettings};

    fn server() -> McpServer {
        let session = Arc::new(ContextHandle::new(ConnectionSettings::new(
            "http://127.0.0.1:9",
            None,
        )));
        let mut registry = ToolRegistry::new(session);
        registry
            .register(
                "sleep",
                "Sleeps",
                json!({"type": "object", "properties": {"ms": {"type": "integer"}}}),
                handler(|call: ToolCall| async move {
                    let ms = call.args.get("ms").and_then(Value::as_u64).unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(format!("slept {ms}ms"))
                }),
            )
            .expect("register");
        McpServer::new(registry)
    }

    fn state_with(auth: AuthGate, settings: HttpSettings) -> AppState {
        AppState::new(
            Arc::new(server().with_tool_timeout(Duration::from_millis(100))),
            auth,
            settings,
            CancellationToken::new(),
        )
    }

    fn state() -> AppState {
        state_with(AuthGate::disabled(), HttpSettings::default())
    }

    fn post(path: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("request")
    }

    fn rpc(path: &str, payload: Value) -> Request<Body> {
        post(path, payload.to_string())
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    struct Frames {
        stream: BodyDataStream,
        pending: String,
    }

    impl Frames {
        fn new(response: axum::response::Response) -> Self {
            Self {
                stream: response.into_body().into_data_stream(),
                pending: String::new(),
            }
        }

        async fn next(&mut self) -> Option<String> {
            loop {
                if let Some(end) = self.pending.find("\n\n") {
                    let frame = self.pending[..end].to_string();
                    self.pending.drain(..end + 2);
                    return Some(frame);
                }
                let chunk = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                    .await
                    .expect("frame within timeout")?;
                let chunk = chunk.expect("chunk");
                self.pending.push_str(std::str::from_utf8(&chunk).expect("utf8"));
            }
        }
    }

    async fn open_sse(app: &axum::Router, path: &str) -> Frames {
        let response = app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        let mut frames = Frames::new(response);
        let opening = frames.next().await.expect("opening frame");
        assert!(opening.starts_with(':'), "{opening}");
        assert!(opening.contains("connection established"));
        frames
    }

    fn data_of(frame: &str) -> Value {
        let data = frame
            .lines()
            .find_map(|line| line.strip_prefix("data:"))
            .expect("data line");
        serde_json::from_str(data.trim()).expect("json data")
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_error() {
        let app = routes::router(state());
        let response = app.oneshot(post("/message", "not-json")).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn wrong_version_is_an_invalid_request() {
        let app = routes::router(state());
        let response = app
            .oneshot(rpc("/mcp", json!({"jsonrpc": "1.0", "id": 5, "method": "ping"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], -32600);
        assert_eq!(body["id"], 5);
    }

    #[tokio::test]
    async fn unknown_method_is_reported_with_http_200() {
        let app = routes::router(state());
        let response = app
            .oneshot(rpc("/message", json!({"jsonrpc": "2.0", "id": 7, "method": "foo/bar"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["id"], 7);
    }

    #[tokio::test]
    async fn notifications_are_accepted_without_body() {
        let app = routes::router(state());
        let response = app
            .oneshot(rpc(
                "/v1/message",
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn unknown_method_without_id_is_still_answered() {
        let app = routes::router(state());
        let response = app
            .oneshot(rpc("/message", json!({"jsonrpc": "2.0", "method": "foo/bar"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn auth_gate_protects_both_endpoints() {
        let state = state_with(AuthGate::new(Some("secret")), HttpSettings::default());
        let app = routes::router(state);
        let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});

        let response = app.clone().oneshot(rpc("/mcp", ping.clone())).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], -32000);

        let mut request = rpc("/mcp", ping.clone());
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer secret".parse().expect("header"));
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let mut request = rpc("/mcp", ping.clone());
        request
            .headers_mut()
            .insert("x-mcp-token", "secret".parse().expect("header"));
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let mut request = rpc("/mcp", ping);
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer wrong".parse().expect("header"));
        request
            .headers_mut()
            .insert("x-mcp-token", "secret".parse().expect("header"));
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(Request::get("/sse").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!({"error": "Unauthorized"}));
    }

    #[tokio::test]
    async fn broadcastable_responses_go_to_every_stream() {
        let state = state();
        let app = routes::router(state.clone());
        let mut first = open_sse(&app, "/sse").await;
        let mut second = open_sse(&app, "/v1/sse").await;
        assert_eq!(state.subscribers.len(), 2);

        let response = app
            .clone()
            .oneshot(rpc("/message", json!({"jsonrpc": "2.0", "id": 11, "method": "ping"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        for frames in [&mut first, &mut second] {
            let frame = frames.next().await.expect("data frame");
            let message = data_of(&frame);
            assert_eq!(message["id"], 11);
            assert_eq!(message["result"], json!({}));
        }

        drop(first);
        assert_eq!(state.subscribers.len(), 1);
        drop(second);
        assert!(state.subscribers.is_empty());
    }

    #[tokio::test]
    async fn tool_methods_reply_inline_even_with_streams_open() {
        let state = state();
        let app = routes::router(state.clone());
        let _stream = open_sse(&app, "/mcp").await;

        let response = app
            .clone()
            .oneshot(rpc("/mcp", json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["result"]["tools"][0]["name"], "sleep");

        let response = app
            .oneshot(rpc("/mcp", json!({"jsonrpc": "2.0", "id": 3, "method": "foo/bar"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn ping_without_streams_replies_inline() {
        let app = routes::router(state());
        let response = app
            .oneshot(rpc("/mcp", json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"jsonrpc": "2.0", "id": "p", "result": {}})
        );
    }

    #[tokio::test]
    async fn tool_timeout_is_a_successful_reply() {
        let app = routes::router(state());
        let response = app
            .oneshot(rpc(
                "/mcp",
                json!({
                    "jsonrpc": "2.0",
                    "id": 4,
                    "method": "tools/call",
                    "params": {"name": "sleep", "arguments": {"ms": 2000}}
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let text = body["result"]["content"][0]["text"].as_str().expect("text");
        assert!(text.contains("timed out"), "{text}");
        assert!(text.ends_with("The operation may still be processing."));
    }

    #[tokio::test]
    async fn quiet_streams_receive_pings_and_end_on_shutdown() {
        let settings = HttpSettings {
            sse_ping_interval: Duration::from_millis(50),
            ..HttpSettings::default()
        };
        let state = state_with(AuthGate::disabled(), settings);
        let app = routes::router(state.clone());
        let mut frames = open_sse(&app, "/sse").await;

        let ping = frames.next().await.expect("ping frame");
        assert!(ping.starts_with(':') && ping.contains("ping"), "{ping}");

        state.shutdown.cancel();
        assert!(frames.next().await.is_none());
        drop(frames);
        assert!(state.subscribers.is_empty());
    }

    #[tokio::test]
    async fn root_serves_stream_or_health() {
        let state = state();
        let app = routes::router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::get("/")
                    .header(header::ACCEPT, "text/event-stream")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        drop(response);

        let _stream = open_sse(&app, "/?sse").await;

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["service"], "meilisearch-mcp");
    }

    #[tokio::test]
    async fn plain_options_get_static_cors_headers() {
        let app = routes::router(state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/message")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused() {
        let settings = HttpSettings {
            max_request_size: 1024,
            ..HttpSettings::default()
        };
        let app = routes::router(state_with(AuthGate::disabled(), settings));
        let padding = "x".repeat(4096);
        let response = app
            .oneshot(rpc(
                "/mcp",
                json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": {"pad": padding}}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], -32600);
    }
}
