//! The HTTP service the front-end talks to.

use std::{net::SocketAddr, path::PathBuf};

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
};

use crate::{
    client::{HttpClient, NowPlayingPoller, SpotifyClient},
    credentials::{CredentialSource, EnvCredentials},
    error::Result,
    model::envelope::{NowPlaying, TokenExchange},
    visit::VisitRecorder,
};

pub const DEFAULT_BIND: &str = "127.0.0.1:8888";

// the paths the front-end was originally deployed with
const LEGACY_FUNCTIONS_PREFIX: &str = "/.netlify/functions";

/// Everything the handlers share. Constructed once and cloned into every request.
#[derive(Debug, Clone)]
pub struct AppState<C = reqwest::Client, S = EnvCredentials>
where
    C: HttpClient,
    S: CredentialSource + Clone,
{
    poller: NowPlayingPoller<C, S>,
    visits: VisitRecorder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// A built front-end to serve. Unknown paths fall back to its `index.html`.
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ExchangeRequest {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackViewRequest {
    #[serde(default)]
    path: Option<String>,
}

impl AppState {
    /// State for the real service: Spotify over `reqwest`, credentials from the environment.
    pub fn from_env() -> Self {
        Self::new(NowPlayingPoller::from_env(), VisitRecorder::default())
    }
}

impl<C, S> AppState<C, S>
where
    C: HttpClient,
    S: CredentialSource + Clone,
{
    pub fn new(poller: NowPlayingPoller<C, S>, visits: VisitRecorder) -> Self {
        Self { poller, visits }
    }

    pub fn client(&self) -> &SpotifyClient<C> {
        self.poller.client()
    }
}

impl IntoResponse for NowPlaying {
    fn into_response(self) -> Response {
        (self.http_status(), Json(self)).into_response()
    }
}

impl IntoResponse for TokenExchange {
    fn into_response(self) -> Response {
        (self.http_status(), Json(self)).into_response()
    }
}

/// The API routes, with permissive CORS.
pub fn router<C, S>(state: AppState<C, S>) -> Router
where
    C: HttpClient,
    S: CredentialSource + Clone + 'static,
{
    let api = Router::new()
        .route("/now-playing", get(now_playing::<C, S>))
        .route("/exchange-token", post(exchange_token::<C, S>))
        .route("/track-view", post(track_view::<C, S>));

    let legacy = Router::new()
        .route("/get-now-playing", get(now_playing::<C, S>))
        .route("/exchange-token", post(exchange_token::<C, S>))
        .route("/track-view", post(track_view::<C, S>));

    api.nest(LEGACY_FUNCTIONS_PREFIX, legacy)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The API routes plus the static front-end, if there is one.
pub fn app<C, S>(state: AppState<C, S>, static_dir: Option<PathBuf>) -> Router
where
    C: HttpClient,
    S: CredentialSource + Clone + 'static,
{
    let router = router(state);

    match static_dir {
        Some(dir) => {
            let index = dir.join("index.html");
            router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)))
        }
        None => router,
    }
}

/// Bind and serve until Ctrl-C.
pub async fn serve<C, S>(config: ServerConfig, state: AppState<C, S>) -> Result<()>
where
    C: HttpClient,
    S: CredentialSource + Clone + 'static,
{
    if let Some(dir) = &config.static_dir {
        info!("Serving front-end from {}", dir.display());
    }

    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(state, config.static_dir))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
}

async fn now_playing<C, S>(State(state): State<AppState<C, S>>) -> NowPlaying
where
    C: HttpClient,
    S: CredentialSource + Clone,
{
    state.poller.poll().await
}

async fn exchange_token<C, S>(State(state): State<AppState<C, S>>, body: Bytes) -> TokenExchange
where
    C: HttpClient,
    S: CredentialSource + Clone,
{
    let request: ExchangeRequest = serde_json::from_slice(&body).unwrap_or_else(|err| {
        debug!("Unreadable token exchange request body: {}", err);
        ExchangeRequest::default()
    });

    let result = state
        .client()
        .exchange_authorization_code(
            request.client_id.as_deref().unwrap_or_default(),
            request.client_secret.as_deref().unwrap_or_default(),
            request.code.as_deref().unwrap_or_default(),
            request.redirect_uri.as_deref().unwrap_or_default(),
        )
        .await;

    if let Err(err) = &result {
        warn!("Token exchange failed: {}", err);
    }

    TokenExchange::from(result)
}

async fn track_view<C, S>(State(state): State<AppState<C, S>>, headers: HeaderMap, body: Bytes) -> Response
where
    C: HttpClient,
    S: CredentialSource + Clone,
{
    let request: TrackViewRequest = serde_json::from_slice(&body).unwrap_or_default();
    let id = state.visits.record(request.path, &headers);

    Json(json!({ "success": true, "id": id })).into_response()
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        client::{private::mock::MockHttpClient, SpotifyClientBuilder},
        credentials::Credentials,
    };

    fn app(http_client: &MockHttpClient, credentials: Credentials) -> Router {
        let poller = NowPlayingPoller::new(
            SpotifyClientBuilder::new().http_client(http_client.clone()).build(),
            credentials,
        );

        router(AppState::new(poller, VisitRecorder::default()))
    }

    fn credentials() -> Credentials {
        Credentials::new("id", "secret", "refresh")
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };

        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn text(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app.oneshot(get(uri)).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, String::from_utf8_lossy(&body).into_owned())
    }

    fn static_app(http_client: &MockHttpClient, dir: &TempDir) -> Router {
        let poller = NowPlayingPoller::new(
            SpotifyClientBuilder::new().http_client(http_client.clone()).build(),
            credentials(),
        );

        super::app(
            AppState::new(poller, VisitRecorder::default()),
            Some(dir.path().to_path_buf()),
        )
    }

    #[tokio::test]
    async fn static_dir_falls_back_to_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>neon grid</html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('grid')").unwrap();

        let (status, body) = text(static_app(&MockHttpClient::new(), &dir), "/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log('grid')");

        let (status, body) = text(static_app(&MockHttpClient::new(), &dir), "/visualizer/settings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html>neon grid</html>");
    }

    #[tokio::test]
    async fn api_routes_win_over_static_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>neon grid</html>").unwrap();

        let http_client = MockHttpClient::new();
        http_client.respond(200, r#"{"access_token":"token"}"#).respond(204, "");

        let (status, body) = send(static_app(&http_client, &dir), get("/now-playing")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "is_playing": false }));
    }

    #[tokio::test]
    async fn now_playing_idle() {
        let http_client = MockHttpClient::new();
        http_client.respond(200, r#"{"access_token":"token"}"#).respond(204, "");

        let (status, body) = send(app(&http_client, credentials()), get("/now-playing")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "is_playing": false }));
    }

    #[tokio::test]
    async fn now_playing_missing_configuration() {
        let http_client = MockHttpClient::new();

        let (status, body) = send(
            app(&http_client, Credentials::new("id", "", "refresh")),
            get("/now-playing"),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Configuration Error: Missing Env Vars." }));
    }

    #[tokio::test]
    async fn legacy_path_is_served() {
        let http_client = MockHttpClient::new();
        http_client.respond(401, r#"{"error":"invalid_client"}"#);

        let (status, body) = send(
            app(&http_client, credentials()),
            get("/.netlify/functions/get-now-playing"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "error": "Auth Fail", "details": { "error": "invalid_client" } }));
    }

    #[tokio::test]
    async fn exchange_token_success() {
        let http_client = MockHttpClient::new();
        http_client.respond(
            200,
            r#"{"access_token":"access","token_type":"Bearer","expires_in":3600,"refresh_token":"refresh"}"#,
        );

        let (status, body) = send(
            app(&http_client, credentials()),
            post_json(
                "/exchange-token",
                json!({ "code": "abc", "client_id": "id", "client_secret": "secret", "redirect_uri": "http://localhost:8888/callback" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["access_token"], json!("access"));
        assert_eq!(body["refresh_token"], json!("refresh"));
    }

    #[tokio::test]
    async fn exchange_token_missing_parameters() {
        let http_client = MockHttpClient::new();

        let (status, body) = send(
            app(&http_client, credentials()),
            post_json("/exchange-token", json!({ "client_id": "id" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Missing parameters" }));
        assert!(http_client.requests().is_empty());
    }

    #[tokio::test]
    async fn exchange_token_upstream_rejection() {
        let http_client = MockHttpClient::new();
        http_client.respond(400, r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#);

        let (status, body) = send(
            app(&http_client, credentials()),
            post_json(
                "/exchange-token",
                json!({ "code": "stale", "client_id": "id", "client_secret": "secret", "redirect_uri": "http://localhost" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Token exchange failed"));
        assert_eq!(body["details"]["error"], json!("invalid_grant"));
    }

    #[tokio::test]
    async fn exchange_token_rejects_other_methods() {
        let http_client = MockHttpClient::new();

        let response = app(&http_client, credentials())
            .oneshot(get("/exchange-token"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn track_view_acknowledges() {
        let http_client = MockHttpClient::new();

        let (status, body) = send(
            app(&http_client, credentials()),
            post_json("/track-view", json!({ "path": "/" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert!(body["id"].is_u64());
    }

    #[tokio::test]
    async fn cors_is_permissive() {
        let http_client = MockHttpClient::new();
        http_client.respond(200, r#"{"access_token":"token"}"#).respond(204, "");

        let request = Request::builder()
            .uri("/now-playing")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();
        let response = app(&http_client, credentials()).oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }
}
