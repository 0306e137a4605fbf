use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eyre::{Result, WrapErr};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::generate::{QuotaExceeded, TextGenerator};
use crate::ytdlp::{CaptionLanguage, VideoMetadata, VideoSource};
use crate::{InvalidReferenceError, ParseOptions, Transcript, VideoId};

/// Request bodies larger than this are rejected
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const QUOTA_MESSAGE: &str =
    "The AI service is currently busy or you have exceeded your free quota. Please try again later.";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn VideoSource>,
    pub generator: Arc<dyn TextGenerator>,
    pub parse_options: ParseOptions,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Quota exhaustion becomes 429; anything else is a 500 with `message`
    fn generation(err: &eyre::Report, message: &str) -> Self {
        if err.downcast_ref::<QuotaExceeded>().is_some() {
            return Self {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: QUOTA_MESSAGE.to_string(),
            };
        }
        Self::internal(message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<InvalidReferenceError> for ApiError {
    fn from(err: InvalidReferenceError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UrlRequest {
    pub url: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TextRequest {
    pub text: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubtitlesResponse {
    pub raw: String,
    pub parsed: Transcript,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
}

/// API routes only, without static file serving
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/metadata", post(metadata))
        .route("/api/languages", post(languages))
        .route("/api/subtitles", post(subtitles))
        .route("/api/summarize", post(summarize))
        .route("/api/search", post(search))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// API routes plus the client bundle in `static_dir`.
///
/// Unknown paths fall back to `index.html` so client-side routes resolve.
pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    let index = static_dir.join("index.html");
    let assets = ServeDir::new(static_dir).fallback(ServeFile::new(index));

    api_router(state)
        .fallback_service(assets)
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve until Ctrl+C
pub async fn serve(state: AppState, addr: SocketAddr, static_dir: PathBuf) -> Result<()> {
    if !static_dir.join("index.html").exists() {
        warn!("No index.html in {}; only the API will be useful", static_dir.display());
    }

    let app = build_router(state, &static_dir);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding to {addr}"))?;

    info!("Listening on http://{addr}");
    eprintln!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("running HTTP server")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {e}");
    }
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// JSON request body; `null` reads as an empty request
type JsonBody<T> = std::result::Result<Json<Option<T>>, JsonRejection>;

fn read_body<T: Default>(body: JsonBody<T>) -> ApiResult<T> {
    let Json(body) = body?;
    Ok(body.unwrap_or_default())
}

fn resolve_url(url: Option<String>) -> ApiResult<VideoId> {
    let url = required(url).ok_or_else(|| ApiError::bad_request("URL is required"))?;
    Ok(crate::resolve(&url)?)
}

/// Language codes are plain tags such as `en` or `pt-BR`
fn language_code(code: Option<String>) -> ApiResult<Option<String>> {
    match required(code) {
        Some(code) if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') => {
            Err(ApiError::bad_request(format!("Invalid language code: {code}")))
        }
        code => Ok(code),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn metadata(State(state): State<AppState>, req: JsonBody<UrlRequest>) -> ApiResult<Json<VideoMetadata>> {
    let id = resolve_url(read_body(req)?.url)?;
    info!("Fetching metadata for {id}");

    let metadata = state.source.metadata(&id).await.map_err(|e| {
        error!("Error fetching metadata for {id}: {e:#}");
        ApiError::internal(format!("Error fetching metadata: {e}"))
    })?;
    Ok(Json(metadata))
}

async fn languages(State(state): State<AppState>, req: JsonBody<UrlRequest>) -> ApiResult<Json<Vec<CaptionLanguage>>> {
    let id = resolve_url(read_body(req)?.url)?;
    info!("Listing caption languages for {id}");

    let languages = state.source.languages(&id).await.map_err(|e| {
        error!("Error fetching languages for {id}: {e:#}");
        ApiError::internal(format!("Error fetching languages: {e}"))
    })?;
    Ok(Json(languages))
}

async fn subtitles(State(state): State<AppState>, req: JsonBody<UrlRequest>) -> ApiResult<Json<SubtitlesResponse>> {
    let req = read_body(req)?;
    let id = resolve_url(req.url)?;
    let lang = language_code(req.language_code)?;
    info!("Fetching subtitles for {id} ({})", lang.as_deref().unwrap_or("default language"));

    let raw = state.source.captions(&id, lang.as_deref()).await.map_err(|e| {
        error!("Error fetching subtitles for {id}: {e:#}");
        ApiError::internal(format!("Error fetching subtitles: {e}"))
    })?;

    let parsed = crate::parse_with(&raw, &state.parse_options);
    info!("Parsed {} subtitle entries for {id}", parsed.len());
    Ok(Json(SubtitlesResponse { raw, parsed }))
}

async fn summarize(State(state): State<AppState>, req: JsonBody<TextRequest>) -> ApiResult<Json<SummaryResponse>> {
    let text = required(read_body(req)?.text).ok_or_else(|| ApiError::bad_request("Text is required"))?;

    let summary = state.generator.summarize(&text).await.map_err(|e| {
        error!("Error summarizing: {e:#}");
        ApiError::generation(&e, "Failed to generate summary")
    })?;
    Ok(Json(SummaryResponse { summary }))
}

async fn search(State(state): State<AppState>, req: JsonBody<TextRequest>) -> ApiResult<Json<AnswerResponse>> {
    let req = read_body(req)?;
    let (Some(text), Some(query)) = (required(req.text), required(req.query)) else {
        return Err(ApiError::bad_request("Text and query are required"));
    };

    let answer = state.generator.answer(&text, &query).await.map_err(|e| {
        error!("Error searching: {e:#}");
        ApiError::generation(&e, "Failed to search content")
    })?;
    Ok(Json(AnswerResponse { answer }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, header};
    use eyre::bail;
    use tower::ServiceExt;

    const VTT: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:03.000\nHello <c>world</c>\n";

    struct FakeSource {
        captions: Option<&'static str>,
    }

    #[async_trait]
    impl VideoSource for FakeSource {
        async fn metadata(&self, id: &VideoId) -> eyre::Result<VideoMetadata> {
            Ok(VideoMetadata {
                title: Some("A video".to_string()),
                channel: Some("A channel".to_string()),
                upload_date: Some("20240101".to_string()),
                view_count: Some(serde_json::Number::from(42u64)),
                duration: Some(serde_json::Number::from(212u64)),
                thumbnail: None,
                id: Some(id.to_string()),
            })
        }

        async fn languages(&self, _id: &VideoId) -> eyre::Result<Vec<CaptionLanguage>> {
            if self.captions.is_none() {
                bail!("Video unavailable");
            }
            Ok(vec![CaptionLanguage {
                code: "en".to_string(),
                name: Some("English".to_string()),
                is_generated: false,
            }])
        }

        async fn captions(&self, _id: &VideoId, lang: Option<&str>) -> eyre::Result<String> {
            match self.captions {
                Some(c) => Ok(c.to_string()),
                None => bail!("No {} subtitles found", lang.unwrap_or("en")),
            }
        }
    }

    struct FakeGenerator {
        fail: bool,
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn summarize(&self, text: &str) -> eyre::Result<String> {
            if self.fail {
                bail!("backend unavailable");
            }
            Ok(format!("summary of {text}"))
        }

        async fn answer(&self, text: &str, query: &str) -> eyre::Result<String> {
            if self.fail {
                bail!("backend unavailable");
            }
            Ok(format!("{query} -> {text}"))
        }
    }

    struct ExhaustedGenerator;

    #[async_trait]
    impl TextGenerator for ExhaustedGenerator {
        async fn summarize(&self, _text: &str) -> eyre::Result<String> {
            Err(QuotaExceeded {
                provider: "Gemini",
                body: "RESOURCE_EXHAUSTED".to_string(),
            }
            .into())
        }

        async fn answer(&self, text: &str, _query: &str) -> eyre::Result<String> {
            self.summarize(text).await
        }
    }

    fn app(captions: Option<&'static str>, fail: bool) -> Router {
        api_router(AppState {
            source: Arc::new(FakeSource { captions }),
            generator: Arc::new(FakeGenerator { fail }),
            parse_options: ParseOptions::default(),
        })
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        post_raw(app, uri, Some("application/json"), body.to_string()).await
    }

    async fn post_raw(
        app: Router,
        uri: &str,
        content_type: Option<&str>,
        body: String,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            req = req.header(header::CONTENT_TYPE, content_type);
        }
        let req = req.body(Body::from(body)).unwrap();

        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let resp = app(None, false).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_metadata() {
        let (status, json) = post_json(
            app(None, false),
            "/api/metadata",
            serde_json::json!({"url": "https://youtu.be/dQw4w9WgXcQ"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "dQw4w9WgXcQ");
        assert_eq!(json["viewCount"], 42);
        assert_eq!(json["uploadDate"], "20240101");
    }

    #[tokio::test]
    async fn test_metadata_missing_url() {
        let (status, json) = post_json(app(None, false), "/api/metadata", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "URL is required");
    }

    #[tokio::test]
    async fn test_null_body_is_missing_field() {
        let (status, json) = post_json(app(None, false), "/api/metadata", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "URL is required");

        let (status, json) = post_json(app(None, false), "/api/summarize", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Text is required");
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_json_errors() {
        let (status, json) =
            post_json(app(None, false), "/api/summarize", serde_json::json!({"text": 5})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, json) =
            post_raw(app(None, false), "/api/summarize", Some("application/json"), "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, json) = post_raw(app(None, false), "/api/metadata", None, "{}".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Content-Type"));
    }

    #[tokio::test]
    async fn test_metadata_empty_url() {
        let (status, _) = post_json(app(None, false), "/api/metadata", serde_json::json!({"url": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metadata_invalid_reference() {
        let (status, json) = post_json(
            app(None, false),
            "/api/metadata",
            serde_json::json!({"url": "not a url at all"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("could not extract video ID"));
    }

    #[tokio::test]
    async fn test_subtitles() {
        let (status, json) = post_json(
            app(Some(VTT), false),
            "/api/subtitles",
            serde_json::json!({"url": "dQw4w9WgXcQ"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["raw"], VTT);
        assert_eq!(
            json["parsed"],
            serde_json::json!([{"start": "00:00:01.000", "end": "00:00:03.000", "text": "Hello world"}])
        );
    }

    #[tokio::test]
    async fn test_subtitles_language_code() {
        let (status, json) = post_json(
            app(None, false),
            "/api/subtitles",
            serde_json::json!({"url": "dQw4w9WgXcQ", "language_code": "fr"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Error fetching subtitles: No fr subtitles found");
    }

    #[tokio::test]
    async fn test_subtitles_invalid_language_code() {
        let (status, json) = post_json(
            app(Some(VTT), false),
            "/api/subtitles",
            serde_json::json!({"url": "dQw4w9WgXcQ", "language_code": "en,.*"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid language code: en,.*");
    }

    #[tokio::test]
    async fn test_languages() {
        let (status, json) = post_json(
            app(Some(VTT), false),
            "/api/languages",
            serde_json::json!({"url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!([{"code": "en", "name": "English", "isGenerated": false}])
        );
    }

    #[tokio::test]
    async fn test_languages_failure() {
        let (status, json) =
            post_json(app(None, false), "/api/languages", serde_json::json!({"url": "dQw4w9WgXcQ"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Error fetching languages: Video unavailable");

        let (status, json) = post_json(app(None, false), "/api/languages", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "URL is required");
    }

    #[tokio::test]
    async fn test_generator_quota_is_429() {
        let state = AppState {
            source: Arc::new(FakeSource { captions: None }),
            generator: Arc::new(ExhaustedGenerator),
            parse_options: ParseOptions::default(),
        };

        let (status, json) =
            post_json(api_router(state.clone()), "/api/summarize", serde_json::json!({"text": "words"})).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], QUOTA_MESSAGE);

        let (status, _) = post_json(
            api_router(state),
            "/api/search",
            serde_json::json!({"text": "words", "query": "what?"}),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_subtitles_source_failure() {
        let (status, json) = post_json(
            app(None, false),
            "/api/subtitles",
            serde_json::json!({"url": "dQw4w9WgXcQ"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Error fetching subtitles: No en subtitles found");
    }

    #[tokio::test]
    async fn test_summarize() {
        let (status, json) =
            post_json(app(None, false), "/api/summarize", serde_json::json!({"text": "words"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["summary"], "summary of words");
    }

    #[tokio::test]
    async fn test_summarize_missing_text() {
        let (status, json) = post_json(app(None, false), "/api/summarize", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Text is required");
    }

    #[tokio::test]
    async fn test_summarize_failure() {
        let (status, json) =
            post_json(app(None, true), "/api/summarize", serde_json::json!({"text": "words"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Failed to generate summary");
    }

    #[tokio::test]
    async fn test_search() {
        let (status, json) = post_json(
            app(None, false),
            "/api/search",
            serde_json::json!({"text": "words", "query": "what?"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "what? -> words");
    }

    #[tokio::test]
    async fn test_search_missing_query() {
        let (status, json) =
            post_json(app(None, false), "/api/search", serde_json::json!({"text": "words"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Text and query are required");
    }

    #[tokio::test]
    async fn test_search_failure() {
        let (status, json) = post_json(
            app(None, true),
            "/api/search",
            serde_json::json!({"text": "words", "query": "what?"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Failed to search content");
    }

    #[tokio::test]
    async fn test_static_fallback_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();

        let state = AppState {
            source: Arc::new(FakeSource { captions: None }),
            generator: Arc::new(FakeGenerator { fail: false }),
            parse_options: ParseOptions::default(),
        };
        let router = build_router(state, dir.path());

        let req = Request::builder().uri("/app.js").body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        assert_eq!(&bytes[..], b"console.log(1)");

        let req = Request::builder().uri("/some/client/route").body(Body::empty()).unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        assert_eq!(&bytes[..], b"<html>app</html>");
    }
}
