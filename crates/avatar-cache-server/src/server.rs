//! HTTP server for health and cache administration
//!
//! Provides /health plus the token-protected /api/cache routes.

use crate::error::ApiError;
use crate::types::{ClearResponse, HealthResponse};
use avatar_cache::{AvatarCache, CacheKey, CacheStatistics, ReclaimReport};
use axum::{
    extract::{Path, Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    /// `None` when caching is disabled
    pub cache: Option<AvatarCache>,
    pub api_token: Option<String>,
    pub cache_api_token: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        cache: Option<AvatarCache>,
        api_token: Option<String>,
        cache_api_token: Option<String>,
    ) -> Self {
        Self {
            cache,
            api_token,
            cache_api_token,
            started_at: Utc::now(),
        }
    }

    /// Token cache routes must present; the global token wins
    fn required_token(&self) -> Option<&str> {
        self.api_token
            .as_deref()
            .or(self.cache_api_token.as_deref())
    }

    fn cache(&self) -> Result<&AvatarCache, ApiError> {
        self.cache.as_ref().ok_or(ApiError::CacheDisabled)
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let cache_routes = Router::new()
        .route("/api/cache", delete(clear_cache))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/reclaim", post(reclaim))
        .route("/api/cache/{key}", delete(delete_entry))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(cache_routes)
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server, returning once `shutdown` resolves
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn require_token(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if let Some(expected) = state.required_token() {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        if provided != Some(expected) {
            warn!(path = %request.uri().path(), "Rejected request with invalid token");
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(request).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache_enabled: state.cache.is_some(),
    })
}

async fn cache_stats(State(state): State<SharedState>) -> Result<Json<CacheStatistics>, ApiError> {
    Ok(Json(state.cache()?.stats().await))
}

async fn clear_cache(State(state): State<SharedState>) -> Result<Json<ClearResponse>, ApiError> {
    let removed = state.cache()?.clear().await;
    Ok(Json(ClearResponse {
        success: true,
        removed,
    }))
}

async fn delete_entry(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let cache = state.cache()?;
    let key = CacheKey::parse(&key)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid cache key: {}", key)))?;

    let removed = cache.delete_entry(&key).await;

    Ok(Json(ClearResponse {
        success: true,
        removed: usize::from(removed),
    }))
}

async fn reclaim(State(state): State<SharedState>) -> Result<Json<ReclaimReport>, ApiError> {
    state
        .cache()?
        .reclaim_now()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::Internal("Reclamation unavailable".to_string()))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_cache::{CacheConfig, RequestDescriptor, RetrievalMethod, SkinSource};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use std::path::Path;
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn create_test_state(
        cache_dir: &Path,
        api_token: Option<&str>,
        cache_api_token: Option<&str>,
    ) -> SharedState {
        let cache = AvatarCache::open_without_scheduler(CacheConfig::with_directory(cache_dir))
            .await
            .unwrap();
        Arc::new(ServerState::new(
            Some(cache),
            api_token.map(String::from),
            cache_api_token.map(String::from),
        ))
    }

    fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor::new(RetrievalMethod::Mojang, SkinSource::username("Notch"), "minimal")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), Some("secret"), None).await;
        let router = create_router(state);

        // Health stays open even with a global token
        let response = router
            .oneshot(request(Method::GET, "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["cache_enabled"], true);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), None, None).await;
        state
            .cache
            .as_ref()
            .unwrap()
            .put(&descriptor(), b"avatar")
            .await;
        let router = create_router(state);

        let response = router
            .oneshot(request(Method::GET, "/api/cache/stats", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["disk_file_count"], 1);
        assert_eq!(json["disk_total_bytes"], 6);
        assert_eq!(json["memory_item_count"], 1);
        assert_eq!(json["memory_capacity"], 100);
    }

    #[tokio::test]
    async fn test_cache_token_required() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), None, Some("cache-secret")).await;
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(request(Method::GET, "/api/cache/stats", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .clone()
            .oneshot(request(Method::GET, "/api/cache/stats", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(request(Method::GET, "/api/cache/stats", Some("cache-secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_global_token_takes_precedence() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), Some("global"), Some("cache-secret")).await;
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(request(Method::GET, "/api/cache/stats", Some("cache-secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(request(Method::GET, "/api/cache/stats", Some("global")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_clear_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), None, None).await;
        let cache = state.cache.as_ref().unwrap();
        cache.put(&descriptor(), b"avatar").await;
        let router = create_router(state.clone());

        let response = router
            .oneshot(request(Method::DELETE, "/api/cache", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["removed"], 2);
        assert!(state.cache.as_ref().unwrap().get(&descriptor()).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_entry_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), None, None).await;
        state
            .cache
            .as_ref()
            .unwrap()
            .put(&descriptor(), b"avatar")
            .await;
        let router = create_router(state.clone());
        let uri = format!("/api/cache/{}", descriptor().cache_key());

        let response = router
            .clone()
            .oneshot(request(Method::DELETE, &uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["removed"], 1);

        let response = router
            .oneshot(request(Method::DELETE, &uri, None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["removed"], 0);
        assert!(state.cache.as_ref().unwrap().get(&descriptor()).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_rejects_invalid_key() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), None, None).await;
        let router = create_router(state);

        let response = router
            .oneshot(request(Method::DELETE, "/api/cache/not-a-key", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reclaim_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), None, None).await;
        let router = create_router(state);

        let response = router
            .oneshot(request(Method::POST, "/api/cache/reclaim", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["scanned"], 0);
        assert_eq!(json["failures"], 0);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let state = Arc::new(ServerState::new(None, None, None));
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(request(Method::GET, "/api/cache/stats", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = router
            .oneshot(request(Method::GET, "/health", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["cache_enabled"], false);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = Arc::new(ServerState::new(None, None, None));
        let router = create_router(state);

        let response = router
            .oneshot(request(Method::GET, "/api/generate", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Not found");
    }

    #[test]
    fn test_server_state_new() {
        let state = ServerState::new(None, None, Some("t".to_string()));
        assert_eq!(state.required_token(), Some("t"));

        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}
