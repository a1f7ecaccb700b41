//! HTTP surface: routing, token validation and handlers.
//!
//! The dandan protocol mounts the same API under two prefixes
//! (`/api/v1/{token}` and `/api/v1/{token}/api/v2`) because clients disagree
//! on whether the upstream version segment belongs to the base URL.

pub mod cache;
pub mod error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use dandan::DandanError;
use dandan::model::{AnimeListResponse, BangumiResponse, MatchRequest, MatchResponse};

use crate::config::ServerConfig;
use crate::state::AppState;

use self::error::ApiError;

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/match", post(match_handler))
        .route("/comment/{id}", get(comment_handler))
        .route("/search/anime", get(search_anime_handler))
        .route("/bangumi/{id}", get(bangumi_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            validate_token,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .nest("/api/v1/{token}/api/v2", api.clone())
        .nest("/api/v1/{token}", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs.max(1),
        )))
        .with_state(state)
}

async fn validate_token(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    // No configured tokens disables validation.
    if state.tokens.is_empty() {
        return next.run(request).await;
    }
    let token = params.get("token").map(String::as_str).unwrap_or("");
    if state.tokens.iter().any(|accepted| accepted == token) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Unauthorized" })),
        )
            .into_response()
    }
}

async fn match_handler(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> Json<MatchResponse> {
    info!(file_name = %request.file_name, "match requested");
    Json(state.facade.match_file(&request).await)
}

async fn comment_handler(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let id = params
        .get("id")
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| ApiError(DandanError::validation("invalid comment id")))?;

    // `from`, `withRelated` and `chConvert` are accepted but not handled.
    if let Some(cached) = state.comment_cache.get(id) {
        return Ok(Json((*cached).clone()).into_response());
    }

    let response = Arc::new(state.facade.comments(id).await?);
    state.comment_cache.insert(id, Arc::clone(&response));
    Ok(Json((*response).clone()).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    keyword: String,
}

async fn search_anime_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<AnimeListResponse> {
    Json(state.facade.search_anime(&query.keyword).await)
}

async fn bangumi_handler(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
) -> Result<Json<BangumiResponse>, ApiError> {
    let id = params
        .get("id")
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| ApiError(DandanError::validation("invalid bangumi id")))?;
    Ok(Json(state.facade.anime_info(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::cache::CommentCache;
    use axum::body::Body;
    use danmaku::{AdapterRegistry, SearchOrchestrator};
    use dandan::{DandanFacade, IdStore};
    use rustc_hash::FxHashMap;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let registry = Arc::new(AdapterRegistry::new());
        let orchestrator = Arc::new(SearchOrchestrator::new(
            Arc::clone(&registry),
            FxHashMap::default(),
            None,
            Duration::from_secs(1),
            CancellationToken::new(),
        ));
        let store = Arc::new(IdStore::new(
            std::env::temp_dir().join("danmu-server-api-test.json.gz"),
        ));
        let facade = Arc::new(DandanFacade::new(
            orchestrator,
            registry,
            store,
            FxHashMap::default(),
        ));
        AppState {
            facade,
            tokens: Arc::new(vec!["secret".to_owned()]),
            comment_cache: Arc::new(CommentCache::new(Duration::from_secs(60))),
        }
    }

    fn test_router() -> Router {
        router(test_state(), &ServerConfig::default())
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/api/v1/wrong/search/anime?keyword=x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_match_with_valid_token() {
        for uri in [
            "/api/v1/secret/match",
            "/api/v1/secret/api/v2/match",
        ] {
            let response = test_router()
                .oneshot(
                    axum::http::Request::builder()
                        .method("POST")
                        .uri(uri)
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{"fileName":"某剧 S01E01"}"#))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["success"], true);
            assert_eq!(body["isMatched"], false);
        }
    }

    #[tokio::test]
    async fn test_comment_invalid_id_is_bad_request() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/api/v1/secret/comment/not-a-number")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_comment_unknown_id_is_bad_request() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/api/v1/secret/comment/424242")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
