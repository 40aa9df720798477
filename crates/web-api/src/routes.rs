use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State, WebSocketUpgrade},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::CacheStats;
use domain::{
    LanguageCode, LanguageOption, NewMessageEvent, RoomId, TranslationOutcome,
    TranslationRequest, UserId, SUPPORTED_LANGUAGES,
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::websocket;

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    providers: Vec<String>,
    cache: CacheStats,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TranslatePayload {
    text: String,
    source_language: Option<String>,
    target_language: String,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    user_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .route("/ws", get(websocket_upgrade))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms/{room_id}/messages", get(get_history))
        .route("/translate", post(translate))
        .route("/languages", get(languages))
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        providers: state.orchestrator.provider_names(),
        cache: state.orchestrator.cache_stats(),
    })
}

async fn get_history(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<NewMessageEvent>>, ApiError> {
    let room_id = RoomId::new(room_id)?;
    let limit = query.limit.unwrap_or(50).min(100) as usize;
    let items = state.coordinator.recent_messages(&room_id, limit).await?;

    Ok(Json(items))
}

/// 独立翻译接口，不经过聊天链路。
/// 限流键是 用户+IP，匿名请求只按 IP 计数。
async fn translate(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<TranslatePayload>,
) -> Result<Json<TranslationOutcome>, ApiError> {
    let user = payload.user_id.as_deref().unwrap_or("anonymous");
    let decision = state
        .translate_limiter
        .check(&format!("{user}:{}", addr.ip()));
    if !decision.allowed {
        return Err(application::ApplicationError::rate_limited(decision.retry_after).into());
    }

    let source = match payload.source_language {
        Some(code) => LanguageCode::new(code)?,
        None => LanguageCode::auto(),
    };
    let target = LanguageCode::new(payload.target_language)?;
    let request = TranslationRequest::new(payload.text, source, target)?;

    let outcome = state.orchestrator.translate(request).await?;
    Ok(Json(outcome))
}

async fn languages() -> Json<&'static [LanguageOption]> {
    Json(SUPPORTED_LANGUAGES)
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = UserId::new(query.user_id)?;
    let client_ip = addr.ip().to_string();

    Ok(ws.on_upgrade(move |socket| websocket::run(socket, state, user_id, client_ip)))
}
