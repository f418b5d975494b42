use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use application::SendMessageRequest;
use domain::MessageKind;

use crate::{error::ApiError, state::AppState, websocket};

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessagePayload {
    pub(crate) id: Option<String>,
    pub(crate) uid: String,
    pub(crate) message: String,
    #[serde(rename = "roomName")]
    pub(crate) room_name: String,
    #[serde(rename = "type", default)]
    pub(crate) kind: MessageKind,
    #[serde(rename = "mediaUrl")]
    pub(crate) media_url: Option<String>,
    #[serde(rename = "mediaType")]
    pub(crate) media_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chats/sendMessage", post(send_message))
        .route("/chats/get-messages/{room_name}", get(get_messages))
        .route("/ws", get(websocket_upgrade))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        base.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        base.allow_origin(origins)
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let auth_uid = state.jwt_service.extract_user_from_headers(&headers)?;
    if auth_uid != payload.uid {
        return Err(ApiError::forbidden(
            "uid does not match authenticated account",
        ));
    }

    let stored = state
        .chat_service
        .send(SendMessageRequest {
            id: payload.id,
            uid: payload.uid,
            message: payload.message,
            room_name: payload.room_name,
            kind: payload.kind,
            media_url: payload.media_url,
            media_kind: payload.media_kind,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Message sent successfully",
            "data": stored,
        })),
    ))
}

async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.jwt_service.extract_user_from_headers(&headers)?;

    let messages = state.chat_service.history(&room_name).await?;

    // 空房间同样是 200，文案沿用客户端已经依赖的两种提示
    let text = if messages.is_empty() {
        "Messages not fetched"
    } else {
        "Messages fetched"
    };
    Ok(Json(json!({
        "message": text,
        "data": messages,
    })))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .ok_or_else(|| ApiError::unauthorized("Missing token query parameter"))?;
    let claims = state.jwt_service.verify_token(&token)?;

    Ok(ws.on_upgrade(move |socket| websocket::handle_socket(socket, state, claims.uid)))
}
