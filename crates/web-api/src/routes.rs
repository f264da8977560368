use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Json, Router,
};
use domain::UserId;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

/// 上游认证层写入的用户标识头
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    online_users: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        online_users: state.dispatcher.presence().online_count(),
    })
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = resolve_identity(&headers, query.user_id.as_deref())?;
    let connection = WebSocketConnection::new(state.dispatcher.clone(), user_id);
    Ok(ws.on_upgrade(move |socket| connection.run(socket)))
}

/// 头部优先，其次查询参数
fn resolve_identity(headers: &HeaderMap, query_user_id: Option<&str>) -> Result<UserId, ApiError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .or(query_user_id)
        .ok_or_else(|| ApiError::unauthorized("missing user identity"))?;

    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|id| UserId::parse(id).ok())
        .ok_or_else(|| ApiError::unauthorized(format!("invalid user identity: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    #[test]
    fn header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("7"));

        let user = resolve_identity(&headers, Some("9")).unwrap();
        assert_eq!(user, UserId(7));
    }

    #[test]
    fn query_is_used_without_header() {
        let user = resolve_identity(&HeaderMap::new(), Some(" 9 ")).unwrap();
        assert_eq!(user, UserId(9));
    }

    #[test]
    fn missing_or_invalid_identity_is_unauthorized() {
        for query in [None, Some("abc"), Some("0"), Some("-3")] {
            let err = resolve_identity(&HeaderMap::new(), query).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
