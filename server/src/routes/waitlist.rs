//! Waitlist endpoint routes.

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_count, handle_list, handle_subscribe, handle_waitlist_socket, CountResponse,
    ListResponse, SubscribeRequest, SubscribeResponse,
};
use crate::AppState;

/// Create waitlist routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/waitlist", get(list_handler).post(subscribe_handler))
        .route("/waitlist/count", get(count_handler))
        .route("/ws/waitlist", get(socket_handler))
}

/// POST /waitlist - Join the waitlist.
///
/// `userAgent` and `ipAddress` fall back to the request headers.
async fn subscribe_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<SubscribeRequest>,
) -> (StatusCode, Json<SubscribeResponse>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    if request.user_agent.is_none() {
        request.user_agent = header(USER_AGENT.as_str());
    }
    if request.ip_address.is_none() {
        request.ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()));
    }

    let outcome = handle_subscribe(
        &state.store,
        &state.mailer,
        state.config.admin_email.as_deref(),
        request,
    )
    .await;
    (outcome.status(), Json(outcome.response()))
}

/// GET /waitlist/count - Number of subscribers.
async fn count_handler(State(state): State<AppState>) -> Json<CountResponse> {
    Json(handle_count(&state.store).await)
}

/// GET /waitlist - Subscriber list (admin only).
async fn list_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<ListResponse>> {
    Ok(Json(handle_list(&state.store).await?))
}

/// GET /ws/waitlist - Live subscriber count.
async fn socket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_waitlist_socket(socket, state))
}
