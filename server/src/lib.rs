//! gitdoc server - a waitlist service backed by a gitdoc document store.
//!
//! Sign-ups are stored as records of the `waitlist` collection, which lives
//! as one JSON file in a GitHub repository.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod routes;
pub mod waitlist;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use gitdoc_store::DocStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::mailer::Mailer;
use crate::websocket::ConnectionManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: DocStore,
    pub config: Arc<Config>,
    pub mailer: Arc<Mailer>,
    pub conn_manager: Arc<ConnectionManager>,
}

impl AppState {
    pub fn new(store: DocStore, config: Config) -> Self {
        let mailer = Mailer::new(config.smtp_endpoint.clone(), config.smtp_from.clone());
        Self {
            store,
            config: Arc::new(config),
            mailer: Arc::new(mailer),
            conn_manager: ConnectionManager::new_shared(),
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
