//! Events Server - axum HTTP surface for the Events API.

pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{Config, LogFormat, StoreBackend};
pub use error::{ApiError, ErrorEnvelope};
pub use logging::init_tracing;
pub use state::AppState;

use axum::Router;

/// Build the full application: routes plus the CORS policy from `config`.
pub fn build_app(state: AppState, config: &Config) -> Router {
    routes::create_router(state).layer(middleware::cors_layer(&config.allowed_origins))
}
