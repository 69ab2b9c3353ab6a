use tokio::net::TcpListener;

use events_server::{build_app, init_tracing, AppState, Config, StoreBackend};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: EVENTS_LISTEN_ADDR, EVENTS_STORE, EVENTS_DB_PATH, EVENTS_ALLOWED_ORIGINS");
            eprintln!("Optional: EVENTS_STRICT_FIELDS, EVENTS_REQUEST_TIMEOUT_SECS, EVENTS_LOG_FORMAT");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);

    tracing::info!("Starting Events API");
    tracing::info!("Listen address: {}", config.listen_addr);
    match config.store {
        StoreBackend::Redb => tracing::info!("Database path: {}", config.db_path.display()),
        StoreBackend::Memory => tracing::info!("Using in-memory store"),
    }

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let app = build_app(state, &config);

    let listener = match TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server running at http://{}", config.listen_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
