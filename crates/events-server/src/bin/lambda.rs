//! Lambda entry point - serves the same router behind API Gateway.
//!
//! The database defaults to `/tmp/events.redb`, which lives only as long as
//! the execution environment. Point `EVENTS_DB_PATH` at a mounted volume to
//! keep events across cold starts.

use lambda_http::{run, Error};

use events_server::{build_app, config::LAMBDA_DEFAULTS, init_tracing, AppState, Config};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env_with_defaults(LAMBDA_DEFAULTS)?;
    init_tracing(config.log_format);

    let state = AppState::from_config(&config)?;

    run(build_app(state, &config)).await
}
