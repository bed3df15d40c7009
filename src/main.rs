use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use quiz_live::api;
use quiz_live::auth::{CredentialVerifier, JwtVerifier};
use quiz_live::config::Config;
use quiz_live::game::GameCoordinator;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let coordinator = GameCoordinator::new();
    if let Some(idle_timeout) = config.rooms.idle_timeout {
        coordinator.start_room_reaper(idle_timeout, config.rooms.reap_interval);
    }

    let verifier: Arc<dyn CredentialVerifier> = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
    let routes = api::game_routes::routes(coordinator, verifier);

    let (ip, port) = config.bind_address();
    tracing::info!(host = %config.server.host, port, "Quiz live server listening");

    warp::serve(routes)
        .run((ip, port))
        .await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quiz_live=info,warp=warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
