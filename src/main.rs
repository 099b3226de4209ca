use std::path::PathBuf;
use std::sync::Arc;

use gemini_relay::api::build_router;
use gemini_relay::auth::OauthAuthClient;
use gemini_relay::config::{load_config, AppConfig};
use gemini_relay::observability::init_tracing;
use gemini_relay::state::AppState;

fn main() {
    let config = load_config("config.yaml").unwrap_or_else(|err| {
        eprintln!("Failed to load configuration: {err}");
        eprintln!("Copy 'config.example.yaml' to 'config.yaml' and adjust as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Failed to initialize Tokio runtime: {err}");
            std::process::exit(1);
        });

    runtime.block_on(async move {
        run(config).await;
    });
}

async fn run(config: AppConfig) {
    let host = config.server.host.clone();
    let port = config.server.port;

    let credentials_path = config
        .auth
        .credentials_path
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(OauthAuthClient::default_credentials_path);
    let auth = Arc::new(OauthAuthClient::new(
        credentials_path,
        config.auth.project_id.clone(),
    ));

    let state = match AppState::new(config, auth) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            eprintln!("Failed to initialize: {err}");
            std::process::exit(1);
        }
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to {host}:{port}: {err}");
            std::process::exit(1);
        });

    tracing::info!("gemini-relay listening on {host}:{port}");
    if let Err(err) = axum::serve(listener, router).await {
        tracing::error!(error = %err, "server exited");
    }
}
