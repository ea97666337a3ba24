use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use taleforge_engine::api::{router, AppState};
use taleforge_engine::config::AppConfig;
use taleforge_engine::infrastructure::agent::client::HttpAgentClient;
use taleforge_engine::infrastructure::agent::mock::MockAgentClient;
use taleforge_engine::infrastructure::agent::AgentPort;
use taleforge_engine::infrastructure::hub::ConnectionHub;
use taleforge_engine::infrastructure::image::{HttpImageService, ImageService, MockImageService};
use taleforge_engine::infrastructure::state_store::StateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("taleforge_engine={},tower_http=info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(!config.log_file))
        .init();

    tracing::info!(
        host = %config.host,
        port = config.port,
        node_env = %config.node_env,
        mock_sdk = config.mock_sdk,
        "starting taleforge engine"
    );

    std::fs::create_dir_all(&config.adventures_dir)?;

    let agent: Arc<dyn AgentPort> = if config.mock_sdk {
        Arc::new(MockAgentClient::new())
    } else {
        Arc::new(HttpAgentClient::new(
            &config.agent_base_url,
            &config.agent_model,
            config.agent_api_key.clone(),
        ))
    };

    let image: Arc<dyn ImageService> = match (&config.image_service_base_url, config.mock_sdk) {
        (_, true) => Arc::new(MockImageService::new()),
        (Some(base_url), false) => Arc::new(HttpImageService::new(base_url)),
        (None, false) => Arc::new(MockImageService::new()),
    };

    let hub = Arc::new(ConnectionHub::new(config.allowed_origins.clone(), config.max_connections));
    ConnectionHub::spawn_heartbeat(hub.clone());

    let state = Arc::new(AppState {
        state_store: StateStore::new(config.adventures_dir.clone()),
        agent,
        image,
        hub: hub.clone(),
        project_dir: config.project_dir.clone(),
    });

    let allowed_origins = config.allowed_origins.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let app: Router = router(state, config.static_root.as_deref())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining connections");
            hub.start_draining(1001, "Server shutting down");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    Ok(())
}
