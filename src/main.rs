use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use xpress_access_service::{app, build_state, cache, config::AppConfig, workflow, ApiDoc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = AppConfig::from_env();
    let state = build_state(&cfg)?;
    let openapi = ApiDoc::openapi();

    tokio::spawn(cache::start_cache_cleanup_task(state.cache.clone()));
    tokio::spawn(workflow::start_expiry_sweep(
        state.orchestrator.clone(),
        cfg.approval_sweep_interval,
    ));

    let app = app(state).route(
        "/openapi.json",
        axum::routing::get(move || async { axum::Json(openapi) }),
    );

    let listener = TcpListener::bind(cfg.bind_addr).await?;
    tracing::info!("xpress-access-service listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
