use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kenya_rideshare::{
    config::AppConfig,
    routes::create_router,
    state::AppState,
    RideShareError, RideShareResult,
};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kenya_rideshare=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> RideShareResult<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_json);

    tracing::info!(
        "Starting kenya-rideshare ({} environment, {:?} store)",
        config.environment,
        config.store.backend
    );

    let app_state = AppState::new(config.clone()).await?;
    if let Some(seed) = &config.bootstrap_admin {
        app_state.identity.seed_admin(seed).await?;
    }

    let app = create_router(Arc::new(app_state));

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .map_err(|e| RideShareError::ConfigurationError(format!("Cannot bind {}: {}", config.bind_address(), e)))?;
    tracing::info!("Listening on {}", config.bind_address());

    axum::serve(listener, app)
        .await
        .map_err(|e| RideShareError::InternalServer(e.to_string()))?;
    Ok(())
}
