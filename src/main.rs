use axum::{Router, http::header};
use block_accounting::{
    api::{
        handlers::{AppState, api_routes},
        lifecycle::Lifecycle,
        openapi::ApiDoc,
    },
    auth::{identity::JwtIdentityProvider, jwt::JwtService},
    config::CONFIG,
    core::{engine::AuthorizationEngine, services::OrganizationService, time::SystemTimeSource},
    infrastructure::{
        cache::in_memory::InMemoryCache, logging::in_memory::InMemoryLogging, settlement::http::ChainApiGateway,
        storage::in_memory::InMemoryStorage,
    },
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&CONFIG.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!(config = ?*CONFIG, "starting");

    let storage = Arc::new(InMemoryStorage::new());
    let logging = Arc::new(InMemoryLogging::new());
    let cache = Arc::new(InMemoryCache::new());
    let clock = Arc::new(SystemTimeSource);
    let gateway = Arc::new(ChainApiGateway::new(
        CONFIG.chain_api_host.clone(),
        CONFIG.chain_api_timeout,
    )?);

    let engine = Arc::new(AuthorizationEngine::new(
        storage.clone(),
        gateway.clone(),
        logging.clone(),
        clock.clone(),
    ));
    let organizations = Arc::new(OrganizationService::new(
        storage.clone(),
        gateway,
        logging,
        cache,
        clock,
    ));
    let identity = Arc::new(JwtIdentityProvider::new(
        JwtService::new(CONFIG.jwt_secret.clone()),
        storage,
    ));
    let lifecycle = Arc::new(Lifecycle::new());

    if !CONFIG.sweep_interval.is_zero() {
        let engine = engine.clone();
        let period = CONFIG.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.sweep_expired().await {
                    error!(error = %e, "expiry sweep failed");
                }
            }
        });
    }

    let state = AppState {
        engine,
        organizations,
        identity,
        lifecycle: lifecycle.clone(),
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes(state))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(CONFIG.request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], CONFIG.port));
    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            lifecycle.close();
        })
        .await?;

    Ok(())
}
