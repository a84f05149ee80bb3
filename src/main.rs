use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use northstar::config::Config;
use northstar::services::{
    AdapterSet, CandidateProcessor, DiscoveryService, DomainRegistry, MetadataJudge, QueryCache,
    QueryGenerationService, SearchOrchestrator, SessionService, SpamFilter,
};
use northstar::{AppState, db, handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::search::execute_search,
        handlers::discovery::list_sessions,
        handlers::discovery::get_session,
        handlers::discovery::cancel_session,
        handlers::discovery::trigger_discovery,
        handlers::domains::list_domains,
        handlers::domains::blacklist_domain,
    ),
    components(
        schemas(
            handlers::search::SearchExecuteRequest,
            handlers::search::SearchExecuteResponse,
            handlers::discovery::TriggerDiscoveryRequest,
            handlers::discovery::SessionListResponse,
            handlers::domains::DomainListResponse,
            models::DiscoverySessionResponse,
            models::SessionType,
            models::DiscoveryStatus,
            models::SearchEngine,
            models::FundingCategory,
            models::Domain,
            models::DomainStatus,
            models::BlacklistDomainRequest,
            models::FundingCandidate,
            models::CandidateStatus,
        )
    ),
    tags(
        (name = "Search", description = "Discovery execution"),
        (name = "Discovery", description = "Discovery session management"),
        (name = "Domains", description = "Domain registry administration"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    // Keep the non-blocking writer guard alive for the whole process.
    let mut _appender_guard = None;
    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("northstar.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _appender_guard = Some(guard);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    tracing::info!("Northstar starting up");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database pool created successfully");

    let domain_registry = Arc::new(DomainRegistry::new(pool.clone()));
    let session_service = Arc::new(SessionService::new(pool.clone()));

    let query_cache = Arc::new(QueryCache::new(&config.cache));
    let query_generation = Arc::new(QueryGenerationService::new(
        &config,
        Arc::clone(&query_cache),
        pool.clone(),
    ));
    tracing::info!("Query generation ready (model: {})", query_generation.model_name());

    let adapters = Arc::new(AdapterSet::from_config(&config, pool.clone()));
    if adapters.is_empty() {
        tracing::warn!("No search engines are enabled; discovery sessions will fail");
    }

    let orchestrator = Arc::new(SearchOrchestrator::new(
        Arc::clone(&adapters),
        Arc::new(SpamFilter::new(config.spam.clone())),
        Arc::clone(&domain_registry),
        Duration::from_secs(config.orchestrator.batch_deadline_secs),
    ));

    let processor = Arc::new(CandidateProcessor::new(
        Arc::clone(&domain_registry),
        Arc::new(MetadataJudge::new(config.judge.clone())),
        pool.clone(),
        config.orchestrator.max_concurrent_results,
    ));

    let discovery_service = DiscoveryService::new(
        Arc::clone(&query_generation),
        orchestrator,
        processor,
        Arc::clone(&session_service),
    );

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        domain_registry,
        session_service,
        query_generation,
        adapters,
        discovery_service,
    });

    let api_routes = Router::new()
        .route("/api/search/execute", post(handlers::search::execute_search))
        .route("/api/discovery/sessions", get(handlers::discovery::list_sessions))
        .route("/api/discovery/sessions/:id", get(handlers::discovery::get_session))
        .route(
            "/api/discovery/sessions/:id/cancel",
            post(handlers::discovery::cancel_session),
        )
        .route("/api/discovery/trigger", post(handlers::discovery::trigger_discovery))
        .route(
            "/api/domains",
            get(handlers::domains::list_domains),
        )
        .route("/api/domains/blacklist", post(handlers::domains::blacklist_domain))
        .with_state(Arc::clone(&app_state));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .merge(health_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}
