// Main entry point for the parse server

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use extraction::{
    ContentExtractor, DomExtractor, ExtractorConfig, HeadlessExtractor, RemoteRenderer,
    RenderEndpoint, SessionPool, SettleCondition, UrlValidator,
};
use openai_client::OpenAIClient;
use server_core::domains::parsing::{
    CachedSchemaFetcher, HttpSchemaFetcher, Structurer, StructurerConfig,
};
use server_core::kernel::jobs::{
    JobOrchestrator, JobStore, JobSweeper, MemoryJobStore, OrchestratorConfig, PgJobStore,
};
use server_core::kernel::{BackoffConfig, BaseSchemaFetcher, OpenAIAdapter, ServerDeps};
use server_core::server::{build_app, AppState};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,extraction=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting parse server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let validator = config
        .ssrf_allowed_hosts
        .iter()
        .fold(UrlValidator::new(), |v, host| v.allow_host(host.as_str()));

    // Job store
    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Migrations complete");

            Arc::new(PgJobStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory");
            Arc::new(MemoryJobStore::new())
        }
    };

    // Extraction: static fetch, plus headless fallback when a render service is configured
    let dom = DomExtractor::new()
        .and_then(|dom| dom.with_validator(validator.clone()))
        .context("Failed to create DOM extractor")?;
    let mut extractor = ContentExtractor::new(Arc::new(dom)).with_config(ExtractorConfig {
        dom_timeout: config.dom_timeout,
        headless_timeout: config.headless_timeout,
        min_content_chars: config.min_content_chars,
    });

    let headless_pool = match &config.headless_render_url {
        Some(render_url) => {
            let mut endpoint = RenderEndpoint::new(render_url.as_str());
            if let Some(token) = &config.headless_render_token {
                endpoint = endpoint.with_token(token.expose());
            }
            let renderer = RemoteRenderer::new(endpoint).context("Failed to create renderer")?;
            let pool = Arc::new(SessionPool::new(
                config.headless_pool_size,
                config.headless_acquire_timeout,
            ));
            let settle = config
                .headless_settle
                .map(SettleCondition::Delay)
                .unwrap_or_default();
            let headless =
                HeadlessExtractor::new(Arc::new(renderer), pool.clone()).with_settle(settle);
            extractor = extractor.with_headless(Arc::new(headless));

            tracing::info!(
                max_sessions = config.headless_pool_size,
                "Headless fallback enabled"
            );
            Some(pool)
        }
        None => {
            tracing::warn!("HEADLESS_RENDER_URL not set, headless fallback disabled");
            None
        }
    };

    // Model provider
    let openai = OpenAIClient::new(config.openai_api_key.expose())
        .with_base_url(config.openai_base_url.as_str())
        .with_timeout(config.llm_timeout);
    let ai = Arc::new(OpenAIAdapter::new(openai, config.openai_model.clone()));

    let backoff = BackoffConfig {
        initial_delay: config.backoff_initial,
        max_delay: config.backoff_max,
        multiplier: config.backoff_multiplier,
    };

    // Schema descriptors, cached per endpoint
    let http_schemas = HttpSchemaFetcher::new(config.schema_fetch_timeout)
        .and_then(|fetcher| fetcher.with_validator(validator.clone()))
        .context("Failed to create schema fetcher")?
        .with_retries(config.llm_max_attempts, backoff.clone());
    let schemas: Arc<dyn BaseSchemaFetcher> = Arc::new(CachedSchemaFetcher::new(
        Arc::new(http_schemas),
        config.schema_cache_ttl,
    ));

    let mut deps = ServerDeps::new(store.clone(), Arc::new(extractor), ai, schemas);
    if let Some(pool) = &headless_pool {
        deps = deps.with_headless_pool(pool.clone());
    }

    let structurer = Structurer::new(deps.ai.clone()).with_config(StructurerConfig {
        max_attempts: config.llm_max_attempts,
        backoff,
        max_input_bytes: config.max_model_input_bytes,
    });

    let orchestrator = JobOrchestrator::new(&deps, structurer)
        .with_validator(validator)
        .with_config(OrchestratorConfig {
            job_ttl: chrono::Duration::hours(config.job_ttl_hours),
            soft_target: config.job_soft_target,
            hard_cutoff: config.job_hard_cutoff,
            resolve_dns: config.ssrf_resolve_dns,
        });

    let recovered = orchestrator
        .recover_orphaned()
        .await
        .context("Failed to recover orphaned jobs")?;
    tracing::info!(recovered, "Startup recovery complete");

    // Cleanup sweeper
    let sweeper = JobSweeper::start(store, config.sweep_interval)
        .await
        .context("Failed to start job sweeper")?;

    // Build application
    let state = AppState::new(orchestrator).with_headless_pool(headless_pool.clone());
    let app = build_app(state, config.request_timeout);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down");
    sweeper.shutdown().await.context("Failed to stop sweeper")?;
    if let Some(pool) = headless_pool {
        pool.close();
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let installed = tokio::signal::ctrl_c().await;
        wait_for("Ctrl-C", installed, |()| async {}).await;
    };

    #[cfg(unix)]
    let terminate = wait_for(
        "SIGTERM",
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()),
        |mut signal| async move {
            signal.recv().await;
        },
    );

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Wait for a signal; never resolves if its handler could not be installed.
async fn wait_for<S, F>(name: &str, installed: std::io::Result<S>, recv: impl FnOnce(S) -> F)
where
    F: Future,
{
    match installed {
        Ok(signal) => {
            recv(signal).await;
        }
        Err(e) => {
            tracing::error!("Failed to listen for {}: {}", name, e);
            std::future::pending::<()>().await;
        }
    }
}
