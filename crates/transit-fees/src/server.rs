//! HTTP server wiring: storage, gateway client, engine and router

use crate::api;
use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::FeesConfig;
use crate::engine::FeesEngine;
use crate::gateway::{HttpPaymentGateway, PaymentGateway};
use crate::storage::{PgRepos, Repositories};
use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FeesConfig>,
    pub engine: Arc<FeesEngine>,
    /// Absent when running over an in-memory store
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: FeesConfig, engine: FeesEngine, db_pool: Option<PgPool>) -> Self {
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            db_pool,
        }
    }
}

pub struct FeesServer {
    config: FeesConfig,
    pool: PgPool,
}

impl FeesServer {
    pub async fn new(config: FeesConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .max_lifetime(Some(config.max_lifetime()))
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { config, pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        match sqlx::migrate!("./migrations").run(&self.pool).await {
            Ok(_) => {
                info!("Database migrations completed successfully");
                Ok(())
            }
            Err(e) => {
                error!("Failed to run database migrations: {}", e);
                Err(anyhow::anyhow!("Migration failed: {}", e))
            }
        }
    }

    fn state(&self) -> Result<AppState> {
        let repos = Repositories::from_store(Arc::new(PgRepos::new(self.pool.clone())));
        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            HttpPaymentGateway::from_config(&self.config)
                .map_err(|e| anyhow::anyhow!("Failed to build gateway client: {}", e))?,
        );
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let engine = FeesEngine::new(repos, gateway, audit, &self.config);

        Ok(AppState::new(
            self.config.clone(),
            engine,
            Some(self.pool.clone()),
        ))
    }

    pub async fn serve(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr: SocketAddr = format!(
            "{}:{}",
            self.config.http.listen_address, self.config.http.port
        )
        .parse()
        .with_context(|| "Invalid server address")?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("Transit fees service listening on {}", addr);

        let app = build_router(self.state()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error")?;

        info!("Closing database connections");
        self.pool.close().await;
        Ok(())
    }
}

/// Router with tracing, timeout and CORS layers applied
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors);

    Router::new()
        .nest("/api/v1", api::routes(state))
        .layer(middleware)
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            warn!("Received terminate signal, shutting down");
        },
    }
}
