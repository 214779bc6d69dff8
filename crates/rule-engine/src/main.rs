//! 规则引擎服务
//!
//! 提供 HTTP 接口的规则创建与评估服务。

use anyhow::Result;
use axum::middleware;
use rule_engine::http::{self, AppState};
use rule_engine::{InMemoryRuleStore, RuleRepository};
use rule_shared::config::AppConfig;
use rule_shared::observability;
use rule_shared::observability::middleware::{http_tracing, request_id};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig {
            service_name: "rule-engine".to_string(),
            ..AppConfig::default()
        }
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting rule-engine service...");

    let store: Arc<dyn RuleRepository> = Arc::new(InMemoryRuleStore::new());
    let state = AppState::new(store);
    info!("Rule store initialized");

    if config.cors.allowed_origins.iter().any(|o| o == "*") && config.is_production() {
        warn!("CORS allows any origin in production");
    }

    let app = http::router(state)
        .layer(middleware::from_fn(http_tracing))
        .layer(middleware::from_fn(request_id))
        .layer(http::cors_layer(&config.cors.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let addr = config.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
