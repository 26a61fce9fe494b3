//! TelemetryX 规则服务
//!
//! 在同一端口提供 RulesService 与 AnalyticsService。

use anyhow::{Context, Result};
use rules_engine::grpc;
use rules_engine::{AnalyticsServiceImpl, AppContext, RulesServiceImpl};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use telemetryx_proto::analytics_service_server::AnalyticsServiceServer;
use telemetryx_proto::rules_service_server::RulesServiceServer;
use telemetryx_shared::config::AppConfig;
use telemetryx_shared::observability;
use tokio::signal;
use tonic::transport::Server;
use tracing::{error, info, warn};

/// 标准健康检查状态的刷新间隔
const HEALTH_SYNC_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("rules-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let _guard = observability::init(&config.observability).await?;

    info!(
        environment = %config.environment,
        "Starting rules-engine service..."
    );

    let grpc_addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("Invalid gRPC address: {}", config.server_addr()))?;

    let max_message_bytes = config.server.max_message_bytes;
    let context = Arc::new(AppContext::init(config).await?);
    if context.database().is_none() {
        warn!("Running in degraded mode: evaluation returns no matches, rule management unavailable");
    }

    let rules_service = RulesServiceServer::new(RulesServiceImpl::from_context(context.clone()))
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes);
    let analytics_service = AnalyticsServiceServer::new(AnalyticsServiceImpl::new())
        .max_decoding_message_size(max_message_bytes)
        .max_encoding_message_size(max_message_bytes);

    // 标准 grpc.health.v1 健康检查与反射
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<AnalyticsServiceServer<AnalyticsServiceImpl>>()
        .await;
    grpc::sync_rules_health(&health_reporter, &context).await;

    let health_task = {
        let reporter = health_reporter.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEALTH_SYNC_INTERVAL);
            loop {
                ticker.tick().await;
                if !grpc::sync_rules_health(&reporter, &context).await {
                    warn!("Rule store unhealthy, reporting NOT_SERVING");
                }
            }
        })
    };

    let reflection_service =
        grpc::reflection_service().context("Failed to build gRPC reflection service")?;

    info!("gRPC server listening on {}", grpc_addr);

    let served = Server::builder()
        .add_service(health_service)
        .add_service(reflection_service)
        .add_service(rules_service)
        .add_service(analytics_service)
        .serve_with_shutdown(grpc_addr, shutdown_signal())
        .await;

    health_task.abort();
    context.close().await;

    if let Err(e) = served {
        error!(error = %e, "gRPC server terminated with error");
        return Err(e.into());
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
