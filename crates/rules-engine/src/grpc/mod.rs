//! gRPC 服务实现

mod analytics;
pub mod convert;
mod rules;

pub use analytics::AnalyticsServiceImpl;
pub use rules::RulesServiceImpl;

use std::time::Instant;
use telemetryx_proto::rules_service_server::RulesServiceServer;
use telemetryx_shared::observability::metrics;
use tonic::{Response, Status};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::v1::{ServerReflection, ServerReflectionServer};
use tracing::{info, warn};

use crate::context::AppContext;

/// 记录单次 RPC 的方法、状态与耗时
pub(crate) fn observe<T>(
    service: &'static str,
    method: &'static str,
    start: Instant,
    result: Result<T, Status>,
) -> Result<Response<T>, Status> {
    let elapsed = start.elapsed();
    let duration_ms = elapsed.as_millis() as u64;

    let status = match &result {
        Ok(_) => {
            info!(service, method, status = "OK", duration_ms, "gRPC request completed");
            "OK".to_string()
        }
        Err(s) => {
            let code = format!("{:?}", s.code());
            warn!(
                service,
                method,
                status = %code,
                duration_ms,
                error = %s.message(),
                "gRPC request failed"
            );
            code
        }
    };

    metrics::record_grpc_request(service, method, &status, elapsed.as_secs_f64());
    result.map(Response::new)
}

/// 构建 gRPC 反射服务，覆盖业务服务与标准健康检查服务
pub fn reflection_service()
-> Result<ServerReflectionServer<impl ServerReflection>, tonic_reflection::server::Error> {
    tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(telemetryx_proto::FILE_DESCRIPTOR_SET)
        .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
        .build_v1()
}

/// 按存储健康状态更新标准健康检查中 RulesService 的状态，返回是否健康
pub async fn sync_rules_health(reporter: &HealthReporter, context: &AppContext) -> bool {
    let healthy = context.is_store_healthy().await;
    if healthy {
        reporter
            .set_serving::<RulesServiceServer<RulesServiceImpl>>()
            .await;
    } else {
        reporter
            .set_not_serving::<RulesServiceServer<RulesServiceImpl>>()
            .await;
    }
    healthy
}
