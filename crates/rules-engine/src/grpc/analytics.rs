//! AnalyticsService 实现
//!
//! 异常检测目前只是占位启发式：`event_type == "error"` 的事件被标记为异常。

use std::time::Instant;
use telemetryx_proto::analytics_service_server::AnalyticsService;
use telemetryx_proto::health_check_response::ServingStatus;
use telemetryx_proto::{
    AnomalyResult, DetectAnomaliesRequest, DetectAnomaliesResponse, Event, HealthCheckRequest,
    HealthCheckResponse,
};
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

use super::observe;

const SERVICE: &str = "AnalyticsService";
const DEFAULT_MODEL: &str = "default";
const DEFAULT_SENSITIVITY: f64 = 0.5;

#[derive(Debug, Default, Clone)]
pub struct AnalyticsServiceImpl;

impl AnalyticsServiceImpl {
    pub fn new() -> Self {
        Self
    }

    fn score(event: &Event) -> AnomalyResult {
        let is_anomaly = event.event_type == "error";

        AnomalyResult {
            event_id: event.id.clone(),
            is_anomaly,
            anomaly_score: if is_anomaly { 0.9 } else { 0.1 },
            explanation: if is_anomaly {
                "Placeholder detection".to_string()
            } else {
                String::new()
            },
        }
    }

    fn detect(req: DetectAnomaliesRequest, start: Instant) -> DetectAnomaliesResponse {
        let model_name = if req.model_name.is_empty() {
            DEFAULT_MODEL
        } else {
            req.model_name.as_str()
        };
        let sensitivity = if req.sensitivity == 0.0 {
            DEFAULT_SENSITIVITY
        } else {
            req.sensitivity
        };

        info!(
            event_count = req.events.len(),
            model = %model_name,
            sensitivity,
            "Detecting anomalies"
        );

        let results: Vec<AnomalyResult> = req.events.iter().map(Self::score).collect();
        let elapsed_ms = start.elapsed().as_millis() as i64;

        info!(
            event_count = results.len(),
            anomaly_count = results.iter().filter(|r| r.is_anomaly).count(),
            elapsed_ms,
            "Detection complete"
        );

        DetectAnomaliesResponse {
            results,
            inference_time_ms: elapsed_ms,
        }
    }
}

#[tonic::async_trait]
impl AnalyticsService for AnalyticsServiceImpl {
    #[instrument(skip(self, request))]
    async fn detect_anomalies(
        &self,
        request: Request<DetectAnomaliesRequest>,
    ) -> Result<Response<DetectAnomaliesResponse>, Status> {
        let start = Instant::now();
        let response = Self::detect(request.into_inner(), start);
        observe(SERVICE, "DetectAnomalies", start, Ok(response))
    }

    async fn health_check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let start = Instant::now();
        observe(
            SERVICE,
            "HealthCheck",
            start,
            Ok(HealthCheckResponse {
                status: ServingStatus::Serving as i32,
            }),
        )
    }
}
