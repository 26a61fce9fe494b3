//! RulesService 实现
//!
//! 事件评估与规则管理。规则写入统一经过仓储，由仓储负责缓存失效。
//! 未配置数据库时评估返回空结果，规则管理接口返回 UNAVAILABLE。

use std::sync::Arc;
use std::time::Instant;
use telemetryx_proto::health_check_response::ServingStatus;
use telemetryx_proto::rules_service_server::RulesService;
use telemetryx_proto::{
    CreateRuleRequest, CreateRuleResponse, DeleteRuleRequest, DeleteRuleResponse,
    EvaluateRequest, EvaluateResponse, GetRuleRequest, GetRuleResponse, HealthCheckRequest,
    HealthCheckResponse, ListEnabledRulesRequest, ListEnabledRulesResponse, TestRuleRequest,
    TestRuleResponse, UpdateRuleRequest, UpdateRuleResponse,
};
use tonic::{Request, Response, Status};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{convert, observe};
use crate::context::AppContext;
use crate::engine::{RuleOutcome, RulesEngine};
use crate::error::RuleError;
use crate::repository::RulesRepository;
use crate::validator::RuleValidator;

const SERVICE: &str = "RulesService";

pub struct RulesServiceImpl {
    repository: Option<Arc<RulesRepository>>,
    context: Option<Arc<AppContext>>,
    engine: RulesEngine,
    validator: RuleValidator,
}

impl RulesServiceImpl {
    pub fn new(repository: Option<Arc<RulesRepository>>) -> Self {
        Self {
            repository,
            context: None,
            engine: RulesEngine::new(),
            validator: RuleValidator::new(),
        }
    }

    /// 从进程上下文构建，健康检查反映数据库状态
    pub fn from_context(context: Arc<AppContext>) -> Self {
        let repository = context.rules_repository().map(Arc::new);
        Self {
            context: Some(context),
            ..Self::new(repository)
        }
    }

    fn repository(&self) -> Result<&RulesRepository, Status> {
        self.repository
            .as_deref()
            .ok_or_else(|| RuleError::StoreUnavailable.into())
    }

    fn required_rule(rule: Option<telemetryx_proto::Rule>) -> Result<telemetryx_proto::Rule, Status> {
        rule.ok_or_else(|| Status::invalid_argument("规则不能为空"))
    }

    fn required_id(raw: &str) -> Result<Uuid, Status> {
        convert::parse_rule_id(raw, "rule_id")?
            .ok_or_else(|| Status::invalid_argument("规则 ID 不能为空"))
    }

    // ==================== 处理逻辑 ====================

    async fn do_evaluate(&self, req: EvaluateRequest, start: Instant) -> Result<EvaluateResponse, Status> {
        let proto_event = req
            .event
            .ok_or_else(|| Status::invalid_argument("事件不能为空"))?;

        info!(
            event_id = %proto_event.id,
            event_type = %proto_event.event_type,
            "Evaluating event"
        );

        let event = convert::event_to_value(&proto_event);
        let rules = match &self.repository {
            Some(repo) => repo.get_enabled_rules().await?,
            None => Vec::new(),
        };

        let matches = self.engine.evaluate(&event, &rules);
        let elapsed_ms = start.elapsed().as_millis() as i64;

        info!(
            event_id = %proto_event.id,
            matches_count = matches.len(),
            elapsed_ms,
            "Evaluation complete"
        );

        Ok(EvaluateResponse {
            matches: matches.iter().map(convert::rule_match_to_proto).collect(),
            evaluation_time_ms: elapsed_ms,
        })
    }

    async fn do_create(&self, req: CreateRuleRequest) -> Result<CreateRuleResponse, Status> {
        let mut rule = convert::rule_from_proto(&Self::required_rule(req.rule)?)?;
        rule.id = None;
        self.validator.validate(&rule)?;

        let created = self.repository()?.create(&rule).await?;
        info!(rule_id = ?created.id, name = %created.name, "Rule created");

        Ok(CreateRuleResponse {
            rule: Some(convert::rule_to_proto(&created)),
        })
    }

    async fn do_get(&self, req: GetRuleRequest) -> Result<GetRuleResponse, Status> {
        let id = Self::required_id(&req.rule_id)?;
        let rule = self
            .repository()?
            .get_by_id(id)
            .await?
            .ok_or_else(|| Status::not_found(format!("规则不存在: {}", id)))?;

        Ok(GetRuleResponse {
            rule: Some(convert::rule_to_proto(&rule)),
        })
    }

    async fn do_update(&self, req: UpdateRuleRequest) -> Result<UpdateRuleResponse, Status> {
        let rule = convert::rule_from_proto(&Self::required_rule(req.rule)?)?;
        let id = rule
            .id
            .ok_or_else(|| Status::invalid_argument("规则 ID 不能为空"))?;
        self.validator.validate(&rule)?;

        let updated = self
            .repository()?
            .update(&rule)
            .await?
            .ok_or_else(|| Status::not_found(format!("规则不存在: {}", id)))?;
        info!(rule_id = %id, "Rule updated");

        Ok(UpdateRuleResponse {
            rule: Some(convert::rule_to_proto(&updated)),
        })
    }

    async fn do_delete(&self, req: DeleteRuleRequest) -> Result<DeleteRuleResponse, Status> {
        let id = Self::required_id(&req.rule_id)?;
        let deleted = self.repository()?.delete(id).await?;
        info!(rule_id = %id, deleted, "Rule delete processed");

        Ok(DeleteRuleResponse { deleted })
    }

    async fn do_list_enabled(&self) -> Result<ListEnabledRulesResponse, Status> {
        let rules = self.repository()?.get_enabled_rules().await?;

        Ok(ListEnabledRulesResponse {
            rules: rules.iter().map(convert::rule_to_proto).collect(),
        })
    }

    fn do_test(&self, req: TestRuleRequest, start: Instant) -> Result<TestRuleResponse, Status> {
        let mut rule = convert::rule_from_proto(&Self::required_rule(req.rule)?)?;
        let proto_event = req
            .event
            .ok_or_else(|| Status::invalid_argument("事件不能为空"))?;
        self.validator.validate(&rule)?;

        // 未保存的规则没有 ID，试运行时用空 UUID 代替
        rule.id.get_or_insert(Uuid::nil());

        let event = convert::event_to_value(&proto_event);
        let outcome = self.engine.evaluate_rule(&event, &rule);
        let evaluation_time_ms = start.elapsed().as_millis() as i64;

        let response = match outcome {
            RuleOutcome::Matched(m) => TestRuleResponse {
                matched: true,
                r#match: Some(convert::rule_match_to_proto(&m)),
                skipped_reason: String::new(),
                evaluation_time_ms,
            },
            RuleOutcome::NotMatched => TestRuleResponse {
                matched: false,
                r#match: None,
                skipped_reason: String::new(),
                evaluation_time_ms,
            },
            RuleOutcome::Skipped(e) => TestRuleResponse {
                matched: false,
                r#match: None,
                skipped_reason: e.to_string(),
                evaluation_time_ms,
            },
        };

        Ok(response)
    }

    async fn do_health_check(&self) -> HealthCheckResponse {
        let healthy = match &self.context {
            Some(ctx) => ctx.is_store_healthy().await,
            None => true,
        };

        let status = if healthy {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        };

        HealthCheckResponse {
            status: status as i32,
        }
    }
}

#[tonic::async_trait]
impl RulesService for RulesServiceImpl {
    #[instrument(skip(self, request))]
    async fn evaluate_event(
        &self,
        request: Request<EvaluateRequest>,
    ) -> Result<Response<EvaluateResponse>, Status> {
        let start = Instant::now();
        let result = self.do_evaluate(request.into_inner(), start).await;
        observe(SERVICE, "EvaluateEvent", start, result)
    }

    #[instrument(skip(self, request))]
    async fn create_rule(
        &self,
        request: Request<CreateRuleRequest>,
    ) -> Result<Response<CreateRuleResponse>, Status> {
        let start = Instant::now();
        let result = self.do_create(request.into_inner()).await;
        observe(SERVICE, "CreateRule", start, result)
    }

    #[instrument(skip(self, request))]
    async fn get_rule(
        &self,
        request: Request<GetRuleRequest>,
    ) -> Result<Response<GetRuleResponse>, Status> {
        let start = Instant::now();
        let result = self.do_get(request.into_inner()).await;
        observe(SERVICE, "GetRule", start, result)
    }

    #[instrument(skip(self, request))]
    async fn update_rule(
        &self,
        request: Request<UpdateRuleRequest>,
    ) -> Result<Response<UpdateRuleResponse>, Status> {
        let start = Instant::now();
        let result = self.do_update(request.into_inner()).await;
        observe(SERVICE, "UpdateRule", start, result)
    }

    #[instrument(skip(self, request))]
    async fn delete_rule(
        &self,
        request: Request<DeleteRuleRequest>,
    ) -> Result<Response<DeleteRuleResponse>, Status> {
        let start = Instant::now();
        let result = self.do_delete(request.into_inner()).await;
        observe(SERVICE, "DeleteRule", start, result)
    }

    #[instrument(skip(self, _request))]
    async fn list_enabled_rules(
        &self,
        _request: Request<ListEnabledRulesRequest>,
    ) -> Result<Response<ListEnabledRulesResponse>, Status> {
        let start = Instant::now();
        let result = self.do_list_enabled().await;
        observe(SERVICE, "ListEnabledRules", start, result)
    }

    #[instrument(skip(self, request))]
    async fn test_rule(
        &self,
        request: Request<TestRuleRequest>,
    ) -> Result<Response<TestRuleResponse>, Status> {
        let start = Instant::now();
        let result = self.do_test(request.into_inner(), start);
        observe(SERVICE, "TestRule", start, result)
    }

    async fn health_check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let start = Instant::now();
        let response = self.do_health_check().await;
        observe(SERVICE, "HealthCheck", start, Ok(response))
    }
}
