//! HTTP 接口
//!
//! 提供规则创建、查询、组合和评估的 REST API。

use crate::engine::RuleEngine;
use crate::error::RuleError;
use crate::models::{DataContext, Node, Rule};
use crate::store::RuleRepository;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use validator::Validate;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RuleEngine<Arc<dyn RuleRepository>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn RuleRepository>) -> Self {
        Self {
            engine: Arc::new(RuleEngine::new(store)),
        }
    }
}

// ==================== 请求 / 响应 ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 200, message = "规则名称长度必须在1-200个字符之间"))]
    pub name: String,
    #[serde(alias = "ruleExpression", alias = "rule_expression")]
    #[validate(length(min = 1, message = "规则表达式不能为空"))]
    pub rule_string: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CombineRulesRequest {
    #[validate(length(max = 256, message = "规则 id 列表最多 256 个"))]
    pub rule_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EvaluateRuleRequest {
    #[validate(length(min = 1, max = 256, message = "规则 id 列表必须包含1-256个 id"))]
    pub rule_ids: Vec<String>,
    pub user_data: Map<String, Value>,
}

/// 规则及其引用的字段
#[derive(Debug, Serialize)]
pub struct RuleResponse {
    #[serde(flatten)]
    pub rule: Rule,
    pub fields: BTreeSet<String>,
}

impl From<Rule> for RuleResponse {
    fn from(rule: Rule) -> Self {
        let fields = rule.ast.fields();
        Self { rule, fields }
    }
}

#[derive(Debug, Serialize)]
pub struct CombineRulesResponse {
    pub ast: Option<Node>,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse<T> {
    pub results: T,
}

// ==================== 错误映射 ====================

impl RuleError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Syntax(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RuleNotFound(_) => StatusCode::NOT_FOUND,
            Self::Format(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "SYNTAX_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::Format(_) => "FORMAT_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for RuleError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl IntoResponse for RuleError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 服务端错误只记录日志，不向客户端暴露细节
        let message = if status.is_server_error() {
            error!(error = %self, "请求处理失败");
            "服务器内部错误".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "code": self.error_code(),
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

// ==================== 处理器 ====================

/// POST /api/create_rule
pub async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse, RuleError> {
    req.validate()?;

    let rule = state.engine.create_rule(&req.name, &req.rule_string)?;
    info!(rule_id = %rule.id, rule_name = %rule.name, "Rule created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Rule created successfully",
            "rule": RuleResponse::from(rule),
        })),
    ))
}

/// GET /api/get_rules
pub async fn get_rules(State(state): State<AppState>) -> Result<impl IntoResponse, RuleError> {
    let rules: Vec<RuleResponse> = state
        .engine
        .rules()?
        .into_iter()
        .map(RuleResponse::from)
        .collect();

    Ok(Json(json!({ "rules": rules })))
}

/// POST /api/combine_rules
pub async fn combine_rules(
    State(state): State<AppState>,
    Json(req): Json<CombineRulesRequest>,
) -> Result<Json<CombineRulesResponse>, RuleError> {
    req.validate()?;
    let ast = state.engine.combine_rules(&req.rule_ids)?;
    Ok(Json(CombineRulesResponse { ast }))
}

/// POST /api/evaluate_rule：组合后评估，返回单个布尔值
pub async fn evaluate_rule(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRuleRequest>,
) -> Result<Json<EvaluateResponse<bool>>, RuleError> {
    req.validate()?;
    let context = DataContext::from_json_map(&req.user_data)?;

    let results = state.engine.evaluate_combined(&req.rule_ids, &context)?;
    Ok(Json(EvaluateResponse { results }))
}

/// POST /api/evaluate_each：逐条评估，返回 id 到布尔值的映射
pub async fn evaluate_each(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRuleRequest>,
) -> Result<Json<EvaluateResponse<BTreeMap<String, bool>>>, RuleError> {
    req.validate()?;
    let context = DataContext::from_json_map(&req.user_data)?;

    let results = state.engine.evaluate_each(&req.rule_ids, &context)?;
    Ok(Json(EvaluateResponse { results }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ==================== 路由 ====================

/// 构建规则 API 路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/create_rule", post(create_rule))
        .route("/get_rules", get(get_rules))
        .route("/combine_rules", post(combine_rules))
        .route("/evaluate_rule", post(evaluate_rule))
        .route("/evaluate_each", post(evaluate_each))
}

/// 构建完整应用路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(health_check))
        .with_state(state)
}

/// 根据允许的来源列表构建 CORS 层，`*` 表示允许所有来源
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
