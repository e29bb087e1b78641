use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::ScenarioId;
use super::lifecycle::LifecycleError;
use super::projection::ProjectionError;
use super::repository::{EstimatesRepository, RepositoryError};
use super::roles::RequestContext;
use super::rules::{Rule, RuleDefinition};
use super::service::{
    CreateScenarioRequest, EstimatesError, EstimatesService, ImportScenarioRequest,
    NewVersionRequest, SaveEditsRequest,
};

pub const ROLE_HEADER: &str = "x-session-role";
pub const USER_HEADER: &str = "x-session-user";

/// Router builder exposing rule authoring, scenario generation, editing and approval.
pub fn estimates_router<R>(service: Arc<EstimatesService<R>>) -> Router
where
    R: EstimatesRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/rules",
            get(list_rules_handler::<R>).post(create_rule_handler::<R>),
        )
        .route("/api/v1/scenarios", post(create_scenario_handler::<R>))
        .route("/api/v1/scenarios/import", post(import_scenario_handler::<R>))
        .route(
            "/api/v1/scenarios/:scenario_id",
            delete(delete_scenario_handler::<R>),
        )
        .route(
            "/api/v1/scenarios/:scenario_id/rows",
            get(rows_handler::<R>).patch(save_rows_handler::<R>),
        )
        .route(
            "/api/v1/scenarios/:scenario_id/versions",
            post(new_version_handler::<R>),
        )
        .route(
            "/api/v1/scenarios/:scenario_id/approve",
            post(approve_handler::<R>),
        )
        .route(
            "/api/v1/scenarios/:scenario_id/summary",
            get(summary_handler::<R>),
        )
        .route(
            "/api/v1/scenarios/:scenario_id/compare/:candidate_id",
            get(compare_handler::<R>),
        )
        .route(
            "/api/v1/actuals/:actual_name/pivot",
            get(actual_pivot_handler::<R>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRulePayload {
    #[serde(default)]
    extra_comment: String,
    rule: serde_json::Value,
}

pub(crate) async fn list_rules_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers).and_then(|ctx| service.applicable_rules(&ctx));
    match result {
        Ok(rules) => {
            let definitions: Vec<_> = rules
                .iter()
                .map(|rule| {
                    json!({
                        "rule": rule.definition(),
                        "owner_role": rule.owner_role,
                        "description": rule.description,
                        "extra_comment": rule.extra_comment,
                    })
                })
                .collect();
            (StatusCode::OK, Json(definitions)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_rule_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Json(payload): Json<CreateRulePayload>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers).and_then(|ctx| -> Result<Rule, EstimatesError> {
        let definition = RuleDefinition::from_value(payload.rule)?;
        service.create_rule(&ctx, definition, &payload.extra_comment)
    });
    match result {
        Ok(rule) => (StatusCode::CREATED, Json(rule)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_scenario_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Json(request): Json<CreateScenarioRequest>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers).and_then(|ctx| service.create_scenario(&ctx, request));
    match result {
        Ok(generated) => (StatusCode::CREATED, Json(generated)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn import_scenario_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Json(request): Json<ImportScenarioRequest>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers).and_then(|ctx| service.import_scenario(&ctx, request));
    match result {
        Ok(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_scenario_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Path(scenario_id): Path<u64>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers)
        .and_then(|ctx| service.delete_scenario_version(&ctx, ScenarioId(scenario_id)));
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn rows_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Path(scenario_id): Path<u64>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers)
        .and_then(|ctx| service.editable_rows(&ctx, ScenarioId(scenario_id)));
    match result {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn save_rows_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Path(scenario_id): Path<u64>,
    Json(request): Json<SaveEditsRequest>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers).and_then(|ctx| {
        service.save_to_current_version(&ctx, ScenarioId(scenario_id), request)
    });
    match result {
        Ok(scenario) => (StatusCode::OK, Json(scenario)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn new_version_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Path(scenario_id): Path<u64>,
    Json(request): Json<NewVersionRequest>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers)
        .and_then(|ctx| service.save_to_new_version(&ctx, ScenarioId(scenario_id), request));
    match result {
        Ok(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Path(scenario_id): Path<u64>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result =
        request_context(&headers).and_then(|ctx| service.approve(&ctx, ScenarioId(scenario_id)));
    match result {
        Ok(scenario) => {
            let payload = json!({
                "scenario": scenario,
                "state": scenario.state(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn summary_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Path(scenario_id): Path<u64>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers)
        .and_then(|ctx| service.scenario_summary(&ctx, ScenarioId(scenario_id)));
    match result {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn compare_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Path((baseline, candidate)): Path<(u64, u64)>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers).and_then(|ctx| {
        service.compare_scenarios(&ctx, ScenarioId(baseline), ScenarioId(candidate))
    });
    match result {
        Ok(comparison) => (StatusCode::OK, Json(comparison)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn actual_pivot_handler<R>(
    State(service): State<Arc<EstimatesService<R>>>,
    headers: HeaderMap,
    Path(actual_name): Path<String>,
) -> Response
where
    R: EstimatesRepository + 'static,
{
    let result = request_context(&headers).and_then(|_| service.actual_pivot(&actual_name));
    match result {
        Ok(pivot) => (StatusCode::OK, Json(pivot)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Caller identity from the session headers set by the identity provider.
pub(crate) fn request_context(headers: &HeaderMap) -> Result<RequestContext, EstimatesError> {
    let user = match header_value(headers, USER_HEADER) {
        "" => "anonymous",
        user => user,
    };
    RequestContext::from_identity(header_value(headers, ROLE_HEADER), user)
        .map_err(EstimatesError::from)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
}

pub(crate) fn status_for(error: &EstimatesError) -> StatusCode {
    match error {
        EstimatesError::Role(_) => StatusCode::FORBIDDEN,
        EstimatesError::Rule(_)
        | EstimatesError::Reference(_)
        | EstimatesError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EstimatesError::Projection(ProjectionError::Overflow { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        EstimatesError::Projection(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EstimatesError::Lifecycle(LifecycleError::ScenarioFinalized { .. })
        | EstimatesError::Repository(RepositoryError::Conflict { .. })
        | EstimatesError::Repository(RepositoryError::Finalized { .. }) => StatusCode::CONFLICT,
        EstimatesError::Lifecycle(LifecycleError::Role(_)) => StatusCode::FORBIDDEN,
        EstimatesError::Repository(RepositoryError::NotFound { .. }) => StatusCode::NOT_FOUND,
        EstimatesError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(error: EstimatesError) -> Response {
    let status = status_for(&error);
    let payload = json!({
        "error": error.to_string(),
    });
    (status, Json(payload)).into_response()
}
