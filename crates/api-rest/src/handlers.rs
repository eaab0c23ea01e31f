//! REST handlers.

use crate::error::{from_core, no_standard, ApiError};
use crate::AppState;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
};
use lims_core::breakpoints::{
    BreakpointChange, BreakpointStandard, BreakpointUpdate, NewBreakpointStandard, TestMethod,
};
use lims_core::rules::{ExpertRule, NewExpertRule, RuleEvaluationContext, ValidationResult};
use lims_core::{InterpretationRequest, InterpretationResult, LabResult};
use lims_types::{DrugId, MicroorganismId, RuleId, StandardId};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Selects the standards of one organism and drug.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BreakpointQuery {
    #[param(value_type = String)]
    pub microorganism_id: MicroorganismId,
    #[param(value_type = String)]
    pub drug_id: DrugId,
    pub method: Option<TestMethod>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RuleListQuery {
    /// Include retired rules.
    #[serde(default)]
    pub include_retired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LabResultInterpretRes {
    pub lab_result: LabResult,
    pub interpretation: InterpretationResult,
}

fn parse_standard_id(id: &str) -> Result<StandardId, ApiError> {
    StandardId::parse(id).map_err(|e| {
        tracing::error!("Invalid standard id: {:?}", e);
        (StatusCode::BAD_REQUEST, "Invalid standard id".to_string())
    })
}

fn parse_rule_id(id: &str) -> Result<RuleId, ApiError> {
    RuleId::parse(id).map_err(|e| {
        tracing::error!("Invalid rule id: {:?}", e);
        (StatusCode::BAD_REQUEST, "Invalid rule id".to_string())
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
pub(crate) async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "LIMS REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/interpret",
    request_body = InterpretationRequest,
    responses(
        (status = 200, description = "Interpreted and validated result", body = InterpretationResult),
        (status = 400, description = "Unusable measurement or incomplete standard"),
        (status = 404, description = "No applicable breakpoint standard"),
        (status = 500, description = "Internal server error")
    )
)]
/// Interpret a measurement against the applicable standard and run the expert rules.
///
/// The latest active standard is used unless the request names a year.
#[axum::debug_handler]
pub(crate) async fn interpret(
    State(state): State<AppState>,
    Json(req): Json<InterpretationRequest>,
) -> Result<Json<InterpretationResult>, ApiError> {
    state
        .interpretation
        .interpret_and_validate(&req)
        .map_err(|e| from_core("Interpret", e))?
        .map(Json)
        .ok_or_else(no_standard)
}

#[utoipa::path(
    get,
    path = "/breakpoints",
    params(BreakpointQuery),
    responses(
        (status = 200, description = "Active and retired standards", body = [BreakpointStandard]),
        (status = 500, description = "Internal server error")
    )
)]
/// List every stored standard for an organism and drug, optionally for one year.
#[axum::debug_handler]
pub(crate) async fn list_breakpoints(
    State(state): State<AppState>,
    Query(q): Query<BreakpointQuery>,
) -> Result<Json<Vec<BreakpointStandard>>, ApiError> {
    let standards = state
        .interpretation
        .breakpoints()
        .list_for(&q.microorganism_id, &q.drug_id, q.year)
        .map_err(|e| from_core("List breakpoints", e))?;
    Ok(Json(
        standards
            .into_iter()
            .filter(|s| q.method.map_or(true, |m| s.method == m))
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/breakpoints",
    request_body = NewBreakpointStandard,
    responses(
        (status = 201, description = "Standard created", body = BreakpointStandard),
        (status = 400, description = "Invalid year or bounds"),
        (status = 409, description = "An active standard already exists for this key"),
        (status = 500, description = "Internal server error")
    )
)]
/// Register a new breakpoint standard.
#[axum::debug_handler]
pub(crate) async fn create_breakpoint(
    State(state): State<AppState>,
    Json(req): Json<NewBreakpointStandard>,
) -> Result<(StatusCode, Json<BreakpointStandard>), ApiError> {
    let standard = state
        .interpretation
        .breakpoints()
        .create(req)
        .map_err(|e| from_core("Create breakpoint", e))?;
    Ok((StatusCode::CREATED, Json(standard)))
}

#[utoipa::path(
    get,
    path = "/breakpoints/latest",
    params(BreakpointQuery),
    responses(
        (status = 200, description = "Active standard with the greatest year", body = BreakpointStandard),
        (status = 404, description = "No applicable breakpoint standard"),
        (status = 500, description = "Internal server error")
    )
)]
/// Fetch the latest active standard; with `year`, the active standard for that year.
#[axum::debug_handler]
pub(crate) async fn latest_breakpoint(
    State(state): State<AppState>,
    Query(q): Query<BreakpointQuery>,
) -> Result<Json<BreakpointStandard>, ApiError> {
    let breakpoints = state.interpretation.breakpoints();
    let found = match q.year {
        Some(year) => breakpoints.for_year(&q.microorganism_id, &q.drug_id, year, q.method),
        None => breakpoints.latest(&q.microorganism_id, &q.drug_id, q.method),
    }
    .map_err(|e| from_core("Latest breakpoint", e))?;
    found.map(Json).ok_or_else(no_standard)
}

#[utoipa::path(
    get,
    path = "/breakpoints/compare",
    params(BreakpointQuery),
    responses(
        (status = 200, description = "Changes between consecutive years", body = [BreakpointChange]),
        (status = 500, description = "Internal server error")
    )
)]
/// Year-over-year changes of the active standards.
#[axum::debug_handler]
pub(crate) async fn compare_breakpoints(
    State(state): State<AppState>,
    Query(q): Query<BreakpointQuery>,
) -> Result<Json<Vec<BreakpointChange>>, ApiError> {
    state
        .interpretation
        .breakpoints()
        .compare(&q.microorganism_id, &q.drug_id, q.method)
        .map(Json)
        .map_err(|e| from_core("Compare breakpoints", e))
}

#[utoipa::path(
    put,
    path = "/breakpoints/{id}",
    params(("id" = String, Path, description = "Standard id")),
    request_body = BreakpointUpdate,
    responses(
        (status = 200, description = "Standard updated", body = BreakpointStandard),
        (status = 400, description = "Invalid bounds"),
        (status = 404, description = "Unknown standard"),
        (status = 500, description = "Internal server error")
    )
)]
/// Replace the bounds, notes and source document of a standard.
#[axum::debug_handler]
pub(crate) async fn update_breakpoint(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<BreakpointUpdate>,
) -> Result<Json<BreakpointStandard>, ApiError> {
    let id = parse_standard_id(&id)?;
    state
        .interpretation
        .breakpoints()
        .update(&id, req)
        .map(Json)
        .map_err(|e| from_core("Update breakpoint", e))
}

#[utoipa::path(
    delete,
    path = "/breakpoints/{id}",
    params(("id" = String, Path, description = "Standard id")),
    responses(
        (status = 200, description = "Standard retired", body = BreakpointStandard),
        (status = 404, description = "Unknown standard"),
        (status = 500, description = "Internal server error")
    )
)]
/// Retire a standard. Retired standards stay listed but are never used for interpretation.
#[axum::debug_handler]
pub(crate) async fn retire_breakpoint(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<BreakpointStandard>, ApiError> {
    let id = parse_standard_id(&id)?;
    state
        .interpretation
        .breakpoints()
        .retire(&id)
        .map(Json)
        .map_err(|e| from_core("Retire breakpoint", e))
}

#[utoipa::path(
    get,
    path = "/expert-rules",
    params(RuleListQuery),
    responses(
        (status = 200, description = "Expert rules", body = [ExpertRule]),
        (status = 500, description = "Internal server error")
    )
)]
/// List expert rules.
#[axum::debug_handler]
pub(crate) async fn list_rules(
    State(state): State<AppState>,
    Query(q): Query<RuleListQuery>,
) -> Result<Json<Vec<ExpertRule>>, ApiError> {
    state
        .rules
        .list(q.include_retired)
        .map(Json)
        .map_err(|e| from_core("List expert rules", e))
}

#[utoipa::path(
    post,
    path = "/expert-rules",
    request_body = NewExpertRule,
    responses(
        (status = 201, description = "Rule created", body = ExpertRule),
        (status = 400, description = "Invalid condition, action or scope"),
        (status = 500, description = "Internal server error")
    )
)]
/// Create an expert rule. The condition is parsed and type-checked before it is stored.
#[axum::debug_handler]
pub(crate) async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<NewExpertRule>,
) -> Result<(StatusCode, Json<ExpertRule>), ApiError> {
    let rule = state
        .rules
        .create(req)
        .map_err(|e| from_core("Create expert rule", e))?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[utoipa::path(
    put,
    path = "/expert-rules/{id}",
    params(("id" = String, Path, description = "Rule id")),
    request_body = NewExpertRule,
    responses(
        (status = 200, description = "Rule updated", body = ExpertRule),
        (status = 400, description = "Invalid condition, action or scope"),
        (status = 404, description = "Unknown rule"),
        (status = 500, description = "Internal server error")
    )
)]
/// Replace the definition of an expert rule.
#[axum::debug_handler]
pub(crate) async fn update_rule(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<NewExpertRule>,
) -> Result<Json<ExpertRule>, ApiError> {
    let id = parse_rule_id(&id)?;
    state
        .rules
        .update(&id, req)
        .map(Json)
        .map_err(|e| from_core("Update expert rule", e))
}

#[utoipa::path(
    delete,
    path = "/expert-rules/{id}",
    params(("id" = String, Path, description = "Rule id")),
    responses(
        (status = 200, description = "Rule retired", body = ExpertRule),
        (status = 404, description = "Unknown rule"),
        (status = 500, description = "Internal server error")
    )
)]
/// Retire an expert rule.
#[axum::debug_handler]
pub(crate) async fn retire_rule(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ExpertRule>, ApiError> {
    let id = parse_rule_id(&id)?;
    state
        .rules
        .retire(&id)
        .map(Json)
        .map_err(|e| from_core("Retire expert rule", e))
}

#[utoipa::path(
    post,
    path = "/expert-rules/validate",
    request_body = RuleEvaluationContext,
    responses(
        (status = 200, description = "Outcome of the applicable rules", body = ValidationResult),
        (status = 500, description = "Internal server error")
    )
)]
/// Run the applicable expert rules over an already interpreted result.
#[axum::debug_handler]
pub(crate) async fn validate_rules(
    State(state): State<AppState>,
    Json(ctx): Json<RuleEvaluationContext>,
) -> Result<Json<ValidationResult>, ApiError> {
    state
        .interpretation
        .evaluator()
        .validate_result(&ctx)
        .map(Json)
        .map_err(|e| from_core("Validate result", e))
}

#[utoipa::path(
    post,
    path = "/lab-results/interpret",
    request_body = LabResult,
    responses(
        (status = 200, description = "Lab result with the interpretation written back", body = LabResultInterpretRes),
        (status = 400, description = "Unusable measurement"),
        (status = 404, description = "No applicable breakpoint standard"),
        (status = 409, description = "Lab result already finalised"),
        (status = 500, description = "Internal server error")
    )
)]
/// Interpret a lab result and return it with the outcome written back.
///
/// The lab result is not stored; persisting it is the caller's concern.
#[axum::debug_handler]
pub(crate) async fn interpret_lab_result(
    State(state): State<AppState>,
    Json(mut lab_result): Json<LabResult>,
) -> Result<Json<LabResultInterpretRes>, ApiError> {
    let interpretation = state
        .interpretation
        .interpret_lab_result(&mut lab_result)
        .map_err(|e| from_core("Interpret lab result", e))?
        .ok_or_else(no_standard)?;
    Ok(Json(LabResultInterpretRes {
        lab_result,
        interpretation,
    }))
}
