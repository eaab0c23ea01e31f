//! # API REST
//!
//! REST API implementation for the LIMS interpretation core.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)

#![warn(rust_2018_idioms)]

mod error;
mod handlers;

use axum::{
    routing::{get, post, put},
    Router,
};
use lims_core::repositories::{BreakpointStandardRepository, ExpertRuleRepository};
use lims_core::rules::ExpertRuleService;
use lims_core::{CoreConfig, InterpretationService};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use handlers::{BreakpointQuery, HealthRes, LabResultInterpretRes, RuleListQuery};

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    interpretation: InterpretationService,
    rules: ExpertRuleService,
}

impl AppState {
    pub fn new(
        cfg: Arc<CoreConfig>,
        breakpoints: Arc<dyn BreakpointStandardRepository>,
        rules: Arc<dyn ExpertRuleRepository>,
    ) -> Self {
        Self {
            interpretation: InterpretationService::new(cfg, breakpoints, rules.clone()),
            rules: ExpertRuleService::new(rules),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::interpret,
        handlers::list_breakpoints,
        handlers::create_breakpoint,
        handlers::latest_breakpoint,
        handlers::compare_breakpoints,
        handlers::update_breakpoint,
        handlers::retire_breakpoint,
        handlers::list_rules,
        handlers::create_rule,
        handlers::update_rule,
        handlers::retire_rule,
        handlers::validate_rules,
        handlers::interpret_lab_result,
    ),
    components(schemas(
        HealthRes,
        LabResultInterpretRes,
        lims_core::InterpretationRequest,
        lims_core::InterpretationResult,
        lims_core::LabResult,
        lims_core::ValidationStatus,
        lims_core::Lifecycle,
        lims_core::breakpoints::BreakpointStandard,
        lims_core::breakpoints::BreakpointBounds,
        lims_core::breakpoints::NewBreakpointStandard,
        lims_core::breakpoints::BreakpointUpdate,
        lims_core::breakpoints::BreakpointChange,
        lims_core::breakpoints::ChangeType,
        lims_core::breakpoints::TestMethod,
        lims_core::breakpoints::SensitivityResult,
        lims_core::breakpoints::Confidence,
        lims_core::rules::ExpertRule,
        lims_core::rules::NewExpertRule,
        lims_core::rules::RuleType,
        lims_core::rules::RuleEvaluationContext,
        lims_core::rules::RuleEvaluationResult,
        lims_core::rules::ValidationIssue,
        lims_core::rules::ValidationResult,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/interpret", post(handlers::interpret))
        .route(
            "/breakpoints",
            get(handlers::list_breakpoints).post(handlers::create_breakpoint),
        )
        .route("/breakpoints/latest", get(handlers::latest_breakpoint))
        .route("/breakpoints/compare", get(handlers::compare_breakpoints))
        .route(
            "/breakpoints/:id",
            put(handlers::update_breakpoint).delete(handlers::retire_breakpoint),
        )
        .route(
            "/expert-rules",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route("/expert-rules/validate", post(handlers::validate_rules))
        .route(
            "/expert-rules/:id",
            put(handlers::update_rule).delete(handlers::retire_rule),
        )
        .route("/lab-results/interpret", post(handlers::interpret_lab_result))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
