use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use lims_core::CoreConfig;
use lims_core::breakpoints::BreakpointStandard;
use lims_core::config::{
    auto_validate_from_env_value, data_dir_from_env_value, override_policy_from_env_value,
};
use lims_core::repositories::YamlTable;
use lims_core::rules::ExpertRule;

/// Main entry point for the LIMS interpretation service
///
/// Loads breakpoint standards and expert rules from the data directory and serves the REST API.
///
/// # Environment Variables
/// - `LIMS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `LIMS_DATA_DIR`: Data directory, must already exist (default: "lims_data")
/// - `LIMS_OVERRIDE_RULE_TYPES`: Comma-separated rule types that force a resistant override
/// - `LIMS_AUTO_VALIDATE`: Whether clean high-confidence results are marked validated (default: true)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("lims=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("LIMS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::new(
        data_dir_from_env_value(std::env::var("LIMS_DATA_DIR").ok()),
        override_policy_from_env_value(std::env::var("LIMS_OVERRIDE_RULE_TYPES").ok())?,
        auto_validate_from_env_value(std::env::var("LIMS_AUTO_VALIDATE").ok())?,
    )?);

    let standards = Arc::new(YamlTable::<BreakpointStandard>::open(cfg.data_dir())?);
    let rules = Arc::new(YamlTable::<ExpertRule>::open(cfg.data_dir())?);
    tracing::info!(
        "++ Loaded {} breakpoint standards and {} expert rules from {}",
        standards.all()?.len(),
        rules.all()?.len(),
        cfg.data_dir().display()
    );

    let app = api_rest::router(AppState::new(cfg, standards, rules));

    tracing::info!("++ Starting LIMS REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
