//! # LIMS Core
//!
//! Core business logic for antimicrobial susceptibility interpretation.
//!
//! This crate contains pure data operations and record storage:
//! - Year-versioned CLSI breakpoint standards, interpretation into S/I/R with confidence, and
//!   year-over-year comparison
//! - Expert rules with a typed condition language and a prioritised evaluator
//! - The interpretation pipeline and lab result write-back
//! - In-memory and YAML-directory record tables
//!
//! **No API concerns**: HTTP servers and command line handling belong in `api-rest` and `cli`.

pub mod breakpoints;
pub mod config;
pub mod constants;
pub mod error;
pub mod interpretation;
pub mod lab_result;
pub mod lifecycle;
pub mod repositories;
pub mod rules;
pub mod validation;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use interpretation::{InterpretationRequest, InterpretationResult, InterpretationService};
pub use lab_result::{LabResult, ReviewDecision, ValidationStatus};
pub use lifecycle::Lifecycle;
