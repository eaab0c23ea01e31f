//! Breakpoint standards: records, interpretation, resolution and year-over-year comparison.

pub mod interpreter;
pub mod model;
pub mod service;
pub mod versions;

pub use interpreter::{calculate_confidence, interpret, InterpretError, Interpretation};
pub use model::{
    BreakpointBounds, BreakpointStandard, BreakpointUpdate, Confidence, NewBreakpointStandard,
    SensitivityResult, TestMethod,
};
pub use service::{select_latest, BreakpointService};
pub use versions::{compare, BreakpointChange, ChangeType};
