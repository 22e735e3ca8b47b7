//! Pipeline orchestration
//!
//! Aggregates monitor and remediation activity into point-in-time reports,
//! derives the overall status and is the only component that escalates to a
//! human.

mod config;
mod pipeline;
mod policy;
mod status;


pub use config::{OrchestratorConfig, WardenConfig};
pub use pipeline::{DetailedReport, Orchestrator};
pub use policy::{evaluate_escalation, failed_fixes_within, EscalationPolicy};
pub use status::{compute_status, recommendations};
