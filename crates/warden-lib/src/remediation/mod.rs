//! Automated remediation of incidents
//!
//! Each incident is diagnosed, and when a safe remedy exists the supervised
//! service is killed, repaired and restarted, then verified by a delayed
//! probe. Anything that cannot be fixed (or whose fix does not hold) is
//! handed to the orchestrator as an escalation request.

mod diagnosis;
mod engine;
mod state;
mod supervisor;


pub use diagnosis::{diagnose, disposition, inspect_manifest, Disposition, ManifestStatus};
pub use engine::{RemediationConfig, RemediationEngine, DEFAULT_MAX_RETAINED_FIXES};
pub use state::{
    RemediationState, RemediationWorkflow, WorkflowEffect, WorkflowEvent, WorkflowTimings,
};
pub use supervisor::{CommandSupervisor, ProcessSupervisor, StartOutcome, SupervisorConfig};
