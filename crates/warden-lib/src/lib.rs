//! Self-healing monitor library for a single local service
//!
//! This crate provides the core functionality for:
//! - Health probing and incident detection
//! - Diagnosis, automated remediation and fix verification
//! - Status reporting and human escalation
//! - A durable audit trail with rotation
//! - Health checks and observability of the pipeline itself

pub mod audit;
pub mod error;
pub mod events;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod orchestrator;
pub mod remediation;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditConfig, AuditFailure, AuditStore};
pub use error::{AuditError, FixError, TransitionError};
pub use events::{
    Escalation, EscalationReason, MonitorEvent, OrchestratorEvent, RemediationEvent,
    SupervisorEvent, WardenEvent,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, WardenMetrics};
pub use orchestrator::{DetailedReport, Orchestrator, OrchestratorConfig, WardenConfig};
