//! Multi-party approval for flagged operations.
//!
//! When the compliance gate requires approval, the engine parks the
//! transaction behind an `ApprovalWorkflow`. This module owns the workflow
//! state machine:
//!
//! - `types` - Workflow domain types (ApprovalWorkflow, WorkflowStatus)
//! - `error` - Workflow-specific error types
//! - `service` - State transition logic and approver checks

pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;

pub use error::WorkflowError;
pub use service::WorkflowService;
pub use types::{Approval, ApprovalProgress, ApprovalType, ApprovalWorkflow, WorkflowStatus};
