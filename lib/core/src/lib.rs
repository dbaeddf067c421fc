//! Core domain types and utilities for the copper-relay automation platform.
//!
//! This crate provides the strongly-typed identifiers and the error-handling
//! foundation shared by the workflow engine and the scheduler.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{
    InstanceId, IntegrationAccountId, NodeExecutionId, ScheduledJobId, TriggerId, WorkflowId,
    WorkflowRunId,
};
