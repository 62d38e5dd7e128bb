//! Job and step identity types.
//!
//! Jobs and steps are owned by the surrounding daemon; the accounting core
//! receives them by reference in lifecycle hooks and never mutates their
//! identity fields. Backends read them for bookkeeping only.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u32);

impl JobId {
    /// Get the underlying numeric id
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a step within a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId {
    /// The owning job
    pub job: JobId,
    /// Step index within the job
    pub step: u32,
}

impl StepId {
    /// Create a step id from its job id and step index
    pub fn new(job: JobId, step: u32) -> Self {
        StepId { job, step }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.job, self.step)
    }
}

/// Externally supplied job handle passed into lifecycle hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier
    pub job_id: JobId,
    /// Numeric uid of the submitting user
    pub user_id: u32,
    /// Job name as submitted
    pub name: String,
    /// Partition the job was scheduled into
    pub partition: String,
    /// Number of allocated nodes
    pub node_count: u32,
    /// Submission time
    pub submit_time: DateTime<Utc>,
    /// Start time, if the job has started
    pub start_time: Option<DateTime<Utc>>,
    /// End time, if the job has completed
    pub end_time: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a job handle with the given identity, submitted now
    pub fn new(job_id: JobId, user_id: u32, name: impl Into<String>) -> Self {
        JobRecord {
            job_id,
            user_id,
            name: name.into(),
            partition: String::new(),
            node_count: 1,
            submit_time: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }
}

/// Externally supplied step handle passed into lifecycle hooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step identifier
    pub step_id: StepId,
    /// Step name
    pub name: String,
    /// Number of tasks launched by the step
    pub task_count: u32,
    /// Start time, if the step has started
    pub start_time: Option<DateTime<Utc>>,
    /// End time, if the step has completed
    pub end_time: Option<DateTime<Utc>>,
}

impl StepRecord {
    /// Create a step handle with the given identity
    pub fn new(step_id: StepId, name: impl Into<String>) -> Self {
        StepRecord {
            step_id,
            name: name.into(),
            task_count: 1,
            start_time: None,
            end_time: None,
        }
    }
}
