//! Saga instance/step domain types and their diesel rows (spec.md
//! section 3, "Saga instance" / "Saga step record").

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use media_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::{saga_steps, sagas};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Started,
    InProgress,
    Compensating,
    Completed,
    Failed,
}

impl SagaStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "started",
            SagaStatus::InProgress => "in_progress",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(SagaStatus::Started),
            "in_progress" => Ok(SagaStatus::InProgress),
            "compensating" => Ok(SagaStatus::Compensating),
            "completed" => Ok(SagaStatus::Completed),
            "failed" => Ok(SagaStatus::Failed),
            other => Err(CoreError::internal(format!("unknown saga status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Compensating,
    Compensated,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Executing => "executing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Compensating => "compensating",
            StepStatus::Compensated => "compensated",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "executing" => Ok(StepStatus::Executing),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "compensating" => Ok(StepStatus::Compensating),
            "compensated" => Ok(StepStatus::Compensated),
            other => Err(CoreError::internal(format!("unknown step status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = sagas)]
pub struct SagaRow {
    pub id: Uuid,
    pub saga_type: String,
    pub current_step: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sagas)]
pub struct NewSagaRow {
    pub id: Uuid,
    pub saga_type: String,
    pub current_step: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = saga_steps)]
pub struct SagaStepRow {
    pub id: Uuid,
    pub saga_id: Uuid,
    pub step_name: String,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = saga_steps)]
pub struct NewSagaStepRow {
    pub id: Uuid,
    pub saga_id: Uuid,
    pub step_name: String,
    pub status: String,
    pub retry_count: i32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key used inside `payload` to record which aggregate this saga tracks,
/// so a future trigger event can be matched back to it.
pub const PAYLOAD_AGGREGATE_ID_KEY: &str = "aggregate_id";
