//! Core types for calendar synchronization.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, ValidationError};

/// Result of submitting one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub local_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SyncOutcome {
    pub fn created(
        local_id: impl Into<String>,
        event_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            success: true,
            event_id: Some(event_id.into()),
            error: None,
            summary: Some(summary.into()),
        }
    }

    pub fn failed(
        local_id: impl Into<String>,
        error: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            success: false,
            event_id: None,
            error: Some(error.into()),
            summary: Some(summary.into()),
        }
    }
}

/// Per-task outcomes of one batch, in submission order.
///
/// Every attempted task appears exactly once. Unless `auth_aborted` is set,
/// every submitted task was attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created_count: usize,
    pub results: Vec<SyncOutcome>,
    /// The batch stopped early because the provider rejected the credentials.
    #[serde(default)]
    pub auth_aborted: bool,
}

impl SyncReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No events provided")]
    EmptyBatch,

    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid task: {0}")]
    Validation(#[from] ValidationError),
}
