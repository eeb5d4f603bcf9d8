//! In-memory progress table for OCR jobs.
//!
//! One entry per document id. The table lives as long as the process and is
//! shared between request handlers (which read it) and the background job
//! tasks (which write it). A single mutex guards the whole map; every method
//! is a short map operation and none of them await while holding the lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle state of an OCR job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Snapshot of a job as seen by pollers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub status: JobStatus,
    /// Percentage in `0..=100`
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Partial update merged into a [`Job`] by [`ProgressStore::set`]
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl JobPatch {
    pub fn running(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            progress: Some(progress.min(100)),
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            progress: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Concurrency-safe job table keyed by document id
#[derive(Default)]
pub struct ProgressStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        // Entries are plain data; a panic mid-update cannot leave one half-written.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current snapshot for `key`; unknown keys read as `idle` with progress 0.
    pub fn get(&self, key: &str) -> Job {
        self.table().get(key).cloned().unwrap_or_default()
    }

    /// Merge `patch` into the stored snapshot and return the result.
    ///
    /// Once a job is completed or failed, further patches are ignored; only
    /// [`ProgressStore::begin`] can move a key out of a terminal state.
    pub fn set(&self, key: &str, patch: JobPatch) -> Job {
        let mut table = self.table();
        let current = table.get(key).cloned().unwrap_or_default();

        if current.status.is_terminal() {
            debug!(key = %key, status = ?current.status, "Ignoring update for finished job");
            return current;
        }

        let now = Utc::now();
        let mut next = current;
        if let Some(status) = patch.status {
            if status.is_active() && next.started_at.is_none() {
                next.started_at = Some(now);
            }
            if status.is_terminal() && next.finished_at.is_none() {
                next.finished_at = Some(now);
            }
            next.status = status;
        }
        if let Some(progress) = patch.progress {
            next.progress = progress.min(100);
        }
        if patch.message.is_some() {
            next.message = patch.message;
        }
        if patch.error.is_some() {
            next.error = patch.error;
        }
        next.updated_at = Some(now);

        table.insert(key.to_string(), next.clone());
        next
    }

    /// Atomically move `key` from idle/completed/failed into `queued`.
    ///
    /// Returns the fresh snapshot on success. If a job is already queued or
    /// running, nothing changes and the existing snapshot comes back as `Err`.
    pub fn begin(&self, key: &str) -> Result<Job, Job> {
        let mut table = self.table();
        if let Some(existing) = table.get(key)
            && existing.status.is_active()
        {
            return Err(existing.clone());
        }

        let now = Utc::now();
        let job = Job {
            status: JobStatus::Queued,
            progress: 0,
            message: Some("Queued".to_string()),
            error: None,
            started_at: Some(now),
            updated_at: Some(now),
            finished_at: None,
        };
        table.insert(key.to_string(), job.clone());
        Ok(job)
    }

    /// Forget everything about `key`.
    pub fn reset(&self, key: &str) {
        self.table().remove(key);
    }

    /// Forget `key` unless a job is queued or running for it; that job's
    /// snapshot comes back as `Err`.
    pub fn reset_unless_active(&self, key: &str) -> Result<(), Job> {
        let mut table = self.table();
        match table.get(key) {
            Some(existing) if existing.status.is_active() => Err(existing.clone()),
            _ => {
                table.remove(key);
                Ok(())
            }
        }
    }
}
