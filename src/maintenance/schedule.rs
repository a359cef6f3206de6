//! Persisted maintenance schedule and run history.

use super::task::TaskType;
use crate::blob::BlobStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known blob holding the [`Schedule`].
pub const SCHEDULE_BLOB_ID: &str = "maintenance.schedule";

/// Number of runs kept in history for each task type.
pub const MAX_RETAINED_RUN_INFO_PER_TASK: usize = 5;

/// One execution of a maintenance task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// When maintenance is next due, and what ran before.
///
/// History for each task is append-only and kept in insertion order, which is
/// chronological. Queries that depend on ordering sort by start time
/// themselves rather than trusting insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// `None` means never scheduled, i.e. due immediately.
    #[serde(
        rename = "nextFullMaintenance",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_full_maintenance_time: Option<DateTime<Utc>>,

    #[serde(
        rename = "nextQuickMaintenance",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_quick_maintenance_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub(crate) runs: BTreeMap<TaskType, Vec<RunInfo>>,
}

impl Schedule {
    /// Runs recorded for a task, oldest first.
    pub fn runs(&self, task: &TaskType) -> &[RunInfo] {
        self.runs.get(task).map(Vec::as_slice).unwrap_or_default()
    }

    /// All task types with recorded history.
    pub fn task_types(&self) -> impl Iterator<Item = &TaskType> {
        self.runs.keys()
    }

    /// Appends a run to a task's history, dropping the oldest entries beyond
    /// [`MAX_RETAINED_RUN_INFO_PER_TASK`].
    pub fn append_run(&mut self, task: TaskType, run: RunInfo) {
        let history = self.runs.entry(task).or_default();
        history.push(run);
        if history.len() > MAX_RETAINED_RUN_INFO_PER_TASK {
            let excess = history.len() - MAX_RETAINED_RUN_INFO_PER_TASK;
            history.drain(..excess);
        }
    }

    /// Latest end time of any successful run of any of the given tasks.
    pub fn latest_successful_end(&self, tasks: &[TaskType]) -> Option<DateTime<Utc>> {
        tasks
            .iter()
            .flat_map(|task| self.runs(task))
            .filter(|run| run.success)
            .map(|run| run.end)
            .max()
    }

    /// Successful runs of a task, most recent start first.
    pub fn successful_runs_descending(&self, task: &TaskType) -> Vec<&RunInfo> {
        let mut runs: Vec<&RunInfo> = self.runs(task).iter().filter(|r| r.success).collect();
        runs.sort_by(|a, b| b.start.cmp(&a.start));
        runs
    }
}

/// Loads the schedule. A repository that never ran maintenance has an empty one.
pub fn get_schedule(blobs: &dyn BlobStore) -> Result<Schedule> {
    let Some(data) = blobs
        .get_blob(SCHEDULE_BLOB_ID)
        .context("error reading schedule blob")?
    else {
        return Ok(Schedule::default());
    };

    serde_json::from_slice(&data).context("malformed maintenance schedule")
}

/// Replaces the persisted schedule.
pub fn set_schedule(blobs: &dyn BlobStore, schedule: &Schedule) -> Result<()> {
    let data = serde_json::to_vec(schedule).context("unable to serialize schedule")?;
    blobs
        .put_blob(SCHEDULE_BLOB_ID, &data)
        .context("unable to write schedule blob")
}
