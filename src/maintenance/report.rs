use super::context::MaintenanceContext;
use super::error::MaintenanceError;
use super::schedule::{set_schedule, RunInfo, Schedule};
use super::task::TaskType;
use crate::repo::DirectRepository;
use tracing::{error, info, warn};

/// Runs one task and records its outcome in `schedule`.
///
/// The outcome is persisted before this returns, failed or not, so later
/// decisions in the same cycle see it. A task that fails is returned as
/// [`MaintenanceError::Task`]. Nothing is recorded when the context is
/// cancelled before the task starts.
pub fn report_run<T, F>(
    ctx: &MaintenanceContext,
    rep: &dyn DirectRepository,
    task: TaskType,
    schedule: &mut Schedule,
    f: F,
) -> Result<T, MaintenanceError>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    if ctx.is_cancelled() {
        return Err(MaintenanceError::Cancelled);
    }

    let start = rep.time();
    let result = f();
    let end = rep.time();

    let run = match &result {
        Ok(_) => {
            info!(task = %task, elapsed_ms = (end - start).num_milliseconds(), "task finished");
            RunInfo {
                start,
                end,
                success: true,
                error: None,
            }
        }
        Err(err) => {
            warn!(task = %task, "task failed: {:#}", err);
            RunInfo {
                start,
                end,
                success: false,
                error: Some(format!("{:#}", err)),
            }
        }
    };

    schedule.append_run(task.clone(), run);
    if let Err(e) = set_schedule(rep.blob_store(), schedule) {
        let e = match &result {
            Ok(_) => e,
            Err(task_err) => {
                error!(task = %task, "task failure not recorded: {:#}", task_err);
                e.context(format!("{} failed: {:#}", task, task_err))
            }
        };
        return Err(MaintenanceError::storage("unable to save schedule", e));
    }

    result.map_err(|source| MaintenanceError::Task { task, source })
}
