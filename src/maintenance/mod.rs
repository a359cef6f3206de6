//! Scheduling and safety core of repository maintenance.
//!
//! [`run_exclusive`] decides whether maintenance is due, serializes local
//! runs and advances the schedule; [`run`] then executes the quick or full
//! cycle, gating every destructive task on the run history kept in the
//! [`Schedule`].

mod context;
mod error;
mod exclusive;
mod lock;
mod mode;
mod params;
pub mod policy;
mod report;
mod run;
mod safety;
mod schedule;
mod task;

pub use context::MaintenanceContext;
pub use error::MaintenanceError;
pub use exclusive::{check_clock_skew_bounds, run_exclusive, RunParameters, MAX_CLOCK_SKEW};
pub use lock::{lock_file_path, MaintenanceLock, LOCK_FILE_SUFFIX};
pub use mode::Mode;
pub use params::{get_params, set_params, CycleParams, LogRetentionOptions, Params, PARAMS_BLOB_ID};
pub use report::report_run;
pub use run::run;
pub use safety::{SafetyParameters, SAFETY_FULL, SAFETY_NONE};
pub use schedule::{
    get_schedule, set_schedule, RunInfo, Schedule, MAX_RETAINED_RUN_INFO_PER_TASK,
    SCHEDULE_BLOB_ID,
};
pub use task::TaskType;
