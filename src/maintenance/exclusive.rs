//! The single entry point through which maintenance work is started.

use super::context::MaintenanceContext;
use super::error::MaintenanceError;
use super::lock::{lock_file_path, MaintenanceLock};
use super::mode::Mode;
use super::params::{get_params, Params};
use super::policy::should_run;
use super::schedule::{get_schedule, set_schedule, Schedule, SCHEDULE_BLOB_ID};
use crate::clock::add_duration;
use crate::repo::DirectRepository;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, field, info, info_span};
use uuid::Uuid;

/// Largest tolerated difference between the local clock and the repository's.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);

/// Everything a maintenance callback may rely on.
///
/// Only [`run_exclusive`] creates these, and only after ownership, locking,
/// schedule advance and the clock skew check succeeded.
pub struct RunParameters<'a> {
    rep: &'a dyn DirectRepository,

    /// Resolved mode, never [`Mode::Auto`] or [`Mode::None`].
    pub mode: Mode,

    pub params: Params,

    /// Repository time at which the schedule blob was advanced for this run.
    pub maintenance_start_time: DateTime<Utc>,
}

impl<'a> RunParameters<'a> {
    pub fn rep(&self) -> &'a dyn DirectRepository {
        self.rep
    }
}

impl std::fmt::Debug for RunParameters<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunParameters")
            .field("mode", &self.mode)
            .field("params", &self.params)
            .field("maintenance_start_time", &self.maintenance_start_time)
            .finish()
    }
}

/// Runs `callback` while holding the local maintenance lock.
///
/// Returns `Ok(())` without calling `callback` when nothing is due or another
/// local process is already running maintenance. Unless `force` is set, the
/// caller must be the designated maintenance owner.
pub fn run_exclusive<F>(
    ctx: &MaintenanceContext,
    rep: &dyn DirectRepository,
    mode: Mode,
    force: bool,
    callback: F,
) -> Result<(), MaintenanceError>
where
    F: FnOnce(&MaintenanceContext, &RunParameters<'_>) -> Result<(), MaintenanceError>,
{
    if ctx.is_cancelled() {
        return Err(MaintenanceError::Cancelled);
    }

    rep.disable_index_refresh();

    let parent = rep.content_log_span();
    let parent = if parent.is_none() {
        ctx.span().clone()
    } else {
        parent
    };
    let span = info_span!(
        parent: &parent,
        "maintenance",
        run_id = %Uuid::new_v4(),
        mode = field::Empty
    );
    let _entered = span.enter();
    let ctx = ctx.with_span(span.clone());

    let params = get_params(rep.blob_store())
        .map_err(|e| MaintenanceError::storage("unable to get maintenance params", e))?;

    if !force && !params.is_owned_by(&rep.username_at_host()) {
        return Err(MaintenanceError::NotOwned {
            owner: params.owner,
        });
    }

    let mode = match mode {
        Mode::Auto => {
            let schedule = get_schedule(rep.blob_store())
                .map_err(|e| MaintenanceError::storage("unable to get schedule", e))?;
            should_run(&params, &schedule, rep.time())
        }
        other => other,
    };

    if mode == Mode::None {
        debug!("No maintenance is due.");
        return Ok(());
    }
    span.record("mode", mode.as_str());

    let lock_path = lock_file_path(&rep.config_filename());
    let Some(_lock) = MaintenanceLock::try_acquire(&lock_path).map_err(MaintenanceError::Lock)?
    else {
        info!("maintenance is already in progress locally");
        return Ok(());
    };

    update_schedule(rep, &params, mode)
        .map_err(|e| e.context("error updating maintenance schedule"))?;

    let maintenance_start_time = rep
        .blob_store()
        .get_metadata(SCHEDULE_BLOB_ID)
        .map_err(|e| MaintenanceError::storage("error getting maintenance blob time", e))?
        .timestamp;

    check_clock_skew_bounds(ctx.local_clock().now(), maintenance_start_time)
        .map_err(|e| e.context("error checking for clock skew"))?;

    rep.refresh(&ctx)
        .map_err(|e| MaintenanceError::storage("error refreshing indexes before maintenance", e))?;

    let run_params = RunParameters {
        rep,
        mode,
        params,
        maintenance_start_time,
    };

    callback(&ctx, &run_params)
}

/// Moves the next due times forward before any work starts, so a crash in the
/// middle of maintenance defers the cycle instead of retriggering it.
fn update_schedule(
    rep: &dyn DirectRepository,
    params: &Params,
    mode: Mode,
) -> Result<(), MaintenanceError> {
    let mut schedule = get_schedule(rep.blob_store())
        .map_err(|e| MaintenanceError::storage("error getting schedule", e))?;

    advance_schedule(&mut schedule, params, mode, rep.time())?;

    set_schedule(rep.blob_store(), &schedule)
        .map_err(|e| MaintenanceError::storage("error setting schedule", e))
}

fn advance_schedule(
    schedule: &mut Schedule,
    params: &Params,
    mode: Mode,
    now: DateTime<Utc>,
) -> Result<(), MaintenanceError> {
    match mode {
        Mode::Full => {
            schedule.next_full_maintenance_time = Some(add_duration(now, params.full_cycle.interval));
            schedule.next_quick_maintenance_time =
                Some(add_duration(now, params.quick_cycle.interval));
        }
        Mode::Quick => {
            schedule.next_quick_maintenance_time =
                Some(add_duration(now, params.quick_cycle.interval));
        }
        other => return Err(MaintenanceError::UnknownMode(other)),
    }

    debug!(
        "next full maintenance at {:?}, next quick maintenance at {:?}",
        schedule.next_full_maintenance_time, schedule.next_quick_maintenance_time
    );
    Ok(())
}

/// Fails when local and repository time differ by more than [`MAX_CLOCK_SKEW`].
pub fn check_clock_skew_bounds(
    local: DateTime<Utc>,
    repository: DateTime<Utc>,
) -> Result<(), MaintenanceError> {
    let skew = (local - repository).abs();
    if skew.to_std().map_or(false, |skew| skew > MAX_CLOCK_SKEW) {
        return Err(MaintenanceError::ClockSkew {
            local,
            repository,
            max: MAX_CLOCK_SKEW,
        });
    }
    Ok(())
}
