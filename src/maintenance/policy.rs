//! Decisions about what maintenance may run now.
//!
//! Everything here is a pure function of the schedule, the parameters and the
//! current repository time, so two clients reading the same schedule reach
//! the same decision.

use super::mode::Mode;
use super::params::Params;
use super::safety::SafetyParameters;
use super::schedule::Schedule;
use super::task::TaskType;
use crate::clock::{add_duration, sub_duration};
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::debug;

const ALL_REWRITES: &[TaskType] = &[
    TaskType::REWRITE_CONTENTS_FULL,
    TaskType::REWRITE_CONTENTS_QUICK,
];

const ALL_BLOB_DELETIONS: &[TaskType] = &[
    TaskType::DELETE_ORPHANED_BLOBS_FULL,
    TaskType::DELETE_ORPHANED_BLOBS_QUICK,
];

fn is_due(now: DateTime<Utc>, next: Option<DateTime<Utc>>) -> bool {
    next.map_or(true, |next| now >= next)
}

/// Resolves which cycle is due. The full cycle does a superset of the quick
/// cycle's work, so it is checked first.
pub fn should_run(params: &Params, schedule: &Schedule, now: DateTime<Utc>) -> Mode {
    if params.full_cycle.enabled {
        if is_due(now, schedule.next_full_maintenance_time) {
            debug!("due for full maintenance cycle");
            return Mode::Full;
        }
        debug!(
            "not due for full maintenance cycle until {:?}",
            schedule.next_full_maintenance_time
        );
    } else {
        debug!("full maintenance cycle not enabled");
    }

    if params.quick_cycle.enabled {
        if is_due(now, schedule.next_quick_maintenance_time) {
            debug!("due for quick maintenance cycle");
            return Mode::Quick;
        }
        debug!(
            "not due for quick maintenance cycle until {:?}",
            schedule.next_quick_maintenance_time
        );
    } else {
        debug!("quick maintenance cycle not enabled");
    }

    Mode::None
}

/// Earliest time at which any enabled cycle becomes due, or `None` when both
/// cycles are disabled. A cycle that was never scheduled is due at `now`.
pub fn next_maintenance_time(
    params: &Params,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let full = params
        .full_cycle
        .enabled
        .then(|| schedule.next_full_maintenance_time.unwrap_or(now));
    let quick = params
        .quick_cycle
        .enabled
        .then(|| schedule.next_quick_maintenance_time.unwrap_or(now));

    full.into_iter().chain(quick).min()
}

fn rewrite_allowed(
    schedule: &Schedule,
    safety: &SafetyParameters,
    rewrite_tasks: &[TaskType],
) -> bool {
    let Some(latest_rewrite) = schedule.latest_successful_end(rewrite_tasks) else {
        return true;
    };
    if safety.min_rewrite_to_orphan_deletion_delay.is_zero() {
        return true;
    }

    // `None` (never deleted) sorts before any rewrite.
    schedule.latest_successful_end(ALL_BLOB_DELETIONS) >= Some(latest_rewrite)
}

/// Every rewrite orphans packs that may only be deleted after a delay, so a
/// new quick rewrite waits until deletion has caught up with the latest
/// rewrite of either class.
pub fn should_quick_rewrite_contents(schedule: &Schedule, safety: &SafetyParameters) -> bool {
    rewrite_allowed(schedule, safety, ALL_REWRITES)
}

/// Like [`should_quick_rewrite_contents`], but only full rewrites are
/// considered, so a full rewrite can still follow a quick one.
pub fn should_full_rewrite_contents(schedule: &Schedule, safety: &SafetyParameters) -> bool {
    rewrite_allowed(schedule, safety, &[TaskType::REWRITE_CONTENTS_FULL])
}

/// Earliest time orphaned blobs may be deleted: the end of the latest
/// successful rewrite plus the configured delay. `None` when no rewrite ever
/// succeeded, which does not block deletion.
pub fn next_blob_delete_time(
    schedule: &Schedule,
    safety: &SafetyParameters,
) -> Option<DateTime<Utc>> {
    schedule
        .latest_successful_end(ALL_REWRITES)
        .map(|end| add_duration(end, safety.min_rewrite_to_orphan_deletion_delay))
}

/// Other clients may still hold indexes cached from before a rewrite; they
/// need time to refresh before the superseded packs disappear.
pub fn should_delete_orphaned_blobs(
    now: DateTime<Utc>,
    schedule: &Schedule,
    safety: &SafetyParameters,
) -> bool {
    is_due(now, next_blob_delete_time(schedule, safety))
}

/// Time left until orphaned blobs may be deleted, truncated to whole seconds.
pub fn time_until_blob_deletion(
    now: DateTime<Utc>,
    schedule: &Schedule,
    safety: &SafetyParameters,
) -> Duration {
    next_blob_delete_time(schedule, safety)
        .and_then(|next| (next - now).to_std().ok())
        .map(|left| Duration::from_secs(left.as_secs()))
        .unwrap_or_default()
}

/// True when the latest full rewrite is at least as recent as the latest
/// quick rewrite. Equal end times count as a recent full rewrite.
pub fn had_recent_full_rewrite(schedule: &Schedule) -> bool {
    schedule.latest_successful_end(&[TaskType::REWRITE_CONTENTS_FULL])
        >= schedule.latest_successful_end(&[TaskType::REWRITE_CONTENTS_QUICK])
}

/// Latest time such that contents deleted before it can be dropped from the
/// index.
///
/// A GC racing with snapshot creation can wrongly mark contents deleted that a
/// new manifest makes live again. A later GC undeletes them. Once such a later
/// GC started more than `margin_between_snapshot_gc` after an earlier one
/// finished, every snapshot racing with the earlier GC has flushed its writes,
/// so contents deleted before the earlier GC started are safe to drop.
///
/// Returns `None` when fewer than two successful GC runs exist or no pair is
/// spaced far enough apart.
pub fn find_safe_drop_time(
    schedule: &Schedule,
    safety: &SafetyParameters,
) -> Option<DateTime<Utc>> {
    let runs = schedule.successful_runs_descending(&TaskType::SNAPSHOT_GC);
    let (latest, older) = runs.split_first()?;

    let margin = TimeDelta::from_std(safety.margin_between_snapshot_gc).unwrap_or(TimeDelta::MAX);

    older
        .iter()
        .find(|r| latest.start - r.end > margin)
        .map(|r| sub_duration(r.start, safety.drop_content_from_index_extra_margin))
}

/// Safe drop time honoring `require_two_gc_cycles`; without that requirement
/// everything deleted before `now` may be dropped.
pub fn safe_drop_time(
    schedule: &Schedule,
    safety: &SafetyParameters,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if safety.require_two_gc_cycles {
        find_safe_drop_time(schedule, safety)
    } else {
        Some(now)
    }
}
