//! Quick and full maintenance cycles.
//!
//! Tasks run strictly one after another against a single in-memory schedule.
//! Every outcome is persisted by [`report_run`] before the next decision is
//! taken, and the first failing task ends the cycle.

use super::context::MaintenanceContext;
use super::error::MaintenanceError;
use super::exclusive::RunParameters;
use super::mode::Mode;
use super::policy::{
    had_recent_full_rewrite, safe_drop_time, should_delete_orphaned_blobs,
    should_full_rewrite_contents, should_quick_rewrite_contents, time_until_blob_deletion,
};
use super::report::report_run;
use super::safety::SafetyParameters;
use super::schedule::{get_schedule, Schedule};
use super::task::TaskType;
use crate::repo::{
    CompactIndexesOptions, ContentIdRange, DeleteUnreferencedBlobsOptions, EpochManagerState,
    RewriteContentsOptions, PACK_BLOB_ID_PREFIX_SPECIAL,
};
use tracing::{debug, info};

/// Runs the cycle selected by `run_params.mode`.
///
/// Only meant to be called from a [`run_exclusive`](super::run_exclusive)
/// callback, which is the only place [`RunParameters`] come from.
pub fn run(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    safety: &SafetyParameters,
) -> Result<(), MaintenanceError> {
    info!("Running {} maintenance...", run_params.mode);

    match run_params.mode {
        Mode::Quick => run_quick_maintenance(ctx, run_params, safety)?,
        Mode::Full => run_full_maintenance(ctx, run_params, safety)?,
        other => return Err(MaintenanceError::UnknownMode(other)),
    }

    info!("Finished {} maintenance.", run_params.mode);
    Ok(())
}

fn load_schedule(run_params: &RunParameters<'_>) -> Result<Schedule, MaintenanceError> {
    get_schedule(run_params.rep().blob_store())
        .map_err(|e| MaintenanceError::storage("unable to get schedule", e))
}

fn run_quick_maintenance(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    safety: &SafetyParameters,
) -> Result<(), MaintenanceError> {
    let rep = run_params.rep();
    let mut s = load_schedule(run_params)?;

    match rep.epoch_manager() {
        EpochManagerState::Enabled(_) => {
            info!("epoch manager is enabled, only cleaning up logs in quick maintenance");
            return run_task_cleanup_logs(ctx, run_params, &mut s)
                .map_err(|e| e.context("error cleaning up logs"));
        }
        EpochManagerState::QueryError(err) => return Err(MaintenanceError::EpochManager(err)),
        EpochManagerState::Disabled => {}
    }

    if should_quick_rewrite_contents(&s, safety) {
        let opts = RewriteContentsOptions {
            content_id_range: ContentIdRange::AllPrefixedIds,
            pack_prefix: Some(PACK_BLOB_ID_PREFIX_SPECIAL.to_string()),
            short_packs: true,
        };
        report_run(ctx, rep, TaskType::REWRITE_CONTENTS_QUICK, &mut s, || {
            rep.tasks().rewrite_contents(ctx, &opts, safety)
        })
        .map_err(|e| e.context("error rewriting metadata contents"))?;
    } else {
        not_rewriting_contents();
    }

    if should_delete_orphaned_blobs(rep.time(), &s, safety) {
        // A full rewrite orphans packs outside the special prefix, which quick
        // deletion would never reach.
        let result = if had_recent_full_rewrite(&s) {
            debug!("Had recent full rewrite - performing full blob deletion.");
            run_task_delete_orphaned_blobs_full(ctx, run_params, &mut s, safety)
        } else {
            debug!("Performing quick blob deletion.");
            run_task_delete_orphaned_blobs_quick(ctx, run_params, &mut s, safety)
        };
        result.map_err(|e| e.context("error deleting unreferenced metadata blobs"))?;
    } else {
        not_deleting_orphaned_blobs(run_params, &s, safety);
    }

    run_task_index_compaction_quick(ctx, run_params, &mut s, safety)
        .map_err(|e| e.context("error performing index compaction"))?;

    run_task_cleanup_logs(ctx, run_params, &mut s).map_err(|e| e.context("error cleaning up logs"))
}

fn run_full_maintenance(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    safety: &SafetyParameters,
) -> Result<(), MaintenanceError> {
    let rep = run_params.rep();
    let mut s = load_schedule(run_params)?;

    if should_full_rewrite_contents(&s, safety) {
        let opts = RewriteContentsOptions {
            content_id_range: ContentIdRange::AllIds,
            pack_prefix: None,
            short_packs: true,
        };
        report_run(ctx, rep, TaskType::REWRITE_CONTENTS_FULL, &mut s, || {
            rep.tasks().rewrite_contents(ctx, &opts, safety)
        })
        .map_err(|e| e.context("error rewriting contents in short packs"))?;
    } else {
        not_rewriting_contents();
    }

    run_task_drop_deleted_contents_full(ctx, run_params, &mut s, safety)
        .map_err(|e| e.context("error dropping deleted contents"))?;

    if should_delete_orphaned_blobs(rep.time(), &s, safety) {
        run_task_delete_orphaned_blobs_full(ctx, run_params, &mut s, safety)
            .map_err(|e| e.context("error deleting unreferenced blobs"))?;
    } else {
        not_deleting_orphaned_blobs(run_params, &s, safety);
    }

    run_task_cleanup_logs(ctx, run_params, &mut s)
        .map_err(|e| e.context("error cleaning up logs"))?;

    run_task_cleanup_epoch_manager(ctx, run_params, &mut s)
        .map_err(|e| e.context("error cleaning up epoch manager"))
}

fn not_rewriting_contents() {
    info!("Previous content rewrite has not been finalized yet, waiting until the next blob deletion.");
}

fn not_deleting_orphaned_blobs(
    run_params: &RunParameters<'_>,
    s: &Schedule,
    safety: &SafetyParameters,
) {
    let left = time_until_blob_deletion(run_params.rep().time(), s, safety);
    info!(
        "Skipping blob deletion because not enough time has passed yet ({:?} left).",
        left
    );
}

fn run_task_delete_orphaned_blobs(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    s: &mut Schedule,
    safety: &SafetyParameters,
    task: TaskType,
    prefix: Option<&str>,
) -> Result<(), MaintenanceError> {
    let rep = run_params.rep();
    let opts = DeleteUnreferencedBlobsOptions {
        not_after_time: run_params.maintenance_start_time,
        prefix: prefix.map(str::to_string),
    };

    let deleted = report_run(ctx, rep, task, s, || {
        rep.tasks().delete_unreferenced_blobs(ctx, &opts, safety)
    })?;
    info!("Deleted {} unreferenced blobs.", deleted);
    Ok(())
}

fn run_task_delete_orphaned_blobs_quick(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    s: &mut Schedule,
    safety: &SafetyParameters,
) -> Result<(), MaintenanceError> {
    run_task_delete_orphaned_blobs(
        ctx,
        run_params,
        s,
        safety,
        TaskType::DELETE_ORPHANED_BLOBS_QUICK,
        Some(PACK_BLOB_ID_PREFIX_SPECIAL),
    )
}

fn run_task_delete_orphaned_blobs_full(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    s: &mut Schedule,
    safety: &SafetyParameters,
) -> Result<(), MaintenanceError> {
    run_task_delete_orphaned_blobs(
        ctx,
        run_params,
        s,
        safety,
        TaskType::DELETE_ORPHANED_BLOBS_FULL,
        None,
    )
}

fn run_task_drop_deleted_contents_full(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    s: &mut Schedule,
    safety: &SafetyParameters,
) -> Result<(), MaintenanceError> {
    let rep = run_params.rep();

    let Some(safe_drop_time) = safe_drop_time(s, safety, rep.time()) else {
        info!("Not enough time has passed since previous successful Snapshot GC. Will try again next time.");
        return Ok(());
    };

    info!("Found safe time to drop indexes: {}", safe_drop_time);
    report_run(ctx, rep, TaskType::DROP_DELETED_CONTENTS_FULL, s, || {
        rep.tasks().drop_deleted_contents(ctx, safe_drop_time, safety)
    })
}

fn run_task_index_compaction_quick(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    s: &mut Schedule,
    safety: &SafetyParameters,
) -> Result<(), MaintenanceError> {
    let rep = run_params.rep();
    let opts = CompactIndexesOptions::default();
    report_run(ctx, rep, TaskType::INDEX_COMPACTION, s, || {
        rep.tasks().compact_indexes(ctx, &opts, safety)
    })
}

fn run_task_cleanup_logs(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    s: &mut Schedule,
) -> Result<(), MaintenanceError> {
    let rep = run_params.rep();
    let retention = run_params.params.log_retention.or_default();

    let deleted = report_run(ctx, rep, TaskType::CLEANUP_LOGS, s, || {
        rep.tasks().cleanup_logs(ctx, &retention)
    })?;
    debug!("Cleaned up {} logs.", deleted.len());
    Ok(())
}

fn run_task_cleanup_epoch_manager(
    ctx: &MaintenanceContext,
    run_params: &RunParameters<'_>,
    s: &mut Schedule,
) -> Result<(), MaintenanceError> {
    let rep = run_params.rep();
    let em = match rep.epoch_manager() {
        EpochManagerState::Enabled(em) => em,
        EpochManagerState::Disabled => return Ok(()),
        EpochManagerState::QueryError(err) => return Err(MaintenanceError::EpochManager(err)),
    };

    report_run(ctx, rep, TaskType::CLEANUP_EPOCH_MANAGER, s, || {
        em.cleanup_superseded_indexes(ctx)
    })
}
