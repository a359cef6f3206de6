use std::time::Duration;

/// Safety margins applied by destructive maintenance tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyParameters {
    /// Require two snapshot GC cycles, spaced by `margin_between_snapshot_gc`,
    /// before deleted contents may be dropped from the index.
    pub require_two_gc_cycles: bool,

    /// How long packs orphaned by a rewrite must age before they are deleted.
    /// Zero disables the rewrite/delete coupling altogether.
    pub min_rewrite_to_orphan_deletion_delay: Duration,

    pub margin_between_snapshot_gc: Duration,

    /// Subtracted from the computed safe drop time.
    pub drop_content_from_index_extra_margin: Duration,
}

/// Margins for repositories that may be used by several clients concurrently.
pub const SAFETY_FULL: SafetyParameters = SafetyParameters {
    require_two_gc_cycles: true,
    min_rewrite_to_orphan_deletion_delay: Duration::from_secs(60 * 60),
    margin_between_snapshot_gc: Duration::from_secs(4 * 60 * 60),
    drop_content_from_index_extra_margin: Duration::from_secs(60 * 60),
};

/// No margins at all. Only safe when nothing else touches the repository.
pub const SAFETY_NONE: SafetyParameters = SafetyParameters {
    require_two_gc_cycles: false,
    min_rewrite_to_orphan_deletion_delay: Duration::ZERO,
    margin_between_snapshot_gc: Duration::ZERO,
    drop_content_from_index_extra_margin: Duration::ZERO,
};

impl Default for SafetyParameters {
    fn default() -> Self {
        SAFETY_FULL
    }
}
