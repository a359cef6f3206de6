use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use repo_maintenance::blob::{BlobMetadata, BlobStore, SqliteBlobStore};
use repo_maintenance::clock::{Clock, ManualClock};
use repo_maintenance::maintenance::{
    get_params, get_schedule, report_run, run, run_exclusive, set_params, set_schedule,
    LogRetentionOptions, MaintenanceContext, MaintenanceError, Mode, Params, RunInfo,
    SafetyParameters, Schedule, TaskType, SAFETY_FULL,
};
use repo_maintenance::repo::{
    CompactIndexesOptions, DeleteUnreferencedBlobsOptions, DirectRepository, EpochManager,
    EpochManagerState, MaintenanceTasks, RewriteContentsOptions,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_USER: &str = "maint@backup-host";
pub const OTHER_USER: &str = "someone@elsewhere";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    RewriteContents,
    DeleteUnreferencedBlobs,
    DropDeletedContents,
    CompactIndexes,
    CleanupLogs,
    CleanupEpochManager,
    SnapshotGc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskCall {
    RewriteContents(RewriteContentsOptions),
    DeleteUnreferencedBlobs(DeleteUnreferencedBlobsOptions),
    DropDeletedContents(DateTime<Utc>),
    CompactIndexes(CompactIndexesOptions),
    CleanupLogs(LogRetentionOptions),
    CleanupEpochManager,
    SnapshotGc,
}

impl TaskCall {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskCall::RewriteContents(_) => TaskKind::RewriteContents,
            TaskCall::DeleteUnreferencedBlobs(_) => TaskKind::DeleteUnreferencedBlobs,
            TaskCall::DropDeletedContents(_) => TaskKind::DropDeletedContents,
            TaskCall::CompactIndexes(_) => TaskKind::CompactIndexes,
            TaskCall::CleanupLogs(_) => TaskKind::CleanupLogs,
            TaskCall::CleanupEpochManager => TaskKind::CleanupEpochManager,
            TaskCall::SnapshotGc => TaskKind::SnapshotGc,
        }
    }
}

/// Task collaborators that record every call, optionally fail, and move the
/// repository clock forward by a fixed amount per call.
pub struct RecordingTasks {
    clock: Arc<ManualClock>,
    calls: Mutex<Vec<TaskCall>>,
    failing: Mutex<HashSet<TaskKind>>,
    duration: Mutex<Duration>,
}

impl RecordingTasks {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            duration: Mutex::new(Duration::ZERO),
        }
    }

    fn record(&self, call: TaskCall) -> Result<()> {
        let kind = call.kind();
        self.calls.lock().unwrap().push(call);
        self.clock.advance(*self.duration.lock().unwrap());

        if self.failing.lock().unwrap().contains(&kind) {
            return Err(anyhow!("injected {:?} failure", kind));
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<TaskCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        self.calls().iter().map(TaskCall::kind).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail(&self, kind: TaskKind) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn succeed(&self, kind: TaskKind) {
        self.failing.lock().unwrap().remove(&kind);
    }

    /// Repository time consumed by each task.
    pub fn set_duration(&self, duration: Duration) {
        *self.duration.lock().unwrap() = duration;
    }
}

impl MaintenanceTasks for RecordingTasks {
    fn rewrite_contents(
        &self,
        _ctx: &MaintenanceContext,
        opts: &RewriteContentsOptions,
        _safety: &SafetyParameters,
    ) -> Result<()> {
        self.record(TaskCall::RewriteContents(opts.clone()))
    }

    fn delete_unreferenced_blobs(
        &self,
        _ctx: &MaintenanceContext,
        opts: &DeleteUnreferencedBlobsOptions,
        _safety: &SafetyParameters,
    ) -> Result<usize> {
        self.record(TaskCall::DeleteUnreferencedBlobs(opts.clone()))?;
        Ok(3)
    }

    fn drop_deleted_contents(
        &self,
        _ctx: &MaintenanceContext,
        safe_drop_time: DateTime<Utc>,
        _safety: &SafetyParameters,
    ) -> Result<()> {
        self.record(TaskCall::DropDeletedContents(safe_drop_time))
    }

    fn compact_indexes(
        &self,
        _ctx: &MaintenanceContext,
        opts: &CompactIndexesOptions,
        _safety: &SafetyParameters,
    ) -> Result<()> {
        self.record(TaskCall::CompactIndexes(opts.clone()))
    }

    fn cleanup_logs(
        &self,
        _ctx: &MaintenanceContext,
        retention: &LogRetentionOptions,
    ) -> Result<Vec<String>> {
        self.record(TaskCall::CleanupLogs(retention.clone()))?;
        Ok(vec!["_log_1".to_string()])
    }
}

impl EpochManager for RecordingTasks {
    fn cleanup_superseded_indexes(&self, _ctx: &MaintenanceContext) -> Result<()> {
        self.record(TaskCall::CleanupEpochManager)
    }
}

/// SQLite blob store whose writes and metadata reads can be made to fail.
pub struct FlakyBlobStore {
    inner: SqliteBlobStore,
    fail_writes: AtomicBool,
    fail_metadata: AtomicBool,
}

impl FlakyBlobStore {
    fn new(inner: SqliteBlobStore) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_metadata: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::SeqCst);
    }
}

impl BlobStore for FlakyBlobStore {
    fn get_blob(&self, blob_id: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get_blob(blob_id)
    }

    fn put_blob(&self, blob_id: &str, data: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("injected write failure"));
        }
        self.inner.put_blob(blob_id, data)
    }

    fn get_metadata(&self, blob_id: &str) -> Result<BlobMetadata> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(anyhow!("injected metadata failure"));
        }
        self.inner.get_metadata(blob_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochSetting {
    Disabled,
    Enabled,
    QueryError,
}

/// In-memory repository backed by a SQLite blob store in a temp dir.
///
/// Repository time is a [`ManualClock`] shared with the blob store, so blob
/// write timestamps follow it.
pub struct FakeRepository {
    pub clock: Arc<ManualClock>,
    pub tasks: Arc<RecordingTasks>,
    pub username: String,
    pub store: FlakyBlobStore,
    epoch: Mutex<EpochSetting>,
    index_refresh_disabled: AtomicBool,
    refresh_count: AtomicUsize,
    fail_refresh: AtomicBool,
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl FakeRepository {
    /// A repository at [`t0`] whose maintenance owner is [`TEST_USER`].
    pub fn new() -> Self {
        let repo = Self::without_params();
        repo.update_params(|p| p.owner = TEST_USER.to_string());
        repo
    }

    /// A repository that never stored maintenance params.
    pub fn without_params() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let store =
            SqliteBlobStore::with_clock(temp_dir.path().join("blobs.db"), clock.clone()).unwrap();

        Self {
            tasks: Arc::new(RecordingTasks::new(clock.clone())),
            clock,
            username: TEST_USER.to_string(),
            store: FlakyBlobStore::new(store),
            epoch: Mutex::new(EpochSetting::Disabled),
            index_refresh_disabled: AtomicBool::new(false),
            refresh_count: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            config_path: temp_dir.path().join("repo.config"),
            _temp_dir: temp_dir,
        }
    }

    pub fn as_user(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    pub fn set_epoch(&self, setting: EpochSetting) {
        *self.epoch.lock().unwrap() = setting;
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn index_refresh_disabled(&self) -> bool {
        self.index_refresh_disabled.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_count.load(Ordering::SeqCst)
    }

    pub fn lock_path(&self) -> PathBuf {
        repo_maintenance::maintenance::lock_file_path(&self.config_path)
    }

    pub fn params(&self) -> Params {
        get_params(&self.store).unwrap()
    }

    pub fn update_params(&self, f: impl FnOnce(&mut Params)) {
        let mut params = self.params();
        f(&mut params);
        set_params(&self.store, &params).unwrap();
    }

    pub fn schedule(&self) -> Schedule {
        get_schedule(&self.store).unwrap()
    }

    pub fn set_schedule(&self, schedule: &Schedule) {
        set_schedule(&self.store, schedule).unwrap();
    }

    /// Appends a run to the persisted history.
    pub fn record_run(&self, task: TaskType, run: RunInfo) {
        let mut schedule = self.schedule();
        schedule.append_run(task, run);
        self.set_schedule(&schedule);
    }

    /// Overwrites a blob with raw bytes, bypassing serialization.
    pub fn put_raw_blob(&self, blob_id: &str, data: &[u8]) {
        self.store.put_blob(blob_id, data).unwrap();
    }

    /// Raw schedule blob, for asserting it was not touched.
    pub fn schedule_blob(&self) -> Option<Vec<u8>> {
        self.store
            .get_blob(repo_maintenance::maintenance::SCHEDULE_BLOB_ID)
            .unwrap()
    }

    /// Context whose local clock agrees with the repository clock.
    pub fn context(&self) -> MaintenanceContext {
        MaintenanceContext::background().with_local_clock(self.clock.clone())
    }

    pub fn run_maintenance(&self, mode: Mode, force: bool) -> Result<(), MaintenanceError> {
        self.run_maintenance_with(&self.context(), mode, force, &SAFETY_FULL)
    }

    /// Runs maintenance the way a snapshot maintenance command does: snapshot
    /// GC first on full cycles, then the cycle itself.
    pub fn run_maintenance_with(
        &self,
        ctx: &MaintenanceContext,
        mode: Mode,
        force: bool,
        safety: &SafetyParameters,
    ) -> Result<(), MaintenanceError> {
        run_exclusive(ctx, self, mode, force, |ctx, run_params| {
            if run_params.mode == Mode::Full {
                let mut schedule = get_schedule(&self.store)
                    .map_err(|e| MaintenanceError::storage("unable to get schedule", e))?;
                report_run(ctx, self, TaskType::SNAPSHOT_GC, &mut schedule, || {
                    self.tasks.record(TaskCall::SnapshotGc)
                })?;
            }
            run(ctx, run_params, safety)
        })
    }
}

impl DirectRepository for FakeRepository {
    fn username_at_host(&self) -> String {
        self.username.clone()
    }

    fn time(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn refresh(&self, _ctx: &MaintenanceContext) -> Result<()> {
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(anyhow!("index blobs unreadable"));
        }
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disable_index_refresh(&self) {
        self.index_refresh_disabled.store(true, Ordering::SeqCst);
    }

    fn config_filename(&self) -> PathBuf {
        self.config_path.clone()
    }

    fn blob_store(&self) -> &dyn BlobStore {
        &self.store
    }

    fn epoch_manager(&self) -> EpochManagerState {
        match *self.epoch.lock().unwrap() {
            EpochSetting::Disabled => EpochManagerState::Disabled,
            EpochSetting::Enabled => EpochManagerState::Enabled(self.tasks.clone()),
            EpochSetting::QueryError => {
                EpochManagerState::QueryError(anyhow!("unable to read epoch markers"))
            }
        }
    }

    fn tasks(&self) -> &dyn MaintenanceTasks {
        self.tasks.as_ref()
    }
}
