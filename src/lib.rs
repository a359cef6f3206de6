//! Maintenance scheduling for content-addressed backup repositories.
//!
//! Decides when quick and full maintenance cycles are due, makes sure only one
//! local process runs them at a time, and gates every destructive task on the
//! run history persisted in the repository itself.

pub mod blob;
pub mod clock;
pub mod config;
pub mod maintenance;
pub mod repo;
pub mod sqlite_persistence;

pub use blob::{BlobStore, SqliteBlobStore};
pub use maintenance::{run, run_exclusive, MaintenanceContext, MaintenanceError, Mode};
pub use repo::DirectRepository;
