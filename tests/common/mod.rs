//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::FakeRepository;
//! use repo_maintenance::maintenance::Mode;
//!
//! #[test]
//! fn test_first_run_is_full() {
//!     let repo = FakeRepository::new();
//!     repo.run_maintenance(Mode::Auto, false).unwrap();
//! }
//! ```

#![allow(dead_code)]

mod fake_repo;

pub use fake_repo::{
    t0, EpochSetting, FakeRepository, FlakyBlobStore, RecordingTasks, TaskCall, TaskKind, OTHER_USER, TEST_USER,
};
