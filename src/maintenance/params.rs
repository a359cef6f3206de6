//! Per-repository maintenance parameters.

use crate::blob::BlobStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Well-known blob holding the [`Params`].
pub const PARAMS_BLOB_ID: &str = "maintenance.params";

const DEFAULT_QUICK_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_FULL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Settings of one maintenance cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleParams {
    pub enabled: bool,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
}

/// How many maintenance logs to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRetentionOptions {
    pub max_total_size: u64,
    pub max_count: usize,
    #[serde(with = "duration_secs")]
    pub max_age: Duration,
}

impl LogRetentionOptions {
    pub fn defaults() -> Self {
        Self {
            max_total_size: 1 << 30,
            max_count: 10_000,
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Returns the defaults when nothing was configured.
    pub fn or_default(&self) -> Self {
        if *self == Self::default() {
            Self::defaults()
        } else {
            self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    /// `user@host` allowed to run maintenance without forcing it.
    #[serde(default)]
    pub owner: String,

    #[serde(rename = "quick")]
    pub quick_cycle: CycleParams,

    #[serde(rename = "full")]
    pub full_cycle: CycleParams,

    #[serde(default)]
    pub log_retention: LogRetentionOptions,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            owner: String::new(),
            quick_cycle: CycleParams {
                enabled: true,
                interval: DEFAULT_QUICK_INTERVAL,
            },
            full_cycle: CycleParams {
                enabled: true,
                interval: DEFAULT_FULL_INTERVAL,
            },
            log_retention: LogRetentionOptions::defaults(),
        }
    }
}

impl Params {
    pub fn is_owned_by(&self, username_at_host: &str) -> bool {
        self.owner == username_at_host
    }
}

/// Loads maintenance parameters, falling back to defaults when none were stored.
pub fn get_params(blobs: &dyn BlobStore) -> Result<Params> {
    let Some(data) = blobs
        .get_blob(PARAMS_BLOB_ID)
        .context("error reading maintenance params")?
    else {
        return Ok(Params::default());
    };

    serde_json::from_slice(&data).context("malformed maintenance params")
}

pub fn set_params(blobs: &dyn BlobStore, params: &Params) -> Result<()> {
    let data = serde_json::to_vec(params).context("unable to serialize maintenance params")?;
    blobs
        .put_blob(PARAMS_BLOB_ID, &data)
        .context("unable to write maintenance params")
}
