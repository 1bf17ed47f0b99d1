use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::weather::types::DailyRecord;

/// Calendar-day key -> that day's record. `BTreeMap` keeps keys in
/// lexicographic order, which for `YYYY-MM-DD` is chronological order.
pub type CacheState = BTreeMap<String, DailyRecord>;

/// Number of days the rolling cache retains.
pub const RETAINED_DAYS: usize = 2;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Cache write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable home of the daily cache.
///
/// `load` never fails: a missing or corrupt backend reads as an empty
/// cache. `save` replaces the whole mapping.
pub trait DailyStore: Send + Sync {
    fn load(&self) -> impl Future<Output = CacheState> + Send;

    fn save(
        &self,
        state: &CacheState,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Keep only the `keep` greatest keys.
pub fn compact(mut state: CacheState, keep: usize) -> CacheState {
    if state.len() <= keep {
        return state;
    }

    let first_kept = state.len() - keep;
    match state.keys().nth(first_kept).cloned() {
        Some(cutoff) => state.split_off(&cutoff),
        None => CacheState::new(),
    }
}

/// JSON file store, one object mapping day keys to records.
#[derive(Debug, Clone)]
pub struct FileDailyStore {
    path: PathBuf,
}

impl FileDailyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DailyStore for FileDailyStore {
    async fn load(&self) -> CacheState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("Daily cache {:?} not readable, starting empty: {}", self.path, e);
                return CacheState::new();
            }
        };

        if raw.trim().is_empty() {
            return CacheState::new();
        }

        match serde_json::from_str::<CacheState>(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!("Daily cache {:?} is malformed, starting empty: {}", self.path, e);
                CacheState::new()
            }
        }
    }

    async fn save(&self, state: &CacheState) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(state)?;

        // Write beside the target and rename so readers never see a torn file.
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}
