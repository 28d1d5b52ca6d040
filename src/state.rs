//! Position state: last reading processed + bucket currently held.
//!
//! The reconciler owns one [`PositionState`] and writes it through a
//! [`StateStore`] after every change. [`MemoryStateStore`] forgets everything on
//! restart; [`JsonFileStateStore`] keeps it across restarts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    pub last_processed_reading_id: Option<i64>,
    pub held_bucket_id: Option<String>,
}

impl PositionState {
    /// True if `reading_id` is newer than anything processed so far.
    pub fn is_new_reading(&self, reading_id: i64) -> bool {
        match self.last_processed_reading_id {
            Some(last) => reading_id > last,
            None => true,
        }
    }

    /// Advance the processed marker. Never moves backwards.
    pub fn mark_processed(&mut self, reading_id: i64) {
        if self.is_new_reading(reading_id) {
            self.last_processed_reading_id = Some(reading_id);
        }
    }

    pub fn is_held(&self, bucket_id: &str) -> bool {
        self.held_bucket_id.as_deref() == Some(bucket_id)
    }

    pub fn set_held(&mut self, bucket_id: &str) {
        self.held_bucket_id = Some(bucket_id.to_string());
        info!(bucket_id, "position set (order accepted)");
    }
}

/// Get/set for the two position fields.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<PositionState>;
    fn save(&self, state: &PositionState) -> Result<()>;
}

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<PositionState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<PositionState> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("state lock poisoned"))?
            .clone())
    }

    fn save(&self, state: &PositionState) -> Result<()> {
        *self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("state lock poisoned"))? = state.clone();
        Ok(())
    }
}

/// JSON file store. A missing file loads as the empty state.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self) -> Result<PositionState> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no saved state, starting fresh");
            return Ok(PositionState::default());
        }
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read state from {}", self.path.display()))?;
        let state: PositionState = serde_json::from_str(&json)
            .with_context(|| format!("parse state from {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            last_reading = ?state.last_processed_reading_id,
            held = ?state.held_bucket_id,
            "state loaded"
        );
        Ok(state)
    }

    fn save(&self, state: &PositionState) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("serialise state")?;
        // Write-then-rename so a crash mid-write leaves the old file intact.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("write state to {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace state file {}", self.path.display()))?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}
