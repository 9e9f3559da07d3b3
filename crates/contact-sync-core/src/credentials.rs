//! Round-robin API key rotation driven by live quota checks.

use std::fmt;

use crate::error::AppError;
use crate::traits::QuotaProbe;

/// Rotate once the active key has fewer calls left than this.
pub const DEFAULT_LOW_WATER_MARK: u64 = 10;

/// Ordered set of API keys with a cursor on the active one.
///
/// Never empty, so the cursor is always a valid index.
#[derive(Clone)]
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: usize,
    calls_since_rotation: u32,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Result<Self, AppError> {
        if keys.is_empty() {
            return Err(AppError::ConfigError(
                "credential pool needs at least one key".into(),
            ));
        }
        Ok(Self {
            keys,
            cursor: 0,
            calls_since_rotation: 0,
        })
    }

    /// Parse a comma-separated key list, ignoring blank entries.
    pub fn from_list(list: &str) -> Result<Self, AppError> {
        let keys = list
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();
        Self::new(keys)
    }

    pub fn current(&self) -> &str {
        &self.keys[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn calls_since_rotation(&self) -> u32 {
        self.calls_since_rotation
    }

    /// Advance to the next key, wrapping to the first.
    pub fn rotate(&mut self) {
        self.cursor = (self.cursor + 1) % self.keys.len();
        self.calls_since_rotation = 0;
    }

    pub fn record_call(&mut self) {
        self.calls_since_rotation = self.calls_since_rotation.saturating_add(1);
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .field("cursor", &self.cursor)
            .field("calls_since_rotation", &self.calls_since_rotation)
            .finish()
    }
}

/// Result of a pre-call quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Kept { remaining: u64 },
    Rotated { from: usize, to: usize },
}

/// Switches keys when the active one runs low on quota.
#[derive(Debug, Clone)]
pub struct CredentialRotator {
    pool: CredentialPool,
    low_water_mark: u64,
}

impl CredentialRotator {
    pub fn new(pool: CredentialPool) -> Self {
        Self {
            pool,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }

    pub fn with_low_water_mark(mut self, mark: u64) -> Self {
        self.low_water_mark = mark;
        self
    }

    pub fn current(&self) -> &str {
        self.pool.current()
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Check the active key's remaining quota and rotate if it is below the mark.
    ///
    /// A failed quota check counts as zero remaining, so it always rotates.
    /// Advances at most one position per call.
    pub async fn before_call<P: QuotaProbe>(&mut self, probe: &P) -> Rotation {
        let remaining = match probe.remaining_quota(self.pool.current()).await {
            Ok(remaining) => remaining,
            Err(e) => {
                tracing::warn!(error = %e, key_index = self.pool.cursor(), "Quota check failed, assuming exhausted");
                0
            }
        };
        tracing::info!(
            remaining,
            key_index = self.pool.cursor(),
            "Remaining requests for current key"
        );

        if remaining < self.low_water_mark {
            let from = self.pool.cursor();
            self.pool.rotate();
            let to = self.pool.cursor();
            tracing::info!(from, to, "Switched to next API key");
            Rotation::Rotated { from, to }
        } else {
            self.pool.record_call();
            Rotation::Kept { remaining }
        }
    }
}
