//! Per-model rate-limit cooldown tracking for the fallback controller.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// How long a rate-limited model sits out before the controller will
/// dispatch to it again.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
struct CooldownEntry {
    rate_limited_at: Instant,
    status_codes: Vec<u16>,
}

/// Tracks which models were recently rate limited.
///
/// Single writer per operation (the fallback controller); readers take the
/// shared lock. The window is measured from the *last* rate-limited
/// observation.
#[derive(Debug)]
pub struct CooldownTracker {
    entries: RwLock<FxHashMap<String, CooldownEntry>>,
    window: Duration,
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_window(DEFAULT_COOLDOWN)
    }

    /// Test hook for a custom window.
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            window,
        }
    }

    /// Record a rate-limited observation for a model, restarting its window.
    pub fn record(&self, model: &str, status: u16) {
        let mut entries = self.entries.write();
        let entry = entries.entry(model.to_string()).or_insert_with(|| CooldownEntry {
            rate_limited_at: Instant::now(),
            status_codes: Vec::new(),
        });
        entry.rate_limited_at = Instant::now();
        entry.status_codes.push(status);
    }

    /// Whether the model is still inside its cooldown window.
    #[must_use]
    pub fn is_cooling(&self, model: &str) -> bool {
        let entries = self.entries.read();
        match entries.get(model) {
            Some(entry) => entry.rate_limited_at.elapsed() < self.window,
            None => false,
        }
    }

    /// Status codes observed for a model, most recent last.
    #[must_use]
    pub fn observed_statuses(&self, model: &str) -> Vec<u16> {
        self.entries
            .read()
            .get(model)
            .map(|entry| entry.status_codes.clone())
            .unwrap_or_default()
    }

    /// Drop every entry. Test hook.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
