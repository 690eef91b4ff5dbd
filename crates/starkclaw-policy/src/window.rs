//! Rolling 24-hour spend accounting.

use starkclaw_core::Timestamp;

const WINDOW_SECS: i64 = 24 * 60 * 60;

/// Spend entries as `(cents, timestamp)` pairs. Entries older than 24 hours
/// are evicted before every summation.
#[derive(Debug, Default, Clone)]
pub struct SpendWindow {
    entries: Vec<(u64, Timestamp)>,
}

impl SpendWindow {
    pub fn new() -> Self {
        Self::default()
    }

    fn evict(&mut self, now: Timestamp) {
        self.entries.retain(|(_, at)| now - at < WINDOW_SECS);
    }

    /// Record a completed spend.
    pub fn record(&mut self, cents: u64, now: Timestamp) {
        self.evict(now);
        self.entries.push((cents, now));
    }

    /// Total cents spent within the trailing 24 hours.
    pub fn total(&mut self, now: Timestamp) -> u64 {
        self.evict(now);
        self.entries.iter().map(|(cents, _)| *cents).sum()
    }
}
