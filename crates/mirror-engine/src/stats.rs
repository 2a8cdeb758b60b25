use std::fmt;

/// Per-run record counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_added(&mut self) {
        self.added += 1;
    }

    pub fn record_updated(&mut self) {
        self.updated += 1;
    }

    pub fn record_deleted(&mut self) {
        self.deleted += 1;
    }

    pub fn total(&self) -> u64 {
        self.added + self.updated + self.deleted
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added: {}, updated: {}, deleted: {}",
            self.added, self.updated, self.deleted
        )
    }
}
