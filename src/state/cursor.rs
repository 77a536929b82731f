use crate::state::PassStatus;

/// Resumable position of a crawl session
///
/// The offset counts items consumed from the listing's ordered stream. It is
/// only meaningful for the listing it was recorded against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlCursor {
    /// Items consumed so far
    pub offset: u64,

    /// Set once a pass ends exhaustively or reaches the limit
    pub completed: bool,
}

impl CrawlCursor {
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            completed: false,
        }
    }

    /// Moves the cursor forward; the offset never decreases
    pub fn advance_to(&mut self, offset: u64) {
        self.offset = self.offset.max(offset);
    }

    /// Applies the outcome of a finished pass
    pub fn record(&mut self, status: PassStatus, offset: u64) {
        self.advance_to(offset);
        if status.completes_session() {
            self.completed = true;
        }
    }

    /// Rewinds to the start of the listing
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
