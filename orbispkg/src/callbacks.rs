//! Callback interfaces for progress reporting and cancellation support.

/// What kind of long-running operation a handler is observing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Pack,
    Unpack,
}

/// Returned by handlers to continue or abort the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Continue,
    Abort,
}

/// Progress information for pack/unpack operations
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Bytes processed across all entries
    pub processed_bytes: u64,
    /// Total bytes to process, if known
    pub total_bytes: Option<u64>,
    /// Number of entries started so far (1-based)
    pub processed_files: usize,
    /// Total number of entries, if known
    pub total_files: Option<usize>,
    /// Name of the entry being processed
    pub current_file: String,
}

impl ProgressInfo {
    /// Gets the overall progress as a percentage (0.0 to 100.0)
    pub fn overall_progress(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => (self.processed_bytes as f64 / total as f64) * 100.0,
            _ => 0.0,
        }
    }
}

/// Receives notifications while a package is written or extracted.
///
/// Every method has a default that continues, so implementors only override
/// what they need. Returning [`ControlAction::Abort`] stops the operation with
/// [`crate::Error::Cancelled`].
pub trait ArchiveHandler {
    fn on_started(&mut self, operation: OperationType) -> ControlAction {
        let _ = operation;
        ControlAction::Continue
    }

    fn on_entry_started(&mut self, name: &str) -> ControlAction {
        let _ = name;
        ControlAction::Continue
    }

    fn on_progress(&mut self, progress: &ProgressInfo) -> ControlAction {
        let _ = progress;
        ControlAction::Continue
    }

    fn on_entry_finished(&mut self, name: &str) -> ControlAction {
        let _ = name;
        ControlAction::Continue
    }

    fn on_finished(&mut self) {}
}

/// A handler that does nothing
pub struct NoOpHandler;

impl ArchiveHandler for NoOpHandler {}
