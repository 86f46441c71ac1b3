//! Defines structures and types for progress reporting.

/// Represents a snapshot of the progress during a long-running operation.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// A description of the current stage (e.g., "Importing data.noun").
    pub stage_description: String,
    /// Number of items processed in the current stage.
    pub current_item: u64,
    /// Total number of items expected in the current stage (if calculable).
    pub total_items: Option<u64>,
    /// An optional message providing more context (e.g., "1500 synsets committed").
    pub message: Option<String>,
}

/// Type alias for the progress callback function.
///
/// Importers and downloads invoke it between units of work; it never runs
/// while a database transaction is open.
pub type ProgressCallback = Box<dyn FnMut(ProgressUpdate) + Send>;

impl ProgressUpdate {
    /// Creates a new progress update for the start of a stage.
    pub fn new_stage(description: impl Into<String>, total_items: Option<u64>) -> Self {
        ProgressUpdate {
            stage_description: description.into(),
            current_item: 0,
            total_items,
            message: None,
        }
    }

    /// Creates an update for an already started stage.
    pub fn advance(
        description: impl Into<String>,
        current_item: u64,
        total_items: Option<u64>,
        message: Option<String>,
    ) -> Self {
        ProgressUpdate {
            stage_description: description.into(),
            current_item,
            total_items,
            message,
        }
    }
}
