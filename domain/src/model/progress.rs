use std::sync::{Arc, Mutex};

/// A snapshot of one job's upload progress, written by its executor and read by the supervisor
/// for `get_progress` aggregation. The only state shared directly between an executor task and
/// the supervisor task — everything else crosses between them as messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub progress_files: f64,
    pub progress_size: f64,
    pub total_files: usize,
    pub total_size: u64,
}

pub type ProgressHandle = Arc<Mutex<Progress>>;
