use std::collections::HashMap;

use super::file_entry::{FileEntry, Path};

/// The FUSM's persisted retry state: `files` (what's left to upload) and `files_original`
/// (the full set captured at `start`, never mutated). `total_size` and `uploaded_size` are
/// derived from these two maps rather than stored, so the invariant `files ⊆ files_original`
/// cannot drift out of sync with the progress numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FusmState {
    pub files: HashMap<Path, FileEntry>,
    pub files_original: HashMap<Path, FileEntry>,
}

impl FusmState {
    pub fn total_size(&self) -> u64 {
        self.files_original.values().map(|f| f.size).sum()
    }

    pub fn uploaded_size(&self) -> u64 {
        self.total_size() - self.files.values().map(|f| f.size).sum::<u64>()
    }

    pub fn progress(&self) -> (f64, f64) {
        let total_files = self.files_original.len();
        let total_size = self.total_size();
        if total_files == 0 || total_size == 0 {
            return (0.0, 0.0);
        }
        let done_files = total_files - self.files.len();
        let progress_files = done_files as f64 / total_files as f64;
        let progress_size = self.uploaded_size() as f64 / total_size as f64;
        (progress_files, progress_size)
    }
}
