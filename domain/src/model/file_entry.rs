use std::sync::Arc;

/// An absolute path to a file under a job's `data/` tree.
///
/// Plain `String` rather than `PathBuf`: the FUSM never touches the filesystem, it only
/// compares and hashes paths as opaque keys.
pub type Path = String;

pub type Size = u64;

/// Opaque job identifier, unique within the jobs root. In practice the job directory's name.
pub type JobId = Arc<str>;

/// `(absolute path, size in bytes)`. Immutable for the life of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: Path,
    pub size: Size,
}

impl FileEntry {
    pub fn new(path: impl Into<Path>, size: Size) -> Self {
        Self { path: path.into(), size }
    }
}

impl From<(Path, Size)> for FileEntry {
    fn from((path, size): (Path, Size)) -> Self {
        Self { path, size }
    }
}
