use std::collections::VecDeque;

use crate::error::InvalidFileError;
use crate::model::file_entry::{FileEntry, Path};

/// Up to 3 attempts per file: the initial try plus 2 requeues.
const RETRIES_PER_FILE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubSmState {
    Idle,
    UploadingFile,
    Done,
}

/// The side effects of [`FileUploadSubSm`], pre-translation: the owning [`super::FilesUploadSm`]
/// maps `UploadFile`/`ReleaseFile` onto its own `Command` variants and terminates the loop on
/// `Empty`/`FinalError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubEffect {
    UploadFile(Path),
    ReleaseFile(Path),
    Empty,
    FinalError(Path),
}

/// Per-file upload loop with bounded retries. A queue of `(path, retries_left)` plus an
/// optional "current" entry being uploaded; the two are disjoint by construction — popping
/// into `current` always happens exactly once per dequeue, and requeues append to the tail.
#[derive(Debug, Default)]
pub struct FileUploadSubSm {
    queue: VecDeque<(Path, u8)>,
    current: Option<(Path, u8)>,
}

impl FileUploadSubSm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SubSmState {
        match (&self.current, self.queue.is_empty()) {
            (Some(_), _) => SubSmState::UploadingFile,
            (None, true) => SubSmState::Done,
            (None, false) => SubSmState::UploadingFile,
        }
    }

    pub fn start(&mut self, files: &[FileEntry]) -> Vec<SubEffect> {
        self.queue = files.iter().map(|f| (f.path.clone(), RETRIES_PER_FILE)).collect();
        self.current = None;
        if self.queue.is_empty() {
            return vec![SubEffect::Empty];
        }
        vec![SubEffect::UploadFile(self.next())]
    }

    pub fn upload_succeed(&mut self, path: &str) -> Result<Vec<SubEffect>, InvalidFileError> {
        self.take_current(path)?;
        let mut out = vec![SubEffect::ReleaseFile(path.to_string())];
        if self.queue.is_empty() {
            out.push(SubEffect::Empty);
        } else {
            out.push(SubEffect::UploadFile(self.next()));
        }
        Ok(out)
    }

    pub fn upload_failed(&mut self, path: &str) -> Result<Vec<SubEffect>, InvalidFileError> {
        let (cur_path, retries_left) = self.peek_current(path)?;
        if retries_left > 0 {
            self.current = None;
            self.queue.push_back((cur_path, retries_left - 1));
            Ok(vec![SubEffect::UploadFile(self.next())])
        } else {
            self.current = None;
            Ok(vec![SubEffect::FinalError(cur_path)])
        }
    }

    fn peek_current(&self, path: &str) -> Result<(Path, u8), InvalidFileError> {
        match &self.current {
            Some((cur, retries)) if cur == path => Ok((cur.clone(), *retries)),
            Some((cur, _)) => {
                Err(InvalidFileError { expected: Some(cur.clone()), got: path.to_string() })
            }
            None => Err(InvalidFileError { expected: None, got: path.to_string() }),
        }
    }

    fn take_current(&mut self, path: &str) -> Result<(), InvalidFileError> {
        self.peek_current(path)?;
        self.current = None;
        Ok(())
    }

    /// Pop the head of the queue into `current` and return its path. Only called when the
    /// queue is known non-empty by the caller.
    fn next(&mut self) -> Path {
        let entry = self.queue.pop_front().expect("next() called on empty queue");
        let path = entry.0.clone();
        self.current = Some(entry);
        path
    }
}
