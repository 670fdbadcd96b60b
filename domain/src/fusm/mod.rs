mod sub_sm;

pub use sub_sm::{FileUploadSubSm, SubEffect, SubSmState};

use std::collections::HashMap;

use crate::error::FusmError;
use crate::model::command::{Command, Commands, Seconds};
use crate::model::file_entry::{FileEntry, Path};
use crate::model::state::FusmState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusmWorkflowState {
    Idle,
    Locking,
    OpeningSession,
    Uploading,
    ClosingSession,
    RemovingData,
    Unlocking,
    RemovingJob,
    Done,
    ClosingSessRetry,
    UnlockingRetry,
    SchedulingRetry,
}

/// Default retry delay: 5 minutes, matching the source's constant. Policy allows any value in
/// `[30s, 7 days]`; callers pick one via [`FilesUploadSm::new`].
pub const DEFAULT_RETRY_SECONDS: Seconds = 5 * 60;

/// Whole-job workflow. Hosts a [`FileUploadSubSm`] for the file-upload loop. Pure: it never
/// touches the filesystem or network, only emits [`Command`]s for the executor to interpret and
/// consumes the outcomes as events.
///
/// `L` and `S` are the executor's lock and session handle types, carried opaquely between the
/// `data_locked`/`unlock_job` pair and the `session_opened`/`close_session` span respectively.
pub struct FilesUploadSm<L, S> {
    state: FusmWorkflowState,
    sub_sm: FileUploadSubSm,
    files: HashMap<Path, FileEntry>,
    files_original: HashMap<Path, FileEntry>,
    lock: Option<L>,
    session: Option<S>,
    retry_seconds: Seconds,
}

impl<L, S: Clone> FilesUploadSm<L, S> {
    pub fn new(retry_seconds: Seconds) -> Self {
        Self {
            state: FusmWorkflowState::Idle,
            sub_sm: FileUploadSubSm::new(),
            files: HashMap::new(),
            files_original: HashMap::new(),
            lock: None,
            session: None,
            retry_seconds,
        }
    }

    pub fn state(&self) -> FusmWorkflowState {
        self.state
    }

    pub fn progress(&self) -> (f64, f64) {
        self.persisted_state().progress()
    }

    pub fn total(&self) -> (usize, u64) {
        (self.files_original.len(), self.files_original.values().map(|f| f.size).sum())
    }

    pub fn start(&mut self, files: Vec<FileEntry>) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::Idle, "start")?;
        self.files_original = files.into_iter().map(|f| (f.path.clone(), f)).collect();
        self.files = self.files_original.clone();
        self.state = FusmWorkflowState::Locking;
        Ok(vec![Command::LockJob])
    }

    pub fn retry(&mut self, state: FusmState) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::Idle, "retry")?;
        self.files = state.files;
        self.files_original = state.files_original;
        self.state = FusmWorkflowState::Locking;
        Ok(vec![Command::LockJob])
    }

    pub fn data_locked(&mut self, lock: L) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::Locking, "data_locked")?;
        self.lock = Some(lock);
        self.state = FusmWorkflowState::OpeningSession;
        Ok(vec![Command::OpenSession])
    }

    pub fn data_lock_failed_taken(&mut self) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::Locking, "data_lock_failed_taken")?;
        self.state = FusmWorkflowState::Done;
        Ok(vec![Command::ReleaseSm])
    }

    pub fn data_lock_failed_other(&mut self) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::Locking, "data_lock_failed_other")?;
        self.state = FusmWorkflowState::SchedulingRetry;
        Ok(vec![Command::ScheduleRetry(self.retry_seconds, self.persisted_state())])
    }

    pub fn session_opened(&mut self, session: S) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::OpeningSession, "session_opened")?;
        self.session = Some(session);
        self.state = FusmWorkflowState::Uploading;
        let files: Vec<FileEntry> = self.files.values().cloned().collect();
        let effects = self.sub_sm.start(&files);
        self.translate_sub_effects(effects)
    }

    pub fn session_open_failed(&mut self) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::OpeningSession, "session_open_failed")?;
        let lock = self.lock.take().expect("lock must be held while opening session");
        self.state = FusmWorkflowState::UnlockingRetry;
        Ok(vec![Command::UnlockJob(lock)])
    }

    pub fn file_uploaded(&mut self, path: &str) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::Uploading, "file_uploaded")?;
        let effects = self.sub_sm.upload_succeed(path)?;
        self.translate_sub_effects(effects)
    }

    pub fn file_upload_failed(&mut self, path: &str) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::Uploading, "file_upload_failed")?;
        let effects = self.sub_sm.upload_failed(path)?;
        self.translate_sub_effects(effects)
    }

    pub fn session_closed(&mut self) -> Result<Commands<L, S>, FusmError> {
        match self.state {
            FusmWorkflowState::ClosingSession => {
                self.state = FusmWorkflowState::RemovingData;
                Ok(vec![Command::RemoveData])
            }
            FusmWorkflowState::ClosingSessRetry => {
                let lock = self.lock.take().expect("lock must be held while closing session");
                self.state = FusmWorkflowState::UnlockingRetry;
                Ok(vec![Command::UnlockJob(lock)])
            }
            other => Err(self.invalid_transition("session_closed", other)),
        }
    }

    pub fn data_removed(&mut self) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::RemovingData, "data_removed")?;
        let lock = self.lock.take().expect("lock must be held while removing data");
        self.state = FusmWorkflowState::Unlocking;
        Ok(vec![Command::UnlockJob(lock)])
    }

    pub fn data_unlocked(&mut self) -> Result<Commands<L, S>, FusmError> {
        match self.state {
            FusmWorkflowState::Unlocking => {
                self.state = FusmWorkflowState::RemovingJob;
                Ok(vec![Command::RemoveJob])
            }
            FusmWorkflowState::UnlockingRetry => {
                self.state = FusmWorkflowState::SchedulingRetry;
                Ok(vec![Command::ScheduleRetry(self.retry_seconds, self.persisted_state())])
            }
            other => Err(self.invalid_transition("data_unlocked", other)),
        }
    }

    pub fn job_removed(&mut self) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::RemovingJob, "job_removed")?;
        self.state = FusmWorkflowState::Done;
        Ok(vec![Command::ReleaseSm])
    }

    pub fn scheduled_retry(&mut self) -> Result<Commands<L, S>, FusmError> {
        self.require(FusmWorkflowState::SchedulingRetry, "scheduled_retry")?;
        self.state = FusmWorkflowState::Done;
        Ok(vec![Command::ReleaseSm])
    }

    fn translate_sub_effects(
        &mut self,
        effects: Vec<SubEffect>,
    ) -> Result<Commands<L, S>, FusmError> {
        let mut out = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                SubEffect::UploadFile(path) => {
                    let session = self.session.clone().expect("session must be open while uploading");
                    out.push(Command::UploadFile(session, path));
                }
                SubEffect::ReleaseFile(path) => {
                    // This is the single place progress advances: dropping the entry from
                    // `files` is what `FusmState::progress` reads uploaded_size from.
                    self.files.remove(&path);
                    out.push(Command::ReleaseFile(path));
                }
                SubEffect::Empty => {
                    self.session = None;
                    self.state = FusmWorkflowState::ClosingSession;
                    out.push(Command::CloseSession);
                }
                SubEffect::FinalError(_) => {
                    self.session = None;
                    self.state = FusmWorkflowState::ClosingSessRetry;
                    out.push(Command::CloseSession);
                }
            }
        }
        Ok(out)
    }

    fn persisted_state(&self) -> FusmState {
        FusmState { files: self.files.clone(), files_original: self.files_original.clone() }
    }

    fn require(&self, expected: FusmWorkflowState, event: &'static str) -> Result<(), FusmError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_transition(event, self.state))
        }
    }

    fn invalid_transition(&self, event: &'static str, state: FusmWorkflowState) -> FusmError {
        FusmError::InvalidTransition { event, state: state.label() }
    }
}

impl FusmWorkflowState {
    fn label(self) -> &'static str {
        match self {
            FusmWorkflowState::Idle => "idle",
            FusmWorkflowState::Locking => "locking",
            FusmWorkflowState::OpeningSession => "opening_session",
            FusmWorkflowState::Uploading => "uploading",
            FusmWorkflowState::ClosingSession => "closing_session",
            FusmWorkflowState::RemovingData => "removing_data",
            FusmWorkflowState::Unlocking => "unlocking",
            FusmWorkflowState::RemovingJob => "removing_job",
            FusmWorkflowState::Done => "done",
            FusmWorkflowState::ClosingSessRetry => "closing_sess_retry",
            FusmWorkflowState::UnlockingRetry => "unlocking_retry",
            FusmWorkflowState::SchedulingRetry => "scheduling_retry",
        }
    }
}
