use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use domain::capability::{RemoteDriveCapability, UploadFileRequest, DRIVE_ROOT};
use domain::error::FusmError;
use domain::feedback::{FeedbackCallback, FeedbackCommand};
use domain::fusm::FilesUploadSm;
use domain::model::{Command, FileEntry, FusmState, ProgressHandle};

use crate::directory_cache::DirectoryCache;
use crate::lock::{self, JobLock, LockError};
use crate::listing;
use crate::spaces;

/// The FUSM's lock and session type parameters, instantiated for this executor. `()` for the
/// session: the actual authenticated handle is `self.drive`, held for the executor's whole
/// lifetime rather than threaded through commands — the FUSM only needs to know *that* a
/// session is open, not carry its payload.
type Sm = FilesUploadSm<JobLock, ()>;

#[derive(Debug, thiserror::Error)]
pub enum JobExecutorError {
    #[error("fusm protocol violation: {0}")]
    Fusm(#[from] FusmError),
    #[error("background task panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Drives one [`FilesUploadSm`] to completion, interpreting its commands against the local
/// filesystem and a [`RemoteDriveCapability`]. Owned and run by exactly one supervisor-spawned
/// task; never shared.
pub struct JobExecutor<D> {
    job_root: PathBuf,
    src_path: PathBuf,
    dst_path: String,
    drive: Arc<D>,
    file_exceptions: HashSet<String>,
    retry_seconds: u64,
    dir_cache: DirectoryCache,
    feedback: FeedbackCallback,
    progress: ProgressHandle,
}

impl<D: RemoteDriveCapability + 'static> JobExecutor<D> {
    pub fn new(
        job_root: PathBuf,
        dst_path: String,
        drive: Arc<D>,
        file_exceptions: HashSet<String>,
        retry_seconds: u64,
        feedback: FeedbackCallback,
        progress: ProgressHandle,
    ) -> Self {
        let src_path = job_root.join("data");
        Self {
            job_root,
            src_path,
            dst_path,
            drive,
            file_exceptions,
            retry_seconds,
            dir_cache: DirectoryCache::new(),
            feedback,
            progress,
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.job_root.join(".lock")
    }

    /// Runs a fresh job: lists `data/` and drives the FUSM from `start`.
    pub async fn run(mut self) -> Result<(), JobExecutorError> {
        let src_path = self.src_path.clone();
        let exceptions = self.file_exceptions.clone();
        let files: Vec<FileEntry> =
            tokio::task::spawn_blocking(move || listing::list_recursive(&src_path, &exceptions))
                .await?
                .unwrap_or_default();

        let mut sm = Sm::new(self.retry_seconds);
        let commands = sm.start(files)?;
        self.drain(&mut sm, commands).await
    }

    /// Resumes a job from persisted retry state.
    pub async fn run_retry(mut self, state: FusmState) -> Result<(), JobExecutorError> {
        let mut sm = Sm::new(self.retry_seconds);
        let commands = sm.retry(state)?;
        self.drain(&mut sm, commands).await
    }

    async fn drain(
        &mut self,
        sm: &mut Sm,
        mut commands: Vec<Command<JobLock, ()>>,
    ) -> Result<(), JobExecutorError> {
        self.publish_progress(sm);
        while !commands.is_empty() {
            let mut next = Vec::new();
            for command in commands {
                next.extend(self.handle(sm, command).await?);
            }
            self.publish_progress(sm);
            commands = next;
        }
        Ok(())
    }

    fn publish_progress(&self, sm: &Sm) {
        let (progress_files, progress_size) = sm.progress();
        let (total_files, total_size) = sm.total();
        *self.progress.lock().unwrap() =
            domain::model::Progress { progress_files, progress_size, total_files, total_size };
    }

    async fn handle(
        &mut self,
        sm: &mut Sm,
        command: Command<JobLock, ()>,
    ) -> Result<Vec<Command<JobLock, ()>>, JobExecutorError> {
        let out = match command {
            Command::LockJob => self.lock_job(sm).await?,
            Command::UnlockJob(lock) => self.unlock_job(sm, lock)?,
            Command::OpenSession => self.open_session(sm).await?,
            Command::CloseSession => sm.session_closed()?,
            Command::UploadFile((), path) => self.upload_file(sm, path).await?,
            Command::ReleaseFile(path) => {
                self.release_file(&path).await;
                Vec::new()
            }
            Command::RemoveData => self.remove_data(sm).await?,
            Command::RemoveJob => self.remove_job(sm).await?,
            Command::ScheduleRetry(seconds, state) => {
                (self.feedback)(FeedbackCommand::ScheduleRetry(seconds, state));
                sm.scheduled_retry()?
            }
            Command::ReleaseSm => {
                (self.feedback)(FeedbackCommand::Release);
                Vec::new()
            }
        };
        Ok(out)
    }

    async fn lock_job(&mut self, sm: &mut Sm) -> Result<Vec<Command<JobLock, ()>>, JobExecutorError> {
        let lock_path = self.lock_path();
        let result = tokio::task::spawn_blocking(move || lock::acquire(&lock_path)).await?;
        Ok(match result {
            Ok(lock) => sm.data_locked(lock)?,
            Err(LockError::Taken) => sm.data_lock_failed_taken()?,
            Err(LockError::Unavailable(_)) => sm.data_lock_failed_other()?,
        })
    }

    fn unlock_job(
        &mut self,
        sm: &mut Sm,
        lock: JobLock,
    ) -> Result<Vec<Command<JobLock, ()>>, JobExecutorError> {
        drop(lock);
        Ok(sm.data_unlocked()?)
    }

    async fn open_session(&mut self, sm: &mut Sm) -> Result<Vec<Command<JobLock, ()>>, JobExecutorError> {
        if self.drive.is_token_expired() {
            if let Err(e) = self.drive.refresh().await {
                tracing::error!("error refreshing access token: {e}");
                return Ok(sm.session_open_failed()?);
            }
        }
        Ok(sm.session_opened(())?)
    }

    async fn upload_file(
        &mut self,
        sm: &mut Sm,
        path: String,
    ) -> Result<Vec<Command<JobLock, ()>>, JobExecutorError> {
        tracing::info!(%path, "uploading file");
        match self.upload_file_impl(&path).await {
            Ok(()) => Ok(sm.file_uploaded(&path)?),
            Err(e) => {
                tracing::error!(%path, "error uploading file: {e}");
                self.dir_cache.clear();
                Ok(sm.file_upload_failed(&path)?)
            }
        }
    }

    async fn upload_file_impl(&mut self, path: &str) -> Result<(), domain::capability::DriveApiError> {
        let parent = self.resolve_parent(path).await?;
        let title = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_string();
        let req = UploadFileRequest {
            title,
            spaces: spaces::classify(path),
            parents: parent.map(|id| vec![id]),
            content_path: PathBuf::from(path),
        };
        self.drive.create_and_upload_file(req).await
    }

    /// Resolves the remote parent folder id for a local path, creating intermediate folders
    /// as needed. An explicit loop over path components, not recursion.
    async fn resolve_parent(
        &mut self,
        path: &str,
    ) -> Result<Option<String>, domain::capability::DriveApiError> {
        let dir = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
        let rel = dir.strip_prefix(&self.src_path).unwrap_or(dir);
        let rel_str = rel.to_string_lossy();

        let logical_path = if rel_str.is_empty() {
            self.dst_path.clone()
        } else if self.dst_path.is_empty() {
            rel_str.to_string()
        } else {
            format!("{}/{}", self.dst_path.trim_end_matches('/'), rel_str)
        };

        if logical_path.is_empty() {
            return Ok(None);
        }
        if let Some(id) = self.dir_cache.get(&logical_path) {
            return Ok(Some(id.to_string()));
        }

        let components: Vec<&str> = logical_path.split('/').filter(|c| !c.is_empty()).collect();
        let mut current_id = DRIVE_ROOT.to_string();
        for name in components {
            let children = self.drive.list_children(&current_id).await?;
            current_id = match children.into_iter().find(|c| c.title == name) {
                Some(existing) => existing.id,
                None => self.drive.create_folder(name, Some(&current_id)).await?,
            };
        }
        self.dir_cache.insert(logical_path, current_id.clone());
        Ok(Some(current_id))
    }

    async fn release_file(&self, path: &str) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::error!(%path, "error removing file: {e}");
        }
    }

    async fn remove_data(&mut self, sm: &mut Sm) -> Result<Vec<Command<JobLock, ()>>, JobExecutorError> {
        let src_path = self.src_path.clone();
        let _ = tokio::task::spawn_blocking(move || std::fs::remove_dir_all(src_path)).await?;
        Ok(sm.data_removed()?)
    }

    async fn remove_job(&mut self, sm: &mut Sm) -> Result<Vec<Command<JobLock, ()>>, JobExecutorError> {
        let job_root = self.job_root.clone();
        let _ = tokio::task::spawn_blocking(move || std::fs::remove_dir_all(job_root)).await?;
        Ok(sm.job_removed()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use domain::capability::{DriveEntry, MockRemoteDriveCapability};
    use mockall::predicate::eq;
    use tempfile::TempDir;

    use super::*;

    fn job_dir(files: &[(&str, &[u8])]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::File::create(dir.path().join(".lock")).unwrap();
        for (rel, content) in files {
            let path = data.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    fn executor(
        job_root: PathBuf,
        drive: MockRemoteDriveCapability,
        feedback: Arc<Mutex<Vec<FeedbackCommand>>>,
    ) -> JobExecutor<MockRemoteDriveCapability> {
        JobExecutor::new(
            job_root,
            String::new(),
            Arc::new(drive),
            HashSet::new(),
            300,
            Arc::new(move |cmd| feedback.lock().unwrap().push(cmd)),
            ProgressHandle::default(),
        )
    }

    /// S1: empty job.
    #[tokio::test]
    async fn empty_job_success_trace() {
        let dir = job_dir(&[]);
        let mut drive = MockRemoteDriveCapability::new();
        drive.expect_is_token_expired().returning(|| false);
        let feedback = Arc::new(Mutex::new(Vec::new()));
        executor(dir.path().to_path_buf(), drive, feedback.clone()).run().await.unwrap();

        assert!(!dir.path().exists());
        assert!(matches!(feedback.lock().unwrap()[..], [FeedbackCommand::Release]));
    }

    /// S2: one file, trivial destination.
    #[tokio::test]
    async fn one_file_trivial_destination() {
        let dir = job_dir(&[("cool_file.txt", b"hi")]);
        let mut drive = MockRemoteDriveCapability::new();
        drive.expect_is_token_expired().returning(|| false);
        drive
            .expect_create_and_upload_file()
            .withf(|req| req.title == "cool_file.txt" && req.spaces == vec!["drive"] && req.parents.is_none())
            .times(1)
            .returning(|_| Ok(()));
        let feedback = Arc::new(Mutex::new(Vec::new()));
        executor(dir.path().to_path_buf(), drive, feedback.clone()).run().await.unwrap();

        assert!(!dir.path().exists());
        assert!(matches!(feedback.lock().unwrap()[..], [FeedbackCommand::Release]));
    }

    /// S3: one file in a nested dir gets the photos classification and a folder is created.
    #[tokio::test]
    async fn nested_photo_creates_folder_then_file() {
        let dir = job_dir(&[("photos/IMG_0345.jpg", b"jpg")]);
        let mut drive = MockRemoteDriveCapability::new();
        drive.expect_is_token_expired().returning(|| false);
        drive
            .expect_list_children()
            .with(eq("root"))
            .returning(|_| Ok(Vec::new()));
        drive
            .expect_create_folder()
            .withf(|title, parent| title == "photos" && *parent == Some("root"))
            .returning(|_, _| Ok("folder-id".to_string()));
        drive
            .expect_create_and_upload_file()
            .withf(|req| {
                req.title == "IMG_0345.jpg"
                    && req.spaces == vec!["drive", "photos"]
                    && req.parents == Some(vec!["folder-id".to_string()])
            })
            .times(1)
            .returning(|_| Ok(()));
        let feedback = Arc::new(Mutex::new(Vec::new()));
        executor(dir.path().to_path_buf(), drive, feedback.clone()).run().await.unwrap();

        assert!(!dir.path().exists());
    }

    /// S4: lock already held by another process — no remote calls, no retry.
    #[tokio::test]
    async fn lock_taken_releases_without_retry() {
        let dir = job_dir(&[]);
        let lock_path = dir.path().join(".lock");
        let held = std::fs::OpenOptions::new().write(true).open(&lock_path).unwrap();
        fs2::FileExt::lock_exclusive(&held).unwrap();

        let drive = MockRemoteDriveCapability::new();
        let feedback = Arc::new(Mutex::new(Vec::new()));
        executor(dir.path().to_path_buf(), drive, feedback.clone()).run().await.unwrap();

        assert!(dir.path().exists(), "job directory must survive an abandoned lock attempt");
        assert!(matches!(feedback.lock().unwrap()[..], [FeedbackCommand::Release]));
    }

    /// S7: an expired token is refreshed once before the session opens.
    #[tokio::test]
    async fn expired_token_is_refreshed() {
        let dir = job_dir(&[]);
        let mut drive = MockRemoteDriveCapability::new();
        drive.expect_is_token_expired().returning(|| true);
        drive.expect_refresh().times(1).returning(|| Ok(()));
        let feedback = Arc::new(Mutex::new(Vec::new()));
        executor(dir.path().to_path_buf(), drive, feedback.clone()).run().await.unwrap();

        assert!(matches!(feedback.lock().unwrap()[..], [FeedbackCommand::Release]));
    }

    /// Property 9: a failed upload clears the directory cache before the next attempt.
    #[tokio::test]
    async fn upload_failure_clears_directory_cache() {
        let dir = job_dir(&[("a/one.txt", b"1"), ("a/two.txt", b"2")]);
        let mut drive = MockRemoteDriveCapability::new();
        drive.expect_is_token_expired().returning(|| false);
        drive
            .expect_list_children()
            .returning(|_| Ok(vec![DriveEntry { id: "a-id".to_string(), title: "a".to_string() }]));
        drive.expect_create_folder().never();

        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        drive.expect_create_and_upload_file().returning(move |_| {
            let mut n = calls_clone.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Err(domain::capability::DriveApiError::Rejected("boom".to_string()))
            } else {
                Ok(())
            }
        });

        let feedback = Arc::new(Mutex::new(Vec::new()));
        executor(dir.path().to_path_buf(), drive, feedback.clone()).run().await.unwrap();

        assert!(!dir.path().exists());
    }
}
