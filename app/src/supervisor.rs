use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::capability::RemoteDriveCapability;
use domain::feedback::{FeedbackCallback, FeedbackCommand};
use domain::model::{FusmState, JobId, Progress, ProgressHandle};
use infrastructure::sync::RetryTimer;
use service::JobExecutor;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::background_service::BackgroundService;
use crate::config::AppConfig;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum Event {
    ScanJobs,
    AddJob(JobId),
    RetryJob(JobId),
    ScheduleRetryJob(JobId, u64, Option<FusmState>),
    ReleaseJob(JobId),
    JobTerminated(JobId),
    GetProgress(oneshot::Sender<(f64, f64)>),
    GetJobsN(oneshot::Sender<usize>),
    StopAll(oneshot::Sender<()>),
}

struct ActiveJob {
    abort: AbortHandle,
    progress: ProgressHandle,
    /// Resolves once the executor task has actually finished running (aborted, panicked, or
    /// returned), so `stop_all` can wait for real unwind instead of returning the instant abort
    /// is requested.
    done: oneshot::Receiver<()>,
}

/// Owner of the active/scheduled job maps and their timers. All mutation happens inside
/// [`Self::worker_loop`], the single task that drains `mailbox`; every other method just enqueues
/// an event and, where a reply is expected, waits on a oneshot channel.
pub struct UploadsSupervisor<D> {
    events: flume::Sender<Event>,
    mailbox: flume::Receiver<Event>,
    config: Arc<AppConfig>,
    drive: Arc<D>,
}

impl<D: RemoteDriveCapability + Send + Sync + 'static> UploadsSupervisor<D> {
    pub fn new(config: Arc<AppConfig>, drive: Arc<D>) -> Self {
        let (events, mailbox) = flume::unbounded();
        Self { events, mailbox, config, drive }
    }

    pub fn scan_jobs(&self) {
        let _ = self.events.send(Event::ScanJobs);
    }

    pub async fn get_progress(&self) -> (f64, f64) {
        let (reply, rx) = oneshot::channel();
        if self.events.send(Event::GetProgress(reply)).is_err() {
            return (0.0, 0.0);
        }
        tokio::time::timeout(REPLY_TIMEOUT, rx).await.ok().and_then(Result::ok).unwrap_or((0.0, 0.0))
    }

    pub async fn get_jobs_n(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.events.send(Event::GetJobsN(reply)).is_err() {
            return 0;
        }
        tokio::time::timeout(REPLY_TIMEOUT, rx).await.ok().and_then(Result::ok).unwrap_or(0)
    }

    pub async fn stop_all(&self) {
        let (reply, rx) = oneshot::channel();
        if self.events.send(Event::StopAll(reply)).is_err() {
            return;
        }
        let _ = tokio::time::timeout(REPLY_TIMEOUT, rx).await;
    }

    fn feedback_for(&self, id: JobId) -> FeedbackCallback {
        let events = self.events.clone();
        Arc::new(move |command: FeedbackCommand| {
            let event = match command {
                FeedbackCommand::ScheduleRetry(seconds, state) => {
                    Event::ScheduleRetryJob(id.clone(), seconds, Some(state))
                }
                FeedbackCommand::Release => Event::ReleaseJob(id.clone()),
            };
            let _ = events.send(event);
        })
    }

    fn spawn_executor(&self, id: JobId, retry_state: Option<FusmState>) -> ActiveJob {
        let job_root = self.config.jobs_root.join(id.as_ref());
        let progress = ProgressHandle::default();
        let executor = JobExecutor::new(
            job_root,
            self.config.destination_path.clone(),
            self.drive.clone(),
            self.config.file_exceptions.iter().cloned().collect(),
            self.config.retry_seconds,
            self.feedback_for(id.clone()),
            progress.clone(),
        );

        let log_id = id.clone();
        let run_events = self.events.clone();
        let run = async move {
            let result = match retry_state {
                Some(state) => executor.run_retry(state).await,
                None => executor.run().await,
            };
            if let Err(e) = result {
                tracing::error!(job_id = %log_id, "job executor failed: {e}");
                let _ = run_events.send(Event::JobTerminated(log_id));
            }
        };
        let handle = tokio::spawn(run);
        let abort = handle.abort_handle();

        let (done_tx, done_rx) = oneshot::channel();
        let events = self.events.clone();
        tokio::spawn(async move {
            if handle.await.is_err() {
                let _ = events.send(Event::JobTerminated(id));
            }
            let _ = done_tx.send(());
        });

        ActiveJob { abort, progress, done: done_rx }
    }

    /// Sends `ScanJobs` on every tick until the mailbox is gone (the worker loop has exited).
    fn spawn_scanner(&self) {
        let events = self.events.clone();
        let interval = Duration::from_secs(self.config.scan_interval_secs);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            loop {
                ticks.tick().await;
                if events.send(Event::ScanJobs).is_err() {
                    break;
                }
            }
        });
    }

    async fn handle_scan_jobs(&self, known: impl Fn(&JobId) -> bool) {
        let jobs_root = self.config.jobs_root.clone();
        let ids = tokio::task::spawn_blocking(move || list_job_dirs(&jobs_root))
            .await
            .unwrap_or_default();
        for id in ids {
            if !known(&id) {
                let _ = self.events.send(Event::AddJob(id));
            }
        }
    }

    async fn worker_loop(&self) {
        let mut active: HashMap<JobId, ActiveJob> = HashMap::new();
        let mut scheduled: HashMap<JobId, Option<FusmState>> = HashMap::new();
        let mut timers: HashMap<JobId, RetryTimer> = HashMap::new();

        while let Ok(event) = self.mailbox.recv_async().await {
            match event {
                Event::ScanJobs => {
                    self.handle_scan_jobs(|id| active.contains_key(id) || scheduled.contains_key(id))
                        .await;
                }
                Event::AddJob(id) => {
                    if !active.contains_key(&id) && !scheduled.contains_key(&id) {
                        let job = self.spawn_executor(id.clone(), None);
                        active.insert(id, job);
                    }
                }
                Event::RetryJob(id) => {
                    if let Some(state) = scheduled.remove(&id) {
                        timers.remove(&id);
                        let job = self.spawn_executor(id.clone(), state);
                        active.insert(id, job);
                    }
                }
                Event::ScheduleRetryJob(id, seconds, state) => {
                    active.remove(&id);
                    scheduled.insert(id.clone(), state);
                    let events = self.events.clone();
                    let fire_id = id.clone();
                    let timer = RetryTimer::spawn(Duration::from_secs(seconds), async move {
                        let _ = events.send(Event::RetryJob(fire_id));
                    });
                    timers.insert(id, timer);
                }
                Event::ReleaseJob(id) => {
                    active.remove(&id);
                }
                Event::JobTerminated(id) => {
                    active.remove(&id);
                    let _ = self.events.send(Event::ScheduleRetryJob(
                        id,
                        self.config.crash_retry_secs,
                        None,
                    ));
                }
                Event::GetProgress(reply) => {
                    let _ = reply.send(aggregate_progress(active.values().map(|j| &j.progress)));
                }
                Event::GetJobsN(reply) => {
                    let _ = reply.send(active.len());
                }
                Event::StopAll(reply) => {
                    for (_, timer) in timers.drain() {
                        timer.cancel();
                    }
                    let mut pending_done = Vec::new();
                    for (_, job) in active.drain() {
                        job.abort.abort();
                        pending_done.push(job.done);
                    }
                    scheduled.clear();
                    let join_all = async {
                        for done in pending_done {
                            let _ = done.await;
                        }
                    };
                    let _ = tokio::time::timeout(STOP_JOIN_TIMEOUT, join_all).await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }
}

fn list_job_dirs(jobs_root: &std::path::Path) -> Vec<JobId> {
    let Ok(entries) = std::fs::read_dir(jobs_root) else { return Vec::new() };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .map(|name| JobId::from(name.as_str()))
        .collect()
}

/// Weighted average of each active job's progress by its share of the total file count / byte
/// count, treating a zero denominator as a zero ratio rather than dividing by it.
fn aggregate_progress<'a>(jobs: impl Iterator<Item = &'a ProgressHandle>) -> (f64, f64) {
    let snapshots: Vec<Progress> = jobs.map(|h| *h.lock().unwrap()).collect();
    if snapshots.is_empty() {
        return (0.0, 0.0);
    }
    let total_files: usize = snapshots.iter().map(|p| p.total_files).sum();
    let total_size: u64 = snapshots.iter().map(|p| p.total_size).sum();

    let weighted = |num: f64, denom: f64| if denom == 0.0 { 0.0 } else { num / denom };
    let progress_files = snapshots
        .iter()
        .map(|p| p.progress_files * weighted(p.total_files as f64, total_files as f64))
        .sum();
    let progress_size = snapshots
        .iter()
        .map(|p| p.progress_size * weighted(p.total_size as f64, total_size as f64))
        .sum();
    (progress_files, progress_size)
}

#[async_trait::async_trait]
impl<D: RemoteDriveCapability + Send + Sync + 'static> BackgroundService for UploadsSupervisor<D> {
    async fn run(&self) {
        self.spawn_scanner();
        self.worker_loop().await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use domain::capability::MockRemoteDriveCapability;

    use super::*;

    fn config(jobs_root: PathBuf) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            jobs_root,
            destination_path: String::new(),
            file_exceptions: Vec::new(),
            scan_interval_secs: 300,
            retry_seconds: 300,
            crash_retry_secs: 1800,
            oauth: crate::config::OAuthConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                token_cache_path: PathBuf::from("token.json"),
            },
            telemetry: Default::default(),
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_jobs_root_has_no_active_jobs_and_zero_progress() {
        let dir = tempfile::tempdir().unwrap();
        let drive = MockRemoteDriveCapability::new();
        let supervisor = Arc::new(UploadsSupervisor::new(config(dir.path().to_path_buf()), Arc::new(drive)));
        let handle = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.worker_loop().await }
        });

        supervisor.scan_jobs();
        assert_eq!(supervisor.get_jobs_n().await, 0);
        assert_eq!(supervisor.get_progress().await, (0.0, 0.0));

        supervisor.stop_all().await;
        let _ = handle.await;
    }

    /// S8: progress aggregation is weighted by each job's share of the combined totals.
    #[test]
    fn weighted_progress_aggregates_across_jobs() {
        let a: ProgressHandle = Arc::new(std::sync::Mutex::new(Progress {
            progress_files: 1.0,
            progress_size: 1.0,
            total_files: 1,
            total_size: 100,
        }));
        let b: ProgressHandle = Arc::new(std::sync::Mutex::new(Progress {
            progress_files: 0.0,
            progress_size: 0.0,
            total_files: 3,
            total_size: 300,
        }));
        let (progress_files, progress_size) = aggregate_progress([&a, &b].into_iter());
        assert_eq!(progress_files, 1.0 * (1.0 / 4.0));
        assert_eq!(progress_size, 1.0 * (100.0 / 400.0));
    }

    #[test]
    fn empty_progress_set_is_zero() {
        assert_eq!(aggregate_progress(std::iter::empty::<&ProgressHandle>()), (0.0, 0.0));
    }
}
