use std::sync::Arc;

use crate::model::command::Seconds;
use crate::model::state::FusmState;

/// What a job executor (or the supervisor itself, on a detected crash) reports back about one
/// job. Tagged with the job id by whoever enqueues it onto the supervisor's mailbox — the
/// executor itself doesn't know about job ids beyond the one it was constructed with.
#[derive(Debug, Clone)]
pub enum FeedbackCommand {
    ScheduleRetry(Seconds, FusmState),
    Release,
}

/// Closure an executor calls to report a [`FeedbackCommand`] to its owning supervisor. The
/// supervisor closes this over the job id and its own mailbox sender when it starts the
/// executor, mirroring the source's `job_callback` closure — the executor itself never learns
/// what the supervisor's event type looks like.
pub type FeedbackCallback = Arc<dyn Fn(FeedbackCommand) + Send + Sync>;
