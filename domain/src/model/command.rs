use super::file_entry::Path;
use super::state::FusmState;

/// Seconds until a scheduled retry fires. Policy enforces `[30, 604_800]` at config-load time,
/// not here: the FUSM only carries the value it was told to carry.
pub type Seconds = u64;

/// A side effect emitted by [`crate::fusm::FilesUploadSm`] for the executor to interpret.
///
/// `L` is the opaque lock handle type, `S` is the opaque session handle type. Both are threaded
/// through the machine without being inspected by it, which is why they are type parameters
/// rather than concrete types: the pure core never touches the filesystem or the network.
#[derive(Debug)]
pub enum Command<L, S> {
    LockJob,
    UnlockJob(L),
    OpenSession,
    CloseSession,
    UploadFile(S, Path),
    ReleaseFile(Path),
    RemoveData,
    RemoveJob,
    ScheduleRetry(Seconds, FusmState),
    ReleaseSm,
}

pub type Commands<L, S> = Vec<Command<L, S>>;
