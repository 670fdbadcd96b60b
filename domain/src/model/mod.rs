pub mod command;
pub mod file_entry;
pub mod progress;
pub mod state;

#[rustfmt::skip]
pub use self::{
    command::Command,
    file_entry::{FileEntry, JobId, Path},
    progress::{Progress, ProgressHandle},
    state::FusmState,
};
