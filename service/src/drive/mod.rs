mod client;
mod retry;

pub use client::{GoogleDriveClient, StoredCredentials};
