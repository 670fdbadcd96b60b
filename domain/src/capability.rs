use std::path::PathBuf;

/// The sentinel id denoting the drive root, used as a parent id when no destination path
/// component needs to be resolved.
pub const DRIVE_ROOT: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveEntry {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct UploadFileRequest {
    pub title: String,
    pub spaces: Vec<&'static str>,
    pub parents: Option<Vec<String>>,
    pub content_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to refresh access token: {0}")]
pub struct RefreshError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum DriveApiError {
    #[error("transport error talking to the drive: {0}")]
    Transport(String),
    #[error("drive rejected the request: {0}")]
    Rejected(String),
}

/// The remote object store, abstracted to the handful of operations the job executor needs.
/// The concrete implementation (a Google Drive v2 REST client) lives in the `service` crate;
/// this trait is what keeps [`crate::fusm`] and the executor decoupled from that wire protocol.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait::async_trait]
pub trait RemoteDriveCapability: Send + Sync {
    fn is_token_expired(&self) -> bool;

    async fn refresh(&self) -> Result<(), RefreshError>;

    async fn list_children(&self, parent_id: &str) -> Result<Vec<DriveEntry>, DriveApiError>;

    async fn create_folder<'a>(
        &'a self,
        title: &'a str,
        parent_id: Option<&'a str>,
    ) -> Result<String, DriveApiError>;

    async fn create_and_upload_file(&self, req: UploadFileRequest) -> Result<(), DriveApiError>;
}
