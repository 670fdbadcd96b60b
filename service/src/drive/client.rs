use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domain::capability::{DriveApiError, DriveEntry, RefreshError, RemoteDriveCapability, UploadFileRequest};
use reqwest::multipart::{Form, Part};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use super::retry::build_http_client;

const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v2/files";
const UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v2/files";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Credentials loaded from the OAuth token cache file: a long-lived refresh token plus the
/// client id/secret issued for this app. No access token is persisted across restarts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoredCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// `reqwest`-based implementation of [`RemoteDriveCapability`] against the Google Drive v2 REST
/// surface. Token refresh is lazy: callers check [`Self::is_token_expired`] and call
/// [`Self::refresh`] themselves, mirroring the source's `auth.access_token_expired` /
/// `auth.Refresh()` pair.
pub struct GoogleDriveClient {
    http: ClientWithMiddleware,
    credentials: StoredCredentials,
    token: RwLock<TokenState>,
}

#[derive(Serialize)]
struct ParentRef<'a> {
    kind: &'static str,
    id: &'a str,
}

impl<'a> ParentRef<'a> {
    fn new(id: &'a str) -> Self {
        Self { kind: "drive#fileLink", id }
    }
}

#[derive(Serialize)]
struct CreateFolderBody<'a> {
    title: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<Vec<ParentRef<'a>>>,
}

#[derive(Serialize)]
struct CreateFileMetadata<'a> {
    title: &'a str,
    spaces: &'a [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<Vec<ParentRef<'a>>>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    title: String,
}

#[derive(Deserialize)]
struct FileListResponse {
    items: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl GoogleDriveClient {
    pub fn new(credentials: StoredCredentials) -> Self {
        Self { http: build_http_client(), credentials, token: RwLock::default() }
    }

    fn bearer(&self) -> Option<String> {
        self.token.read().unwrap().access_token.clone()
    }

    fn transport_err(e: reqwest_middleware::Error) -> DriveApiError {
        DriveApiError::Transport(e.to_string())
    }

    async fn rejected_if_not_success(resp: reqwest::Response) -> Result<reqwest::Response, DriveApiError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(DriveApiError::Rejected(format!("{status}: {body}")))
    }
}

#[async_trait::async_trait]
impl RemoteDriveCapability for GoogleDriveClient {
    fn is_token_expired(&self) -> bool {
        let state = self.token.read().unwrap();
        match (&state.access_token, state.expires_at) {
            (Some(_), Some(expires_at)) => Utc::now() >= expires_at,
            _ => true,
        }
    }

    async fn refresh(&self) -> Result<(), RefreshError> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let resp = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| RefreshError(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(RefreshError(format!("token refresh rejected: {status}")));
        }
        let token: TokenResponse =
            resp.json().await.map_err(|e| RefreshError(e.to_string()))?;

        let mut state = self.token.write().unwrap();
        state.access_token = Some(token.access_token);
        state.expires_at = Some(Utc::now() + Duration::from_secs(token.expires_in.max(0) as u64));
        Ok(())
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<DriveEntry>, DriveApiError> {
        let query = format!("'{parent_id}' in parents and trashed=false");
        let resp = self
            .http
            .get(FILES_ENDPOINT)
            .bearer_auth(self.bearer().unwrap_or_default())
            .query(&[("q", query.as_str())])
            .send()
            .await
            .map_err(Self::transport_err)?;
        let resp = Self::rejected_if_not_success(resp).await?;
        let list: FileListResponse =
            resp.json().await.map_err(|e| DriveApiError::Transport(e.to_string()))?;
        Ok(list.items.into_iter().map(|f| DriveEntry { id: f.id, title: f.title }).collect())
    }

    async fn create_folder<'a>(
        &'a self,
        title: &'a str,
        parent_id: Option<&'a str>,
    ) -> Result<String, DriveApiError> {
        let body = CreateFolderBody {
            title,
            mime_type: FOLDER_MIME_TYPE,
            parents: parent_id.map(|id| vec![ParentRef::new(id)]),
        };
        let resp = self
            .http
            .post(FILES_ENDPOINT)
            .bearer_auth(self.bearer().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_err)?;
        let resp = Self::rejected_if_not_success(resp).await?;
        let created: DriveFile =
            resp.json().await.map_err(|e| DriveApiError::Transport(e.to_string()))?;
        Ok(created.id)
    }

    async fn create_and_upload_file(&self, req: UploadFileRequest) -> Result<(), DriveApiError> {
        let metadata = CreateFileMetadata {
            title: &req.title,
            spaces: &req.spaces,
            parents: req.parents.as_ref().map(|ps| ps.iter().map(|p| ParentRef::new(p)).collect()),
        };
        let metadata_json =
            serde_json::to_string(&metadata).map_err(|e| DriveApiError::Transport(e.to_string()))?;
        let bytes = tokio::fs::read(&req.content_path)
            .await
            .map_err(|e| DriveApiError::Transport(e.to_string()))?;

        let form = Form::new()
            .part("metadata", Part::text(metadata_json).mime_str("application/json").unwrap())
            .part("media", Part::bytes(bytes));

        let resp = self
            .http
            .post(UPLOAD_ENDPOINT)
            .bearer_auth(self.bearer().unwrap_or_default())
            .query(&[("uploadType", "multipart")])
            .multipart(form)
            .send()
            .await
            .map_err(Self::transport_err)?;
        Self::rejected_if_not_success(resp).await?;
        Ok(())
    }
}
