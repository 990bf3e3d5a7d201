//! GitHub contents API document store.
//!
//! Documents live as files under a data directory of one repository branch.
//! The blob SHA returned by the API is the concurrency token.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::{render_document, ConcurrencyToken, DocumentStore, StoreError, VersionedDocument};

const USER_AGENT: &str = "candidate-tracker-backend/0.1";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Connection settings for the document repository.
#[derive(Debug, Clone)]
pub struct GitHubStoreConfig {
    pub api_url: String,
    pub raw_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: Option<String>,
    /// Directory inside the repository that holds the documents.
    pub data_dir: String,
    /// Serve read-only listings from the raw content host.
    pub raw_reads: bool,
}

/// Response body of `GET /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    download_url: Option<String>,
}

/// Request body of `PUT /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsFile,
}

#[derive(Debug, Deserialize)]
struct PutContentsFile {
    sha: String,
}

/// Document store backed by a GitHub repository.
pub struct GitHubFileStore {
    client: Client,
    config: GitHubStoreConfig,
}

impl GitHubFileStore {
    /// Build a store with its own reqwest client.
    ///
    /// No request timeout is set beyond the client default.
    pub fn new(config: GitHubStoreConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client, config })
    }

    fn repo_path(&self, path: &str) -> String {
        let dir = self.config.data_dir.trim_matches('/');
        let path = path.trim_start_matches('/');
        if dir.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", dir, path)
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.repo_path(path)
        )
    }

    fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.config.raw_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.config.branch,
            self.repo_path(path)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, GITHUB_ACCEPT);
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetch a body too large to be inlined by the contents API.
    async fn download(&self, path: &str, url: &str) -> Result<serde_json::Value, StoreError> {
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(read_status_error(status, path));
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        parse_body(path, &bytes)
    }
}

#[async_trait]
impl DocumentStore for GitHubFileStore {
    async fn get(&self, path: &str) -> Result<Option<VersionedDocument>, StoreError> {
        let url = self.contents_url(path);
        let response = self
            .authorized(self.client.get(&url))
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::debug!(url = %url, status = %status, "GitHub contents read");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(read_status_error(status, path));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        let body: ContentsResponse =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::malformed(path, e))?;

        let content = match (&body.download_url, body.content.trim().is_empty()) {
            (Some(url), true) => self.download(path, url).await?,
            _ => decode_content(path, &body.content)?,
        };

        Ok(Some(VersionedDocument {
            content,
            token: ConcurrencyToken::new(body.sha),
        }))
    }

    async fn put(
        &self,
        path: &str,
        content: &serde_json::Value,
        message: &str,
        token: Option<&ConcurrencyToken>,
    ) -> Result<ConcurrencyToken, StoreError> {
        let url = self.contents_url(path);
        let request = PutContentsRequest {
            message,
            content: STANDARD.encode(render_document(content)?),
            branch: &self.config.branch,
            sha: token.map(ConcurrencyToken::as_str),
        };

        let response = self
            .authorized(self.client.put(&url))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::debug!(
            url = %url,
            status = %status,
            commit_message = message,
            "GitHub contents write"
        );

        match status {
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                return Err(StoreError::ConcurrencyConflict {
                    path: path.to_string(),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Err(StoreError::Authorization(format!(
                    "GitHub refused write to {} ({})",
                    path, status
                )))
            }
            s if !s.is_success() => {
                return Err(StoreError::TransientFetch(format!(
                    "GitHub write to {} failed with {}",
                    path, s
                )))
            }
            _ => {}
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        let written: PutContentsResponse =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::malformed(path, e))?;

        Ok(ConcurrencyToken::new(written.content.sha))
    }

    async fn read_only(&self, path: &str) -> Result<Option<serde_json::Value>, StoreError> {
        if !self.config.raw_reads {
            return Ok(self.get(path).await?.map(|doc| doc.content));
        }

        let url = self.raw_url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::debug!(url = %url, status = %status, "GitHub raw read");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(read_status_error(status, path));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        parse_body(path, &bytes).map(Some)
    }

    fn name(&self) -> &'static str {
        "github"
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    StoreError::TransientFetch(format!("GitHub request failed: {}", err))
}

fn read_status_error(status: StatusCode, path: &str) -> StoreError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        StoreError::Authorization(format!("GitHub refused read of {} ({})", path, status))
    } else {
        StoreError::TransientFetch(format!("GitHub read of {} failed with {}", path, status))
    }
}

/// Decode the base64 `content` field. GitHub wraps it at 60 columns.
fn decode_content(path: &str, encoded: &str) -> Result<serde_json::Value, StoreError> {
    let packed: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(packed)
        .map_err(|e| StoreError::malformed(path, e))?;
    parse_body(path, &bytes)
}

fn parse_body(path: &str, bytes: &[u8]) -> Result<serde_json::Value, StoreError> {
    let text = std::str::from_utf8(bytes).map_err(|e| StoreError::malformed(path, e))?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(text).map_err(|e| StoreError::malformed(path, e))
}
