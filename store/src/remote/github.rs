//! GitHub contents API backend.
//!
//! Each collection is a file in a repository. Reads go through
//! `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}` with
//! `If-None-Match`; writes through `PUT` on the same URL carrying the blob
//! SHA of the file being replaced.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use gitdoc_engine::Document;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{FetchOutcome, RemoteError, RemoteObject, RemoteStore, WriteHandle};
use crate::config::StoreConfig;

const ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

/// Remote store talking to the GitHub REST API.
#[derive(Clone)]
pub struct GitHubRemote {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

impl std::fmt::Debug for GitHubRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubRemote")
            .field("api_url", &self.api_url)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl GitHubRemote {
    /// Build a remote with its own HTTP client.
    pub fn new(config: &StoreConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(concat!("gitdoc/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Build a remote sharing an existing HTTP client.
    pub fn with_client(client: Client, config: &StoreConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: config.token.clone(),
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url, self.owner, self.repo, path
        )
    }

    fn authorization(&self) -> String {
        format!("token {}", self.token)
    }
}

/// Encode documents the way they are committed: pretty JSON, base64.
pub(crate) fn encode_documents(path: &str, documents: &[Document]) -> Result<String, RemoteError> {
    let bytes = serde_json::to_vec_pretty(documents).map_err(|e| RemoteError::Codec {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(STANDARD.encode(bytes))
}

/// Decode a base64 file body (GitHub wraps it at 60 columns) into documents.
///
/// An empty file decodes to an empty collection.
pub(crate) fn decode_documents(path: &str, content: &str) -> Result<Vec<Document>, RemoteError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| RemoteError::Codec {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Codec {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Map a failed write status to the error the queue acts on.
fn put_error(path: &str, status: StatusCode, body: String) -> RemoteError {
    match status {
        // 422 is what GitHub answers when the sha is missing or does not match
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Conflict(path.to_string())
        }
        StatusCode::NOT_FOUND => RemoteError::NotFound(path.to_string()),
        _ => RemoteError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl RemoteStore for GitHubRemote {
    async fn fetch(
        &self,
        path: &str,
        if_revision: Option<&str>,
    ) -> Result<FetchOutcome, RemoteError> {
        let url = format!("{}?ref={}", self.contents_url(path), self.branch);
        let mut request = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, self.authorization())
            .header(header::ACCEPT, ACCEPT);
        if let Some(revision) = if_revision {
            request = request.header(header::IF_NONE_MATCH, revision);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(path = %path, status = status.as_u16(), "fetched remote object");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let revision = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: ContentsResponse = response.json().await?;
        let documents = decode_documents(path, &body.content)?;

        Ok(FetchOutcome::Modified(RemoteObject {
            documents,
            revision,
            write_handle: body.sha,
        }))
    }

    async fn put(
        &self,
        path: &str,
        documents: &[Document],
        write_handle: Option<&str>,
        message: &str,
    ) -> Result<WriteHandle, RemoteError> {
        let body = PutRequest {
            message,
            content: encode_documents(path, documents)?,
            branch: &self.branch,
            sha: write_handle,
        };

        let response = self
            .client
            .put(self.contents_url(path))
            .header(header::AUTHORIZATION, self.authorization())
            .header(header::ACCEPT, ACCEPT)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        tracing::debug!(path = %path, status = status.as_u16(), "put remote object");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(put_error(path, status, text));
        }

        let written: PutResponse = response.json().await?;
        Ok(written.content.sha)
    }
}
