//! HTTP implementation of the remote store transport.
//!
//! Speaks a small JSON API: `GET /files` lists the directory, `GET
//! /files/{path}` downloads, `PUT /files/{path}` uploads under optimistic
//! concurrency (HTTP 409 carries the conflict context), `DELETE
//! /files/{path}` removes. The auto-merge runs client-side over plain
//! downloads, so the server needs no merge endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::TransportError;
use crate::merge::{has_conflict_markers, Merger};
use crate::models::{ConflictContext, RemoteContent, RemoteEntry};

use super::{DeleteOutcome, MergeVerdict, RemoteStore, UploadOutcome};

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListResponse {
    files: Vec<RemoteEntry>,
}

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    path: String,
    revision: i64,
    content_hash: String,
    size: i64,
    content: String,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    content: &'a str,
    parent_revision: i64,
    device_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    revision: i64,
    content_hash: String,
}

#[derive(Debug, Deserialize)]
struct ConflictResponse {
    current_revision: i64,
    your_parent_revision: i64,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    parent_revision: i64,
    device_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    conflict: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Asynchronous remote-store client over HTTP.
#[derive(Clone)]
pub struct HttpRemote {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl HttpRemote {
    /// Build a client from the application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.remote.base_url.clone(),
            config.remote.token.clone(),
            Duration::from_secs(config.sync.network_timeout_secs),
        )
    }

    /// Build a client from raw values.
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> Self {
        info!(base_url = %base_url, "initializing remote client");

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("vaultsync"));
        if let Some(ref token) = token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .expect("failed to build reqwest client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout_secs: timeout.as_secs(),
        }
    }

    fn file_url(&self, path: &str) -> String {
        // Paths may contain '/', which the server treats as directory
        // separators, so only the remaining components are escaped.
        let escaped: Vec<String> = path
            .split('/')
            .map(|seg| urlencode(seg))
            .collect();
        format!("{}/files/{}", self.base_url, escaped.join("/"))
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout_secs)
        } else {
            TransportError::HttpError(e)
        }
    }

    async fn error_from_response(resp: reqwest::Response) -> TransportError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        TransportError::ApiError { status, body }
    }
}

/// Minimal percent-encoding for path segments.
fn urlencode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[async_trait]
impl RemoteStore for HttpRemote {
    fn authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    async fn list_files(&self) -> Result<Vec<RemoteEntry>, TransportError> {
        debug!("listing remote files");
        let resp = self
            .http
            .get(format!("{}/files", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let listing: ListResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::ProtocolError(e.to_string()))?;
        debug!(count = listing.files.len(), "fetched remote snapshot");
        Ok(listing.files)
    }

    async fn download(
        &self,
        path: &str,
        revision: Option<i64>,
    ) -> Result<RemoteContent, TransportError> {
        let mut request = self.http.get(self.file_url(path));
        if let Some(rev) = revision {
            request = request.query(&[("revision", rev)]);
        }

        let resp = request.send().await.map_err(|e| self.map_error(e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound {
                path: path.to_string(),
                revision: revision.unwrap_or(0),
            });
        }
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let payload: DownloadResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::ProtocolError(e.to_string()))?;
        debug!(path, revision = payload.revision, "downloaded remote file");
        Ok(RemoteContent {
            entry: RemoteEntry {
                path: payload.path,
                revision: payload.revision,
                content_hash: payload.content_hash,
                size: payload.size,
            },
            content: payload.content,
        })
    }

    async fn upload(
        &self,
        path: &str,
        content: &str,
        parent_revision: i64,
        device_id: &str,
    ) -> Result<UploadOutcome, TransportError> {
        let resp = self
            .http
            .put(self.file_url(path))
            .json(&UploadRequest {
                content,
                parent_revision,
                device_id,
            })
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if resp.status() == StatusCode::CONFLICT {
            let conflict: ConflictResponse = resp
                .json()
                .await
                .map_err(|e| TransportError::ProtocolError(e.to_string()))?;
            warn!(
                path,
                current = conflict.current_revision,
                claimed = conflict.your_parent_revision,
                "upload rejected with revision conflict"
            );
            return Ok(UploadOutcome::Conflict(ConflictContext {
                current_revision: conflict.current_revision,
                your_parent_revision: conflict.your_parent_revision,
            }));
        }
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let accepted: UploadResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::ProtocolError(e.to_string()))?;
        debug!(path, revision = accepted.revision, "upload accepted");
        Ok(UploadOutcome::Accepted {
            revision: accepted.revision,
            content_hash: accepted.content_hash,
        })
    }

    async fn delete(
        &self,
        path: &str,
        parent_revision: i64,
        device_id: &str,
    ) -> Result<DeleteOutcome, TransportError> {
        let resp = self
            .http
            .delete(self.file_url(path))
            .json(&DeleteRequest {
                parent_revision,
                device_id,
            })
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        // Deleting an already-absent file is not an error.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::Deleted);
        }
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let payload: DeleteResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::ProtocolError(e.to_string()))?;
        if payload.conflict {
            Ok(DeleteOutcome::DeletedWithConflict)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }

    async fn attempt_auto_merge(
        &self,
        path: &str,
        our_content: &str,
        ancestor_revision: i64,
        their_revision: i64,
    ) -> Result<MergeVerdict, TransportError> {
        // Client-side merge over plain downloads: fetch the merge base and
        // the server's current content, then run the local merger.
        let ancestor = self.download(path, Some(ancestor_revision)).await?;
        let theirs = self.download(path, Some(their_revision)).await?;

        let result = Merger::three_way_merge(&ancestor.content, our_content, &theirs.content);
        if result.has_conflicts || has_conflict_markers(&result.merged_content) {
            debug!(path, "auto-merge produced residual conflicts");
            return Ok(MergeVerdict {
                clean: false,
                merged: None,
            });
        }
        Ok(MergeVerdict {
            clean: true,
            merged: Some(result.merged_content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_requires_nonempty_token() {
        let with = HttpRemote::new(
            "https://example.com/api".into(),
            Some("tok".into()),
            Duration::from_secs(5),
        );
        assert!(with.authenticated());

        let without =
            HttpRemote::new("https://example.com/api".into(), None, Duration::from_secs(5));
        assert!(!without.authenticated());

        let empty = HttpRemote::new(
            "https://example.com/api".into(),
            Some(String::new()),
            Duration::from_secs(5),
        );
        assert!(!empty.authenticated());
    }

    #[test]
    fn test_file_url_escapes_segments() {
        let remote = HttpRemote::new(
            "https://example.com/api/".into(),
            None,
            Duration::from_secs(5),
        );
        assert_eq!(
            remote.file_url("notes/a b.md"),
            "https://example.com/api/files/notes/a%20b.md"
        );
    }

    #[test]
    fn test_urlencode_passes_unreserved() {
        assert_eq!(urlencode("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(urlencode("100%"), "100%25");
    }
}
