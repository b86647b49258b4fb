//! HTTP relay to the prompt collector.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `<server>/api/prompt/upload` | Deliver one prompt |
//! | `GET`  | `<base>/api/api-key/valid?key=<key>` | Check an API key |
//!
//! Both requests carry the key in an `X-API-Key` header. Only HTTP 200 counts
//! as success. Nothing is retried here: a failed record is picked up again
//! when its source database changes.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::time::Duration;

use crate::config::UPLOAD_PATH;
use crate::models::{EnrichedRecord, GitInfo};

pub const API_KEY_HEADER: &str = "X-API-Key";
const VALIDATE_PATH: &str = "/api/api-key/valid";

/// Wire shape of an uploaded prompt.
#[derive(Debug, Serialize)]
pub struct PromptPayload<'a> {
    pub value: &'a str,
    /// Sent as a decimal string, not a number.
    #[serde(rename = "commandType")]
    pub command_type: String,
    pub md5: &'a str,
    pub timestamp: i64,
    pub workspace: &'a str,
    #[serde(rename = "uploadTime")]
    pub upload_time: i64,
    pub git: GitPayload<'a>,
}

#[derive(Debug, Serialize)]
pub struct GitPayload<'a> {
    #[serde(rename = "isGitRepo")]
    pub is_git_repo: bool,
    #[serde(rename = "remoteUrl")]
    pub remote_url: &'a str,
    #[serde(rename = "commitHash")]
    pub commit_hash: &'a str,
    #[serde(rename = "branchName")]
    pub branch_name: &'a str,
}

impl<'a> From<&'a GitInfo> for GitPayload<'a> {
    fn from(git: &'a GitInfo) -> Self {
        Self {
            is_git_repo: git.is_repo,
            remote_url: &git.remote_url,
            commit_hash: &git.commit_hash,
            branch_name: &git.branch_name,
        }
    }
}

impl<'a> From<&'a EnrichedRecord> for PromptPayload<'a> {
    fn from(record: &'a EnrichedRecord) -> Self {
        Self {
            value: &record.text,
            command_type: record.command_type.to_string(),
            md5: &record.md5,
            timestamp: record.source_timestamp,
            workspace: &record.workspace,
            upload_time: record.upload_time,
            git: GitPayload::from(&record.git),
        }
    }
}

/// Posts enriched records to the collector.
#[derive(Debug, Clone)]
pub struct UploadClient {
    client: reqwest::Client,
    server_url: String,
    api_key: String,
}

impl UploadClient {
    pub fn new(server_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            server_url: server_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Deliver one record. Any transport error or non-200 status is an error.
    pub async fn upload(&self, record: &EnrichedRecord) -> Result<()> {
        let body = serde_json::to_vec(&PromptPayload::from(record))
            .context("Failed to serialize prompt")?;

        let response = self
            .client
            .post(&self.server_url)
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .body(body)
            .send()
            .await
            .context("Upload request failed")?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body_text = response.text().await.unwrap_or_default();
            bail!("collector returned {}: {}", status, body_text.trim());
        }

        Ok(())
    }
}

/// `<scheme>://<host>/api/prompt/upload` → `<scheme>://<host>`.
pub fn base_url(server_url: &str) -> Result<&str> {
    server_url
        .strip_suffix(UPLOAD_PATH)
        .ok_or_else(|| anyhow::anyhow!("server url '{}' does not end with '{}'", server_url, UPLOAD_PATH))
}

/// Ask the collector whether `api_key` is valid. Non-200 means invalid.
pub async fn validate_api_key(api_key: &str, server_url: &str, timeout: Duration) -> Result<()> {
    let url = format!("{}{}", base_url(server_url)?, VALIDATE_PATH);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(&url)
        .query(&[("key", api_key)])
        .header(API_KEY_HEADER, api_key)
        .send()
        .await
        .context("Validation request failed")?;

    if response.status() != reqwest::StatusCode::OK {
        bail!("API key rejected ({})", response.status());
    }

    Ok(())
}
