//! Core data models used throughout the relay.
//!
//! These types represent the records that flow from an editor state database
//! through deduplication and enrichment to the remote collector.

use md5::{Digest, Md5};
use serde::Deserialize;

/// A prompt decoded from a matched column value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "commandType")]
    pub command_type: i64,
}

/// Version-control context of the workspace a prompt was written in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitInfo {
    pub is_repo: bool,
    pub remote_url: String,
    pub commit_hash: String,
    pub branch_name: String,
}

/// A record ready for relay.
#[derive(Debug, Clone)]
pub struct EnrichedRecord {
    pub text: String,
    pub command_type: i64,
    /// Idempotency key: [`content_hash`] of `text`.
    pub md5: String,
    /// Unix seconds at which the change event was dispatched.
    pub source_timestamp: i64,
    /// Unix milliseconds at send time.
    pub upload_time: i64,
    pub workspace: String,
    pub git: GitInfo,
}

impl EnrichedRecord {
    pub fn new(raw: &RawRecord, workspace: &str, git: GitInfo, source_timestamp: i64) -> Self {
        Self {
            text: raw.text.clone(),
            command_type: raw.command_type,
            md5: content_hash(&raw.text),
            source_timestamp,
            upload_time: chrono::Utc::now().timestamp_millis(),
            workspace: workspace.to_string(),
            git,
        }
    }
}

/// Lowercase hex MD5 of `text` (32 characters).
pub fn content_hash(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_md5_hex() {
        assert_eq!(content_hash("hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_raw_record_tolerates_missing_fields() {
        let records: Vec<RawRecord> =
            serde_json::from_str(r#"[{"text":"a"},{"commandType":4},{"text":"b","commandType":1,"extra":true}]"#)
                .unwrap();
        assert_eq!(records[0].command_type, 0);
        assert_eq!(records[1].text, "");
        assert_eq!(
            records[2],
            RawRecord {
                text: "b".to_string(),
                command_type: 1
            }
        );
    }

    #[test]
    fn test_enriched_record_hashes_text() {
        let raw = RawRecord {
            text: "hello".to_string(),
            command_type: 2,
        };
        let record = EnrichedRecord::new(&raw, "/work", GitInfo::default(), 1_700_000_000);
        assert_eq!(record.md5, content_hash("hello"));
        assert_eq!(record.source_timestamp, 1_700_000_000);
        assert!(record.upload_time > record.source_timestamp);
        assert!(!record.git.is_repo);
    }
}
