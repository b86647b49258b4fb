//! Relay pipeline orchestration.
//!
//! Coordinates one pass over a changed state database: extraction →
//! dedup check → git enrichment → upload → dedup commit. The dedup entry is
//! written only after the collector answers 200, so a crash between the two
//! produces a duplicate upload on the next change rather than a lost prompt.

use std::path::Path;
use std::sync::Arc;

use crate::extract::{extract_records, ExtractSettings};
use crate::git;
use crate::logging::{EventLog, Level};
use crate::models::{content_hash, EnrichedRecord, GitInfo, RawRecord};
use crate::store::DedupStore;
use crate::upload::UploadClient;

/// How a single record fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    Duplicate,
    Failed,
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub extracted: usize,
    pub delivered: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl PassSummary {
    fn add(&mut self, outcome: RelayOutcome) {
        match outcome {
            RelayOutcome::Delivered => self.delivered += 1,
            RelayOutcome::Duplicate => self.duplicates += 1,
            RelayOutcome::Failed => self.failed += 1,
        }
    }
}

pub struct Pipeline {
    dedup: DedupStore,
    uploader: UploadClient,
    settings: ExtractSettings,
    log: Arc<dyn EventLog>,
}

impl Pipeline {
    pub fn new(
        dedup: DedupStore,
        uploader: UploadClient,
        settings: ExtractSettings,
        log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            dedup,
            uploader,
            settings,
            log,
        }
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn settings(&self) -> &ExtractSettings {
        &self.settings
    }

    /// Run one pass over `db_path`. Never fails; problems are logged.
    pub async fn process_file(&self, db_path: &Path, source_timestamp: i64) -> PassSummary {
        let mut summary = PassSummary::default();

        let extraction = match extract_records(db_path, &self.settings, self.log.as_ref()).await {
            Ok(extraction) => extraction,
            Err(e) => {
                self.log.log(Level::Error, &e.to_string());
                return summary;
            }
        };
        summary.extracted = extraction.records.len();

        let mut git_info: Option<GitInfo> = None;

        for raw in &extraction.records {
            let hash = content_hash(&raw.text);
            match self.dedup.is_known(&hash).await {
                Ok(true) => {
                    summary.add(RelayOutcome::Duplicate);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    self.log.log(Level::Error, &format!("{:#}", e));
                    summary.add(RelayOutcome::Failed);
                    continue;
                }
            }

            if git_info.is_none() {
                git_info = Some(enrich_blocking(&extraction.workspace).await);
            }
            let git = git_info.clone().unwrap_or_default();

            let record = EnrichedRecord::new(raw, &extraction.workspace, git, source_timestamp);
            summary.add(self.deliver(&record).await);
        }

        summary
    }

    /// Relay a single record: dedup check, enrichment, upload, commit.
    pub async fn relay_record(
        &self,
        raw: &RawRecord,
        workspace: &str,
        source_timestamp: i64,
    ) -> RelayOutcome {
        let hash = content_hash(&raw.text);
        match self.dedup.is_known(&hash).await {
            Ok(true) => return RelayOutcome::Duplicate,
            Ok(false) => {}
            Err(e) => {
                self.log.log(Level::Error, &format!("{:#}", e));
                return RelayOutcome::Failed;
            }
        }

        let git = enrich_blocking(workspace).await;
        let record = EnrichedRecord::new(raw, workspace, git, source_timestamp);
        self.deliver(&record).await
    }

    async fn deliver(&self, record: &EnrichedRecord) -> RelayOutcome {
        if let Err(e) = self.uploader.upload(record).await {
            self.log
                .log(Level::Error, &format!("upload failed: {:#}", e));
            return RelayOutcome::Failed;
        }

        if let Err(e) = self.dedup.record(&record.md5).await {
            self.log.log(Level::Error, &format!("{:#}", e));
            return RelayOutcome::Failed;
        }

        self.log.log(
            Level::Success,
            &format!("uploaded: {} {}", record.text, record.command_type),
        );
        RelayOutcome::Delivered
    }
}

/// Git lookups shell out, so keep them off the async workers.
async fn enrich_blocking(workspace: &str) -> GitInfo {
    let workspace = workspace.to_string();
    tokio::task::spawn_blocking(move || git::enrich(&workspace))
        .await
        .unwrap_or_default()
}
