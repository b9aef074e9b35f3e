use anyhow::Context;
use chrono::NaiveDate;
use std::ops::Add;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::extract::{ExtractionContext, RecordExtractor};
use crate::row_parser::{DelimiterMode, RowParser, parse_row, split_lines};
use crate::schema::{self, validate_headers};
use crate::store::{AnalyticsStore, StoreError};
use crate::types::{KindCounts, NewUpload};
use crate::writer::BatchWriter;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("File is empty or contains only a header row")]
    EmptyOrHeaderOnly,
    #[error("Missing required columns for {platform}: {}", .missing.join(", "))]
    MissingColumns { platform: String, missing: Vec<String> },
    #[error("Artist not found: {0}")]
    ArtistNotFound(i64),
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl UploadError {
    /// Whether the caller can fix this by changing the request
    pub fn is_input_error(&self) -> bool {
        !matches!(self, UploadError::Store(_))
    }
}

/// An upload as submitted, before validation
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub filename: Option<String>,
    pub content: Option<String>,
    pub platform: Option<String>,
    pub reporting_date: Option<String>,
    pub artist_id: Option<String>,
    pub uploaded_by: Option<i64>,
}

impl UploadRequest {
    /// Read a local export file; invalid UTF-8 is replaced rather than rejected
    pub async fn from_file(path: &Path, platform: &str, reporting_date: &str, artist_id: &str, uploaded_by: Option<i64>) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path).await.with_context(|| format!("Failed to read upload file: {:?}", path))?;
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("upload.csv").to_string();

        Ok(Self {
            filename: Some(filename),
            content: Some(String::from_utf8_lossy(&bytes).into_owned()),
            platform: Some(platform.to_string()),
            reporting_date: Some(reporting_date.to_string()),
            artist_id: Some(artist_id.to_string()),
            uploaded_by,
        })
    }
}

/// Final counts for one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub upload_id: i64,
    pub records_processed: u64,
    pub skipped_records: u64,
    pub failed_records: u64,
    pub inserted: KindCounts,
}

/// Counts produced by one batch; batches are folded with `+`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub inserted: KindCounts,
}

impl Add for BatchReport {
    type Output = BatchReport;

    fn add(self, other: BatchReport) -> BatchReport {
        BatchReport {
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
            inserted: self.inserted + other.inserted,
        }
    }
}

/// Tunables for the upload pipeline
#[derive(Debug, Clone, Copy)]
pub struct UploadSettings {
    pub batch_size: usize,
    pub delimiter_mode: DelimiterMode,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE, delimiter_mode: DelimiterMode::default() }
    }
}

/// Runs uploads end to end: validate, ledger, extract, write, finalise
#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn AnalyticsStore>,
    settings: UploadSettings,
}

#[derive(Debug)]
struct ValidatedUpload {
    filename: String,
    content: String,
    platform: String,
    reporting_date: NaiveDate,
    artist_id: i64,
}

fn validate_request(request: UploadRequest) -> Result<ValidatedUpload, UploadError> {
    fn present(value: Option<String>) -> Option<String> {
        value.filter(|v| !v.trim().is_empty())
    }

    let content = request.content;
    let platform = present(request.platform);
    let reporting_date = present(request.reporting_date);
    let artist_id = present(request.artist_id);

    let mut missing = Vec::new();
    if content.is_none() {
        missing.push("file");
    }
    if platform.is_none() {
        missing.push("platform");
    }
    if reporting_date.is_none() {
        missing.push("reporting_date");
    }
    if artist_id.is_none() {
        missing.push("artist_id");
    }

    let (Some(content), Some(platform), Some(reporting_date), Some(artist_id)) = (content, platform, reporting_date, artist_id) else {
        return Err(UploadError::MissingFields(missing));
    };

    let reporting_date = NaiveDate::parse_from_str(reporting_date.trim(), "%Y-%m-%d")
        .map_err(|_| UploadError::InvalidField { field: "reporting_date", value: reporting_date.clone() })?;
    let artist_id = artist_id.trim().parse::<i64>().map_err(|_| UploadError::InvalidField { field: "artist_id", value: artist_id.clone() })?;

    Ok(ValidatedUpload { filename: request.filename.unwrap_or_else(|| "upload.csv".to_string()), content, platform, reporting_date, artist_id })
}

impl UploadService {
    pub fn new(store: Arc<dyn AnalyticsStore>, settings: UploadSettings) -> Self {
        let batch_size = if settings.batch_size == 0 { DEFAULT_BATCH_SIZE } else { settings.batch_size };
        Self { store, settings: UploadSettings { batch_size, ..settings } }
    }

    pub fn store(&self) -> &Arc<dyn AnalyticsStore> {
        &self.store
    }

    pub async fn process(&self, request: UploadRequest) -> Result<UploadSummary, UploadError> {
        let uploaded_by = request.uploaded_by;
        let upload = validate_request(request)?;

        let schema = schema::lookup(&upload.platform).ok_or_else(|| UploadError::UnsupportedPlatform(upload.platform.clone()))?;

        let lines = split_lines(&upload.content);
        if lines.len() < 2 {
            return Err(UploadError::EmptyOrHeaderOnly);
        }

        let header_line = lines[0];
        let headers = parse_row(header_line);
        let validation = validate_headers(&headers, schema);
        if !validation.is_ok() {
            warn!("⚠️ Rejected {} upload '{}': missing columns {:?}", schema.platform, upload.filename, validation.missing);
            return Err(UploadError::MissingColumns { platform: schema.platform.to_string(), missing: validation.missing });
        }

        let artist_name = self.store.find_artist_name(upload.artist_id).await?.ok_or(UploadError::ArtistNotFound(upload.artist_id))?;

        let upload_id = self
            .store
            .create_upload(&NewUpload {
                filename: upload.filename.clone(),
                platform: schema.platform,
                reporting_date: upload.reporting_date,
                uploaded_by,
                artist_id: upload.artist_id,
            })
            .await?;

        let data_lines = &lines[1..];
        info!("🚀 Processing upload {} ('{}'): {} rows for {} on {}", upload_id, upload.filename, data_lines.len(), artist_name, schema.platform);
        let start = Instant::now();

        let parser = RowParser::for_header(self.settings.delimiter_mode, header_line);
        let context = ExtractionContext { upload_id, artist_id: upload.artist_id, artist_name, reporting_date: upload.reporting_date };
        let mut extractor = RecordExtractor::new(schema, context, self.store.as_ref());
        let writer = BatchWriter::new(self.store.as_ref());

        let batch_count = data_lines.len().div_ceil(self.settings.batch_size);
        let mut totals = BatchReport::default();

        for (index, batch) in data_lines.chunks(self.settings.batch_size).enumerate() {
            let mut records = Vec::with_capacity(batch.len());
            let mut skipped = 0u64;

            for line in batch {
                match extractor.extract(&headers, parser.parse(line)).await {
                    Ok(record) => records.push(record),
                    Err(reason) => {
                        debug!("⏭️ Skipping row in upload {}: {}", upload_id, reason);
                        skipped += 1;
                    }
                }
            }

            let processed = records.len() as u64;
            let outcome = writer.write_batch(records).await;
            let report = BatchReport { processed, skipped, failed: outcome.failed() as u64, inserted: outcome.inserted_by_kind() };

            debug!(
                "📦 Batch {}/{} of upload {}: {} processed, {} skipped, {} inserted, {} failed",
                index + 1,
                batch_count,
                upload_id,
                report.processed,
                report.skipped,
                report.inserted.total(),
                report.failed
            );

            totals = totals + report;
        }

        if let Err(e) = self.store.finalize_upload(upload_id, totals.processed as i64).await {
            error!("❌ Failed to finalize upload {} with {} records: {}", upload_id, totals.processed, e);
            return Err(e.into());
        }

        info!(
            "✅ Upload {} complete in {:?}: {} processed, {} skipped, {} failed, {} release lookups",
            upload_id,
            start.elapsed(),
            totals.processed,
            totals.skipped,
            totals.failed,
            extractor.release_lookups()
        );

        Ok(UploadSummary {
            upload_id,
            records_processed: totals.processed,
            skipped_records: totals.skipped,
            failed_records: totals.failed,
            inserted: totals.inserted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> UploadRequest {
        UploadRequest {
            filename: Some("report.csv".to_string()),
            content: Some("a,b\n1,2".to_string()),
            platform: Some("Spotify".to_string()),
            reporting_date: Some("2024-01-31".to_string()),
            artist_id: Some("12".to_string()),
            uploaded_by: None,
        }
    }

    #[test]
    fn test_validate_request_ok() {
        let upload = validate_request(request()).unwrap();
        assert_eq!(upload.artist_id, 12);
        assert_eq!(upload.reporting_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(upload.filename, "report.csv");
    }

    #[test]
    fn test_validate_request_lists_all_missing_fields() {
        let err = validate_request(UploadRequest { content: None, platform: Some("  ".to_string()), ..request() }).unwrap_err();
        match err {
            UploadError::MissingFields(fields) => assert_eq!(fields, vec!["file", "platform"]),
            other => panic!("Expected MissingFields, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_request_default_filename() {
        let upload = validate_request(UploadRequest { filename: None, ..request() }).unwrap();
        assert_eq!(upload.filename, "upload.csv");
    }

    #[test]
    fn test_validate_request_bad_artist_id() {
        let err = validate_request(UploadRequest { artist_id: Some("abc".to_string()), ..request() }).unwrap_err();
        assert!(matches!(err, UploadError::InvalidField { field: "artist_id", .. }));
    }

    #[test]
    fn test_validate_request_bad_reporting_date() {
        let err = validate_request(UploadRequest { reporting_date: Some("31/01/2024".to_string()), ..request() }).unwrap_err();
        assert!(matches!(err, UploadError::InvalidField { field: "reporting_date", .. }));
    }

    #[test]
    fn test_batch_report_fold() {
        let mut inserted = KindCounts::default();
        inserted.streaming = 3;
        let a = BatchReport { processed: 3, skipped: 1, failed: 0, inserted };
        let b = BatchReport { processed: 2, skipped: 0, failed: 1, inserted };

        let total = [a, b].into_iter().fold(BatchReport::default(), |acc, r| acc + r);
        assert_eq!(total.processed, 5);
        assert_eq!(total.skipped, 1);
        assert_eq!(total.failed, 1);
        assert_eq!(total.inserted.streaming, 6);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(UploadError::MissingFields(vec!["file", "artist_id"]).to_string(), "Missing required fields: file, artist_id");
        assert_eq!(
            UploadError::MissingColumns { platform: "Shazam".to_string(), missing: vec!["City".to_string(), "State".to_string()] }.to_string(),
            "Missing required columns for Shazam: City, State"
        );
        assert!(UploadError::EmptyOrHeaderOnly.is_input_error());
        assert!(!UploadError::Store(StoreError::Rejected("x".to_string())).is_input_error());
    }
}
