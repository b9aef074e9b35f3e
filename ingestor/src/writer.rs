//! Grouped multi-row inserts with per-record fallback.

use tracing::{debug, error, warn};

use crate::store::{AnalyticsStore, StoreError};
use crate::types::{ExtractedRecord, KindCounts, RecordKind, SqlValue};

/// Postgres rejects statements with more bind parameters than this
pub const MAX_BIND_PARAMS: usize = 65_535;

/// A positional-parameter INSERT for one record kind
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub kind: RecordKind,
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub row_count: usize,
}

impl InsertStatement {
    /// One INSERT covering every record; all records must share `kind`.
    pub fn for_records(kind: RecordKind, records: &[ExtractedRecord]) -> Self {
        let columns = kind.column_count();
        let mut params = Vec::with_capacity(records.len() * columns);
        let mut tuples = Vec::with_capacity(records.len());

        for (row, record) in records.iter().enumerate() {
            debug_assert_eq!(record.kind(), kind);
            let placeholders: Vec<String> = (1..=columns).map(|col| format!("${}", row * columns + col)).collect();
            tuples.push(format!("({})", placeholders.join(", ")));
            params.extend(record.values());
        }

        let sql = format!("INSERT INTO {} ({}) VALUES {}", kind.table(), kind.columns().join(", "), tuples.join(", "));
        Self { kind, sql, params, row_count: records.len() }
    }

    pub fn single(record: &ExtractedRecord) -> Self {
        Self::for_records(record.kind(), std::slice::from_ref(record))
    }
}

/// Largest number of rows of `kind` one statement can carry
pub fn max_rows_per_statement(kind: RecordKind) -> usize {
    MAX_BIND_PARAMS / kind.column_count()
}

/// Split a batch into per-kind buckets, in [`RecordKind::ALL`] order, dropping empty ones.
pub fn partition(records: Vec<ExtractedRecord>) -> Vec<(RecordKind, Vec<ExtractedRecord>)> {
    let mut buckets: [Vec<ExtractedRecord>; 4] = Default::default();
    for record in records {
        buckets[record.kind().index()].push(record);
    }

    RecordKind::ALL.into_iter().zip(buckets).filter(|(_, bucket)| !bucket.is_empty()).collect()
}

/// Result of writing one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReport {
    pub kind: RecordKind,
    pub inserted: usize,
    pub failed: usize,
    /// Whether the bulk insert failed and records were retried one by one
    pub fell_back: bool,
}

/// A record that could not be written even on its own
#[derive(Debug)]
pub struct FailedRecord {
    pub record: ExtractedRecord,
    pub error: StoreError,
}

#[derive(Debug)]
pub enum BatchOutcome {
    AllSucceeded { buckets: Vec<BucketReport> },
    PartiallyFailed { buckets: Vec<BucketReport>, failures: Vec<FailedRecord> },
}

impl BatchOutcome {
    pub fn buckets(&self) -> &[BucketReport] {
        match self {
            BatchOutcome::AllSucceeded { buckets } => buckets,
            BatchOutcome::PartiallyFailed { buckets, .. } => buckets,
        }
    }

    pub fn failures(&self) -> &[FailedRecord] {
        match self {
            BatchOutcome::AllSucceeded { .. } => &[],
            BatchOutcome::PartiallyFailed { failures, .. } => failures,
        }
    }

    pub fn inserted(&self) -> usize {
        self.buckets().iter().map(|b| b.inserted).sum()
    }

    pub fn failed(&self) -> usize {
        self.buckets().iter().map(|b| b.failed).sum()
    }

    pub fn inserted_by_kind(&self) -> KindCounts {
        let mut counts = KindCounts::default();
        for bucket in self.buckets() {
            counts.record(bucket.kind, bucket.inserted as u64);
        }
        counts
    }
}

/// Writes extracted records through an [`AnalyticsStore`]
pub struct BatchWriter<'a> {
    store: &'a dyn AnalyticsStore,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn AnalyticsStore) -> Self {
        Self { store }
    }

    /// Bulk insert each bucket; on failure retry its records individually.
    /// Every failure is captured in the outcome, so this never errors.
    pub async fn write_batch(&self, records: Vec<ExtractedRecord>) -> BatchOutcome {
        let mut reports = Vec::new();
        let mut failures = Vec::new();

        for (kind, bucket) in partition(records) {
            let mut report = BucketReport { kind, inserted: 0, failed: 0, fell_back: false };

            let chunk_size = max_rows_per_statement(kind);
            let mut remaining = bucket;
            while !remaining.is_empty() {
                let rest = remaining.split_off(remaining.len().min(chunk_size));
                self.write_chunk(kind, remaining, &mut report, &mut failures).await;
                remaining = rest;
            }

            debug!("💾 Wrote {} rows to {} ({} failed, fallback: {})", report.inserted, kind, report.failed, report.fell_back);
            reports.push(report);
        }

        if failures.is_empty() {
            BatchOutcome::AllSucceeded { buckets: reports }
        } else {
            BatchOutcome::PartiallyFailed { buckets: reports, failures }
        }
    }

    async fn write_chunk(&self, kind: RecordKind, records: Vec<ExtractedRecord>, report: &mut BucketReport, failures: &mut Vec<FailedRecord>) {
        let statement = InsertStatement::for_records(kind, &records);

        match self.store.execute(&statement).await {
            Ok(_) => {
                report.inserted += records.len();
            }
            Err(e) => {
                warn!("⚠️ Bulk insert of {} rows into {} failed, retrying individually: {}", records.len(), kind, e);
                report.fell_back = true;

                for record in records {
                    match self.store.execute(&InsertStatement::single(&record)).await {
                        Ok(_) => report.inserted += 1,
                        Err(e) => {
                            error!("❌ Failed to insert '{}' into {}: {}", record.base().track_name, kind, e);
                            report.failed += 1;
                            failures.push(FailedRecord { record, error: e });
                        }
                    }
                }
            }
        }
    }
}
