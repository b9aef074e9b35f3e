//! Row-to-record extraction: semantic column lookup, numeric sanitisation,
//! date/country normalisation and release association.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::{Field, PlatformSchema};
use crate::store::AnalyticsStore;
use crate::types::{ExtractedRecord, MetaRecord, RecordBase, RecordKind, ShazamRecord, StreamingRecord, TiktokRecord};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y", "%m-%d-%Y", "%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y"];

const DATETIME_FORMATS: &[&str] =
    &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];

/// Why a data row was not turned into a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowSkip {
    #[error("row has {found} cells, header has {expected}")]
    CellCountMismatch { expected: usize, found: usize },
    #[error("row has no track name")]
    MissingTrackName,
}

/// Header-keyed view of one data row
#[derive(Debug, Clone, Default)]
pub struct RowMap {
    cells: HashMap<String, String>,
}

impl RowMap {
    pub fn from_row(headers: &[String], cells: Vec<String>) -> Result<Self, RowSkip> {
        if headers.len() != cells.len() {
            return Err(RowSkip::CellCountMismatch { expected: headers.len(), found: cells.len() });
        }

        Ok(Self { cells: headers.iter().cloned().zip(cells).collect() })
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }
}

/// Trimmed cell for a semantic field; `None` when unmapped or blank.
pub fn get_column_value<'r>(row: &'r RowMap, schema: &PlatformSchema, field: Field) -> Option<&'r str> {
    let column = schema.column(field)?;
    row.get(column).map(str::trim).filter(|value| !value.is_empty())
}

/// Keep only digits, `-` and `.`
fn sanitize_numeric(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.').collect()
}

/// Leading signed integer of the sanitised text, 0 when there is none. Never negative;
/// values past `i64::MAX` saturate.
pub fn parse_count(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else { return 0 };
    let cleaned = sanitize_numeric(raw);

    let (negative, rest) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || negative {
        return 0;
    }

    digits.parse::<i64>().unwrap_or_else(|_| {
        debug!("🔢 Count '{}' overflows i64, saturating", raw);
        i64::MAX
    })
}

/// Longest leading decimal of the sanitised text, 0.0 when there is none. Never negative.
pub fn parse_decimal(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else { return 0.0 };
    let cleaned = sanitize_numeric(raw);

    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in cleaned.char_indices() {
        match c {
            '-' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            c if c.is_ascii_digit() => {}
            _ => break,
        }
        end = i + 1;
    }

    cleaned[..end].parse::<f64>().map(|v| v.max(0.0)).unwrap_or(0.0)
}

/// Upper-cased, then cut to at most two characters; empty when absent
pub fn normalize_country(raw: Option<&str>) -> String {
    raw.map(|value| value.trim().to_uppercase().chars().take(2).collect()).unwrap_or_default()
}

/// Lenient date parsing across the formats distributors export
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    if value.len() == 8 && value.chars().all(|c| c.is_ascii_digit()) {
        let year = value[0..4].parse().ok()?;
        let month = value[4..6].parse().ok()?;
        let day = value[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| DATETIME_FORMATS.iter().find_map(|format| NaiveDateTime::parse_from_str(value, format).ok()).map(|dt| dt.date()))
}

/// Per-upload values shared by every extracted record
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionContext {
    pub upload_id: i64,
    pub artist_id: i64,
    pub artist_name: String,
    pub reporting_date: NaiveDate,
}

/// Resolves a release id by ISRC, then by title, scoped to one artist
pub struct ReleaseResolver<'a> {
    store: &'a dyn AnalyticsStore,
    artist_id: i64,
    cache: HashMap<(String, String), Option<i64>>,
}

impl<'a> ReleaseResolver<'a> {
    pub fn new(store: &'a dyn AnalyticsStore, artist_id: i64) -> Self {
        Self { store, artist_id, cache: HashMap::new() }
    }

    pub async fn resolve(&mut self, isrc: Option<&str>, title: &str) -> Option<i64> {
        let key = (isrc.unwrap_or_default().to_string(), title.to_lowercase());
        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }

        let mut lookup_failed = false;

        if let Some(isrc) = isrc {
            match self.store.find_release_by_isrc(self.artist_id, isrc).await {
                Ok(Some(id)) => {
                    self.cache.insert(key, Some(id));
                    return Some(id);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("⚠️ Release lookup by ISRC {} failed: {}", isrc, e);
                    lookup_failed = true;
                }
            }
        }

        let resolved = match self.store.find_release_by_title(self.artist_id, title).await {
            Ok(found) => found,
            Err(e) => {
                warn!("⚠️ Release lookup by title '{}' failed: {}", title, e);
                lookup_failed = true;
                None
            }
        };

        if resolved.is_none() {
            debug!("🔍 No release found for '{}' (artist {})", title, self.artist_id);
        }

        // Failed lookups are retried on the next row rather than remembered as misses
        if !lookup_failed {
            self.cache.insert(key, resolved);
        }
        resolved
    }

    pub fn cached_lookups(&self) -> usize {
        self.cache.len()
    }
}

/// Build the typed record for a row whose track name and release are already known.
pub fn build_record(row: &RowMap, schema: &PlatformSchema, context: &ExtractionContext, track_name: &str, release_id: Option<i64>) -> ExtractedRecord {
    let value = |field: Field| get_column_value(row, schema, field);
    let owned = |field: Field| value(field).map(str::to_string);

    let base = RecordBase {
        upload_id: context.upload_id,
        artist_id: context.artist_id,
        release_id,
        track_name: track_name.to_string(),
        artist_name: context.artist_name.clone(),
    };

    match schema.kind {
        RecordKind::Streaming => ExtractedRecord::Streaming(StreamingRecord {
            base,
            platform: schema.platform,
            reporting_date: value(Field::Date).and_then(parse_date).unwrap_or(context.reporting_date),
            streams: parse_count(value(Field::Streams)),
            country_code: normalize_country(value(Field::Country)),
            device_type: owned(Field::DeviceType),
            source: owned(Field::Source),
        }),
        RecordKind::Shazam => ExtractedRecord::Shazam(ShazamRecord {
            base,
            country_code: normalize_country(value(Field::Country)),
            state: owned(Field::State),
            city: owned(Field::City),
            isrc: owned(Field::Isrc),
            shazam_count: parse_count(value(Field::ShazamCount)),
        }),
        RecordKind::Meta => ExtractedRecord::Meta(MetaRecord {
            base,
            service: owned(Field::Service),
            product_type: owned(Field::ProductType),
            isrc: owned(Field::Isrc),
            upc: owned(Field::Upc),
            event_count: parse_count(value(Field::EventCount)),
            territory: owned(Field::Territory),
        }),
        RecordKind::Tiktok => ExtractedRecord::Tiktok(TiktokRecord {
            base,
            platform_name: owned(Field::PlatformName),
            song_id: owned(Field::SongId),
            isrc: owned(Field::Isrc),
            upc: owned(Field::Upc),
            genre: owned(Field::Genre),
            territory: owned(Field::Territory),
            content_type: owned(Field::ContentType),
            creations: parse_count(value(Field::Creations)),
            video_views: parse_count(value(Field::VideoViews)),
            comments: parse_count(value(Field::Comments)),
            likes: parse_count(value(Field::Likes)),
            shares: parse_count(value(Field::Shares)),
            favorites: parse_count(value(Field::Favorites)),
            average_watchtime: parse_decimal(value(Field::AverageWatchtime)),
        }),
    }
}

/// Turns raw rows of one upload into typed records
pub struct RecordExtractor<'a> {
    schema: &'static PlatformSchema,
    context: ExtractionContext,
    resolver: ReleaseResolver<'a>,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(schema: &'static PlatformSchema, context: ExtractionContext, store: &'a dyn AnalyticsStore) -> Self {
        let resolver = ReleaseResolver::new(store, context.artist_id);
        Self { schema, context, resolver }
    }

    pub async fn extract(&mut self, headers: &[String], cells: Vec<String>) -> Result<ExtractedRecord, RowSkip> {
        let row = RowMap::from_row(headers, cells)?;
        let track_name = get_column_value(&row, self.schema, Field::TrackName).ok_or(RowSkip::MissingTrackName)?;
        let isrc = get_column_value(&row, self.schema, Field::Isrc);

        let release_id = self.resolver.resolve(isrc, track_name).await;
        Ok(build_record(&row, self.schema, &self.context, track_name, release_id))
    }

    pub fn release_lookups(&self) -> usize {
        self.resolver.cached_lookups()
    }
}
