use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

/// Distributor export formats accepted by the upload pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Deezer,
    AppleMusic,
    Spotify,
    Meta,
    Shazam,
    TikTok,
}

impl Platform {
    /// Get all supported platforms
    pub fn all() -> Vec<Platform> {
        vec![Platform::Deezer, Platform::AppleMusic, Platform::Spotify, Platform::Meta, Platform::Shazam, Platform::TikTok]
    }

    /// Display name, as submitted by clients and stored on the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Deezer => "Deezer",
            Platform::AppleMusic => "Apple Music",
            Platform::Spotify => "Spotify",
            Platform::Meta => "Meta",
            Platform::Shazam => "Shazam",
            Platform::TikTok => "TikTok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deezer" => Ok(Platform::Deezer),
            "apple music" => Ok(Platform::AppleMusic),
            "spotify" => Ok(Platform::Spotify),
            "meta" => Ok(Platform::Meta),
            "shazam" => Ok(Platform::Shazam),
            "tiktok" => Ok(Platform::TikTok),
            _ => Err(format!("Unsupported platform: {}", s)),
        }
    }
}

/// Target table shape of an extracted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Streaming,
    Shazam,
    Meta,
    Tiktok,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [RecordKind::Streaming, RecordKind::Shazam, RecordKind::Meta, RecordKind::Tiktok];

    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Streaming => "streaming_analytics",
            RecordKind::Shazam => "shazam_analytics",
            RecordKind::Meta => "meta_analytics",
            RecordKind::Tiktok => "tiktok_analytics",
        }
    }

    /// Column list in bind order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Streaming => {
                &["artist_id", "release_id", "song_title", "artist_name", "platform", "date", "streams", "country", "device_type", "source", "upload_id"]
            }
            RecordKind::Shazam => {
                &["artist_id", "release_id", "track_title", "artist_name", "country", "state", "city", "isrc", "shazam_count", "upload_id"]
            }
            RecordKind::Meta => {
                &["artist_id", "release_id", "song_title", "artist_name", "service", "product_type", "isrc", "upc", "event_count", "territory", "upload_id"]
            }
            RecordKind::Tiktok => &[
                "artist_id",
                "release_id",
                "song_title",
                "artist_name",
                "platform_name",
                "song_id",
                "isrc",
                "upc",
                "platform_classified_genre",
                "territory",
                "content_type",
                "creations",
                "video_views",
                "comments",
                "likes",
                "shares",
                "favorites",
                "average_watchtime",
                "upload_id",
            ],
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns().len()
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            RecordKind::Streaming => 0,
            RecordKind::Shazam => 1,
            RecordKind::Meta => 2,
            RecordKind::Tiktok => 3,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// A single positional bind parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i64>),
    Float(f64),
    Text(Option<String>),
    Date(NaiveDate),
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(Some(value.into()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => *v,
            _ => None,
        }
    }
}

/// Fields every extracted record carries regardless of its shape
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBase {
    pub upload_id: i64,
    pub artist_id: i64,
    pub release_id: Option<i64>,
    pub track_name: String,
    pub artist_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamingRecord {
    pub base: RecordBase,
    pub platform: Platform,
    pub reporting_date: NaiveDate,
    pub streams: i64,
    pub country_code: String,
    pub device_type: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShazamRecord {
    pub base: RecordBase,
    pub country_code: String,
    pub state: Option<String>,
    pub city: Option<String>,
    pub isrc: Option<String>,
    pub shazam_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaRecord {
    pub base: RecordBase,
    pub service: Option<String>,
    pub product_type: Option<String>,
    pub isrc: Option<String>,
    pub upc: Option<String>,
    pub event_count: i64,
    pub territory: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TiktokRecord {
    pub base: RecordBase,
    pub platform_name: Option<String>,
    pub song_id: Option<String>,
    pub isrc: Option<String>,
    pub upc: Option<String>,
    pub genre: Option<String>,
    pub territory: Option<String>,
    pub content_type: Option<String>,
    pub creations: i64,
    pub video_views: i64,
    pub comments: i64,
    pub likes: i64,
    pub shares: i64,
    pub favorites: i64,
    pub average_watchtime: f64,
}

/// One data row after semantic extraction, tagged by target table
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedRecord {
    Streaming(StreamingRecord),
    Shazam(ShazamRecord),
    Meta(MetaRecord),
    Tiktok(TiktokRecord),
}

impl ExtractedRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            ExtractedRecord::Streaming(_) => RecordKind::Streaming,
            ExtractedRecord::Shazam(_) => RecordKind::Shazam,
            ExtractedRecord::Meta(_) => RecordKind::Meta,
            ExtractedRecord::Tiktok(_) => RecordKind::Tiktok,
        }
    }

    pub fn base(&self) -> &RecordBase {
        match self {
            ExtractedRecord::Streaming(r) => &r.base,
            ExtractedRecord::Shazam(r) => &r.base,
            ExtractedRecord::Meta(r) => &r.base,
            ExtractedRecord::Tiktok(r) => &r.base,
        }
    }

    /// Bind values in the column order of [`RecordKind::columns`]
    pub fn values(&self) -> Vec<SqlValue> {
        let base = self.base();
        let mut values = vec![SqlValue::Int(Some(base.artist_id)), SqlValue::Int(base.release_id), SqlValue::text(&base.track_name), SqlValue::text(&base.artist_name)];

        match self {
            ExtractedRecord::Streaming(r) => values.extend([
                SqlValue::text(r.platform.as_str()),
                SqlValue::Date(r.reporting_date),
                SqlValue::Int(Some(r.streams)),
                SqlValue::text(&r.country_code),
                SqlValue::Text(r.device_type.clone()),
                SqlValue::Text(r.source.clone()),
            ]),
            ExtractedRecord::Shazam(r) => values.extend([
                SqlValue::text(&r.country_code),
                SqlValue::Text(r.state.clone()),
                SqlValue::Text(r.city.clone()),
                SqlValue::Text(r.isrc.clone()),
                SqlValue::Int(Some(r.shazam_count)),
            ]),
            ExtractedRecord::Meta(r) => values.extend([
                SqlValue::Text(r.service.clone()),
                SqlValue::Text(r.product_type.clone()),
                SqlValue::Text(r.isrc.clone()),
                SqlValue::Text(r.upc.clone()),
                SqlValue::Int(Some(r.event_count)),
                SqlValue::Text(r.territory.clone()),
            ]),
            ExtractedRecord::Tiktok(r) => values.extend([
                SqlValue::Text(r.platform_name.clone()),
                SqlValue::Text(r.song_id.clone()),
                SqlValue::Text(r.isrc.clone()),
                SqlValue::Text(r.upc.clone()),
                SqlValue::Text(r.genre.clone()),
                SqlValue::Text(r.territory.clone()),
                SqlValue::Text(r.content_type.clone()),
                SqlValue::Int(Some(r.creations)),
                SqlValue::Int(Some(r.video_views)),
                SqlValue::Int(Some(r.comments)),
                SqlValue::Int(Some(r.likes)),
                SqlValue::Int(Some(r.shares)),
                SqlValue::Int(Some(r.favorites)),
                SqlValue::Float(r.average_watchtime),
            ]),
        }

        values.push(SqlValue::Int(Some(base.upload_id)));
        values
    }
}

/// Ledger row as submitted at upload start
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpload {
    pub filename: String,
    pub platform: Platform,
    pub reporting_date: NaiveDate,
    pub uploaded_by: Option<i64>,
    pub artist_id: i64,
}

/// Durable record of one upload attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLedgerEntry {
    pub id: i64,
    pub filename: String,
    pub platform: String,
    pub reporting_date: NaiveDate,
    pub total_records: i64,
    pub uploaded_by: Option<i64>,
    pub artist_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Per-kind counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KindCounts {
    pub streaming: u64,
    pub shazam: u64,
    pub meta: u64,
    pub tiktok: u64,
}

impl KindCounts {
    pub fn record(&mut self, kind: RecordKind, count: u64) {
        match kind {
            RecordKind::Streaming => self.streaming += count,
            RecordKind::Shazam => self.shazam += count,
            RecordKind::Meta => self.meta += count,
            RecordKind::Tiktok => self.tiktok += count,
        }
    }

    pub fn get(&self, kind: RecordKind) -> u64 {
        match kind {
            RecordKind::Streaming => self.streaming,
            RecordKind::Shazam => self.shazam,
            RecordKind::Meta => self.meta,
            RecordKind::Tiktok => self.tiktok,
        }
    }

    pub fn total(&self) -> u64 {
        self.streaming + self.shazam + self.meta + self.tiktok
    }
}

impl Add for KindCounts {
    type Output = KindCounts;

    fn add(self, other: KindCounts) -> KindCounts {
        KindCounts {
            streaming: self.streaming + other.streaming,
            shazam: self.shazam + other.shazam,
            meta: self.meta + other.meta,
            tiktok: self.tiktok + other.tiktok,
        }
    }
}
