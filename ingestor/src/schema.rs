//! Static per-platform column requirements and semantic field mappings.

use std::collections::HashSet;
use std::str::FromStr;

use crate::types::{Platform, RecordKind};

/// Semantic fields the extractor reads from a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    TrackName,
    ArtistName,
    Isrc,
    Upc,
    Service,
    Label,
    Country,
    Streams,
    Source,
    DeviceType,
    ProductType,
    EventCount,
    Territory,
    State,
    City,
    ShazamCount,
    PlatformName,
    SongId,
    Genre,
    ContentType,
    Creations,
    VideoViews,
    Comments,
    Likes,
    Shares,
    Favorites,
    AverageWatchtime,
}

#[derive(Debug, PartialEq, Eq)]
pub struct PlatformSchema {
    pub platform: Platform,
    pub kind: RecordKind,
    pub required_columns: &'static [&'static str],
    pub field_map: &'static [(Field, &'static str)],
}

impl PlatformSchema {
    /// Source column for a semantic field, if this platform exports it
    pub fn column(&self, field: Field) -> Option<&'static str> {
        self.field_map.iter().find(|(f, _)| *f == field).map(|(_, column)| *column)
    }

    /// Required columns absent from `headers` (exact, case-sensitive match)
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        let present: HashSet<&str> = headers.iter().map(String::as_str).collect();
        self.required_columns.iter().filter(|column| !present.contains(**column)).map(|column| column.to_string()).collect()
    }
}

/// Outcome of checking a header row against a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValidation {
    pub missing: Vec<String>,
}

impl HeaderValidation {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty()
    }
}

pub fn validate_headers(headers: &[String], schema: &PlatformSchema) -> HeaderValidation {
    HeaderValidation { missing: schema.missing_columns(headers) }
}

/// Resolve a submitted platform name to its schema
pub fn lookup(platform_name: &str) -> Option<&'static PlatformSchema> {
    Platform::from_str(platform_name).ok().map(schema_for)
}

pub fn schema_for(platform: Platform) -> &'static PlatformSchema {
    match platform {
        Platform::Deezer => &DEEZER,
        Platform::AppleMusic => &APPLE_MUSIC,
        Platform::Spotify => &SPOTIFY,
        Platform::Meta => &META,
        Platform::Shazam => &SHAZAM,
        Platform::TikTok => &TIKTOK,
    }
}

static DEEZER: PlatformSchema = PlatformSchema {
    platform: Platform::Deezer,
    kind: RecordKind::Streaming,
    required_columns: &["Date", "Song Name", "ISRC", "Service", "Label", "Artist Name", "Country", "Streams", "Source", "Device Type"],
    field_map: &[
        (Field::Date, "Date"),
        (Field::TrackName, "Song Name"),
        (Field::Isrc, "ISRC"),
        (Field::Service, "Service"),
        (Field::Label, "Label"),
        (Field::ArtistName, "Artist Name"),
        (Field::Country, "Country"),
        (Field::Streams, "Streams"),
        (Field::Source, "Source"),
        (Field::DeviceType, "Device Type"),
    ],
};

static APPLE_MUSIC: PlatformSchema = PlatformSchema {
    platform: Platform::AppleMusic,
    kind: RecordKind::Streaming,
    required_columns: &["Date", "Song Title", "Artist", "ISRC", "Country", "Device Type", "Source of Stream", "Stream Count"],
    field_map: &[
        (Field::Date, "Date"),
        (Field::TrackName, "Song Title"),
        (Field::ArtistName, "Artist"),
        (Field::Isrc, "ISRC"),
        (Field::Country, "Country"),
        (Field::DeviceType, "Device Type"),
        (Field::Source, "Source of Stream"),
        (Field::Streams, "Stream Count"),
    ],
};

static SPOTIFY: PlatformSchema = PlatformSchema {
    platform: Platform::Spotify,
    kind: RecordKind::Streaming,
    required_columns: &["ISRC", "Artist Name", "Streams", "Date", "Song Name", "Country", "Source", "Device Type"],
    field_map: &[
        (Field::Isrc, "ISRC"),
        (Field::ArtistName, "Artist Name"),
        (Field::Streams, "Streams"),
        (Field::Date, "Date"),
        (Field::TrackName, "Song Name"),
        (Field::Country, "Country"),
        (Field::Source, "Source"),
        (Field::DeviceType, "Device Type"),
    ],
};

static META: PlatformSchema = PlatformSchema {
    platform: Platform::Meta,
    kind: RecordKind::Meta,
    required_columns: &["Service", "Product Type", "ISRC", "UPC", "Song Title", "Artist", "Event Count", "Territory"],
    field_map: &[
        (Field::Service, "Service"),
        (Field::ProductType, "Product Type"),
        (Field::Isrc, "ISRC"),
        (Field::Upc, "UPC"),
        (Field::TrackName, "Song Title"),
        (Field::ArtistName, "Artist"),
        (Field::EventCount, "Event Count"),
        (Field::Territory, "Territory"),
    ],
};

static SHAZAM: PlatformSchema = PlatformSchema {
    platform: Platform::Shazam,
    kind: RecordKind::Shazam,
    required_columns: &["Track Title", "Artist", "Country", "State", "City", "ISRC", "Shazam Count"],
    field_map: &[
        (Field::TrackName, "Track Title"),
        (Field::ArtistName, "Artist"),
        (Field::Country, "Country"),
        (Field::State, "State"),
        (Field::City, "City"),
        (Field::Isrc, "ISRC"),
        (Field::ShazamCount, "Shazam Count"),
    ],
};

static TIKTOK: PlatformSchema = PlatformSchema {
    platform: Platform::TikTok,
    kind: RecordKind::Tiktok,
    required_columns: &[
        "Platform Name",
        "Song ID",
        "ISRC",
        "UPC",
        "Song Title",
        "Artist",
        "Platform Classified Genre",
        "Territory",
        "Content Type",
        "Creations",
        "Video Views",
        "Comments",
        "Likes",
        "Shares",
        "Favorites",
        "Average Watchtime",
    ],
    field_map: &[
        (Field::PlatformName, "Platform Name"),
        (Field::SongId, "Song ID"),
        (Field::Isrc, "ISRC"),
        (Field::Upc, "UPC"),
        (Field::TrackName, "Song Title"),
        (Field::ArtistName, "Artist"),
        (Field::Genre, "Platform Classified Genre"),
        (Field::Territory, "Territory"),
        (Field::ContentType, "Content Type"),
        (Field::Creations, "Creations"),
        (Field::VideoViews, "Video Views"),
        (Field::Comments, "Comments"),
        (Field::Likes, "Likes"),
        (Field::Shares, "Shares"),
        (Field::Favorites, "Favorites"),
        (Field::AverageWatchtime, "Average Watchtime"),
    ],
};

/// Fields each record shape reads during extraction
pub fn fields_read_by(kind: RecordKind) -> &'static [Field] {
    match kind {
        RecordKind::Streaming => &[Field::TrackName, Field::Isrc, Field::Date, Field::Streams, Field::Country, Field::DeviceType, Field::Source],
        RecordKind::Shazam => &[Field::TrackName, Field::Isrc, Field::Country, Field::State, Field::City, Field::ShazamCount],
        RecordKind::Meta => &[Field::TrackName, Field::Isrc, Field::Service, Field::ProductType, Field::Upc, Field::EventCount, Field::Territory],
        RecordKind::Tiktok => &[
            Field::TrackName,
            Field::Isrc,
            Field::PlatformName,
            Field::SongId,
            Field::Upc,
            Field::Genre,
            Field::Territory,
            Field::ContentType,
            Field::Creations,
            Field::VideoViews,
            Field::Comments,
            Field::Likes,
            Field::Shares,
            Field::Favorites,
            Field::AverageWatchtime,
        ],
    }
}
