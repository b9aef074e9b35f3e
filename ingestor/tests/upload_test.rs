// End-to-end upload processing against in-memory and mocked stores


use chrono::NaiveDate;
use ingestor::row_parser::DelimiterMode;
use ingestor::store::{MockAnalyticsStore, StoreError};
use ingestor::types::{RecordKind, SqlValue};
use ingestor::upload::{UploadError, UploadRequest, UploadService, UploadSettings};
use mock_helpers::MemoryStore;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const ARTIST_ID: i64 = 3;

const DEEZER_HEADER: &str = "Date,Song Name,ISRC,Service,Label,Artist Name,Country,Streams,Source,Device Type";
const SPOTIFY_HEADER: &str = "ISRC,Artist Name,Streams,Date,Song Name,Country,Source,Device Type";

fn store() -> MemoryStore {
    MemoryStore::new().with_artist(ARTIST_ID, "Jane Doe")
}

fn service(store: &MemoryStore) -> UploadService {
    UploadService::new(Arc::new(store.clone()), UploadSettings::default())
}

fn request(platform: &str, content: String) -> UploadRequest {
    UploadRequest {
        filename: Some("export.csv".to_string()),
        content: Some(content),
        platform: Some(platform.to_string()),
        reporting_date: Some("2024-01-31".to_string()),
        artist_id: Some(ARTIST_ID.to_string()),
        uploaded_by: Some(9),
    }
}

fn deezer_file(rows: usize) -> String {
    let mut content = format!("{}\n", DEEZER_HEADER);
    for i in 0..rows {
        content.push_str(&format!("2024-01-{:02},Track {},FR0000000{:03},Deezer,Indie,Jane Doe,France,{},album,desktop\n", i % 28 + 1, i, i, i * 10));
    }
    content
}

#[tokio::test]
async fn test_deezer_rows_all_written() {
    let store = store();
    let summary = service(&store).process(request("Deezer", deezer_file(3))).await.unwrap();

    assert_eq!(summary.records_processed, 3);
    assert_eq!(summary.skipped_records, 0);
    assert_eq!(summary.failed_records, 0);
    assert_eq!(summary.inserted.streaming, 3);

    let rows = store.rows(RecordKind::Streaming);
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row["upload_id"], SqlValue::Int(Some(summary.upload_id)));
        assert_eq!(row["platform"], SqlValue::text("Deezer"));
        assert_eq!(row["country"], SqlValue::text("FR"));
    }
    assert_eq!(rows[2]["streams"], SqlValue::Int(Some(20)));

    let uploads = store.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].id, summary.upload_id);
    assert_eq!(uploads[0].total_records, 3);
    assert_eq!(uploads[0].platform, "Deezer");
    assert_eq!(uploads[0].uploaded_by, Some(9));
    assert_eq!(uploads[0].reporting_date, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
}

#[tokio::test]
async fn test_spotify_single_row_scenario() {
    let store = store().with_release(77, ARTIST_ID, Some("USABC1234567"), "Something Else");
    let content = format!("{}\nUSABC1234567,Jane Doe,1500,2024-01-15,My Song,United States,radio,mobile\n", SPOTIFY_HEADER);

    let summary = service(&store).process(request("Spotify", content)).await.unwrap();
    assert_eq!(summary.records_processed, 1);

    let rows = store.rows(RecordKind::Streaming);
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["streams"], SqlValue::Int(Some(1500)));
    assert_eq!(row["country"], SqlValue::text("UN"));
    assert_eq!(row["date"], SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
    assert_eq!(row["song_title"], SqlValue::text("My Song"));
    assert_eq!(row["artist_name"], SqlValue::text("Jane Doe"));
    assert_eq!(row["release_id"], SqlValue::Int(Some(77)));
    assert_eq!(row["source"], SqlValue::text("radio"));
    assert_eq!(row["device_type"], SqlValue::text("mobile"));
}

#[tokio::test]
async fn test_release_matched_by_title_when_isrc_unknown() {
    let store = store().with_release(5, ARTIST_ID, None, "my song");
    let content = format!("{}\nZZ0000000000,Jane Doe,1,2024-01-15,My Song,US,radio,mobile\n", SPOTIFY_HEADER);

    service(&store).process(request("Spotify", content)).await.unwrap();

    assert_eq!(store.rows(RecordKind::Streaming)[0]["release_id"], SqlValue::Int(Some(5)));
}

#[tokio::test]
async fn test_release_lookups_cached_per_track() {
    let store = store();
    let content = format!(
        "{}\nUS1,Jane Doe,1,2024-01-01,Same Song,US,a,b\nUS1,Jane Doe,2,2024-01-02,Same Song,US,a,b\nUS1,Jane Doe,3,2024-01-03,same song,US,a,b\n",
        SPOTIFY_HEADER
    );

    service(&store).process(request("Spotify", content)).await.unwrap();

    // one ISRC miss plus one title miss, then cache hits
    assert_eq!(store.release_lookups(), 2);
    assert!(store.rows(RecordKind::Streaming).iter().all(|row| row["release_id"] == SqlValue::Int(None)));
}

#[tokio::test]
async fn test_release_lookup_failure_is_soft() {
    let store = store();
    store.set_fail_release_lookups(true);

    let summary = service(&store).process(request("Deezer", deezer_file(2))).await.unwrap();

    assert_eq!(summary.records_processed, 2);
    assert_eq!(store.rows(RecordKind::Streaming).len(), 2);
}

#[tokio::test]
async fn test_missing_column_rejects_whole_file() {
    let store = store();
    let content = "ISRC,Artist Name,Streams,Date,Song Name,Country,Source\nUS1,Jane,1,2024-01-01,Song,US,radio\n".to_string();

    let err = service(&store).process(request("Spotify", content)).await.unwrap_err();

    match err {
        UploadError::MissingColumns { platform, missing } => {
            assert_eq!(platform, "Spotify");
            assert_eq!(missing, vec!["Device Type"]);
        }
        other => panic!("Expected MissingColumns, got {:?}", other),
    }
    assert_eq!(store.total_rows(), 0);
    assert!(store.statement_sizes().is_empty());
    assert!(store.uploads().is_empty());
}

#[tokio::test]
async fn test_bad_rows_are_skipped() {
    let store = store();
    let content = format!(
        "{}\nUS1,Jane Doe,10,2024-01-01,Good One,US,a,b\nUS2,Jane Doe,10\nUS3,Jane Doe,10,2024-01-01,,US,a,b\nUS4,Jane Doe,10,2024-01-01,Good Two,US,a,b\n",
        SPOTIFY_HEADER
    );

    let summary = service(&store).process(request("Spotify", content)).await.unwrap();

    assert_eq!(summary.records_processed, 2);
    assert_eq!(summary.skipped_records, 2);
    assert_eq!(store.uploads()[0].total_records, 2);
}

#[tokio::test]
async fn test_write_failures_are_counted_not_fatal() {
    let store = store();
    let content = format!(
        "{}\nUS1,Jane Doe,10,2024-01-01,Fine,US,a,b\nUS2,Jane Doe,10,2024-01-01,{},US,a,b\n",
        SPOTIFY_HEADER,
        mock_helpers::POISON
    );

    let summary = service(&store).process(request("Spotify", content)).await.unwrap();

    assert_eq!(summary.records_processed, 2);
    assert_eq!(summary.failed_records, 1);
    assert_eq!(summary.inserted.streaming, 1);
    assert_eq!(store.uploads()[0].total_records, 2);
}

#[tokio::test]
async fn test_rows_written_in_batches() {
    let store = store();
    let summary = service(&store).process(request("Deezer", deezer_file(250))).await.unwrap();

    assert_eq!(summary.records_processed, 250);
    assert_eq!(store.statement_sizes(), vec![100, 100, 50]);
}

#[tokio::test]
async fn test_custom_batch_size() {
    let store = store();
    let settings = UploadSettings { batch_size: 2, delimiter_mode: DelimiterMode::PerLine };
    let service = UploadService::new(Arc::new(store.clone()), settings);

    service.process(request("Deezer", deezer_file(5))).await.unwrap();

    assert_eq!(store.statement_sizes(), vec![2, 2, 1]);
}

#[tokio::test]
async fn test_tab_separated_upload() {
    let store = store();
    let content = "Track Title\tArtist\tCountry\tState\tCity\tISRC\tShazam Count\n\
                   Tune\tJane Doe\tgb\tEngland\tLondon, Soho\tGB1\t1,204\n";

    let summary = service(&store).process(request("Shazam", content.to_string())).await.unwrap();
    assert_eq!(summary.inserted.shazam, 1);

    let row = &store.rows(RecordKind::Shazam)[0];
    assert_eq!(row["track_title"], SqlValue::text("Tune"));
    assert_eq!(row["country"], SqlValue::text("GB"));
    assert_eq!(row["city"], SqlValue::text("London, Soho"));
    assert_eq!(row["shazam_count"], SqlValue::Int(Some(1204)));
}

#[tokio::test]
async fn test_tiktok_upload() {
    let store = store();
    let content = "Platform Name,Song ID,ISRC,UPC,Song Title,Artist,Platform Classified Genre,Territory,Content Type,Creations,Video Views,Comments,Likes,Shares,Favorites,Average Watchtime\n\
                   TikTok,123,US1,000111,Dance,Jane Doe,Pop,US,UGC,5,\"1,000\",2,30,4,1,12.5s\n";

    service(&store).process(request("TikTok", content.to_string())).await.unwrap();

    let row = &store.rows(RecordKind::Tiktok)[0];
    assert_eq!(row["video_views"], SqlValue::Int(Some(1000)));
    assert_eq!(row["average_watchtime"], SqlValue::Float(12.5));
    assert_eq!(row["platform_classified_genre"], SqlValue::text("Pop"));
}

#[tokio::test]
async fn test_apple_music_upload() {
    let store = store();
    let content = "Date,Song Title,Artist,ISRC,Country,Device Type,Source of Stream,Stream Count\n\
                   2024-01-10,Song A,Jane Doe,US1,us,iphone,playlist,\"2,500\"\n";

    let summary = service(&store).process(request("apple music", content.to_string())).await.unwrap();
    assert_eq!(summary.inserted.streaming, 1);

    let row = &store.rows(RecordKind::Streaming)[0];
    assert_eq!(row["platform"], SqlValue::text("Apple Music"));
    assert_eq!(row["streams"], SqlValue::Int(Some(2500)));
    assert_eq!(row["country"], SqlValue::text("US"));
    assert_eq!(row["device_type"], SqlValue::text("iphone"));
    assert_eq!(row["source"], SqlValue::text("playlist"));
    assert_eq!(row["date"], SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()));
    assert_eq!(store.uploads()[0].platform, "Apple Music");
}

#[tokio::test]
async fn test_meta_upload() {
    let store = store();
    let content = "Service,Product Type,ISRC,UPC,Song Title,Artist,Event Count,Territory\n\
                   Instagram,Reels,US1,000123,Clip,Jane Doe,42,BR\n";

    let summary = service(&store).process(request("Meta", content.to_string())).await.unwrap();
    assert_eq!(summary.inserted.meta, 1);
    assert_eq!(summary.inserted.streaming, 0);

    let row = &store.rows(RecordKind::Meta)[0];
    assert_eq!(row["song_title"], SqlValue::text("Clip"));
    assert_eq!(row["artist_name"], SqlValue::text("Jane Doe"));
    assert_eq!(row["service"], SqlValue::text("Instagram"));
    assert_eq!(row["product_type"], SqlValue::text("Reels"));
    assert_eq!(row["upc"], SqlValue::text("000123"));
    assert_eq!(row["event_count"], SqlValue::Int(Some(42)));
    assert_eq!(row["territory"], SqlValue::text("BR"));
    assert!(store.rows(RecordKind::Streaming).is_empty());
}

#[tokio::test]
async fn test_header_only_file() {
    let store = store();
    let err = service(&store).process(request("Deezer", format!("{}\n\n", DEEZER_HEADER))).await.unwrap_err();

    assert!(matches!(err, UploadError::EmptyOrHeaderOnly));
    assert!(store.uploads().is_empty());
}

#[tokio::test]
async fn test_unsupported_platform() {
    let store = store();
    let err = service(&store).process(request("Napster", deezer_file(1))).await.unwrap_err();

    assert!(matches!(err, UploadError::UnsupportedPlatform(ref p) if p == "Napster"));
    assert!(err.is_input_error());
}

#[tokio::test]
async fn test_unknown_artist_leaves_no_ledger_row() {
    let store = MemoryStore::new();
    let err = service(&store).process(request("Deezer", deezer_file(1))).await.unwrap_err();

    assert!(matches!(err, UploadError::ArtistNotFound(ARTIST_ID)));
    assert!(store.uploads().is_empty());
}

#[tokio::test]
async fn test_finalize_failure_surfaces_as_store_error() {
    let store = store();
    store.set_fail_finalize(true);

    let err = service(&store).process(request("Deezer", deezer_file(2))).await.unwrap_err();

    assert!(matches!(err, UploadError::Store(_)));
    assert!(!err.is_input_error());
    // rows already written stay written
    assert_eq!(store.rows(RecordKind::Streaming).len(), 2);
}

#[tokio::test]
async fn test_artist_lookup_with_mocked_store() {
    let mut mock = MockAnalyticsStore::new();
    mock.expect_find_artist_name().withf(|id| *id == 42).times(1).returning(|_| Ok(None));
    mock.expect_create_upload().never();
    mock.expect_execute().never();

    let service = UploadService::new(Arc::new(mock), UploadSettings::default());
    let err = service.process(UploadRequest { artist_id: Some("42".to_string()), ..request("Deezer", deezer_file(1)) }).await.unwrap_err();

    assert!(matches!(err, UploadError::ArtistNotFound(42)));
}

#[tokio::test]
async fn test_ledger_failure_with_mocked_store() {
    let mut mock = MockAnalyticsStore::new();
    mock.expect_find_artist_name().returning(|_| Ok(Some("Jane Doe".to_string())));
    mock.expect_create_upload().times(1).returning(|_| Err(StoreError::Rejected("ledger unavailable".to_string())));
    mock.expect_execute().never();

    let service = UploadService::new(Arc::new(mock), UploadSettings::default());
    let err = service.process(request("Deezer", deezer_file(1))).await.unwrap_err();

    assert!(matches!(err, UploadError::Store(_)));
}

#[tokio::test]
async fn test_upload_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(deezer_file(4).as_bytes()).unwrap();
    file.write_all(&[0xff, 0xfe]).unwrap();
    file.flush().unwrap();

    let request = UploadRequest::from_file(file.path(), "deezer", "2024-01-31", "3", None).await.unwrap();
    assert!(request.filename.is_some());

    let store = store();
    let summary = service(&store).process(request).await.unwrap();

    // trailing invalid bytes become one malformed row
    assert_eq!(summary.records_processed, 4);
    assert_eq!(summary.skipped_records, 1);
    assert_eq!(store.uploads()[0].platform, "Deezer");
    assert_eq!(store.uploads()[0].uploaded_by, None);
}

#[tokio::test]
async fn test_upload_from_missing_file() {
    let result = UploadRequest::from_file(std::path::Path::new("/nonexistent/export.csv"), "Deezer", "2024-01-31", "3", None).await;
    assert!(result.is_err());
}
