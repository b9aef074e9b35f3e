use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::row_parser::DelimiterMode;
use crate::upload::{DEFAULT_BATCH_SIZE, UploadSettings};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestorConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub http_port: u16,
    pub batch_size: usize,
    pub max_upload_bytes: usize,
    pub delimiter_detection: DelimiterMode,
    pub admin_token: Option<String>,
    pub admin_user_id: Option<i64>,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            database_url: build_database_url("ingestor", "ingestor", "localhost", "5432", "analytics"),
            db_max_connections: 5,
            http_port: 8000,
            batch_size: DEFAULT_BATCH_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            delimiter_detection: DelimiterMode::PerLine,
            admin_token: None,
            admin_user_id: None,
        }
    }
}

/// Read a secret value from a `<VAR>_FILE` path if set, else fall back to the plain `<VAR>`
/// environment variable, then to the provided default.
fn read_secret(env_var: &str, default: &str) -> Result<String> {
    let file_var = format!("{}_FILE", env_var);
    if let Ok(file_path) = std::env::var(&file_var) {
        return std::fs::read_to_string(&file_path)
            .map(|s| s.trim().to_string())
            .with_context(|| format!("Cannot read secret file for {}: {:?}", env_var, file_path));
    }
    Ok(std::env::var(env_var).unwrap_or_else(|_| default.to_string()))
}

/// Build a Postgres connection URL from its component parts, percent-encoding credentials.
fn build_database_url(user: &str, password: &str, host: &str, port: &str, database: &str) -> String {
    let encoded_user = urlencoding::encode(user);
    let encoded_password = urlencoding::encode(password);
    format!("postgres://{}:{}@{}:{}/{}", encoded_user, encoded_password, host, port, database)
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

impl IngestorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => {
                let user = read_secret("POSTGRES_USER", "ingestor")?;
                let password = read_secret("POSTGRES_PASSWORD", "ingestor")?;
                let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "postgres".to_string());
                let port = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
                let database = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "analytics".to_string());
                build_database_url(&user, &password, &host, &port, &database)
            }
        };

        let db_max_connections = env_or("DB_MAX_CONNECTIONS", 5u32);
        let http_port = env_or("HTTP_PORT", 8000u16);

        let batch_size = match env_or("BATCH_SIZE", DEFAULT_BATCH_SIZE) {
            0 => DEFAULT_BATCH_SIZE,
            n => n,
        };

        let max_upload_bytes = env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES);
        let delimiter_detection = env_or("DELIMITER_DETECTION", DelimiterMode::PerLine);

        let admin_token = Some(read_secret("ADMIN_TOKEN", "")?).filter(|t| !t.is_empty());
        let admin_user_id = std::env::var("ADMIN_USER_ID").ok().and_then(|v| v.trim().parse::<i64>().ok());

        Ok(Self { database_url, db_max_connections, http_port, batch_size, max_upload_bytes, delimiter_detection, admin_token, admin_user_id })
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings { batch_size: self.batch_size, delimiter_mode: self.delimiter_detection }
    }
}
