use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DB_FILE: &str = "imgconv.db";
const CURRENT_DIR: &str = "./";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_ENVIRONMENT: &str = "development";
const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
const MAX_BATCH_FILES: usize = 20;
const TTL_SECS: u64 = 8 * 60 * 60;
const CLEANUP_INTERVAL_SECS: u64 = 60 * 60;

pub const ALLOWED_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/jpg",
    "image/jfif",
    "image/png",
    "image/bmp",
    "image/gif",
    "image/webp",
];

#[derive(Debug, Error)]
#[error("invalid value '{value}' of {name}: {reason}")]
pub struct ConfigError {
    name: &'static str,
    value: String,
    reason: String,
}

/// Service settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub data_file: String,
    /// Reported by the banner endpoint
    pub environment: String,
    pub max_upload_bytes: u64,
    pub max_batch_files: usize,
    /// Largest width or height a conversion may request
    pub max_dimension: u32,
    pub allowed_types: Vec<String>,
    /// Age after which the sweeper removes objects. Zero disables the sweeper
    pub ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(CURRENT_DIR),
            data_file: String::from(DB_FILE),
            environment: String::from(DEFAULT_ENVIRONMENT),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            max_batch_files: MAX_BATCH_FILES,
            max_dimension: converter::MAX_DIMENSION,
            allowed_types: ALLOWED_TYPES.iter().map(|t| (*t).to_owned()).collect(),
            ttl: Duration::from_secs(TTL_SECS),
            cleanup_interval: Duration::from_secs(CLEANUP_INTERVAL_SECS),
        }
    }
}

impl Config {
    /// Reads `IMGCONV_*` variables, falling back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Fails when a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            port: parse(&lookup, "IMGCONV_PORT", defaults.port)?,
            data_dir: lookup("IMGCONV_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            data_file: lookup("IMGCONV_DATA_FILE").unwrap_or(defaults.data_file),
            environment: lookup("IMGCONV_ENVIRONMENT").unwrap_or(defaults.environment),
            max_upload_bytes: parse(&lookup, "IMGCONV_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            max_batch_files: parse(&lookup, "IMGCONV_MAX_BATCH", defaults.max_batch_files)?,
            max_dimension: parse(&lookup, "IMGCONV_MAX_DIMENSION", defaults.max_dimension)?,
            allowed_types: defaults.allowed_types,
            ttl: Duration::from_secs(parse(&lookup, "IMGCONV_TTL_SECS", defaults.ttl.as_secs())?),
            cleanup_interval: Duration::from_secs(parse(
                &lookup,
                "IMGCONV_CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval.as_secs(),
            )?),
        })
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.data_file)
    }

    #[must_use]
    pub fn is_allowed_type(&self, content_type: &str) -> bool {
        self.allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type.trim()))
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}
