use std::{env, path::PathBuf, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// The configuration shared by the acquisition, cache, and dispatch components
#[derive(Debug, Clone)]
pub struct Config {
    /// The root directory of the audio cache. Thumbnails live in a sibling `thumbs` directory.
    pub download_dir: PathBuf,
    /// Thumbnails larger than this are re-encoded
    pub thumbnail_max_size_kb: u64,
    /// The largest width or height of a re-encoded thumbnail
    pub thumbnail_max_dimension: u32,
    /// How many dispatched jobs can wait for the scheduler at once
    pub dispatch_capacity: usize,
    /// The yt-dlp executable
    pub ytdlp_path: String,
}

impl Config {
    pub const AUDIO_EXTENSION: &'static str = "mp3";
    pub const THUMBNAIL_EXTENSION: &'static str = "jpg";

    /// Reads the configuration from `TUNELINK_*` environment variables, using defaults for missing values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            download_dir: env::var("TUNELINK_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            thumbnail_max_size_kb: parse_var("TUNELINK_THUMBNAIL_MAX_KB")?
                .unwrap_or(defaults.thumbnail_max_size_kb),
            thumbnail_max_dimension: parse_var("TUNELINK_THUMBNAIL_MAX_DIM")?
                .unwrap_or(defaults.thumbnail_max_dimension),
            dispatch_capacity: parse_var("TUNELINK_DISPATCH_CAPACITY")?
                .unwrap_or(defaults.dispatch_capacity),
            ytdlp_path: env::var("TUNELINK_YTDLP").unwrap_or(defaults.ytdlp_path),
        })
    }

    /// The directory cached thumbnails are stored in
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.download_dir.join("thumbs")
    }

    /// The directory in-progress downloads are written to before they are moved into place
    pub fn partial_dir(&self) -> PathBuf {
        self.download_dir.join(".partial")
    }

    /// The canonical location of the audio artifact for a media id
    pub fn audio_path(&self, media_id: &str) -> PathBuf {
        self.download_dir
            .join(format!("{}.{}", media_id, Self::AUDIO_EXTENSION))
    }

    /// The canonical location of the thumbnail artifact for a media id
    pub fn thumbnail_path(&self, media_id: &str) -> PathBuf {
        self.thumbnail_dir()
            .join(format!("{}.{}", media_id, Self::THUMBNAIL_EXTENSION))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            // Telegram rejects larger audio thumbnails
            thumbnail_max_size_kb: 200,
            thumbnail_max_dimension: 320,
            dispatch_capacity: 64,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

/// Parses an optional environment variable, failing if it is set but invalid.
pub fn parse_var<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}
