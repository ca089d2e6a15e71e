use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use log::{info, warn};
use thiserror::Error;
use tokio::fs;
use tunelink_core::{Config, ProgressReporter};
use url::Url;

use crate::util::{is_valid_media_id, with_scheme};

mod ytdlp;
pub use ytdlp::*;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Resource was found but is unavailable")]
    Unavailable,

    #[error("Resource was not found")]
    NotFound,

    #[error("Media id is invalid: {0}")]
    InvalidId(String),

    #[error("Failed to extract resource: {0}")]
    Extraction(String),

    #[error("Failed to parse resource: {0}")]
    Parse(String),

    #[error("Failed to download resource: {0}")]
    Download(String),

    #[error("Download finished but {0} is missing")]
    MissingArtifact(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Describes a piece of media that can be downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// The source platform's own id, used to name cached artifacts
    pub id: String,
    pub title: String,
    pub canonical_url: String,
    /// Duration in seconds
    pub duration: Option<u32>,
    pub uploader: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// A downloaded audio artifact
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub path: PathBuf,
    pub descriptor: Descriptor,
}

/// Represents the tool that talks to the media platform
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns up to `limit` results for a free text query.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Descriptor>, MediaError>;

    /// Returns the media behind a url. Playlists may resolve to several entries.
    async fn resolve(&self, url: &str) -> Result<Vec<Descriptor>, MediaError>;

    /// Downloads the media into `workdir` as `<id>.mp3`, reporting progress along the way.
    async fn download(
        &self,
        url: &str,
        workdir: &Path,
        progress: &ProgressReporter,
    ) -> Result<Descriptor, MediaError>;
}

/// Finds, downloads, and caches audio, keyed by media id.
pub struct MediaService<E> {
    extractor: E,
    config: Config,
}

impl<E> MediaService<E>
where
    E: Extractor,
{
    pub fn new(config: &Config, extractor: E) -> Self {
        Self {
            extractor,
            config: config.clone(),
        }
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Returns candidates for the query. A recognized url resolves directly instead of being searched.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Descriptor>, MediaError> {
        let query = query.trim();

        let mut results = if is_media_url(query) {
            self.extractor.resolve(&with_scheme(query)).await?
        } else {
            self.extractor.search(query, limit).await?
        };

        results.truncate(limit);
        Ok(results)
    }

    /// Returns the cached artifact for the id, if there is one. Never touches the network.
    pub async fn locate_cached(&self, media_id: &str) -> Option<PathBuf> {
        if !is_valid_media_id(media_id) {
            return None;
        }

        let path = self.config.audio_path(media_id);

        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Some(path),
            _ => None,
        }
    }

    /// Downloads the media and moves it to its cached location.
    ///
    /// The download happens in a private directory, so a failed or concurrent
    /// download never leaves a partial file at the cached location.
    pub async fn download(
        &self,
        url: &str,
        progress: &ProgressReporter,
    ) -> Result<Downloaded, MediaError> {
        let partial_dir = self.config.partial_dir();
        fs::create_dir_all(&partial_dir).await?;

        let workdir = tempfile::Builder::new()
            .prefix("download-")
            .tempdir_in(&partial_dir)?;

        let descriptor = self
            .extractor
            .download(url, workdir.path(), progress)
            .await
            .map_err(|e| {
                warn!("Download of {} failed: {}", url, e);
                e
            })?;

        if !is_valid_media_id(&descriptor.id) {
            return Err(MediaError::InvalidId(descriptor.id));
        }

        let downloaded = workdir
            .path()
            .join(format!("{}.{}", descriptor.id, Config::AUDIO_EXTENSION));

        if !fs::try_exists(&downloaded).await? {
            return Err(MediaError::MissingArtifact(downloaded));
        }

        let path = self.config.audio_path(&descriptor.id);
        fs::rename(&downloaded, &path).await?;
        progress.finished();

        info!("Downloaded {} to {}", descriptor.id, path.display());
        Ok(Downloaded { path, descriptor })
    }
}

/// Returns true if the query is a url the extractor can resolve directly.
pub fn is_media_url(query: &str) -> bool {
    let Ok(url) = Url::parse(&with_scheme(query)) else {
        return false;
    };

    let Some(host) = url.host_str() else {
        return false;
    };

    if host == "youtube.com" || host.ends_with(".youtube.com") {
        // Test /watch?v=...
        if url.path().starts_with("/watch")
            && url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty())
        {
            return true;
        }

        // Test /v/... and /shorts/...
        if ["/v/", "/shorts/"]
            .iter()
            .any(|prefix| url.path().len() > prefix.len() && url.path().starts_with(prefix))
        {
            return true;
        }

        // Test playlists
        if url.path() == "/playlist"
            && url.query_pairs().any(|(k, v)| k == "list" && !v.is_empty())
        {
            return true;
        }
    }

    // Test youtu.be/...
    host == "youtu.be" && url.path().len() > 1
}
