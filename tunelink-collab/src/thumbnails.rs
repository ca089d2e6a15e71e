use std::{
    borrow::Cow,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use image::{codecs::jpeg::JpegEncoder, ColorType, ImageError, ImageFormat, RgbImage};
use log::{debug, warn};
use reqwest::Client;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::{fs, task::JoinError};
use tunelink_core::Config;

use crate::util::is_valid_media_id;

/// The quality oversized thumbnails are first re-encoded at
pub const START_QUALITY: u8 = 90;
pub const QUALITY_STEP: u8 = 10;
/// Re-encoding stops here, even if the result is still too large
pub const MIN_QUALITY: u8 = 40;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
enum ThumbnailError {
    #[error("Failed to fetch thumbnail: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("Failed to re-encode thumbnail: {0}")]
    Image(#[from] ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Thumbnail worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// A thumbnail on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub path: PathBuf,
    /// Whether the artifact was already cached
    pub from_cache: bool,
}

/// Fetches thumbnails and keeps them on disk as JPEGs under a size limit, keyed by media id.
///
/// Every failure is treated as a missing thumbnail.
pub struct ThumbnailCache {
    client: Client,
    config: Config,
}

impl ThumbnailCache {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            config: config.clone(),
        }
    }

    pub async fn ensure(&self, url: &str, media_id: &str) -> Option<Thumbnail> {
        self.ensure_with_limit(url, media_id, self.config.thumbnail_max_size_kb)
            .await
    }

    pub async fn ensure_with_limit(
        &self,
        url: &str,
        media_id: &str,
        max_size_kb: u64,
    ) -> Option<Thumbnail> {
        match self.try_ensure(url, media_id, max_size_kb).await {
            Ok(thumbnail) => thumbnail,
            Err(e) => {
                warn!("Thumbnail for {} is unavailable: {}", media_id, e);
                None
            }
        }
    }

    async fn try_ensure(
        &self,
        url: &str,
        media_id: &str,
        max_size_kb: u64,
    ) -> Result<Option<Thumbnail>, ThumbnailError> {
        if !is_valid_media_id(media_id) {
            return Ok(None);
        }

        let path = self.config.thumbnail_path(media_id);
        let max_bytes = max_size_kb * 1024;

        if let Ok(metadata) = fs::metadata(&path).await {
            if metadata.is_file() && metadata.len() <= max_bytes {
                return Ok(Some(Thumbnail {
                    path,
                    from_cache: true,
                }));
            }
        }

        let response = self.client.get(url).timeout(FETCH_TIMEOUT).send().await?;

        if !response.status().is_success() {
            debug!("Thumbnail {} responded with {}", url, response.status());
            return Ok(None);
        }

        let bytes = response.bytes().await?;

        let directory = self.config.thumbnail_dir();
        fs::create_dir_all(&directory).await?;

        let target = path.clone();
        let max_dimension = self.config.thumbnail_max_dimension;

        tokio::task::spawn_blocking(move || {
            store(&bytes, &directory, &target, max_bytes, max_dimension)
        })
        .await??;

        Ok(Some(Thumbnail {
            path,
            from_cache: false,
        }))
    }
}

/// Writes the thumbnail next to its target and renames it into place.
/// Anything that is not a JPEG within the limit is re-encoded first.
fn store(
    bytes: &[u8],
    directory: &Path,
    target: &Path,
    max_bytes: u64,
    max_dimension: u32,
) -> Result<(), ThumbnailError> {
    let is_jpeg = image::guess_format(bytes).is_ok_and(|format| format == ImageFormat::Jpeg);

    let contents = if is_jpeg && bytes.len() as u64 <= max_bytes {
        Cow::Borrowed(bytes)
    } else {
        Cow::Owned(shrink(bytes, max_bytes, max_dimension)?)
    };

    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(&contents)?;
    file.persist(target).map_err(|e| e.error)?;

    Ok(())
}

/// Re-encodes the image as a JPEG with decreasing quality until it fits in `max_bytes`.
/// The result at [MIN_QUALITY] is accepted regardless of size.
fn shrink(bytes: &[u8], max_bytes: u64, max_dimension: u32) -> Result<Vec<u8>, ThumbnailError> {
    let mut image = image::load_from_memory(bytes)?;

    if image.width() > max_dimension || image.height() > max_dimension {
        image = image.thumbnail(max_dimension, max_dimension);
    }

    let image = image.to_rgb8();
    let mut quality = START_QUALITY;

    loop {
        let encoded = encode_jpeg(&image, quality)?;

        if encoded.len() as u64 <= max_bytes || quality <= MIN_QUALITY {
            return Ok(encoded);
        }

        quality = quality.saturating_sub(QUALITY_STEP).max(MIN_QUALITY);
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut encoded = vec![];

    JpegEncoder::new_with_quality(&mut encoded, quality).encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;

    Ok(encoded)
}
