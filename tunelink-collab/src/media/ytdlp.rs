use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tunelink_core::{Config, ProgressEvent, ProgressReporter};

use super::{Descriptor, Extractor, MediaError};

const YT_UNAVAILABLE: &str = "Video unavailable. This video is not available";
const YT_NOT_FOUND: &str = "Video unavailable";
const YT_ID_ERROR: &str = "Incomplete YouTube ID";

/// Marks the lines yt-dlp prints for each progress update
const PROGRESS_PREFIX: &str = "tunelink-progress";
const PROGRESS_TEMPLATE: &str = "download:tunelink-progress %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

/// An [Extractor] that runs the yt-dlp executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    path: String,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
    width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Resource {
    // Entries are kept raw so a single deleted or private entry doesn't fail the whole list
    Playlist { entries: Vec<serde_json::Value> },
    Video(Entry),
}

impl YtDlp {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.ytdlp_path)
    }

    /// Fetches metadata without downloading anything.
    async fn extract(&self, target: &str) -> Result<Vec<Descriptor>, MediaError> {
        let output = Command::new(&self.path)
            // Don't resolve every entry of a playlist or search.
            .arg("--flat-playlist")
            // Or download anything.
            .arg("--skip-download")
            .arg("--no-playlist")
            // Get a JSON output, in a single line.
            .arg("-J")
            .args(["--", target])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaError::Extraction(e.to_string()))?;

        if !output.status.success() {
            return Err(classify_error(&String::from_utf8_lossy(&output.stderr)));
        }

        let resource: Resource = serde_json::from_slice(&output.stdout)
            .map_err(|e| MediaError::Parse(e.to_string()))?;

        Ok(resource.into_descriptors())
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Descriptor>, MediaError> {
        self.extract(&search_target(query, limit)).await
    }

    async fn resolve(&self, url: &str) -> Result<Vec<Descriptor>, MediaError> {
        self.extract(url).await
    }

    async fn download(
        &self,
        url: &str,
        workdir: &Path,
        progress: &ProgressReporter,
    ) -> Result<Descriptor, MediaError> {
        let template = workdir.join("%(id)s.%(ext)s");

        let mut child = Command::new(&self.path)
            .args(["-f", "bestaudio/best"])
            .arg("--no-playlist")
            .args(["-x", "--audio-format", "mp3", "--audio-quality", "192K"])
            // Print the info JSON to stdout, but still download.
            .args(["-j", "--no-simulate"])
            .args(["--newline", "--progress"])
            .args(["--progress-template", PROGRESS_TEMPLATE])
            .arg("-o")
            .arg(&template)
            .args(["--", url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::Download(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Download("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::Download("stderr was not captured".to_string()))?;

        let (info, errors) = tokio::join!(
            read_lines(stdout, progress),
            read_lines(stderr, progress)
        );

        let exit = child
            .wait()
            .await
            .map_err(|e| MediaError::Download(e.to_string()))?;

        if !exit.success() {
            return Err(classify_error(&errors?.join("\n")));
        }

        let info = info?;
        let line = info
            .iter()
            .find(|l| l.starts_with('{'))
            .ok_or_else(|| MediaError::Parse("yt-dlp printed no info".to_string()))?;

        let entry: Entry =
            serde_json::from_str(line).map_err(|e| MediaError::Parse(e.to_string()))?;

        progress.finished();
        Ok(entry.into())
    }
}

impl Resource {
    fn into_descriptors(self) -> Vec<Descriptor> {
        match self {
            Resource::Video(entry) => vec![entry.into()],
            Resource::Playlist { entries } => entries
                .into_iter()
                .filter_map(|e| serde_json::from_value::<Entry>(e).ok())
                .map(Into::into)
                .collect(),
        }
    }
}

impl From<Entry> for Descriptor {
    fn from(entry: Entry) -> Self {
        let canonical_url = entry
            .webpage_url
            .or(entry.url.filter(|u| u.starts_with("http")))
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", entry.id));

        Descriptor {
            title: entry.title.unwrap_or_else(|| entry.id.clone()),
            canonical_url,
            duration: entry
                .duration
                .filter(|d| d.is_finite() && *d >= 0.)
                .map(|d| d.round() as u32),
            uploader: entry.uploader.or(entry.channel),
            thumbnail_url: entry.thumbnail.or_else(|| determine_thumbnail(entry.thumbnails)),
            id: entry.id,
        }
    }
}

/// Collects every line of the stream, forwarding progress lines to the reporter instead.
async fn read_lines<R>(stream: R, progress: &ProgressReporter) -> Result<Vec<String>, MediaError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut collected = vec![];

    while let Some(line) = lines.next_line().await? {
        match parse_progress(&line) {
            Some(event) => progress.report(event),
            None => collected.push(line),
        }
    }

    Ok(collected)
}

fn search_target(query: &str, limit: usize) -> String {
    if limit > 1 {
        format!("ytsearch{}:{}", limit, query)
    } else {
        format!("ytsearch:{}", query)
    }
}

/// Parses a line printed with [PROGRESS_TEMPLATE].
fn parse_progress(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();

    let status = fields.next()?;
    let downloaded = fields.next().and_then(parse_bytes);
    let total = fields.next().and_then(parse_bytes);
    let estimate = fields.next().and_then(parse_bytes);

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            downloaded_bytes: downloaded?,
            total_bytes: total.or(estimate),
        }),
        "finished" => Some(ProgressEvent::Finished),
        _ => None,
    }
}

/// yt-dlp prints "NA" for unknown values, and estimates as floats
fn parse_bytes(value: &str) -> Option<u64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.)
        .map(|v| v as u64)
}

fn classify_error(error_output: &str) -> MediaError {
    debug!("yt-dlp failed: {}", error_output.trim());

    if error_output.contains(YT_UNAVAILABLE) {
        return MediaError::Unavailable;
    }

    if error_output.contains(YT_NOT_FOUND) {
        return MediaError::NotFound;
    }

    if error_output.contains(YT_ID_ERROR) {
        return MediaError::InvalidId("Incomplete video id".to_string());
    }

    MediaError::Extraction(error_output.trim().to_string())
}

fn determine_thumbnail(mut thumbnails: Vec<Thumbnail>) -> Option<String> {
    // Sort to get the largest at end
    thumbnails.sort_by(|a, b| a.width.cmp(&b.width));
    thumbnails.pop().map(|t| t.url)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_progress() {
        assert_eq!(
            parse_progress("tunelink-progress downloading 1024 4096 NA"),
            Some(ProgressEvent::Downloading {
                downloaded_bytes: 1024,
                total_bytes: Some(4096)
            })
        );
        assert_eq!(
            parse_progress("tunelink-progress downloading 1024 NA 8191.5"),
            Some(ProgressEvent::Downloading {
                downloaded_bytes: 1024,
                total_bytes: Some(8191)
            })
        );
        assert_eq!(
            parse_progress("tunelink-progress finished 4096 4096 NA"),
            Some(ProgressEvent::Finished)
        );

        assert_eq!(parse_progress("tunelink-progress downloading NA NA NA"), None);
        assert_eq!(parse_progress("[ExtractAudio] Destination: abc.mp3"), None);
    }

    #[test]
    fn test_search_target() {
        assert_eq!(search_target("daft punk", 5), "ytsearch5:daft punk");
        assert_eq!(search_target("daft punk", 1), "ytsearch:daft punk");
    }

    #[test]
    fn test_parse_video() {
        let json = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "duration": 212.0,
            "uploader": "Rick Astley",
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg"
        }"#;

        let resource: Resource = serde_json::from_str(json).unwrap();
        let descriptors = resource.into_descriptors();

        assert_eq!(
            descriptors,
            vec![Descriptor {
                id: "dQw4w9WgXcQ".to_string(),
                title: "Never Gonna Give You Up".to_string(),
                canonical_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
                duration: Some(212),
                uploader: Some("Rick Astley".to_string()),
                thumbnail_url: Some(
                    "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg".to_string()
                ),
            }]
        );
    }

    #[test]
    fn test_parse_search_results() {
        let json = r#"{
            "id": "daft punk",
            "title": "daft punk",
            "entries": [
                {
                    "id": "a1",
                    "title": "One More Time",
                    "url": "https://www.youtube.com/watch?v=a1",
                    "duration": null,
                    "channel": "Daft Punk",
                    "thumbnails": [
                        { "url": "https://i.ytimg.com/vi/a1/small.jpg", "width": 120 },
                        { "url": "https://i.ytimg.com/vi/a1/large.jpg", "width": 640 }
                    ]
                },
                { "title": "[Deleted video]" },
                { "id": "b2" }
            ]
        }"#;

        let resource: Resource = serde_json::from_str(json).unwrap();
        let descriptors = resource.into_descriptors();

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].uploader.as_deref(), Some("Daft Punk"));
        assert_eq!(
            descriptors[0].thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/a1/large.jpg")
        );
        assert_eq!(descriptors[0].duration, None);
        assert_eq!(descriptors[1].title, "b2");
        assert_eq!(
            descriptors[1].canonical_url,
            "https://www.youtube.com/watch?v=b2"
        );
    }

    #[test]
    fn test_classify_error() {
        assert!(matches!(
            classify_error("ERROR: [youtube] x: Video unavailable. This video is not available"),
            MediaError::Unavailable
        ));
        assert!(matches!(
            classify_error("ERROR: [youtube] x: Video unavailable"),
            MediaError::NotFound
        ));
        assert!(matches!(
            classify_error("ERROR: [youtube:truncated_id] x: Incomplete YouTube ID x."),
            MediaError::InvalidId(_)
        ));
        assert!(matches!(
            classify_error("ERROR: network is down"),
            MediaError::Extraction(_)
        ));
    }
}
