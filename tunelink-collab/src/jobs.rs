use log::{debug, error, info, warn};
use thiserror::Error;
use tunelink_core::{ProgressEvent, ProgressReporter};

use crate::{
    AudioUpload, Collab, Database, Descriptor, Downloaded, Extractor, MediaError, MessageRef,
    NewTrack, NewUser, PrimaryKey, Transport, TransportError,
};

const WEB_STARTED: &str = "Download from website started. Please wait…";
const WEB_FINISHED: &str = "Downloaded from website";
const SEARCH_FAILED: &str = "Search failed. Try again later.";
const DOWNLOAD_FAILED: &str = "Download failed. Try again later.";
const NO_RESULTS: &str = "No results.";
const SEND_FAILED: &str = "Failed to send audio.";
const PROCESSING: &str = "Processing audio…";
const LINKED: &str = "Your account is now linked to the website.";
const UNKNOWN_PERFORMER: &str = "Unknown";

/// Where a delivery was requested from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A message sent to the bot
    Chat,
    /// The website, through the HTTP API
    Web,
}

/// Work that has to run on the scheduler owning the chat connection
#[derive(Debug, Clone)]
pub enum Job {
    /// Find the query, download it if needed, and send the audio to the chat
    Deliver {
        chat_id: PrimaryKey,
        user: NewUser,
        query: String,
        origin: Origin,
    },
    /// Tell the user the code they were shown has been used
    NotifyLinked { user_id: PrimaryKey },
}

impl Job {
    pub fn deliver(
        chat_id: PrimaryKey,
        user: NewUser,
        query: impl Into<String>,
        origin: Origin,
    ) -> Self {
        Job::Deliver {
            chat_id,
            user,
            query: query.into(),
            origin,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] MediaError),
    #[error("Delivery failed: {0}")]
    Delivery(TransportError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl<Db, E> Collab<Db, E>
where
    Db: Database,
    E: Extractor,
{
    pub async fn run_job<T>(&self, job: Job, transport: &T) -> Result<(), JobError>
    where
        T: Transport + ?Sized,
    {
        match job {
            Job::Deliver {
                chat_id,
                user,
                query,
                origin,
            } => self.deliver(chat_id, user, &query, origin, transport).await,
            Job::NotifyLinked { user_id } => self.notify_linked(user_id, transport).await,
        }
    }

    async fn deliver<T>(
        &self,
        chat_id: PrimaryKey,
        user: NewUser,
        query: &str,
        origin: Origin,
        transport: &T,
    ) -> Result<(), JobError>
    where
        T: Transport + ?Sized,
    {
        let status_text = match origin {
            Origin::Chat => format!("Searching: {} …", query),
            Origin::Web => WEB_STARTED.to_string(),
        };
        let status = transport.send_text(chat_id, &status_text).await?;

        let found = match self.media.search(query, 1).await {
            Ok(found) => found,
            Err(e) => {
                edit_quietly(transport, status, SEARCH_FAILED).await;
                return Err(e.into());
            }
        };

        let Some(descriptor) = found.into_iter().next() else {
            info!("No results for {:?}", query);
            edit_quietly(transport, status, NO_RESULTS).await;
            return Ok(());
        };

        let downloaded = match self.media.locate_cached(&descriptor.id).await {
            Some(path) => {
                debug!("{} is cached", descriptor.id);
                Downloaded { path, descriptor }
            }
            None => match self.download(&descriptor, status, transport).await {
                Ok(downloaded) => downloaded,
                Err(e) => {
                    edit_quietly(transport, status, DOWNLOAD_FAILED).await;
                    return Err(e.into());
                }
            },
        };

        let Downloaded { path, descriptor } = downloaded;

        let thumbnail = match &descriptor.thumbnail_url {
            Some(url) => self.thumbnails.ensure(url, &descriptor.id).await,
            None => None,
        };

        let upload = AudioUpload {
            path,
            title: descriptor.title.clone(),
            performer: descriptor
                .uploader
                .clone()
                .unwrap_or_else(|| UNKNOWN_PERFORMER.to_string()),
            duration: descriptor.duration.unwrap_or(0),
            caption: match origin {
                Origin::Chat => Some(format!("Source: {}", descriptor.canonical_url)),
                Origin::Web => None,
            },
            thumbnail: thumbnail.map(|t| t.path),
        };

        if let Err(e) = transport.send_audio(chat_id, upload).await {
            edit_quietly(transport, status, SEND_FAILED).await;
            return Err(JobError::Delivery(e));
        }

        info!("Delivered {} to chat {}", descriptor.id, chat_id);

        // Delivery already happened, a failure here only loses the record of it
        if let Err(e) = self.library.record_delivery(user, track_of(descriptor)).await {
            error!("Failed to record delivery to chat {}: {}", chat_id, e);
        }

        let finished = match origin {
            Origin::Chat => transport.delete(status).await,
            Origin::Web => transport.edit_text(status, WEB_FINISHED).await,
        };

        if let Err(e) = finished {
            warn!("Failed to update status message in chat {}: {}", chat_id, e);
        }

        Ok(())
    }

    /// Downloads the media while reflecting progress in the status message.
    async fn download<T>(
        &self,
        descriptor: &Descriptor,
        status: MessageRef,
        transport: &T,
    ) -> Result<Downloaded, MediaError>
    where
        T: Transport + ?Sized,
    {
        edit_quietly(
            transport,
            status,
            &format!("Found: {}\nStarting download…", descriptor.title),
        )
        .await;

        let (reporter, mut events) = ProgressReporter::channel();
        let download = self.media.download(&descriptor.canonical_url, &reporter);
        tokio::pin!(download);

        let mut view = ProgressView::default();

        loop {
            tokio::select! {
                result = &mut download => return result,
                Some(event) = events.recv() => {
                    if let Some(text) = view.update(event) {
                        edit_quietly(transport, status, &text).await;
                    }
                }
            }
        }
    }

    async fn notify_linked<T>(&self, user_id: PrimaryKey, transport: &T) -> Result<(), JobError>
    where
        T: Transport + ?Sized,
    {
        let Some(message) = self.link_messages.take(user_id) else {
            debug!("User {} has no link message to update", user_id);
            return Ok(());
        };

        transport.edit_text(message, LINKED).await?;
        Ok(())
    }
}

/// Turns progress events into status texts, skipping updates that would barely change.
#[derive(Debug, Default)]
struct ProgressView {
    last_step: Option<u32>,
    finished: bool,
}

impl ProgressView {
    fn update(&mut self, event: ProgressEvent) -> Option<String> {
        if self.finished {
            return None;
        }

        if event == ProgressEvent::Finished {
            self.finished = true;
            return Some(PROCESSING.to_string());
        }

        let percent = event.percent()?;
        let step = (percent / 10.) as u32;

        if self.last_step.is_some_and(|last| step <= last) {
            return None;
        }

        self.last_step = Some(step);
        Some(format!("Downloading: {:.1}%", percent))
    }
}

fn track_of(descriptor: Descriptor) -> NewTrack {
    NewTrack {
        title: descriptor.title,
        artist: descriptor.uploader,
        url: descriptor.canonical_url,
        thumbnail_url: descriptor.thumbnail_url,
        duration: descriptor.duration.unwrap_or(0),
    }
}

async fn edit_quietly<T>(transport: &T, message: MessageRef, text: &str)
where
    T: Transport + ?Sized,
{
    if let Err(e) = transport.edit_text(message, text).await {
        warn!("Failed to edit message in chat {}: {}", message.chat_id, e);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::SqliteDatabase;
    use async_trait::async_trait;
    use std::{
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };
    use tokio::fs;
    use tunelink_core::Config;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(String),
        Edit(i32, String),
        Delete(i32),
        Audio(AudioUpload),
    }

    #[derive(Default)]
    struct FakeTransport {
        sent: Mutex<Vec<Sent>>,
        fail_audio: bool,
    }

    impl FakeTransport {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, sent: Sent) -> i32 {
            let mut all = self.sent.lock().unwrap();
            all.push(sent);
            all.len() as i32
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send_text(&self, chat_id: PrimaryKey, text: &str) -> Result<MessageRef, TransportError> {
            let id = self.record(Sent::Text(text.to_string()));
            Ok(MessageRef::new(chat_id, id))
        }

        async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), TransportError> {
            self.record(Sent::Edit(message.message_id, text.to_string()));
            Ok(())
        }

        async fn delete(&self, message: MessageRef) -> Result<(), TransportError> {
            self.record(Sent::Delete(message.message_id));
            Ok(())
        }

        async fn send_audio(
            &self,
            chat_id: PrimaryKey,
            audio: AudioUpload,
        ) -> Result<MessageRef, TransportError> {
            if self.fail_audio {
                return Err(TransportError::Rejected("file too large".to_string()));
            }

            let id = self.record(Sent::Audio(audio));
            Ok(MessageRef::new(chat_id, id))
        }
    }

    #[derive(Default)]
    struct FakeExtractor {
        results: Vec<Descriptor>,
        fail_search: bool,
        downloads: AtomicUsize,
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<Descriptor>, MediaError> {
            if self.fail_search {
                return Err(MediaError::Extraction("network is down".to_string()));
            }

            Ok(self.results.clone())
        }

        async fn resolve(&self, url: &str) -> Result<Vec<Descriptor>, MediaError> {
            self.search(url, 1).await
        }

        async fn download(
            &self,
            _: &str,
            workdir: &Path,
            progress: &ProgressReporter,
        ) -> Result<Descriptor, MediaError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let descriptor = self.results[0].clone();

            progress.downloading(5, Some(10));
            fs::write(workdir.join(format!("{}.mp3", descriptor.id)), b"audio").await?;
            progress.finished();

            Ok(descriptor)
        }
    }

    fn descriptor() -> Descriptor {
        Descriptor {
            id: "abc".to_string(),
            title: "A Song".to_string(),
            canonical_url: "https://www.youtube.com/watch?v=abc".to_string(),
            duration: None,
            uploader: None,
            thumbnail_url: None,
        }
    }

    async fn collab(
        directory: &Path,
        extractor: FakeExtractor,
    ) -> Collab<SqliteDatabase, FakeExtractor> {
        let config = Config {
            download_dir: directory.to_path_buf(),
            ..Default::default()
        };

        Collab::new(config, SqliteDatabase::in_memory().await.unwrap(), extractor)
    }

    #[tokio::test]
    async fn test_chat_delivery() {
        let directory = tempfile::tempdir().unwrap();
        let collab = collab(
            directory.path(),
            FakeExtractor {
                results: vec![descriptor()],
                ..Default::default()
            },
        )
        .await;
        let transport = FakeTransport::default();

        collab
            .run_job(
                Job::deliver(42, NewUser::with_id(42), "a song", Origin::Chat),
                &transport,
            )
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0], Sent::Text("Searching: a song …".to_string()));
        assert_eq!(
            sent[1],
            Sent::Edit(1, "Found: A Song\nStarting download…".to_string())
        );
        assert_eq!(sent.last(), Some(&Sent::Delete(1)));

        let audio = sent
            .iter()
            .find_map(|s| match s {
                Sent::Audio(audio) => Some(audio.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(audio.performer, "Unknown");
        assert_eq!(audio.duration, 0);
        assert_eq!(audio.path, directory.path().join("abc.mp3"));
        assert_eq!(
            audio.caption.as_deref(),
            Some("Source: https://www.youtube.com/watch?v=abc")
        );

        let history = collab.library.history(42, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].track.url, "https://www.youtube.com/watch?v=abc");
    }

    #[tokio::test]
    async fn test_web_delivery_uses_cache() {
        let directory = tempfile::tempdir().unwrap();
        std::fs::write(directory.path().join("abc.mp3"), b"cached").unwrap();

        let collab = collab(
            directory.path(),
            FakeExtractor {
                results: vec![descriptor()],
                ..Default::default()
            },
        )
        .await;
        let transport = FakeTransport::default();

        collab
            .run_job(
                Job::deliver(7, NewUser::with_id(7), "a song", Origin::Web),
                &transport,
            )
            .await
            .unwrap();

        assert_eq!(collab.media_downloads(), 0);

        let sent = transport.sent();
        assert_eq!(sent[0], Sent::Text(WEB_STARTED.to_string()));
        assert!(matches!(&sent[1], Sent::Audio(audio) if audio.caption.is_none()));
        assert_eq!(sent[2], Sent::Edit(1, WEB_FINISHED.to_string()));
    }

    #[tokio::test]
    async fn test_no_results() {
        let directory = tempfile::tempdir().unwrap();
        let collab = collab(directory.path(), FakeExtractor::default()).await;
        let transport = FakeTransport::default();

        collab
            .run_job(
                Job::deliver(1, NewUser::with_id(1), "nothing", Origin::Chat),
                &transport,
            )
            .await
            .unwrap();

        assert_eq!(transport.sent()[1], Sent::Edit(1, NO_RESULTS.to_string()));
        assert!(collab.library.history(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_reported() {
        let directory = tempfile::tempdir().unwrap();
        let collab = collab(
            directory.path(),
            FakeExtractor {
                fail_search: true,
                ..Default::default()
            },
        )
        .await;
        let transport = FakeTransport::default();

        let result = collab
            .run_job(
                Job::deliver(1, NewUser::with_id(1), "a song", Origin::Chat),
                &transport,
            )
            .await;

        assert!(matches!(result, Err(JobError::Acquisition(_))));
        assert_eq!(transport.sent()[1], Sent::Edit(1, SEARCH_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_failed_send_records_nothing() {
        let directory = tempfile::tempdir().unwrap();
        let collab = collab(
            directory.path(),
            FakeExtractor {
                results: vec![descriptor()],
                ..Default::default()
            },
        )
        .await;
        let transport = FakeTransport {
            fail_audio: true,
            ..Default::default()
        };

        let result = collab
            .run_job(
                Job::deliver(1, NewUser::with_id(1), "a song", Origin::Chat),
                &transport,
            )
            .await;

        assert!(matches!(result, Err(JobError::Delivery(_))));
        assert_eq!(
            transport.sent().last(),
            Some(&Sent::Edit(1, SEND_FAILED.to_string()))
        );
        assert!(collab.library.history(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notify_linked_edits_registered_message() {
        let directory = tempfile::tempdir().unwrap();
        let collab = collab(directory.path(), FakeExtractor::default()).await;
        let transport = FakeTransport::default();

        collab
            .run_job(Job::NotifyLinked { user_id: 5 }, &transport)
            .await
            .unwrap();
        assert!(transport.sent().is_empty());

        collab.link_messages.register(5, MessageRef::new(5, 99));
        collab
            .run_job(Job::NotifyLinked { user_id: 5 }, &transport)
            .await
            .unwrap();

        assert_eq!(transport.sent(), vec![Sent::Edit(99, LINKED.to_string())]);
        assert_eq!(collab.link_messages.get(5), None);
    }

    #[test]
    fn test_progress_view_steps() {
        let mut view = ProgressView::default();
        let at = |downloaded| ProgressEvent::Downloading {
            downloaded_bytes: downloaded,
            total_bytes: Some(1000),
        };

        assert_eq!(view.update(at(0)), Some("Downloading: 0.0%".to_string()));
        assert_eq!(view.update(at(50)), None);
        assert_eq!(view.update(at(450)), Some("Downloading: 45.0%".to_string()));
        assert_eq!(view.update(at(480)), None);
        assert_eq!(
            view.update(ProgressEvent::Downloading {
                downloaded_bytes: 10,
                total_bytes: None
            }),
            None
        );
        assert_eq!(view.update(ProgressEvent::Finished), Some(PROCESSING.to_string()));
        assert_eq!(view.update(at(1000)), None);
    }

    impl Collab<SqliteDatabase, FakeExtractor> {
        fn media_downloads(&self) -> usize {
            self.media.extractor().downloads.load(Ordering::SeqCst)
        }
    }
}
