use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub type ProgressSender = UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = UnboundedReceiver<ProgressEvent>;

/// Describes the progress of a download, posted from whichever worker performs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Bytes are being transferred.
    Downloading {
        downloaded_bytes: u64,
        /// The total size, if the source reports it.
        total_bytes: Option<u64>,
    },
    /// The transfer is done; post-processing may still follow.
    Finished,
}

impl ProgressEvent {
    /// Returns the completed percentage, if the total is known.
    pub fn percent(&self) -> Option<f32> {
        match self {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes: Some(total),
            } if *total > 0 => Some((*downloaded_bytes as f32 / *total as f32 * 100.).min(100.)),
            _ => None,
        }
    }
}

/// Posts progress events to a channel, making sure the reported byte counts never decrease
/// and that [ProgressEvent::Finished] is posted at most once.
///
/// The reporter does not know who consumes the events, so it can be moved to any thread.
#[derive(Debug)]
pub struct ProgressReporter {
    sender: Option<ProgressSender>,
    highest: AtomicU64,
    finished: AtomicBool,
}

impl ProgressReporter {
    /// Creates a reporter and the receiving end of its channel.
    pub fn channel() -> (Self, ProgressReceiver) {
        let (sender, receiver) = unbounded_channel();
        (Self::new(sender), receiver)
    }

    pub fn new(sender: ProgressSender) -> Self {
        Self {
            sender: Some(sender),
            highest: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// A reporter that discards every event.
    pub fn silent() -> Self {
        Self {
            sender: None,
            highest: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    pub fn downloading(&self, downloaded_bytes: u64, total_bytes: Option<u64>) {
        if self.finished.load(Ordering::Acquire) {
            return;
        }

        let previous = self.highest.fetch_max(downloaded_bytes, Ordering::AcqRel);

        self.send(ProgressEvent::Downloading {
            downloaded_bytes: previous.max(downloaded_bytes),
            total_bytes,
        });
    }

    pub fn finished(&self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.send(ProgressEvent::Finished);
        }
    }

    /// Forwards an event that was parsed from somewhere else, applying the same guarantees.
    pub fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
            } => self.downloading(downloaded_bytes, total_bytes),
            ProgressEvent::Finished => self.finished(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            // A dropped receiver only means nobody is watching anymore.
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_byte_counts_never_decrease() {
        let (reporter, mut receiver) = ProgressReporter::channel();

        reporter.downloading(100, Some(1000));
        reporter.downloading(50, Some(1000));
        reporter.downloading(700, None);
        reporter.finished();
        reporter.finished();
        reporter.downloading(900, Some(1000));

        let mut events = vec![];
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }

        assert_eq!(
            events,
            vec![
                ProgressEvent::Downloading {
                    downloaded_bytes: 100,
                    total_bytes: Some(1000)
                },
                ProgressEvent::Downloading {
                    downloaded_bytes: 100,
                    total_bytes: Some(1000)
                },
                ProgressEvent::Downloading {
                    downloaded_bytes: 700,
                    total_bytes: None
                },
                ProgressEvent::Finished,
            ]
        );
    }

    #[test]
    fn test_percent() {
        let event = ProgressEvent::Downloading {
            downloaded_bytes: 250,
            total_bytes: Some(1000),
        };

        assert_eq!(event.percent(), Some(25.));
        assert_eq!(ProgressEvent::Finished.percent(), None);
    }
}
