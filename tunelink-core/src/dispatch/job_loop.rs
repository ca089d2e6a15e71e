use std::{fmt::Display, future::Future, sync::Arc};

use log::{error, info};
use tokio::{
    sync::mpsc::channel,
    task::{JoinHandle, JoinSet},
};

use super::{BindingId, DispatchBridge};

/// The consuming side of a [DispatchBridge].
///
/// Jobs are received from a bounded channel and each one is spawned onto the runtime
/// the loop was started in, so a long job does not hold up the queue.
pub struct JobLoop<J> {
    bridge: Arc<DispatchBridge<J>>,
    binding: BindingId,
    consumer: JoinHandle<()>,
}

impl<J> JobLoop<J>
where
    J: Send + 'static,
{
    /// Starts consuming jobs and binds the bridge to this loop.
    ///
    /// # Panics
    /// Must be called from within the tokio runtime that should own the jobs.
    pub fn start<H, F, E>(bridge: &Arc<DispatchBridge<J>>, capacity: usize, handler: H) -> Self
    where
        H: Fn(J) -> F + Send + Sync + 'static,
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (sender, mut receiver) = channel::<J>(capacity.max(1));

        let consumer = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();

            loop {
                tokio::select! {
                    job = receiver.recv() => match job {
                        Some(job) => {
                            let work = handler(job);
                            in_flight.spawn(complete(work));
                        }
                        // Every sender is gone and the queue is drained
                        None => break,
                    },
                    Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = result {
                            error!("Scheduled job panicked: {}", e);
                        }
                    }
                }
            }

            while let Some(result) = in_flight.join_next().await {
                if let Err(e) = result {
                    error!("Scheduled job panicked: {}", e);
                }
            }

            info!("Job loop stopped");
        });

        let binding = bridge.bind(sender);

        Self {
            bridge: bridge.clone(),
            binding,
            consumer,
        }
    }

    /// Stops accepting jobs and waits until every accepted job has run.
    pub async fn shutdown(self) {
        self.bridge.release(self.binding);

        if let Err(e) = self.consumer.await {
            error!("Job loop terminated abnormally: {}", e);
        }
    }
}

/// Completion callback of a scheduled job. Failures are only logged, since the
/// party that dispatched the job has usually moved on by the time it finishes.
async fn complete<F, E>(work: F)
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    if let Err(e) = work.await {
        error!("Scheduled job failed: {}", e);
    }
}
