use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::{info, warn};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc::{error::TrySendError, Sender};

/// Why a scheduler refused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The scheduler stopped consuming.
    Closed,
    /// The scheduler's queue is at capacity.
    Full,
}

/// Represents the submission endpoint of a scheduler that owns bot-side state.
pub trait SchedulerHandle<J>: Send + Sync {
    /// Returns true if the scheduler is still consuming work.
    fn is_running(&self) -> bool;

    /// Enqueues a job without waiting for it to run.
    /// An `Ok` means the job is queued and will be executed.
    fn submit(&self, job: J) -> Result<(), SubmitError>;
}

impl<J> SchedulerHandle<J> for Sender<J>
where
    J: Send,
{
    fn is_running(&self) -> bool {
        !self.is_closed()
    }

    fn submit(&self, job: J) -> Result<(), SubmitError> {
        self.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Full,
            TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No scheduler is bound")]
    NotBound,
    #[error("The bound scheduler is not running")]
    NotRunning,
    #[error("The scheduler queue is saturated")]
    Saturated,
}

/// A token identifying one call to [DispatchBridge::bind].
pub type BindingId = u64;

struct Binding<J> {
    id: BindingId,
    handle: Arc<dyn SchedulerHandle<J>>,
}

/// The crossing point between threads that do not own bot-side state and the scheduler that does.
///
/// The bridge starts unbound. The scheduler binds its submission endpoint from inside its own
/// execution context once it is running, and any thread may then dispatch work to it.
pub struct DispatchBridge<J> {
    binding: RwLock<Option<Binding<J>>>,
    next_id: AtomicU64,
}

impl<J> DispatchBridge<J>
where
    J: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            binding: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores a scheduler handle, replacing any previous one.
    pub fn bind<H>(&self, handle: H) -> BindingId
    where
        H: SchedulerHandle<J> + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.binding.write().replace(Binding {
            id,
            handle: Arc::new(handle),
        });

        if previous.is_some() {
            info!("Dispatch bridge rebound to scheduler #{}", id);
        } else {
            info!("Dispatch bridge bound to scheduler #{}", id);
        }

        id
    }

    /// Drops the current handle, returning the bridge to the unbound state.
    pub fn unbind(&self) {
        if self.binding.write().take().is_some() {
            info!("Dispatch bridge unbound");
        }
    }

    /// Unbinds only if the current binding is the given one, so a stale owner
    /// cannot remove a handle that replaced it.
    pub fn release(&self, id: BindingId) -> bool {
        let mut binding = self.binding.write();

        if binding.as_ref().map(|b| b.id) == Some(id) {
            binding.take();
            info!("Dispatch bridge released by scheduler #{}", id);
            return true;
        }

        false
    }

    pub fn is_bound(&self) -> bool {
        self.binding.read().is_some()
    }

    /// Returns true if a scheduler is bound and still consuming work.
    pub fn is_ready(&self) -> bool {
        self.binding
            .read()
            .as_ref()
            .map(|b| b.handle.is_running())
            .unwrap_or_default()
    }

    /// Schedules a job onto the bound scheduler without waiting for it to run.
    pub fn try_dispatch(&self, job: J) -> Result<(), DispatchError> {
        // The read guard is held across the submission so a concurrent rebind
        // either happens entirely before or entirely after it.
        let binding = self.binding.read();
        let binding = binding.as_ref().ok_or(DispatchError::NotBound)?;

        if !binding.handle.is_running() {
            return Err(DispatchError::NotRunning);
        }

        binding.handle.submit(job).map_err(|e| match e {
            SubmitError::Closed => DispatchError::NotRunning,
            SubmitError::Full => DispatchError::Saturated,
        })
    }

    /// Same as [DispatchBridge::try_dispatch], but only reports whether the job was accepted.
    pub fn dispatch(&self, job: J) -> bool {
        match self.try_dispatch(job) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dispatch rejected: {}", e);
                false
            }
        }
    }
}

impl<J> Default for DispatchBridge<J>
where
    J: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use parking_lot::Mutex;
    use std::{sync::atomic::AtomicBool, thread};
    use tokio::sync::mpsc::channel;

    /// A scheduler handle that records what it receives.
    #[derive(Clone, Default)]
    struct FakeScheduler {
        running: Arc<AtomicBool>,
        received: Arc<Mutex<Vec<u32>>>,
    }

    impl SchedulerHandle<u32> for FakeScheduler {
        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn submit(&self, job: u32) -> Result<(), SubmitError> {
            self.received.lock().push(job);
            Ok(())
        }
    }

    #[test]
    fn test_rejects_before_bind() {
        let bridge = DispatchBridge::<u32>::new();

        assert!(!bridge.is_bound());
        assert_eq!(bridge.try_dispatch(1), Err(DispatchError::NotBound));
        assert!(!bridge.dispatch(1));
    }

    #[test]
    fn test_rejects_when_not_running() {
        let bridge = DispatchBridge::<u32>::new();
        let scheduler = FakeScheduler::default();

        bridge.bind(scheduler.clone());

        assert_eq!(bridge.try_dispatch(1), Err(DispatchError::NotRunning));
        assert!(scheduler.received.lock().is_empty());

        scheduler.running.store(true, Ordering::SeqCst);
        assert!(bridge.dispatch(2));
        assert_eq!(*scheduler.received.lock(), vec![2]);

        scheduler.running.store(false, Ordering::SeqCst);
        assert!(!bridge.dispatch(3));
        assert_eq!(*scheduler.received.lock(), vec![2]);
    }

    #[test]
    fn test_dispatch_from_other_threads() {
        let bridge = Arc::new(DispatchBridge::<u32>::new());
        let scheduler = FakeScheduler::default();
        scheduler.running.store(true, Ordering::SeqCst);
        bridge.bind(scheduler.clone());

        let workers: Vec<_> = (0..8)
            .map(|n| {
                let bridge = bridge.clone();
                thread::spawn(move || bridge.dispatch(n))
            })
            .collect();

        for worker in workers {
            assert!(worker.join().unwrap());
        }

        let mut received = scheduler.received.lock().clone();
        received.sort();
        assert_eq!(received, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_rebind_replaces_handle() {
        let bridge = DispatchBridge::<u32>::new();
        let first = FakeScheduler::default();
        let second = FakeScheduler::default();
        first.running.store(true, Ordering::SeqCst);
        second.running.store(true, Ordering::SeqCst);

        let first_id = bridge.bind(first.clone());
        bridge.dispatch(1);
        let second_id = bridge.bind(second.clone());
        bridge.dispatch(2);

        assert_eq!(*first.received.lock(), vec![1]);
        assert_eq!(*second.received.lock(), vec![2]);

        // The replaced owner cannot unbind its successor
        assert!(!bridge.release(first_id));
        assert!(bridge.is_bound());
        assert!(bridge.release(second_id));
        assert!(!bridge.is_bound());
    }

    #[test]
    fn test_unbind_returns_to_rejecting() {
        let bridge = DispatchBridge::<u32>::new();
        let scheduler = FakeScheduler::default();
        scheduler.running.store(true, Ordering::SeqCst);

        bridge.bind(scheduler.clone());
        assert!(bridge.dispatch(1));

        bridge.unbind();

        assert!(!bridge.is_bound());
        assert_eq!(bridge.try_dispatch(2), Err(DispatchError::NotBound));
        assert_eq!(*scheduler.received.lock(), vec![1]);

        // Unbinding twice is harmless
        bridge.unbind();
        assert!(!bridge.is_ready());
    }

    #[test]
    fn test_channel_handle() {
        let bridge = DispatchBridge::<u32>::new();
        let (sender, receiver) = channel(1);
        bridge.bind(sender);

        assert!(bridge.is_ready());
        assert_eq!(bridge.try_dispatch(1), Ok(()));
        assert_eq!(bridge.try_dispatch(2), Err(DispatchError::Saturated));

        drop(receiver);

        assert!(!bridge.is_ready());
        assert_eq!(bridge.try_dispatch(3), Err(DispatchError::NotRunning));
    }
}
