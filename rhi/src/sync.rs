//! GPU synchronization primitives.
//!
//! A [`Fence`] is the CPU-visible completion token of one submission. A
//! [`Semaphore`] orders GPU work between submissions, possibly on different
//! queues, and has no CPU-visible value.
//!
//! Both are thin handles over shared state that backends signal from
//! whatever thread completes the work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::context::RendererContext;
use crate::handle::ResourceId;

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FenceStatus {
    /// Never passed to a submission.
    #[default]
    NotSubmitted,
    /// Submitted work has not finished.
    Incomplete,
    /// The last submission signaling this fence has finished.
    Complete,
}

#[derive(Debug)]
pub(crate) struct FenceShared {
    status: Mutex<FenceStatus>,
    completed: Condvar,
}

impl FenceShared {
    pub(crate) fn new() -> Self {
        Self {
            status: Mutex::new(FenceStatus::NotSubmitted),
            completed: Condvar::new(),
        }
    }

    /// Move to `Incomplete`, returning the previous status.
    pub(crate) fn mark_submitted(&self) -> FenceStatus {
        std::mem::replace(&mut *self.status.lock(), FenceStatus::Incomplete)
    }

    pub(crate) fn signal(&self) {
        *self.status.lock() = FenceStatus::Complete;
        self.completed.notify_all();
    }

    pub(crate) fn status(&self) -> FenceStatus {
        *self.status.lock()
    }

    /// Block until the fence is no longer `Incomplete` or `deadline` passes.
    /// Returns whether the fence stopped being `Incomplete`.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let mut status = self.status.lock();
        while *status == FenceStatus::Incomplete {
            if self.completed.wait_until(&mut status, deadline).timed_out() {
                return *status != FenceStatus::Incomplete;
            }
        }
        true
    }
}

/// CPU-GPU completion token.
///
/// # Example
///
/// ```ignore
/// let fence = renderer.add_fence()?;
/// renderer.queue_submit(&queue, &QueueSubmitDesc::new(&[&cmd]).with_signal_fence(&fence))?;
/// renderer.wait_for_fences(&[&fence])?;
/// assert_eq!(renderer.get_fence_status(&fence), FenceStatus::Complete);
/// ```
pub struct Fence {
    #[allow(dead_code)]
    context: Arc<RendererContext>,
    id: ResourceId,
    shared: Arc<FenceShared>,
}

impl Fence {
    pub(crate) fn create(context: &Arc<RendererContext>) -> Self {
        let id = context.ids.next_id();
        log::trace!("Fence: created {id}");
        Self {
            context: Arc::clone(context),
            id,
            shared: Arc::new(FenceShared::new()),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Non-blocking status query.
    pub fn status(&self) -> FenceStatus {
        self.shared.status()
    }

    pub(crate) fn shared(&self) -> &Arc<FenceShared> {
        &self.shared
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

#[derive(Debug, Default)]
struct SemaphoreCounters {
    /// Signals that executed and were not consumed yet.
    available: u64,
    /// Signals submitted (or requested by an image acquire) and not yet claimed by a wait.
    outstanding: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SemaphoreShared {
    counters: Mutex<SemaphoreCounters>,
    signaled: Condvar,
}

impl SemaphoreShared {
    /// A submission will signal this semaphore.
    pub(crate) fn reserve_signal(&self) {
        self.counters.lock().outstanding += 1;
    }

    /// Claim one outstanding signal for a waiting submission.
    /// Returns `false` when nothing will ever signal the wait.
    pub(crate) fn reserve_wait(&self) -> bool {
        let mut counters = self.counters.lock();
        if counters.outstanding == 0 {
            return false;
        }
        counters.outstanding -= 1;
        true
    }

    pub(crate) fn signal(&self) {
        self.counters.lock().available += 1;
        self.signaled.notify_all();
    }

    pub(crate) fn try_consume(&self) -> bool {
        let mut counters = self.counters.lock();
        if counters.available == 0 {
            return false;
        }
        counters.available -= 1;
        true
    }

    /// Block until a signal is available and consume it.
    pub(crate) fn wait_and_consume(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut counters = self.counters.lock();
        while counters.available == 0 {
            if self.signaled.wait_until(&mut counters, deadline).timed_out() {
                break;
            }
        }
        if counters.available == 0 {
            return false;
        }
        counters.available -= 1;
        true
    }

    pub(crate) fn outstanding(&self) -> u64 {
        self.counters.lock().outstanding
    }
}

/// GPU-GPU ordering primitive.
pub struct Semaphore {
    #[allow(dead_code)]
    context: Arc<RendererContext>,
    id: ResourceId,
    shared: Arc<SemaphoreShared>,
}

impl Semaphore {
    pub(crate) fn create(context: &Arc<RendererContext>) -> Self {
        let id = context.ids.next_id();
        log::trace!("Semaphore: created {id}");
        Self {
            context: Arc::clone(context),
            id,
            shared: Arc::new(SemaphoreShared::default()),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn shared(&self) -> &Arc<SemaphoreShared> {
        &self.shared
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("id", &self.id)
            .field("outstanding", &self.shared.outstanding())
            .finish()
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);
static_assertions::assert_impl_all!(Semaphore: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::null_context;

    #[test]
    fn test_fence_status_transitions() {
        let fence = Fence::create(&null_context());
        assert_eq!(fence.status(), FenceStatus::NotSubmitted);

        assert_eq!(fence.shared().mark_submitted(), FenceStatus::NotSubmitted);
        assert_eq!(fence.status(), FenceStatus::Incomplete);

        fence.shared().signal();
        assert_eq!(fence.status(), FenceStatus::Complete);
        assert_eq!(fence.shared().mark_submitted(), FenceStatus::Complete);
    }

    #[test]
    fn test_fence_wait_returns_for_unsubmitted() {
        let shared = FenceShared::new();
        assert!(shared.wait_until(Instant::now()));
    }

    #[test]
    fn test_fence_signal_from_other_thread() {
        let shared = Arc::new(FenceShared::new());
        shared.mark_submitted();
        let signaler = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            signaler.signal();
        });
        assert!(shared.wait_until(Instant::now() + Duration::from_secs(5)));
        assert_eq!(shared.status(), FenceStatus::Complete);
        handle.join().unwrap();
    }

    #[test]
    fn test_fence_wait_timeout() {
        let shared = FenceShared::new();
        shared.mark_submitted();
        assert!(!shared.wait_until(Instant::now() + Duration::from_millis(10)));
        assert_eq!(shared.status(), FenceStatus::Incomplete);
    }

    #[test]
    fn test_semaphore_counters() {
        let shared = SemaphoreShared::default();
        assert!(!shared.reserve_wait());

        shared.reserve_signal();
        assert!(shared.reserve_wait());
        assert!(!shared.try_consume());

        shared.signal();
        assert!(shared.try_consume());
        assert!(!shared.wait_and_consume(Duration::from_millis(5)));
    }

    #[test]
    fn test_semaphore_wait_blocks_until_signal() {
        let shared = Arc::new(SemaphoreShared::default());
        let signaler = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            signaler.signal();
        });
        assert!(shared.wait_and_consume(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
