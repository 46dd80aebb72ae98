//! Queues, submission and presentation.
//!
//! Each queue serializes its submissions behind a mutex and stamps them with
//! a monotonically increasing serial. The backend reports completion by
//! raising the queue's [`SubmissionTracker`]; command buffers derive their
//! `Completed` state from it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::backend::{BackendQueue, BackendSwapChain};
use crate::command::{Cmd, Command};
use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::ResourceId;
use crate::profiling::profile_scope;
use crate::swapchain::SwapChain;
use crate::sync::{Fence, FenceShared, FenceStatus, Semaphore, SemaphoreShared};
use crate::types::{QueueDesc, QueueType, ResourceState};

/// Completion counter of one queue.
#[derive(Debug, Default)]
pub(crate) struct SubmissionTracker {
    completed: AtomicU64,
    lost: AtomicBool,
    lock: Mutex<()>,
    advanced: Condvar,
}

impl SubmissionTracker {
    pub(crate) fn complete(&self, serial: u64) {
        self.completed.fetch_max(serial, Ordering::AcqRel);
        let _guard = self.lock.lock();
        self.advanced.notify_all();
    }

    /// Whether `serial` finished. Everything counts as finished once the
    /// device is lost.
    pub(crate) fn is_complete(&self, serial: u64) -> bool {
        self.lost.load(Ordering::Acquire) || self.completed.load(Ordering::Acquire) >= serial
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
        let _guard = self.lock.lock();
        self.advanced.notify_all();
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Block until `serial` completes. Returns `false` on timeout.
    pub(crate) fn wait_for(&self, serial: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        while !self.is_complete(serial) {
            if self.advanced.wait_until(&mut guard, deadline).timed_out() {
                return self.is_complete(serial);
            }
        }
        true
    }
}

/// One submission as handed to a backend.
pub(crate) struct QueueWork {
    pub(crate) serial: u64,
    pub(crate) commands: Vec<Arc<[Command]>>,
    pub(crate) wait_semaphores: Vec<Arc<SemaphoreShared>>,
    pub(crate) signal_semaphores: Vec<Arc<SemaphoreShared>>,
    pub(crate) signal_fence: Option<Arc<FenceShared>>,
    pub(crate) tracker: Arc<SubmissionTracker>,
}

impl QueueWork {
    /// Raise the queue counter, then signal semaphores and the fence.
    ///
    /// The counter goes first so that a waiter woken by the fence already
    /// sees its command buffers as `Completed`.
    pub(crate) fn complete(&self) {
        self.tracker.complete(self.serial);
        for semaphore in &self.signal_semaphores {
            semaphore.signal();
        }
        if let Some(fence) = &self.signal_fence {
            fence.signal();
        }
    }
}

/// One present as handed to a backend.
pub(crate) struct PresentWork {
    pub(crate) serial: u64,
    pub(crate) image_index: u32,
    pub(crate) wait_semaphores: Vec<Arc<SemaphoreShared>>,
    pub(crate) swap_chain: Arc<dyn BackendSwapChain>,
    pub(crate) tracker: Arc<SubmissionTracker>,
}

impl PresentWork {
    pub(crate) fn complete(&self) {
        self.tracker.complete(self.serial);
    }
}

/// Descriptor for [`crate::Renderer::queue_submit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueSubmitDesc<'a> {
    /// Executed in array order.
    pub cmds: &'a [&'a Cmd],
    pub wait_semaphores: &'a [&'a Semaphore],
    pub signal_semaphores: &'a [&'a Semaphore],
    pub signal_fence: Option<&'a Fence>,
    /// Block until the submission has executed.
    pub submit_done: bool,
}

impl<'a> QueueSubmitDesc<'a> {
    pub fn new(cmds: &'a [&'a Cmd]) -> Self {
        Self {
            cmds,
            ..Default::default()
        }
    }

    pub fn with_signal_fence(mut self, fence: &'a Fence) -> Self {
        self.signal_fence = Some(fence);
        self
    }

    pub fn with_wait_semaphores(mut self, semaphores: &'a [&'a Semaphore]) -> Self {
        self.wait_semaphores = semaphores;
        self
    }

    pub fn with_signal_semaphores(mut self, semaphores: &'a [&'a Semaphore]) -> Self {
        self.signal_semaphores = semaphores;
        self
    }
}

/// Descriptor for [`crate::Renderer::queue_present`].
#[derive(Debug, Clone, Copy)]
pub struct QueuePresentDesc<'a> {
    pub swap_chain: &'a SwapChain,
    pub wait_semaphores: &'a [&'a Semaphore],
    pub index: u32,
}

impl<'a> QueuePresentDesc<'a> {
    pub fn new(swap_chain: &'a SwapChain, index: u32) -> Self {
        Self {
            swap_chain,
            wait_semaphores: &[],
            index,
        }
    }

    pub fn with_wait_semaphores(mut self, semaphores: &'a [&'a Semaphore]) -> Self {
        self.wait_semaphores = semaphores;
        self
    }
}

struct SubmitState {
    next_serial: u64,
    backend: Box<dyn BackendQueue>,
}

/// A submission channel of one [`QueueType`].
pub struct Queue {
    context: Arc<RendererContext>,
    id: ResourceId,
    desc: QueueDesc,
    tracker: Arc<SubmissionTracker>,
    submit: Mutex<SubmitState>,
}

impl Queue {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &QueueDesc) -> GraphicsResult<Self> {
        context.check_node(desc.node_index, "add_queue");
        context.ensure_not_lost()?;
        let backend = context.backend.create_queue(desc)?;
        let id = context.ids.next_id();
        log::debug!("Queue: created {id} ({:?}, {:?}, node {})", desc.queue_type, desc.priority, desc.node_index);
        Ok(Self {
            context: Arc::clone(context),
            id,
            desc: *desc,
            tracker: Arc::new(SubmissionTracker::default()),
            submit: Mutex::new(SubmitState {
                next_serial: 1,
                backend,
            }),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn queue_type(&self) -> QueueType {
        self.desc.queue_type
    }

    pub fn node_index(&self) -> u32 {
        self.desc.node_index
    }

    pub fn desc(&self) -> &QueueDesc {
        &self.desc
    }

    pub(crate) fn tracker(&self) -> &Arc<SubmissionTracker> {
        &self.tracker
    }

    /// Claim one pending signal per wait semaphore.
    #[track_caller]
    fn reserve_waits(&self, verb: &str, semaphores: &[&Semaphore]) -> Vec<Arc<SemaphoreShared>> {
        semaphores
            .iter()
            .map(|semaphore| {
                let reserved = semaphore.shared().reserve_wait();
                self.context.validator.check(reserved, || {
                    format!("{verb}: wait on semaphore {} which nothing will signal", semaphore.id())
                });
                Arc::clone(semaphore.shared())
            })
            .collect()
    }

    #[track_caller]
    pub(crate) fn submit(&self, desc: &QueueSubmitDesc<'_>) -> GraphicsResult<()> {
        profile_scope!("queue_submit");
        self.context.check_alive("queue_submit");
        self.context.ensure_not_lost()?;

        let mut state = self.submit.lock();
        let commands: Vec<Arc<[Command]>> = desc
            .cmds
            .iter()
            .map(|cmd| cmd.commands_for_submit(self.desc.queue_type))
            .collect();

        if let Some(fence) = desc.signal_fence {
            let status = fence.status();
            self.context.validator.check(status != FenceStatus::Incomplete, || {
                format!("queue_submit: fence {} is still Incomplete from an earlier submission", fence.id())
            });
        }
        let wait_semaphores = self.reserve_waits("queue_submit", desc.wait_semaphores);
        let signal_semaphores: Vec<_> = desc
            .signal_semaphores
            .iter()
            .map(|semaphore| {
                semaphore.shared().reserve_signal();
                Arc::clone(semaphore.shared())
            })
            .collect();
        let signal_fence = desc.signal_fence.map(|fence| {
            fence.shared().mark_submitted();
            Arc::clone(fence.shared())
        });

        let serial = state.next_serial;
        state.next_serial += 1;
        for cmd in desc.cmds {
            cmd.mark_pending(&self.tracker, serial);
        }
        log::debug!(
            "Queue {}: submit #{serial} ({} cmds, {} waits, {} signals, fence: {})",
            self.id,
            desc.cmds.len(),
            wait_semaphores.len(),
            signal_semaphores.len(),
            signal_fence.is_some()
        );

        let work = QueueWork {
            serial,
            commands,
            wait_semaphores,
            signal_semaphores,
            signal_fence: signal_fence.clone(),
            tracker: Arc::clone(&self.tracker),
        };
        if let Err(err) = state.backend.submit(work) {
            self.fail(&format!("submit #{serial} failed: {err}"), signal_fence.as_deref());
            return Err(err);
        }
        drop(state);

        if desc.submit_done && !self.tracker.wait_for(serial, self.context.wait_timeout) {
            return Err(GraphicsError::Timeout);
        }
        Ok(())
    }

    /// Backend failure: report it, wake every waiter and poison the queue.
    fn fail(&self, message: &str, fence: Option<&FenceShared>) {
        self.context.logger.error("queue", message);
        self.tracker.mark_lost();
        if let Some(fence) = fence {
            fence.signal();
        }
    }

    #[track_caller]
    pub(crate) fn present(&self, desc: &QueuePresentDesc<'_>) -> GraphicsResult<()> {
        profile_scope!("queue_present");
        self.context.check_alive("queue_present");
        self.context.ensure_not_lost()?;

        let swap_chain = desc.swap_chain;
        let validator = &self.context.validator;
        if validator.enabled() {
            validator.check(desc.index < swap_chain.image_count(), || {
                format!(
                    "queue_present: image index {} out of range ({} images)",
                    desc.index,
                    swap_chain.image_count()
                )
            });
            validator.check(swap_chain.is_present_queue(self.id), || {
                format!("queue_present: queue {} is not a present queue of swap chain {}", self.id, swap_chain.id())
            });
            if let Some(image) = swap_chain.image(desc.index) {
                let state = validator.tracked_state(image.id());
                validator.check(state == Some(ResourceState::PRESENT), || {
                    format!("queue_present: image {} is in {state:?}, expected PRESENT", desc.index)
                });
            }
        }

        let mut state = self.submit.lock();
        let wait_semaphores = self.reserve_waits("queue_present", desc.wait_semaphores);
        let serial = state.next_serial;
        state.next_serial += 1;
        let work = PresentWork {
            serial,
            image_index: desc.index,
            wait_semaphores,
            swap_chain: Arc::clone(swap_chain.backend()),
            tracker: Arc::clone(&self.tracker),
        };
        if let Err(err) = state.backend.present(work) {
            self.fail(&format!("present #{serial} failed: {err}"), None);
            return Err(err);
        }
        crate::profiling::frame_mark();
        Ok(())
    }

    /// Block until every submission made so far has executed.
    pub(crate) fn wait_idle(&self) -> GraphicsResult<()> {
        profile_scope!("wait_queue_idle");
        let last = self.submit.lock().next_serial - 1;
        if !self.tracker.wait_for(last, self.context.wait_timeout) {
            return Err(GraphicsError::Timeout);
        }
        if self.tracker.is_lost() || self.context.backend.is_lost() {
            return Err(GraphicsError::DeviceLost);
        }
        Ok(())
    }

    pub(crate) fn timestamp_frequency(&self) -> f64 {
        self.context.backend.timestamp_frequency()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        let last = self.submit.get_mut().next_serial - 1;
        if !self.tracker.is_complete(last) {
            log::warn!("Queue {} dropped with submissions in flight", self.id);
        }
        log::debug!("Queue: destroyed {}", self.id);
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .field("completed", &self.tracker.completed())
            .finish()
    }
}

static_assertions::assert_impl_all!(Queue: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CmdPool, CmdPoolDesc, CmdState};
    use crate::context::test_support::null_context;

    #[test]
    fn test_tracker_completion() {
        let tracker = SubmissionTracker::default();
        assert!(tracker.is_complete(0));
        assert!(!tracker.is_complete(1));
        tracker.complete(2);
        tracker.complete(1);
        assert_eq!(tracker.completed(), 2);
        assert!(tracker.wait_for(2, Duration::ZERO));
        assert!(!tracker.wait_for(3, Duration::from_millis(5)));
        tracker.mark_lost();
        assert!(tracker.is_complete(100));
    }

    #[test]
    fn test_fence_waiter_sees_serial_completed() {
        for serial in 1..=500 {
            let tracker = Arc::new(SubmissionTracker::default());
            let fence = Arc::new(FenceShared::new());
            fence.mark_submitted();
            let work = QueueWork {
                serial,
                commands: Vec::new(),
                wait_semaphores: Vec::new(),
                signal_semaphores: Vec::new(),
                signal_fence: Some(Arc::clone(&fence)),
                tracker: Arc::clone(&tracker),
            };

            let waiter = {
                let tracker = Arc::clone(&tracker);
                let fence = Arc::clone(&fence);
                std::thread::spawn(move || {
                    assert!(fence.wait_until(Instant::now() + Duration::from_secs(5)));
                    tracker.is_complete(serial)
                })
            };
            work.complete();
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_null_submit_completes_immediately() {
        let context = null_context();
        let queue = Queue::create(&context, &QueueDesc::new(QueueType::Graphics)).unwrap();
        let pool = CmdPool::create(&context, &CmdPoolDesc::new(&queue));
        let mut cmd = pool.allocate(false);
        cmd.begin();
        cmd.end();

        let fence = Fence::create(&context);
        queue
            .submit(&QueueSubmitDesc::new(&[&cmd]).with_signal_fence(&fence))
            .unwrap();
        assert_eq!(fence.status(), FenceStatus::Complete);
        assert_eq!(cmd.state(), CmdState::Completed);
        queue.wait_idle().unwrap();

        cmd.begin();
        assert_eq!(cmd.state(), CmdState::Recording);
    }

    #[test]
    #[should_panic(expected = "which nothing will signal")]
    fn test_wait_without_signal_is_violation() {
        let context = null_context();
        let queue = Queue::create(&context, &QueueDesc::new(QueueType::Compute)).unwrap();
        let semaphore = Semaphore::create(&context);
        let _ = queue.submit(&QueueSubmitDesc::new(&[]).with_wait_semaphores(&[&semaphore]));
    }

    #[test]
    #[should_panic(expected = "was allocated for a Compute queue")]
    fn test_submit_to_other_queue_type_is_violation() {
        let context = null_context();
        let graphics = Queue::create(&context, &QueueDesc::new(QueueType::Graphics)).unwrap();
        let compute = Queue::create(&context, &QueueDesc::new(QueueType::Compute)).unwrap();
        let pool = CmdPool::create(&context, &CmdPoolDesc::new(&compute));
        let mut cmd = pool.allocate(false);
        cmd.begin();
        cmd.end();
        let _ = graphics.submit(&QueueSubmitDesc::new(&[&cmd]));
    }
}
