//! Debug-time contract validation.
//!
//! Programmer-contract violations (stale barrier states, recording outside
//! the recording state, re-submitting a pending command buffer, unresolved
//! descriptor names, ...) are fatal when validation is enabled: the message
//! is logged through the renderer's [`Logger`] and the calling thread panics.
//! With validation disabled none of these checks run and the behavior of a
//! violating call is unspecified.

mod ownership;
mod state_tracker;

pub use ownership::{OwnershipError, OwnershipTracker, PendingTransfer};
pub use state_tracker::{ResourceStateTracker, StateTrackerError};

use parking_lot::Mutex;

use crate::barrier::{BarrierPhase, OwnershipTransfer, RecordedBarrier};
use crate::handle::ResourceId;
use crate::logging::Logger;
use crate::types::{QueueType, ResourceState};

/// Per-renderer validation state.
#[derive(Debug)]
pub(crate) struct Validator {
    enabled: bool,
    logger: Logger,
    states: Mutex<ResourceStateTracker>,
    ownership: Mutex<OwnershipTracker>,
}

impl Validator {
    pub(crate) fn new(enabled: bool, logger: Logger) -> Self {
        Self {
            enabled,
            logger,
            states: Mutex::new(ResourceStateTracker::new()),
            ownership: Mutex::new(OwnershipTracker::new()),
        }
    }

    #[inline]
    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    /// Report a contract violation and panic.
    #[cold]
    #[track_caller]
    pub(crate) fn violation(&self, message: &str) -> ! {
        self.logger.error("validation", message);
        panic!("contract violation: {message}");
    }

    /// Panic with the message produced by `message` unless `condition` holds.
    /// Does nothing when validation is disabled.
    #[inline]
    #[track_caller]
    pub(crate) fn check(&self, condition: bool, message: impl FnOnce() -> String) {
        if self.enabled && !condition {
            self.violation(&message());
        }
    }

    pub(crate) fn register_resource(&self, id: ResourceId, start_state: ResourceState) {
        if self.enabled {
            self.states.lock().register(id, start_state);
        }
    }

    pub(crate) fn unregister_resource(&self, id: ResourceId) {
        if self.enabled {
            self.states.lock().unregister(id);
            self.ownership.lock().forget(id);
        }
    }

    pub(crate) fn tracked_state(&self, id: ResourceId) -> Option<ResourceState> {
        self.states.lock().state(id)
    }

    pub(crate) fn pending_transfers(&self) -> Vec<PendingTransfer> {
        self.ownership.lock().pending().to_vec()
    }

    /// Validate a barrier recorded on a command buffer of `recording_queue`
    /// and advance the tracked timeline.
    #[track_caller]
    pub(crate) fn apply_barrier(&self, recording_queue: QueueType, barrier: &RecordedBarrier) {
        if !self.enabled {
            return;
        }
        let id = barrier.target.id();
        if barrier.phase != BarrierPhase::End {
            let result = match barrier.ownership {
                OwnershipTransfer::None => Ok(()),
                OwnershipTransfer::Release(destination) => self.ownership.lock().release(
                    id,
                    recording_queue,
                    destination,
                    barrier.current_state,
                    barrier.new_state,
                ),
                OwnershipTransfer::Acquire(source) => self.ownership.lock().acquire(
                    id,
                    recording_queue,
                    source,
                    barrier.current_state,
                    barrier.new_state,
                ),
            };
            if let Err(err) = result {
                self.violation(&err.to_string());
            }
        }
        let result = self.states.lock().apply(barrier);
        if let Err(err) = result {
            self.violation(&err.to_string());
        }
    }

    /// Warn about releases that were never acquired.
    pub(crate) fn report_unmatched_transfers(&self) {
        if !self.enabled {
            return;
        }
        for transfer in self.ownership.lock().pending() {
            self.logger.warn(
                "validation",
                &format!(
                    "resource {} released from {:?} to {:?} was never acquired",
                    transfer.resource, transfer.source, transfer.destination
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::BarrierTarget;
    use crate::handle::NativeHandle;

    fn buffer_barrier(
        from: ResourceState,
        to: ResourceState,
        ownership: OwnershipTransfer,
    ) -> RecordedBarrier {
        RecordedBarrier {
            target: BarrierTarget::Buffer {
                id: ResourceId(1),
                handle: NativeHandle(1),
            },
            current_state: from,
            new_state: to,
            phase: BarrierPhase::Full,
            ownership,
        }
    }

    #[test]
    fn test_disabled_validator_checks_nothing() {
        let validator = Validator::new(false, Logger::default());
        validator.check(false, || "never evaluated".to_string());
        validator.apply_barrier(
            QueueType::Graphics,
            &buffer_barrier(
                ResourceState::COPY_DEST,
                ResourceState::SHADER_RESOURCE,
                OwnershipTransfer::None,
            ),
        );
        assert_eq!(validator.tracked_state(ResourceId(1)), None);
    }

    #[test]
    #[should_panic(expected = "contract violation: boom")]
    fn test_enabled_validator_panics() {
        let validator = Validator::new(true, Logger::default());
        validator.check(false, || "boom".to_string());
    }

    #[test]
    fn test_transfer_pair_across_queues() {
        let validator = Validator::new(true, Logger::default());
        validator.register_resource(ResourceId(1), ResourceState::UNORDERED_ACCESS);
        let from = ResourceState::UNORDERED_ACCESS;
        let to = ResourceState::SHADER_RESOURCE;

        validator.apply_barrier(
            QueueType::Compute,
            &buffer_barrier(from, to, OwnershipTransfer::Release(QueueType::Graphics)),
        );
        assert_eq!(validator.pending_transfers().len(), 1);

        validator.apply_barrier(
            QueueType::Graphics,
            &buffer_barrier(from, to, OwnershipTransfer::Acquire(QueueType::Compute)),
        );
        assert!(validator.pending_transfers().is_empty());
        assert_eq!(validator.tracked_state(ResourceId(1)), Some(to));
    }

    #[test]
    #[should_panic(expected = "has no matching release")]
    fn test_unpaired_acquire_panics() {
        let validator = Validator::new(true, Logger::default());
        validator.register_resource(ResourceId(1), ResourceState::UNORDERED_ACCESS);
        validator.apply_barrier(
            QueueType::Graphics,
            &buffer_barrier(
                ResourceState::UNORDERED_ACCESS,
                ResourceState::SHADER_RESOURCE,
                OwnershipTransfer::Acquire(QueueType::Compute),
            ),
        );
    }
}
