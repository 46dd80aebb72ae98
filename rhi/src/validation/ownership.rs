//! Queue ownership transfer pairing.
//!
//! A release barrier recorded on queue type A naming B must be matched by an
//! acquire barrier recorded on B naming A, with the same state pair. Releases
//! must be recorded before their acquires.

use crate::handle::ResourceId;
use crate::types::{QueueType, ResourceState};

/// A release that has not been acquired yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransfer {
    pub resource: ResourceId,
    pub source: QueueType,
    pub destination: QueueType,
    pub current_state: ResourceState,
    pub new_state: ResourceState,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnershipError {
    /// Release to the queue type that is recording it.
    #[error("resource {resource} released to {queue:?} from a {queue:?} command buffer")]
    SelfTransfer {
        resource: ResourceId,
        queue: QueueType,
    },
    /// Acquire with no pending release that matches it.
    #[error("acquire of resource {resource} on {destination:?} from {released_from:?} has no matching release")]
    UnmatchedAcquire {
        resource: ResourceId,
        released_from: QueueType,
        destination: QueueType,
    },
}

/// Pending release/acquire pairs.
#[derive(Debug, Default)]
pub struct OwnershipTracker {
    pending: Vec<PendingTransfer>,
}

impl OwnershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a release barrier recorded on `recording_queue`.
    pub fn release(
        &mut self,
        resource: ResourceId,
        recording_queue: QueueType,
        destination: QueueType,
        current_state: ResourceState,
        new_state: ResourceState,
    ) -> Result<(), OwnershipError> {
        if recording_queue == destination {
            return Err(OwnershipError::SelfTransfer {
                resource,
                queue: destination,
            });
        }
        self.pending.push(PendingTransfer {
            resource,
            source: recording_queue,
            destination,
            current_state,
            new_state,
        });
        Ok(())
    }

    /// Match an acquire barrier recorded on `recording_queue` against a pending release.
    pub fn acquire(
        &mut self,
        resource: ResourceId,
        recording_queue: QueueType,
        source: QueueType,
        current_state: ResourceState,
        new_state: ResourceState,
    ) -> Result<(), OwnershipError> {
        let position = self
            .pending
            .iter()
            .position(|t| {
                t.resource == resource
                    && t.source == source
                    && t.destination == recording_queue
                    && t.current_state == current_state
                    && t.new_state == new_state
            })
            .ok_or(OwnershipError::UnmatchedAcquire {
                resource,
                released_from: source,
                destination: recording_queue,
            })?;
        self.pending.remove(position);
        Ok(())
    }

    /// Drop any pending transfer of a removed resource.
    pub fn forget(&mut self, resource: ResourceId) {
        self.pending.retain(|t| t.resource != resource);
    }

    pub fn pending(&self) -> &[PendingTransfer] {
        &self.pending
    }
}
