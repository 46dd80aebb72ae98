//! Side map from resource identity to its last declared state.
//!
//! The renderer never consults this map on the hot path; it exists so that
//! validation builds and tests can detect barriers whose declared
//! `current_state` is stale.

use std::collections::HashMap;

use crate::barrier::{BarrierPhase, OwnershipTransfer, RecordedBarrier, Subresource};
use crate::handle::ResourceId;
use crate::types::ResourceState;

/// A split transition that has begun but not ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingSplit {
    subresource: Option<Subresource>,
    from: ResourceState,
    to: ResourceState,
}

#[derive(Debug, Clone, Default)]
struct TrackedResource {
    state: ResourceState,
    /// Per-subresource states that differ from `state`.
    subresources: HashMap<Subresource, ResourceState>,
    pending_splits: Vec<PendingSplit>,
}

impl TrackedResource {
    fn state_of(&self, subresource: Option<Subresource>) -> ResourceState {
        subresource
            .and_then(|sub| self.subresources.get(&sub).copied())
            .unwrap_or(self.state)
    }

    fn set(&mut self, subresource: Option<Subresource>, state: ResourceState) {
        match subresource {
            Some(sub) => {
                self.subresources.insert(sub, state);
            }
            None => {
                self.state = state;
                self.subresources.clear();
            }
        }
    }
}

/// Reasons a barrier does not fit the tracked timeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTrackerError {
    /// The resource was never registered (or already removed).
    #[error("barrier on untracked resource {0}")]
    UnknownResource(ResourceId),
    /// The declared `current_state` differs from the last recorded state.
    #[error(
        "stale current state for resource {resource}: barrier declares {declared:?} but the resource was last transitioned to {tracked:?}"
    )]
    StaleCurrentState {
        resource: ResourceId,
        declared: ResourceState,
        tracked: ResourceState,
    },
    /// An `end_only` barrier without a matching `begin_only`.
    #[error("split barrier end on resource {0} without a matching begin")]
    UnmatchedSplitEnd(ResourceId),
}

/// Tracks the last-known [`ResourceState`] of every live resource.
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    resources: HashMap<ResourceId, TrackedResource>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a resource in its creation state.
    pub fn register(&mut self, id: ResourceId, start_state: ResourceState) {
        self.resources.insert(
            id,
            TrackedResource {
                state: start_state,
                ..Default::default()
            },
        );
    }

    /// Stop tracking a resource.
    pub fn unregister(&mut self, id: ResourceId) {
        self.resources.remove(&id);
    }

    /// Whole-resource state, if tracked.
    pub fn state(&self, id: ResourceId) -> Option<ResourceState> {
        self.resources.get(&id).map(|r| r.state)
    }

    /// State of one subresource, if tracked.
    pub fn subresource_state(&self, id: ResourceId, subresource: Subresource) -> Option<ResourceState> {
        self.resources.get(&id).map(|r| r.state_of(Some(subresource)))
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Apply a barrier to the timeline, checking its declared `current_state`.
    ///
    /// `UNDEFINED` as the declared state always passes: it discards contents.
    /// Acquire barriers also pass when the matching release already moved
    /// the resource to `new_state`.
    pub fn apply(&mut self, barrier: &RecordedBarrier) -> Result<(), StateTrackerError> {
        let id = barrier.target.id();
        let subresource = match barrier.target {
            crate::barrier::BarrierTarget::Texture { subresource, .. } => subresource,
            crate::barrier::BarrierTarget::Buffer { .. } => None,
        };
        let tracked = self
            .resources
            .get_mut(&id)
            .ok_or(StateTrackerError::UnknownResource(id))?;
        let mut current = tracked.state_of(subresource);

        if barrier.phase == BarrierPhase::End {
            let split = PendingSplit {
                subresource,
                from: barrier.current_state,
                to: barrier.new_state,
            };
            let position = tracked
                .pending_splits
                .iter()
                .position(|pending| *pending == split)
                .ok_or(StateTrackerError::UnmatchedSplitEnd(id))?;
            tracked.pending_splits.swap_remove(position);
            tracked.set(subresource, barrier.new_state);
            return Ok(());
        }

        let declared = barrier.current_state;
        // A whole-resource barrier must agree with every subresource that
        // moved away from the resource state.
        if subresource.is_none() && declared != ResourceState::UNDEFINED {
            if let Some(diverged) = tracked.subresources.values().find(|state| **state != declared) {
                current = *diverged;
            }
        }
        let acquired_after_release = matches!(barrier.ownership, OwnershipTransfer::Acquire(_))
            && current == barrier.new_state;
        if declared != ResourceState::UNDEFINED && declared != current && !acquired_after_release {
            return Err(StateTrackerError::StaleCurrentState {
                resource: id,
                declared,
                tracked: current,
            });
        }

        match barrier.phase {
            BarrierPhase::Begin => tracked.pending_splits.push(PendingSplit {
                subresource,
                from: barrier.current_state,
                to: barrier.new_state,
            }),
            _ => tracked.set(subresource, barrier.new_state),
        }
        Ok(())
    }
}
