//! Barrier translation and batching.
//!
//! Each `ResourceBarrier` command becomes one [`BarrierBatch`]: image
//! barriers carry a layout transition, buffer barriers only access masks.
//! Stage masks are the union over the batch, as a single pipeline barrier
//! would take them.

use std::collections::HashMap;

use super::layout::{buffer_access_mask, buffer_stages, AccessFlags, ImageLayout, PipelineStages};
use super::memory::{ResourceStore, SplitKey};
use crate::barrier::{BarrierPhase, BarrierTarget, OwnershipTransfer, RecordedBarrier};
use crate::handle::NativeHandle;
use crate::logging::Logger;
use crate::types::QueueType;

/// A batch of barriers executed together.
#[derive(Debug, Default)]
pub(super) struct BarrierBatch {
    /// Image barriers keyed by subresource (to avoid duplicates).
    image_barriers: HashMap<SplitKey, ImageBarrierInfo>,
    buffer_barriers: HashMap<NativeHandle, BufferBarrierInfo>,
    src_stage_mask: PipelineStages,
    dst_stage_mask: PipelineStages,
}

#[derive(Debug, Clone, Copy)]
struct ImageBarrierInfo {
    old_layout: ImageLayout,
    new_layout: ImageLayout,
    src_access_mask: AccessFlags,
    dst_access_mask: AccessFlags,
    acquire: bool,
}

#[derive(Debug, Clone, Copy)]
struct BufferBarrierInfo {
    src_access_mask: AccessFlags,
    dst_access_mask: AccessFlags,
}

impl BarrierBatch {
    /// Add an image layout transition.
    ///
    /// A second barrier on the same subresource extends the first one:
    /// the batch goes from the first old layout to the last new layout.
    fn add_image_barrier(&mut self, key: SplitKey, old_layout: ImageLayout, new_layout: ImageLayout, acquire: bool) {
        let info = self.image_barriers.entry(key).or_insert(ImageBarrierInfo {
            old_layout,
            new_layout,
            src_access_mask: old_layout.src_access_mask(),
            dst_access_mask: new_layout.dst_access_mask(),
            acquire,
        });
        info.new_layout = new_layout;
        info.dst_access_mask = new_layout.dst_access_mask();
        info.acquire |= acquire;
        self.src_stage_mask |= old_layout.src_stage();
        self.dst_stage_mask |= new_layout.dst_stage();
    }

    fn add_buffer_barrier(&mut self, handle: NativeHandle, barrier: &RecordedBarrier) {
        let info = self.buffer_barriers.entry(handle).or_insert(BufferBarrierInfo {
            src_access_mask: AccessFlags::empty(),
            dst_access_mask: AccessFlags::empty(),
        });
        info.src_access_mask |= buffer_access_mask(barrier.current_state);
        info.dst_access_mask |= buffer_access_mask(barrier.new_state);
        self.src_stage_mask |= buffer_stages(barrier.current_state);
        self.dst_stage_mask |= buffer_stages(barrier.new_state);
    }

    pub(super) fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && self.buffer_barriers.is_empty()
    }

    pub(super) fn len(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    pub(super) fn src_stage_mask(&self) -> PipelineStages {
        self.src_stage_mask
    }

    pub(super) fn dst_stage_mask(&self) -> PipelineStages {
        self.dst_stage_mask
    }

    /// Translate the barriers of one `resource_barrier` call recorded for a
    /// `queue_type` queue. Split begins and ownership releases update `store`.
    pub(super) fn translate(
        barriers: &[RecordedBarrier],
        queue_type: QueueType,
        store: &mut ResourceStore,
        logger: &Logger,
    ) -> Self {
        let mut batch = Self::default();
        for barrier in barriers {
            let (handle, subresource, is_depth) = match barrier.target {
                BarrierTarget::Buffer { handle, .. } => (handle, None, false),
                BarrierTarget::Texture {
                    handle,
                    format,
                    subresource,
                    ..
                } => (handle, subresource, format.is_depth_stencil()),
            };
            let key = (handle, subresource);
            let states = (barrier.current_state, barrier.new_state);

            match barrier.phase {
                BarrierPhase::Begin => {
                    store.pending_splits.insert(key, states);
                    continue;
                }
                BarrierPhase::End => match store.pending_splits.remove(&key) {
                    Some(begun) if begun == states => {}
                    Some(begun) => logger.warn(
                        "software",
                        &format!("split barrier on {handle:?} ended as {states:?}, begun as {begun:?}"),
                    ),
                    None => logger.warn(
                        "software",
                        &format!("split barrier end on {handle:?} without a begin"),
                    ),
                },
                BarrierPhase::Full => {}
            }

            let mut acquire = false;
            match barrier.ownership {
                OwnershipTransfer::None => {}
                OwnershipTransfer::Release(destination) => {
                    log::trace!("software: {handle:?} released from {queue_type:?} to {destination:?}");
                    store.in_transfer.insert(handle, destination);
                }
                OwnershipTransfer::Acquire(source) => {
                    acquire = true;
                    if store.in_transfer.remove(&handle).is_none() {
                        logger.warn(
                            "software",
                            &format!("{queue_type:?} queue acquired {handle:?} from {source:?} without a release"),
                        );
                    }
                }
            }

            match barrier.target {
                BarrierTarget::Buffer { .. } => batch.add_buffer_barrier(handle, barrier),
                BarrierTarget::Texture { .. } => batch.add_image_barrier(
                    key,
                    ImageLayout::from_state(barrier.current_state, is_depth),
                    ImageLayout::from_state(barrier.new_state, is_depth),
                    acquire,
                ),
            }
        }
        batch
    }

    /// Execute the batch: move every covered subresource to its new layout.
    ///
    /// The old layout of a barrier must match what the image is in, unless
    /// it is `Undefined` (contents discarded). A mismatch is reported and the
    /// transition still happens.
    pub(super) fn submit(&self, store: &mut ResourceStore, logger: &Logger) {
        for (&(handle, subresource), info) in &self.image_barriers {
            let Some(texture) = store.textures.get_mut(&handle) else {
                logger.error("software", &format!("barrier on unknown texture {handle:?}"));
                continue;
            };
            for index in texture.indices(subresource) {
                let found = texture.layouts[index];
                // The release half already moved the image on the other queue.
                let acquired = info.acquire && found == info.new_layout;
                if info.old_layout != ImageLayout::Undefined && found != info.old_layout && !acquired {
                    logger.warn(
                        "software",
                        &format!(
                            "layout mismatch on {}: barrier expects {:?}, image is in {:?}",
                            texture.name.as_deref().unwrap_or("unnamed texture"),
                            info.old_layout,
                            found
                        ),
                    );
                }
                texture.layouts[index] = info.new_layout;
            }
        }
        log::trace!(
            "software: barrier batch of {} ({:?} -> {:?}), buffer access {:?}",
            self.len(),
            self.src_stage_mask,
            self.dst_stage_mask,
            self.buffer_barriers
                .values()
                .fold(AccessFlags::empty(), |acc, b| acc | b.src_access_mask | b.dst_access_mask)
        );
    }
}
