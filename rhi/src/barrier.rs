//! Resource barriers.
//!
//! A barrier declares that a resource moves from `current_state` to
//! `new_state`. The caller supplies both states; nothing is inferred. With
//! validation enabled the declared `current_state` is checked against the
//! last state recorded for the resource (see [`crate::validation`]).
//!
//! Two optional mechanisms ride on the same records:
//!
//! - split barriers: `begin_only` starts a transition, a later `end_only`
//!   barrier with the same states completes it;
//! - queue ownership transfer: a `release` barrier recorded on the source
//!   queue is paired with an `acquire` barrier with the same state pair on
//!   the destination queue. `queue_type` names the other queue.
//!
//! Backends with implicit hazard tracking accept and ignore all four flags.

use crate::handle::{NativeHandle, ResourceId};
use crate::resources::{Buffer, RenderTarget, Texture};
use crate::types::{QueueType, ResourceState, TextureFormat};

/// Mip levels addressable by a subresource barrier (7 bits).
pub const MAX_BARRIER_MIP_LEVEL: u8 = 127;
/// Array layers addressable by a subresource barrier (13 bits).
pub const MAX_BARRIER_ARRAY_LAYER: u16 = 8191;
/// Exclusive upper bound of the raw `queue_type` field (5 bits).
pub const QUEUE_TYPE_FIELD_LIMIT: u8 = 32;

macro_rules! impl_barrier_builders {
    ($ty:ident, $field:ident, $res:ident) => {
        impl<'a> $ty<'a> {
            /// A full transition on the current queue.
            pub fn transition(
                $field: &'a $res,
                current_state: ResourceState,
                new_state: ResourceState,
            ) -> Self {
                Self {
                    $field,
                    current_state,
                    new_state,
                    ..Self::empty_flags($field)
                }
            }

            /// Start a split transition.
            pub fn split_begin(mut self) -> Self {
                self.begin_only = true;
                self.end_only = false;
                self
            }

            /// Complete a split transition.
            pub fn split_end(mut self) -> Self {
                self.end_only = true;
                self.begin_only = false;
                self
            }

            /// Release ownership to `destination`.
            pub fn release_to(mut self, destination: QueueType) -> Self {
                self.release = true;
                self.acquire = false;
                self.queue_type = destination.as_raw();
                self
            }

            /// Acquire ownership from `source`.
            pub fn acquire_from(mut self, source: QueueType) -> Self {
                self.acquire = true;
                self.release = false;
                self.queue_type = source.as_raw();
                self
            }
        }
    };
}

/// Barrier on a buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferBarrier<'a> {
    pub buffer: &'a Buffer,
    pub current_state: ResourceState,
    pub new_state: ResourceState,
    pub begin_only: bool,
    pub end_only: bool,
    pub acquire: bool,
    pub release: bool,
    /// Raw queue type of the other side of an ownership transfer (5 bits).
    pub queue_type: u8,
}

impl<'a> BufferBarrier<'a> {
    fn empty_flags(buffer: &'a Buffer) -> Self {
        Self {
            buffer,
            current_state: ResourceState::UNDEFINED,
            new_state: ResourceState::UNDEFINED,
            begin_only: false,
            end_only: false,
            acquire: false,
            release: false,
            queue_type: 0,
        }
    }
}

impl_barrier_builders!(BufferBarrier, buffer, Buffer);

/// Barrier on a texture, optionally restricted to one subresource.
#[derive(Debug, Clone, Copy)]
pub struct TextureBarrier<'a> {
    pub texture: &'a Texture,
    pub current_state: ResourceState,
    pub new_state: ResourceState,
    pub begin_only: bool,
    pub end_only: bool,
    pub acquire: bool,
    pub release: bool,
    /// Raw queue type of the other side of an ownership transfer (5 bits).
    pub queue_type: u8,
    pub subresource_barrier: bool,
    /// Mip level, when `subresource_barrier` is set (7 bits).
    pub mip_level: u8,
    /// Array layer, when `subresource_barrier` is set (13 bits).
    pub array_layer: u16,
}

impl<'a> TextureBarrier<'a> {
    fn empty_flags(texture: &'a Texture) -> Self {
        Self {
            texture,
            current_state: ResourceState::UNDEFINED,
            new_state: ResourceState::UNDEFINED,
            begin_only: false,
            end_only: false,
            acquire: false,
            release: false,
            queue_type: 0,
            subresource_barrier: false,
            mip_level: 0,
            array_layer: 0,
        }
    }

    /// Restrict the barrier to a single mip level and array layer.
    pub fn subresource(mut self, mip_level: u8, array_layer: u16) -> Self {
        self.subresource_barrier = true;
        self.mip_level = mip_level;
        self.array_layer = array_layer;
        self
    }
}

impl_barrier_builders!(TextureBarrier, texture, Texture);

/// Barrier on a render target.
#[derive(Debug, Clone, Copy)]
pub struct RenderTargetBarrier<'a> {
    pub render_target: &'a RenderTarget,
    pub current_state: ResourceState,
    pub new_state: ResourceState,
    pub begin_only: bool,
    pub end_only: bool,
    pub acquire: bool,
    pub release: bool,
    /// Raw queue type of the other side of an ownership transfer (5 bits).
    pub queue_type: u8,
    pub subresource_barrier: bool,
    pub mip_level: u8,
    pub array_layer: u16,
}

impl<'a> RenderTargetBarrier<'a> {
    fn empty_flags(render_target: &'a RenderTarget) -> Self {
        Self {
            render_target,
            current_state: ResourceState::UNDEFINED,
            new_state: ResourceState::UNDEFINED,
            begin_only: false,
            end_only: false,
            acquire: false,
            release: false,
            queue_type: 0,
            subresource_barrier: false,
            mip_level: 0,
            array_layer: 0,
        }
    }

    /// Restrict the barrier to a single mip level and array layer.
    pub fn subresource(mut self, mip_level: u8, array_layer: u16) -> Self {
        self.subresource_barrier = true;
        self.mip_level = mip_level;
        self.array_layer = array_layer;
        self
    }
}

impl_barrier_builders!(RenderTargetBarrier, render_target, RenderTarget);

/// Single mip level / array layer of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subresource {
    pub mip_level: u32,
    pub array_layer: u32,
}

/// The object a recorded barrier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierTarget {
    Buffer {
        id: ResourceId,
        handle: NativeHandle,
    },
    Texture {
        id: ResourceId,
        handle: NativeHandle,
        format: TextureFormat,
        subresource: Option<Subresource>,
    },
}

impl BarrierTarget {
    pub fn id(&self) -> ResourceId {
        match *self {
            Self::Buffer { id, .. } | Self::Texture { id, .. } => id,
        }
    }
}

/// Whether a recorded barrier is a full transition or one half of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierPhase {
    Full,
    Begin,
    End,
}

/// Whether a recorded barrier transfers queue ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipTransfer {
    None,
    /// Give the resource to the named queue type.
    Release(QueueType),
    /// Take the resource from the named queue type.
    Acquire(QueueType),
}

/// A barrier resolved to backend handles, as stored in a command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedBarrier {
    pub target: BarrierTarget,
    pub current_state: ResourceState,
    pub new_state: ResourceState,
    pub phase: BarrierPhase,
    pub ownership: OwnershipTransfer,
}

/// Raw barrier fields shared by the three public barrier kinds.
pub(crate) struct RawBarrier {
    pub(crate) target: BarrierTarget,
    pub(crate) current_state: ResourceState,
    pub(crate) new_state: ResourceState,
    pub(crate) begin_only: bool,
    pub(crate) end_only: bool,
    pub(crate) acquire: bool,
    pub(crate) release: bool,
    pub(crate) queue_type: u8,
}

/// Why a raw barrier could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BarrierFieldError {
    BeginAndEnd,
    AcquireAndRelease,
    QueueType(u8),
}

impl std::fmt::Display for BarrierFieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeginAndEnd => write!(f, "begin_only and end_only are both set"),
            Self::AcquireAndRelease => write!(f, "acquire and release are both set"),
            Self::QueueType(raw) => write!(f, "queue_type {raw} does not name a queue type"),
        }
    }
}

impl RawBarrier {
    /// Resolve flag bits into a [`RecordedBarrier`].
    pub(crate) fn resolve(&self) -> Result<RecordedBarrier, BarrierFieldError> {
        let phase = match (self.begin_only, self.end_only) {
            (false, false) => BarrierPhase::Full,
            (true, false) => BarrierPhase::Begin,
            (false, true) => BarrierPhase::End,
            (true, true) => return Err(BarrierFieldError::BeginAndEnd),
        };
        let ownership = match (self.acquire, self.release) {
            (false, false) => OwnershipTransfer::None,
            (true, true) => return Err(BarrierFieldError::AcquireAndRelease),
            (acquire, _) => {
                let queue = QueueType::from_raw(self.queue_type)
                    .ok_or(BarrierFieldError::QueueType(self.queue_type))?;
                if acquire {
                    OwnershipTransfer::Acquire(queue)
                } else {
                    OwnershipTransfer::Release(queue)
                }
            }
        };
        Ok(RecordedBarrier {
            target: self.target,
            current_state: self.current_state,
            new_state: self.new_state,
            phase,
            ownership,
        })
    }
}

impl From<&BufferBarrier<'_>> for RawBarrier {
    fn from(b: &BufferBarrier<'_>) -> Self {
        Self {
            target: BarrierTarget::Buffer {
                id: b.buffer.id(),
                handle: b.buffer.native(),
            },
            current_state: b.current_state,
            new_state: b.new_state,
            begin_only: b.begin_only,
            end_only: b.end_only,
            acquire: b.acquire,
            release: b.release,
            queue_type: b.queue_type,
        }
    }
}

fn texture_target(
    texture: &Texture,
    subresource_barrier: bool,
    mip_level: u8,
    array_layer: u16,
) -> BarrierTarget {
    BarrierTarget::Texture {
        id: texture.id(),
        handle: texture.native(),
        format: texture.format(),
        subresource: subresource_barrier.then_some(Subresource {
            mip_level: mip_level as u32,
            array_layer: array_layer as u32,
        }),
    }
}

impl From<&TextureBarrier<'_>> for RawBarrier {
    fn from(b: &TextureBarrier<'_>) -> Self {
        Self {
            target: texture_target(b.texture, b.subresource_barrier, b.mip_level, b.array_layer),
            current_state: b.current_state,
            new_state: b.new_state,
            begin_only: b.begin_only,
            end_only: b.end_only,
            acquire: b.acquire,
            release: b.release,
            queue_type: b.queue_type,
        }
    }
}

impl From<&RenderTargetBarrier<'_>> for RawBarrier {
    fn from(b: &RenderTargetBarrier<'_>) -> Self {
        Self {
            target: texture_target(
                b.render_target.texture(),
                b.subresource_barrier,
                b.mip_level,
                b.array_layer,
            ),
            current_state: b.current_state,
            new_state: b.new_state,
            begin_only: b.begin_only,
            end_only: b.end_only,
            acquire: b.acquire,
            release: b.release,
            queue_type: b.queue_type,
        }
    }
}
