//! Queue types and descriptors.

use bitflags::bitflags;

/// Kind of work a queue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueType {
    #[default]
    Graphics,
    Transfer,
    Compute,
}

impl QueueType {
    /// Number of queue types.
    pub const COUNT: usize = 3;

    /// Barrier encoding of this queue type (fits in 5 bits).
    pub fn as_raw(self) -> u8 {
        match self {
            Self::Graphics => 0,
            Self::Transfer => 1,
            Self::Compute => 2,
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Graphics),
            1 => Some(Self::Transfer),
            2 => Some(Self::Compute),
            _ => None,
        }
    }

    /// Returns true if graphics commands (render passes, draws) are legal.
    pub fn supports_graphics(self) -> bool {
        self == Self::Graphics
    }

    /// Returns true if dispatches are legal.
    pub fn supports_compute(self) -> bool {
        matches!(self, Self::Graphics | Self::Compute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueuePriority {
    #[default]
    Normal,
    High,
    GlobalRealtime,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueFlag: u32 {
        const NONE = 0;
        const DISABLE_GPU_TIMEOUT = 0x1;
        const INIT_MICROPROFILE = 0x2;
    }
}

/// Descriptor for [`crate::Renderer::add_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueueDesc {
    pub queue_type: QueueType,
    pub flags: QueueFlag,
    pub priority: QueuePriority,
    pub node_index: u32,
}

impl QueueDesc {
    pub fn new(queue_type: QueueType) -> Self {
        Self {
            queue_type,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: QueuePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_flags(mut self, flags: QueueFlag) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_node_index(mut self, node_index: u32) -> Self {
        self.node_index = node_index;
        self
    }
}
