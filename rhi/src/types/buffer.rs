//! Buffer types and descriptors.

use bitflags::bitflags;

use super::{DescriptorType, ResourceState, TextureFormat};

/// Memory heap a resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceMemoryUsage {
    /// No intended memory usage specified.
    #[default]
    Unknown,
    /// Device-local memory, not CPU visible.
    GpuOnly,
    /// Host memory, used for staging.
    CpuOnly,
    /// CPU writes, GPU reads (upload).
    CpuToGpu,
    /// GPU writes, CPU reads (readback).
    GpuToCpu,
}

impl ResourceMemoryUsage {
    /// Returns true if the CPU can map memory of this class.
    pub fn is_host_visible(self) -> bool {
        matches!(self, Self::CpuOnly | Self::CpuToGpu | Self::GpuToCpu)
    }
}

bitflags! {
    /// Creation flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferCreationFlags: u32 {
        const NONE = 0;
        /// Dedicated allocation instead of sub-allocation.
        const OWN_MEMORY = 0x01;
        /// Keep the buffer mapped for its whole lifetime.
        const PERSISTENT_MAP = 0x02;
        /// Skip creating shader views.
        const NO_DESCRIPTOR_VIEW_CREATION = 0x08;
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    /// Debug name.
    pub name: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Required alignment; 0 lets the allocator choose.
    pub alignment: u32,
    pub memory_usage: ResourceMemoryUsage,
    pub flags: BufferCreationFlags,
    /// Views the buffer must support.
    pub descriptors: DescriptorType,
    /// State the buffer is in right after creation.
    pub start_state: ResourceState,
    /// Index of the first element for typed/structured views.
    pub first_element: u64,
    /// Element count for typed/structured views.
    pub element_count: u64,
    /// Element stride for structured views.
    pub struct_stride: u64,
    /// Format for typed views.
    pub format: TextureFormat,
    /// GPU node owning the memory in linked mode.
    pub node_index: u32,
    /// Other nodes allowed to access the memory in linked mode.
    pub shared_node_indices: Vec<u32>,
}

impl BufferDesc {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, memory_usage: ResourceMemoryUsage, descriptors: DescriptorType) -> Self {
        Self {
            name: None,
            size,
            alignment: 0,
            memory_usage,
            flags: BufferCreationFlags::NONE,
            descriptors,
            start_state: ResourceState::UNDEFINED,
            first_element: 0,
            element_count: 0,
            struct_stride: 0,
            format: TextureFormat::Undefined,
            node_index: 0,
            shared_node_indices: Vec::new(),
        }
    }

    /// A host-visible buffer suitable for `resolve_query` and texture readback.
    pub fn readback(size: u64) -> Self {
        Self::new(size, ResourceMemoryUsage::GpuToCpu, DescriptorType::RW_BUFFER)
            .with_start_state(ResourceState::COPY_DEST)
    }

    /// A host-visible upload buffer.
    pub fn upload(size: u64) -> Self {
        Self::new(size, ResourceMemoryUsage::CpuToGpu, DescriptorType::BUFFER)
            .with_start_state(ResourceState::GENERIC_READ)
    }

    /// Set the debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_start_state(mut self, state: ResourceState) -> Self {
        self.start_state = state;
        self
    }

    pub fn with_flags(mut self, flags: BufferCreationFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    /// Set structured view parameters.
    pub fn with_structure(mut self, first_element: u64, element_count: u64, stride: u64) -> Self {
        self.first_element = first_element;
        self.element_count = element_count;
        self.struct_stride = stride;
        self
    }

    pub fn with_node(mut self, node_index: u32) -> Self {
        self.node_index = node_index;
        self
    }
}

/// Index element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    #[default]
    U32,
    U16,
}

impl IndexType {
    pub fn size(self) -> u64 {
        match self {
            Self::U32 => 4,
            Self::U16 => 2,
        }
    }
}
