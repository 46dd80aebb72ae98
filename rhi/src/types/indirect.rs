//! Indirect argument layouts.
//!
//! These structs match the GPU layout read by indirect draws and dispatches.
//! The buffer holding them must be created with
//! [`DescriptorType::INDIRECT_BUFFER`](super::DescriptorType::INDIRECT_BUFFER).

use bytemuck::{Pod, Zeroable};

/// Arguments for a non-indexed indirect draw. 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct IndirectDrawArguments {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub start_vertex: u32,
    pub start_instance: u32,
}

impl IndirectDrawArguments {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(vertex_count: u32, instance_count: u32) -> Self {
        Self {
            vertex_count,
            instance_count,
            start_vertex: 0,
            start_instance: 0,
        }
    }
}

/// Arguments for an indexed indirect draw. 20 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct IndirectDrawIndexArguments {
    pub index_count: u32,
    pub instance_count: u32,
    pub start_index: u32,
    /// Value added to each index before reading from the vertex buffer.
    pub vertex_offset: i32,
    pub start_instance: u32,
}

impl IndirectDrawIndexArguments {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(index_count: u32, instance_count: u32) -> Self {
        Self {
            index_count,
            instance_count,
            start_index: 0,
            vertex_offset: 0,
            start_instance: 0,
        }
    }
}

/// Arguments for an indirect dispatch. 12 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct IndirectDispatchArguments {
    pub group_count_x: u32,
    pub group_count_y: u32,
    pub group_count_z: u32,
}

impl IndirectDispatchArguments {
    /// Size of the struct in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self {
            group_count_x: x,
            group_count_y: y,
            group_count_z: z,
        }
    }
}

static_assertions::const_assert_eq!(IndirectDrawArguments::SIZE, 16);
static_assertions::const_assert_eq!(IndirectDrawIndexArguments::SIZE, 20);
static_assertions::const_assert_eq!(IndirectDispatchArguments::SIZE, 12);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_arguments_bytes() {
        let args = IndirectDrawArguments::new(3, 2);
        let bytes = bytemuck::bytes_of(&args);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &3u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_ne_bytes());
    }
}
