//! GPU buffer resource.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::allocator::{AllocationKind, AllocationRequest, MemoryAllocation};
use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{NativeHandle, ResourceId};
use crate::types::{BufferCreationFlags, BufferDesc, DescriptorType, ResourceMemoryUsage};

/// A GPU buffer resource.
///
/// Buffers are created by [`crate::Renderer::add_buffer`] and are
/// reference-counted. Backend storage and the memory allocation are released
/// when the last reference is dropped.
///
/// # Example
///
/// ```ignore
/// let buffer = renderer.add_buffer(&BufferDesc::upload(1024))?;
/// buffer.write_mapped(0, &[1, 2, 3, 4])?;
/// ```
pub struct Buffer {
    context: Arc<RendererContext>,
    id: ResourceId,
    native: NativeHandle,
    desc: BufferDesc,
    allocation: MemoryAllocation,
    name: RwLock<Option<String>>,
}

impl Buffer {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &BufferDesc) -> GraphicsResult<Self> {
        if desc.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        if desc.alignment != 0 && !desc.alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer alignment {} is not a power of two",
                desc.alignment
            )));
        }
        if desc.struct_stride > 0 {
            let end = desc
                .first_element
                .checked_add(desc.element_count)
                .ok_or_else(|| {
                    GraphicsError::InvalidParameter(format!(
                        "structured view of {} elements from element {} overflows",
                        desc.element_count, desc.first_element
                    ))
                })?
                .saturating_mul(desc.struct_stride);
            if end > desc.size {
                return Err(GraphicsError::InvalidParameter(format!(
                    "structured view ends at byte {end}, past buffer size {}",
                    desc.size
                )));
            }
        }
        context.check_node(desc.node_index, "add_buffer");

        let mut alignment = desc.alignment as u64;
        if desc.descriptors.contains(DescriptorType::UNIFORM_BUFFER) {
            alignment = alignment.max(context.settings.uniform_buffer_alignment as u64);
        }
        let allocation = context.allocator.allocate(&AllocationRequest {
            size: desc.size,
            alignment,
            usage: desc.memory_usage,
            kind: AllocationKind::Buffer,
            dedicated: desc.flags.contains(BufferCreationFlags::OWN_MEMORY),
            name: desc.name.as_deref(),
        })?;

        let native = match context.backend.create_buffer(desc) {
            Ok(native) => native,
            Err(err) => {
                context.allocator.free(&allocation);
                return Err(err);
            }
        };

        let id = context.ids.next_id();
        context.validator.register_resource(id, desc.start_state);
        if let Some(name) = &desc.name {
            context.backend.set_debug_name(native, name);
        }

        log::trace!(
            "Buffer: created {id} {:?} (size={}, usage={:?})",
            desc.name,
            desc.size,
            desc.memory_usage
        );

        Ok(Self {
            context: Arc::clone(context),
            id,
            native,
            desc: desc.clone(),
            allocation,
            name: RwLock::new(desc.name.clone()),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Backend handle.
    pub fn native(&self) -> NativeHandle {
        self.native
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn memory_usage(&self) -> ResourceMemoryUsage {
        self.desc.memory_usage
    }

    /// The memory allocation backing this buffer.
    pub fn allocation(&self) -> &MemoryAllocation {
        &self.allocation
    }

    /// Current debug name.
    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write() = Some(name.to_string());
        self.context.backend.set_debug_name(self.native, name);
    }

    /// Write bytes through the CPU mapping of a host-visible buffer.
    pub fn write_mapped(&self, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        self.check_mapped_range("write_mapped", offset, data.len() as u64)?;
        self.context.backend.write_buffer(self.native, offset, data)
    }

    /// Write a slice of plain-old-data values.
    pub fn write_mapped_pod<T: bytemuck::Pod>(&self, offset: u64, values: &[T]) -> GraphicsResult<()> {
        self.write_mapped(offset, bytemuck::cast_slice(values))
    }

    /// Read `size` bytes through the CPU mapping of a host-visible buffer.
    pub fn read_mapped(&self, offset: u64, size: u64) -> GraphicsResult<Vec<u8>> {
        self.check_mapped_range("read_mapped", offset, size)?;
        self.context.backend.read_buffer(self.native, offset, size)
    }

    /// Read `count` plain-old-data values starting at `offset`.
    pub fn read_mapped_pod<T: bytemuck::Pod>(&self, offset: u64, count: usize) -> GraphicsResult<Vec<T>> {
        let stride = std::mem::size_of::<T>();
        let bytes = self.read_mapped(offset, (stride * count) as u64)?;
        Ok(bytes
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    fn check_mapped_range(&self, op: &str, offset: u64, size: u64) -> GraphicsResult<()> {
        self.context.check_alive(op);
        if self.context.is_destroyed() {
            return Err(GraphicsError::DeviceLost);
        }
        let host_visible = self.desc.memory_usage.is_host_visible();
        self.context.validator.check(host_visible, || {
            format!(
                "{op} on buffer {} with {:?} memory, which is not host visible",
                self.id, self.desc.memory_usage
            )
        });
        if !host_visible {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {} is not host visible",
                self.id
            )));
        }
        match offset.checked_add(size) {
            Some(end) if end <= self.desc.size => Ok(()),
            _ => Err(GraphicsError::InvalidParameter(format!(
                "{op} range {offset}+{size} exceeds buffer size {}",
                self.desc.size
            ))),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.context.validator.unregister_resource(self.id);
        self.context.backend.destroy_buffer(self.native);
        self.context.allocator.free(&self.allocation);
        log::trace!("Buffer: destroyed {}", self.id);
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.desc.size)
            .field("memory_usage", &self.desc.memory_usage)
            .field("name", &*self.name.read())
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::null_context;

    #[test]
    fn test_buffer_debug() {
        let context = null_context();
        let buffer = Buffer::create(&context, &BufferDesc::upload(1024).with_name("staging")).unwrap();
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("Buffer"));
        assert!(debug.contains("1024"));
        assert!(debug.contains("staging"));
    }

    #[test]
    fn test_zero_size_rejected() {
        let context = null_context();
        assert!(matches!(
            Buffer::create(&context, &BufferDesc::upload(0)),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_structured_view_bounds() {
        let context = null_context();
        let overflowing = BufferDesc::upload(1024).with_structure(u64::MAX, 1, 16);
        assert!(matches!(
            Buffer::create(&context, &overflowing),
            Err(GraphicsError::InvalidParameter(message)) if message.contains("overflows")
        ));
        let past_end = BufferDesc::upload(1024).with_structure(60, 5, 16);
        assert!(matches!(
            Buffer::create(&context, &past_end),
            Err(GraphicsError::InvalidParameter(_))
        ));
        let fitting = Buffer::create(&context, &BufferDesc::upload(1024).with_structure(60, 4, 16)).unwrap();
        assert_eq!(fitting.size(), 1024);
        assert_eq!(context.allocator.stats().allocation_count, 1);
    }

    #[test]
    fn test_mapped_roundtrip() {
        let context = null_context();
        let buffer = Buffer::create(&context, &BufferDesc::upload(16)).unwrap();
        buffer.write_mapped_pod(4, &[7u32, 9u32]).unwrap();
        assert_eq!(buffer.read_mapped_pod::<u32>(4, 2).unwrap(), vec![7, 9]);
        assert!(buffer.write_mapped(12, &[0; 8]).is_err());
    }

    #[test]
    #[should_panic(expected = "not host visible")]
    fn test_map_device_local_is_violation() {
        let context = null_context();
        let buffer = Buffer::create(
            &context,
            &BufferDesc::new(64, ResourceMemoryUsage::GpuOnly, DescriptorType::BUFFER),
        )
        .unwrap();
        let _ = buffer.read_mapped(0, 4);
    }

    #[test]
    fn test_start_state_is_tracked() {
        let context = null_context();
        let buffer = Buffer::create(&context, &BufferDesc::readback(64)).unwrap();
        assert_eq!(
            context.validator.tracked_state(buffer.id()),
            Some(crate::types::ResourceState::COPY_DEST)
        );
        let id = buffer.id();
        drop(buffer);
        assert_eq!(context.validator.tracked_state(id), None);
        assert_eq!(context.allocator.stats().allocation_count, 0);
    }
}
