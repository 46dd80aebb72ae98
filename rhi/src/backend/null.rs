//! Null backend.
//!
//! Models a driver with implicit hazard tracking: every barrier flag is
//! accepted and ignored and nothing is rasterized. Submissions complete
//! synchronously inside `queue_submit`. Buffers keep their bytes so that
//! mapped reads and writes behave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use super::{Backend, BackendQueue, BackendSwapChain, HeadlessSwapChain, SwapChainSurfaceDesc};
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{IdAllocator, NativeHandle};
use crate::logging::Logger;
use crate::pipeline::{PipelineCacheStats, PipelineCompileDesc};
use crate::query::QueryPoolDesc;
use crate::queue::{PresentWork, QueueWork};
use crate::renderer::{BarrierModel, GpuSettings, GpuVendorPreset};
use crate::types::{BufferDesc, QueueDesc, SamplerDesc, TextureDesc};

#[derive(Debug, Default)]
struct NullCache {
    keys: HashSet<u64>,
    stats: PipelineCacheStats,
}

/// Backend that executes nothing.
#[derive(Debug)]
pub(crate) struct NullBackend {
    node_count: u32,
    logger: Logger,
    handles: IdAllocator,
    buffers: Mutex<HashMap<NativeHandle, Vec<u8>>>,
    caches: Mutex<HashMap<NativeHandle, NullCache>>,
}

impl NullBackend {
    pub(crate) fn new(node_count: u32, logger: Logger) -> Self {
        log::info!("NullBackend: created with {node_count} node(s)");
        Self {
            node_count,
            logger,
            handles: IdAllocator::new(),
            buffers: Mutex::new(HashMap::new()),
            caches: Mutex::new(HashMap::new()),
        }
    }

    fn buffer_range(&self, handle: NativeHandle, offset: u64, size: u64, op: &str) -> GraphicsResult<(usize, usize)> {
        let buffers = self.buffers.lock();
        let Some(data) = buffers.get(&handle) else {
            return Err(GraphicsError::Internal(format!("{op}: unknown buffer {handle:?}")));
        };
        let end = offset.checked_add(size).filter(|&end| end <= data.len() as u64);
        match end {
            Some(end) => Ok((offset as usize, end as usize)),
            None => Err(GraphicsError::InvalidParameter(format!(
                "{op}: range {offset}+{size} exceeds {} bytes",
                data.len()
            ))),
        }
    }
}

impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "Null Backend"
    }

    fn gpu_settings(&self) -> GpuSettings {
        GpuSettings {
            vendor: GpuVendorPreset::new("null", "null", "Null Device"),
            linked_node_count: self.node_count,
            barrier_model: BarrierModel::Implicit,
            raytracing_supported: false,
            hdr_supported: false,
            ..GpuSettings::default()
        }
    }

    fn timestamp_frequency(&self) -> f64 {
        1.0e9
    }

    fn is_lost(&self) -> bool {
        false
    }

    fn set_debug_name(&self, handle: NativeHandle, name: &str) {
        log::trace!("NullBackend: {handle:?} named {name:?}");
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GraphicsResult<NativeHandle> {
        let handle = self.handles.next_handle();
        let size = usize::try_from(desc.size).map_err(|_| GraphicsError::OutOfMemory)?;
        self.buffers.lock().insert(handle, vec![0; size]);
        log::trace!("NullBackend: creating buffer {:?} (size: {})", desc.name, desc.size);
        Ok(handle)
    }

    fn destroy_buffer(&self, handle: NativeHandle) {
        self.buffers.lock().remove(&handle);
    }

    fn write_buffer(&self, handle: NativeHandle, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let (start, end) = self.buffer_range(handle, offset, data.len() as u64, "write_buffer")?;
        if let Some(bytes) = self.buffers.lock().get_mut(&handle) {
            bytes[start..end].copy_from_slice(data);
        }
        Ok(())
    }

    fn read_buffer(&self, handle: NativeHandle, offset: u64, size: u64) -> GraphicsResult<Vec<u8>> {
        let (start, end) = self.buffer_range(handle, offset, size, "read_buffer")?;
        Ok(self
            .buffers
            .lock()
            .get(&handle)
            .map(|bytes| bytes[start..end].to_vec())
            .unwrap_or_default())
    }

    fn create_texture(&self, desc: &TextureDesc) -> GraphicsResult<NativeHandle> {
        log::trace!(
            "NullBackend: creating texture {:?} ({}x{}x{})",
            desc.name,
            desc.width,
            desc.height,
            desc.depth
        );
        Ok(self.handles.next_handle())
    }

    fn destroy_texture(&self, _handle: NativeHandle) {}

    fn create_sampler(&self, _desc: &SamplerDesc) -> GraphicsResult<NativeHandle> {
        Ok(self.handles.next_handle())
    }

    fn destroy_sampler(&self, _handle: NativeHandle) {}

    fn create_pipeline(&self, desc: &PipelineCompileDesc, cache: Option<NativeHandle>) -> GraphicsResult<NativeHandle> {
        if let Some(cache) = cache {
            let key = desc.cache_key();
            if let Some(cache) = self.caches.lock().get_mut(&cache) {
                if cache.keys.insert(key) {
                    cache.stats.misses += 1;
                    cache.stats.entries += 1;
                } else {
                    cache.stats.hits += 1;
                }
            }
        }
        log::trace!("NullBackend: creating {:?} pipeline {:?}", desc.pipeline_type, desc.name);
        Ok(self.handles.next_handle())
    }

    fn destroy_pipeline(&self, _handle: NativeHandle) {}

    fn create_pipeline_cache(&self, data: &[u8]) -> GraphicsResult<NativeHandle> {
        if !data.is_empty() {
            self.logger
                .warn("null", &format!("ignoring {} byte pipeline cache blob", data.len()));
        }
        let handle = self.handles.next_handle();
        self.caches.lock().insert(handle, NullCache::default());
        Ok(handle)
    }

    fn pipeline_cache_data(&self, _handle: NativeHandle) -> GraphicsResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn pipeline_cache_stats(&self, handle: NativeHandle) -> PipelineCacheStats {
        self.caches
            .lock()
            .get(&handle)
            .map(|cache| cache.stats)
            .unwrap_or_default()
    }

    fn destroy_pipeline_cache(&self, handle: NativeHandle) {
        self.caches.lock().remove(&handle);
    }

    fn create_query_pool(&self, _desc: &QueryPoolDesc) -> GraphicsResult<NativeHandle> {
        Ok(self.handles.next_handle())
    }

    fn destroy_query_pool(&self, _handle: NativeHandle) {}

    fn create_queue(&self, desc: &QueueDesc) -> GraphicsResult<Box<dyn BackendQueue>> {
        log::trace!("NullBackend: creating {:?} queue", desc.queue_type);
        Ok(Box::new(NullQueue))
    }

    fn create_swap_chain(
        &self,
        _window: RawWindowHandle,
        _display: RawDisplayHandle,
        desc: &SwapChainSurfaceDesc,
    ) -> GraphicsResult<Arc<dyn BackendSwapChain>> {
        Ok(Arc::new(HeadlessSwapChain::new(desc)))
    }
}

struct NullQueue;

impl BackendQueue for NullQueue {
    fn submit(&self, work: QueueWork) -> GraphicsResult<()> {
        // Waits were signaled by earlier submissions, which already completed.
        for semaphore in &work.wait_semaphores {
            semaphore.try_consume();
        }
        work.complete();
        Ok(())
    }

    fn present(&self, work: PresentWork) -> GraphicsResult<()> {
        for semaphore in &work.wait_semaphores {
            semaphore.try_consume();
        }
        work.swap_chain.present(work.image_index)?;
        work.complete();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceMemoryUsage;

    #[test]
    fn test_buffer_storage() {
        let backend = NullBackend::new(1, Logger::default());
        let handle = backend.create_buffer(&BufferDesc::upload(8)).unwrap();
        backend.write_buffer(handle, 2, &[1, 2, 3]).unwrap();
        assert_eq!(backend.read_buffer(handle, 0, 6).unwrap(), vec![0, 0, 1, 2, 3, 0]);
        assert!(backend.read_buffer(handle, 4, 8).is_err());
        backend.destroy_buffer(handle);
        assert!(backend.read_buffer(handle, 0, 1).is_err());

        let desc = BufferDesc::upload(4);
        assert_eq!(desc.memory_usage, ResourceMemoryUsage::CpuToGpu);
    }

    #[test]
    fn test_settings() {
        let settings = NullBackend::new(2, Logger::default()).gpu_settings();
        assert_eq!(settings.linked_node_count, 2);
        assert_eq!(settings.barrier_model, BarrierModel::Implicit);
        assert!(!settings.raytracing_supported);
    }
}
