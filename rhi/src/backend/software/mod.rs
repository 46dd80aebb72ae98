//! Software backend.
//!
//! An explicit-barrier device emulated on the CPU:
//!
//! - buffers and textures live in host memory ([`memory`]);
//! - textures carry one [`layout::ImageLayout`] per subresource, moved only by
//!   barriers ([`barriers`]);
//! - every queue owns a worker thread fed through an `mpsc` channel, so
//!   submissions execute asynchronously and semaphores really block;
//! - pipelines are "compiled" into deterministic blobs kept in a persistent
//!   cache ([`pipeline_cache`]).
//!
//! A failure while executing (a semaphore wait that times out, a command
//! reading outside a buffer) marks the device lost. The failure is reported
//! through the renderer's [`Logger`] and later submissions are refused.

mod barriers;
mod executor;
mod layout;
mod memory;
mod pipeline_cache;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use self::executor::Executor;
use self::memory::{BufferMemory, QueryPoolMemory, ResourceStore, TextureMemory};
use self::pipeline_cache::PipelineCacheStore;
use super::{Backend, BackendQueue, BackendSwapChain, HeadlessSwapChain, SwapChainSurfaceDesc};
use crate::config::SoftwareBackendConfig;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::{IdAllocator, NativeHandle};
use crate::logging::Logger;
use crate::pipeline::{PipelineCacheStats, PipelineCompileDesc, PipelineType};
use crate::profiling::profile_scope;
use crate::query::QueryPoolDesc;
use crate::queue::{PresentWork, QueueWork};
use crate::renderer::{BarrierModel, GpuSettings, GpuVendorPreset};
use crate::types::{BufferDesc, QueueDesc, QueueType, SamplerDesc, TextureDesc};

/// State shared by the backend and its queue workers.
#[derive(Debug)]
struct SoftwareShared {
    store: Mutex<ResourceStore>,
    lost: AtomicBool,
    logger: Logger,
    /// Zero point of timestamp queries.
    epoch: Instant,
    submission_latency: Duration,
    wait_timeout: Duration,
}

impl SoftwareShared {
    fn device_lost(&self, message: &str) {
        self.logger.error("software", message);
        self.lost.store(true, Ordering::Release);
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Wake everything waiting on `work` without executing it.
    fn abandon(&self, work: &QueueWork) {
        work.tracker.mark_lost();
        if let Some(fence) = &work.signal_fence {
            fence.signal();
        }
    }

    fn execute_submission(&self, queue_type: QueueType, work: QueueWork) {
        profile_scope!("software_submission");
        if self.is_lost() {
            self.abandon(&work);
            return;
        }
        for semaphore in &work.wait_semaphores {
            if !semaphore.wait_and_consume(self.wait_timeout) {
                self.device_lost(&format!(
                    "{queue_type:?} queue submission {} timed out waiting for a semaphore",
                    work.serial
                ));
                self.abandon(&work);
                return;
            }
        }
        if !self.submission_latency.is_zero() {
            std::thread::sleep(self.submission_latency);
        }

        let result = {
            let mut store = self.store.lock();
            let mut executor = Executor::new(&mut store, &self.logger, queue_type, self.epoch);
            let result = work.commands.iter().try_for_each(|commands| executor.run(commands));
            log::trace!(
                "software: {queue_type:?} submission {} executed ({} vertices)",
                work.serial,
                executor.vertices()
            );
            result
        };
        match result {
            Ok(()) => work.complete(),
            Err(e) => {
                self.device_lost(&format!("{queue_type:?} queue submission {} failed: {e}", work.serial));
                self.abandon(&work);
            }
        }
    }

    fn execute_present(&self, work: PresentWork) {
        profile_scope!("software_present");
        for semaphore in &work.wait_semaphores {
            if !semaphore.wait_and_consume(self.wait_timeout) {
                self.device_lost("present timed out waiting for a semaphore");
                work.tracker.mark_lost();
                return;
            }
        }
        if let Err(e) = work.swap_chain.present(work.image_index) {
            self.device_lost(&format!("present of image {} failed: {e}", work.image_index));
            work.tracker.mark_lost();
            return;
        }
        work.complete();
    }
}

/// CPU-emulated explicit-barrier device.
#[derive(Debug)]
pub(crate) struct SoftwareBackend {
    shared: Arc<SoftwareShared>,
    handles: IdAllocator,
    node_count: u32,
    raytracing: bool,
}

impl SoftwareBackend {
    pub(crate) fn new(config: &SoftwareBackendConfig, node_count: u32, wait_timeout: Duration, logger: Logger) -> Self {
        log::info!(
            "SoftwareBackend: created with {node_count} node(s), submission latency {:?}",
            config.submission_latency
        );
        Self {
            shared: Arc::new(SoftwareShared {
                store: Mutex::new(ResourceStore::default()),
                lost: AtomicBool::new(false),
                logger,
                epoch: Instant::now(),
                submission_latency: config.submission_latency,
                wait_timeout,
            }),
            handles: IdAllocator::new(),
            node_count,
            raytracing: config.raytracing,
        }
    }
}

impl Backend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "Software Backend"
    }

    fn gpu_settings(&self) -> GpuSettings {
        GpuSettings {
            vendor: GpuVendorPreset::new("redlilium", "software", "RedLilium Software Rasterizer"),
            linked_node_count: self.node_count,
            barrier_model: BarrierModel::Explicit,
            raytracing_supported: self.raytracing,
            hdr_supported: true,
            timestamp_queries: true,
            occlusion_queries: true,
            pipeline_statistics_queries: true,
            ..GpuSettings::default()
        }
    }

    fn timestamp_frequency(&self) -> f64 {
        1.0e9
    }

    fn is_lost(&self) -> bool {
        self.shared.is_lost()
    }

    fn set_debug_name(&self, handle: NativeHandle, name: &str) {
        let mut store = self.shared.store.lock();
        if let Some(buffer) = store.buffers.get_mut(&handle) {
            buffer.name = Some(name.to_string());
        } else if let Some(texture) = store.textures.get_mut(&handle) {
            texture.name = Some(name.to_string());
        }
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GraphicsResult<NativeHandle> {
        let size = usize::try_from(desc.size).map_err(|_| GraphicsError::OutOfMemory)?;
        let handle = self.handles.next_handle();
        self.shared.store.lock().buffers.insert(
            handle,
            BufferMemory {
                name: desc.name.clone(),
                data: vec![0; size],
            },
        );
        log::trace!("SoftwareBackend: buffer {handle:?} ({} bytes)", desc.size);
        Ok(handle)
    }

    fn destroy_buffer(&self, handle: NativeHandle) {
        let mut store = self.shared.store.lock();
        store.buffers.remove(&handle);
        store.in_transfer.remove(&handle);
        store.pending_splits.retain(|&(h, _), _| h != handle);
    }

    fn write_buffer(&self, handle: NativeHandle, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        self.shared.store.lock().write_buffer(handle, offset, data, "write_buffer")
    }

    fn read_buffer(&self, handle: NativeHandle, offset: u64, size: u64) -> GraphicsResult<Vec<u8>> {
        Ok(self.shared.store.lock().read_buffer(handle, offset, size, "read_buffer")?.to_vec())
    }

    fn create_texture(&self, desc: &TextureDesc) -> GraphicsResult<NativeHandle> {
        let memory = TextureMemory::new(desc)?;
        let handle = self.handles.next_handle();
        log::trace!(
            "SoftwareBackend: texture {handle:?} {}x{}x{} {:?}, {} mips x {} layers",
            memory.extent.width,
            memory.extent.height,
            memory.extent.depth,
            memory.format,
            memory.mip_levels,
            memory.array_size
        );
        self.shared.store.lock().textures.insert(handle, memory);
        Ok(handle)
    }

    fn destroy_texture(&self, handle: NativeHandle) {
        let mut store = self.shared.store.lock();
        store.textures.remove(&handle);
        store.in_transfer.remove(&handle);
        store.pending_splits.retain(|&(h, _), _| h != handle);
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> GraphicsResult<NativeHandle> {
        let handle = self.handles.next_handle();
        self.shared.store.lock().samplers.insert(handle);
        Ok(handle)
    }

    fn destroy_sampler(&self, handle: NativeHandle) {
        self.shared.store.lock().samplers.remove(&handle);
    }

    fn create_pipeline(&self, desc: &PipelineCompileDesc, cache: Option<NativeHandle>) -> GraphicsResult<NativeHandle> {
        if desc.pipeline_type == PipelineType::Raytracing && !self.raytracing {
            return Err(GraphicsError::FeatureNotSupported("raytracing pipelines".to_string()));
        }
        let mut store = self.shared.store.lock();
        let compiled = match cache.and_then(|cache| store.caches.get_mut(&cache)) {
            Some(cache) => cache.get_or_compile(desc),
            None => pipeline_cache::compile(desc).into(),
        };
        let handle = self.handles.next_handle();
        store.pipelines.insert(handle, desc.pipeline_type);
        log::trace!(
            "SoftwareBackend: {:?} pipeline {handle:?} {:?} ({} bytes)",
            desc.pipeline_type,
            desc.name,
            compiled.len()
        );
        Ok(handle)
    }

    fn destroy_pipeline(&self, handle: NativeHandle) {
        self.shared.store.lock().pipelines.remove(&handle);
    }

    fn create_pipeline_cache(&self, data: &[u8]) -> GraphicsResult<NativeHandle> {
        let cache = PipelineCacheStore::from_blob(data, &self.shared.logger);
        let handle = self.handles.next_handle();
        self.shared.store.lock().caches.insert(handle, cache);
        Ok(handle)
    }

    fn pipeline_cache_data(&self, handle: NativeHandle) -> GraphicsResult<Vec<u8>> {
        self.shared
            .store
            .lock()
            .caches
            .get(&handle)
            .map(PipelineCacheStore::to_blob)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown pipeline cache {handle:?}")))
    }

    fn pipeline_cache_stats(&self, handle: NativeHandle) -> PipelineCacheStats {
        self.shared
            .store
            .lock()
            .caches
            .get(&handle)
            .map(PipelineCacheStore::stats)
            .unwrap_or_default()
    }

    fn destroy_pipeline_cache(&self, handle: NativeHandle) {
        self.shared.store.lock().caches.remove(&handle);
    }

    fn create_query_pool(&self, desc: &QueryPoolDesc) -> GraphicsResult<NativeHandle> {
        let handle = self.handles.next_handle();
        self.shared
            .store
            .lock()
            .query_pools
            .insert(handle, QueryPoolMemory::new(desc.query_type, desc.query_count));
        Ok(handle)
    }

    fn destroy_query_pool(&self, handle: NativeHandle) {
        self.shared.store.lock().query_pools.remove(&handle);
    }

    fn create_queue(&self, desc: &QueueDesc) -> GraphicsResult<Box<dyn BackendQueue>> {
        Ok(Box::new(SoftwareQueue::spawn(Arc::clone(&self.shared), desc.queue_type)?))
    }

    fn create_swap_chain(
        &self,
        window: RawWindowHandle,
        _display: RawDisplayHandle,
        desc: &SwapChainSurfaceDesc,
    ) -> GraphicsResult<Arc<dyn BackendSwapChain>> {
        log::debug!("SoftwareBackend: headless swap chain for {window:?}");
        Ok(Arc::new(HeadlessSwapChain::new(desc)))
    }
}

enum Job {
    Submit(QueueWork),
    Present(PresentWork),
}

/// A queue executing its submissions in order on a dedicated thread.
struct SoftwareQueue {
    queue_type: QueueType,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SoftwareQueue {
    fn spawn(shared: Arc<SoftwareShared>, queue_type: QueueType) -> GraphicsResult<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = std::thread::Builder::new()
            .name(format!("rhi-{queue_type:?}-queue").to_lowercase())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    match job {
                        Job::Submit(work) => shared.execute_submission(queue_type, work),
                        Job::Present(work) => shared.execute_present(work),
                    }
                }
                log::trace!("software: {queue_type:?} queue worker exiting");
            })
            .map_err(|e| GraphicsError::InitializationFailed(format!("failed to spawn queue worker: {e}")))?;
        Ok(Self {
            queue_type,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn send(&self, job: Job) -> GraphicsResult<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(GraphicsError::DeviceLost);
        };
        sender.send(job).map_err(|_| {
            GraphicsError::Internal(format!("{:?} queue worker has stopped", self.queue_type))
        })
    }
}

impl BackendQueue for SoftwareQueue {
    fn submit(&self, work: QueueWork) -> GraphicsResult<()> {
        self.send(Job::Submit(work))
    }

    fn present(&self, work: PresentWork) -> GraphicsResult<()> {
        self.send(Job::Present(work))
    }
}

impl Drop for SoftwareQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain its jobs and exit.
        self.sender.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                log::error!("software: {:?} queue worker panicked", self.queue_type);
            }
        }
    }
}
