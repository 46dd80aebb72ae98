//! Command pools and command buffers.
//!
//! A [`Cmd`] moves through `Initial -> Recording -> Executable -> Pending ->
//! Completed`. `Completed` is never stored: it is derived from the queue's
//! completion counter the first time the state is queried after the
//! submission finishes. `Initial` after a pool reset is derived the same way
//! from the pool's reset epoch, so [`crate::Renderer::reset_cmd_pool`] never
//! has to touch the command buffers themselves.
//!
//! Recording verbs take `&mut self`: a command buffer is recorded by one
//! thread at a time. State checks run only when validation is enabled.

mod recorded;

pub(crate) use recorded::{AttachmentTarget, Command};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::barrier::{BufferBarrier, RawBarrier, RecordedBarrier, RenderTargetBarrier, TextureBarrier};
use crate::command_signature::{CommandSignature, IndirectCommandType};
use crate::context::RendererContext;
use crate::descriptor_set::DescriptorSet;
use crate::handle::{NativeHandle, ResourceId};
use crate::pipeline::{Pipeline, PipelineType};
use crate::query::{QueryPool, QueryType};
use crate::queue::{Queue, SubmissionTracker};
use crate::resources::{Buffer, RenderTarget, Texture};
use crate::root_signature::RootSignature;
use crate::types::{
    DescriptorType, IndexType, LoadActionsDesc, QueueType, ScissorRect, Viewport,
    MAX_RENDER_TARGET_ATTACHMENTS,
};

/// Lifecycle state of a [`Cmd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CmdState {
    #[default]
    Initial,
    Recording,
    Executable,
    Pending,
    Completed,
}

/// Descriptor for [`crate::Renderer::add_cmd_pool`].
#[derive(Debug, Clone, Copy)]
pub struct CmdPoolDesc<'a> {
    pub queue: &'a Queue,
    /// Hint that command buffers are short-lived.
    pub transient: bool,
}

impl<'a> CmdPoolDesc<'a> {
    pub fn new(queue: &'a Queue) -> Self {
        Self {
            queue,
            transient: false,
        }
    }
}

/// Descriptor for [`crate::Renderer::add_cmd`].
#[derive(Debug, Clone, Copy)]
pub struct CmdDesc<'a> {
    pub pool: &'a CmdPool,
    pub secondary: bool,
}

impl<'a> CmdDesc<'a> {
    pub fn new(pool: &'a CmdPool) -> Self {
        Self { pool, secondary: false }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: CmdState,
    epoch: u64,
    ticket: Option<(Arc<SubmissionTracker>, u64)>,
    commands: Option<Arc<[Command]>>,
}

impl Lifecycle {
    fn effective_state(&self, pool_epoch: u64) -> CmdState {
        if self.epoch != pool_epoch {
            return CmdState::Initial;
        }
        match (self.state, &self.ticket) {
            (CmdState::Pending, Some((tracker, serial))) if tracker.is_complete(*serial) => CmdState::Completed,
            (state, _) => state,
        }
    }
}

#[derive(Debug, Default)]
struct PoolShared {
    epoch: AtomicU64,
    registry: Mutex<Vec<Weak<Mutex<Lifecycle>>>>,
}

/// Allocator of command buffers for one queue.
pub struct CmdPool {
    context: Arc<RendererContext>,
    id: ResourceId,
    queue_type: QueueType,
    node_index: u32,
    transient: bool,
    shared: Arc<PoolShared>,
}

impl CmdPool {
    pub(crate) fn create(context: &Arc<RendererContext>, desc: &CmdPoolDesc<'_>) -> Self {
        let id = context.ids.next_id();
        log::trace!("CmdPool: created {id} for {:?} queue {}", desc.queue.queue_type(), desc.queue.id());
        Self {
            context: Arc::clone(context),
            id,
            queue_type: desc.queue.queue_type(),
            node_index: desc.queue.node_index(),
            transient: desc.transient,
            shared: Arc::new(PoolShared::default()),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub(crate) fn allocate(&self, secondary: bool) -> Cmd {
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        let lifecycle = Arc::new(Mutex::new(Lifecycle {
            state: CmdState::Initial,
            epoch,
            ticket: None,
            commands: None,
        }));
        let mut registry = self.shared.registry.lock();
        registry.retain(|weak| weak.strong_count() > 0);
        registry.push(Arc::downgrade(&lifecycle));
        drop(registry);

        let id = self.context.ids.next_id();
        log::trace!("Cmd: allocated {id} from pool {}", self.id);
        Cmd {
            context: Arc::clone(&self.context),
            id,
            queue_type: self.queue_type,
            node_index: self.node_index,
            secondary,
            pool: Arc::clone(&self.shared),
            lifecycle,
            recording: Vec::new(),
            pass_open: false,
            bound_pipeline: None,
            bound_root_signature: None,
            index_buffer_bound: false,
            open_queries: Vec::new(),
            marker_depth: 0,
        }
    }

    /// Return every command buffer of the pool to `Initial`.
    pub(crate) fn reset(&self) {
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        let mut registry = self.shared.registry.lock();
        registry.retain(|weak| weak.strong_count() > 0);
        if self.context.validator.enabled() {
            let pending = registry
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|lifecycle| lifecycle.lock().effective_state(epoch) == CmdState::Pending)
                .count();
            self.context.validator.check(pending == 0, || {
                format!("reset_cmd_pool: pool {} has {pending} Pending command buffers", self.id)
            });
        }
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        log::trace!("CmdPool: reset {}", self.id);
    }
}

impl std::fmt::Debug for CmdPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmdPool")
            .field("id", &self.id)
            .field("queue_type", &self.queue_type)
            .field("epoch", &self.shared.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

/// Render targets opened by [`Cmd::bind_render_targets`].
///
/// The default value binds nothing and closes the active pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindRenderTargetsDesc<'a> {
    pub render_targets: &'a [&'a RenderTarget],
    pub depth_stencil: Option<&'a RenderTarget>,
    /// `None` leaves every attachment `DontCare`.
    pub load_actions: Option<&'a LoadActionsDesc>,
    pub color_array_slices: Option<&'a [u32]>,
    pub color_mip_slices: Option<&'a [u32]>,
    pub depth_array_slice: u32,
    pub depth_mip_slice: u32,
}

impl<'a> BindRenderTargetsDesc<'a> {
    pub fn new(render_targets: &'a [&'a RenderTarget]) -> Self {
        Self {
            render_targets,
            ..Default::default()
        }
    }

    pub fn with_depth_stencil(mut self, target: &'a RenderTarget) -> Self {
        self.depth_stencil = Some(target);
        self
    }

    pub fn with_load_actions(mut self, load_actions: &'a LoadActionsDesc) -> Self {
        self.load_actions = Some(load_actions);
        self
    }
}

/// A recordable command sequence.
///
/// # Example
///
/// ```ignore
/// cmd.begin();
/// cmd.resource_barrier(&[], &[], &[RenderTargetBarrier::transition(
///     &target, ResourceState::UNDEFINED, ResourceState::RENDER_TARGET)]);
/// cmd.bind_render_targets(&BindRenderTargetsDesc::new(&[&target]).with_load_actions(&clear));
/// cmd.bind_pipeline(&pipeline);
/// cmd.draw(3, 0);
/// cmd.bind_render_targets(&BindRenderTargetsDesc::default());
/// cmd.end();
/// ```
pub struct Cmd {
    context: Arc<RendererContext>,
    id: ResourceId,
    queue_type: QueueType,
    node_index: u32,
    secondary: bool,
    pool: Arc<PoolShared>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    recording: Vec<Command>,
    pass_open: bool,
    bound_pipeline: Option<PipelineType>,
    bound_root_signature: Option<ResourceId>,
    index_buffer_bound: bool,
    /// Non-timestamp queries begun and not yet ended.
    open_queries: Vec<(NativeHandle, u32)>,
    marker_depth: u32,
}

impl Cmd {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn node_index(&self) -> u32 {
        self.node_index
    }

    pub fn is_secondary(&self) -> bool {
        self.secondary
    }

    pub fn state(&self) -> CmdState {
        let epoch = self.pool.epoch.load(Ordering::Acquire);
        self.lifecycle.lock().effective_state(epoch)
    }

    /// Number of commands recorded since `begin`.
    pub fn command_count(&self) -> usize {
        if !self.recording.is_empty() {
            return self.recording.len();
        }
        self.lifecycle.lock().commands.as_ref().map_or(0, |c| c.len())
    }

    // ------------------------------------------------------------------
    // Validation helpers
    // ------------------------------------------------------------------

    #[track_caller]
    fn check(&self, condition: bool, message: impl FnOnce() -> String) {
        self.context.validator.check(condition, message);
    }

    #[track_caller]
    fn require_recording(&self, verb: &str) {
        if self.context.validator.enabled() {
            let state = self.state();
            self.check(state == CmdState::Recording, || {
                format!("{verb}: Cmd {} is {state:?}, expected Recording", self.id)
            });
        }
    }

    /// Violation with validation, warning otherwise.
    #[track_caller]
    fn reject(&self, message: String) {
        if self.context.validator.enabled() {
            self.context.validator.violation(&message);
        }
        self.context.logger.warn("cmd", &message);
    }

    fn close_pass(&mut self) {
        if self.pass_open {
            self.recording.push(Command::EndRenderPass);
            self.pass_open = false;
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start recording. Legal from `Initial` and `Completed`.
    #[track_caller]
    pub fn begin(&mut self) {
        let epoch = self.pool.epoch.load(Ordering::Acquire);
        {
            let mut lifecycle = self.lifecycle.lock();
            let state = lifecycle.effective_state(epoch);
            self.context.validator.check(
                matches!(state, CmdState::Initial | CmdState::Completed),
                || format!("begin: Cmd {} is {state:?}, expected Initial or Completed", self.id),
            );
            lifecycle.state = CmdState::Recording;
            lifecycle.epoch = epoch;
            lifecycle.ticket = None;
            lifecycle.commands = None;
        }
        self.recording.clear();
        self.pass_open = false;
        self.bound_pipeline = None;
        self.bound_root_signature = None;
        self.index_buffer_bound = false;
        self.open_queries.clear();
        self.marker_depth = 0;
    }

    /// Finish recording. Closes an open render pass.
    #[track_caller]
    pub fn end(&mut self) {
        self.require_recording("end");
        self.close_pass();
        self.check(self.open_queries.is_empty(), || {
            format!("end: Cmd {} has {} queries still open", self.id, self.open_queries.len())
        });
        self.check(self.marker_depth == 0, || {
            format!("end: Cmd {} has {} unclosed debug markers", self.id, self.marker_depth)
        });
        let commands: Arc<[Command]> = std::mem::take(&mut self.recording).into();
        log::trace!("Cmd: {} recorded {} commands", self.id, commands.len());
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.state = CmdState::Executable;
        lifecycle.commands = Some(commands);
    }

    /// Validate for submission to a queue of `queue_type` and return the stream.
    #[track_caller]
    pub(crate) fn commands_for_submit(&self, queue_type: QueueType) -> Arc<[Command]> {
        let epoch = self.pool.epoch.load(Ordering::Acquire);
        let lifecycle = self.lifecycle.lock();
        let state = lifecycle.effective_state(epoch);
        self.check(matches!(state, CmdState::Executable | CmdState::Completed), || {
            format!("queue_submit: Cmd {} is {state:?}, expected Executable", self.id)
        });
        self.check(self.queue_type == queue_type, || {
            format!(
                "queue_submit: Cmd {} was allocated for a {:?} queue, submitted to {queue_type:?}",
                self.id, self.queue_type
            )
        });
        lifecycle
            .commands
            .clone()
            .unwrap_or_else(|| Arc::<[Command]>::from(Vec::new()))
    }

    pub(crate) fn mark_pending(&self, tracker: &Arc<SubmissionTracker>, serial: u64) {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.state = CmdState::Pending;
        lifecycle.ticket = Some((Arc::clone(tracker), serial));
    }

    // ------------------------------------------------------------------
    // Render targets and fixed-function state
    // ------------------------------------------------------------------

    fn attachment(&self, target: &RenderTarget, mip_level: u32, array_layer: u32) -> (AttachmentTarget, u32, u32) {
        let texture = target.texture();
        self.check(mip_level < texture.mip_levels() && array_layer < texture.array_size(), || {
            format!(
                "bind_render_targets: slice (mip {mip_level}, layer {array_layer}) out of range for {}",
                target.id()
            )
        });
        let extent = texture.extent().mip_level(mip_level);
        (
            AttachmentTarget {
                handle: target.native(),
                id: target.id(),
                format: target.format(),
                mip_level,
                array_layer,
            },
            extent.width,
            extent.height,
        )
    }

    /// Open a render pass over the given targets, closing any open pass.
    /// Binding no targets only closes the pass.
    #[track_caller]
    pub fn bind_render_targets(&mut self, desc: &BindRenderTargetsDesc<'_>) {
        self.require_recording("bind_render_targets");
        self.close_pass();
        if desc.render_targets.is_empty() && desc.depth_stencil.is_none() {
            return;
        }
        self.check(self.queue_type.supports_graphics(), || {
            format!("bind_render_targets on a {:?} queue", self.queue_type)
        });
        self.check(desc.render_targets.len() <= MAX_RENDER_TARGET_ATTACHMENTS, || {
            format!(
                "bind_render_targets: {} color targets, limit is {MAX_RENDER_TARGET_ATTACHMENTS}",
                desc.render_targets.len()
            )
        });

        let mut sizes = Vec::with_capacity(desc.render_targets.len() + 1);
        let mut colors = Vec::with_capacity(desc.render_targets.len());
        for (i, target) in desc.render_targets.iter().enumerate() {
            self.check(!target.format().is_depth_stencil(), || {
                format!("bind_render_targets: {} has depth format {:?}", target.id(), target.format())
            });
            let mip = desc.color_mip_slices.and_then(|s| s.get(i).copied()).unwrap_or(0);
            let layer = desc.color_array_slices.and_then(|s| s.get(i).copied()).unwrap_or(0);
            let (attachment, width, height) = self.attachment(target, mip, layer);
            colors.push(attachment);
            sizes.push((width, height));
        }
        let depth_stencil = desc.depth_stencil.map(|target| {
            self.check(target.format().is_depth_stencil(), || {
                format!("bind_render_targets: depth target {} has color format {:?}", target.id(), target.format())
            });
            let (attachment, width, height) =
                self.attachment(target, desc.depth_mip_slice, desc.depth_array_slice);
            sizes.push((width, height));
            attachment
        });

        let (width, height) = sizes[0];
        self.check(sizes.iter().all(|&size| size == (width, height)), || {
            format!("bind_render_targets: attachment sizes differ {sizes:?}")
        });

        self.recording.push(Command::BeginRenderPass {
            colors,
            depth_stencil,
            load_actions: desc.load_actions.copied().unwrap_or_default(),
            width,
            height,
        });
        self.pass_open = true;
    }

    #[track_caller]
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.require_recording("set_viewport");
        self.check(viewport.width > 0.0 && viewport.height > 0.0, || {
            format!("set_viewport: empty viewport {viewport:?}")
        });
        self.recording.push(Command::SetViewport(viewport));
    }

    #[track_caller]
    pub fn set_scissor(&mut self, scissor: ScissorRect) {
        self.require_recording("set_scissor");
        self.recording.push(Command::SetScissor(scissor));
    }

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    #[track_caller]
    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        self.require_recording("bind_pipeline");
        let pipeline_type = pipeline.pipeline_type();
        self.check(
            match pipeline_type {
                PipelineType::Graphics => self.queue_type.supports_graphics(),
                PipelineType::Compute | PipelineType::Raytracing => self.queue_type.supports_compute(),
                PipelineType::Undefined => false,
            },
            || format!("bind_pipeline: {pipeline_type:?} pipeline on a {:?} queue", self.queue_type),
        );
        self.bound_pipeline = Some(pipeline_type);
        self.bound_root_signature = Some(pipeline.root_signature_id());
        self.recording.push(Command::BindPipeline {
            pipeline: pipeline.native(),
            pipeline_type,
        });
    }

    /// Bind ring instance `index` of `set`.
    #[track_caller]
    pub fn bind_descriptor_set(&mut self, index: u32, set: &DescriptorSet) {
        self.require_recording("bind_descriptor_set");
        self.check(index < set.max_sets(), || {
            format!("bind_descriptor_set: index {index} out of range (max_sets {})", set.max_sets())
        });
        if let Some(bound) = self.bound_root_signature {
            self.check(bound == set.root_signature_id(), || {
                format!(
                    "bind_descriptor_set: set {} belongs to root signature {}, bound pipeline uses {bound}",
                    set.id(),
                    set.root_signature_id()
                )
            });
        }
        self.recording.push(Command::BindDescriptorSet {
            set: set.id(),
            index,
            frequency: set.update_frequency(),
        });
    }

    /// Write root constants resolved by name.
    #[track_caller]
    pub fn bind_push_constants(&mut self, root_signature: &RootSignature, name: &str, data: &[u8]) {
        self.require_recording("bind_push_constants");
        match root_signature.descriptor_index(name) {
            Some(index) => self.push_constants(root_signature, index, data),
            None => self.reject(format!(
                "bind_push_constants: '{name}' not found in root signature {}",
                root_signature.id()
            )),
        }
    }

    #[track_caller]
    pub fn bind_push_constants_by_index(&mut self, root_signature: &RootSignature, index: u32, data: &[u8]) {
        self.require_recording("bind_push_constants_by_index");
        self.push_constants(root_signature, index, data);
    }

    #[track_caller]
    fn push_constants(&mut self, root_signature: &RootSignature, index: u32, data: &[u8]) {
        let problem = match root_signature.descriptor(index) {
            None => Some(format!("descriptor index {index} out of range")),
            Some(info) if info.descriptor_type != DescriptorType::ROOT_CONSTANT => {
                Some(format!("'{}' is not a root constant", info.name))
            }
            Some(info) if data.len() as u64 > info.size as u64 => Some(format!(
                "{} bytes for root constant '{}' of {} bytes",
                data.len(),
                info.name,
                info.size
            )),
            Some(_) => None,
        };
        if let Some(problem) = problem {
            self.reject(format!("bind_push_constants: {problem}"));
            return;
        }
        self.recording.push(Command::BindPushConstants {
            descriptor_index: index,
            data: data.to_vec(),
        });
    }

    #[track_caller]
    pub fn bind_index_buffer(&mut self, buffer: &Buffer, index_type: IndexType, offset: u64) {
        self.require_recording("bind_index_buffer");
        self.check(buffer.desc().descriptors.contains(DescriptorType::INDEX_BUFFER), || {
            format!("bind_index_buffer: {} was not created as an index buffer", buffer.id())
        });
        self.check(offset < buffer.size(), || {
            format!("bind_index_buffer: offset {offset} past the end of {}", buffer.id())
        });
        self.index_buffer_bound = true;
        self.recording.push(Command::BindIndexBuffer {
            buffer: buffer.native(),
            index_type,
            offset,
        });
    }

    /// Bind vertex buffers to bindings `0..buffers.len()`. An empty `offsets`
    /// means offset zero for every buffer.
    #[track_caller]
    pub fn bind_vertex_buffers(&mut self, buffers: &[&Buffer], strides: &[u32], offsets: &[u64]) {
        self.require_recording("bind_vertex_buffers");
        self.check(strides.len() == buffers.len(), || {
            format!("bind_vertex_buffers: {} buffers, {} strides", buffers.len(), strides.len())
        });
        self.check(offsets.is_empty() || offsets.len() == buffers.len(), || {
            format!("bind_vertex_buffers: {} buffers, {} offsets", buffers.len(), offsets.len())
        });
        let limit = self.context.settings.max_vertex_input_bindings;
        self.check(buffers.len() <= limit as usize, || {
            format!("bind_vertex_buffers: {} buffers, limit is {limit}", buffers.len())
        });
        for buffer in buffers {
            self.check(buffer.desc().descriptors.contains(DescriptorType::VERTEX_BUFFER), || {
                format!("bind_vertex_buffers: {} was not created as a vertex buffer", buffer.id())
            });
        }
        let bindings = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| {
                (
                    buffer.native(),
                    strides.get(i).copied().unwrap_or(0),
                    offsets.get(i).copied().unwrap_or(0),
                )
            })
            .collect();
        self.recording.push(Command::BindVertexBuffers(bindings));
    }

    // ------------------------------------------------------------------
    // Draw and dispatch
    // ------------------------------------------------------------------

    #[track_caller]
    fn check_draw(&self, verb: &str) {
        self.require_recording(verb);
        if !self.context.validator.enabled() {
            return;
        }
        self.check(self.queue_type.supports_graphics(), || {
            format!("{verb} on a {:?} queue", self.queue_type)
        });
        self.check(self.pass_open, || format!("{verb} outside a render pass"));
        self.check(self.bound_pipeline == Some(PipelineType::Graphics), || {
            format!("{verb} without a bound graphics pipeline (bound: {:?})", self.bound_pipeline)
        });
    }

    #[track_caller]
    fn check_dispatch(&self, verb: &str) {
        self.require_recording(verb);
        if !self.context.validator.enabled() {
            return;
        }
        self.check(self.queue_type.supports_compute(), || {
            format!("{verb} on a {:?} queue", self.queue_type)
        });
        self.check(self.bound_pipeline == Some(PipelineType::Compute), || {
            format!("{verb} without a bound compute pipeline (bound: {:?})", self.bound_pipeline)
        });
    }

    #[track_caller]
    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.check_draw("draw");
        self.recording.push(Command::Draw {
            vertex_count,
            first_vertex,
            instance_count: 1,
            first_instance: 0,
        });
    }

    #[track_caller]
    pub fn draw_instanced(&mut self, vertex_count: u32, first_vertex: u32, instance_count: u32, first_instance: u32) {
        self.check_draw("draw_instanced");
        self.recording.push(Command::Draw {
            vertex_count,
            first_vertex,
            instance_count,
            first_instance,
        });
    }

    #[track_caller]
    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) {
        self.draw_indexed_instanced(index_count, first_index, 1, 0, vertex_offset);
    }

    #[track_caller]
    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        first_index: u32,
        instance_count: u32,
        first_instance: u32,
        vertex_offset: i32,
    ) {
        self.check_draw("draw_indexed");
        self.check(self.index_buffer_bound, || "draw_indexed without an index buffer".to_string());
        self.recording.push(Command::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
            instance_count,
            first_instance,
        });
    }

    /// Dispatch compute work. Closes an open render pass.
    #[track_caller]
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.check_dispatch("dispatch");
        self.close_pass();
        self.recording.push(Command::Dispatch { x, y, z });
    }

    /// Issue draws or dispatches whose arguments live in `buffer`.
    ///
    /// With a `counter`, the `u32` at that buffer offset caps the number of
    /// records read.
    #[track_caller]
    pub fn execute_indirect(
        &mut self,
        signature: &CommandSignature,
        max_count: u32,
        buffer: &Buffer,
        offset: u64,
        counter: Option<(&Buffer, u64)>,
    ) {
        let command_type = signature.command_type();
        if command_type.is_draw() {
            self.check_draw("execute_indirect");
            if command_type == IndirectCommandType::DrawIndexed {
                self.check(self.index_buffer_bound, || {
                    "execute_indirect: indexed draws without an index buffer".to_string()
                });
            }
        } else {
            self.check_dispatch("execute_indirect");
            self.close_pass();
        }
        if self.context.validator.enabled() {
            self.check(buffer.desc().descriptors.contains(DescriptorType::INDIRECT_BUFFER), || {
                format!("execute_indirect: {} was not created as an indirect buffer", buffer.id())
            });
            if max_count > 0 {
                let end = offset
                    + (max_count as u64 - 1) * signature.stride() as u64
                    + signature.args_offset() as u64
                    + command_type.argument_size() as u64;
                self.check(end <= buffer.size(), || {
                    format!("execute_indirect: {max_count} records end at {end}, {} is {} bytes", buffer.id(), buffer.size())
                });
            }
            if let Some((count_buffer, count_offset)) = counter {
                self.check(count_offset + 4 <= count_buffer.size(), || {
                    format!("execute_indirect: counter offset {count_offset} past the end of {}", count_buffer.id())
                });
            }
        }
        self.recording.push(Command::ExecuteIndirect {
            command_type,
            stride: signature.stride(),
            args_offset: signature.args_offset(),
            max_count,
            buffer: buffer.native(),
            offset,
            counter: counter.map(|(b, o)| (b.native(), o)),
        });
    }

    // ------------------------------------------------------------------
    // Barriers
    // ------------------------------------------------------------------

    #[track_caller]
    fn check_subresource(&self, texture: &Texture, subresource: bool, mip_level: u8, array_layer: u16) {
        if !subresource {
            return;
        }
        self.check(
            (mip_level as u32) < texture.mip_levels() && (array_layer as u32) < texture.array_size(),
            || {
                format!(
                    "resource_barrier: subresource (mip {mip_level}, layer {array_layer}) out of range for {}",
                    texture.id()
                )
            },
        );
    }

    #[track_caller]
    fn push_barrier(&self, raw: RawBarrier, out: &mut Vec<RecordedBarrier>) {
        match raw.resolve() {
            Ok(barrier) => {
                self.context.validator.apply_barrier(self.queue_type, &barrier);
                out.push(barrier);
            }
            Err(err) => self.reject(format!("resource_barrier on {}: {err}", raw.target.id())),
        }
    }

    /// Record one batch of state transitions. Closes an open render pass.
    ///
    /// Every barrier's `current_state` must equal the state the resource
    /// was last transitioned to; with validation a mismatch is fatal.
    #[track_caller]
    pub fn resource_barrier(
        &mut self,
        buffers: &[BufferBarrier<'_>],
        textures: &[TextureBarrier<'_>],
        render_targets: &[RenderTargetBarrier<'_>],
    ) {
        self.require_recording("resource_barrier");
        let total = buffers.len() + textures.len() + render_targets.len();
        if total == 0 {
            return;
        }
        self.close_pass();

        let mut recorded = Vec::with_capacity(total);
        for barrier in buffers {
            self.push_barrier(RawBarrier::from(barrier), &mut recorded);
        }
        for barrier in textures {
            self.check_subresource(
                barrier.texture,
                barrier.subresource_barrier,
                barrier.mip_level,
                barrier.array_layer,
            );
            self.push_barrier(RawBarrier::from(barrier), &mut recorded);
        }
        for barrier in render_targets {
            self.check_subresource(
                barrier.render_target.texture(),
                barrier.subresource_barrier,
                barrier.mip_level,
                barrier.array_layer,
            );
            self.push_barrier(RawBarrier::from(barrier), &mut recorded);
        }
        if !recorded.is_empty() {
            self.recording.push(Command::ResourceBarrier(recorded));
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[track_caller]
    fn check_query_range(&self, verb: &str, pool: &QueryPool, start: u32, count: u32) {
        self.check(start as u64 + count as u64 <= pool.count() as u64, || {
            format!("{verb}: queries {start}..{} out of range for pool of {}", start as u64 + count as u64, pool.count())
        });
    }

    #[track_caller]
    pub fn reset_query_pool(&mut self, pool: &QueryPool, start: u32, count: u32) {
        self.require_recording("reset_query_pool");
        self.check_query_range("reset_query_pool", pool, start, count);
        self.recording.push(Command::ResetQueryPool {
            pool: pool.native(),
            start,
            count,
        });
    }

    #[track_caller]
    pub fn begin_query(&mut self, pool: &QueryPool, index: u32) {
        self.require_recording("begin_query");
        self.check_query_range("begin_query", pool, index, 1);
        let query_type = pool.query_type();
        if query_type != QueryType::Timestamp {
            let key = (pool.native(), index);
            self.check(!self.open_queries.contains(&key), || {
                format!("begin_query: query {index} of {} is already open", pool.id())
            });
            self.open_queries.push(key);
        }
        self.recording.push(Command::BeginQuery {
            pool: pool.native(),
            query_type,
            index,
        });
    }

    #[track_caller]
    pub fn end_query(&mut self, pool: &QueryPool, index: u32) {
        self.require_recording("end_query");
        self.check_query_range("end_query", pool, index, 1);
        let query_type = pool.query_type();
        if query_type != QueryType::Timestamp {
            let key = (pool.native(), index);
            match self.open_queries.iter().position(|open| *open == key) {
                Some(position) => {
                    self.open_queries.swap_remove(position);
                }
                None => self.check(false, || format!("end_query: query {index} of {} was not begun", pool.id())),
            }
        }
        self.recording.push(Command::EndQuery {
            pool: pool.native(),
            query_type,
            index,
        });
    }

    /// Copy `count` results starting at `start` into `readback` as
    /// little-endian `u64` values at offset 0.
    #[track_caller]
    pub fn resolve_query(&mut self, pool: &QueryPool, readback: &Buffer, start: u32, count: u32) {
        self.require_recording("resolve_query");
        self.check_query_range("resolve_query", pool, start, count);
        self.check(count as u64 * QueryPool::RESULT_SIZE <= readback.size(), || {
            format!("resolve_query: {count} results do not fit in {} ({} bytes)", readback.id(), readback.size())
        });
        let native = pool.native();
        self.check(
            !self
                .open_queries
                .iter()
                .any(|&(open_pool, index)| open_pool == native && index >= start && index < start + count),
            || format!("resolve_query: a query of {} in range is still open", pool.id()),
        );
        self.close_pass();
        self.recording.push(Command::ResolveQuery {
            pool: native,
            readback: readback.native(),
            start,
            count,
        });
    }

    // ------------------------------------------------------------------
    // Copies
    // ------------------------------------------------------------------

    /// Copy `size` bytes between buffers. Closes an open render pass.
    #[track_caller]
    pub fn update_buffer(&mut self, dst: &Buffer, dst_offset: u64, src: &Buffer, src_offset: u64, size: u64) {
        self.require_recording("update_buffer");
        self.check(size > 0, || "update_buffer: zero size".to_string());
        self.check(src_offset + size <= src.size(), || {
            format!("update_buffer: source range {src_offset}+{size} past the end of {}", src.id())
        });
        self.check(dst_offset + size <= dst.size(), || {
            format!("update_buffer: destination range {dst_offset}+{size} past the end of {}", dst.id())
        });
        self.close_pass();
        self.recording.push(Command::UpdateBuffer {
            dst: dst.native(),
            dst_offset,
            src: src.native(),
            src_offset,
            size,
        });
    }

    /// Copy one texture subresource into `dst` as tightly packed rows.
    #[track_caller]
    pub fn copy_texture_to_buffer(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Texture,
        mip_level: u32,
        array_layer: u32,
    ) {
        self.require_recording("copy_texture_to_buffer");
        self.check(mip_level < src.mip_levels() && array_layer < src.array_size(), || {
            format!(
                "copy_texture_to_buffer: subresource (mip {mip_level}, layer {array_layer}) out of range for {}",
                src.id()
            )
        });
        let bytes = src.extent().mip_level(mip_level).texel_count() * src.format().block_size() as u64;
        self.check(dst_offset + bytes <= dst.size(), || {
            format!("copy_texture_to_buffer: {bytes} bytes at {dst_offset} do not fit in {}", dst.id())
        });
        self.close_pass();
        self.recording.push(Command::CopyTextureToBuffer {
            src: src.native(),
            format: src.format(),
            mip_level,
            array_layer,
            dst: dst.native(),
            dst_offset,
        });
    }

    // ------------------------------------------------------------------
    // Debug markers
    // ------------------------------------------------------------------

    #[track_caller]
    pub fn begin_debug_marker(&mut self, color: [f32; 3], name: &str) {
        self.require_recording("begin_debug_marker");
        self.marker_depth += 1;
        self.recording.push(Command::BeginDebugMarker {
            name: name.to_string(),
            color,
        });
    }

    #[track_caller]
    pub fn end_debug_marker(&mut self) {
        self.require_recording("end_debug_marker");
        self.check(self.marker_depth > 0, || "end_debug_marker without a matching begin".to_string());
        self.marker_depth = self.marker_depth.saturating_sub(1);
        self.recording.push(Command::EndDebugMarker);
    }

    #[track_caller]
    pub fn add_debug_marker(&mut self, color: [f32; 3], name: &str) {
        self.require_recording("add_debug_marker");
        self.recording.push(Command::AddDebugMarker {
            name: name.to_string(),
            color,
        });
    }
}

impl Drop for Cmd {
    fn drop(&mut self) {
        if self.state() == CmdState::Pending {
            self.context
                .logger
                .warn("cmd", &format!("Cmd {} dropped while its submission is still pending", self.id));
        }
    }
}

impl std::fmt::Debug for Cmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cmd")
            .field("id", &self.id)
            .field("queue_type", &self.queue_type)
            .field("state", &self.state())
            .field("recorded", &self.recording.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Cmd: Send, Sync);
static_assertions::assert_impl_all!(CmdPool: Send, Sync);
