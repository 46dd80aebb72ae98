//! The backend-neutral command stream produced by [`super::Cmd`].
//!
//! Commands reference objects by native handle only. Backends walk the
//! stream in order when a submission executes.

use crate::barrier::RecordedBarrier;
use crate::command_signature::IndirectCommandType;
use crate::handle::{NativeHandle, ResourceId};
use crate::pipeline::PipelineType;
use crate::query::QueryType;
use crate::types::{
    DescriptorUpdateFrequency, IndexType, LoadActionsDesc, ScissorRect, TextureFormat, Viewport,
};

/// A render target view opened by a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AttachmentTarget {
    pub(crate) handle: NativeHandle,
    pub(crate) id: ResourceId,
    pub(crate) format: TextureFormat,
    pub(crate) mip_level: u32,
    pub(crate) array_layer: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    BeginRenderPass {
        colors: Vec<AttachmentTarget>,
        depth_stencil: Option<AttachmentTarget>,
        load_actions: LoadActionsDesc,
        width: u32,
        height: u32,
    },
    EndRenderPass,
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    BindPipeline {
        pipeline: NativeHandle,
        pipeline_type: PipelineType,
    },
    BindDescriptorSet {
        set: ResourceId,
        index: u32,
        frequency: DescriptorUpdateFrequency,
    },
    BindPushConstants {
        descriptor_index: u32,
        data: Vec<u8>,
    },
    BindIndexBuffer {
        buffer: NativeHandle,
        index_type: IndexType,
        offset: u64,
    },
    /// `(buffer, stride, offset)` per binding, starting at binding 0.
    BindVertexBuffers(Vec<(NativeHandle, u32, u64)>),
    Draw {
        vertex_count: u32,
        first_vertex: u32,
        instance_count: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
        instance_count: u32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    ResourceBarrier(Vec<RecordedBarrier>),
    ExecuteIndirect {
        command_type: IndirectCommandType,
        stride: u32,
        args_offset: u32,
        max_count: u32,
        buffer: NativeHandle,
        offset: u64,
        /// Buffer and offset of a `u32` that caps the record count.
        counter: Option<(NativeHandle, u64)>,
    },
    ResetQueryPool {
        pool: NativeHandle,
        start: u32,
        count: u32,
    },
    BeginQuery {
        pool: NativeHandle,
        query_type: QueryType,
        index: u32,
    },
    EndQuery {
        pool: NativeHandle,
        query_type: QueryType,
        index: u32,
    },
    /// Writes `count` little-endian `u64` results at offset 0 of `readback`.
    ResolveQuery {
        pool: NativeHandle,
        readback: NativeHandle,
        start: u32,
        count: u32,
    },
    UpdateBuffer {
        dst: NativeHandle,
        dst_offset: u64,
        src: NativeHandle,
        src_offset: u64,
        size: u64,
    },
    /// Copies one subresource as tightly packed rows.
    CopyTextureToBuffer {
        src: NativeHandle,
        format: TextureFormat,
        mip_level: u32,
        array_layer: u32,
        dst: NativeHandle,
        dst_offset: u64,
    },
    BeginDebugMarker {
        name: String,
        color: [f32; 3],
    },
    EndDebugMarker,
    AddDebugMarker {
        name: String,
        color: [f32; 3],
    },
}

impl Command {
    /// Vertices this command submits, used for occlusion and statistics queries.
    pub(crate) fn vertex_count(&self) -> u64 {
        match *self {
            Self::Draw {
                vertex_count,
                instance_count,
                ..
            } => vertex_count as u64 * instance_count as u64,
            Self::DrawIndexed {
                index_count,
                instance_count,
                ..
            } => index_count as u64 * instance_count as u64,
            _ => 0,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::BeginRenderPass { .. } => "BeginRenderPass",
            Self::EndRenderPass => "EndRenderPass",
            Self::SetViewport(_) => "SetViewport",
            Self::SetScissor(_) => "SetScissor",
            Self::BindPipeline { .. } => "BindPipeline",
            Self::BindDescriptorSet { .. } => "BindDescriptorSet",
            Self::BindPushConstants { .. } => "BindPushConstants",
            Self::BindIndexBuffer { .. } => "BindIndexBuffer",
            Self::BindVertexBuffers(_) => "BindVertexBuffers",
            Self::Draw { .. } => "Draw",
            Self::DrawIndexed { .. } => "DrawIndexed",
            Self::Dispatch { .. } => "Dispatch",
            Self::ResourceBarrier(_) => "ResourceBarrier",
            Self::ExecuteIndirect { .. } => "ExecuteIndirect",
            Self::ResetQueryPool { .. } => "ResetQueryPool",
            Self::BeginQuery { .. } => "BeginQuery",
            Self::EndQuery { .. } => "EndQuery",
            Self::ResolveQuery { .. } => "ResolveQuery",
            Self::UpdateBuffer { .. } => "UpdateBuffer",
            Self::CopyTextureToBuffer { .. } => "CopyTextureToBuffer",
            Self::BeginDebugMarker { .. } => "BeginDebugMarker",
            Self::EndDebugMarker => "EndDebugMarker",
            Self::AddDebugMarker { .. } => "AddDebugMarker",
        }
    }
}
