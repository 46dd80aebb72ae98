//! Command stream execution.
//!
//! Nothing is rasterized. Render passes apply their load actions, copies and
//! buffer updates move real bytes, and queries observe a counter of
//! submitted vertices and the backend clock.

use std::time::Instant;

use super::barriers::BarrierBatch;
use super::memory::ResourceStore;
use crate::command::{AttachmentTarget, Command};
use crate::command_signature::IndirectCommandType;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::NativeHandle;
use crate::logging::Logger;
use crate::query::QueryType;
use crate::types::{
    ClearValue, IndirectDispatchArguments, IndirectDrawArguments, IndirectDrawIndexArguments, LoadActionType,
    QueueType,
};

/// Executes command lists of one submission.
pub(super) struct Executor<'a> {
    store: &'a mut ResourceStore,
    logger: &'a Logger,
    queue_type: QueueType,
    epoch: Instant,
    /// Vertices submitted so far, including indirect draws.
    vertices: u64,
    in_pass: bool,
    markers: Vec<String>,
}

impl<'a> Executor<'a> {
    pub(super) fn new(store: &'a mut ResourceStore, logger: &'a Logger, queue_type: QueueType, epoch: Instant) -> Self {
        Self {
            store,
            logger,
            queue_type,
            epoch,
            vertices: 0,
            in_pass: false,
            markers: Vec::new(),
        }
    }

    /// Vertices counted so far.
    pub(super) fn vertices(&self) -> u64 {
        self.vertices
    }

    pub(super) fn run(&mut self, commands: &[Command]) -> GraphicsResult<()> {
        for command in commands {
            self.execute(command)?;
        }
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> GraphicsResult<()> {
        match command {
            Command::BeginRenderPass {
                colors,
                depth_stencil,
                load_actions,
                width,
                height,
            } => {
                self.in_pass = true;
                log::trace!("software: render pass {width}x{height}, {} color targets", colors.len());
                for (i, target) in colors.iter().enumerate() {
                    let clear = (load_actions.load_actions_color[i] == LoadActionType::Clear)
                        .then_some(load_actions.clear_color_values[i]);
                    self.open_attachment(target, clear)?;
                }
                if let Some(target) = depth_stencil {
                    let clear = (load_actions.load_action_depth == LoadActionType::Clear
                        || load_actions.load_action_stencil == LoadActionType::Clear)
                        .then_some(load_actions.clear_depth);
                    self.open_attachment(target, clear)?;
                }
            }
            Command::EndRenderPass => self.in_pass = false,
            Command::BindPipeline { pipeline, pipeline_type } => {
                if !self.store.pipelines.contains_key(pipeline) {
                    return Err(GraphicsError::Internal(format!("bind of unknown {pipeline_type:?} pipeline {pipeline:?}")));
                }
            }
            Command::Draw { .. } | Command::DrawIndexed { .. } => {
                if !self.in_pass {
                    self.logger.warn("software", "draw outside a render pass");
                }
                self.vertices += command.vertex_count();
            }
            Command::ResourceBarrier(barriers) => {
                let batch = BarrierBatch::translate(barriers, self.queue_type, self.store, self.logger);
                if !batch.is_empty() {
                    batch.submit(self.store, self.logger);
                }
            }
            Command::ExecuteIndirect {
                command_type,
                stride,
                args_offset,
                max_count,
                buffer,
                offset,
                counter,
            } => self.execute_indirect(*command_type, *stride, *args_offset, *max_count, *buffer, *offset, *counter)?,
            Command::ResetQueryPool { pool, start, count } => {
                let pool = self.store.query_pool_mut(*pool, "reset_query_pool")?;
                let end = (*start + *count).min(pool.results.len() as u32);
                for index in *start..end {
                    pool.results[index as usize] = 0;
                    pool.open.remove(&index);
                }
            }
            Command::BeginQuery {
                pool,
                query_type,
                index,
            } => {
                let vertices = self.vertices;
                let pool = self.store.query_pool_mut(*pool, "begin_query")?;
                check_query_type(pool.query_type, *query_type)?;
                if *query_type != QueryType::Timestamp {
                    pool.open.insert(*index, vertices);
                }
            }
            Command::EndQuery {
                pool,
                query_type,
                index,
            } => {
                let vertices = self.vertices;
                let now = self.epoch.elapsed().as_nanos() as u64;
                let pool = self.store.query_pool_mut(*pool, "end_query")?;
                check_query_type(pool.query_type, *query_type)?;
                let value = match query_type {
                    QueryType::Timestamp => now,
                    QueryType::Occlusion | QueryType::PipelineStatistics => {
                        let begun = pool.open.remove(index).unwrap_or(vertices);
                        vertices - begun
                    }
                };
                match pool.results.get_mut(*index as usize) {
                    Some(slot) => *slot = value,
                    None => return Err(GraphicsError::Internal(format!("query index {index} out of range"))),
                }
            }
            Command::ResolveQuery {
                pool,
                readback,
                start,
                count,
            } => {
                let pool = self.store.query_pool_mut(*pool, "resolve_query")?;
                let start = *start as usize;
                let Some(results) = pool.results.get(start..start + *count as usize) else {
                    return Err(GraphicsError::Internal(format!("resolve of queries {start}+{count} out of range")));
                };
                let bytes: Vec<u8> = results.iter().flat_map(|v| v.to_le_bytes()).collect();
                self.store.write_buffer(*readback, 0, &bytes, "resolve_query")?;
            }
            Command::UpdateBuffer {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                let bytes = self.store.read_buffer(*src, *src_offset, *size, "update_buffer")?.to_vec();
                self.store.write_buffer(*dst, *dst_offset, &bytes, "update_buffer")?;
            }
            Command::CopyTextureToBuffer {
                src,
                format,
                mip_level,
                array_layer,
                dst,
                dst_offset,
            } => {
                let texture = self.store.texture_mut(*src, "copy_texture_to_buffer")?;
                let Some(index) = texture.index(*mip_level, *array_layer) else {
                    return Err(GraphicsError::Internal(format!(
                        "copy of missing subresource mip {mip_level} layer {array_layer}"
                    )));
                };
                let layout = texture.layouts[index];
                if !layout.is_copy_readable() {
                    self.logger.warn(
                        "software",
                        &format!(
                            "copy from {} ({format:?}) in layout {layout:?}",
                            texture.name.as_deref().unwrap_or("unnamed texture")
                        ),
                    );
                }
                let bytes = texture.subresources[index].clone();
                self.store.write_buffer(*dst, *dst_offset, &bytes, "copy_texture_to_buffer")?;
            }
            Command::BeginDebugMarker { name, .. } => {
                log::trace!("software: begin marker {name:?}");
                self.markers.push(name.clone());
            }
            Command::EndDebugMarker => {
                if let Some(name) = self.markers.pop() {
                    log::trace!("software: end marker {name:?}");
                }
            }
            Command::AddDebugMarker { name, .. } => log::trace!("software: marker {name:?}"),
            Command::SetViewport(_)
            | Command::SetScissor(_)
            | Command::BindDescriptorSet { .. }
            | Command::BindPushConstants { .. }
            | Command::BindIndexBuffer { .. }
            | Command::BindVertexBuffers(_)
            | Command::Dispatch { .. } => log::trace!("software: {}", command.name()),
        }
        Ok(())
    }

    fn open_attachment(&mut self, target: &AttachmentTarget, clear: Option<ClearValue>) -> GraphicsResult<()> {
        let texture = self.store.texture_mut(target.handle, "bind_render_targets")?;
        let Some(index) = texture.index(target.mip_level, target.array_layer) else {
            return Err(GraphicsError::Internal(format!(
                "attachment {} has no mip {} layer {}",
                target.id, target.mip_level, target.array_layer
            )));
        };
        let layout = texture.layouts[index];
        if !layout.is_attachment_writable(texture.is_depth()) {
            self.logger.warn(
                "software",
                &format!(
                    "{} bound as attachment in layout {layout:?}",
                    texture.name.as_deref().unwrap_or("unnamed texture")
                ),
            );
        }
        if let Some(value) = clear {
            texture.clear(index, value);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_indirect(
        &mut self,
        command_type: IndirectCommandType,
        stride: u32,
        args_offset: u32,
        max_count: u32,
        buffer: NativeHandle,
        offset: u64,
        counter: Option<(NativeHandle, u64)>,
    ) -> GraphicsResult<()> {
        let mut count = max_count;
        if let Some((counter_buffer, counter_offset)) = counter {
            let bytes = self.store.read_buffer(counter_buffer, counter_offset, 4, "execute_indirect")?;
            count = count.min(bytemuck::pod_read_unaligned::<u32>(bytes));
        }
        let size = command_type.argument_size() as u64;
        for record in 0..count as u64 {
            let at = offset + record * stride as u64 + args_offset as u64;
            let bytes = self.store.read_buffer(buffer, at, size, "execute_indirect")?;
            self.vertices += match command_type {
                IndirectCommandType::Draw => {
                    let args: IndirectDrawArguments = bytemuck::pod_read_unaligned(bytes);
                    args.vertex_count as u64 * args.instance_count as u64
                }
                IndirectCommandType::DrawIndexed => {
                    let args: IndirectDrawIndexArguments = bytemuck::pod_read_unaligned(bytes);
                    args.index_count as u64 * args.instance_count as u64
                }
                IndirectCommandType::Dispatch => {
                    let args: IndirectDispatchArguments = bytemuck::pod_read_unaligned(bytes);
                    log::trace!("software: indirect dispatch {args:?}");
                    0
                }
            };
        }
        log::trace!("software: executed {count} indirect {command_type:?} records");
        Ok(())
    }
}

fn check_query_type(pool: QueryType, command: QueryType) -> GraphicsResult<()> {
    if pool == command {
        Ok(())
    } else {
        Err(GraphicsError::Internal(format!("{command:?} query on a {pool:?} pool")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::memory::{BufferMemory, QueryPoolMemory, TextureMemory};
    use crate::handle::ResourceId;
    use crate::types::{LoadActionsDesc, ResourceState, TextureDesc, TextureFormat};

    fn buffer(store: &mut ResourceStore, handle: u64, data: Vec<u8>) {
        store.buffers.insert(NativeHandle(handle), BufferMemory { name: None, data });
    }

    #[test]
    fn test_clear_then_copy() {
        let logger = Logger::default();
        let mut store = ResourceStore::default();
        let desc = TextureDesc::new_2d(2, 2, TextureFormat::Rgba8Unorm).with_start_state(ResourceState::RENDER_TARGET);
        store.textures.insert(NativeHandle(1), TextureMemory::new(&desc).unwrap());
        buffer(&mut store, 2, vec![0; 16]);

        let target = AttachmentTarget {
            handle: NativeHandle(1),
            id: ResourceId(1),
            format: TextureFormat::Rgba8Unorm,
            mip_level: 0,
            array_layer: 0,
        };
        let commands = vec![
            Command::BeginRenderPass {
                colors: vec![target],
                depth_stencil: None,
                load_actions: LoadActionsDesc::default().with_clear_color(0, ClearValue::color(1.0, 0.0, 0.0, 1.0)),
                width: 2,
                height: 2,
            },
            Command::EndRenderPass,
            Command::CopyTextureToBuffer {
                src: NativeHandle(1),
                format: TextureFormat::Rgba8Unorm,
                mip_level: 0,
                array_layer: 0,
                dst: NativeHandle(2),
                dst_offset: 0,
            },
        ];
        Executor::new(&mut store, &logger, QueueType::Graphics, Instant::now())
            .run(&commands)
            .unwrap();
        let data = &store.buffers[&NativeHandle(2)].data;
        assert_eq!(&data[..4], &[255, 0, 0, 255]);
        assert_eq!(&data[12..], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_occlusion_counts_indirect_draws() {
        let logger = Logger::default();
        let mut store = ResourceStore::default();
        let args = [IndirectDrawArguments::new(3, 2), IndirectDrawArguments::new(6, 1)];
        buffer(&mut store, 1, bytemuck::cast_slice(&args).to_vec());
        buffer(&mut store, 2, 1u32.to_le_bytes().to_vec());
        buffer(&mut store, 3, vec![0; 16]);
        store
            .query_pools
            .insert(NativeHandle(4), QueryPoolMemory::new(QueryType::Occlusion, 2));

        let indirect = |counter| Command::ExecuteIndirect {
            command_type: IndirectCommandType::Draw,
            stride: 16,
            args_offset: 0,
            max_count: 2,
            buffer: NativeHandle(1),
            offset: 0,
            counter,
        };
        let commands = vec![
            Command::BeginQuery {
                pool: NativeHandle(4),
                query_type: QueryType::Occlusion,
                index: 0,
            },
            indirect(None),
            Command::EndQuery {
                pool: NativeHandle(4),
                query_type: QueryType::Occlusion,
                index: 0,
            },
            Command::BeginQuery {
                pool: NativeHandle(4),
                query_type: QueryType::Occlusion,
                index: 1,
            },
            indirect(Some((NativeHandle(2), 0))),
            Command::EndQuery {
                pool: NativeHandle(4),
                query_type: QueryType::Occlusion,
                index: 1,
            },
            Command::ResolveQuery {
                pool: NativeHandle(4),
                readback: NativeHandle(3),
                start: 0,
                count: 2,
            },
        ];
        let mut executor = Executor::new(&mut store, &logger, QueueType::Graphics, Instant::now());
        executor.run(&commands).unwrap();
        assert_eq!(executor.vertices(), 12 + 6);

        let data = &store.buffers[&NativeHandle(3)].data;
        assert_eq!(u64::from_le_bytes(data[..8].try_into().unwrap()), 12);
        // the counter caps the second call at one record
        assert_eq!(u64::from_le_bytes(data[8..].try_into().unwrap()), 6);
    }

    #[test]
    fn test_update_buffer_out_of_range() {
        let logger = Logger::default();
        let mut store = ResourceStore::default();
        buffer(&mut store, 1, vec![1, 2, 3, 4]);
        buffer(&mut store, 2, vec![0; 4]);
        let mut executor = Executor::new(&mut store, &logger, QueueType::Transfer, Instant::now());
        executor
            .run(&[Command::UpdateBuffer {
                dst: NativeHandle(2),
                dst_offset: 1,
                src: NativeHandle(1),
                src_offset: 0,
                size: 3,
            }])
            .unwrap();
        assert!(executor
            .run(&[Command::UpdateBuffer {
                dst: NativeHandle(2),
                dst_offset: 2,
                src: NativeHandle(1),
                src_offset: 0,
                size: 3,
            }])
            .is_err());
        assert_eq!(store.buffers[&NativeHandle(2)].data, vec![0, 1, 2, 3]);
    }
}
