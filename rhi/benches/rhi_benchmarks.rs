use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_rhi::{
    BinaryShaderDesc, BinaryShaderStageDesc, BindRenderTargetsDesc, Buffer, BufferDesc, CmdDesc, CmdPoolDesc,
    DescriptorData, DescriptorSetDesc, DescriptorType, DescriptorUpdateFrequency, GraphicsPipelineDesc,
    PipelineDesc, QueueDesc, QueueType, RenderTarget, RenderTargetBarrier, RenderTargetDesc, Renderer,
    RendererApi, RendererDesc, ResourceMemoryUsage, ResourceState, RootSignatureDesc, ShaderReflection,
    ShaderResource, ShaderStage, TextureFormat, ValidationMode,
};

const TARGET_COUNT: usize = 32;

fn renderer() -> Renderer {
    Renderer::new(
        "rhi-bench",
        &RendererDesc::new()
            .with_api(RendererApi::Null)
            .with_validation(ValidationMode::Disabled),
    )
    .unwrap()
}

fn render_targets(renderer: &Renderer, count: usize) -> Vec<Arc<RenderTarget>> {
    (0..count)
        .map(|_| {
            renderer
                .add_render_target(&RenderTargetDesc::new(64, 64, TextureFormat::Rgba8Unorm))
                .unwrap()
        })
        .collect()
}

fn transitions(targets: &[Arc<RenderTarget>], from: ResourceState, to: ResourceState) -> Vec<RenderTargetBarrier<'_>> {
    targets
        .iter()
        .map(|target| RenderTargetBarrier::transition(target, from, to))
        .collect()
}

// ---------------------------------------------------------------------------
// Barriers
// ---------------------------------------------------------------------------

fn bench_barriers_batched(c: &mut Criterion) {
    let renderer = renderer();
    let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
    let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(&queue)).unwrap();
    let mut cmd = renderer.add_cmd(&CmdDesc::new(&pool)).unwrap();
    let targets = render_targets(&renderer, TARGET_COUNT);
    let to_read = transitions(&targets, ResourceState::RENDER_TARGET, ResourceState::SHADER_RESOURCE);
    let to_write = transitions(&targets, ResourceState::SHADER_RESOURCE, ResourceState::RENDER_TARGET);

    c.bench_function("barriers_32_targets_batched", |b| {
        b.iter(|| {
            cmd.begin();
            cmd.resource_barrier(&[], &[], &to_read);
            cmd.resource_barrier(&[], &[], &to_write);
            cmd.end();
            black_box(cmd.command_count());
        });
    });
}

fn bench_barriers_per_resource(c: &mut Criterion) {
    let renderer = renderer();
    let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
    let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(&queue)).unwrap();
    let mut cmd = renderer.add_cmd(&CmdDesc::new(&pool)).unwrap();
    let targets = render_targets(&renderer, TARGET_COUNT);
    let to_read = transitions(&targets, ResourceState::RENDER_TARGET, ResourceState::SHADER_RESOURCE);
    let to_write = transitions(&targets, ResourceState::SHADER_RESOURCE, ResourceState::RENDER_TARGET);

    c.bench_function("barriers_32_targets_one_by_one", |b| {
        b.iter(|| {
            cmd.begin();
            for barrier in &to_read {
                cmd.resource_barrier(&[], &[], std::slice::from_ref(barrier));
            }
            for barrier in &to_write {
                cmd.resource_barrier(&[], &[], std::slice::from_ref(barrier));
            }
            cmd.end();
            black_box(cmd.command_count());
        });
    });
}

// ---------------------------------------------------------------------------
// Descriptor updates
// ---------------------------------------------------------------------------

fn bench_descriptor_updates(c: &mut Criterion) {
    let renderer = renderer();
    let shader = renderer
        .add_shader_binary(
            &BinaryShaderDesc::new("bench").with_stage(
                BinaryShaderStageDesc::new(ShaderStage::COMP, b"cs".to_vec()).with_reflection(
                    ShaderReflection::new(ShaderStage::COMP)
                        .with_resource(ShaderResource::new("params", DescriptorType::UNIFORM_BUFFER, 3, 0))
                        .with_resource(ShaderResource::new("data", DescriptorType::BUFFER, 3, 1).with_size(4)),
                ),
            ),
        )
        .unwrap();
    let root_signature = renderer.add_root_signature(&RootSignatureDesc::new(&[&shader])).unwrap();
    let set = renderer
        .add_descriptor_set(&DescriptorSetDesc::new(&root_signature, DescriptorUpdateFrequency::PerDraw, 256))
        .unwrap();
    let uniform = renderer
        .add_buffer(&BufferDesc::new(256, ResourceMemoryUsage::CpuToGpu, DescriptorType::UNIFORM_BUFFER))
        .unwrap();
    let storage: Vec<Arc<Buffer>> = (0..4)
        .map(|_| {
            renderer
                .add_buffer(&BufferDesc::new(1024, ResourceMemoryUsage::GpuOnly, DescriptorType::BUFFER))
                .unwrap()
        })
        .collect();
    let storage_refs: Vec<&Buffer> = storage.iter().map(|b| b.as_ref()).collect();
    let uniform_refs = [uniform.as_ref()];

    c.bench_function("descriptor_update_256_instances", |b| {
        b.iter(|| {
            for index in 0..set.max_sets() {
                renderer.update_descriptor_set(
                    index,
                    &set,
                    &[
                        DescriptorData::buffers("params", &uniform_refs),
                        DescriptorData::buffers("data", &storage_refs),
                    ],
                );
            }
            black_box(&set);
        });
    });
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

fn bench_record_draws(c: &mut Criterion) {
    let renderer = renderer();
    let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
    let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(&queue)).unwrap();
    let mut cmd = renderer.add_cmd(&CmdDesc::new(&pool)).unwrap();
    let shader = renderer
        .add_shader_binary(
            &BinaryShaderDesc::new("solid")
                .with_stage(
                    BinaryShaderStageDesc::new(ShaderStage::VERT, b"vs".to_vec())
                        .with_reflection(ShaderReflection::new(ShaderStage::VERT)),
                )
                .with_stage(
                    BinaryShaderStageDesc::new(ShaderStage::FRAG, b"fs".to_vec())
                        .with_reflection(ShaderReflection::new(ShaderStage::FRAG)),
                ),
        )
        .unwrap();
    let root_signature = renderer.add_root_signature(&RootSignatureDesc::new(&[&shader])).unwrap();
    let formats = [TextureFormat::Rgba8Unorm];
    let pipeline = renderer
        .add_pipeline(&PipelineDesc::graphics(
            GraphicsPipelineDesc::new(&shader, &root_signature).with_color_formats(&formats),
        ))
        .unwrap();
    let targets = render_targets(&renderer, 1);
    let bound = [targets[0].as_ref()];

    c.bench_function("record_1000_draws", |b| {
        b.iter(|| {
            cmd.begin();
            cmd.bind_render_targets(&BindRenderTargetsDesc::new(&bound));
            cmd.bind_pipeline(&pipeline);
            for i in 0..1000 {
                cmd.draw(3, i * 3);
            }
            cmd.end();
            black_box(cmd.command_count());
        });
    });
}

criterion_group!(
    benches,
    bench_barriers_batched,
    bench_barriers_per_resource,
    bench_descriptor_updates,
    bench_record_draws,
);

criterion_main!(benches);
