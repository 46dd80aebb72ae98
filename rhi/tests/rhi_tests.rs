//! End-to-end tests over the public renderer API.
//!
//! Every case runs on the null backend and, when compiled in, the software
//! backend. Pixel and query results are only checked where commands execute.

mod common;

use std::sync::Arc;

use common::{rgba8_pixel, Backend, FakeWindow, TestContext};
use rstest::rstest;

use redlilium_rhi::{
    BinaryShaderDesc, BinaryShaderStageDesc, BindRenderTargetsDesc, BufferBarrier, BufferDesc, ClearValue,
    CmdDesc, CmdPoolDesc, CmdState, DescriptorData, DescriptorSetDesc, DescriptorSlot, DescriptorType,
    DescriptorUpdateFrequency, FenceStatus, GraphicsError, LoadActionsDesc, MemoryBudget, PipelineCacheDesc,
    QueryPool, QueryPoolDesc, QueryType, QueueDesc, QueuePresentDesc, QueueSubmitDesc, QueueType,
    RenderTargetBarrier, ResourceMemoryUsage, ResourceState, ShaderReflection, ShaderResource, ShaderStage,
    SwapChainDesc, TextureFormat, ValidationMode,
};

const WIDTH: u32 = 4;
const HEIGHT: u32 = 4;

// ============================================================================
// Rendering
// ============================================================================

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_clear_and_readback(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {:?} backend not available", backend.api());
        return;
    };

    let target = ctx.render_target(WIDTH, HEIGHT, TextureFormat::Rgba8Unorm);
    let readback = ctx.readback((WIDTH * HEIGHT * 4) as u64);
    let shader = ctx.graphics_shader(b"solid");
    let root_signature = ctx.root_signature(&[&shader]);
    let pipeline = ctx.graphics_pipeline(&shader, &root_signature, TextureFormat::Rgba8Unorm, None);

    let load_actions = LoadActionsDesc::default().with_clear_color(0, ClearValue::color(0.0, 0.0, 0.0, 1.0));
    let targets = [target.as_ref()];

    let mut cmd = ctx.cmd();
    cmd.begin();
    cmd.resource_barrier(
        &[],
        &[],
        &[RenderTargetBarrier::transition(
            &target,
            ResourceState::UNDEFINED,
            ResourceState::RENDER_TARGET,
        )],
    );
    cmd.bind_render_targets(&BindRenderTargetsDesc::new(&targets).with_load_actions(&load_actions));
    cmd.bind_pipeline(&pipeline);
    cmd.draw(3, 0);
    cmd.bind_render_targets(&BindRenderTargetsDesc::default());
    cmd.resource_barrier(
        &[],
        &[],
        &[RenderTargetBarrier::transition(
            &target,
            ResourceState::RENDER_TARGET,
            ResourceState::COPY_SOURCE,
        )],
    );
    cmd.copy_texture_to_buffer(&readback, 0, target.texture(), 0, 0);
    cmd.resource_barrier(
        &[],
        &[],
        &[RenderTargetBarrier::transition(
            &target,
            ResourceState::COPY_SOURCE,
            ResourceState::PRESENT,
        )],
    );
    cmd.end();
    ctx.submit_and_wait(&[&cmd]);

    assert_eq!(ctx.renderer.tracked_state(target.id()), Some(ResourceState::PRESENT));

    let data = readback.read_mapped(0, readback.size()).unwrap();
    if backend.executes() {
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                assert_eq!(rgba8_pixel(&data, WIDTH, x, y), [0, 0, 0, 255], "pixel ({x}, {y})");
            }
        }
    } else {
        assert!(data.iter().all(|&b| b == 0));
    }
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_occlusion_query_counts_vertices(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let target = ctx.render_target(WIDTH, HEIGHT, TextureFormat::Rgba8Unorm);
    let shader = ctx.graphics_shader(b"solid");
    let root_signature = ctx.root_signature(&[&shader]);
    let pipeline = ctx.graphics_pipeline(&shader, &root_signature, TextureFormat::Rgba8Unorm, None);
    let queries = ctx
        .renderer
        .add_query_pool(&QueryPoolDesc::new(QueryType::Occlusion, 2))
        .unwrap();
    let readback = ctx.readback(2 * QueryPool::RESULT_SIZE);
    let targets = [target.as_ref()];

    let mut cmd = ctx.cmd();
    cmd.begin();
    cmd.resource_barrier(
        &[],
        &[],
        &[RenderTargetBarrier::transition(
            &target,
            ResourceState::UNDEFINED,
            ResourceState::RENDER_TARGET,
        )],
    );
    cmd.bind_render_targets(&BindRenderTargetsDesc::new(&targets));
    cmd.bind_pipeline(&pipeline);
    cmd.begin_query(&queries, 0);
    cmd.draw(3, 0);
    cmd.end_query(&queries, 0);
    cmd.begin_query(&queries, 1);
    cmd.draw(6, 0);
    cmd.draw(3, 0);
    cmd.end_query(&queries, 1);
    cmd.resolve_query(&queries, &readback, 0, 2);
    cmd.end();
    ctx.submit_and_wait(&[&cmd]);

    if backend.executes() {
        let results: Vec<u64> = readback.read_mapped_pod(0, 2).unwrap();
        assert_eq!(results, vec![3, 9]);
    }
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_timestamp_frequency(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };
    assert_eq!(ctx.renderer.get_timestamp_frequency(&ctx.queue), 1.0e9);
}

// ============================================================================
// Submission and synchronization
// ============================================================================

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_fence_and_cmd_lifecycle(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let fence = ctx.fence();
    assert_eq!(ctx.renderer.get_fence_status(&fence), FenceStatus::NotSubmitted);

    let mut cmd = ctx.cmd();
    assert_eq!(cmd.state(), CmdState::Initial);
    cmd.begin();
    assert_eq!(cmd.state(), CmdState::Recording);
    cmd.end();
    assert_eq!(cmd.state(), CmdState::Executable);

    let cmds = [&cmd];
    ctx.renderer
        .queue_submit(&ctx.queue, &QueueSubmitDesc::new(&cmds).with_signal_fence(&fence))
        .unwrap();
    ctx.renderer.wait_for_fences(&[&fence]).unwrap();
    assert_eq!(ctx.renderer.get_fence_status(&fence), FenceStatus::Complete);
    assert_eq!(cmd.state(), CmdState::Completed);

    // A completed command buffer may be recorded again.
    cmd.begin();
    cmd.end();
    ctx.submit_and_wait(&[&cmd]);
    ctx.renderer.wait_queue_idle(&ctx.queue).unwrap();
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_cmd_completed_once_fence_wait_returns(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let mut cmd = ctx.cmd();
    let fence = ctx.fence();
    for _ in 0..2000 {
        cmd.begin();
        cmd.end();
        let cmds = [&cmd];
        ctx.renderer
            .queue_submit(&ctx.queue, &QueueSubmitDesc::new(&cmds).with_signal_fence(&fence))
            .unwrap();
        ctx.renderer.wait_for_fences(&[&fence]).unwrap();
        assert_eq!(cmd.state(), CmdState::Completed);
    }
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_memory_budget_exhaustion(#[case] backend: Backend) {
    let desc = backend
        .renderer_desc()
        .with_memory_budget(MemoryBudget::new(4096, 4096));
    let Some(ctx) = TestContext::with_desc(backend, desc) else {
        return;
    };

    let device_local = |size| BufferDesc::new(size, ResourceMemoryUsage::GpuOnly, DescriptorType::BUFFER);
    let resident = ctx.renderer.add_buffer(&device_local(2048)).unwrap();
    let before = ctx.renderer.calculate_memory_use();

    assert!(matches!(
        ctx.renderer.add_buffer(&device_local(1 << 20)),
        Err(GraphicsError::OutOfMemory)
    ));
    assert_eq!(ctx.renderer.calculate_memory_use(), before);

    // Only 2048 bytes of the device-local heap remain.
    assert!(matches!(
        ctx.renderer.add_buffer(&device_local(4096)),
        Err(GraphicsError::OutOfMemory)
    ));
    assert_eq!(ctx.renderer.calculate_memory_use(), before);

    // The host-visible heap has its own budget.
    let staging = ctx.renderer.add_buffer(&BufferDesc::upload(2048)).unwrap();
    assert_eq!(ctx.renderer.calculate_memory_use().0, before.0 + 2048);

    // Freed memory becomes available again.
    ctx.renderer.remove_buffer(resident);
    ctx.renderer.add_buffer(&device_local(4096)).unwrap();
    drop(staging);
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_cross_queue_semaphore(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let compute_queue = ctx.renderer.add_queue(&QueueDesc::new(QueueType::Compute)).unwrap();
    let compute_pool = ctx.renderer.add_cmd_pool(&CmdPoolDesc::new(&compute_queue)).unwrap();
    let mut producer = ctx.renderer.add_cmd(&CmdDesc::new(&compute_pool)).unwrap();
    let mut consumer = ctx.cmd();
    let semaphore = ctx.renderer.add_semaphore().unwrap();
    let fence = ctx.fence();

    producer.begin();
    producer.end();
    consumer.begin();
    consumer.end();

    let signals = [&semaphore];
    let producers = [&producer];
    ctx.renderer
        .queue_submit(&compute_queue, &QueueSubmitDesc::new(&producers).with_signal_semaphores(&signals))
        .unwrap();
    let consumers = [&consumer];
    ctx.renderer
        .queue_submit(
            &ctx.queue,
            &QueueSubmitDesc::new(&consumers)
                .with_wait_semaphores(&signals)
                .with_signal_fence(&fence),
        )
        .unwrap();
    ctx.renderer.wait_for_fences(&[&fence]).unwrap();

    assert_eq!(consumer.state(), CmdState::Completed);
    ctx.renderer.wait_queue_idle(&compute_queue).unwrap();
    assert_eq!(producer.state(), CmdState::Completed);
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
#[should_panic(expected = "which nothing will signal")]
fn test_wait_on_unsignaled_semaphore_panics(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        panic!("which nothing will signal (backend unavailable)");
    };
    let semaphore = ctx.renderer.add_semaphore().unwrap();
    let mut cmd = ctx.cmd();
    cmd.begin();
    cmd.end();
    let cmds = [&cmd];
    let waits = [&semaphore];
    let _ = ctx
        .renderer
        .queue_submit(&ctx.queue, &QueueSubmitDesc::new(&cmds).with_wait_semaphores(&waits));
}

// ============================================================================
// Contract violations
// ============================================================================

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
#[should_panic(expected = "expected Recording")]
fn test_draw_before_begin_panics(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        panic!("expected Recording (backend unavailable)");
    };
    let mut cmd = ctx.cmd();
    cmd.draw(3, 0);
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
#[should_panic(expected = "expected Initial or Completed")]
fn test_begin_while_executable_panics(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        panic!("expected Initial or Completed (backend unavailable)");
    };
    let mut cmd = ctx.cmd();
    cmd.begin();
    cmd.end();
    cmd.begin();
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
#[should_panic(expected = "stale current state")]
fn test_stale_barrier_panics(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        panic!("stale current state (backend unavailable)");
    };
    let target = ctx.render_target(WIDTH, HEIGHT, TextureFormat::Rgba8Unorm);
    let mut cmd = ctx.cmd();
    cmd.begin();
    cmd.resource_barrier(
        &[],
        &[],
        &[RenderTargetBarrier::transition(
            &target,
            ResourceState::UNDEFINED,
            ResourceState::RENDER_TARGET,
        )],
    );
    // The target is in RENDER_TARGET, not SHADER_RESOURCE.
    cmd.resource_barrier(
        &[],
        &[],
        &[RenderTargetBarrier::transition(
            &target,
            ResourceState::SHADER_RESOURCE,
            ResourceState::COPY_SOURCE,
        )],
    );
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
#[should_panic(expected = "outside a render pass")]
fn test_draw_outside_pass_panics(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        panic!("outside a render pass (backend unavailable)");
    };
    let shader = ctx.graphics_shader(b"solid");
    let root_signature = ctx.root_signature(&[&shader]);
    let pipeline = ctx.graphics_pipeline(&shader, &root_signature, TextureFormat::Rgba8Unorm, None);
    let mut cmd = ctx.cmd();
    cmd.begin();
    cmd.bind_pipeline(&pipeline);
    cmd.draw(3, 0);
}

// ============================================================================
// Queue ownership transfer
// ============================================================================

fn storage_buffer(ctx: &TestContext) -> Arc<redlilium_rhi::Buffer> {
    ctx.renderer
        .add_buffer(
            &BufferDesc::new(256, ResourceMemoryUsage::GpuOnly, DescriptorType::RW_BUFFER)
                .with_start_state(ResourceState::UNORDERED_ACCESS),
        )
        .unwrap()
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_ownership_transfer_compute_to_graphics(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let compute_queue = ctx.renderer.add_queue(&QueueDesc::new(QueueType::Compute)).unwrap();
    let compute_pool = ctx.renderer.add_cmd_pool(&CmdPoolDesc::new(&compute_queue)).unwrap();
    let buffer = storage_buffer(&ctx);
    let semaphore = ctx.renderer.add_semaphore().unwrap();

    let mut release = ctx.renderer.add_cmd(&CmdDesc::new(&compute_pool)).unwrap();
    release.begin();
    release.resource_barrier(
        &[BufferBarrier::transition(
            &buffer,
            ResourceState::UNORDERED_ACCESS,
            ResourceState::SHADER_RESOURCE,
        )
        .release_to(QueueType::Graphics)],
        &[],
        &[],
    );
    release.end();

    let mut acquire = ctx.cmd();
    acquire.begin();
    acquire.resource_barrier(
        &[BufferBarrier::transition(
            &buffer,
            ResourceState::UNORDERED_ACCESS,
            ResourceState::SHADER_RESOURCE,
        )
        .acquire_from(QueueType::Compute)],
        &[],
        &[],
    );
    acquire.end();

    let signals = [&semaphore];
    let releases = [&release];
    ctx.renderer
        .queue_submit(&compute_queue, &QueueSubmitDesc::new(&releases).with_signal_semaphores(&signals))
        .unwrap();
    let acquires = [&acquire];
    let fence = ctx.fence();
    ctx.renderer
        .queue_submit(
            &ctx.queue,
            &QueueSubmitDesc::new(&acquires)
                .with_wait_semaphores(&signals)
                .with_signal_fence(&fence),
        )
        .unwrap();
    ctx.renderer.wait_for_fences(&[&fence]).unwrap();
    ctx.renderer.wait_queue_idle(&compute_queue).unwrap();

    assert_eq!(ctx.renderer.tracked_state(buffer.id()), Some(ResourceState::SHADER_RESOURCE));

    let TestContext { renderer, log, .. } = ctx;
    drop(renderer);
    assert!(
        !log.warnings().iter().any(|w| w.contains("was never acquired")),
        "{:?}",
        log.warnings()
    );
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_unmatched_release_is_reported(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let compute_queue = ctx.renderer.add_queue(&QueueDesc::new(QueueType::Compute)).unwrap();
    let compute_pool = ctx.renderer.add_cmd_pool(&CmdPoolDesc::new(&compute_queue)).unwrap();
    let buffer = storage_buffer(&ctx);

    let mut release = ctx.renderer.add_cmd(&CmdDesc::new(&compute_pool)).unwrap();
    release.begin();
    release.resource_barrier(
        &[BufferBarrier::transition(
            &buffer,
            ResourceState::UNORDERED_ACCESS,
            ResourceState::SHADER_RESOURCE,
        )
        .release_to(QueueType::Graphics)],
        &[],
        &[],
    );
    release.end();

    let TestContext { renderer, log, .. } = ctx;
    drop(renderer);

    let warnings = log.warnings();
    assert!(
        warnings.iter().any(|w| w.contains("was never acquired")),
        "{warnings:?}"
    );
    drop(buffer);
}

// ============================================================================
// Descriptors and pipelines
// ============================================================================

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_descriptor_ring_instances_are_isolated(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let shader = ctx
        .renderer
        .add_shader_binary(
            &BinaryShaderDesc::new("per_draw").with_stage(
                BinaryShaderStageDesc::new(ShaderStage::COMP, b"cs".to_vec()).with_reflection(
                    ShaderReflection::new(ShaderStage::COMP)
                        .with_resource(ShaderResource::new("params", DescriptorType::UNIFORM_BUFFER, 3, 0)),
                ),
            ),
        )
        .unwrap();
    let root_signature = ctx.root_signature(&[&shader]);
    let set = ctx
        .renderer
        .add_descriptor_set(&DescriptorSetDesc::new(&root_signature, DescriptorUpdateFrequency::PerDraw, 3))
        .unwrap();

    let uniform = |size| {
        ctx.renderer
            .add_buffer(&BufferDesc::new(size, ResourceMemoryUsage::CpuToGpu, DescriptorType::UNIFORM_BUFFER))
            .unwrap()
    };
    let first = uniform(256);
    let second = uniform(512);

    ctx.renderer
        .update_descriptor_set(0, &set, &[DescriptorData::buffers("params", &[first.as_ref()])]);
    ctx.renderer
        .update_descriptor_set(1, &set, &[DescriptorData::buffers(0u32, &[second.as_ref()])]);

    let bound = |index| set.bound(index, DescriptorSlot::Name("params"), 0).map(|b| b.resource);
    assert_eq!(bound(0), Some(first.id()));
    assert_eq!(bound(1), Some(second.id()));
    assert_eq!(bound(2), None);

    // Rewriting one instance leaves the others alone.
    ctx.renderer
        .update_descriptor_set(0, &set, &[DescriptorData::buffers("params", &[second.as_ref()])]);
    assert_eq!(bound(0), Some(second.id()));
    assert_eq!(bound(1), Some(second.id()));
    assert_eq!(bound(2), None);
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_pipeline_cache_round_trip(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let shader = ctx.graphics_shader(b"cached");
    let root_signature = ctx.root_signature(&[&shader]);

    let cache = ctx.renderer.add_pipeline_cache(&PipelineCacheDesc::default()).unwrap();
    let _pipeline = ctx.graphics_pipeline(&shader, &root_signature, TextureFormat::Rgba8Unorm, Some(&cache));
    let blob = ctx.renderer.get_pipeline_cache_data(&cache).unwrap();
    ctx.renderer.remove_pipeline_cache(cache);

    let restored = ctx
        .renderer
        .add_pipeline_cache(&PipelineCacheDesc::from_data(&blob))
        .unwrap();
    let _pipeline = ctx.graphics_pipeline(&shader, &root_signature, TextureFormat::Rgba8Unorm, Some(&restored));

    if backend.executes() {
        assert!(!blob.is_empty());
        let stats = restored.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }
}

// ============================================================================
// Presentation
// ============================================================================

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_swap_chain_acquire_and_present(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };

    let format = ctx.renderer.get_recommended_swapchain_format(false);
    let queues = [&ctx.queue];
    let swap_chain = ctx
        .renderer
        .add_swap_chain(&FakeWindow, &SwapChainDesc::new(&queues, 8, 8).with_format(format))
        .unwrap();
    assert_eq!(swap_chain.image_count(), 2);

    let acquired = ctx.renderer.add_semaphore().unwrap();
    let rendered = ctx.renderer.add_semaphore().unwrap();
    let fence = ctx.fence();

    for _ in 0..3 {
        let index = ctx.renderer.acquire_next_image(&swap_chain, Some(&acquired), None).unwrap();
        let image = swap_chain.image(index).unwrap();
        assert_eq!(ctx.renderer.tracked_state(image.id()), Some(ResourceState::PRESENT));

        let targets = [image.as_ref()];
        let mut cmd = ctx.cmd();
        cmd.begin();
        cmd.resource_barrier(
            &[],
            &[],
            &[RenderTargetBarrier::transition(
                image,
                ResourceState::PRESENT,
                ResourceState::RENDER_TARGET,
            )],
        );
        cmd.bind_render_targets(&BindRenderTargetsDesc::new(&targets));
        cmd.resource_barrier(
            &[],
            &[],
            &[RenderTargetBarrier::transition(
                image,
                ResourceState::RENDER_TARGET,
                ResourceState::PRESENT,
            )],
        );
        cmd.end();

        let cmds = [&cmd];
        let waits = [&acquired];
        let signals = [&rendered];
        ctx.renderer
            .queue_submit(
                &ctx.queue,
                &QueueSubmitDesc::new(&cmds)
                    .with_wait_semaphores(&waits)
                    .with_signal_semaphores(&signals)
                    .with_signal_fence(&fence),
            )
            .unwrap();
        ctx.renderer
            .queue_present(&ctx.queue, &QueuePresentDesc::new(&swap_chain, index).with_wait_semaphores(&signals))
            .unwrap();
        ctx.renderer.wait_for_fences(&[&fence]).unwrap();
    }

    ctx.renderer.wait_queue_idle(&ctx.queue).unwrap();
    assert_eq!(swap_chain.presented_count(), 3);
}

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_toggle_vsync(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };
    let queues = [&ctx.queue];
    let mut swap_chain = ctx
        .renderer
        .add_swap_chain(&FakeWindow, &SwapChainDesc::new(&queues, 8, 8))
        .unwrap();
    assert!(swap_chain.vsync());
    ctx.renderer.toggle_vsync(&mut swap_chain);
    assert!(!swap_chain.vsync());
    ctx.renderer.toggle_vsync(&mut swap_chain);
    assert!(swap_chain.vsync());
}

// ============================================================================
// Logging
// ============================================================================

#[rstest]
#[case::null(Backend::Null)]
#[case::software(Backend::Software)]
fn test_log_callback_receives_warnings(#[case] backend: Backend) {
    let desc = backend.renderer_desc().with_validation(ValidationMode::Disabled);
    let Some(ctx) = TestContext::with_desc(backend, desc) else {
        return;
    };
    assert!(!ctx.renderer.is_validation_enabled());

    let shader = ctx.graphics_shader(b"solid");
    let root_signature = ctx.root_signature(&[&shader]);
    let set = ctx
        .renderer
        .add_descriptor_set(&DescriptorSetDesc::new(&root_signature, DescriptorUpdateFrequency::None, 1))
        .unwrap();
    let buffer = ctx.renderer.add_buffer(&BufferDesc::upload(64)).unwrap();

    // Without validation a bad update is skipped with a warning.
    ctx.renderer
        .update_descriptor_set(0, &set, &[DescriptorData::buffers("missing", &[buffer.as_ref()])]);
    assert!(ctx
        .log
        .warnings()
        .iter()
        .any(|w| w.contains("unresolved slot")));
    assert!(ctx.log.errors().is_empty());

    let TestContext { renderer, log, .. } = ctx;
    drop(renderer);
    assert!(log.warnings().iter().any(|w| w.contains("live object")));
    drop((set, buffer));
}
