//! State shared by a renderer and every object created through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::allocator::MemoryAllocator;
use crate::backend::Backend;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::IdAllocator;
use crate::logging::Logger;
use crate::renderer::GpuSettings;
use crate::shader::ShaderReflector;
use crate::validation::Validator;

/// Device-level state owned by a [`crate::Renderer`].
///
/// Objects keep an `Arc` to it so their backend storage can be released from
/// `Drop` even after the renderer itself is gone.
pub(crate) struct RendererContext {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) validator: Validator,
    pub(crate) logger: Logger,
    pub(crate) ids: IdAllocator,
    pub(crate) allocator: Arc<dyn MemoryAllocator>,
    pub(crate) shader_reflector: Option<Arc<dyn ShaderReflector>>,
    pub(crate) settings: GpuSettings,
    pub(crate) linked_node_count: u32,
    pub(crate) wait_timeout: Duration,
    destroyed: AtomicBool,
}

impl RendererContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        backend: Box<dyn Backend>,
        validator: Validator,
        logger: Logger,
        allocator: Arc<dyn MemoryAllocator>,
        shader_reflector: Option<Arc<dyn ShaderReflector>>,
        linked_node_count: u32,
        wait_timeout: Duration,
    ) -> Self {
        let settings = backend.gpu_settings();
        Self {
            backend,
            validator,
            logger,
            ids: IdAllocator::new(),
            allocator,
            shader_reflector,
            settings,
            linked_node_count,
            wait_timeout,
            destroyed: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Contract check: the owning renderer has not been removed.
    #[track_caller]
    pub(crate) fn check_alive(&self, what: &str) {
        self.validator
            .check(!self.is_destroyed(), || format!("{what} used after its renderer was removed"));
    }

    /// `Err(DeviceLost)` once the backend has failed.
    pub(crate) fn ensure_not_lost(&self) -> GraphicsResult<()> {
        if self.backend.is_lost() {
            Err(GraphicsError::DeviceLost)
        } else {
            Ok(())
        }
    }

    /// Validate a node index against the linked node count.
    #[track_caller]
    pub(crate) fn check_node(&self, node_index: u32, what: &str) {
        self.validator.check(node_index < self.linked_node_count, || {
            format!(
                "{what}: node index {node_index} out of range (linked node count {})",
                self.linked_node_count
            )
        });
    }
}

impl std::fmt::Debug for RendererContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererContext")
            .field("backend", &self.backend.name())
            .field("validation", &self.validator.enabled())
            .field("linked_node_count", &self.linked_node_count)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::allocator::{BudgetAllocator, MemoryBudget};
    use crate::backend::null::NullBackend;

    /// A context over the null backend with validation enabled.
    pub(crate) fn null_context() -> Arc<RendererContext> {
        let logger = Logger::default();
        Arc::new(RendererContext::new(
            Box::new(NullBackend::new(1, logger.clone())),
            Validator::new(true, logger.clone()),
            logger,
            Arc::new(BudgetAllocator::new(MemoryBudget::default())),
            None,
            1,
            Duration::from_secs(1),
        ))
    }
}
