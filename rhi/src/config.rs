//! Renderer configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::allocator::{MemoryAllocator, MemoryBudget};
use crate::logging::LogCallback;
use crate::shader::ShaderReflector;

/// Environment variable selecting the backend (`null` or `software`).
pub const ENV_API: &str = "REDLILIUM_RHI_API";
/// Environment variable selecting validation (`0`, `1` or `auto`).
pub const ENV_VALIDATION: &str = "REDLILIUM_RHI_VALIDATION";

/// Backend implementation, chosen once at renderer creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RendererApi {
    /// Implicit-tracking backend that executes nothing.
    Null,
    /// Explicit-barrier CPU reference backend.
    #[default]
    Software,
}

impl RendererApi {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "null" | "dummy" => Some(Self::Null),
            "software" | "cpu" => Some(Self::Software),
            _ => None,
        }
    }
}

/// Multi-GPU mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GpuMode {
    #[default]
    Single,
    /// Linked adapters exposed as nodes of one device.
    Linked,
}

/// Whether contract validation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValidationMode {
    /// Enabled in debug builds, disabled in release builds.
    #[default]
    Auto,
    Enabled,
    Disabled,
}

impl ValidationMode {
    pub fn is_enabled(self) -> bool {
        match self {
            Self::Auto => cfg!(debug_assertions),
            Self::Enabled => true,
            Self::Disabled => false,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "1" | "on" | "true" => Some(Self::Enabled),
            "0" | "off" | "false" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Settings for the software backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareBackendConfig {
    /// Nodes reported in [`GpuMode::Linked`].
    pub linked_node_count: u32,
    /// Artificial delay per executed submission; makes in-flight work observable.
    pub submission_latency: Duration,
    /// Whether raytracing pipelines are accepted.
    pub raytracing: bool,
}

impl Default for SoftwareBackendConfig {
    fn default() -> Self {
        Self {
            linked_node_count: 2,
            submission_latency: Duration::ZERO,
            raytracing: false,
        }
    }
}

/// Descriptor for [`crate::Renderer::new`].
#[derive(Clone)]
pub struct RendererDesc {
    pub api: RendererApi,
    pub gpu_mode: GpuMode,
    pub validation: ValidationMode,
    /// Receives warnings and errors, including backend failures.
    pub log_fn: Option<LogCallback>,
    /// External memory allocator; a [`crate::allocator::BudgetAllocator`] is used when unset.
    pub allocator: Option<Arc<dyn MemoryAllocator>>,
    /// Budget of the default allocator.
    pub memory_budget: MemoryBudget,
    /// Produces reflection for shaders created without it.
    pub shader_reflector: Option<Arc<dyn ShaderReflector>>,
    /// Upper bound for `wait_for_fences` and `wait_queue_idle`.
    pub wait_timeout: Duration,
    pub software: SoftwareBackendConfig,
}

impl Default for RendererDesc {
    fn default() -> Self {
        Self {
            api: RendererApi::default(),
            gpu_mode: GpuMode::default(),
            validation: ValidationMode::default(),
            log_fn: None,
            allocator: None,
            memory_budget: MemoryBudget::default(),
            shader_reflector: None,
            wait_timeout: Duration::from_secs(10),
            software: SoftwareBackendConfig::default(),
        }
    }
}

impl RendererDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api(mut self, api: RendererApi) -> Self {
        self.api = api;
        self
    }

    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_gpu_mode(mut self, gpu_mode: GpuMode) -> Self {
        self.gpu_mode = gpu_mode;
        self
    }

    pub fn with_log_fn(mut self, log_fn: LogCallback) -> Self {
        self.log_fn = Some(log_fn);
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn MemoryAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn with_memory_budget(mut self, budget: MemoryBudget) -> Self {
        self.memory_budget = budget;
        self
    }

    pub fn with_shader_reflector(mut self, reflector: Arc<dyn ShaderReflector>) -> Self {
        self.shader_reflector = Some(reflector);
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_software_config(mut self, config: SoftwareBackendConfig) -> Self {
        self.software = config;
        self
    }

    /// Apply [`ENV_API`] and [`ENV_VALIDATION`] overrides. Unparseable values
    /// are ignored with a warning.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_API) {
            match RendererApi::parse(&value) {
                Some(api) => self.api = api,
                None => log::warn!("ignoring {ENV_API}={value:?}"),
            }
        }
        if let Some(value) = lookup(ENV_VALIDATION) {
            match ValidationMode::parse(&value) {
                Some(mode) => self.validation = mode,
                None => log::warn!("ignoring {ENV_VALIDATION}={value:?}"),
            }
        }
        self
    }
}

impl fmt::Debug for RendererDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererDesc")
            .field("api", &self.api)
            .field("gpu_mode", &self.gpu_mode)
            .field("validation", &self.validation)
            .field("log_fn", &self.log_fn.is_some())
            .field("allocator", &self.allocator.is_some())
            .field("memory_budget", &self.memory_budget)
            .field("shader_reflector", &self.shader_reflector.is_some())
            .field("wait_timeout", &self.wait_timeout)
            .field("software", &self.software)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api() {
        assert_eq!(RendererApi::parse("NULL"), Some(RendererApi::Null));
        assert_eq!(RendererApi::parse(" software "), Some(RendererApi::Software));
        assert_eq!(RendererApi::parse("vulkan"), None);
    }

    #[test]
    fn test_validation_mode() {
        assert!(ValidationMode::Enabled.is_enabled());
        assert!(!ValidationMode::Disabled.is_enabled());
        assert_eq!(ValidationMode::Auto.is_enabled(), cfg!(debug_assertions));
        assert_eq!(ValidationMode::parse("off"), Some(ValidationMode::Disabled));
    }

    #[test]
    fn test_overrides() {
        let desc = RendererDesc::new()
            .with_api(RendererApi::Software)
            .with_overrides_from(|key| match key {
                ENV_API => Some("null".to_string()),
                ENV_VALIDATION => Some("bogus".to_string()),
                _ => None,
            });
        assert_eq!(desc.api, RendererApi::Null);
        assert_eq!(desc.validation, ValidationMode::Auto);
    }
}
