//! Common types shared across the RHI.

use super::ClearValue;

/// Maximum number of simultaneously bound color attachments.
pub const MAX_RENDER_TARGET_ATTACHMENTS: usize = 8;

/// Maximum number of vertex attributes in a [`crate::VertexLayout`].
pub const MAX_VERTEX_ATTRIBS: usize = 15;

// ============================================================================
// Viewport
// ============================================================================

/// Viewport configuration for rendering.
///
/// Depth range is `[0, 1]` and the origin is the top-left corner.
///
/// # Example
///
/// ```ignore
/// cmd.set_viewport(Viewport::new(0.0, 0.0, 1920.0, 1080.0).with_depth_range(0.0, 0.5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Minimum depth value (default: 0.0).
    pub min_depth: f32,
    /// Maximum depth value (default: 1.0).
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Viewport {
    /// Create a new viewport with standard `[0, 1]` depth range.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Create a viewport from dimensions with origin at (0, 0).
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    /// Set the depth range. Reverse-Z (`min > max`) is allowed.
    pub fn with_depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }
}

// ============================================================================
// Scissor Rectangle
// ============================================================================

/// Scissor rectangle for clipping rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a scissor rectangle from dimensions with origin at (0, 0).
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

// ============================================================================
// Extent3d
// ============================================================================

/// 3D extent for textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    /// Depth in texels (1 for 2D textures).
    pub depth: u32,
}

impl Extent3d {
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Extent of the given mip level (each dimension clamped to 1).
    pub fn mip_level(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth: (self.depth >> level).max(1),
        }
    }

    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }
}

// ============================================================================
// Load actions
// ============================================================================

/// What happens to an attachment's contents when a render pass opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadActionType {
    #[default]
    DontCare,
    Load,
    Clear,
}

/// Per-attachment load behavior for [`crate::Cmd::bind_render_targets`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadActionsDesc {
    pub clear_color_values: [ClearValue; MAX_RENDER_TARGET_ATTACHMENTS],
    pub load_actions_color: [LoadActionType; MAX_RENDER_TARGET_ATTACHMENTS],
    pub clear_depth: ClearValue,
    pub load_action_depth: LoadActionType,
    pub load_action_stencil: LoadActionType,
}

impl Default for LoadActionsDesc {
    fn default() -> Self {
        Self {
            clear_color_values: [ClearValue::default(); MAX_RENDER_TARGET_ATTACHMENTS],
            load_actions_color: [LoadActionType::DontCare; MAX_RENDER_TARGET_ATTACHMENTS],
            clear_depth: ClearValue::depth_stencil(1.0, 0),
            load_action_depth: LoadActionType::DontCare,
            load_action_stencil: LoadActionType::DontCare,
        }
    }
}

impl LoadActionsDesc {
    /// Load every attachment.
    pub fn load_all() -> Self {
        Self {
            load_actions_color: [LoadActionType::Load; MAX_RENDER_TARGET_ATTACHMENTS],
            load_action_depth: LoadActionType::Load,
            load_action_stencil: LoadActionType::Load,
            ..Default::default()
        }
    }

    /// Clear color attachment `index` to `value`.
    pub fn with_clear_color(mut self, index: usize, value: ClearValue) -> Self {
        self.clear_color_values[index] = value;
        self.load_actions_color[index] = LoadActionType::Clear;
        self
    }

    /// Clear depth (and stencil) to `value`.
    pub fn with_clear_depth(mut self, value: ClearValue) -> Self {
        self.clear_depth = value;
        self.load_action_depth = LoadActionType::Clear;
        self.load_action_stencil = LoadActionType::Clear;
        self
    }
}
