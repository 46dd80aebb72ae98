//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the render hardware interface.
///
/// Contract violations (stale barrier states, recording outside the
/// recording state, ...) are not represented here: they are fatal
/// assertions when validation is enabled. See [`crate::validation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// Failed to initialize the renderer or a backend.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A requested feature is not supported by the active backend.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// The memory allocator could not satisfy the request.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A wait on a fence or queue exceeded the configured timeout.
    #[error("wait timed out")]
    Timeout,
    /// The swapchain no longer matches its surface.
    #[error("surface outdated, needs reconfiguration")]
    SurfaceOutdated,
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type GraphicsResult<T> = Result<T, GraphicsError>;
