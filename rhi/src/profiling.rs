//! Profiling support via Tracy.
//!
//! Enable the `profiling` feature to instrument queue submission, presentation
//! and fence waits:
//!
//! ```toml
//! [dependencies]
//! redlilium-rhi = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! When the feature is disabled (the default) every macro compiles to nothing.

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client};

/// Start the Tracy client. Called once by [`crate::Renderer::new`].
#[cfg(feature = "profiling")]
pub fn init() {
    let _client = Client::start();
}

/// Start the Tracy client (no-op when profiling disabled).
#[cfg(not(feature = "profiling"))]
pub fn init() {}

/// Mark a frame boundary. Called on every present.
#[cfg(feature = "profiling")]
pub fn frame_mark() {
    if let Some(client) = Client::running() {
        client.frame_mark();
    }
}

/// Mark a frame boundary (no-op when profiling disabled).
#[cfg(not(feature = "profiling"))]
pub fn frame_mark() {}

/// Create a profiling span for the current scope.
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|client| client.span_alloc(Some($name), "", file!(), line!(), 0));
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span named after the enclosing module.
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|client| client.span_alloc(None, module_path!(), file!(), line!(), 0));
    };
}

/// Create a profiling span for a function (no-op when profiling disabled).
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

pub(crate) use {profile_function, profile_scope};
