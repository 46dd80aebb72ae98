//! GPU resource handles.
//!
//! Every resource keeps the device context alive and releases its backend
//! storage and memory allocation when the last `Arc` is dropped. Command
//! buffers and descriptor sets reference resources by handle and do not keep
//! them alive; dropping a resource still referenced by unexecuted work is a
//! caller error.

mod buffer;
mod render_target;
mod sampler;
mod texture;

pub use buffer::Buffer;
pub use render_target::RenderTarget;
pub use sampler::Sampler;
pub use texture::{max_mip_levels, Texture};

pub(crate) use texture::texture_byte_size;
