//! Resource states.

use bitflags::bitflags;

bitflags! {
    /// The logical usage state of a buffer or texture.
    ///
    /// This is a bit set rather than an enum so a resource can satisfy several
    /// read roles at once. A write state is expected to stand alone; this is a
    /// caller contract and is not enforced here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        const UNDEFINED = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const SHADER_RESOURCE = 0x40 | 0x80;
        const STREAM_OUT = 0x100;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const GENERIC_READ = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
        const PRESENT = 0x1000;
        const COMMON = 0x2000;
        const RAYTRACING_ACCELERATION_STRUCTURE = 0x4000;
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl ResourceState {
    /// States that imply GPU writes.
    pub const WRITE_STATES: Self = Self::RENDER_TARGET
        .union(Self::UNORDERED_ACCESS)
        .union(Self::DEPTH_WRITE)
        .union(Self::STREAM_OUT)
        .union(Self::COPY_DEST);

    /// Returns true if any write state bit is set.
    pub fn has_write(self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    /// Returns true if the state is non-empty and contains only read bits.
    pub fn is_read_only(self) -> bool {
        !self.is_empty() && !self.has_write()
    }

    /// Returns true if a write state is combined with any other bit.
    ///
    /// Diagnostic helper for validation layers.
    pub fn violates_write_exclusivity(self) -> bool {
        let writes = self & Self::WRITE_STATES;
        !writes.is_empty() && (writes.bits().count_ones() > 1 || self != writes)
    }
}
