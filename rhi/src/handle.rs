//! Object identity and backend handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a GPU object, unique within one renderer.
///
/// Used as the key of the validation side maps and as a stable name in logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u64);

impl ResourceId {
    /// Raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque backend object handle.
///
/// The frontend never interprets the value. Zero is reserved for "no object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    pub const NULL: Self = Self(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Monotonic id source. Never returns zero.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_id(&self) -> ResourceId {
        ResourceId(self.next_raw())
    }

    pub(crate) fn next_handle(&self) -> NativeHandle {
        NativeHandle(self.next_raw())
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// Handles cross into backend storage and recorded command streams; keep them one word.
static_assertions::const_assert_eq!(std::mem::size_of::<ResourceId>(), 8);
static_assertions::const_assert_eq!(std::mem::size_of::<NativeHandle>(), 8);
static_assertions::const_assert_eq!(std::mem::size_of::<Option<ResourceId>>(), 16);
