//! GPU memory allocation interface.
//!
//! Sub-allocation and defragmentation live outside this crate. The renderer
//! only needs something that hands out opaque allocations for a size,
//! alignment and usage class, and takes them back. [`BudgetAllocator`] is the
//! default: it performs no placement, only accounting against per-heap budgets.

use std::fmt::Write as _;

use parking_lot::Mutex;

use crate::error::{GraphicsError, GraphicsResult};
use crate::types::ResourceMemoryUsage;

/// Default alignment when a descriptor leaves it at zero.
pub const DEFAULT_ALIGNMENT: u64 = 256;

/// What the allocation backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationKind {
    Buffer,
    Texture,
}

/// Parameters of one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest<'a> {
    pub size: u64,
    pub alignment: u64,
    pub usage: ResourceMemoryUsage,
    pub kind: AllocationKind,
    /// Dedicated (non sub-allocated) memory requested.
    pub dedicated: bool,
    pub name: Option<&'a str>,
}

/// Heap classes with separate budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryHeap {
    DeviceLocal,
    HostVisible,
}

impl MemoryHeap {
    pub fn for_usage(usage: ResourceMemoryUsage) -> Self {
        if usage.is_host_visible() {
            Self::HostVisible
        } else {
            Self::DeviceLocal
        }
    }
}

/// An opaque allocation handed out by a [`MemoryAllocator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAllocation {
    pub id: u64,
    pub heap: MemoryHeap,
    pub offset: u64,
    /// Bytes requested.
    pub size: u64,
    /// Bytes reserved after alignment.
    pub reserved: u64,
    pub usage: ResourceMemoryUsage,
}

/// Aggregate allocator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    /// Bytes requested by live allocations.
    pub used_bytes: u64,
    /// Bytes reserved by live allocations, including alignment padding.
    pub total_allocated_bytes: u64,
    pub allocation_count: u64,
    pub device_local_bytes: u64,
    pub host_visible_bytes: u64,
}

/// GPU memory allocator consumed by the renderer.
pub trait MemoryAllocator: Send + Sync {
    /// Allocate memory. Returns [`GraphicsError::OutOfMemory`] when the
    /// request cannot be satisfied.
    fn allocate(&self, request: &AllocationRequest<'_>) -> GraphicsResult<MemoryAllocation>;

    /// Return an allocation.
    fn free(&self, allocation: &MemoryAllocation);

    fn stats(&self) -> MemoryStats;
}

/// Per-heap byte budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    pub device_local: u64,
    pub host_visible: u64,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self {
            device_local: 4 << 30,
            host_visible: 1 << 30,
        }
    }
}

impl MemoryBudget {
    pub fn new(device_local: u64, host_visible: u64) -> Self {
        Self {
            device_local,
            host_visible,
        }
    }

    fn limit(&self, heap: MemoryHeap) -> u64 {
        match heap {
            MemoryHeap::DeviceLocal => self.device_local,
            MemoryHeap::HostVisible => self.host_visible,
        }
    }
}

#[derive(Debug, Default)]
struct BudgetState {
    next_id: u64,
    device_local: u64,
    host_visible: u64,
    stats: MemoryStats,
}

impl BudgetState {
    fn heap_usage(&mut self, heap: MemoryHeap) -> &mut u64 {
        match heap {
            MemoryHeap::DeviceLocal => &mut self.device_local,
            MemoryHeap::HostVisible => &mut self.host_visible,
        }
    }
}

/// Accounting-only allocator with per-heap budgets.
#[derive(Debug)]
pub struct BudgetAllocator {
    budget: MemoryBudget,
    state: Mutex<BudgetState>,
}

impl BudgetAllocator {
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            budget,
            state: Mutex::new(BudgetState::default()),
        }
    }

    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

impl MemoryAllocator for BudgetAllocator {
    fn allocate(&self, request: &AllocationRequest<'_>) -> GraphicsResult<MemoryAllocation> {
        let alignment = if request.alignment == 0 {
            DEFAULT_ALIGNMENT
        } else {
            request.alignment
        };
        if !alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "alignment {alignment} is not a power of two"
            )));
        }
        let heap = MemoryHeap::for_usage(request.usage);
        let reserved = align_up(request.size, alignment);
        let limit = self.budget.limit(heap);

        let mut state = self.state.lock();
        let offset = *state.heap_usage(heap);
        if offset.saturating_add(reserved) > limit {
            log::warn!(
                "BudgetAllocator: {:?} heap exhausted ({} + {} > {}) allocating {:?}",
                heap,
                offset,
                reserved,
                limit,
                request.name
            );
            return Err(GraphicsError::OutOfMemory);
        }
        *state.heap_usage(heap) += reserved;
        state.next_id += 1;
        let id = state.next_id;
        state.stats.used_bytes += request.size;
        state.stats.total_allocated_bytes += reserved;
        state.stats.allocation_count += 1;
        match heap {
            MemoryHeap::DeviceLocal => state.stats.device_local_bytes += reserved,
            MemoryHeap::HostVisible => state.stats.host_visible_bytes += reserved,
        }

        Ok(MemoryAllocation {
            id,
            heap,
            offset,
            size: request.size,
            reserved,
            usage: request.usage,
        })
    }

    fn free(&self, allocation: &MemoryAllocation) {
        let mut state = self.state.lock();
        let heap = state.heap_usage(allocation.heap);
        *heap = heap.saturating_sub(allocation.reserved);
        state.stats.used_bytes = state.stats.used_bytes.saturating_sub(allocation.size);
        state.stats.total_allocated_bytes = state
            .stats
            .total_allocated_bytes
            .saturating_sub(allocation.reserved);
        state.stats.allocation_count = state.stats.allocation_count.saturating_sub(1);
        match allocation.heap {
            MemoryHeap::DeviceLocal => {
                state.stats.device_local_bytes =
                    state.stats.device_local_bytes.saturating_sub(allocation.reserved)
            }
            MemoryHeap::HostVisible => {
                state.stats.host_visible_bytes =
                    state.stats.host_visible_bytes.saturating_sub(allocation.reserved)
            }
        }
    }

    fn stats(&self) -> MemoryStats {
        self.state.lock().stats
    }
}

/// Human-readable memory report.
pub fn format_memory_stats(stats: &MemoryStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "allocations: {}", stats.allocation_count);
    let _ = writeln!(out, "used bytes: {}", stats.used_bytes);
    let _ = writeln!(out, "allocated bytes: {}", stats.total_allocated_bytes);
    let _ = writeln!(out, "device local bytes: {}", stats.device_local_bytes);
    let _ = writeln!(out, "host visible bytes: {}", stats.host_visible_bytes);
    out
}

static_assertions::assert_impl_all!(BudgetAllocator: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn request(size: u64, usage: ResourceMemoryUsage) -> AllocationRequest<'static> {
        AllocationRequest {
            size,
            alignment: 0,
            usage,
            kind: AllocationKind::Buffer,
            dedicated: false,
            name: None,
        }
    }

    #[test]
    fn test_allocation_accounting() {
        let allocator = BudgetAllocator::new(MemoryBudget::new(4096, 4096));
        let a = allocator
            .allocate(&request(100, ResourceMemoryUsage::GpuOnly))
            .unwrap();
        assert_eq!(a.reserved, 256);
        assert_eq!(a.heap, MemoryHeap::DeviceLocal);

        let stats = allocator.stats();
        assert_eq!(stats.used_bytes, 100);
        assert_eq!(stats.total_allocated_bytes, 256);
        assert_eq!(stats.allocation_count, 1);

        allocator.free(&a);
        assert_eq!(allocator.stats(), MemoryStats::default());
    }

    #[test]
    fn test_out_of_memory() {
        let allocator = BudgetAllocator::new(MemoryBudget::new(512, 512));
        let _a = allocator
            .allocate(&request(512, ResourceMemoryUsage::CpuToGpu))
            .unwrap();
        assert_eq!(
            allocator.allocate(&request(1, ResourceMemoryUsage::CpuToGpu)),
            Err(GraphicsError::OutOfMemory)
        );
        // Device-local heap has its own budget.
        assert!(allocator
            .allocate(&request(1, ResourceMemoryUsage::GpuOnly))
            .is_ok());
    }

    #[test]
    fn test_bad_alignment() {
        let allocator = BudgetAllocator::new(MemoryBudget::default());
        let mut req = request(16, ResourceMemoryUsage::GpuOnly);
        req.alignment = 3;
        assert!(matches!(
            allocator.allocate(&req),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_format_stats() {
        let text = format_memory_stats(&MemoryStats {
            used_bytes: 10,
            ..Default::default()
        });
        assert!(text.contains("used bytes: 10"));
    }
}
