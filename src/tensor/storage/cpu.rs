use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock};

use super::data_ptr::DataPtr;
use super::memory_tracker::MemoryTracker;
use super::r#trait::Allocator;
use crate::tensor::Device;
use crate::utils::error::{Result, TensorError};

pub const DEFAULT_ALIGNMENT: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuAllocatorConfig {
    /// Alignment of every allocation, a power of two
    pub alignment: usize,
    /// Upper bound on live bytes, unbounded when `None`
    pub memory_limit_bytes: Option<u64>,
}

impl Default for CpuAllocatorConfig {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            memory_limit_bytes: None,
        }
    }
}

impl CpuAllocatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.alignment.is_power_of_two() {
            return Err(TensorError::InvalidSize(format!(
                "allocator alignment must be a power of two, got {}",
                self.alignment
            )));
        }
        Ok(())
    }
}

/// Host allocator handing out zeroed, aligned memory and accounting for it.
#[derive(Debug)]
pub struct CpuAllocator {
    alignment: usize,
    memory_tracking: Arc<MemoryTracker>,
}

impl CpuAllocator {
    pub fn new(config: CpuAllocatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            alignment: config.alignment,
            memory_tracking: Arc::new(MemoryTracker::new(
                config.memory_limit_bytes.unwrap_or(u64::MAX),
            )),
        })
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.memory_tracking.get_current()
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }
}

impl Allocator for CpuAllocator {
    fn allocate(&self, nbytes: usize) -> Result<DataPtr> {
        if nbytes == 0 {
            // aligned, never dereferenced, never freed
            let dangling = NonNull::<u8>::dangling()
                .as_ptr()
                .wrapping_add(self.alignment - 1);
            return Ok(DataPtr::borrowed(dangling, Device::cpu()));
        }

        let layout = Layout::from_size_align(nbytes, self.alignment).map_err(|e| {
            TensorError::InvalidSize(format!("cannot lay out {} bytes: {}", nbytes, e))
        })?;

        self.memory_tracking.allocate(nbytes as u64)?;

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            self.memory_tracking.deallocate(nbytes as u64);
            return Err(TensorError::OutOfMemory(format!(
                "system allocator refused {} bytes",
                nbytes
            )));
        }
        tracing::trace!(nbytes, ptr = ?ptr, "cpu allocation");

        let tracker = Arc::clone(&self.memory_tracking);
        Ok(DataPtr::from_deleter(
            ptr,
            move |p| {
                // SAFETY: `p` is the pointer returned above for this exact layout.
                unsafe { std::alloc::dealloc(p, layout) };
                tracker.deallocate(layout.size() as u64);
            },
            Device::cpu(),
        ))
    }
}

/// Process-wide allocator used for fresh outputs, proxies and resizes.
pub fn default_allocator() -> Arc<dyn Allocator> {
    static DEFAULT: OnceLock<Arc<CpuAllocator>> = OnceLock::new();
    let allocator = DEFAULT.get_or_init(|| {
        Arc::new(CpuAllocator {
            alignment: DEFAULT_ALIGNMENT,
            memory_tracking: Arc::new(MemoryTracker::new(u64::MAX)),
        })
    });
    Arc::clone(allocator) as Arc<dyn Allocator>
}
