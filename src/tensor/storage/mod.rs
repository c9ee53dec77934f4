mod cpu;
mod data_ptr;
mod memory_tracker;
mod r#trait;

pub use cpu::{CpuAllocator, CpuAllocatorConfig, DEFAULT_ALIGNMENT, default_allocator};
pub use data_ptr::{Context, ContextDeleter, DataPtr, Release};
pub use memory_tracker::MemoryTracker;
pub use r#trait::Allocator;

use std::sync::Arc;

use crate::tensor::Device;
use crate::utils::error::{Result, TensorError};

/// Byte buffer shared by one or more tensor views.
///
/// The storage owns its memory through a [`DataPtr`] and lives as long as
/// the longest surviving view holding an `Arc` to it.
#[derive(Debug)]
pub struct Storage {
    data_ptr: DataPtr,
    nbytes: usize,
    allocator: Option<Arc<dyn Allocator>>,
    resizable: bool,
}

impl Storage {
    pub fn new(
        data_ptr: DataPtr,
        nbytes: usize,
        allocator: Option<Arc<dyn Allocator>>,
        resizable: bool,
    ) -> Self {
        Self {
            data_ptr,
            nbytes,
            allocator,
            resizable,
        }
    }

    /// Fresh zeroed storage from `allocator`; it stays resizable through the same allocator.
    pub fn allocate(nbytes: usize, allocator: Arc<dyn Allocator>) -> Result<Self> {
        let data_ptr = allocator.allocate(nbytes)?;
        Ok(Self::new(data_ptr, nbytes, Some(allocator), true))
    }

    /// Fresh storage for `device`. Only host memory can be allocated here.
    pub fn allocate_on(nbytes: usize, device: Device) -> Result<Self> {
        if !device.is_cpu() {
            return Err(TensorError::UnsupportedDevice(device));
        }
        Self::allocate(nbytes, default_allocator())
    }

    pub fn data(&self) -> *mut u8 {
        self.data_ptr.get()
    }

    pub fn data_ptr(&self) -> &DataPtr {
        &self.data_ptr
    }

    pub fn nbytes(&self) -> usize {
        self.nbytes
    }

    pub fn device(&self) -> Device {
        self.data_ptr.device()
    }

    pub fn allocator(&self) -> Option<&Arc<dyn Allocator>> {
        self.allocator.as_ref()
    }

    pub fn resizable(&self) -> bool {
        self.resizable
    }

    /// New storage of `nbytes` holding a copy of this storage's leading bytes.
    ///
    /// The old storage is untouched so views still holding it stay valid.
    pub fn grown(&self, nbytes: usize) -> Result<Self> {
        if !self.resizable {
            return Err(TensorError::StorageNotResizable);
        }
        let allocator = self.allocator.clone().unwrap_or_else(default_allocator);
        let grown = Self::allocate(nbytes, allocator)?;

        let keep = self.nbytes.min(nbytes);
        if keep > 0 {
            // SAFETY: both buffers hold at least `keep` bytes and the fresh
            // allocation cannot overlap the old one.
            unsafe { std::ptr::copy_nonoverlapping(self.data(), grown.data(), keep) };
        }
        tracing::debug!(from = self.nbytes, to = nbytes, "storage grown");
        Ok(grown)
    }
}
