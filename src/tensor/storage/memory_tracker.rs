use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::error::{Result, TensorError};

/// Running total of bytes handed out by an allocator, checked against a maximum.
#[derive(Debug)]
pub struct MemoryTracker {
    maximum: u64,
    current: AtomicU64,
}

impl MemoryTracker {
    pub fn new(maximum: u64) -> Self {
        Self {
            maximum,
            current: AtomicU64::new(0),
        }
    }

    // Reserve with a CAS loop so a failed reservation never shows up in `current`
    pub fn allocate(&self, size: u64) -> Result<()> {
        self.current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                prev.checked_add(size).filter(|new| *new <= self.maximum)
            })
            .map(|_| ())
            .map_err(|prev| {
                TensorError::OutOfMemory(format!(
                    "tried to allocate {} bytes when {} of {} bytes are used",
                    size, prev, self.maximum
                ))
            })
    }

    pub fn deallocate(&self, size: u64) {
        self.current.fetch_sub(size, Ordering::AcqRel);
    }

    pub fn get_current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn get_available(&self) -> u64 {
        self.maximum - self.get_current()
    }

    pub fn get_maximum(&self) -> u64 {
        self.maximum
    }
}
