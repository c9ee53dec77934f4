use std::fmt::Debug;

use super::data_ptr::DataPtr;
use crate::utils::error::Result;

/// Source of fresh storage memory.
///
/// Storages remember the allocator they were created with so that a later
/// resize can grow them the same way.
pub trait Allocator: Debug + Send + Sync {
    /// Allocate `nbytes` of zeroed memory. A zero-byte request yields a
    /// pointer that must never be dereferenced.
    fn allocate(&self, nbytes: usize) -> Result<DataPtr>;
}
