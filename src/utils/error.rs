use thiserror::Error;

use crate::tensor::{DataType, Device};

pub type Result<T> = std::result::Result<T, TensorError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    // Shape inference
    #[error("shapes {lhs:?} and {rhs:?} cannot be broadcast together")]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("expected scalar type {expected:?} but found {found:?}")]
    TypeMismatch { expected: DataType, found: DataType },

    #[error("dimension name mismatch at dim {dim}: {lhs} vs {rhs}")]
    NameMismatch { dim: usize, lhs: String, rhs: String },

    // Output resolution
    #[error("expected out tensor to have dtype {expected:?}, but got {found:?} instead")]
    DtypeMismatch { expected: DataType, found: DataType },

    #[error("expected tensor to have device {expected}, but got {found} instead")]
    DeviceMismatch { expected: Device, found: Device },

    #[error("bad in-place call: input tensor size {found:?} and output tensor size {expected:?} should match")]
    InPlaceShapeViolation {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    // Buffer import / sizing
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("must specify an allocator if you want resizable storage")]
    MissingAllocator,

    // Storage
    #[error("trying to resize storage that is not resizable")]
    StorageNotResizable,

    #[error("storage of {available} bytes is too small for a view needing {required} bytes")]
    StorageOutOfBounds { required: usize, available: usize },

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("unsupported device for host allocation: {0}")]
    UnsupportedDevice(Device),

    #[error("{op} has no CPU kernel for dtype {dtype:?}")]
    UnsupportedDtype { op: &'static str, dtype: DataType },
}
