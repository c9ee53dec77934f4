mod access;
mod desc;
mod device;
mod dtype;
mod maker;
mod options;
mod sizing;
pub mod storage;
mod tensor;

pub use access::{QInt8, QInt32, QUInt8, Scalar, check_type};
pub use desc::TensorDesc;
pub use device::{Device, DeviceType, HostPointerClassifier, PointerClassifier};
pub use dtype::DataType;
pub use maker::{TensorMaker, for_blob, from_blob, temp_sizes};
pub use options::{MemoryFormat, TensorOptions};
pub use sizing::{check_sizes, compute_storage_bytes};
pub use storage::{Context, Storage};
pub use tensor::{DimNames, Tensor};
