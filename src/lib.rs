//! tensorout - output materialisation and call conventions for strided host tensors
//!
//! Binary elementwise ops come in four flavours: functional (`mul`), in-place
//! (`mul_`), and out (`mul_out` / `mul_outf`). All of them infer the output
//! first, then allocate, reuse or validate the output buffer, run the kernel,
//! and finally copy back from a proxy when the caller's layout differs from the
//! kernel's.

pub mod instruction;

pub mod tensor;

pub mod utils;

pub use instruction::{add, add_, add_out, add_outf, mul, mul_, mul_out, mul_outf};
pub use tensor::{
    Context, DataType, Device, DeviceType, MemoryFormat, Scalar, Tensor, TensorMaker,
    TensorOptions, compute_storage_bytes, for_blob, from_blob,
};
pub use utils::error::{Result, TensorError};
pub use utils::logging::{LoggingConfig, init_tracing};
