//! Broadcasting binary ops on the host.
//!
//! Every call runs the same four phases in order: meta, output resolution,
//! kernel, copy-back. The op only supplies the scalar function and says
//! whether its kernel can write an arbitrary output layout.

use half::{bf16, f16};
use num_complex::{Complex32, Complex64};

use crate::instruction::meta::{OutputDescriptor, binary_elementwise_meta};
use crate::instruction::output::OutputResolver;
use crate::tensor::{DataType, Scalar, Tensor, TensorDesc};
use crate::utils::error::{Result, TensorError};

/// Arithmetic the host kernels need. Integers wrap; `bool` adds as `||` and
/// multiplies as `&&`.
pub trait Element: Scalar {
    fn add(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
}

macro_rules! impl_element_wrapping {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn add(self, rhs: Self) -> Self {
                    self.wrapping_add(rhs)
                }
                fn mul(self, rhs: Self) -> Self {
                    self.wrapping_mul(rhs)
                }
            }
        )*
    };
}

macro_rules! impl_element_ops {
    ($($t:ty),*) => {
        $(
            impl Element for $t {
                fn add(self, rhs: Self) -> Self {
                    self + rhs
                }
                fn mul(self, rhs: Self) -> Self {
                    self * rhs
                }
            }
        )*
    };
}

impl_element_wrapping!(u8, i8, i16, i32, i64, u16, u32, u64);
impl_element_ops!(f16, bf16, f32, f64, Complex32, Complex64);

impl Element for bool {
    fn add(self, rhs: Self) -> Self {
        self || rhs
    }
    fn mul(self, rhs: Self) -> Self {
        self && rhs
    }
}

/// A binary elementwise operation.
pub trait BinaryOp {
    const NAME: &'static str;
    /// The kernel writes any output layout, so outputs are never proxied
    const RAW_STRIDED_OUTPUT: bool = false;

    fn apply<T: Element>(lhs: T, rhs: T) -> T;
}

// Bind `$T` to the host type of `$dtype` and evaluate `$body`; quantized tags have no arithmetic
macro_rules! dispatch_element {
    ($op:expr, $dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            DataType::Bool => { type $T = bool; $body }
            DataType::UInt8 => { type $T = u8; $body }
            DataType::Int8 => { type $T = i8; $body }
            DataType::Int16 => { type $T = i16; $body }
            DataType::Int32 => { type $T = i32; $body }
            DataType::Int64 => { type $T = i64; $body }
            DataType::UInt16 => { type $T = u16; $body }
            DataType::UInt32 => { type $T = u32; $body }
            DataType::UInt64 => { type $T = u64; $body }
            DataType::Float16 => { type $T = f16; $body }
            DataType::BFloat16 => { type $T = bf16; $body }
            DataType::Float => { type $T = f32; $body }
            DataType::Double => { type $T = f64; $body }
            DataType::ComplexFloat => { type $T = Complex32; $body }
            DataType::ComplexDouble => { type $T = Complex64; $body }
            dtype @ (DataType::QInt8 | DataType::QUInt8 | DataType::QInt32) => {
                Err(TensorError::UnsupportedDtype { op: $op, dtype })
            }
        }
    };
}

fn cpu_kernel<Op: BinaryOp, T: Element>(lhs: &Tensor, rhs: &Tensor, out: &Tensor) -> Result<()> {
    let dims = out.sizes();
    let strides_a = TensorDesc::broadcast_strides(lhs.sizes(), lhs.strides(), dims);
    let strides_b = TensorDesc::broadcast_strides(rhs.sizes(), rhs.strides(), dims);

    let a = lhs.const_data_ptr::<T>()?;
    let b = rhs.const_data_ptr::<T>()?;
    let dst = out.mutable_data_ptr::<T>()?;

    TensorDesc::for_each_offset(
        dims,
        [strides_a.as_slice(), strides_b.as_slice(), out.strides()],
        [0, 0, 0],
        |[ia, ib, io]| {
            // SAFETY: offsets come from bounds checked views of live storages;
            // the output element is written only after both inputs are read.
            unsafe {
                let x = a.add(ia).read_unaligned();
                let y = b.add(ib).read_unaligned();
                dst.add(io).write_unaligned(Op::apply(x, y));
            }
        },
    );
    Ok(())
}

/// Run `Op` over `lhs` and `rhs`, writing `out` through its own strides.
pub fn run_kernel<Op: BinaryOp>(lhs: &Tensor, rhs: &Tensor, out: &Tensor) -> Result<()> {
    dispatch_element!(Op::NAME, out.dtype(), T => cpu_kernel::<Op, T>(lhs, rhs, out))
}

fn execute<Op: BinaryOp>(
    resolver: &mut OutputResolver<'_>,
    desc: &OutputDescriptor,
    lhs: &Tensor,
    rhs: &Tensor,
) -> Result<()> {
    if Op::RAW_STRIDED_OUTPUT {
        resolver.set_output_raw_strided(0, desc)?;
    } else {
        resolver.set_output(0, desc)?;
    }
    resolver.isolate_from_inputs(0, &[lhs, rhs])?;
    run_kernel::<Op>(lhs, rhs, resolver.resolve(0)?)?;
    if resolver.has_proxy(0) {
        tracing::debug!(op = Op::NAME, "copying proxy result into caller buffer");
    }
    resolver.copy_back()
}

/// Functional call: the result is a fresh tensor.
pub fn binary<Op: BinaryOp>(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let desc = binary_elementwise_meta(lhs, rhs)?;
    let mut resolver = OutputResolver::allocate(1);
    execute::<Op>(&mut resolver, &desc, lhs, rhs)?;
    resolver
        .into_allocated()?
        .pop()
        .ok_or_else(|| TensorError::ContractViolation(format!("{} produced no output", Op::NAME)))
}

/// Out call: `out` is validated, resized if its shape is wrong, and written.
pub fn binary_out<'o, Op: BinaryOp>(
    out: &'o mut Tensor,
    lhs: &Tensor,
    rhs: &Tensor,
) -> Result<&'o mut Tensor> {
    let desc = binary_elementwise_meta(lhs, rhs)?;
    {
        let mut resolver = OutputResolver::reuse_or_resize(vec![&mut *out]);
        execute::<Op>(&mut resolver, &desc, lhs, rhs)?;
    }
    Ok(out)
}

/// In-place call: `lhs` is both an input and the output.
pub fn binary_inplace<'o, Op: BinaryOp>(lhs: &'o mut Tensor, rhs: &Tensor) -> Result<&'o mut Tensor> {
    let desc = binary_elementwise_meta(lhs, rhs)?;
    // another view of the receiver to read from while the resolver holds it
    let input = lhs.clone();
    {
        let mut resolver = OutputResolver::validate_in_place(vec![&mut *lhs]);
        execute::<Op>(&mut resolver, &desc, &input, rhs)?;
    }
    Ok(lhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{QInt8, TensorOptions};

    struct Sum;

    impl BinaryOp for Sum {
        const NAME: &'static str = "sum";

        fn apply<T: Element>(lhs: T, rhs: T) -> T {
            lhs.add(rhs)
        }
    }

    #[test]
    fn test_every_arithmetic_dtype_dispatches() {
        for dtype in DataType::ALL {
            let t = Tensor::zeros(&[2], &TensorOptions::new(dtype)).unwrap();
            let result = binary::<Sum>(&t, &t);
            if dtype.is_quantized() {
                assert_eq!(
                    result.unwrap_err(),
                    TensorError::UnsupportedDtype { op: "sum", dtype }
                );
            } else {
                assert_eq!(result.unwrap().dtype(), dtype);
            }
        }
    }

    #[test]
    fn test_quantized_inputs_rejected_before_writing() {
        let q = Tensor::full(&[3], QInt8(1)).unwrap();
        let mut out = Tensor::full(&[3], QInt8(9)).unwrap();
        assert!(binary_out::<Sum>(&mut out, &q, &q).is_err());
        assert_eq!(out.to_vec::<i8>().unwrap(), vec![9, 9, 9]);
    }

    #[test]
    fn test_kernel_failure_skips_copy_back() {
        let q = Tensor::full(&[2, 3], QInt8(1)).unwrap();

        // right shape, foreign layout: the proxy is dropped unwritten
        let mut out = Tensor::full(&[3, 2], QInt8(9)).unwrap().transpose(0, 1).unwrap();
        assert_eq!(
            binary_out::<Sum>(&mut out, &q, &q).unwrap_err(),
            TensorError::UnsupportedDtype {
                op: "sum",
                dtype: DataType::QInt8
            }
        );
        assert_eq!(out.strides(), &[1, 2]);
        assert_eq!(out.to_vec::<i8>().unwrap(), vec![9; 6]);

        // wrong shape: the resize sticks, the kernel never wrote
        let mut out = Tensor::full(&[4], QInt8(9)).unwrap();
        assert!(binary_out::<Sum>(&mut out, &q, &q).is_err());
        assert_eq!(out.sizes(), &[2, 3]);
        assert_eq!(out.strides(), &[3, 1]);
        assert_eq!(out.to_vec::<i8>().unwrap(), vec![9, 9, 9, 9, 0, 0]);
    }

    #[test]
    fn test_bool_and_wrapping() {
        let a = Tensor::from_slice(&[2], &[true, false]).unwrap();
        let b = Tensor::from_slice(&[2], &[false, false]).unwrap();
        assert_eq!(binary::<Sum>(&a, &b).unwrap().to_vec::<bool>().unwrap(), vec![true, false]);

        let x = Tensor::from_slice(&[1], &[250u8]).unwrap();
        assert_eq!(binary::<Sum>(&x, &x).unwrap().to_vec::<u8>().unwrap(), vec![244]);
    }
}
