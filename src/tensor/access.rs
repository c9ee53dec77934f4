//! Typed access to a tensor's elements.
//!
//! Every host representation the runtime knows is tied to exactly one
//! [`DataType`] through [`Scalar`]. Accessors check the tensor's runtime tag
//! against `T::TYPE` before handing out a pointer.

use bytemuck::{Pod, Zeroable};
use half::{bf16, f16};
use num_complex::{Complex32, Complex64};

use crate::tensor::{DataType, Tensor};
use crate::utils::error::{Result, TensorError};

/// Quantized signed 8-bit value, stored as `i8`
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct QInt8(pub i8);

/// Quantized unsigned 8-bit value, stored as `u8`
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct QUInt8(pub u8);

/// Quantized signed 32-bit value, stored as `i32`
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct QInt32(pub i32);

mod private {
    pub trait Sealed {}
}

/// Host representation of one element type.
///
/// Every representation is plain bytes with no padding, so slices of it can
/// be viewed as `[u8]`.
pub trait Scalar: bytemuck::NoUninit + Send + Sync + private::Sealed {
    const TYPE: DataType;
}

macro_rules! impl_scalar {
    ($rust_type:ty, $variant:ident) => {
        impl private::Sealed for $rust_type {}
        impl Scalar for $rust_type {
            const TYPE: DataType = DataType::$variant;
        }
    };
}

impl_scalar!(bool, Bool);
impl_scalar!(u8, UInt8);
impl_scalar!(i8, Int8);
impl_scalar!(i16, Int16);
impl_scalar!(i32, Int32);
impl_scalar!(i64, Int64);
impl_scalar!(u16, UInt16);
impl_scalar!(u32, UInt32);
impl_scalar!(u64, UInt64);
impl_scalar!(f16, Float16);
impl_scalar!(bf16, BFloat16);
impl_scalar!(f32, Float);
impl_scalar!(f64, Double);
impl_scalar!(Complex32, ComplexFloat);
impl_scalar!(Complex64, ComplexDouble);
impl_scalar!(QInt8, QInt8);
impl_scalar!(QUInt8, QUInt8);
impl_scalar!(QInt32, QInt32);

/// Accept `T` for a tensor tagged `dtype`.
///
/// A quantized tag also accepts its underlying integer type, so `i8` can
/// read a `QInt8` tensor.
pub fn check_type<T: Scalar>(dtype: DataType) -> Result<()> {
    if dtype == T::TYPE || (dtype.is_quantized() && dtype.to_underlying() == T::TYPE) {
        return Ok(());
    }
    Err(TensorError::TypeMismatch {
        expected: T::TYPE,
        found: dtype,
    })
}

impl Tensor {
    /// Address of the first element, storage offset applied.
    pub fn raw_data_ptr(&self) -> *mut u8 {
        self.storage()
            .data()
            .wrapping_add(self.storage_offset() * self.dtype().size_in_bytes())
    }

    pub fn const_data_ptr<T: Scalar>(&self) -> Result<*const T> {
        check_type::<T>(self.dtype())?;
        Ok(self.raw_data_ptr().cast_const().cast::<T>())
    }

    pub fn mutable_data_ptr<T: Scalar>(&self) -> Result<*mut T> {
        check_type::<T>(self.dtype())?;
        Ok(self.raw_data_ptr().cast::<T>())
    }

    /// Same as [`Tensor::mutable_data_ptr`]
    pub fn data_ptr<T: Scalar>(&self) -> Result<*mut T> {
        self.mutable_data_ptr::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_tags_cover_every_dtype() {
        let tags = [
            bool::TYPE,
            u8::TYPE,
            i8::TYPE,
            i16::TYPE,
            i32::TYPE,
            i64::TYPE,
            u16::TYPE,
            u32::TYPE,
            u64::TYPE,
            f16::TYPE,
            bf16::TYPE,
            f32::TYPE,
            f64::TYPE,
            Complex32::TYPE,
            Complex64::TYPE,
            QInt8::TYPE,
            QUInt8::TYPE,
            QInt32::TYPE,
        ];
        assert_eq!(tags, DataType::ALL);
    }

    #[test]
    fn test_check_type() {
        assert!(check_type::<f32>(DataType::Float).is_ok());
        assert_eq!(
            check_type::<f64>(DataType::Float),
            Err(TensorError::TypeMismatch {
                expected: DataType::Double,
                found: DataType::Float
            })
        );
        // unsigned extensions are distinct from their signed siblings
        assert!(check_type::<i16>(DataType::UInt16).is_err());
    }

    #[test]
    fn test_quantized_relaxation() {
        assert!(check_type::<QInt8>(DataType::QInt8).is_ok());
        assert!(check_type::<i8>(DataType::QInt8).is_ok());
        assert!(check_type::<u8>(DataType::QUInt8).is_ok());
        assert!(check_type::<i32>(DataType::QInt32).is_ok());
        assert!(check_type::<u8>(DataType::QInt8).is_err());
        // the relaxation only goes one way
        assert!(check_type::<QInt8>(DataType::Int8).is_err());
    }

    #[test]
    fn test_slices_of_every_family_round_trip() {
        let halves = [f16::from_f32(1.5), f16::from_f32(-2.0)];
        let t = Tensor::from_slice(&[2], &halves).unwrap();
        assert_eq!(t.to_vec::<f16>().unwrap(), halves);

        let complex = [Complex64::new(1.0, -1.0), Complex64::new(0.5, 2.0)];
        let t = Tensor::from_slice(&[2, 1], &complex).unwrap();
        assert_eq!(t.to_vec::<Complex64>().unwrap(), complex);

        let flags = [true, false, true];
        assert_eq!(Tensor::from_slice(&[3], &flags).unwrap().to_vec::<bool>().unwrap(), flags);

        let q = [QInt32(-7), QInt32(9)];
        let t = Tensor::from_slice(&[2], &q).unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![-7, 9]);
        assert_eq!(bytemuck::cast_slice::<QInt32, i32>(&q), &[-7, 9]);
    }

    #[test]
    fn test_pointer_includes_offset() {
        let t = Tensor::from_slice(&[6], &[0i32, 1, 2, 3, 4, 5]).unwrap();
        let view = t.as_strided(&[2], &[1], Some(3)).unwrap();
        let base = t.const_data_ptr::<i32>().unwrap();
        let p = view.const_data_ptr::<i32>().unwrap();
        assert_eq!(p as usize, base as usize + 3 * 4);
        assert_eq!(unsafe { p.read() }, 3);
        assert!(view.data_ptr::<u32>().is_err());
    }
}
