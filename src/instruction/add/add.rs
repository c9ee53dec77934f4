use crate::instruction::elementwise::{BinaryOp, Element, binary, binary_inplace, binary_out};
use crate::tensor::Tensor;
use crate::utils::error::Result;

/// Broadcasting elementwise sum. Its kernel writes any output layout, so
/// caller buffers are filled directly and never proxied.
pub struct Add;

impl BinaryOp for Add {
    const NAME: &'static str = "add";
    const RAW_STRIDED_OUTPUT: bool = true;

    fn apply<T: Element>(lhs: T, rhs: T) -> T {
        lhs.add(rhs)
    }
}

#[tracing::instrument(skip_all, fields(lhs = ?lhs.sizes(), rhs = ?rhs.sizes()))]
pub fn add(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    binary::<Add>(lhs, rhs)
}

#[tracing::instrument(skip_all, fields(lhs = ?lhs.sizes(), rhs = ?rhs.sizes()))]
pub fn add_<'a>(lhs: &'a mut Tensor, rhs: &Tensor) -> Result<&'a mut Tensor> {
    binary_inplace::<Add>(lhs, rhs)
}

#[tracing::instrument(skip_all, fields(out = ?out.sizes(), lhs = ?lhs.sizes(), rhs = ?rhs.sizes()))]
pub fn add_out<'a>(out: &'a mut Tensor, lhs: &Tensor, rhs: &Tensor) -> Result<&'a mut Tensor> {
    binary_out::<Add>(out, lhs, rhs)
}

pub fn add_outf<'a>(lhs: &Tensor, rhs: &Tensor, out: &'a mut Tensor) -> Result<&'a mut Tensor> {
    add_out(out, lhs, rhs)
}

impl Tensor {
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        add(self, other)
    }

    pub fn add_(&mut self, other: &Tensor) -> Result<&mut Tensor> {
        add_(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{DataType, TensorOptions};
    use num_complex::Complex32;

    #[test]
    fn test_add_writes_strided_out_directly() {
        let a = Tensor::from_slice(&[2, 3], &[1i64, 2, 3, 4, 5, 6]).unwrap();
        let b = Tensor::from_slice(&[3], &[10i64, 20, 30]).unwrap();
        let mut out = Tensor::zeros(&[3, 2], &TensorOptions::new(DataType::Int64))
            .unwrap()
            .transpose(0, 1)
            .unwrap();
        add_out(&mut out, &a, &b).unwrap();
        assert_eq!(out.strides(), &[1, 2]);
        assert_eq!(out.to_vec::<i64>().unwrap(), vec![11, 22, 33, 14, 25, 36]);
    }

    #[test]
    fn test_add_complex() {
        let a = Tensor::from_slice(&[2], &[Complex32::new(1.0, 1.0), Complex32::new(0.0, 2.0)]).unwrap();
        let c = a.add(&a).unwrap();
        assert_eq!(
            c.to_vec::<Complex32>().unwrap(),
            vec![Complex32::new(2.0, 2.0), Complex32::new(0.0, 4.0)]
        );
    }

    #[test]
    fn test_add_inplace_bool_is_or() {
        let mut a = Tensor::from_slice(&[3], &[true, false, false]).unwrap();
        let b = Tensor::from_slice(&[3], &[false, false, true]).unwrap();
        add_(&mut a, &b).unwrap();
        assert_eq!(a.to_vec::<bool>().unwrap(), vec![true, false, true]);
    }
}
