use crate::instruction::elementwise::{BinaryOp, Element, binary, binary_inplace, binary_out};
use crate::tensor::Tensor;
use crate::utils::error::Result;

/// Broadcasting elementwise product.
///
/// The kernel writes in the advisory layout, so a caller buffer laid out
/// differently is filled through a proxy.
pub struct Mul;

impl BinaryOp for Mul {
    const NAME: &'static str = "mul";

    fn apply<T: Element>(lhs: T, rhs: T) -> T {
        lhs.mul(rhs)
    }
}

#[tracing::instrument(skip_all, fields(lhs = ?lhs.sizes(), rhs = ?rhs.sizes()))]
pub fn mul(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    binary::<Mul>(lhs, rhs)
}

#[tracing::instrument(skip_all, fields(lhs = ?lhs.sizes(), rhs = ?rhs.sizes()))]
pub fn mul_<'a>(lhs: &'a mut Tensor, rhs: &Tensor) -> Result<&'a mut Tensor> {
    binary_inplace::<Mul>(lhs, rhs)
}

#[tracing::instrument(skip_all, fields(out = ?out.sizes(), lhs = ?lhs.sizes(), rhs = ?rhs.sizes()))]
pub fn mul_out<'a>(out: &'a mut Tensor, lhs: &Tensor, rhs: &Tensor) -> Result<&'a mut Tensor> {
    binary_out::<Mul>(out, lhs, rhs)
}

pub fn mul_outf<'a>(lhs: &Tensor, rhs: &Tensor, out: &'a mut Tensor) -> Result<&'a mut Tensor> {
    mul_out(out, lhs, rhs)
}

impl Tensor {
    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        mul(self, other)
    }

    pub fn mul_(&mut self, other: &Tensor) -> Result<&mut Tensor> {
        mul_(self, other)
    }
}
