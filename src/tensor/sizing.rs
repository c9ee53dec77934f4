use crate::tensor::TensorDesc;
use crate::utils::error::{Result, TensorError};

fn checked_extent(kind: &str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| TensorError::InvalidSize(format!("{} must be non-negative, got {}", kind, value)))
}

fn overflow(sizes: &[i64]) -> TensorError {
    TensorError::InvalidSize(format!("storage size for {:?} overflows", sizes))
}

/// Convert signed extents to `usize`, rejecting negatives.
pub fn check_sizes(sizes: &[i64]) -> Result<Vec<usize>> {
    sizes.iter().map(|&s| checked_extent("size", s)).collect()
}

/// Bytes a storage must hold to back a view of `sizes`.
///
/// With `strides` the span is `1 + sum((size - 1) * stride)` elements, or zero
/// when any size is zero. Without strides the view is dense and the span is
/// the element count. Either way `storage_offset` elements are added in front.
pub fn compute_storage_bytes(
    sizes: &[i64],
    strides: Option<&[i64]>,
    itemsize: usize,
    storage_offset: Option<i64>,
) -> Result<usize> {
    let dims = check_sizes(sizes)?;
    let offset = checked_extent("storage offset", storage_offset.unwrap_or(0))?;

    let elements = match strides {
        Some(strides) => {
            if strides.len() != dims.len() {
                return Err(TensorError::InvalidSize(format!(
                    "sizes {:?} and strides {:?} have different ranks",
                    sizes, strides
                )));
            }
            let strides = strides
                .iter()
                .map(|&s| checked_extent("stride", s))
                .collect::<Result<Vec<_>>>()?;
            TensorDesc::new_strided(dims, strides, 0)
                .span_elements()
                .ok_or_else(|| overflow(sizes))?
        }
        None if dims.contains(&0) => 0,
        None => dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| overflow(sizes))?,
    };

    elements
        .checked_add(offset)
        .and_then(|n| n.checked_mul(itemsize))
        .ok_or_else(|| overflow(sizes))
}
