use crate::tensor::{DimNames, MemoryFormat, Tensor, TensorDesc, TensorOptions};
use crate::utils::error::{Result, TensorError};

/// What an operation will produce in one output slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub sizes: Vec<usize>,
    /// Layout the kernel would like; empty means no preference
    pub strides: Vec<usize>,
    pub options: TensorOptions,
    pub names: Option<DimNames>,
}

impl OutputDescriptor {
    pub fn new(sizes: Vec<usize>, options: TensorOptions) -> Self {
        Self {
            sizes,
            strides: Vec::new(),
            options,
            names: None,
        }
    }

    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_names(mut self, names: Option<DimNames>) -> Self {
        self.names = names;
        self
    }
}

/// Output of a broadcasting binary op over `lhs` and `rhs`.
///
/// Both inputs must already share dtype and device. The advisory layout
/// follows the first input whose shape equals the output shape, so a
/// channels-last operand keeps producing channels-last results.
pub fn binary_elementwise_meta(lhs: &Tensor, rhs: &Tensor) -> Result<OutputDescriptor> {
    let sizes = TensorDesc::broadcast_shape(lhs.sizes(), rhs.sizes()).ok_or_else(|| {
        TensorError::ShapeMismatch {
            lhs: lhs.sizes().to_vec(),
            rhs: rhs.sizes().to_vec(),
        }
    })?;

    if lhs.dtype() != rhs.dtype() {
        return Err(TensorError::TypeMismatch {
            expected: lhs.dtype(),
            found: rhs.dtype(),
        });
    }
    if lhs.device() != rhs.device() {
        return Err(TensorError::DeviceMismatch {
            expected: lhs.device(),
            found: rhs.device(),
        });
    }

    let format = [lhs, rhs]
        .into_iter()
        .find(|t| t.sizes() == sizes.as_slice())
        .map_or(MemoryFormat::Contiguous, Tensor::suggest_memory_format);
    let strides = TensorDesc::strides_for(format, &sizes);
    let names = unify_names(lhs, rhs, sizes.len())?;

    let options = TensorOptions::new(lhs.dtype()).with_device(lhs.device());
    Ok(OutputDescriptor::new(sizes, options)
        .with_strides(strides)
        .with_names(names))
}

// Names line up from the last dim, like sizes do when broadcasting
fn unify_names(lhs: &Tensor, rhs: &Tensor, ndim: usize) -> Result<Option<DimNames>> {
    if !lhs.has_names() && !rhs.has_names() {
        return Ok(None);
    }

    let name_at = |t: &Tensor, out_dim: usize| -> Option<String> {
        let lead = ndim - t.ndim();
        out_dim
            .checked_sub(lead)
            .and_then(|d| t.names().and_then(|n| n.get(d).cloned().flatten()))
    };

    (0..ndim)
        .map(|dim| match (name_at(lhs, dim), name_at(rhs, dim)) {
            (Some(a), Some(b)) if a != b => Err(TensorError::NameMismatch {
                dim,
                lhs: a,
                rhs: b,
            }),
            (a, b) => Ok(a.or(b)),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}
