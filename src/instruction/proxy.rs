use crate::tensor::{Tensor, TensorOptions};
use crate::utils::error::Result;

/// Scratch output in the kernel's preferred layout, when `out` does not have it.
///
/// Returns `None` when `out` can be written directly, including when no
/// layout was requested. A returned proxy must be copied back into `out`
/// once the kernel has run.
pub fn maybe_create_proxy(
    out: &Tensor,
    sizes: &[usize],
    strides: &[usize],
    options: &TensorOptions,
) -> Result<Option<Tensor>> {
    if strides.is_empty() || out.strides() == strides {
        return Ok(None);
    }
    tracing::debug!(
        out_strides = ?out.strides(),
        proxy_strides = ?strides,
        "creating proxy output"
    );
    Tensor::empty_strided(sizes, strides, options).map(Some)
}

/// Value copy of the proxy's elements into `out`; the proxy can be dropped afterwards.
pub fn copy_back(proxy: &Tensor, out: &mut Tensor) -> Result<()> {
    tracing::trace!(sizes = ?proxy.sizes(), "copying proxy back into out");
    out.copy_(proxy)
}
