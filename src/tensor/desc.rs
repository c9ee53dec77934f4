use crate::tensor::MemoryFormat;

/// Logical geometry of a tensor view: sizes, element strides and the element
/// offset of the first element inside its storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TensorDesc {
    dims: Vec<usize>,
    strides: Vec<usize>,
    storage_offset: usize,
}

impl TensorDesc {
    pub fn new(dims: Vec<usize>) -> Self {
        let strides = Self::compute_strides(&dims);
        Self {
            dims,
            strides,
            storage_offset: 0,
        }
    }

    pub fn new_strided(dims: Vec<usize>, strides: Vec<usize>, storage_offset: usize) -> Self {
        assert_eq!(
            dims.len(),
            strides.len(),
            "dims {:?} and strides {:?} must have the same rank",
            dims,
            strides
        );
        Self {
            dims,
            strides,
            storage_offset,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn storage_offset(&self) -> usize {
        self.storage_offset
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Element count; saturates for shapes no storage could back.
    pub fn num_elements(&self) -> usize {
        Self::count(&self.dims)
    }

    fn count(dims: &[usize]) -> usize {
        if dims.contains(&0) {
            return 0;
        }
        dims.iter().fold(1, |acc, &d| acc.saturating_mul(d))
    }

    pub fn set_storage_offset(&mut self, storage_offset: usize) {
        self.storage_offset = storage_offset;
    }

    /// Replace sizes and strides, keeping the storage offset
    pub fn set_sizes_and_strides(&mut self, dims: Vec<usize>, strides: Vec<usize>) {
        assert_eq!(dims.len(), strides.len());
        self.dims = dims;
        self.strides = strides;
    }

    pub fn set_sizes_contiguous(&mut self, dims: Vec<usize>) {
        self.strides = Self::compute_strides(&dims);
        self.dims = dims;
    }

    /// Elements between the first and one past the last element of the view.
    ///
    /// `None` when the span does not fit in `usize`.
    pub fn span_elements(&self) -> Option<usize> {
        if self.dims.contains(&0) {
            return Some(0);
        }
        self.dims
            .iter()
            .zip(&self.strides)
            .try_fold(1usize, |acc, (&d, &s)| (d - 1).checked_mul(s)?.checked_add(acc))
    }

    /// Number of storage elements this view reaches, counted from the start of storage.
    pub fn required_elements(&self) -> Option<usize> {
        self.span_elements()?.checked_add(self.storage_offset)
    }

    // Size one dims are skipped, they can carry any stride
    pub fn is_contiguous(&self) -> bool {
        if self.num_elements() == 0 {
            return true;
        }
        let mut expected = 1;
        for (&d, &s) in self.dims.iter().zip(&self.strides).rev() {
            if d == 1 {
                continue;
            }
            if s != expected {
                return false;
            }
            expected = expected.saturating_mul(d);
        }
        true
    }

    /// Layout the current strides embody, falling back to contiguous
    pub fn suggest_memory_format(&self) -> MemoryFormat {
        for format in [MemoryFormat::ChannelsLast, MemoryFormat::ChannelsLast3d] {
            if format.required_rank() == Some(self.ndim())
                && self.strides == Self::strides_for(format, &self.dims)
                && !self.is_contiguous()
            {
                return format;
            }
        }
        MemoryFormat::Contiguous
    }

    // Calculate strides for row-major memory layout. Strides saturate, so an
    // oversized shape is caught by `span_elements` instead of wrapping.
    pub fn compute_strides(dims: &[usize]) -> Vec<usize> {
        let mut s = vec![1usize; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            s[i] = s[i + 1].saturating_mul(dims[i + 1].max(1));
        }
        s
    }

    /// Strides for `dims` laid out in `format`.
    ///
    /// Channels-last formats are only defined for their own rank; any other rank
    /// gets row-major strides.
    pub fn strides_for(format: MemoryFormat, dims: &[usize]) -> Vec<usize> {
        match (format, dims.len()) {
            (MemoryFormat::ChannelsLast, 4) => {
                let mut s = vec![0; 4];
                s[1] = 1;
                s[3] = dims[1].max(1);
                s[2] = s[3].saturating_mul(dims[3].max(1));
                s[0] = s[2].saturating_mul(dims[2].max(1));
                s
            }
            (MemoryFormat::ChannelsLast3d, 5) => {
                let mut s = vec![0; 5];
                s[1] = 1;
                s[4] = dims[1].max(1);
                s[3] = s[4].saturating_mul(dims[4].max(1));
                s[2] = s[3].saturating_mul(dims[3].max(1));
                s[0] = s[2].saturating_mul(dims[2].max(1));
                s
            }
            _ => Self::compute_strides(dims),
        }
    }

    pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
        let ndim = a.len().max(b.len());
        let mut out = vec![1; ndim];
        for i in 0..ndim {
            let ai = *a.get(a.len().wrapping_sub(i + 1)).unwrap_or(&1);
            let bi = *b.get(b.len().wrapping_sub(i + 1)).unwrap_or(&1);
            if ai == bi || ai == 1 || bi == 1 {
                out[ndim - 1 - i] = if ai == 1 { bi } else { ai };
            } else {
                return None;
            }
        }
        Some(out)
    }

    /// Strides that read `src` as if it had the shape `dst`; broadcast dims get stride 0.
    pub fn broadcast_strides(src_dims: &[usize], src_strides: &[usize], dst: &[usize]) -> Vec<usize> {
        let mut bs = vec![0; dst.len()];
        let offset = dst.len().saturating_sub(src_dims.len());
        for i in 0..dst.len() {
            let dim = *src_dims.get(i.wrapping_sub(offset)).unwrap_or(&1);
            let stride = *src_strides.get(i.wrapping_sub(offset)).unwrap_or(&0);
            bs[i] = if dim == 1 { 0 } else { stride };
        }
        bs
    }

    /// Walk every index of `dims` in row-major order, handing `f` one element
    /// offset per stride set. Offsets start at `bases`.
    pub fn for_each_offset<const N: usize>(
        dims: &[usize],
        strides: [&[usize]; N],
        bases: [usize; N],
        mut f: impl FnMut([usize; N]),
    ) {
        let num_elements = Self::count(dims);
        if num_elements == 0 {
            return;
        }

        let rank = dims.len();
        let mut idxs = vec![0usize; rank];
        let mut offs = bases;

        for _ in 0..num_elements {
            f(offs);

            // increment odometer
            for d in (0..rank).rev() {
                idxs[d] += 1;
                // the step past the last index is undone below, so it may wrap
                for (off, s) in offs.iter_mut().zip(&strides) {
                    *off = off.wrapping_add(s[d]);
                }

                if idxs[d] < dims[d] {
                    break;
                }
                // carry: reset this index and take back what it walked
                idxs[d] = 0;
                for (off, s) in offs.iter_mut().zip(&strides) {
                    *off = off.wrapping_sub(s[d].wrapping_mul(dims[d]));
                }
            }
        }
    }
}
