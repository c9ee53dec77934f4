use std::ops::Range;
use std::sync::Arc;

use rand::distr::{Distribution, Uniform};

use crate::tensor::{
    DataType, Device, MemoryFormat, Scalar, Storage, TensorDesc, TensorOptions, check_type,
};
use crate::utils::error::{Result, TensorError};

pub type DimNames = Vec<Option<String>>;

/// A strided view over a shared [`Storage`].
///
/// Cloning a tensor creates another view of the same storage; no element is
/// copied. Dtype is fixed at construction.
#[derive(Clone, Debug)]
pub struct Tensor {
    storage: Arc<Storage>,
    desc: TensorDesc,
    dtype: DataType,
    requires_grad: bool,
    names: Option<DimNames>,
}

impl Tensor {
    /// View `storage` through `desc`. Fails if the view reaches past the storage.
    pub fn from_storage(
        storage: Arc<Storage>,
        desc: TensorDesc,
        dtype: DataType,
        requires_grad: bool,
    ) -> Result<Self> {
        let required = byte_span(&desc, dtype.size_in_bytes())?;
        let available = storage.nbytes();
        if required > available {
            return Err(TensorError::StorageOutOfBounds {
                required,
                available,
            });
        }
        Ok(Self::from_parts(storage, desc, dtype, requires_grad))
    }

    // Callers have already sized `storage` for `desc`
    pub(crate) fn from_parts(
        storage: Arc<Storage>,
        desc: TensorDesc,
        dtype: DataType,
        requires_grad: bool,
    ) -> Self {
        debug_assert!(
            byte_span(&desc, dtype.size_in_bytes()).is_ok_and(|n| n <= storage.nbytes())
        );
        Self {
            storage,
            desc,
            dtype,
            requires_grad,
            names: None,
        }
    }

    /// Uninitialised (in practice zero filled) tensor laid out per the options' memory format.
    pub fn empty(sizes: &[usize], options: &TensorOptions) -> Result<Self> {
        let strides = match options.memory_format() {
            Some(format) => {
                check_format_rank(format, sizes.len())?;
                TensorDesc::strides_for(format, sizes)
            }
            None => TensorDesc::compute_strides(sizes),
        };
        Self::empty_strided(sizes, &strides, options)
    }

    pub fn empty_strided(sizes: &[usize], strides: &[usize], options: &TensorOptions) -> Result<Self> {
        if sizes.len() != strides.len() {
            return Err(TensorError::InvalidSize(format!(
                "sizes {:?} and strides {:?} have different ranks",
                sizes, strides
            )));
        }
        let desc = TensorDesc::new_strided(sizes.to_vec(), strides.to_vec(), 0);
        let nbytes = byte_span(&desc, options.item_size())?;
        let storage = Storage::allocate_on(nbytes, options.device())?;
        tracing::trace!(?sizes, ?strides, nbytes, "allocated tensor");
        Ok(Self::from_parts(
            Arc::new(storage),
            desc,
            options.dtype(),
            options.requires_grad(),
        ))
    }

    /// Allocations come back zero filled, so this is `empty` under a clearer name.
    pub fn zeros(sizes: &[usize], options: &TensorOptions) -> Result<Self> {
        Self::empty(sizes, options)
    }

    pub fn full<T: Scalar>(sizes: &[usize], value: T) -> Result<Self> {
        let t = Self::empty(sizes, &TensorOptions::new(T::TYPE))?;
        let ptr = t.mutable_data_ptr::<T>()?;
        for i in 0..t.numel() {
            // SAFETY: `t` is freshly allocated and contiguous with `numel` elements.
            unsafe { ptr.add(i).write_unaligned(value) };
        }
        Ok(t)
    }

    pub fn from_slice<T: Scalar>(sizes: &[usize], data: &[T]) -> Result<Self> {
        if TensorDesc::new(sizes.to_vec()).num_elements() != data.len() {
            return Err(TensorError::InvalidSize(format!(
                "{} values cannot fill a tensor of shape {:?}",
                data.len(),
                sizes
            )));
        }
        let t = Self::empty(sizes, &TensorOptions::new(T::TYPE))?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        // SAFETY: fresh contiguous allocation holding exactly `data.len()` elements
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), t.raw_data_ptr(), bytes.len())
        };
        Ok(t)
    }

    /// Float tensor with values drawn uniformly from `[low, high)`.
    pub fn rand_uniform(sizes: &[usize], low: f32, high: f32) -> Result<Self> {
        let dist = Uniform::new(low, high).map_err(|e| {
            TensorError::InvalidSize(format!("bad uniform range [{}, {}): {}", low, high, e))
        })?;
        let mut rng = rand::rng();
        let values: Vec<f32> = (0..TensorDesc::new(sizes.to_vec()).num_elements())
            .map(|_| dist.sample(&mut rng))
            .collect();
        Self::from_slice(sizes, &values)
    }

    /// Elements in logical row-major order, whatever the layout.
    pub fn to_vec<T: Scalar>(&self) -> Result<Vec<T>> {
        let ptr = self.const_data_ptr::<T>()?;
        let mut out = Vec::with_capacity(self.numel());
        TensorDesc::for_each_offset(self.sizes(), [self.strides()], [0], |[o]| {
            // SAFETY: every offset of a validated view lies inside its storage.
            out.push(unsafe { ptr.add(o).read_unaligned() })
        });
        Ok(out)
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn sizes(&self) -> &[usize] {
        self.desc.dims()
    }

    pub fn strides(&self) -> &[usize] {
        self.desc.strides()
    }

    pub fn storage_offset(&self) -> usize {
        self.desc.storage_offset()
    }

    pub fn ndim(&self) -> usize {
        self.desc.ndim()
    }

    pub fn numel(&self) -> usize {
        self.desc.num_elements()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn device(&self) -> Device {
        self.storage.device()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    pub fn is_contiguous(&self) -> bool {
        self.desc.is_contiguous()
    }

    pub fn suggest_memory_format(&self) -> MemoryFormat {
        self.desc.suggest_memory_format()
    }

    pub fn options(&self) -> TensorOptions {
        TensorOptions::new(self.dtype)
            .with_device(self.device())
            .with_requires_grad(self.requires_grad)
    }

    pub fn is_same_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Whether writing through `self` may clobber an element of `other`
    /// before it is read.
    ///
    /// Compares addresses, so views over separately imported storages of the
    /// same memory are caught too. Two identical views do not count: each
    /// element is read before the write to the same address.
    pub fn partially_overlaps(&self, other: &Tensor) -> bool {
        if self.numel() == 0 || other.numel() == 0 {
            return false;
        }
        let identical = self.raw_data_ptr() == other.raw_data_ptr()
            && self.sizes() == other.sizes()
            && self.strides() == other.strides()
            && self.dtype.size_in_bytes() == other.dtype.size_in_bytes();
        if identical {
            return false;
        }
        let (a, b) = (self.byte_range(), other.byte_range());
        a.start < b.end && b.start < a.end
    }

    fn byte_range(&self) -> Range<usize> {
        let start = self.raw_data_ptr() as usize;
        let len = self
            .desc
            .span_elements()
            .and_then(|n| n.checked_mul(self.dtype.size_in_bytes()))
            .unwrap_or(usize::MAX);
        start..start.saturating_add(len)
    }

    pub fn names(&self) -> Option<&[Option<String>]> {
        self.names.as_deref()
    }

    pub fn has_names(&self) -> bool {
        self.names
            .as_ref()
            .is_some_and(|names| names.iter().any(Option::is_some))
    }

    pub fn set_names(&mut self, names: Option<DimNames>) -> Result<()> {
        if let Some(n) = &names {
            if n.len() != self.ndim() {
                return Err(TensorError::InvalidSize(format!(
                    "{} dimension names given for a {}-dim tensor",
                    n.len(),
                    self.ndim()
                )));
            }
        }
        self.names = names;
        Ok(())
    }

    pub fn with_names(mut self, names: &[Option<&str>]) -> Result<Self> {
        let names = names.iter().map(|n| n.map(str::to_owned)).collect();
        self.set_names(Some(names))?;
        Ok(self)
    }

    /// New view over the same storage. Fails if the view would leave the storage.
    pub fn as_strided(
        &self,
        sizes: &[usize],
        strides: &[usize],
        storage_offset: Option<usize>,
    ) -> Result<Tensor> {
        let mut view = self.clone();
        view.as_strided_(sizes, strides, storage_offset)?;
        Ok(view)
    }

    /// Re-point this view at a different window of its storage.
    pub fn as_strided_(
        &mut self,
        sizes: &[usize],
        strides: &[usize],
        storage_offset: Option<usize>,
    ) -> Result<()> {
        if sizes.len() != strides.len() {
            return Err(TensorError::InvalidSize(format!(
                "sizes {:?} and strides {:?} have different ranks",
                sizes, strides
            )));
        }
        let desc = TensorDesc::new_strided(
            sizes.to_vec(),
            strides.to_vec(),
            storage_offset.unwrap_or(self.storage_offset()),
        );
        self.set_desc_checked(desc)
    }

    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Tensor> {
        let ndim = self.ndim();
        if dim0 >= ndim || dim1 >= ndim {
            return Err(TensorError::InvalidSize(format!(
                "cannot transpose dims {} and {} of a {}-dim tensor",
                dim0, dim1, ndim
            )));
        }
        let mut sizes = self.sizes().to_vec();
        let mut strides = self.strides().to_vec();
        sizes.swap(dim0, dim1);
        strides.swap(dim0, dim1);
        let mut view = self.as_strided(&sizes, &strides, None)?;
        if let Some(names) = view.names.as_mut() {
            names.swap(dim0, dim1);
        }
        Ok(view)
    }

    /// Give the tensor `sizes` with contiguous strides, growing its storage if
    /// the current one is too small. Returns whether anything changed.
    ///
    /// Growing swaps in a new storage holding a copy of the old bytes; other
    /// views keep the old one.
    pub fn resize_(&mut self, sizes: &[usize]) -> Result<bool> {
        if self.sizes() == sizes {
            return Ok(false);
        }
        let mut desc = self.desc.clone();
        desc.set_sizes_contiguous(sizes.to_vec());

        let required = byte_span(&desc, self.dtype.size_in_bytes())?;
        if required > self.storage.nbytes() {
            self.storage = Arc::new(self.storage.grown(required)?);
        }
        if desc.ndim() != self.ndim() {
            self.names = None;
        }
        self.desc = desc;
        Ok(true)
    }

    /// Resize used on caller supplied out buffers.
    pub fn resize_output(&mut self, sizes: &[usize]) -> Result<bool> {
        if self.sizes() != sizes && self.numel() != 0 {
            tracing::warn!(
                from = ?self.sizes(),
                to = ?sizes,
                "resizing a non-empty out tensor; pass an empty tensor to silence this"
            );
        }
        self.resize_(sizes)
    }

    /// Rewrite strides in place so the current sizes are laid out in `format`.
    pub fn restride(&mut self, format: MemoryFormat) -> Result<()> {
        check_format_rank(format, self.ndim())?;
        let strides = TensorDesc::strides_for(format, self.sizes());
        let mut desc = self.desc.clone();
        desc.set_sizes_and_strides(self.sizes().to_vec(), strides);
        self.set_desc_checked(desc)
    }

    /// Copy `src` element by element, each side read through its own strides.
    pub fn copy_(&mut self, src: &Tensor) -> Result<()> {
        if self.sizes() != src.sizes() {
            return Err(TensorError::ShapeMismatch {
                lhs: self.sizes().to_vec(),
                rhs: src.sizes().to_vec(),
            });
        }
        if self.dtype != src.dtype {
            return Err(TensorError::DtypeMismatch {
                expected: self.dtype,
                found: src.dtype,
            });
        }
        let itemsize = self.dtype.size_in_bytes();
        let dst = self.raw_data_ptr();
        let from = src.raw_data_ptr();
        TensorDesc::for_each_offset(
            self.sizes(),
            [self.strides(), src.strides()],
            [0, 0],
            |[o, i]| {
                // SAFETY: both views were bounds checked against their storages.
                unsafe { std::ptr::copy(from.add(i * itemsize), dst.add(o * itemsize), itemsize) }
            },
        );
        Ok(())
    }

    /// The only element of a one element tensor
    pub fn item<T: Scalar>(&self) -> Result<T> {
        check_type::<T>(self.dtype)?;
        if self.numel() != 1 {
            return Err(TensorError::InvalidSize(format!(
                "a tensor of shape {:?} has no single item",
                self.sizes()
            )));
        }
        let ptr = self.const_data_ptr::<T>()?;
        // SAFETY: a one element view has its element at offset zero.
        Ok(unsafe { ptr.read_unaligned() })
    }

    fn set_desc_checked(&mut self, desc: TensorDesc) -> Result<()> {
        let required = byte_span(&desc, self.dtype.size_in_bytes())?;
        let available = self.storage.nbytes();
        if required > available {
            return Err(TensorError::StorageOutOfBounds {
                required,
                available,
            });
        }
        if desc.ndim() != self.ndim() {
            self.names = None;
        }
        self.desc = desc;
        Ok(())
    }
}

fn check_format_rank(format: MemoryFormat, ndim: usize) -> Result<()> {
    match format.required_rank() {
        Some(rank) if rank != ndim => Err(TensorError::InvalidSize(format!(
            "{:?} needs a rank {} tensor, got rank {}",
            format, rank, ndim
        ))),
        _ => Ok(()),
    }
}

fn byte_span(desc: &TensorDesc, itemsize: usize) -> Result<usize> {
    desc.required_elements()
        .and_then(|elements| elements.checked_mul(itemsize))
        .ok_or_else(|| {
            TensorError::InvalidSize(format!(
                "view {:?} with strides {:?} at offset {} does not fit in memory",
                desc.dims(),
                desc.strides(),
                desc.storage_offset()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_and_to_vec() {
        let t = Tensor::from_slice(&[2, 3], &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(t.dtype(), DataType::Float);
        assert_eq!(t.strides(), &[3, 1]);
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(t.to_vec::<f64>().is_err());

        assert!(Tensor::from_slice(&[2, 2], &[1i32, 2, 3]).is_err());
    }

    #[test]
    fn test_empty_with_memory_format() {
        let options = TensorOptions::new(DataType::Float).with_memory_format(MemoryFormat::ChannelsLast);
        let t = Tensor::empty(&[2, 3, 4, 5], &options).unwrap();
        assert_eq!(t.strides(), &[60, 1, 15, 3]);
        assert_eq!(t.suggest_memory_format(), MemoryFormat::ChannelsLast);

        assert!(matches!(
            Tensor::empty(&[2, 3], &options),
            Err(TensorError::InvalidSize(_))
        ));
    }

    #[test]
    fn test_transpose_reads_through_strides() {
        let t = Tensor::from_slice(&[2, 3], &[1i64, 2, 3, 4, 5, 6]).unwrap();
        let tt = t.transpose(0, 1).unwrap();
        assert_eq!(tt.sizes(), &[3, 2]);
        assert!(!tt.is_contiguous());
        assert!(tt.is_same_storage(&t));
        assert_eq!(tt.to_vec::<i64>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_as_strided_bounds() {
        let t = Tensor::zeros(&[4], &TensorOptions::new(DataType::Int16)).unwrap();
        assert!(t.as_strided(&[2], &[2], Some(1)).is_ok());
        assert_eq!(
            t.as_strided(&[3], &[2], Some(0)).unwrap_err(),
            TensorError::StorageOutOfBounds {
                required: 10,
                available: 8
            }
        );
    }

    #[test]
    fn test_resize_same_shape_is_noop() {
        let mut t = Tensor::from_slice(&[3, 2], &[1u8, 2, 3, 4, 5, 6]).unwrap();
        let mut tt = t.transpose(0, 1).unwrap();
        assert!(!tt.resize_(&[2, 3]).unwrap());
        // strides survive a no-op
        assert_eq!(tt.strides(), &[1, 2]);
        assert!(!t.resize_(&[3, 2]).unwrap());
    }

    #[test]
    fn test_resize_shrink_keeps_storage() {
        let mut t = Tensor::from_slice(&[2, 3], &[1i32, 2, 3, 4, 5, 6]).unwrap();
        let before = Arc::clone(t.storage());
        assert!(t.resize_(&[4]).unwrap());
        assert!(Arc::ptr_eq(&before, t.storage()));
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_resize_grow_reallocates_and_copies() {
        let mut t = Tensor::from_slice(&[2], &[7i32, 8]).unwrap();
        let view = t.clone();
        assert!(t.resize_(&[2, 2]).unwrap());
        assert_eq!(t.strides(), &[2, 1]);
        assert!(!t.is_same_storage(&view));
        assert_eq!(&t.to_vec::<i32>().unwrap()[..2], &[7, 8]);
        // the old view is untouched
        assert_eq!(view.to_vec::<i32>().unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_restride() {
        let mut t = Tensor::zeros(&[1, 2, 2, 2], &TensorOptions::default()).unwrap();
        t.restride(MemoryFormat::ChannelsLast).unwrap();
        assert_eq!(t.strides(), &[8, 1, 4, 2]);
        t.restride(MemoryFormat::Contiguous).unwrap();
        assert!(t.is_contiguous());
        assert!(t.restride(MemoryFormat::ChannelsLast3d).is_err());
    }

    #[test]
    fn test_copy_between_layouts() {
        let src = Tensor::from_slice(&[2, 3], &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut dst = Tensor::zeros(&[3, 2], &TensorOptions::new(DataType::Double))
            .unwrap()
            .transpose(0, 1)
            .unwrap();
        dst.copy_(&src).unwrap();
        assert_eq!(dst.to_vec::<f64>().unwrap(), src.to_vec::<f64>().unwrap());
        assert_eq!(dst.strides(), &[1, 2]);

        let wrong = Tensor::zeros(&[2, 3], &TensorOptions::new(DataType::Float)).unwrap();
        assert!(matches!(
            dst.copy_(&wrong),
            Err(TensorError::DtypeMismatch { .. })
        ));
    }

    #[test]
    fn test_names() {
        let t = Tensor::zeros(&[2, 3], &TensorOptions::default())
            .unwrap()
            .with_names(&[Some("N"), None])
            .unwrap();
        assert!(t.has_names());
        let tt = t.transpose(0, 1).unwrap();
        assert_eq!(tt.names().unwrap(), &[None, Some("N".to_string())]);
        assert!(t.clone().with_names(&[Some("N")]).is_err());
    }

    #[test]
    fn test_full_and_item() {
        let t = Tensor::full(&[2, 2], 3u16).unwrap();
        assert_eq!(t.to_vec::<u16>().unwrap(), vec![3; 4]);
        let one = Tensor::full(&[], true).unwrap();
        assert!(one.item::<bool>().unwrap());
        assert!(t.item::<u16>().is_err());
    }

    #[test]
    fn test_from_storage_checks_span() {
        let storage = Arc::new(Storage::allocate(16, crate::tensor::storage::default_allocator()).unwrap());
        let fits = TensorDesc::new_strided(vec![2, 2], vec![1, 2], 0);
        let t = Tensor::from_storage(Arc::clone(&storage), fits, DataType::Int32, false).unwrap();
        assert_eq!(t.strides(), &[1, 2]);

        let past_end = TensorDesc::new_strided(vec![2, 2], vec![2, 1], 1);
        assert_eq!(
            Tensor::from_storage(Arc::clone(&storage), past_end, DataType::Int32, false).unwrap_err(),
            TensorError::StorageOutOfBounds {
                required: 20,
                available: 16
            }
        );

        let wrapping = TensorDesc::new_strided(vec![3], vec![1 << 63], 0);
        assert!(matches!(
            Tensor::from_storage(storage, wrapping, DataType::UInt8, false),
            Err(TensorError::InvalidSize(_))
        ));
    }

    #[test]
    fn test_oversized_shapes_fail_cleanly() {
        let options = TensorOptions::new(DataType::Float);
        assert!(matches!(
            Tensor::zeros(&[1 << 40, 1 << 40], &options),
            Err(TensorError::InvalidSize(_))
        ));
        assert!(matches!(
            Tensor::empty_strided(&[2, 2], &[usize::MAX, 1], &options),
            Err(TensorError::InvalidSize(_))
        ));

        let mut t = Tensor::zeros(&[1], &TensorOptions::new(DataType::Int32)).unwrap();
        assert!(matches!(
            t.as_strided(&[3], &[1 << 63], None),
            Err(TensorError::InvalidSize(_))
        ));
        assert!(matches!(
            t.as_strided(&[1], &[1], Some(usize::MAX)),
            Err(TensorError::InvalidSize(_))
        ));
        assert!(matches!(
            t.resize_(&[1 << 40, 1 << 40]),
            Err(TensorError::InvalidSize(_))
        ));
        assert_eq!(t.sizes(), &[1]);
    }

    #[test]
    fn test_partial_overlap() {
        let base = Tensor::from_slice(&[4], &[1i64, 2, 3, 4]).unwrap();
        let head = base.as_strided(&[3], &[1], Some(0)).unwrap();
        let tail = base.as_strided(&[3], &[1], Some(1)).unwrap();
        let last = base.as_strided(&[1], &[1], Some(3)).unwrap();
        assert!(head.partially_overlaps(&tail));
        assert!(!head.partially_overlaps(&last));
        assert!(!head.partially_overlaps(&head.clone()));

        let square = base.as_strided(&[2, 2], &[2, 1], None).unwrap();
        assert!(square.partially_overlaps(&square.transpose(0, 1).unwrap()));

        let other = Tensor::from_slice(&[4], &[1i64, 2, 3, 4]).unwrap();
        assert!(!base.partially_overlaps(&other));
    }

    #[test]
    fn test_rand_uniform_range() {
        let t = Tensor::rand_uniform(&[64], -1.0, 1.0).unwrap();
        assert!(t.to_vec::<f32>().unwrap().iter().all(|v| (-1.0..1.0).contains(v)));
        assert!(Tensor::rand_uniform(&[4], 1.0, 1.0).is_err());
    }
}
