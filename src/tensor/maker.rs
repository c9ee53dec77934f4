//! Wrapping externally owned memory as a tensor.

use std::sync::Arc;

use crate::tensor::storage::{Allocator, Context, DataPtr, Release, Storage};
use crate::tensor::{
    Device, HostPointerClassifier, MemoryFormat, PointerClassifier, Tensor, TensorDesc,
    TensorOptions, check_sizes, compute_storage_bytes,
};
use crate::utils::error::{Result, TensorError};

type Deleter = Box<dyn FnOnce(*mut u8) + Send>;

static ZEROS: [i64; 5] = [0; 5];

/// All-zero probe sizes of the rank a memory format is defined for.
pub fn temp_sizes(memory_format: Option<MemoryFormat>) -> &'static [i64] {
    match memory_format {
        Some(MemoryFormat::ChannelsLast) => &ZEROS[..4],
        Some(MemoryFormat::ChannelsLast3d) => &ZEROS[..5],
        _ => &ZEROS[..1],
    }
}

/// Builder for a tensor viewing memory the runtime did not allocate.
///
/// The memory is released by at most one of: a deleter called with the data
/// address, or a context object whose own deleter runs. With neither the
/// memory is borrowed and must outlive every view.
///
/// On failure the deleter is dropped without being called; a context moved
/// into the builder is released like any other owned value.
pub struct TensorMaker {
    data: *mut u8,
    sizes: Vec<i64>,
    strides: Option<Vec<i64>>,
    storage_offset: Option<i64>,
    deleter: Option<Deleter>,
    context: Option<Context>,
    device: Option<Device>,
    options: TensorOptions,
    allocator: Option<Arc<dyn Allocator>>,
    resizable: bool,
    classifier: Arc<dyn PointerClassifier>,
}

/// Start building a tensor over `data` with `sizes`.
pub fn for_blob(data: *mut u8, sizes: &[i64]) -> TensorMaker {
    TensorMaker {
        data,
        sizes: sizes.to_vec(),
        strides: None,
        storage_offset: None,
        deleter: None,
        context: None,
        device: None,
        options: TensorOptions::default(),
        allocator: None,
        resizable: false,
        classifier: Arc::new(HostPointerClassifier),
    }
}

/// Dense tensor over `data`, released through `deleter` once the last view is gone.
pub fn from_blob(
    data: *mut u8,
    sizes: &[i64],
    deleter: impl FnOnce(*mut u8) + Send + 'static,
    options: TensorOptions,
) -> Result<Tensor> {
    for_blob(data, sizes)
        .deleter(deleter)
        .options(options)
        .make_tensor()
}

impl TensorMaker {
    pub fn strides(mut self, strides: &[i64]) -> Self {
        self.strides = Some(strides.to_vec());
        self
    }

    pub fn storage_offset(mut self, storage_offset: i64) -> Self {
        self.storage_offset = Some(storage_offset);
        self
    }

    pub fn deleter(mut self, deleter: impl FnOnce(*mut u8) + Send + 'static) -> Self {
        self.deleter = Some(Box::new(deleter));
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Device the memory lives on; skips pointer classification.
    pub fn target_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn options(mut self, options: TensorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn resizable_storage(mut self) -> Self {
        self.resizable = true;
        self
    }

    pub fn pointer_classifier(mut self, classifier: Arc<dyn PointerClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Bytes the imported storage is declared to hold.
    pub fn compute_storage_size(&self) -> Result<usize> {
        compute_storage_bytes(
            &self.sizes,
            self.strides.as_deref(),
            self.options.item_size(),
            self.storage_offset,
        )
    }

    pub fn make_tensor(self) -> Result<Tensor> {
        let dims = check_sizes(&self.sizes)?;

        if self.deleter.is_some() && self.context.is_some() {
            return Err(TensorError::ContractViolation(
                "the deleter and context arguments are mutually exclusive".to_string(),
            ));
        }

        let device = match self.device {
            Some(device) => device,
            None => self
                .classifier
                .device_of(self.data, self.options.device().kind()),
        };
        if let Some(requested) = self.options.device_opt() {
            if requested.has_index() && requested != device {
                return Err(TensorError::DeviceMismatch {
                    expected: requested,
                    found: device,
                });
            }
        }

        let nbytes = self.compute_storage_size()?;

        if self.resizable && self.allocator.is_none() {
            return Err(TensorError::MissingAllocator);
        }

        let desc = self.layout(dims)?;

        let release = match (self.deleter, self.context) {
            (Some(deleter), None) => Release::ByCallback(deleter),
            (None, Some(context)) => Release::ByContext(context),
            _ => Release::None,
        };
        let data_ptr = DataPtr::new(self.data, release, device);
        tracing::debug!(
            ptr = ?self.data,
            nbytes,
            %device,
            resizable = self.resizable,
            "imported external buffer"
        );

        let storage = Storage::new(data_ptr, nbytes, self.allocator, self.resizable);
        Ok(Tensor::from_parts(
            Arc::new(storage),
            desc,
            self.options.dtype(),
            self.options.requires_grad(),
        ))
    }

    // Explicit strides win; otherwise a memory format hint decides, defaulting to contiguous.
    fn layout(&self, dims: Vec<usize>) -> Result<TensorDesc> {
        let offset = self.storage_offset.unwrap_or(0) as usize;
        if let Some(strides) = &self.strides {
            // already validated as non-negative by the size computation
            let strides = strides.iter().map(|&s| s as usize).collect();
            return Ok(TensorDesc::new_strided(dims, strides, offset));
        }

        let format = self.options.memory_format();
        let probe = temp_sizes(format);
        let strides = match format {
            Some(format) if format.required_rank().is_some() => {
                if probe.len() != dims.len() {
                    return Err(TensorError::InvalidSize(format!(
                        "{:?} needs a rank {} tensor, got sizes {:?}",
                        format,
                        probe.len(),
                        self.sizes
                    )));
                }
                TensorDesc::strides_for(format, &dims)
            }
            _ => TensorDesc::compute_strides(&dims),
        };
        Ok(TensorDesc::new_strided(dims, strides, offset))
    }
}
