use crate::tensor::{DataType, Device};

/// Named physical layouts a caller can ask for instead of explicit strides
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryFormat {
    Contiguous,
    /// NCHW sizes laid out as NHWC
    ChannelsLast,
    /// NCDHW sizes laid out as NDHWC
    ChannelsLast3d,
}

impl MemoryFormat {
    /// Rank the layout is defined for, `None` when any rank works
    pub fn required_rank(&self) -> Option<usize> {
        match self {
            MemoryFormat::Contiguous => None,
            MemoryFormat::ChannelsLast => Some(4),
            MemoryFormat::ChannelsLast3d => Some(5),
        }
    }
}

/// Requested configuration for a tensor: dtype, device, layout hint and grad flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorOptions {
    dtype: DataType,
    device: Option<Device>,
    memory_format: Option<MemoryFormat>,
    requires_grad: bool,
}

impl Default for TensorOptions {
    fn default() -> Self {
        Self {
            dtype: DataType::Float,
            device: None,
            memory_format: None,
            requires_grad: false,
        }
    }
}

impl TensorOptions {
    pub fn new(dtype: DataType) -> Self {
        Self::default().with_dtype(dtype)
    }

    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_memory_format(mut self, memory_format: MemoryFormat) -> Self {
        self.memory_format = Some(memory_format);
        self
    }

    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Requested device, host memory when none was given
    pub fn device(&self) -> Device {
        self.device.unwrap_or_default()
    }

    pub fn device_opt(&self) -> Option<Device> {
        self.device
    }

    pub fn memory_format(&self) -> Option<MemoryFormat> {
        self.memory_format
    }

    pub fn has_memory_format(&self) -> bool {
        self.memory_format.is_some()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn item_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }
}
