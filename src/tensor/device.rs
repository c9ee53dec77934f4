use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceType {
    CPU,
    GPU,
}

/// Device a tensor's memory lives on. The index is optional so that a
/// partially specified device ("some GPU") can be expressed in options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Device {
    kind: DeviceType,
    index: Option<usize>,
}

impl Device {
    pub const fn new(kind: DeviceType, index: Option<usize>) -> Self {
        Self { kind, index }
    }

    pub const fn cpu() -> Self {
        Self::new(DeviceType::CPU, None)
    }

    pub const fn gpu(index: usize) -> Self {
        Self::new(DeviceType::GPU, Some(index))
    }

    pub fn kind(&self) -> DeviceType {
        self.kind
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, DeviceType::CPU)
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.kind, DeviceType::GPU)
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self.kind {
            DeviceType::CPU => "cpu",
            DeviceType::GPU => "gpu",
        };
        match self.index {
            Some(idx) => write!(f, "{}:{}", name, idx),
            None => write!(f, "{}", name),
        }
    }
}

/// Works out which device a raw address belongs to.
///
/// Buffer import consults this when the caller did not name a device.
pub trait PointerClassifier: Send + Sync {
    fn device_of(&self, ptr: *const u8, hint: DeviceType) -> Device;
}

/// Classifier for a host-only runtime. CPU hints resolve to the CPU; an
/// accelerator hint can only be taken at face value and resolves to device 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPointerClassifier;

impl PointerClassifier for HostPointerClassifier {
    fn device_of(&self, _ptr: *const u8, hint: DeviceType) -> Device {
        match hint {
            DeviceType::CPU => Device::cpu(),
            DeviceType::GPU => Device::gpu(0),
        }
    }
}
