//! Element type tags.
//!
//! The set is closed: every tag maps to exactly one host representation, and the
//! quantized tags additionally name the plain integer tag they are stored as.

/// Runtime element-type tag carried by every tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    UInt8,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    BFloat16,
    Float,
    Double,
    ComplexFloat,
    ComplexDouble,
    // Quantized integers, stored as their underlying integer tag
    QInt8,
    QUInt8,
    QInt32,
}

impl DataType {
    pub const ALL: [DataType; 18] = [
        DataType::Bool,
        DataType::UInt8,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
        DataType::Float16,
        DataType::BFloat16,
        DataType::Float,
        DataType::Double,
        DataType::ComplexFloat,
        DataType::ComplexDouble,
        DataType::QInt8,
        DataType::QUInt8,
        DataType::QInt32,
    ];

    /// Size of one element in bytes
    pub const fn size_in_bytes(&self) -> usize {
        match self {
            Self::Bool | Self::UInt8 | Self::Int8 | Self::QInt8 | Self::QUInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float | Self::QInt32 => 4,
            Self::Int64 | Self::UInt64 | Self::Double | Self::ComplexFloat => 8,
            Self::ComplexDouble => 16,
        }
    }

    pub const fn is_quantized(&self) -> bool {
        matches!(self, Self::QInt8 | Self::QUInt8 | Self::QInt32)
    }

    pub const fn is_floating_point(&self) -> bool {
        matches!(
            self,
            Self::Float16 | Self::BFloat16 | Self::Float | Self::Double
        )
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, Self::ComplexFloat | Self::ComplexDouble)
    }

    /// The storage representation of a quantized tag; plain tags map to themselves.
    pub const fn to_underlying(&self) -> DataType {
        match self {
            Self::QInt8 => Self::Int8,
            Self::QUInt8 => Self::UInt8,
            Self::QInt32 => Self::Int32,
            other => *other,
        }
    }
}
