pub mod elementwise;
pub mod meta;
pub mod output;
pub mod proxy;

pub mod add {
    pub mod add;
}
pub mod mul {
    pub mod mul;
}

pub use add::add::{Add, add, add_, add_out, add_outf};
pub use elementwise::{BinaryOp, Element};
pub use meta::{OutputDescriptor, binary_elementwise_meta};
pub use mul::mul::{Mul, mul, mul_, mul_out, mul_outf};
pub use output::OutputResolver;
pub use proxy::maybe_create_proxy;
