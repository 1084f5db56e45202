//! Geode's DataSerializable wire format: primitives, tagged objects and keys.

mod data_input;
mod data_output;
pub mod ds_code;
pub mod key;
pub mod value;

pub use data_input::{DataInput, ObjectDataInput};
pub use data_output::{DataOutput, ObjectDataOutput};
pub use key::CacheableKey;
pub use value::Value;
