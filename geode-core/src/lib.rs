//! Core types for the Geode client: the wire codec, cacheable values and PDX.

#![warn(missing_docs)]

pub mod error;
pub mod pdx;
pub mod serialization;

pub use error::{GeodeError, Result};
pub use pdx::{
    PdxFieldType, PdxInstance, PdxReader, PdxReaderExt, PdxSerializable, PdxSerializer, PdxType,
    PdxTypeRegistry, PdxWriter, PdxWriterExt,
};
pub use serialization::{
    CacheableKey, DataInput, DataOutput, ObjectDataInput, ObjectDataOutput, Value,
};
