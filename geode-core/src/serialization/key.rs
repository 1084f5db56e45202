//! Hash codes that agree with the server's view of a key.
//!
//! The server buckets keys by their Java `hashCode()`, so every key type
//! produces exactly the value the equivalent Java object would.

use super::Value;
use crate::error::Result;
use crate::pdx::PdxTypeRegistry;
use chrono::{DateTime, Utc};

/// A value that can be used to route an entry to its bucket.
pub trait CacheableKey {
    /// Returns the Java-compatible hash code.
    fn hashcode(&self) -> i32;
}

/// Java `Long.hashCode`.
pub fn hash_long(v: i64) -> i32 {
    (v ^ ((v as u64) >> 32) as i64) as i32
}

/// Java `String.hashCode` over UTF-16 code units.
pub fn hash_str(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Java `Arrays.hashCode(byte[])` with signed bytes.
pub fn hash_bytes(bytes: &[u8]) -> i32 {
    bytes
        .iter()
        .fold(1i32, |h, &b| h.wrapping_mul(31).wrapping_add(b as i8 as i32))
}

fn hash_seq<I: IntoIterator<Item = i32>>(items: I) -> i32 {
    items
        .into_iter()
        .fold(1i32, |h, item| h.wrapping_mul(31).wrapping_add(item))
}

impl CacheableKey for i8 {
    fn hashcode(&self) -> i32 {
        *self as i32
    }
}

impl CacheableKey for i16 {
    fn hashcode(&self) -> i32 {
        *self as i32
    }
}

impl CacheableKey for i32 {
    fn hashcode(&self) -> i32 {
        *self
    }
}

impl CacheableKey for i64 {
    fn hashcode(&self) -> i32 {
        hash_long(*self)
    }
}

impl CacheableKey for bool {
    fn hashcode(&self) -> i32 {
        if *self {
            1231
        } else {
            1237
        }
    }
}

impl CacheableKey for char {
    fn hashcode(&self) -> i32 {
        *self as u32 as i32
    }
}

impl CacheableKey for f32 {
    fn hashcode(&self) -> i32 {
        self.to_bits() as i32
    }
}

impl CacheableKey for f64 {
    fn hashcode(&self) -> i32 {
        hash_long(self.to_bits() as i64)
    }
}

impl CacheableKey for str {
    fn hashcode(&self) -> i32 {
        hash_str(self)
    }
}

impl CacheableKey for String {
    fn hashcode(&self) -> i32 {
        hash_str(self)
    }
}

impl CacheableKey for [u8] {
    fn hashcode(&self) -> i32 {
        hash_bytes(self)
    }
}

impl CacheableKey for Vec<u8> {
    fn hashcode(&self) -> i32 {
        hash_bytes(self)
    }
}

impl CacheableKey for DateTime<Utc> {
    fn hashcode(&self) -> i32 {
        hash_long(self.timestamp_millis())
    }
}

impl<T: CacheableKey + ?Sized> CacheableKey for &T {
    fn hashcode(&self) -> i32 {
        (**self).hashcode()
    }
}

impl Value {
    /// Returns the hash code used to route this value as a key.
    ///
    /// PDX instances hash their identity fields, resolved through `registry`,
    /// so an instance read from the wire routes like the one that was written.
    /// Every other value hashes as [`CacheableKey::hashcode`].
    pub fn key_hashcode(&self, registry: &PdxTypeRegistry) -> Result<i32> {
        match self {
            Value::Pdx(p) => p.hashcode(registry),
            Value::ObjectArray(v) | Value::List(v) => v
                .iter()
                .try_fold(1i32, |h, item| {
                    Ok(h.wrapping_mul(31).wrapping_add(item.key_hashcode(registry)?))
                }),
            other => Ok(other.hashcode()),
        }
    }
}

/// Registry-free hash. A PDX instance contributes its type id and bytes.
impl CacheableKey for Value {
    fn hashcode(&self) -> i32 {
        match self {
            Value::Null => 0,
            Value::Bool(v) => v.hashcode(),
            Value::Char(v) => v.hashcode(),
            Value::Byte(v) => v.hashcode(),
            Value::Short(v) => v.hashcode(),
            Value::Int(v) => v.hashcode(),
            Value::Long(v) => v.hashcode(),
            Value::Float(v) => v.hashcode(),
            Value::Double(v) => v.hashcode(),
            Value::Date(v) => v.hashcode(),
            Value::String(v) => v.hashcode(),
            Value::ByteArray(v) => v.hashcode(),
            Value::BoolArray(v) => hash_seq(v.iter().map(CacheableKey::hashcode)),
            Value::CharArray(v) => hash_seq(v.iter().map(CacheableKey::hashcode)),
            Value::ShortArray(v) => hash_seq(v.iter().map(CacheableKey::hashcode)),
            Value::IntArray(v) => hash_seq(v.iter().copied()),
            Value::LongArray(v) => hash_seq(v.iter().map(CacheableKey::hashcode)),
            Value::FloatArray(v) => hash_seq(v.iter().map(CacheableKey::hashcode)),
            Value::DoubleArray(v) => hash_seq(v.iter().map(CacheableKey::hashcode)),
            Value::StringArray(v) => hash_seq(v.iter().map(CacheableKey::hashcode)),
            Value::ArrayOfByteArrays(v) => hash_seq(v.iter().map(CacheableKey::hashcode)),
            Value::ObjectArray(v) | Value::List(v) => {
                hash_seq(v.iter().map(CacheableKey::hashcode))
            }
            Value::Pdx(p) => p.structural_hash(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::value::date_from_millis;

    #[test]
    fn test_int_hash_is_identity() {
        assert_eq!(42i32.hashcode(), 42);
        assert_eq!((-7i32).hashcode(), -7);
    }

    #[test]
    fn test_long_hash_matches_java() {
        assert_eq!(0i64.hashcode(), 0);
        assert_eq!(1i64.hashcode(), 1);
        assert_eq!((-1i64).hashcode(), 0);
        assert_eq!(0x1_0000_0001i64.hashcode(), 0);
        assert_eq!(i64::MAX.hashcode(), i32::MIN);
    }

    #[test]
    fn test_string_hash_matches_java() {
        assert_eq!("".hashcode(), 0);
        assert_eq!("a".hashcode(), 97);
        assert_eq!("hello".hashcode(), 99_162_322);
        assert_eq!(String::from("Key-0").hashcode(), "Key-0".hashcode());
    }

    #[test]
    fn test_string_hash_wraps() {
        assert_eq!("the quick brown fox".hashcode(), 1_302_335_171);
    }

    #[test]
    fn test_bool_hash_matches_java() {
        assert_eq!(true.hashcode(), 1231);
        assert_eq!(false.hashcode(), 1237);
    }

    #[test]
    fn test_bytes_hash_uses_signed_bytes() {
        assert_eq!(hash_bytes(&[]), 1);
        assert_eq!(hash_bytes(&[0xFF]), 31 - 1);
    }

    #[test]
    fn test_date_hash_is_long_hash_of_millis() {
        let date = date_from_millis(1_234_567_890_123).unwrap();
        assert_eq!(date.hashcode(), hash_long(1_234_567_890_123));
    }

    #[test]
    fn test_value_hash_delegates() {
        assert_eq!(Value::Int(9).hashcode(), 9);
        assert_eq!(Value::from("a").hashcode(), 97);
        assert_eq!(Value::Null.hashcode(), 0);
    }

    #[test]
    fn test_key_hashcode_of_plain_values() {
        let registry = PdxTypeRegistry::new();
        assert_eq!(Value::Int(9).key_hashcode(&registry).unwrap(), 9);
        assert_eq!(
            Value::from("a").key_hashcode(&registry).unwrap(),
            Value::from("a").hashcode()
        );
    }

    #[test]
    fn test_key_hashcode_of_pdx_uses_identity_fields() {
        use crate::pdx::{PdxInstance, PdxLocalWriter, PdxWriter};

        let registry = PdxTypeRegistry::new();
        let mut writer = PdxLocalWriter::new(&registry, "Key");
        writer.write_long("id", 42).unwrap();
        writer.mark_identity_field("id").unwrap();
        writer.write_string("label", Some("x")).unwrap();
        let built = writer.finish().unwrap();
        let wire = PdxInstance::from_bytes(&built.to_bytes()).unwrap();

        let built = Value::Pdx(built);
        let wire = Value::Pdx(wire);
        assert_eq!(built, wire);
        assert_eq!(built.hashcode(), wire.hashcode());
        assert_eq!(
            built.key_hashcode(&registry).unwrap(),
            wire.key_hashcode(&registry).unwrap()
        );
    }
}
