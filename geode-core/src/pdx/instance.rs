//! Serialized PDX objects kept in their wire form.

use super::pdx_type::offset_size_from_len;
use super::{reader, PdxSerializable, PdxType, PdxTypeRegistry};
use crate::error::{GeodeError, Result};
use crate::serialization::key::hash_bytes;
use crate::serialization::{ds_code, DataInput, DataOutput, ObjectDataInput, Value};
use std::fmt;

/// A PDX object that has not been decoded into a Rust type.
///
/// Holds the type id and the body that follows it on the wire: the field
/// area and the offset table.
#[derive(Clone)]
pub struct PdxInstance {
    type_id: i32,
    body: Vec<u8>,
    identity_hash: Option<i32>,
}

/// Where the field area ends and how the offset table is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout {
    /// Number of field bytes before the offset table.
    pub field_area_len: usize,
    /// Width of one offset table entry.
    pub offset_size: usize,
}

impl PdxInstance {
    /// Wraps a body produced by a writer or read from the wire.
    pub fn new(type_id: i32, body: Vec<u8>) -> Self {
        Self {
            type_id,
            body,
            identity_hash: None,
        }
    }

    pub(crate) fn with_identity_hash(mut self, hash: i32) -> Self {
        self.identity_hash = Some(hash);
        self
    }

    /// Returns the type id the body was written with.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Returns the field area followed by the offset table.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serializes `value` through the registry's local type for its class.
    pub fn from_object<T: PdxSerializable>(registry: &PdxTypeRegistry, value: &T) -> Result<Self> {
        super::serializer::encode_instance(registry, value)
    }

    /// Decodes this instance into `T`.
    pub fn to_object<T: PdxSerializable>(&self, registry: &PdxTypeRegistry) -> Result<T> {
        super::serializer::decode_instance(registry, self, None)
    }

    /// Reads the body that follows a PDX type tag: length, type id, body bytes.
    pub fn read_body<R: DataInput + ?Sized>(input: &mut R) -> Result<Self> {
        let len = input.read_int()?;
        if len < 0 {
            return Err(GeodeError::Serialization(format!(
                "invalid PDX length: {}",
                len
            )));
        }
        let type_id = input.read_int()?;
        let body = input.read_bytes(len as usize)?;
        Ok(Self::new(type_id, body))
    }

    /// Writes the tag, length, type id and body.
    pub fn write_to<W: DataOutput + ?Sized>(&self, out: &mut W) -> Result<()> {
        out.write_ubyte(ds_code::PDX)?;
        out.write_int(self.body.len() as i32)?;
        out.write_int(self.type_id)?;
        out.write_bytes(&self.body)
    }

    /// Returns the tagged wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.body.len() + 9);
        bytes.push(ds_code::PDX);
        bytes.extend_from_slice(&(self.body.len() as i32).to_be_bytes());
        bytes.extend_from_slice(&self.type_id.to_be_bytes());
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Parses the tagged wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut input = ObjectDataInput::new(bytes);
        let code = input.read_ubyte()?;
        if code != ds_code::PDX {
            return Err(GeodeError::Serialization(format!(
                "expected PDX type code {}, found {}",
                ds_code::PDX,
                code
            )));
        }
        Self::read_body(&mut input)
    }

    /// Splits the body into field area and offset table according to `pdx_type`.
    pub fn layout(&self, pdx_type: &PdxType) -> Result<BodyLayout> {
        let offset_size = offset_size_from_len(self.body.len());
        let table_len = pdx_type.offset_count() * offset_size;
        let field_area_len = self.body.len().checked_sub(table_len).ok_or_else(|| {
            GeodeError::Serialization(format!(
                "PDX body of {} bytes cannot hold {} offsets for type {}",
                self.body.len(),
                pdx_type.offset_count(),
                pdx_type.type_id()
            ))
        })?;
        Ok(BodyLayout {
            field_area_len,
            offset_size,
        })
    }

    /// Reads a single field by name without decoding the rest of the object.
    ///
    /// Missing fields yield the field type's default.
    pub fn field(&self, registry: &PdxTypeRegistry, name: &str) -> Result<Value> {
        let pdx_type = registry.resolve(self.type_id)?;
        let field = match pdx_type.field(name) {
            Some(field) => field,
            None => return Ok(Value::Null),
        };
        let layout = self.layout(&pdx_type)?;
        let offsets = &self.body[layout.field_area_len..];
        match pdx_type.get_field_position(
            field.index(),
            offsets,
            layout.offset_size,
            layout.field_area_len,
        ) {
            Some(pos) => {
                let mut input = ObjectDataInput::new(&self.body[..layout.field_area_len]);
                input.set_position(pos)?;
                reader::read_field_value(&mut input, field.field_type())
            }
            None => Ok(field.field_type().default_value()),
        }
    }

    /// Returns the field names of this instance's type in declaration order.
    pub fn field_names(&self, registry: &PdxTypeRegistry) -> Result<Vec<String>> {
        let pdx_type = registry.resolve(self.type_id)?;
        Ok(pdx_type.fields().iter().map(|f| f.name().to_string()).collect())
    }

    /// Computes the identity hash from the identity fields of `pdx_type`,
    /// or from every field if none is marked.
    pub fn compute_identity_hash(&self, pdx_type: &PdxType) -> Result<i32> {
        let layout = self.layout(pdx_type)?;
        let offsets = &self.body[layout.field_area_len..];
        let area = &self.body[..layout.field_area_len];
        let marked = pdx_type.identity_fields().count() > 0;
        let mut hash = 1i32;
        for field in pdx_type.fields() {
            if marked && !field.is_identity() {
                continue;
            }
            let (start, end) = pdx_type
                .field_range(
                    field.index(),
                    offsets,
                    layout.offset_size,
                    layout.field_area_len,
                )
                .ok_or_else(|| {
                    GeodeError::Serialization(format!(
                        "field {} is missing from PDX body of type {}",
                        field.name(),
                        pdx_type.type_id()
                    ))
                })?;
            hash = hash.wrapping_mul(31).wrapping_add(hash_bytes(&area[start..end]));
        }
        Ok(hash)
    }

    /// Returns the identity hash computed by the writer that produced this
    /// instance, if any. Instances read from the wire carry none.
    pub fn identity_hash(&self) -> Option<i32> {
        self.identity_hash
    }

    /// Returns the identity hash, computing it from the registered type when
    /// the instance did not come from a writer.
    ///
    /// Equal instances hash equal no matter where they came from.
    pub fn hashcode(&self, registry: &PdxTypeRegistry) -> Result<i32> {
        match self.identity_hash {
            Some(hash) => Ok(hash),
            None => self.compute_identity_hash(&*registry.resolve(self.type_id)?),
        }
    }

    /// Hash of the type id and body bytes. Needs no registry and agrees with `==`.
    pub fn structural_hash(&self) -> i32 {
        self.type_id
            .wrapping_mul(31)
            .wrapping_add(hash_bytes(&self.body))
    }
}

impl PartialEq for PdxInstance {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.body == other.body
    }
}

impl Eq for PdxInstance {}

impl fmt::Debug for PdxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdxInstance")
            .field("type_id", &self.type_id)
            .field("len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form_layout() {
        let instance = PdxInstance::new(7, vec![1, 2, 3]);
        assert_eq!(
            instance.to_bytes(),
            vec![93, 0, 0, 0, 3, 0, 0, 0, 7, 1, 2, 3]
        );
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let instance = PdxInstance::new(12, vec![9, 9]);
        let parsed = PdxInstance::from_bytes(&instance.to_bytes()).unwrap();
        assert_eq!(parsed, instance);
    }

    #[test]
    fn test_from_bytes_rejects_other_tags() {
        assert!(PdxInstance::from_bytes(&[57, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_truncated_body() {
        let bytes = [93, 0, 0, 0, 10, 0, 0, 0, 1, 5];
        assert!(PdxInstance::from_bytes(&bytes).unwrap_err().is_serialization());
    }

    #[test]
    fn test_identity_hash_survives_wire_roundtrip() {
        use crate::pdx::{PdxLocalWriter, PdxWriter};

        let registry = PdxTypeRegistry::new();
        let mut writer = PdxLocalWriter::new(&registry, "Key");
        writer.write_int("id", 7).unwrap();
        writer.mark_identity_field("id").unwrap();
        writer.write_string("note", Some("first")).unwrap();
        let built = writer.finish().unwrap();
        let wire = PdxInstance::from_bytes(&built.to_bytes()).unwrap();

        assert_eq!(built, wire);
        assert!(built.identity_hash().is_some());
        assert!(wire.identity_hash().is_none());
        assert_eq!(built.hashcode(&registry).unwrap(), wire.hashcode(&registry).unwrap());
        assert_eq!(built.structural_hash(), wire.structural_hash());
    }

    #[test]
    fn test_hashcode_of_unknown_type() {
        let registry = PdxTypeRegistry::new();
        let instance = PdxInstance::new(77, vec![1]);
        assert!(matches!(
            instance.hashcode(&registry),
            Err(GeodeError::TypeNotFound(77))
        ));
    }

    #[test]
    fn test_negative_length() {
        let bytes = [93, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 1];
        assert!(PdxInstance::from_bytes(&bytes).is_err());
    }
}
