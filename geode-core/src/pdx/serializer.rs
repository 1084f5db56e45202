//! Entry points that pick a writer or reader for a value and its type id.

use super::{
    PdxInstance, PdxLocalReader, PdxLocalWriter, PdxRemoteReader, PdxSerializable,
    PdxTypeRegistry, TypeDefinitionSource,
};
use crate::error::{GeodeError, Result};
use std::sync::Arc;

/// Serializes `value` against the registry.
pub fn encode_instance<T: PdxSerializable>(
    registry: &PdxTypeRegistry,
    value: &T,
) -> Result<PdxInstance> {
    let mut writer = PdxLocalWriter::new(registry, T::CLASS_NAME);
    value.to_data(&mut writer)?;
    writer.finish()
}

/// Deserializes `instance` into `T`.
///
/// Data written with the local type is read sequentially. Data written with
/// another version goes through a mapping reader; if the class has no local
/// type yet, the fields `T` asks for become its local type.
pub fn decode_instance<T: PdxSerializable>(
    registry: &PdxTypeRegistry,
    instance: &PdxInstance,
    source: Option<&dyn TypeDefinitionSource>,
) -> Result<T> {
    let written = registry.resolve_or_fetch(instance.type_id(), source)?;
    if written.class_name() != T::CLASS_NAME {
        return Err(GeodeError::Serialization(format!(
            "PDX type {} is {}, expected {}",
            written.type_id(),
            written.class_name(),
            T::CLASS_NAME
        )));
    }

    match registry.local_type(T::CLASS_NAME) {
        Some(local) if local.type_id() == written.type_id() => {
            let mut reader =
                PdxLocalReader::new(registry, instance, local)?.with_type_source(source);
            T::from_data(&mut reader)
        }
        Some(local) => {
            tracing::trace!(
                class_name = T::CLASS_NAME,
                local_type_id = local.type_id(),
                remote_type_id = written.type_id(),
                "reading PDX data written with another schema"
            );
            let mut reader =
                PdxRemoteReader::new(registry, instance, local, written)?.with_type_source(source);
            T::from_data(&mut reader)
        }
        None => {
            let mut reader =
                PdxRemoteReader::collecting(registry, instance, written)?.with_type_source(source);
            let value = T::from_data(&mut reader)?;
            let fields = reader.into_collected();
            let local = registry.register_local(T::CLASS_NAME, fields);
            tracing::debug!(
                class_name = T::CLASS_NAME,
                type_id = local.type_id(),
                "derived local PDX type from first read"
            );
            Ok(value)
        }
    }
}

/// Serializes values to and from tagged PDX bytes.
///
/// Unknown type ids are fetched from the configured [`TypeDefinitionSource`].
#[derive(Clone)]
pub struct PdxSerializer {
    registry: Arc<PdxTypeRegistry>,
    type_source: Option<Arc<dyn TypeDefinitionSource>>,
}

impl PdxSerializer {
    /// Creates a serializer over a shared registry.
    pub fn new(registry: Arc<PdxTypeRegistry>) -> Self {
        Self {
            registry,
            type_source: None,
        }
    }

    /// Sets the source consulted for type ids the registry does not know.
    pub fn with_type_source(mut self, source: Arc<dyn TypeDefinitionSource>) -> Self {
        self.type_source = Some(source);
        self
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<PdxTypeRegistry> {
        &self.registry
    }

    /// Serializes `value` to its tagged wire form.
    pub fn serialize<T: PdxSerializable>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(encode_instance(&self.registry, value)?.to_bytes())
    }

    /// Deserializes a value from its tagged wire form.
    pub fn deserialize<T: PdxSerializable>(&self, bytes: &[u8]) -> Result<T> {
        let instance = PdxInstance::from_bytes(bytes)?;
        self.to_object(&instance)
    }

    /// Decodes an already parsed instance.
    pub fn to_object<T: PdxSerializable>(&self, instance: &PdxInstance) -> Result<T> {
        decode_instance(&self.registry, instance, self.type_source.as_deref())
    }
}

impl std::fmt::Debug for PdxSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdxSerializer")
            .field("types", &self.registry.type_count())
            .field("type_source", &self.type_source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdx::{PdxField, PdxFieldType, PdxReader, PdxType, PdxWriter};

    #[derive(Debug, PartialEq)]
    struct Account {
        id: i64,
        owner: Option<String>,
        balance: f64,
    }

    impl PdxSerializable for Account {
        const CLASS_NAME: &'static str = "example.Account";

        fn to_data(&self, writer: &mut dyn PdxWriter) -> Result<()> {
            writer.write_long("id", self.id)?;
            writer.mark_identity_field("id")?;
            writer.write_string("owner", self.owner.as_deref())?;
            writer.write_double("balance", self.balance)
        }

        fn from_data(reader: &mut dyn PdxReader) -> Result<Self> {
            Ok(Self {
                id: reader.read_long("id")?,
                owner: reader.read_string("owner")?,
                balance: reader.read_double("balance")?,
            })
        }
    }

    fn account() -> Account {
        Account {
            id: 7,
            owner: Some("ann".to_string()),
            balance: 12.5,
        }
    }

    #[test]
    fn test_serializer_roundtrip() {
        let serializer = PdxSerializer::new(Arc::new(PdxTypeRegistry::new()));
        let bytes = serializer.serialize(&account()).unwrap();
        assert_eq!(bytes[0], crate::serialization::ds_code::PDX);
        let back: Account = serializer.deserialize(&bytes).unwrap();
        assert_eq!(back, account());
    }

    #[test]
    fn test_class_name_mismatch() {
        let registry = PdxTypeRegistry::new();
        let mut writer = PdxLocalWriter::new(&registry, "example.Other");
        writer.write_long("id", 1).unwrap();
        let instance = writer.finish().unwrap();
        let err = decode_instance::<Account>(&registry, &instance, None).unwrap_err();
        assert!(err.is_serialization());
    }

    struct Remote(PdxType);

    impl TypeDefinitionSource for Remote {
        fn fetch_type(&self, type_id: i32) -> Result<Option<PdxType>> {
            Ok((type_id == self.0.type_id()).then(|| self.0.clone()))
        }
    }

    #[test]
    fn test_first_read_derives_local_type() {
        // Data written elsewhere with an extra field and a different order.
        let writer_registry = PdxTypeRegistry::new();
        let mut writer = PdxLocalWriter::new(&writer_registry, Account::CLASS_NAME);
        writer.write_string("owner", Some("bob")).unwrap();
        writer.write_long("id", 9).unwrap();
        writer.write_int("branch", 3).unwrap();
        let instance = writer.finish().unwrap();
        let remote_type = PdxType::clone(&writer_registry.resolve(instance.type_id()).unwrap())
            .with_type_id(100);
        let instance = PdxInstance::new(100, instance.body().to_vec());

        let registry = Arc::new(PdxTypeRegistry::new());
        let serializer =
            PdxSerializer::new(Arc::clone(&registry)).with_type_source(Arc::new(Remote(remote_type)));
        let back: Account = serializer.to_object(&instance).unwrap();
        assert_eq!(
            back,
            Account {
                id: 9,
                owner: Some("bob".to_string()),
                balance: 0.0,
            }
        );

        let local = registry.local_type(Account::CLASS_NAME).unwrap();
        assert_ne!(local.type_id(), 100);
        let names: Vec<&str> = local.fields().iter().map(PdxField::name).collect();
        assert_eq!(names, vec!["id", "owner", "balance"]);
        assert_eq!(local.field("balance").unwrap().field_type(), PdxFieldType::Double);
    }

    #[test]
    fn test_unknown_type_without_source() {
        let registry = PdxTypeRegistry::new();
        let instance = PdxInstance::new(55, vec![]);
        assert!(matches!(
            decode_instance::<Account>(&registry, &instance, None),
            Err(GeodeError::TypeNotFound(55))
        ));
    }
}
