//! Reader for data written with a schema other than the local one.

use super::reader::split_body;
use super::{
    PdxField, PdxFieldType, PdxInstance, PdxReader, PdxType, PdxTypeRegistry, TypeDefinitionSource,
};
use crate::error::{GeodeError, Result};
use crate::serialization::{DataInput, ObjectDataInput, Value};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// How a local field is found in data written with a remote schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChoice {
    /// Same name, type and index as in the local type; part of the shared prefix.
    SamePosition,
    /// The remote schema has no compatible field; reads yield the default.
    Absent,
    /// The field lives at this index of the remote type.
    RemoteIndex(usize),
}

impl FieldChoice {
    /// Maps every field of `local`, in declaration order, to its remote counterpart.
    pub fn build(local: &PdxType, remote: &PdxType) -> Vec<FieldChoice> {
        let prefix = local
            .fields()
            .iter()
            .zip(remote.fields())
            .take_while(|(l, r)| l.name() == r.name() && l.field_type() == r.field_type())
            .count();

        local
            .fields()
            .iter()
            .map(|field| {
                if field.index() < prefix {
                    return FieldChoice::SamePosition;
                }
                match remote.field(field.name()) {
                    None => FieldChoice::Absent,
                    Some(r) if r.field_type() != field.field_type() => {
                        tracing::warn!(
                            class_name = %local.class_name(),
                            field = %field.name(),
                            local_type = ?field.field_type(),
                            remote_type = ?r.field_type(),
                            "PDX field changed type between versions, reading default"
                        );
                        FieldChoice::Absent
                    }
                    Some(r) => FieldChoice::RemoteIndex(r.index()),
                }
            })
            .collect()
    }
}

enum Target {
    Default,
    Cursor,
    Remote(usize),
}

enum Mode {
    /// A local type exists; requests are mapped through the choice table.
    Mapped {
        local: Arc<PdxType>,
        choices: Arc<[FieldChoice]>,
        prefix_next: usize,
    },
    /// No local type yet; requested fields are recorded to form one.
    Collecting { fields: Vec<PdxField> },
}

/// Reads data written with a remote version of a class.
///
/// Fields of the shared leading prefix are read straight from the cursor,
/// the rest through the remote type's offset table.
pub struct PdxRemoteReader<'a> {
    registry: &'a PdxTypeRegistry,
    source: Option<&'a dyn TypeDefinitionSource>,
    remote: Arc<PdxType>,
    input: ObjectDataInput<'a>,
    offsets: &'a [u8],
    offset_size: usize,
    mode: Mode,
}

impl<'a> PdxRemoteReader<'a> {
    /// Creates a reader that maps fields of `local` onto `remote`.
    pub fn new(
        registry: &'a PdxTypeRegistry,
        instance: &'a PdxInstance,
        local: Arc<PdxType>,
        remote: Arc<PdxType>,
    ) -> Result<Self> {
        let choices = registry.field_choices(&local, &remote);
        Self::with_mode(
            registry,
            instance,
            remote,
            Mode::Mapped {
                local,
                choices,
                prefix_next: 0,
            },
        )
    }

    /// Creates a reader for a class with no local type, recording the fields it is asked for.
    pub fn collecting(
        registry: &'a PdxTypeRegistry,
        instance: &'a PdxInstance,
        remote: Arc<PdxType>,
    ) -> Result<Self> {
        Self::with_mode(
            registry,
            instance,
            remote,
            Mode::Collecting { fields: Vec::new() },
        )
    }

    fn with_mode(
        registry: &'a PdxTypeRegistry,
        instance: &'a PdxInstance,
        remote: Arc<PdxType>,
        mode: Mode,
    ) -> Result<Self> {
        let (input, offsets, offset_size) = split_body(instance, &remote)?;
        Ok(Self {
            registry,
            source: None,
            remote,
            input,
            offsets,
            offset_size,
            mode,
        })
    }

    /// Sets the source used when a nested object has an unknown type id.
    pub fn with_type_source(mut self, source: Option<&'a dyn TypeDefinitionSource>) -> Self {
        self.source = source;
        self
    }

    /// Returns the fields requested so far in collecting mode, in request order.
    pub fn into_collected(self) -> Vec<PdxField> {
        match self.mode {
            Mode::Collecting { fields } => fields,
            Mode::Mapped { .. } => Vec::new(),
        }
    }

    fn read_field<T: Default>(
        &mut self,
        name: &str,
        field_type: PdxFieldType,
        read: impl FnOnce(&mut ObjectDataInput<'a>) -> Result<T>,
    ) -> Result<T> {
        match self.locate(name, field_type)? {
            Target::Default => Ok(T::default()),
            Target::Cursor => read(&mut self.input),
            Target::Remote(index) => self.read_at(index, read),
        }
    }

    fn locate(&mut self, name: &str, field_type: PdxFieldType) -> Result<Target> {
        let remote_field = self.remote.field(name);
        match &mut self.mode {
            Mode::Collecting { fields } => {
                if !fields.iter().any(|f| f.name() == name) {
                    let identity = remote_field.map(|f| f.is_identity()).unwrap_or(false);
                    fields.push(PdxField::new(name, field_type).with_identity(identity));
                }
                Ok(match remote_field {
                    Some(f) if f.field_type() == field_type => Target::Remote(f.index()),
                    _ => Target::Default,
                })
            }
            Mode::Mapped {
                local,
                choices,
                prefix_next,
            } => {
                let local_field = match local.field(name) {
                    Some(f) => f,
                    None => return Ok(Target::Default),
                };
                if local_field.field_type() != field_type {
                    return Err(GeodeError::Serialization(format!(
                        "field {} of {} is {:?}, read as {:?}",
                        name,
                        local.class_name(),
                        local_field.field_type(),
                        field_type
                    )));
                }
                let index = local_field.index();
                Ok(
                    match choices.get(index).copied().unwrap_or(FieldChoice::Absent) {
                        FieldChoice::Absent => Target::Default,
                        FieldChoice::RemoteIndex(remote_index) => Target::Remote(remote_index),
                        FieldChoice::SamePosition if index == *prefix_next => {
                            *prefix_next += 1;
                            Target::Cursor
                        }
                        FieldChoice::SamePosition => Target::Remote(index),
                    },
                )
            }
        }
    }

    /// Reads field `index` of the remote type without moving the cursor.
    fn read_at<T: Default>(
        &mut self,
        index: usize,
        read: impl FnOnce(&mut ObjectDataInput<'a>) -> Result<T>,
    ) -> Result<T> {
        let position = self.remote.get_field_position(
            index,
            self.offsets,
            self.offset_size,
            self.input.len(),
        );
        let position = match position {
            Some(pos) => pos,
            None => return Ok(T::default()),
        };
        let saved = self.input.position();
        self.input.set_position(position)?;
        let result = read(&mut self.input);
        self.input.set_position(saved)?;
        result
    }
}

impl PdxReader for PdxRemoteReader<'_> {
    fn registry(&self) -> &PdxTypeRegistry {
        self.registry
    }

    fn type_source(&self) -> Option<&dyn TypeDefinitionSource> {
        self.source
    }

    fn class_name(&self) -> &str {
        self.remote.class_name()
    }

    fn has_field(&self, name: &str) -> bool {
        self.remote.has_field(name)
    }

    fn is_identity_field(&self, name: &str) -> bool {
        self.remote
            .field(name)
            .map(|f| f.is_identity())
            .unwrap_or(false)
    }

    pdx_read_methods!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdx::{PdxLocalWriter, PdxWriter};

    fn ty(class: &str, fields: &[(&str, PdxFieldType)]) -> PdxType {
        PdxType::new(
            class,
            fields.iter().map(|(n, t)| PdxField::new(*n, *t)).collect(),
        )
    }

    #[test]
    fn test_choices_prefix_and_moved_fields() {
        let local = ty(
            "C",
            &[
                ("a", PdxFieldType::Int),
                ("b", PdxFieldType::String),
                ("c", PdxFieldType::Long),
                ("d", PdxFieldType::Int),
            ],
        );
        let remote = ty(
            "C",
            &[
                ("a", PdxFieldType::Int),
                ("b", PdxFieldType::String),
                ("d", PdxFieldType::Int),
                ("e", PdxFieldType::Double),
            ],
        );
        assert_eq!(
            FieldChoice::build(&local, &remote),
            vec![
                FieldChoice::SamePosition,
                FieldChoice::SamePosition,
                FieldChoice::Absent,
                FieldChoice::RemoteIndex(2),
            ]
        );
    }

    #[test]
    fn test_choices_type_change_is_absent() {
        let local = ty("C", &[("a", PdxFieldType::Int)]);
        let remote = ty("C", &[("a", PdxFieldType::Long)]);
        assert_eq!(FieldChoice::build(&local, &remote), vec![FieldChoice::Absent]);
    }

    fn write_remote(registry: &PdxTypeRegistry) -> PdxInstance {
        // Simulates data from another member: a, b, extra, d
        let mut writer = PdxLocalWriter::new(registry, "C");
        writer.write_int("a", 1).unwrap();
        writer.write_string("b", Some("bee")).unwrap();
        writer.write_string("extra", Some("ignored")).unwrap();
        writer.write_int("d", 4).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_mapped_reads() {
        let registry = PdxTypeRegistry::new();
        let instance = write_remote(&registry);
        let remote = registry.resolve(instance.type_id()).unwrap();
        let local = registry.register_local(
            "C",
            vec![
                PdxField::new("a", PdxFieldType::Int),
                PdxField::new("b", PdxFieldType::String),
                PdxField::new("c", PdxFieldType::Long),
                PdxField::new("d", PdxFieldType::Int),
            ],
        );
        let mut r = PdxRemoteReader::new(&registry, &instance, local, remote).unwrap();
        assert_eq!(r.read_int("a").unwrap(), 1);
        assert_eq!(r.read_string("b").unwrap().as_deref(), Some("bee"));
        assert_eq!(r.read_long("c").unwrap(), 0);
        assert_eq!(r.read_int("d").unwrap(), 4);
        assert!(r.has_field("extra"));
    }

    #[test]
    fn test_collecting_records_requested_fields() {
        let registry = PdxTypeRegistry::new();
        let instance = write_remote(&registry);
        let remote = registry.resolve(instance.type_id()).unwrap();
        let mut r = PdxRemoteReader::collecting(&registry, &instance, remote).unwrap();
        assert_eq!(r.read_int("d").unwrap(), 4);
        assert_eq!(r.read_string("b").unwrap().as_deref(), Some("bee"));
        assert_eq!(r.read_double("missing").unwrap(), 0.0);
        let names: Vec<String> = r
            .into_collected()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["d", "b", "missing"]);
    }
}
