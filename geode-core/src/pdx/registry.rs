//! Process-wide (cache-scoped) registry of PDX type descriptors.

use super::{FieldChoice, PdxField, PdxType};
use crate::error::{GeodeError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Type ids handed out by this registry start here.
pub const FIRST_LOCAL_TYPE_ID: i32 = 1;

/// Supplies type definitions this process has not seen, usually by asking a server.
pub trait TypeDefinitionSource: Send + Sync {
    /// Returns the definition for `type_id`, or `None` if the source does not know it.
    fn fetch_type(&self, type_id: i32) -> Result<Option<PdxType>>;
}

#[derive(Debug, Default)]
struct RegistryState {
    by_id: HashMap<i32, Arc<PdxType>>,
    local_by_class: HashMap<String, Arc<PdxType>>,
    versions_by_class: HashMap<String, Vec<i32>>,
    field_choices: HashMap<(i32, i32), Arc<[FieldChoice]>>,
    next_type_id: i32,
}

/// Maps type ids to descriptors and class names to their current local descriptor.
///
/// Owned by the cache that created it; lookups share a read lock and only
/// registration of a new schema takes the write lock.
#[derive(Debug)]
pub struct PdxTypeRegistry {
    state: RwLock<RegistryState>,
}

impl PdxTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                next_type_id: FIRST_LOCAL_TYPE_ID,
                ..RegistryState::default()
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers the local schema of `class_name` and returns its type id.
    ///
    /// An identical schema already known for the class, local or remote,
    /// keeps its id.
    pub fn register_local_type(&self, class_name: &str, fields: Vec<PdxField>) -> i32 {
        self.register_local(class_name, fields).type_id()
    }

    /// Same as [`register_local_type`](Self::register_local_type) but returns the descriptor.
    pub fn register_local(&self, class_name: &str, fields: Vec<PdxField>) -> Arc<PdxType> {
        {
            let state = self.read();
            if let Some(existing) = Self::find_same_schema(&state, class_name, &fields) {
                if existing.is_local() {
                    return existing;
                }
            }
        }

        let mut state = self.write();
        if let Some(existing) = Self::find_same_schema(&state, class_name, &fields) {
            let local = if existing.is_local() {
                existing
            } else {
                let promoted = Arc::new(PdxType::clone(&existing).with_local(true));
                state.by_id.insert(promoted.type_id(), Arc::clone(&promoted));
                promoted
            };
            state
                .local_by_class
                .insert(class_name.to_string(), Arc::clone(&local));
            return local;
        }

        let type_id = state.next_type_id;
        state.next_type_id += 1;
        let pdx_type = Arc::new(
            PdxType::new(class_name, fields)
                .with_type_id(type_id)
                .with_local(true),
        );
        state.by_id.insert(type_id, Arc::clone(&pdx_type));
        state
            .local_by_class
            .insert(class_name.to_string(), Arc::clone(&pdx_type));
        state
            .versions_by_class
            .entry(class_name.to_string())
            .or_default()
            .push(type_id);

        tracing::debug!(
            type_id,
            class_name = %class_name,
            fields = pdx_type.field_count(),
            "registered local PDX type"
        );
        pdx_type
    }

    /// Stores a descriptor received from a server under its own id.
    pub fn register_remote_type(&self, pdx_type: PdxType) -> Result<Arc<PdxType>> {
        let type_id = pdx_type.type_id();
        let mut state = self.write();
        if let Some(existing) = state.by_id.get(&type_id) {
            if existing.same_schema(pdx_type.class_name(), pdx_type.fields()) {
                return Ok(Arc::clone(existing));
            }
            return Err(GeodeError::IllegalState(format!(
                "type id {} already registered for a different schema of {}",
                type_id,
                existing.class_name()
            )));
        }

        let pdx_type = Arc::new(pdx_type.with_local(false));
        state.next_type_id = state.next_type_id.max(type_id.saturating_add(1));
        state.by_id.insert(type_id, Arc::clone(&pdx_type));
        state
            .versions_by_class
            .entry(pdx_type.class_name().to_string())
            .or_default()
            .push(type_id);

        tracing::debug!(
            type_id,
            class_name = %pdx_type.class_name(),
            "registered remote PDX type"
        );
        Ok(pdx_type)
    }

    /// Looks up a descriptor by id.
    pub fn resolve(&self, type_id: i32) -> Result<Arc<PdxType>> {
        self.read()
            .by_id
            .get(&type_id)
            .cloned()
            .ok_or(GeodeError::TypeNotFound(type_id))
    }

    /// Looks up a descriptor, asking `source` once if it is unknown.
    pub fn resolve_or_fetch(
        &self,
        type_id: i32,
        source: Option<&dyn TypeDefinitionSource>,
    ) -> Result<Arc<PdxType>> {
        match self.resolve(type_id) {
            Err(GeodeError::TypeNotFound(_)) => {
                let source = source.ok_or(GeodeError::TypeNotFound(type_id))?;
                tracing::debug!(type_id, "fetching unknown PDX type definition");
                let fetched = source
                    .fetch_type(type_id)?
                    .ok_or(GeodeError::TypeNotFound(type_id))?;
                if fetched.type_id() != type_id {
                    return Err(GeodeError::Protocol(format!(
                        "requested PDX type {} but received {}",
                        type_id,
                        fetched.type_id()
                    )));
                }
                self.register_remote_type(fetched)
            }
            other => other,
        }
    }

    /// Returns the current local descriptor for a class.
    pub fn local_type(&self, class_name: &str) -> Option<Arc<PdxType>> {
        self.read().local_by_class.get(class_name).cloned()
    }

    /// Returns every known version of a class, oldest first.
    pub fn versions(&self, class_name: &str) -> Vec<Arc<PdxType>> {
        let state = self.read();
        state
            .versions_by_class
            .get(class_name)
            .map(|ids| ids.iter().filter_map(|id| state.by_id.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of registered descriptors.
    pub fn type_count(&self) -> usize {
        self.read().by_id.len()
    }

    /// Returns the local-to-remote field map for a pair of types, computing it once.
    pub fn field_choices(&self, local: &PdxType, remote: &PdxType) -> Arc<[FieldChoice]> {
        let key = (local.type_id(), remote.type_id());
        if let Some(choices) = self.read().field_choices.get(&key) {
            return Arc::clone(choices);
        }
        let choices: Arc<[FieldChoice]> = FieldChoice::build(local, remote).into();
        self.write()
            .field_choices
            .entry(key)
            .or_insert_with(|| Arc::clone(&choices))
            .clone()
    }

    /// Forgets every type, for instance after the client lost its servers.
    pub fn clear(&self) {
        let mut state = self.write();
        let dropped = state.by_id.len();
        *state = RegistryState {
            next_type_id: FIRST_LOCAL_TYPE_ID,
            ..RegistryState::default()
        };
        tracing::debug!(dropped, "cleared PDX type registry");
    }

    fn find_same_schema(
        state: &RegistryState,
        class_name: &str,
        fields: &[PdxField],
    ) -> Option<Arc<PdxType>> {
        if let Some(local) = state.local_by_class.get(class_name) {
            if local.same_schema(class_name, fields) {
                return Some(Arc::clone(local));
            }
        }
        state
            .versions_by_class
            .get(class_name)?
            .iter()
            .filter_map(|id| state.by_id.get(id))
            .find(|t| t.same_schema(class_name, fields))
            .cloned()
    }
}

impl Default for PdxTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
