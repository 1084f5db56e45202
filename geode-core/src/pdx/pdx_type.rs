//! PDX type descriptors and the field position table.

use super::PdxFieldType;
use std::collections::HashMap;
use std::fmt;

/// Where a field starts, relative to the beginning of the field area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldPosition {
    /// Known without looking at the offset table.
    Absolute(usize),
    /// Start of the n-th variable-length field, read from the offset table.
    VarTable(usize),
    /// `back` bytes before the start of variable-length field `var_index`.
    BeforeVar { var_index: usize, back: usize },
    /// `back` bytes before the end of the field area.
    BeforeEnd { back: usize },
}

/// Definition of a single field within a PDX type.
#[derive(Debug, Clone)]
pub struct PdxField {
    name: String,
    field_type: PdxFieldType,
    identity: bool,
    index: usize,
    var_len_index: Option<usize>,
    position: FieldPosition,
}

impl PdxField {
    /// Creates a field definition. Index and layout are assigned by [`PdxType::new`].
    pub fn new(name: impl Into<String>, field_type: PdxFieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            identity: false,
            index: 0,
            var_len_index: None,
            position: FieldPosition::Absolute(0),
        }
    }

    /// Marks this field as part of the object's identity.
    pub fn with_identity(mut self, identity: bool) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field type.
    pub fn field_type(&self) -> PdxFieldType {
        self.field_type
    }

    /// Returns true if the field contributes to the identity hash.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Returns the declaration index of this field.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the ordinal among variable-length fields, if the field is one.
    pub fn var_len_index(&self) -> Option<usize> {
        self.var_len_index
    }

    pub(crate) fn set_identity(&mut self, identity: bool) {
        self.identity = identity;
    }

    fn same_definition(&self, other: &PdxField) -> bool {
        self.name == other.name
            && self.field_type == other.field_type
            && self.identity == other.identity
    }
}

impl PartialEq for PdxField {
    fn eq(&self, other: &Self) -> bool {
        self.same_definition(other) && self.index == other.index
    }
}

impl Eq for PdxField {}

/// Schema of one version of a PDX class.
///
/// Immutable once registered; a changed schema is a new `PdxType` with a new id.
#[derive(Debug, Clone)]
pub struct PdxType {
    class_name: String,
    type_id: i32,
    local: bool,
    fields: Vec<PdxField>,
    field_indices: HashMap<String, usize>,
    var_len_count: usize,
}

impl PdxType {
    /// Creates a type from fields in declaration order and computes their layout.
    pub fn new(class_name: impl Into<String>, fields: Vec<PdxField>) -> Self {
        let mut fields = fields;
        let mut field_indices = HashMap::with_capacity(fields.len());
        let mut fixed_prefix = 0usize;
        let mut var_len_count = 0usize;

        for (i, field) in fields.iter_mut().enumerate() {
            field.index = i;
            field_indices.insert(field.name.clone(), i);
            match field.field_type.fixed_size() {
                None => {
                    field.var_len_index = Some(var_len_count);
                    field.position = if var_len_count == 0 {
                        FieldPosition::Absolute(fixed_prefix)
                    } else {
                        FieldPosition::VarTable(var_len_count)
                    };
                    var_len_count += 1;
                }
                Some(size) => {
                    field.var_len_index = None;
                    if var_len_count == 0 {
                        field.position = FieldPosition::Absolute(fixed_prefix);
                        fixed_prefix += size;
                    }
                }
            }
        }

        // Fixed fields that follow a variable-length one are located backwards
        // from the next variable-length field or from the end of the area.
        let mut next_var: Option<usize> = None;
        let mut back = 0usize;
        let first_var = fields.iter().position(|f| f.var_len_index.is_some());
        if let Some(first_var) = first_var {
            for field in fields[first_var..].iter_mut().rev() {
                match field.field_type.fixed_size() {
                    None => {
                        next_var = field.var_len_index;
                        back = 0;
                    }
                    Some(size) => {
                        back += size;
                        field.position = match next_var {
                            Some(var_index) => FieldPosition::BeforeVar { var_index, back },
                            None => FieldPosition::BeforeEnd { back },
                        };
                    }
                }
            }
        }

        Self {
            class_name: class_name.into(),
            type_id: 0,
            local: false,
            fields,
            field_indices,
            var_len_count,
        }
    }

    /// Returns a copy with the given type id.
    pub fn with_type_id(mut self, type_id: i32) -> Self {
        self.type_id = type_id;
        self
    }

    /// Returns a copy marked as the in-process (local) version of its class.
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// Returns the class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the type id, or 0 if the type has not been registered.
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    /// Returns true for the descriptor this process serializes with.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Returns all fields in declaration order.
    pub fn fields(&self) -> &[PdxField] {
        &self.fields
    }

    /// Returns the number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns the number of variable-length fields.
    pub fn var_len_field_count(&self) -> usize {
        self.var_len_count
    }

    /// Returns the number of entries in a serialized offset table.
    pub fn offset_count(&self) -> usize {
        self.var_len_count.saturating_sub(1)
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&PdxField> {
        self.field_indices.get(name).map(|&i| &self.fields[i])
    }

    /// Returns the declaration index of the named field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_indices.get(name).copied()
    }

    /// Returns true if a field with the given name exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.field_indices.contains_key(name)
    }

    /// Returns the fields marked as identity fields.
    pub fn identity_fields(&self) -> impl Iterator<Item = &PdxField> {
        self.fields.iter().filter(|f| f.identity)
    }

    /// Returns true if both types have the same class and field definitions.
    pub fn same_schema(&self, class_name: &str, fields: &[PdxField]) -> bool {
        self.class_name == class_name
            && self.fields.len() == fields.len()
            && self
                .fields
                .iter()
                .zip(fields)
                .all(|(a, b)| a.same_definition(b))
    }

    /// Computes where field `index` starts within a serialized field area.
    ///
    /// `offsets` is the offset table that follows the field area and
    /// `field_area_len` the number of field bytes before it. Returns `None`
    /// when the buffer does not contain the field, for instance when it was
    /// written with fewer variable-length fields than this type declares.
    pub fn get_field_position(
        &self,
        index: usize,
        offsets: &[u8],
        offset_size: usize,
        field_area_len: usize,
    ) -> Option<usize> {
        let field = self.fields.get(index)?;
        let position = match field.position {
            FieldPosition::Absolute(pos) => pos,
            FieldPosition::VarTable(var_index) => {
                self.var_offset(var_index, offsets, offset_size)?
            }
            FieldPosition::BeforeVar { var_index, back } => self
                .var_offset(var_index, offsets, offset_size)?
                .checked_sub(back)?,
            FieldPosition::BeforeEnd { back } => field_area_len.checked_sub(back)?,
        };
        if position < field_area_len {
            Some(position)
        } else {
            None
        }
    }

    /// Returns the byte range of field `index` within the field area.
    pub fn field_range(
        &self,
        index: usize,
        offsets: &[u8],
        offset_size: usize,
        field_area_len: usize,
    ) -> Option<(usize, usize)> {
        let start = self.get_field_position(index, offsets, offset_size, field_area_len)?;
        let end = match self.fields.get(index)?.field_type.fixed_size() {
            Some(size) => start + size,
            None => {
                if index + 1 < self.fields.len() {
                    self.get_field_position(index + 1, offsets, offset_size, field_area_len)?
                } else {
                    field_area_len
                }
            }
        };
        if end >= start && end <= field_area_len {
            Some((start, end))
        } else {
            None
        }
    }

    fn var_offset(&self, var_index: usize, offsets: &[u8], offset_size: usize) -> Option<usize> {
        if var_index == 0 || var_index >= self.var_len_count {
            return None;
        }
        // Offsets are stored last field first.
        let slot = self.var_len_count - var_index - 1;
        let start = slot * offset_size;
        let bytes = offsets.get(start..start + offset_size)?;
        read_offset(bytes)
    }
}

impl fmt::Display for PdxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PdxType[id={}, class={}, fields=[", self.type_id, self.class_name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{:?}", field.name, field.field_type)?;
        }
        write!(f, "]]")
    }
}

/// Chooses the width of each offset table entry for a buffer being written.
pub fn offset_size_for(field_area_len: usize, offset_count: usize) -> usize {
    if field_area_len + offset_count <= 0xFF {
        1
    } else if field_area_len + offset_count * 2 <= 0xFFFF {
        2
    } else {
        4
    }
}

/// Recovers the offset width from the total length of a serialized body.
pub fn offset_size_from_len(body_len: usize) -> usize {
    if body_len <= 0xFF {
        1
    } else if body_len <= 0xFFFF {
        2
    } else {
        4
    }
}

fn read_offset(bytes: &[u8]) -> Option<usize> {
    match bytes.len() {
        1 => Some(bytes[0] as usize),
        2 => Some(u16::from_be_bytes([bytes[0], bytes[1]]) as usize),
        4 => Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize),
        _ => None,
    }
}

/// Encodes one offset table entry.
pub(crate) fn encode_offset(offset: usize, offset_size: usize, out: &mut Vec<u8>) {
    match offset_size {
        1 => out.push(offset as u8),
        2 => out.extend_from_slice(&(offset as u16).to_be_bytes()),
        _ => out.extend_from_slice(&(offset as u32).to_be_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_type() -> PdxType {
        // int | string | long | short | int[] | bool
        PdxType::new(
            "Mixed",
            vec![
                PdxField::new("id", PdxFieldType::Int),
                PdxField::new("name", PdxFieldType::String),
                PdxField::new("stamp", PdxFieldType::Long),
                PdxField::new("rank", PdxFieldType::Short),
                PdxField::new("values", PdxFieldType::IntArray),
                PdxField::new("active", PdxFieldType::Boolean),
            ],
        )
    }

    #[test]
    fn test_indices_and_var_count() {
        let t = mixed_type();
        assert_eq!(t.field_count(), 6);
        assert_eq!(t.var_len_field_count(), 2);
        assert_eq!(t.offset_count(), 1);
        assert_eq!(t.field_index("stamp"), Some(2));
        assert_eq!(t.field("values").unwrap().var_len_index(), Some(1));
        assert_eq!(t.field("id").unwrap().var_len_index(), None);
    }

    #[test]
    fn test_positions_without_scanning() {
        let t = mixed_type();
        // id@0(4) name@4(5: tag+len+"ab") stamp@9(8) rank@17(2) values@19(3) active@22(1)
        let area_len = 23;
        let offsets = [19u8];
        assert_eq!(t.get_field_position(0, &offsets, 1, area_len), Some(0));
        assert_eq!(t.get_field_position(1, &offsets, 1, area_len), Some(4));
        assert_eq!(t.get_field_position(2, &offsets, 1, area_len), Some(9));
        assert_eq!(t.get_field_position(3, &offsets, 1, area_len), Some(17));
        assert_eq!(t.get_field_position(4, &offsets, 1, area_len), Some(19));
        assert_eq!(t.get_field_position(5, &offsets, 1, area_len), Some(22));
    }

    #[test]
    fn test_position_out_of_range() {
        let t = mixed_type();
        assert_eq!(t.get_field_position(6, &[19], 1, 23), None);
    }

    #[test]
    fn test_position_missing_offset_entry() {
        let t = mixed_type();
        assert_eq!(t.get_field_position(4, &[], 1, 23), None);
        assert_eq!(t.get_field_position(3, &[], 1, 23), None);
    }

    #[test]
    fn test_position_past_area_end() {
        let t = mixed_type();
        assert_eq!(t.get_field_position(4, &[40], 1, 23), None);
    }

    #[test]
    fn test_reverse_offset_order() {
        let t = PdxType::new(
            "ThreeStrings",
            vec![
                PdxField::new("a", PdxFieldType::String),
                PdxField::new("b", PdxFieldType::String),
                PdxField::new("c", PdxFieldType::String),
            ],
        );
        // Table holds c's offset first, then b's.
        let offsets = [0, 20, 0, 10];
        assert_eq!(t.get_field_position(0, &offsets, 2, 30), Some(0));
        assert_eq!(t.get_field_position(1, &offsets, 2, 30), Some(10));
        assert_eq!(t.get_field_position(2, &offsets, 2, 30), Some(20));
    }

    #[test]
    fn test_field_range() {
        let t = mixed_type();
        assert_eq!(t.field_range(1, &[19], 1, 23), Some((4, 9)));
        assert_eq!(t.field_range(4, &[19], 1, 23), Some((19, 22)));
        assert_eq!(t.field_range(5, &[19], 1, 23), Some((22, 23)));
    }

    #[test]
    fn test_same_schema_checks_order_and_types() {
        let t = mixed_type();
        let fields: Vec<PdxField> = t.fields().to_vec();
        assert!(t.same_schema("Mixed", &fields));
        assert!(!t.same_schema("Other", &fields));

        let mut reordered = fields.clone();
        reordered.swap(0, 2);
        assert!(!t.same_schema("Mixed", &reordered));

        let mut retyped = fields;
        retyped[0] = PdxField::new("id", PdxFieldType::Long);
        assert!(!t.same_schema("Mixed", &retyped));
    }

    #[test]
    fn test_offset_size_thresholds() {
        assert_eq!(offset_size_for(250, 5), 1);
        assert_eq!(offset_size_for(251, 5), 2);
        assert_eq!(offset_size_for(0xFFFF - 4, 2), 2);
        assert_eq!(offset_size_for(0xFFFF - 3, 2), 4);
        assert_eq!(offset_size_from_len(255), 1);
        assert_eq!(offset_size_from_len(256), 2);
        assert_eq!(offset_size_from_len(0x10000), 4);
    }

    #[test]
    fn test_display() {
        let t = PdxType::new("P", vec![PdxField::new("x", PdxFieldType::Int)]).with_type_id(3);
        assert_eq!(t.to_string(), "PdxType[id=3, class=P, fields=[x:Int]]");
    }
}
