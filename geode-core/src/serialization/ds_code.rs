//! Type tags that prefix every object written with `write_object`.
//!
//! The values are shared with the server and with clients written in other
//! languages, so they must never change.

/// Boolean array.
pub const BOOLEAN_ARRAY: u8 = 26;
/// UTF-16 character array.
pub const CHAR_ARRAY: u8 = 27;
/// Null object reference.
pub const NULL_OBJ: u8 = 41;
/// UTF-8 string with a two-byte length.
pub const STRING: u8 = 42;
/// Class name marker preceding the element type of an object array.
pub const CLASS: u8 = 43;
/// Byte array.
pub const BYTE_ARRAY: u8 = 46;
/// Short array.
pub const SHORT_ARRAY: u8 = 47;
/// Int array.
pub const INT_ARRAY: u8 = 48;
/// Long array.
pub const LONG_ARRAY: u8 = 49;
/// Float array.
pub const FLOAT_ARRAY: u8 = 50;
/// Double array.
pub const DOUBLE_ARRAY: u8 = 51;
/// Array of objects, each written with its own tag.
pub const OBJECT_ARRAY: u8 = 52;
/// Boolean.
pub const BOOLEAN: u8 = 53;
/// UTF-16 character.
pub const CHARACTER: u8 = 54;
/// Signed byte.
pub const BYTE: u8 = 55;
/// Short.
pub const SHORT: u8 = 56;
/// Int.
pub const INTEGER: u8 = 57;
/// Long.
pub const LONG: u8 = 58;
/// Float.
pub const FLOAT: u8 = 59;
/// Double.
pub const DOUBLE: u8 = 60;
/// Date as milliseconds since the epoch.
pub const DATE: u8 = 61;
/// Array of byte arrays.
pub const ARRAY_OF_BYTE_ARRAYS: u8 = 62;
/// String array.
pub const STRING_ARRAY: u8 = 64;
/// Ordered list of objects.
pub const ARRAY_LIST: u8 = 65;
/// Null string.
pub const NULL_STRING: u8 = 69;
/// ASCII string with a two-byte length.
pub const ASCII_STRING: u8 = 87;
/// ASCII string with a four-byte length.
pub const ASCII_STRING_HUGE: u8 = 88;
/// UTF-16 string with a four-byte character count.
pub const STRING_HUGE: u8 = 89;
/// PDX serialized object.
pub const PDX: u8 = 93;

/// Returns true if `code` introduces one of the string encodings.
pub fn is_string_code(code: u8) -> bool {
    matches!(
        code,
        STRING | NULL_STRING | ASCII_STRING | ASCII_STRING_HUGE | STRING_HUGE
    )
}
