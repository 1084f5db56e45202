//! Data output traits and implementations for the Geode wire format.

use super::{ds_code, value, Value};
use crate::error::{GeodeError, Result};
use bytes::{BufMut, BytesMut};

const MAX_SHORT_STRING: usize = 0xFFFF;

/// Trait for writing values in the Geode binary format.
///
/// All multi-byte values are written in big-endian byte order.
pub trait DataOutput {
    /// Writes a single byte (i8).
    fn write_byte(&mut self, v: i8) -> Result<()>;

    /// Writes a single unsigned byte.
    fn write_ubyte(&mut self, v: u8) -> Result<()>;

    /// Writes a boolean as a single byte (0 for false, 1 for true).
    fn write_bool(&mut self, v: bool) -> Result<()>;

    /// Writes a char as one UTF-16 code unit. Fails outside the basic multilingual plane.
    fn write_char(&mut self, v: char) -> Result<()>;

    /// Writes a 16-bit signed integer in big-endian order.
    fn write_short(&mut self, v: i16) -> Result<()>;

    /// Writes a 32-bit signed integer in big-endian order.
    fn write_int(&mut self, v: i32) -> Result<()>;

    /// Writes a 64-bit signed integer in big-endian order.
    fn write_long(&mut self, v: i64) -> Result<()>;

    /// Writes a 32-bit floating point in big-endian order.
    fn write_float(&mut self, v: f32) -> Result<()>;

    /// Writes a 64-bit floating point in big-endian order.
    fn write_double(&mut self, v: f64) -> Result<()>;

    /// Writes raw bytes without length prefix.
    fn write_bytes(&mut self, v: &[u8]) -> Result<()>;

    /// Writes a compact array length; `-1` marks a null array.
    fn write_array_len(&mut self, len: i32) -> Result<()> {
        if len < 0 {
            self.write_ubyte(0xFF)
        } else if len <= 252 {
            self.write_ubyte(len as u8)
        } else if len <= 0xFFFF {
            self.write_ubyte(0xFE)?;
            self.write_short(len as u16 as i16)
        } else {
            self.write_ubyte(0xFD)?;
            self.write_int(len)
        }
    }

    /// Writes a string prefixed with its two-byte UTF-8 length.
    fn write_utf(&mut self, v: &str) -> Result<()> {
        let bytes = v.as_bytes();
        if bytes.len() > MAX_SHORT_STRING {
            return Err(GeodeError::Serialization(format!(
                "string of {} bytes exceeds the UTF length limit",
                bytes.len()
            )));
        }
        self.write_short(bytes.len() as u16 as i16)?;
        self.write_bytes(bytes)
    }

    /// Writes a tagged string, choosing the most compact encoding.
    fn write_string(&mut self, v: Option<&str>) -> Result<()> {
        let s = match v {
            Some(s) => s,
            None => return self.write_ubyte(ds_code::NULL_STRING),
        };
        let bytes = s.as_bytes();
        let ascii = s.is_ascii();
        if bytes.len() <= MAX_SHORT_STRING {
            self.write_ubyte(if ascii {
                ds_code::ASCII_STRING
            } else {
                ds_code::STRING
            })?;
            self.write_short(bytes.len() as u16 as i16)?;
            self.write_bytes(bytes)
        } else if ascii {
            self.write_ubyte(ds_code::ASCII_STRING_HUGE)?;
            self.write_int(bytes.len() as i32)?;
            self.write_bytes(bytes)
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            self.write_ubyte(ds_code::STRING_HUGE)?;
            self.write_int(units.len() as i32)?;
            for unit in units {
                self.write_short(unit as i16)?;
            }
            Ok(())
        }
    }

    /// Writes a length-prefixed byte array.
    fn write_byte_array(&mut self, v: Option<&[u8]>) -> Result<()> {
        match v {
            Some(bytes) => {
                self.write_array_len(bytes.len() as i32)?;
                self.write_bytes(bytes)
            }
            None => self.write_array_len(-1),
        }
    }

    /// Writes a length-prefixed boolean array.
    fn write_bool_array(&mut self, v: Option<&[bool]>) -> Result<()> {
        write_array(self, v, |out, &b| out.write_bool(b))
    }

    /// Writes a length-prefixed char array.
    fn write_char_array(&mut self, v: Option<&[char]>) -> Result<()> {
        write_array(self, v, |out, &c| out.write_char(c))
    }

    /// Writes a length-prefixed short array.
    fn write_short_array(&mut self, v: Option<&[i16]>) -> Result<()> {
        write_array(self, v, |out, &n| out.write_short(n))
    }

    /// Writes a length-prefixed int array.
    fn write_int_array(&mut self, v: Option<&[i32]>) -> Result<()> {
        write_array(self, v, |out, &n| out.write_int(n))
    }

    /// Writes a length-prefixed long array.
    fn write_long_array(&mut self, v: Option<&[i64]>) -> Result<()> {
        write_array(self, v, |out, &n| out.write_long(n))
    }

    /// Writes a length-prefixed float array.
    fn write_float_array(&mut self, v: Option<&[f32]>) -> Result<()> {
        write_array(self, v, |out, &n| out.write_float(n))
    }

    /// Writes a length-prefixed double array.
    fn write_double_array(&mut self, v: Option<&[f64]>) -> Result<()> {
        write_array(self, v, |out, &n| out.write_double(n))
    }

    /// Writes a length-prefixed array of tagged strings.
    fn write_string_array(&mut self, v: Option<&[String]>) -> Result<()> {
        write_array(self, v, |out, s| out.write_string(Some(s.as_str())))
    }

    /// Writes an array of byte arrays.
    fn write_array_of_byte_arrays(&mut self, v: Option<&[Vec<u8>]>) -> Result<()> {
        write_array(self, v, |out, b| out.write_byte_array(Some(b.as_slice())))
    }

    /// Writes one object prefixed with its type tag.
    fn write_object(&mut self, v: &Value) -> Result<()> {
        value::write_object(self, v)
    }
}

fn write_array<O, T, F>(out: &mut O, items: Option<&[T]>, mut write: F) -> Result<()>
where
    O: DataOutput + ?Sized,
    F: FnMut(&mut O, &T) -> Result<()>,
{
    match items {
        Some(items) => {
            out.write_array_len(items.len() as i32)?;
            for item in items {
                write(out, item)?;
            }
            Ok(())
        }
        None => out.write_array_len(-1),
    }
}

/// A buffer-based implementation of `DataOutput`.
#[derive(Debug)]
pub struct ObjectDataOutput {
    buffer: BytesMut,
}

impl ObjectDataOutput {
    /// Creates a new `ObjectDataOutput` with default capacity.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Creates a new `ObjectDataOutput` with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the written bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the output and returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the offset the next write will land at.
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    /// Overwrites four bytes at `pos` with a big-endian int.
    pub fn write_int_at(&mut self, pos: usize, v: i32) -> Result<()> {
        let end = pos + 4;
        if end > self.buffer.len() {
            return Err(GeodeError::Serialization(format!(
                "cannot patch int at {}: only {} bytes written",
                pos,
                self.buffer.len()
            )));
        }
        self.buffer[pos..end].copy_from_slice(&v.to_be_bytes());
        Ok(())
    }

    /// Clears the buffer, removing all written data.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for ObjectDataOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl DataOutput for ObjectDataOutput {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.buffer.put_i8(v);
        Ok(())
    }

    fn write_ubyte(&mut self, v: u8) -> Result<()> {
        self.buffer.put_u8(v);
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.buffer.put_u8(if v { 1 } else { 0 });
        Ok(())
    }

    fn write_char(&mut self, v: char) -> Result<()> {
        let code = v as u32;
        if code > 0xFFFF {
            return Err(GeodeError::Serialization(format!(
                "char {:?} does not fit in one UTF-16 unit",
                v
            )));
        }
        self.buffer.put_u16(code as u16);
        Ok(())
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.buffer.put_i16(v);
        Ok(())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.buffer.put_i32(v);
        Ok(())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.buffer.put_i64(v);
        Ok(())
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.buffer.put_f32(v);
        Ok(())
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.buffer.put_f64(v);
        Ok(())
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.buffer.put_slice(v);
        Ok(())
    }
}
