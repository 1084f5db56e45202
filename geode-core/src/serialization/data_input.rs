//! Data input traits and implementations for the Geode wire format.

use super::{ds_code, value, Value};
use crate::error::{GeodeError, Result};
use bytes::Buf;
use std::io::Cursor;

/// Trait for reading values from the Geode binary format.
///
/// All multi-byte values are read in big-endian byte order.
pub trait DataInput {
    /// Reads a single byte (i8).
    fn read_byte(&mut self) -> Result<i8>;

    /// Reads a single unsigned byte.
    fn read_ubyte(&mut self) -> Result<u8>;

    /// Reads a boolean from a single byte.
    fn read_bool(&mut self) -> Result<bool>;

    /// Reads a 16-bit UTF-16 code unit as a `char`.
    fn read_char(&mut self) -> Result<char>;

    /// Reads a 16-bit signed integer in big-endian order.
    fn read_short(&mut self) -> Result<i16>;

    /// Reads a 32-bit signed integer in big-endian order.
    fn read_int(&mut self) -> Result<i32>;

    /// Reads a 64-bit signed integer in big-endian order.
    fn read_long(&mut self) -> Result<i64>;

    /// Reads a 32-bit floating point in big-endian order.
    fn read_float(&mut self) -> Result<f32>;

    /// Reads a 64-bit floating point in big-endian order.
    fn read_double(&mut self) -> Result<f64>;

    /// Reads the specified number of raw bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Reads a compact array length. Returns `-1` for a null array.
    fn read_array_len(&mut self) -> Result<i32> {
        let code = self.read_ubyte()?;
        match code {
            0xFF => Ok(-1),
            0xFE => Ok(self.read_short()? as u16 as i32),
            0xFD => self.read_int(),
            n => Ok(n as i32),
        }
    }

    /// Reads a string prefixed with its two-byte UTF-8 length.
    fn read_utf(&mut self) -> Result<String> {
        let len = self.read_short()? as u16 as usize;
        decode_utf8(self.read_bytes(len)?)
    }

    /// Reads a tagged string in any of the supported encodings.
    fn read_string(&mut self) -> Result<Option<String>> {
        let code = self.read_ubyte()?;
        self.read_string_body(code)
    }

    /// Reads the body of a string whose tag has already been consumed.
    fn read_string_body(&mut self, code: u8) -> Result<Option<String>> {
        match code {
            ds_code::NULL_STRING => Ok(None),
            ds_code::ASCII_STRING | ds_code::STRING => {
                let len = self.read_short()? as u16 as usize;
                decode_utf8(self.read_bytes(len)?).map(Some)
            }
            ds_code::ASCII_STRING_HUGE => {
                let len = checked_len(self.read_int()?)?;
                decode_utf8(self.read_bytes(len)?).map(Some)
            }
            ds_code::STRING_HUGE => {
                let len = checked_len(self.read_int()?)?;
                let mut units = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    units.push(self.read_short()? as u16);
                }
                String::from_utf16(&units)
                    .map(Some)
                    .map_err(|e| GeodeError::Serialization(format!("invalid UTF-16 string: {}", e)))
            }
            other => Err(GeodeError::Serialization(format!(
                "unexpected string type code: {}",
                other
            ))),
        }
    }

    /// Reads a length-prefixed byte array.
    fn read_byte_array(&mut self) -> Result<Option<Vec<u8>>> {
        let len = self.read_array_len()?;
        if len < 0 {
            return Ok(None);
        }
        self.read_bytes(len as usize).map(Some)
    }

    /// Reads a length-prefixed boolean array.
    fn read_bool_array(&mut self) -> Result<Option<Vec<bool>>> {
        read_array(self, |input| input.read_bool())
    }

    /// Reads a length-prefixed char array.
    fn read_char_array(&mut self) -> Result<Option<Vec<char>>> {
        read_array(self, |input| input.read_char())
    }

    /// Reads a length-prefixed short array.
    fn read_short_array(&mut self) -> Result<Option<Vec<i16>>> {
        read_array(self, |input| input.read_short())
    }

    /// Reads a length-prefixed int array.
    fn read_int_array(&mut self) -> Result<Option<Vec<i32>>> {
        read_array(self, |input| input.read_int())
    }

    /// Reads a length-prefixed long array.
    fn read_long_array(&mut self) -> Result<Option<Vec<i64>>> {
        read_array(self, |input| input.read_long())
    }

    /// Reads a length-prefixed float array.
    fn read_float_array(&mut self) -> Result<Option<Vec<f32>>> {
        read_array(self, |input| input.read_float())
    }

    /// Reads a length-prefixed double array.
    fn read_double_array(&mut self) -> Result<Option<Vec<f64>>> {
        read_array(self, |input| input.read_double())
    }

    /// Reads a length-prefixed array of tagged strings. Null elements read as empty strings.
    fn read_string_array(&mut self) -> Result<Option<Vec<String>>> {
        read_array(self, |input| Ok(input.read_string()?.unwrap_or_default()))
    }

    /// Reads an array of byte arrays. Null elements read as empty arrays.
    fn read_array_of_byte_arrays(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        read_array(self, |input| Ok(input.read_byte_array()?.unwrap_or_default()))
    }

    /// Reads one object prefixed with its type tag.
    fn read_object(&mut self) -> Result<Value> {
        value::read_object(self)
    }
}

fn read_array<I, T, F>(input: &mut I, mut read: F) -> Result<Option<Vec<T>>>
where
    I: DataInput + ?Sized,
    F: FnMut(&mut I) -> Result<T>,
{
    let len = input.read_array_len()?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    let mut items = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        items.push(read(input)?);
    }
    Ok(Some(items))
}

fn checked_len(len: i32) -> Result<usize> {
    if len < 0 {
        return Err(GeodeError::Serialization(format!(
            "invalid string length: {}",
            len
        )));
    }
    Ok(len as usize)
}

fn decode_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| GeodeError::Serialization(format!("invalid UTF-8 string: {}", e)))
}

/// A buffer-based implementation of `DataInput`.
///
/// Owns a cursor over a borrowed slice. Not meant to be shared between threads.
#[derive(Debug, Clone)]
pub struct ObjectDataInput<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ObjectDataInput<'a> {
    /// Creates a new `ObjectDataInput` from the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Returns the number of bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Returns the current position in the buffer.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Returns the total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    /// Returns true if the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    /// Returns the full underlying buffer.
    pub fn buffer(&self) -> &'a [u8] {
        *self.cursor.get_ref()
    }

    /// Moves the cursor to an absolute position.
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.len() {
            return Err(GeodeError::BufferUnderflow {
                needed: pos,
                remaining: self.len(),
            });
        }
        self.cursor.set_position(pos as u64);
        Ok(())
    }

    /// Skips `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        self.ensure_remaining(n)?;
        self.cursor.advance(n);
        Ok(())
    }

    /// Reads `len` bytes as a borrowed slice without copying.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure_remaining(len)?;
        let start = self.position();
        let data: &'a [u8] = *self.cursor.get_ref();
        self.cursor.advance(len);
        Ok(&data[start..start + len])
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.cursor.remaining() < n {
            Err(GeodeError::BufferUnderflow {
                needed: n,
                remaining: self.cursor.remaining(),
            })
        } else {
            Ok(())
        }
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn read_byte(&mut self) -> Result<i8> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_i8())
    }

    fn read_ubyte(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_u8())
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_u8() != 0)
    }

    fn read_char(&mut self) -> Result<char> {
        self.ensure_remaining(2)?;
        let unit = self.cursor.get_u16();
        char::from_u32(unit as u32).ok_or_else(|| {
            GeodeError::Serialization(format!("unpaired surrogate char: {:#06x}", unit))
        })
    }

    fn read_short(&mut self) -> Result<i16> {
        self.ensure_remaining(2)?;
        Ok(self.cursor.get_i16())
    }

    fn read_int(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.cursor.get_i32())
    }

    fn read_long(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.cursor.get_i64())
    }

    fn read_float(&mut self) -> Result<f32> {
        self.ensure_remaining(4)?;
        Ok(self.cursor.get_f32())
    }

    fn read_double(&mut self) -> Result<f64> {
        self.ensure_remaining(8)?;
        Ok(self.cursor.get_f64())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure_remaining(len)?;
        let mut buf = vec![0u8; len];
        self.cursor.copy_to_slice(&mut buf);
        Ok(buf)
    }
}
