//! Order-preserving byte encoding for row keys
//!
//! Encoded components compare lexicographically in the same order as the
//! values they encode, and no encoding is a prefix of another encoding of
//! the same type. Concatenating components therefore yields composite keys
//! that are injective and sort in tuple order.
//!
//! # Encoding Strategies
//!
//! - **Boolean**: `0x00` for false, `0x01` for true
//! - **Int / Long**: big-endian with the sign bit flipped
//! - **Float / Double**: IEEE-754 bits; positives flip the sign bit,
//!   negatives flip every bit (`-Inf < -1 < 0.0 < 1 < Inf < NaN`). Signed
//!   zeros share one encoding, as do all NaNs
//! - **String / Bytes / Enum**: `0x00` escaped as `0x00 0xFF`, terminated
//!   by `0x00 0x01`

use crate::error::{Error, Result};

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Append an ordered boolean
pub fn encode_bool(out: &mut Vec<u8>, value: bool) {
    out.push(u8::from(value));
}

/// Append an ordered i32
pub fn encode_int(out: &mut Vec<u8>, value: i32) {
    let unsigned = (value as u32) ^ (1u32 << 31);
    out.extend_from_slice(&unsigned.to_be_bytes());
}

/// Append an ordered i64
pub fn encode_long(out: &mut Vec<u8>, value: i64) {
    let unsigned = (value as u64) ^ (1u64 << 63);
    out.extend_from_slice(&unsigned.to_be_bytes());
}

/// Append an ordered f32
///
/// `-0.0` encodes as `0.0` and every NaN as the canonical NaN, so values
/// that compare equal share one encoding.
pub fn encode_float(out: &mut Vec<u8>, value: f32) {
    let value = if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f32::NAN
    } else {
        value
    };
    let bits = value.to_bits();
    let key = if value.is_sign_negative() {
        !bits
    } else {
        bits ^ (1u32 << 31)
    };
    out.extend_from_slice(&key.to_be_bytes());
}

/// Append an ordered f64
///
/// Canonicalized like [`encode_float`].
pub fn encode_double(out: &mut Vec<u8>, value: f64) {
    let value = if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f64::NAN
    } else {
        value
    };
    let bits = value.to_bits();
    let key = if value.is_sign_negative() {
        !bits
    } else {
        bits ^ (1u64 << 63)
    };
    out.extend_from_slice(&key.to_be_bytes());
}

/// Append escaped, terminated bytes
pub fn encode_bytes(out: &mut Vec<u8>, value: &[u8]) {
    for &b in value {
        if b == ESCAPE {
            out.push(ESCAPE);
            out.push(ESCAPED_ZERO);
        } else {
            out.push(b);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

/// Append an escaped, terminated UTF-8 string
pub fn encode_str(out: &mut Vec<u8>, value: &str) {
    encode_bytes(out, value.as_bytes());
}

/// Cursor over an ordered encoding
#[derive(Debug)]
pub struct OrderedReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> OrderedReader<'a> {
    /// Start reading at the beginning of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// True once every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| {
            Error::Corruption(format!(
                "row key truncated: needed {} bytes at offset {}",
                N, self.pos
            ))
        })?;
        self.pos = end;
        let mut arr = [0u8; N];
        arr.copy_from_slice(slice);
        Ok(arr)
    }

    /// Read an ordered boolean
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.take::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(Error::Corruption(format!("invalid boolean byte {:#04x}", b))),
        }
    }

    /// Read an ordered i32
    pub fn read_int(&mut self) -> Result<i32> {
        let unsigned = u32::from_be_bytes(self.take::<4>()?);
        Ok((unsigned ^ (1u32 << 31)) as i32)
    }

    /// Read an ordered i64
    pub fn read_long(&mut self) -> Result<i64> {
        let unsigned = u64::from_be_bytes(self.take::<8>()?);
        Ok((unsigned ^ (1u64 << 63)) as i64)
    }

    /// Read an ordered f32
    pub fn read_float(&mut self) -> Result<f32> {
        let key = u32::from_be_bytes(self.take::<4>()?);
        let bits = if key & (1u32 << 31) == 0 {
            !key
        } else {
            key ^ (1u32 << 31)
        };
        Ok(f32::from_bits(bits))
    }

    /// Read an ordered f64
    pub fn read_double(&mut self) -> Result<f64> {
        let key = u64::from_be_bytes(self.take::<8>()?);
        let bits = if key & (1u64 << 63) == 0 {
            !key
        } else {
            key ^ (1u64 << 63)
        };
        Ok(f64::from_bits(bits))
    }

    /// Read escaped, terminated bytes
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let b = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| Error::Corruption("unterminated row key component".to_string()))?;
            self.pos += 1;
            if b != ESCAPE {
                out.push(b);
                continue;
            }
            let marker = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| Error::Corruption("dangling escape in row key".to_string()))?;
            self.pos += 1;
            match marker {
                ESCAPED_ZERO => out.push(ESCAPE),
                TERMINATOR => return Ok(out),
                other => {
                    return Err(Error::Corruption(format!(
                        "invalid escape sequence 0x00 {:#04x} in row key",
                        other
                    )))
                }
            }
        }
    }

    /// Read an escaped, terminated UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Corruption(format!("row key string is not UTF-8: {}", e)))
    }
}
