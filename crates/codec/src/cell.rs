//! Cell value encodings
//!
//! ## Scalar cells
//!
//! | type | bytes |
//! |---|---|
//! | boolean | 1 byte, `0` or `1` |
//! | int / float | 4 bytes big-endian |
//! | long / double | 8 bytes big-endian |
//! | string / enum | UTF-8 (enum: symbol name) |
//! | bytes | raw |
//!
//! ## Array blocks
//!
//! An array is one opaque cell: `u32` element count, then each element.
//! Inside a block, variable-width values (string, bytes, enum) are
//! `u32`-length-prefixed, maps are a `u32` entry count followed by
//! length-prefixed keys and values, and records are their fields in
//! writer declaration order. All integers are big-endian.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use tabula_core::{Error, Result, Value};
use tabula_schema::{FieldType, RecordType};

/// Encode one cell value of `field_type`
///
/// `path` names the field in error messages.
pub fn encode_cell(path: &str, field_type: &FieldType, value: &Value) -> Result<Vec<u8>> {
    match (field_type, value) {
        (FieldType::Boolean, Value::Boolean(b)) => Ok(vec![u8::from(*b)]),
        (FieldType::Int, Value::Int(i)) => Ok(i.to_be_bytes().to_vec()),
        (FieldType::Long, Value::Long(l)) => Ok(l.to_be_bytes().to_vec()),
        (FieldType::Float, Value::Float(f)) => Ok(f.to_be_bytes().to_vec()),
        (FieldType::Double, Value::Double(d)) => Ok(d.to_be_bytes().to_vec()),
        (FieldType::String, Value::String(s)) => Ok(s.as_bytes().to_vec()),
        (FieldType::Bytes, Value::Bytes(b)) => Ok(b.clone()),
        (FieldType::Enum { symbols, .. }, Value::Enum(symbol)) => {
            check_symbol(path, symbols, symbol)?;
            Ok(symbol.as_bytes().to_vec())
        }
        (FieldType::Array(items), Value::Array(elements)) => {
            let mut buf = Vec::new();
            write_len(&mut buf, elements.len())?;
            for (i, element) in elements.iter().enumerate() {
                write_block_value(&mut buf, &format!("{}[{}]", path, i), items, element)?;
            }
            Ok(buf)
        }
        (FieldType::Array(_), Value::Null) => Ok(0u32.to_be_bytes().to_vec()),
        _ => Err(type_mismatch(path, field_type, value)),
    }
}

/// Decode one cell written as `field_type`
///
/// # Errors
///
/// Returns `IncompatibleSchema` when the bytes do not have the layout
/// `field_type` declares (wrong width, invalid UTF-8, unknown symbol,
/// truncated or oversized block).
pub fn decode_cell(path: &str, field_type: &FieldType, bytes: &[u8]) -> Result<Value> {
    match field_type {
        FieldType::Boolean => match bytes {
            [0] => Ok(Value::Boolean(false)),
            [1] => Ok(Value::Boolean(true)),
            _ => Err(layout_mismatch(path, field_type, bytes)),
        },
        FieldType::Int => fixed::<4>(path, field_type, bytes).map(|b| Value::Int(i32::from_be_bytes(b))),
        FieldType::Long => {
            fixed::<8>(path, field_type, bytes).map(|b| Value::Long(i64::from_be_bytes(b)))
        }
        FieldType::Float => {
            fixed::<4>(path, field_type, bytes).map(|b| Value::Float(f32::from_be_bytes(b)))
        }
        FieldType::Double => {
            fixed::<8>(path, field_type, bytes).map(|b| Value::Double(f64::from_be_bytes(b)))
        }
        FieldType::String => utf8(path, bytes.to_vec()).map(Value::String),
        FieldType::Bytes => Ok(Value::Bytes(bytes.to_vec())),
        FieldType::Enum { symbols, .. } => {
            let symbol = utf8(path, bytes.to_vec())?;
            check_symbol(path, symbols, &symbol).map_err(|_| {
                Error::incompatible(format!(
                    "field '{}' holds unknown enum symbol '{}'",
                    path, symbol
                ))
            })?;
            Ok(Value::Enum(symbol))
        }
        FieldType::Array(items) => {
            let mut cursor = Cursor::new(bytes);
            let value = read_array(&mut cursor, path, items).map_err(|e| block_error(path, e))?;
            if cursor.position() as usize != bytes.len() {
                return Err(Error::incompatible(format!(
                    "array block of field '{}' has {} trailing bytes",
                    path,
                    bytes.len() - cursor.position() as usize
                )));
            }
            Ok(value)
        }
        FieldType::Map(_) | FieldType::Record(_) => Err(Error::incompatible(format!(
            "field '{}' of type {} is not stored as a single cell",
            path, field_type
        ))),
    }
}

fn fixed<const N: usize>(path: &str, field_type: &FieldType, bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| layout_mismatch(path, field_type, bytes))
}

fn utf8(path: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|_| Error::incompatible(format!("field '{}' holds invalid UTF-8", path)))
}

fn check_symbol(path: &str, symbols: &[String], symbol: &str) -> Result<()> {
    if symbols.iter().any(|s| s == symbol) {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "field '{}' has unknown enum symbol '{}'",
            path, symbol
        )))
    }
}

fn type_mismatch(path: &str, field_type: &FieldType, value: &Value) -> Error {
    Error::invalid_argument(format!(
        "field '{}' expects {}, got {}",
        path,
        field_type,
        value.type_name()
    ))
}

fn layout_mismatch(path: &str, field_type: &FieldType, bytes: &[u8]) -> Error {
    Error::incompatible(format!(
        "field '{}' declared {} but holds {} bytes",
        path,
        field_type,
        bytes.len()
    ))
}

/// Block reads fail either on I/O (truncation) or on content
enum BlockError {
    Io(io::Error),
    Invalid(Error),
}

impl From<io::Error> for BlockError {
    fn from(e: io::Error) -> Self {
        BlockError::Io(e)
    }
}

impl From<Error> for BlockError {
    fn from(e: Error) -> Self {
        BlockError::Invalid(e)
    }
}

fn block_error(path: &str, e: BlockError) -> Error {
    match e {
        BlockError::Io(e) => {
            Error::incompatible(format!("array block of field '{}' is truncated: {}", path, e))
        }
        BlockError::Invalid(e) => e,
    }
}

fn write_len(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::invalid_argument(format!("length {} exceeds u32", len)))?;
    buf.write_u32::<BigEndian>(len)?;
    Ok(())
}

fn write_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    write_len(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn write_block_value(buf: &mut Vec<u8>, path: &str, field_type: &FieldType, value: &Value) -> Result<()> {
    match (field_type, value) {
        (FieldType::Boolean, Value::Boolean(b)) => buf.write_u8(u8::from(*b))?,
        (FieldType::Int, Value::Int(i)) => buf.write_i32::<BigEndian>(*i)?,
        (FieldType::Long, Value::Long(l)) => buf.write_i64::<BigEndian>(*l)?,
        (FieldType::Float, Value::Float(f)) => buf.write_f32::<BigEndian>(*f)?,
        (FieldType::Double, Value::Double(d)) => buf.write_f64::<BigEndian>(*d)?,
        (FieldType::String, Value::String(s)) => write_prefixed(buf, s.as_bytes())?,
        (FieldType::Bytes, Value::Bytes(b)) => write_prefixed(buf, b)?,
        (FieldType::Enum { symbols, .. }, Value::Enum(symbol)) => {
            check_symbol(path, symbols, symbol)?;
            write_prefixed(buf, symbol.as_bytes())?
        }
        (FieldType::Array(items), Value::Array(elements)) => {
            write_len(buf, elements.len())?;
            for (i, element) in elements.iter().enumerate() {
                write_block_value(buf, &format!("{}[{}]", path, i), items, element)?;
            }
        }
        (FieldType::Map(values), Value::Map(entries)) => {
            write_len(buf, entries.len())?;
            for (key, entry) in entries {
                write_prefixed(buf, key.as_bytes())?;
                write_block_value(buf, &format!("{}[{}]", path, key), values, entry)?;
            }
        }
        (FieldType::Array(_) | FieldType::Map(_), Value::Null) => write_len(buf, 0)?,
        (FieldType::Record(record), Value::Record(fields)) => {
            write_block_record(buf, path, record, fields)?
        }
        _ => return Err(type_mismatch(path, field_type, value)),
    }
    Ok(())
}

fn write_block_record(
    buf: &mut Vec<u8>,
    path: &str,
    record: &RecordType,
    fields: &BTreeMap<String, Value>,
) -> Result<()> {
    for sub in &record.fields {
        let sub_path = format!("{}.{}", path, sub.name);
        let value = match (fields.get(&sub.name), &sub.default) {
            (Some(v), _) if !v.is_null() => v,
            (_, Some(default)) => default,
            _ => {
                return Err(Error::invalid_argument(format!(
                    "no value for field '{}' and it has no default",
                    sub_path
                )))
            }
        };
        write_block_value(buf, &sub_path, &sub.field_type, value)?;
    }
    Ok(())
}

fn read_len<R: Read>(reader: &mut R) -> std::result::Result<usize, BlockError> {
    Ok(reader.read_u32::<BigEndian>()? as usize)
}

fn read_prefixed(
    reader: &mut Cursor<&[u8]>,
) -> std::result::Result<Vec<u8>, BlockError> {
    let len = read_len(reader)?;
    let remaining = reader.get_ref().len() - reader.position() as usize;
    if len > remaining {
        return Err(BlockError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("length prefix {} exceeds remaining {} bytes", len, remaining),
        )));
    }
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_array(
    reader: &mut Cursor<&[u8]>,
    path: &str,
    items: &FieldType,
) -> std::result::Result<Value, BlockError> {
    let count = read_len(reader)?;
    // Every element takes at least one byte
    let remaining = reader.get_ref().len() - reader.position() as usize;
    let mut elements = Vec::with_capacity(count.min(remaining));
    for i in 0..count {
        elements.push(read_block_value(reader, &format!("{}[{}]", path, i), items)?);
    }
    Ok(Value::Array(elements))
}

fn read_block_value(
    reader: &mut Cursor<&[u8]>,
    path: &str,
    field_type: &FieldType,
) -> std::result::Result<Value, BlockError> {
    Ok(match field_type {
        FieldType::Boolean => match reader.read_u8()? {
            0 => Value::Boolean(false),
            1 => Value::Boolean(true),
            b => {
                return Err(Error::incompatible(format!(
                    "field '{}' holds invalid boolean byte {:#04x}",
                    path, b
                ))
                .into())
            }
        },
        FieldType::Int => Value::Int(reader.read_i32::<BigEndian>()?),
        FieldType::Long => Value::Long(reader.read_i64::<BigEndian>()?),
        FieldType::Float => Value::Float(reader.read_f32::<BigEndian>()?),
        FieldType::Double => Value::Double(reader.read_f64::<BigEndian>()?),
        FieldType::String => Value::String(utf8(path, read_prefixed(reader)?)?),
        FieldType::Bytes => Value::Bytes(read_prefixed(reader)?),
        FieldType::Enum { symbols, .. } => {
            let symbol = utf8(path, read_prefixed(reader)?)?;
            if !symbols.contains(&symbol) {
                return Err(Error::incompatible(format!(
                    "field '{}' holds unknown enum symbol '{}'",
                    path, symbol
                ))
                .into());
            }
            Value::Enum(symbol)
        }
        FieldType::Array(items) => read_array(reader, path, items)?,
        FieldType::Map(values) => {
            let count = read_len(reader)?;
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let key = utf8(path, read_prefixed(reader)?)?;
                let entry_path = format!("{}[{}]", path, key);
                let value = read_block_value(reader, &entry_path, values)?;
                entries.insert(key, value);
            }
            Value::Map(entries)
        }
        FieldType::Record(record) => {
            let mut fields = BTreeMap::new();
            for sub in &record.fields {
                let sub_path = format!("{}.{}", path, sub.name);
                fields.insert(
                    sub.name.clone(),
                    read_block_value(reader, &sub_path, &sub.field_type)?,
                );
            }
            Value::Record(fields)
        }
    })
}
