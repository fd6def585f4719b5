//! The self-describing binary payload codec.
//!
//! Every `Value` round-trips byte-for-byte through [`encode`]/[`decode`]:
//! `decode(encode(v)) == v`, and re-encoding a decoded value reproduces the
//! exact same bytes (map keys keep insertion order rather than being
//! resorted).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_LIST: u8 = 0x06;
const TAG_MAP: u8 = 0x07;
const TAG_NDARRAY: u8 = 0x08;
const TAG_IMAGE: u8 = 0x09;

/// Element type carried by an [`Value::NdArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    F16,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
}

impl DType {
    fn tag(self) -> u8 {
        match self {
            DType::F16 => 0,
            DType::F32 => 1,
            DType::F64 => 2,
            DType::I8 => 3,
            DType::I16 => 4,
            DType::I32 => 5,
            DType::I64 => 6,
            DType::U8 => 7,
            DType::U16 => 8,
            DType::U32 => 9,
            DType::U64 => 10,
            DType::Bool => 11,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, CodecError> {
        Ok(match tag {
            0 => DType::F16,
            1 => DType::F32,
            2 => DType::F64,
            3 => DType::I8,
            4 => DType::I16,
            5 => DType::I32,
            6 => DType::I64,
            7 => DType::U8,
            8 => DType::U16,
            9 => DType::U32,
            10 => DType::U64,
            11 => DType::Bool,
            other => return Err(CodecError::InvalidDType(other)),
        })
    }
}

/// A value carried as a task payload, RPC payload, or pub/sub broadcast.
///
/// `Map` is a `Vec` of pairs rather than a hash map so that decoding then
/// re-encoding preserves the original key order, per the round-trip
/// requirement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
    NdArray {
        dtype: DType,
        shape: Vec<u64>,
        data: Bytes,
    },
    Image {
        format: String,
        data: Bytes,
        shape: Option<Vec<u64>>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of buffer")]
    Eof,
    #[error("invalid tag byte {0:#x}")]
    InvalidTag(u8),
    #[error("invalid dtype byte {0:#x}")]
    InvalidDType(u8),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("trailing bytes after value")]
    TrailingBytes,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::Bool => "bool",
        };
        f.write_str(s)
    }
}

/// Encode a value into its self-describing binary representation.
pub fn encode(value: &Value) -> Bytes {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf);
    buf.freeze()
}

/// Decode a value, requiring the buffer to be consumed exactly.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let mut buf = bytes;
    let value = decode_from(&mut buf)?;
    if !buf.is_empty() {
        return Err(CodecError::TrailingBytes);
    }
    Ok(value)
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_bytes(buf: &mut BytesMut, b: &[u8]) {
    buf.put_u64(b.len() as u64);
    buf.put_slice(b);
}

fn encode_into(value: &Value, buf: &mut BytesMut) {
    match value {
        Value::Null => buf.put_u8(TAG_NULL),
        Value::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        Value::Int(i) => {
            buf.put_u8(TAG_INT);
            buf.put_i64(*i);
        }
        Value::Float(f) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f64(*f);
        }
        Value::Str(s) => {
            buf.put_u8(TAG_STR);
            put_str(buf, s);
        }
        Value::Bytes(b) => {
            buf.put_u8(TAG_BYTES);
            put_bytes(buf, b);
        }
        Value::List(items) => {
            buf.put_u8(TAG_LIST);
            buf.put_u32(items.len() as u32);
            for item in items {
                encode_into(item, buf);
            }
        }
        Value::Map(entries) => {
            buf.put_u8(TAG_MAP);
            buf.put_u32(entries.len() as u32);
            for (k, v) in entries {
                put_str(buf, k);
                encode_into(v, buf);
            }
        }
        Value::NdArray { dtype, shape, data } => {
            buf.put_u8(TAG_NDARRAY);
            buf.put_u8(dtype.tag());
            buf.put_u32(shape.len() as u32);
            for dim in shape {
                buf.put_u64(*dim);
            }
            put_bytes(buf, data);
        }
        Value::Image {
            format,
            data,
            shape,
        } => {
            buf.put_u8(TAG_IMAGE);
            put_str(buf, format);
            match shape {
                None => buf.put_u8(0),
                Some(dims) => {
                    buf.put_u8(1);
                    buf.put_u32(dims.len() as u32);
                    for dim in dims {
                        buf.put_u64(*dim);
                    }
                }
            }
            put_bytes(buf, data);
        }
    }
}

fn take_str(buf: &mut &[u8]) -> Result<String, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Eof);
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(CodecError::Eof);
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

fn take_bytes(buf: &mut &[u8]) -> Result<Bytes, CodecError> {
    if buf.remaining() < 8 {
        return Err(CodecError::Eof);
    }
    let len = buf.get_u64() as usize;
    if buf.remaining() < len {
        return Err(CodecError::Eof);
    }
    Ok(buf.copy_to_bytes(len))
}

fn decode_from(buf: &mut &[u8]) -> Result<Value, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::Eof);
    }
    let tag = buf.get_u8();
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => {
            if !buf.has_remaining() {
                return Err(CodecError::Eof);
            }
            Ok(Value::Bool(buf.get_u8() != 0))
        }
        TAG_INT => {
            if buf.remaining() < 8 {
                return Err(CodecError::Eof);
            }
            Ok(Value::Int(buf.get_i64()))
        }
        TAG_FLOAT => {
            if buf.remaining() < 8 {
                return Err(CodecError::Eof);
            }
            Ok(Value::Float(buf.get_f64()))
        }
        TAG_STR => Ok(Value::Str(take_str(buf)?)),
        TAG_BYTES => Ok(Value::Bytes(take_bytes(buf)?)),
        TAG_LIST => {
            if buf.remaining() < 4 {
                return Err(CodecError::Eof);
            }
            let count = buf.get_u32();
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode_from(buf)?);
            }
            Ok(Value::List(items))
        }
        TAG_MAP => {
            if buf.remaining() < 4 {
                return Err(CodecError::Eof);
            }
            let count = buf.get_u32();
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = take_str(buf)?;
                let value = decode_from(buf)?;
                entries.push((key, value));
            }
            Ok(Value::Map(entries))
        }
        TAG_NDARRAY => {
            if !buf.has_remaining() {
                return Err(CodecError::Eof);
            }
            let dtype = DType::from_tag(buf.get_u8())?;
            if buf.remaining() < 4 {
                return Err(CodecError::Eof);
            }
            let ndim = buf.get_u32();
            let mut shape = Vec::with_capacity(ndim as usize);
            for _ in 0..ndim {
                if buf.remaining() < 8 {
                    return Err(CodecError::Eof);
                }
                shape.push(buf.get_u64());
            }
            let data = take_bytes(buf)?;
            Ok(Value::NdArray { dtype, shape, data })
        }
        TAG_IMAGE => {
            let format = take_str(buf)?;
            if !buf.has_remaining() {
                return Err(CodecError::Eof);
            }
            let has_shape = buf.get_u8();
            let shape = if has_shape != 0 {
                if buf.remaining() < 4 {
                    return Err(CodecError::Eof);
                }
                let ndim = buf.get_u32();
                let mut dims = Vec::with_capacity(ndim as usize);
                for _ in 0..ndim {
                    if buf.remaining() < 8 {
                        return Err(CodecError::Eof);
                    }
                    dims.push(buf.get_u64());
                }
                Some(dims)
            } else {
                None
            };
            let data = take_bytes(buf)?;
            Ok(Value::Image {
                format,
                data,
                shape,
            })
        }
        other => Err(CodecError::InvalidTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let encoded = encode(&v);
        let decoded = decode(&encoded).expect("decode should succeed");
        assert_eq!(decoded, v);
        // Re-encoding the decoded value must reproduce the same bytes.
        assert_eq!(encode(&decoded), encoded);
    }

    #[test]
    fn roundtrips_primitives() {
        roundtrip(Value::Null);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Int(-42));
        roundtrip(Value::Float(std::f64::consts::PI));
        roundtrip(Value::Str("hello, zaku".to_owned()));
        roundtrip(Value::Bytes(Bytes::from_static(b"\x00\x01\xff")));
    }

    #[test]
    fn roundtrips_nested_containers_preserving_key_order() {
        let v = Value::Map(vec![
            ("z".to_owned(), Value::Int(1)),
            ("a".to_owned(), Value::Int(2)),
            (
                "list".to_owned(),
                Value::List(vec![Value::Null, Value::Bool(true)]),
            ),
        ]);
        roundtrip(v);
    }

    #[test]
    fn roundtrips_ndarray_extension() {
        roundtrip(Value::NdArray {
            dtype: DType::F32,
            shape: vec![2, 3],
            data: Bytes::from(vec![0u8; 24]),
        });
    }

    #[test]
    fn roundtrips_image_extension_with_and_without_shape() {
        roundtrip(Value::Image {
            format: "png".to_owned(),
            data: Bytes::from_static(b"\x89PNG"),
            shape: None,
        });
        roundtrip(Value::Image {
            format: "jpeg".to_owned(),
            data: Bytes::from_static(b"\xff\xd8"),
            shape: Some(vec![64, 64, 3]),
        });
    }

    #[test]
    fn decode_rejects_trailing_bytes_and_truncated_input() {
        let encoded = encode(&Value::Int(7));
        let mut with_trailer = encoded.to_vec();
        with_trailer.push(0xAA);
        assert!(matches!(
            decode(&with_trailer),
            Err(CodecError::TrailingBytes)
        ));

        let truncated = &encoded[..encoded.len() - 1];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert!(matches!(decode(&[0xEE]), Err(CodecError::InvalidTag(0xEE))));
    }
}
