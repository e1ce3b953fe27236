//! Pack/parse instances to and from their fixed-size byte image.
//!
//! Every field is written at the offset computed by the layout planner, in the byte
//! order of the composite that declares it. Nested composites are packed with their
//! own byte order and spliced in. Padding is zero on output and ignored on input.

use crate::ast::{CompositeKind, CompositeType, Endianness, FieldType};
use crate::primitive::BaseType;
use crate::validate::{self, RangeError};
use crate::value::{Instance, Storage, Value};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("{composite}: input has {actual} bytes, need at least {expected}")]
    ShortInput {
        composite: String,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Range(#[from] RangeError),
}

/// Serialize an instance to exactly `total_size` bytes.
pub fn pack(inst: &Instance) -> Vec<u8> {
    let ty = inst.type_def();
    match inst.storage() {
        Storage::Overlay(bytes) => bytes.clone(),
        Storage::Fields(values) => {
            let mut buf = vec![0u8; ty.size()];
            for (i, v) in values.iter().enumerate() {
                write_field(ty, i, v, &mut buf);
            }
            buf
        }
    }
}

/// Replace all field values of `inst` from `bytes`.
///
/// Trailing bytes past `total_size` are ignored. Every value is decoded and validated
/// before anything is committed, so a failed parse leaves `inst` untouched.
pub fn parse(inst: &mut Instance, bytes: &[u8]) -> Result<(), CodecError> {
    let storage = decode_storage(inst.type_def(), bytes)?;
    inst.replace_storage(storage);
    Ok(())
}

/// Decode a fresh instance of `ty` from `bytes`.
pub fn decode(ty: &Arc<CompositeType>, bytes: &[u8]) -> Result<Instance, CodecError> {
    let storage = decode_storage(ty, bytes)?;
    Ok(Instance::from_storage(ty, storage))
}

fn decode_storage(ty: &Arc<CompositeType>, bytes: &[u8]) -> Result<Storage, CodecError> {
    if bytes.len() < ty.size() {
        return Err(CodecError::ShortInput {
            composite: ty.name().to_string(),
            expected: ty.size(),
            actual: bytes.len(),
        });
    }
    let bytes = &bytes[..ty.size()];
    let mut values = Vec::with_capacity(ty.fields().len());
    for (i, f) in ty.fields().iter().enumerate() {
        let v = read_field(ty, i, bytes)?;
        validate::check(ty.name(), f, &v)?;
        values.push(v);
    }
    log::trace!("decoded {} from {} bytes", ty.name(), bytes.len());
    Ok(match ty.kind() {
        CompositeKind::Struct => Storage::Fields(values),
        CompositeKind::Union => Storage::Overlay(bytes.to_vec()),
    })
}

/// Write one field into the composite image `buf` (at least `total_size` long).
/// Bitfields are merged into their storage unit without touching neighbouring bits.
pub(crate) fn write_field(ty: &CompositeType, index: usize, value: &Value, buf: &mut [u8]) {
    let field = &ty.fields()[index];
    let l = ty.layout().fields[index];
    let codec = ScalarCodec::new(ty.endianness());
    let slot = &mut buf[l.offset..l.offset + l.size];
    match &field.ty {
        FieldType::Composite(_) => match value {
            Value::Composite(inst) => slot.copy_from_slice(&pack(inst)),
            other => debug_assert!(false, "{}.{}: composite field holds {:?}", ty.name(), field.name, other),
        },
        FieldType::Base(base) => match (l.bits, value) {
            (Some(bits), Value::Int(v)) => {
                let raw = *v as u64 & bits.mask();
                let unit = codec.read_uint(slot);
                let cleared = unit & !(bits.mask() << bits.bit_offset);
                codec.write_uint(slot, cleared | (raw << bits.bit_offset));
            }
            (Some(_), other) => debug_assert!(false, "{}.{}: bitfield holds {:?}", ty.name(), field.name, other),
            (None, _) => codec.write_scalar(*base, value, slot),
        },
    }
}

/// Read one field from the composite image `buf` (at least `total_size` long).
pub(crate) fn read_field(ty: &CompositeType, index: usize, buf: &[u8]) -> Result<Value, CodecError> {
    let field = &ty.fields()[index];
    let l = ty.layout().fields[index];
    let codec = ScalarCodec::new(ty.endianness());
    let slot = &buf[l.offset..l.offset + l.size];
    Ok(match &field.ty {
        FieldType::Composite(c) => Value::Composite(decode(c, slot)?),
        FieldType::Base(base) => match l.bits {
            Some(bits) => Value::Int(((codec.read_uint(slot) >> bits.bit_offset) & bits.mask()) as i128),
            None => codec.read_scalar(*base, slot),
        },
    })
}

/// Scalar reads and writes in one byte order. Slices are always exactly the scalar's width.
struct ScalarCodec {
    endianness: Endianness,
}

impl ScalarCodec {
    fn new(endianness: Endianness) -> Self {
        ScalarCodec { endianness }
    }

    fn read_scalar(&self, base: BaseType, buf: &[u8]) -> Value {
        match base {
            BaseType::U8 | BaseType::U16 | BaseType::U32 | BaseType::U64 => {
                Value::Int(self.read_uint(buf) as i128)
            }
            BaseType::I8 | BaseType::I16 | BaseType::I32 | BaseType::I64 => {
                Value::Int(self.read_int(buf) as i128)
            }
            BaseType::F32 => Value::Float(self.read_f32(buf) as f64),
            BaseType::F64 => Value::Float(self.read_f64(buf)),
        }
    }

    fn write_scalar(&self, base: BaseType, v: &Value, buf: &mut [u8]) {
        match (base, v) {
            (BaseType::F32, Value::Float(f)) => self.write_f32(buf, *f as f32),
            (BaseType::F64, Value::Float(f)) => self.write_f64(buf, *f),
            (b, Value::Int(i)) if b.is_integer() => {
                // Two's complement truncated to the field width.
                let raw = *i as u64 & width_mask(buf.len());
                self.write_uint(buf, raw);
            }
            (b, other) => debug_assert!(false, "{} field holds {:?}", b, other),
        }
    }

    fn read_uint(&self, buf: &[u8]) -> u64 {
        match self.endianness {
            Endianness::Big => BigEndian::read_uint(buf, buf.len()),
            Endianness::Little => LittleEndian::read_uint(buf, buf.len()),
        }
    }

    fn read_int(&self, buf: &[u8]) -> i64 {
        match self.endianness {
            Endianness::Big => BigEndian::read_int(buf, buf.len()),
            Endianness::Little => LittleEndian::read_int(buf, buf.len()),
        }
    }

    fn write_uint(&self, buf: &mut [u8], v: u64) {
        let n = buf.len();
        match self.endianness {
            Endianness::Big => BigEndian::write_uint(buf, v, n),
            Endianness::Little => LittleEndian::write_uint(buf, v, n),
        }
    }

    fn read_f32(&self, buf: &[u8]) -> f32 {
        match self.endianness {
            Endianness::Big => BigEndian::read_f32(buf),
            Endianness::Little => LittleEndian::read_f32(buf),
        }
    }

    fn read_f64(&self, buf: &[u8]) -> f64 {
        match self.endianness {
            Endianness::Big => BigEndian::read_f64(buf),
            Endianness::Little => LittleEndian::read_f64(buf),
        }
    }

    fn write_f32(&self, buf: &mut [u8], v: f32) {
        match self.endianness {
            Endianness::Big => BigEndian::write_f32(buf, v),
            Endianness::Little => LittleEndian::write_f32(buf, v),
        }
    }

    fn write_f64(&self, buf: &mut [u8], v: f64) {
        match self.endianness {
            Endianness::Big => BigEndian::write_f64(buf, v),
            Endianness::Little => LittleEndian::write_f64(buf, v),
        }
    }
}

fn width_mask(nbytes: usize) -> u64 {
    if nbytes >= 8 {
        u64::MAX
    } else {
        (1u64 << (nbytes * 8)) - 1
    }
}
