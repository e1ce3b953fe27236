//! Layout planning: byte offsets, padding, alignment and bitfield placement.
//!
//! Struct rules follow the usual C compiler behaviour under `#pragma pack(n)`:
//!
//! - Fields are placed in declaration order, each aligned to `min(alignment, pack)`.
//! - A run of bitfields with the same base type shares one storage unit of that type
//!   until the next field would overflow it; a plain field or a different base type
//!   closes the run.
//! - The total size is rounded up to the struct alignment, `min(max field alignment, pack)`.
//!
//! Unions place every field at offset 0; packing does not apply to them.
//!
//! Bit positions inside a storage unit depend on byte order: little endian fills from
//! the least-significant bit upwards, big endian from the most-significant bit down.

use crate::ast::{CompositeKind, Endianness, Field, FieldType};
use crate::primitive::BaseType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    #[error("type {0} declared more than once")]
    DuplicateType(String),
    #[error("{composite}: field {field} declared more than once")]
    DuplicateField { composite: String, field: String },
    #[error("{composite}.{field}: unknown type {type_name} (composites must be declared before use)")]
    UnknownType {
        composite: String,
        field: String,
        type_name: String,
    },
    #[error("{composite}: packing must be positive (got {pack})")]
    NonPositivePacking { composite: String, pack: i64 },
    #[error("{composite}.{field}: bit width must be at least 1")]
    ZeroBitWidth { composite: String, field: String },
    #[error("{composite}.{field}: bit width {bit_width} exceeds the {capacity} bits of {base}")]
    BitWidthTooLarge {
        composite: String,
        field: String,
        bit_width: u32,
        base: BaseType,
        capacity: u32,
    },
    #[error("{composite}.{field}: bit width not allowed on {type_name} (integer primitives only)")]
    BitfieldOnNonInteger {
        composite: String,
        field: String,
        type_name: String,
    },
    #[error("{composite}: struct members {first} and {field} of a union must share one byte order")]
    MixedUnionByteOrder {
        composite: String,
        first: String,
        field: String,
    },
}

/// Position of a bitfield inside its storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSlot {
    /// Shift of the field's least-significant bit within the unit value.
    pub bit_offset: u32,
    pub bit_width: u32,
}

impl BitSlot {
    /// Mask of `bit_width` low bits (before shifting).
    pub fn mask(&self) -> u64 {
        if self.bit_width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_width) - 1
        }
    }

    pub fn max_value(&self) -> u64 {
        self.mask()
    }
}

/// Placement of one field. For bitfields `offset`/`size` describe the storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset: usize,
    pub size: usize,
    pub bits: Option<BitSlot>,
}

impl FieldLayout {
    pub fn storage_unit_offset(&self) -> Option<usize> {
        self.bits.map(|_| self.offset)
    }
}

/// Immutable layout of a composite, one [`FieldLayout`] per field in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutInfo {
    pub total_size: usize,
    pub alignment: usize,
    pub fields: Vec<FieldLayout>,
}

/// Open storage unit while walking a bitfield run.
#[derive(Clone, Copy)]
struct BitRun {
    base: BaseType,
    unit_offset: usize,
    used_bits: u32,
}

fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) / align * align
}

/// Bit offset of a `width`-bit field placed after `used` bits of a `capacity`-bit unit.
fn assign_bits(endianness: Endianness, capacity: u32, used: u32, width: u32) -> u32 {
    match endianness {
        Endianness::Little => used,
        Endianness::Big => capacity - used - width,
    }
}

/// Validate a bitfield declaration and return its base integer type.
fn bitfield_base(composite: &str, field: &Field, width: u32) -> Result<BaseType, DeclarationError> {
    let base = match &field.ty {
        FieldType::Base(b) if b.is_integer() => *b,
        other => {
            return Err(DeclarationError::BitfieldOnNonInteger {
                composite: composite.to_string(),
                field: field.name.clone(),
                type_name: other.name().to_string(),
            })
        }
    };
    if width == 0 {
        return Err(DeclarationError::ZeroBitWidth {
            composite: composite.to_string(),
            field: field.name.clone(),
        });
    }
    if width > base.bit_capacity() {
        return Err(DeclarationError::BitWidthTooLarge {
            composite: composite.to_string(),
            field: field.name.clone(),
            bit_width: width,
            base,
            capacity: base.bit_capacity(),
        });
    }
    Ok(base)
}

/// Compute the layout of a composite from its resolved fields.
pub fn plan(
    composite: &str,
    kind: CompositeKind,
    fields: &[Field],
    pack: i64,
    endianness: Endianness,
) -> Result<LayoutInfo, DeclarationError> {
    if pack <= 0 {
        return Err(DeclarationError::NonPositivePacking {
            composite: composite.to_string(),
            pack,
        });
    }
    let layout = match kind {
        CompositeKind::Struct => plan_struct(composite, fields, pack as usize, endianness)?,
        CompositeKind::Union => plan_union(composite, fields, endianness)?,
    };
    for (f, l) in fields.iter().zip(&layout.fields) {
        log::trace!(
            "{}.{}: offset={} size={} bits={:?}",
            composite,
            f.name,
            l.offset,
            l.size,
            l.bits
        );
    }
    Ok(layout)
}

fn plan_struct(
    composite: &str,
    fields: &[Field],
    pack: usize,
    endianness: Endianness,
) -> Result<LayoutInfo, DeclarationError> {
    let mut out = Vec::with_capacity(fields.len());
    let mut cursor = 0usize;
    let mut max_align = 1usize;
    let mut run: Option<BitRun> = None;

    for f in fields {
        match f.bit_width {
            Some(width) => {
                let base = bitfield_base(composite, f, width)?;
                let capacity = base.bit_capacity();
                let mut r = match run {
                    Some(r) if r.base == base && r.used_bits + width <= capacity => r,
                    _ => {
                        let align = base.alignment().min(pack);
                        max_align = max_align.max(align);
                        cursor = align_up(cursor, align);
                        let r = BitRun {
                            base,
                            unit_offset: cursor,
                            used_bits: 0,
                        };
                        cursor += base.byte_width();
                        r
                    }
                };
                let bit_offset = assign_bits(endianness, capacity, r.used_bits, width);
                r.used_bits += width;
                run = Some(r);
                out.push(FieldLayout {
                    offset: r.unit_offset,
                    size: base.byte_width(),
                    bits: Some(BitSlot {
                        bit_offset,
                        bit_width: width,
                    }),
                });
            }
            None => {
                run = None;
                let align = f.ty.alignment().min(pack);
                max_align = max_align.max(align);
                cursor = align_up(cursor, align);
                out.push(FieldLayout {
                    offset: cursor,
                    size: f.ty.size(),
                    bits: None,
                });
                cursor += f.ty.size();
            }
        }
    }

    Ok(LayoutInfo {
        total_size: align_up(cursor, max_align),
        alignment: max_align,
        fields: out,
    })
}

fn plan_union(
    composite: &str,
    fields: &[Field],
    endianness: Endianness,
) -> Result<LayoutInfo, DeclarationError> {
    let mut out = Vec::with_capacity(fields.len());
    let mut total_size = 0usize;
    let mut alignment = 1usize;
    for f in fields {
        let bits = match f.bit_width {
            Some(width) => {
                let base = bitfield_base(composite, f, width)?;
                Some(BitSlot {
                    bit_offset: assign_bits(endianness, base.bit_capacity(), 0, width),
                    bit_width: width,
                })
            }
            None => None,
        };
        let size = f.ty.size();
        total_size = total_size.max(size);
        alignment = alignment.max(f.ty.alignment());
        out.push(FieldLayout {
            offset: 0,
            size,
            bits,
        });
    }
    Ok(LayoutInfo {
        total_size,
        alignment,
        fields: out,
    })
}
