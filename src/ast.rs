//! Declarations for fixed-layout composites and their resolved, immutable form.
//!
//! A [`Schema`] is an ordered list of [`CompositeDecl`]s, built either with the
//! builder methods below or by the schema parser ([`crate::parser::parse`]).
//! [`TypeTable::resolve`] checks every declaration, plans its layout once and
//! hands out shared [`CompositeType`]s that never change afterwards.

use crate::layout::{self, DeclarationError, LayoutInfo};
use crate::primitive::BaseType;
use std::collections::HashMap;
use std::sync::Arc;

/// Packing bound applied when a declaration does not set one.
pub const DEFAULT_PACK: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Struct,
    Union,
}

impl CompositeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            CompositeKind::Struct => "struct",
            CompositeKind::Union => "union",
        }
    }
}

/// Byte order as declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    Little,
    Big,
    #[default]
    Native,
}

impl ByteOrder {
    pub fn resolve(self) -> Endianness {
        match self {
            ByteOrder::Little => Endianness::Little,
            ByteOrder::Big => Endianness::Big,
            ByteOrder::Native => Endianness::native(),
        }
    }
}

/// Concrete byte order used by the layout planner and the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// Field type as written in a declaration: a primitive or the name of an earlier composite.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Base(BaseType),
    Named(String),
}

impl From<BaseType> for TypeRef {
    fn from(b: BaseType) -> Self {
        TypeRef::Base(b)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub type_ref: TypeRef,
    pub bit_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeDecl {
    pub name: String,
    pub kind: CompositeKind,
    pub fields: Vec<FieldDecl>,
    pub pack: i64,
    pub byte_order: ByteOrder,
}

impl CompositeDecl {
    pub fn new(name: impl Into<String>, kind: CompositeKind) -> Self {
        CompositeDecl {
            name: name.into(),
            kind,
            fields: Vec::new(),
            pack: DEFAULT_PACK,
            byte_order: ByteOrder::Native,
        }
    }

    pub fn structure(name: impl Into<String>) -> Self {
        CompositeDecl::new(name, CompositeKind::Struct)
    }

    pub fn union(name: impl Into<String>) -> Self {
        CompositeDecl::new(name, CompositeKind::Union)
    }

    pub fn pack(mut self, pack: i64) -> Self {
        self.pack = pack;
        self
    }

    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Whole primitive field.
    pub fn field(mut self, name: impl Into<String>, base: BaseType) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            type_ref: TypeRef::Base(base),
            bit_width: None,
        });
        self
    }

    /// Bitfield of `bits` bits stored in a unit of type `base`.
    pub fn bitfield(mut self, name: impl Into<String>, base: BaseType, bits: u32) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            type_ref: TypeRef::Base(base),
            bit_width: Some(bits),
        });
        self
    }

    /// Field holding a composite declared earlier in the same schema.
    pub fn nested(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            type_ref: TypeRef::Named(type_name.into()),
            bit_width: None,
        });
        self
    }
}

/// Ordered set of declarations. Composites may only refer to composites declared before them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub composites: Vec<CompositeDecl>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn with(mut self, decl: CompositeDecl) -> Self {
        self.composites.push(decl);
        self
    }

    pub fn push(&mut self, decl: CompositeDecl) {
        self.composites.push(decl);
    }
}

/// Resolved field type.
#[derive(Debug, Clone)]
pub enum FieldType {
    Base(BaseType),
    Composite(Arc<CompositeType>),
}

impl FieldType {
    pub fn size(&self) -> usize {
        match self {
            FieldType::Base(b) => b.byte_width(),
            FieldType::Composite(c) => c.size(),
        }
    }

    pub fn alignment(&self) -> usize {
        match self {
            FieldType::Base(b) => b.alignment(),
            FieldType::Composite(c) => c.alignment(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FieldType::Base(b) => b.short_name(),
            FieldType::Composite(c) => c.name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub bit_width: Option<u32>,
    /// Declaration order within the composite.
    pub index: usize,
}

impl Field {
    pub fn is_bitfield(&self) -> bool {
        self.bit_width.is_some()
    }
}

/// A declared struct or union with its precomputed layout.
#[derive(Debug)]
pub struct CompositeType {
    name: String,
    kind: CompositeKind,
    pack: usize,
    byte_order: ByteOrder,
    endianness: Endianness,
    fields: Vec<Field>,
    by_name: HashMap<String, usize>,
    layout: LayoutInfo,
}

impl CompositeType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CompositeKind {
        self.kind
    }

    pub fn pack(&self) -> usize {
        self.pack
    }

    /// Declared byte order (`Native` for every union).
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Byte order the codec uses for this composite's own fields.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn layout(&self) -> &LayoutInfo {
        &self.layout
    }

    pub fn size(&self) -> usize {
        self.layout.total_size
    }

    pub fn alignment(&self) -> usize {
        self.layout.alignment
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.field_index(name).map(|i| self.layout.fields[i].offset)
    }

    /// Nested composites referenced directly by this type's fields, in declaration order.
    pub fn nested_types(&self) -> impl Iterator<Item = &Arc<CompositeType>> {
        self.fields.iter().filter_map(|f| match &f.ty {
            FieldType::Composite(c) => Some(c),
            FieldType::Base(_) => None,
        })
    }

    fn declare(
        decl: &CompositeDecl,
        lookup: impl Fn(&str) -> Option<Arc<CompositeType>>,
    ) -> Result<CompositeType, DeclarationError> {
        let mut by_name = HashMap::new();
        let mut fields = Vec::with_capacity(decl.fields.len());
        for (index, f) in decl.fields.iter().enumerate() {
            if by_name.insert(f.name.clone(), index).is_some() {
                return Err(DeclarationError::DuplicateField {
                    composite: decl.name.clone(),
                    field: f.name.clone(),
                });
            }
            let ty = match &f.type_ref {
                TypeRef::Base(b) => FieldType::Base(*b),
                TypeRef::Named(n) => FieldType::Composite(lookup(n).ok_or_else(|| {
                    DeclarationError::UnknownType {
                        composite: decl.name.clone(),
                        field: f.name.clone(),
                        type_name: n.clone(),
                    }
                })?),
            };
            fields.push(Field {
                name: f.name.clone(),
                ty,
                bit_width: f.bit_width,
                index,
            });
        }

        let byte_order = match decl.kind {
            CompositeKind::Struct => decl.byte_order,
            CompositeKind::Union => {
                if decl.byte_order.resolve() != Endianness::native() {
                    log::warn!(
                        "union {}: declared byte order {:?} ignored, unions use native byte order",
                        decl.name,
                        decl.byte_order
                    );
                }
                check_union_members(&decl.name, &fields)?;
                ByteOrder::Native
            }
        };
        let endianness = byte_order.resolve();
        let layout = layout::plan(&decl.name, decl.kind, &fields, decl.pack, endianness)?;

        Ok(CompositeType {
            name: decl.name.clone(),
            kind: decl.kind,
            // plan() has rejected non-positive packing.
            pack: decl.pack as usize,
            byte_order,
            endianness,
            fields,
            by_name,
            layout,
        })
    }
}

/// Struct members of one union must agree on byte order.
fn check_union_members(union_name: &str, fields: &[Field]) -> Result<(), DeclarationError> {
    let mut first: Option<(&str, Endianness)> = None;
    for f in fields {
        let c = match &f.ty {
            FieldType::Composite(c) if c.kind() == CompositeKind::Struct => c,
            _ => continue,
        };
        match first {
            None => first = Some((f.name.as_str(), c.endianness())),
            Some((first_field, e)) if e != c.endianness() => {
                return Err(DeclarationError::MixedUnionByteOrder {
                    composite: union_name.to_string(),
                    first: first_field.to_string(),
                    field: f.name.clone(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Write-once table of resolved composites, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Vec<Arc<CompositeType>>,
    by_name: HashMap<String, usize>,
}

impl TypeTable {
    /// Resolve every declaration in schema order, planning each layout exactly once.
    pub fn resolve(schema: &Schema) -> Result<Self, DeclarationError> {
        let mut table = TypeTable::default();
        for decl in &schema.composites {
            if table.by_name.contains_key(&decl.name) {
                return Err(DeclarationError::DuplicateType(decl.name.clone()));
            }
            let ty = CompositeType::declare(decl, |n| table.get(n).cloned())?;
            log::debug!(
                "declared {} {}: size={} align={} pack={} order={:?}",
                ty.kind().keyword(),
                ty.name(),
                ty.size(),
                ty.alignment(),
                ty.pack(),
                ty.endianness()
            );
            table.by_name.insert(decl.name.clone(), table.types.len());
            table.types.push(Arc::new(ty));
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CompositeType>> {
        self.by_name.get(name).map(|&i| &self.types[i])
    }

    /// Types in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<CompositeType>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
