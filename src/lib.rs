//! # embstruct: fixed-layout binary structs and unions
//!
//! Declare C-style composites as ordered field lists, then build validated values,
//! pack them to bytes, parse bytes back, and print the equivalent C declaration.
//!
//! ## Pieces
//!
//! - **Declarations** ([`ast`]): [`CompositeDecl`] builder or the schema language
//!   ([`parser`]), resolved once into an immutable [`TypeTable`].
//! - **Layout** ([`layout`]): offsets, padding and bitfield placement under a packing
//!   bound (default 4) and byte order (little, big or native; unions are always native).
//! - **Values** ([`value`]): [`Instance`] with range-checked setters.
//! - **Codec** ([`codec`]): `pack` / `parse` of the fixed-size byte image.
//! - **C output** ([`cgen`]): `typedef struct _tag_Name { ... } Name;`.
//!
//! ## Example schema
//!
//! ```text
//! struct Header (pack = 1, endian = big) {
//!   id: u16;
//!   version: u8 : 3;
//!   kind: u8 : 5;
//! }
//!
//! union Raw {
//!   header: Header;
//!   word: u32;
//! }
//! ```
//!
//! ## Usage
//!
//! ```
//! use embstruct::{CompositeDecl, BaseType, ByteOrder, Instance, Schema, TypeTable};
//!
//! let table = TypeTable::resolve(
//!     &Schema::new().with(
//!         CompositeDecl::structure("S")
//!             .byte_order(ByteOrder::Big)
//!             .field("a", BaseType::U16)
//!             .field("b", BaseType::U8),
//!     ),
//! )
//! .unwrap();
//! let ty = table.get("S").unwrap();
//! let s = Instance::from_named(ty, [("a", 0xFF00u16 as i64), ("b", 1)]).unwrap();
//! assert_eq!(s.pack(), vec![0xFF, 0x00, 0x01, 0x00]);
//! ```

pub mod ast;
pub mod cgen;
pub mod codec;
pub mod layout;
pub mod parser;
pub mod primitive;
pub mod validate;
pub mod value;

pub use ast::{
    ByteOrder, CompositeDecl, CompositeKind, CompositeType, Endianness, Field, FieldDecl,
    FieldType, Schema, TypeRef, TypeTable, DEFAULT_PACK,
};
pub use cgen::{c_declaration, c_declaration_text, c_declarations};
pub use codec::{decode, pack, parse as parse_bytes, CodecError};
pub use layout::{BitSlot, DeclarationError, FieldLayout, LayoutInfo};
pub use parser::{parse, parse_file};
pub use primitive::BaseType;
pub use validate::RangeError;
pub use value::{Instance, InstanceError, Value};
