//! Integration tests: declare types, build instances, pack/parse, unions, C output.

use embstruct::{
    c_declaration_text, decode, BaseType, ByteOrder, CodecError, CompositeDecl, DeclarationError,
    Instance, InstanceError, RangeError, Schema, TypeTable, Value,
};
use std::sync::Arc;

fn table(schema: Schema) -> TypeTable {
    TypeTable::resolve(&schema).expect("resolve")
}

fn sl_sb_u() -> TypeTable {
    table(
        Schema::new()
            .with(
                CompositeDecl::structure("SL")
                    .byte_order(ByteOrder::Little)
                    .field("a", BaseType::U16)
                    .field("b", BaseType::U8)
                    .field("c", BaseType::U8),
            )
            .with(
                CompositeDecl::structure("SB")
                    .byte_order(ByteOrder::Big)
                    .field("a", BaseType::U16)
                    .field("b", BaseType::U8)
                    .field("c", BaseType::U8),
            )
            .with(
                CompositeDecl::union("U")
                    .nested("sl", "SL")
                    .field("raw", BaseType::U32),
            ),
    )
}

// ==================== Layout laws ====================

#[test]
fn offset_law() {
    let t = table(
        Schema::new()
            .with(
                CompositeDecl::structure("P1")
                    .pack(1)
                    .field("a", BaseType::U8)
                    .field("b", BaseType::U32),
            )
            .with(
                CompositeDecl::structure("P4")
                    .field("a", BaseType::U8)
                    .field("b", BaseType::U32),
            ),
    );
    let p1 = t.get("P1").unwrap();
    assert_eq!(p1.offset_of("a"), Some(0));
    assert_eq!(p1.offset_of("b"), Some(1));
    assert_eq!(p1.size(), 5);

    let p4 = t.get("P4").unwrap();
    assert_eq!(p4.offset_of("b"), Some(4));
    assert_eq!(p4.size(), 8);

    let inst = Instance::from_positional(p4, [0xAAu32, 0x11223344]).unwrap();
    let bytes = inst.pack();
    assert_eq!(bytes.len(), 8);
    assert_eq!(&bytes[1..4], &[0, 0, 0], "padding is zero");
}

#[test]
fn nested_alignment_capped_by_enclosing_pack() {
    let t = table(
        Schema::new()
            .with(
                CompositeDecl::structure("Inner")
                    .field("x", BaseType::U32)
                    .field("y", BaseType::U8),
            )
            .with(
                CompositeDecl::structure("Packed")
                    .pack(1)
                    .field("tag", BaseType::U8)
                    .nested("inner", "Inner"),
            )
            .with(
                CompositeDecl::structure("Aligned")
                    .field("tag", BaseType::U8)
                    .nested("inner", "Inner"),
            ),
    );
    assert_eq!(t.get("Inner").unwrap().size(), 8);
    let packed = t.get("Packed").unwrap();
    assert_eq!(packed.offset_of("inner"), Some(1));
    assert_eq!(packed.size(), 9);
    let aligned = t.get("Aligned").unwrap();
    assert_eq!(aligned.offset_of("inner"), Some(4));
    assert_eq!(aligned.size(), 12);
}

// ==================== Byte order ====================

#[test]
fn byte_order_law() {
    let t = table(
        Schema::new()
            .with(CompositeDecl::structure("L").byte_order(ByteOrder::Little).field("a", BaseType::U16))
            .with(CompositeDecl::structure("B").byte_order(ByteOrder::Big).field("a", BaseType::U16)),
    );
    let l = Instance::from_named(t.get("L").unwrap(), [("a", 0xFF00)]).unwrap();
    let b = Instance::from_named(t.get("B").unwrap(), [("a", 0xFF00)]).unwrap();
    assert_eq!(l.pack(), vec![0x00, 0xFF]);
    assert_eq!(b.pack(), vec![0xFF, 0x00]);
}

#[test]
fn struct_little_and_big() {
    let t = sl_sb_u();
    let mut sl = Instance::from_named(t.get("SL").unwrap(), [("a", 0xFFAA), ("b", 1), ("c", 2)]).unwrap();
    assert_eq!(sl.get_int("a").unwrap(), 0xFFAA);
    assert_eq!(sl.pack(), b"\xAA\xFF\x01\x02".to_vec());
    assert_eq!(sl.size(), 4);
    sl.set("a", 0x1234).unwrap();
    assert_eq!(sl.get_int("a").unwrap(), 0x1234);

    let sb = Instance::from_named(t.get("SB").unwrap(), [("a", 0xFFAA), ("b", 1), ("c", 2)]).unwrap();
    assert_eq!(sb.pack(), b"\xFF\xAA\x01\x02".to_vec());

    let data = b"\xCC\xBB\x11\x22";
    sl.parse(data).unwrap();
    assert_eq!(sl.get_int("a").unwrap(), 0xBBCC);
    assert_eq!(sl.get_int("b").unwrap(), 0x11);
    assert_eq!(sl.get_int("c").unwrap(), 0x22);
    let mut sb = sb;
    sb.parse(data).unwrap();
    assert_eq!(sb.get_int("a").unwrap(), 0xCCBB);
}

#[test]
fn signed_and_float_fields() {
    let t = table(
        Schema::new().with(
            CompositeDecl::structure("M")
                .byte_order(ByteOrder::Big)
                .field("t", BaseType::I16)
                .field("gain", BaseType::F32)
                .field("big", BaseType::I64),
        ),
    );
    let ty = t.get("M").unwrap();
    let m = Instance::from_positional(ty, [Value::Int(-2), Value::Float(1.0), Value::Int(i64::MIN as i128)]).unwrap();
    let bytes = m.pack();
    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[0..2], &[0xFF, 0xFE]);
    assert_eq!(&bytes[4..8], &[0x3F, 0x80, 0x00, 0x00]);
    assert_eq!(bytes[8], 0x80);
    let back = decode(ty, &bytes).unwrap();
    assert_eq!(back, m);
    assert_eq!(back.get_float("gain").unwrap(), 1.0);
}

#[test]
fn f32_field_keeps_single_precision() {
    let t = table(Schema::new().with(CompositeDecl::structure("F").field("x", BaseType::F32)));
    let ty = t.get("F").unwrap();
    let mut a = Instance::new(ty);
    a.set("x", 0.1f64).unwrap();
    assert_eq!(a.get_float("x").unwrap(), 0.1f32 as f64);

    let mut b = Instance::new(ty);
    b.parse(&a.pack()).unwrap();
    assert_eq!(a.get("x").unwrap(), b.get("x").unwrap());
    assert_eq!(a, b);

    a.set("x", 16_777_217).unwrap();
    assert_eq!(a.get_float("x").unwrap(), 16_777_216.0);
}

// ==================== Bitfields ====================

#[test]
fn bitfield_law() {
    let t = table(
        Schema::new().with(
            CompositeDecl::structure("B")
                .byte_order(ByteOrder::Little)
                .bitfield("a", BaseType::U8, 3)
                .bitfield("b", BaseType::U8, 5),
        ),
    );
    let ty = t.get("B").unwrap();
    let mut inst = Instance::new(ty);
    inst.parse(&[0xAA]).unwrap();
    assert_eq!(inst.get_int("a").unwrap(), (0xAA & 0b111) as i128);
    assert_eq!(inst.get_int("b").unwrap(), ((0xAA >> 3) & 0b11111) as i128);
    assert_eq!(inst.pack(), vec![0xAA]);
}

#[test]
fn bitfield_two_six() {
    let t = table(
        Schema::new().with(
            CompositeDecl::structure("S")
                .byte_order(ByteOrder::Little)
                .bitfield("a", BaseType::U8, 2)
                .bitfield("b", BaseType::U8, 6),
        ),
    );
    let ty = t.get("S").unwrap();
    let s = Instance::from_named(ty, [("a", 3), ("b", 63)]).unwrap();
    assert_eq!(s.pack(), vec![0xFF]);
    let mut s = Instance::from_named(ty, [("a", 1), ("b", 4)]).unwrap();
    assert_eq!(s.pack(), vec![0x11]);
    s.parse(&[0xFF]).unwrap();
    assert_eq!((s.get_int("a").unwrap(), s.get_int("b").unwrap()), (3, 63));
    s.parse(&[0x81]).unwrap();
    assert_eq!((s.get_int("a").unwrap(), s.get_int("b").unwrap()), (1, 32));
    assert!(matches!(s.set("a", 4), Err(InstanceError::Range(RangeError::Int { max: 3, .. }))));
}

#[test]
fn bitfield_big_endian_msb_first() {
    let t = table(
        Schema::new().with(
            CompositeDecl::structure("B")
                .byte_order(ByteOrder::Big)
                .bitfield("a", BaseType::U16, 4)
                .bitfield("b", BaseType::U16, 12)
                .field("c", BaseType::U8),
        ),
    );
    let ty = t.get("B").unwrap();
    let inst = Instance::from_named(ty, [("a", 0xA), ("b", 0x123), ("c", 7)]).unwrap();
    assert_eq!(inst.pack(), vec![0xA1, 0x23, 0x07, 0x00]);
    let back = decode(ty, &inst.pack()).unwrap();
    assert_eq!(back.get_int("b").unwrap(), 0x123);
}

#[test]
fn signed_base_bitfield_is_unsigned_domain() {
    let t = table(
        Schema::new().with(
            CompositeDecl::structure("S")
                .byte_order(ByteOrder::Little)
                .bitfield("lo", BaseType::I8, 4)
                .bitfield("hi", BaseType::I8, 4),
        ),
    );
    let ty = t.get("S").unwrap();
    let mut s = Instance::new(ty);
    assert!(s.set("lo", -1).is_err());
    s.set("hi", 15).unwrap();
    assert_eq!(s.pack(), vec![0xF0]);
}

// ==================== Range validation ====================

#[test]
fn range_rejection() {
    let t = table(Schema::new().with(CompositeDecl::structure("S").field("x", BaseType::U8)));
    let ty = t.get("S").unwrap();
    let mut s = Instance::new(ty);
    let err = s.set("x", 256).unwrap_err();
    match &err {
        InstanceError::Range(RangeError::Int { value, min, max, field, composite }) => {
            assert_eq!((*value, *min, *max), (256, 0, 255));
            assert_eq!(field, "x");
            assert_eq!(composite, "S");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().contains("256"));
    assert!(err.to_string().contains("[0,255]"));
    assert_eq!(s.get_int("x").unwrap(), 0, "failed set leaves value unchanged");

    assert!(Instance::from_positional(ty, [300]).is_err());
}

#[test]
fn type_mismatches_and_unknown_fields() {
    let t = table(
        Schema::new()
            .with(CompositeDecl::structure("Inner").field("a", BaseType::U8))
            .with(CompositeDecl::structure("Other").field("a", BaseType::U8))
            .with(
                CompositeDecl::structure("Outer")
                    .nested("inner", "Inner")
                    .field("n", BaseType::U16),
            ),
    );
    let mut outer = Instance::new(t.get("Outer").unwrap());
    assert!(matches!(outer.set("n", 1.5), Err(InstanceError::TypeMismatch { .. })));
    assert!(matches!(outer.set("inner", 3), Err(InstanceError::TypeMismatch { .. })));
    let other = Instance::new(t.get("Other").unwrap());
    assert!(matches!(outer.set("inner", other), Err(InstanceError::TypeMismatch { .. })));
    assert!(matches!(outer.set("missing", 1), Err(InstanceError::UnknownField { .. })));
    assert!(matches!(outer.get("missing"), Err(InstanceError::UnknownField { .. })));
}

#[test]
fn construction_arity() {
    let t = sl_sb_u();
    let sl = t.get("SL").unwrap();
    assert!(matches!(
        Instance::from_positional(sl, [1, 2]),
        Err(InstanceError::Arity { expected: 3, actual: 2, .. })
    ));
    assert!(matches!(
        Instance::from_named(sl, [("a", 1), ("b", 2)]),
        Err(InstanceError::MissingField { .. })
    ));
    assert_eq!(
        Instance::from_named(sl, [("a", 1), ("b", 2), ("c", 3), ("a", 4)]),
        Err(InstanceError::DuplicateValue {
            composite: "SL".to_string(),
            field: "a".to_string(),
        })
    );
}

// ==================== Nested composites ====================

#[test]
fn nested_struct_pack_parse() {
    let t = table(
        Schema::new()
            .with(CompositeDecl::structure("Inner").field("a", BaseType::U8).field("b", BaseType::U8))
            .with(
                CompositeDecl::structure("Outer")
                    .nested("first", "Inner")
                    .field("second", BaseType::U8),
            ),
    );
    let inner_ty = t.get("Inner").unwrap();
    let outer_ty = t.get("Outer").unwrap();
    let inner = Instance::from_named(inner_ty, [("a", 1), ("b", 2)]).unwrap();
    let mut outer = Instance::from_named(outer_ty, [("first", Value::from(inner)), ("second", Value::from(3))]).unwrap();
    assert_eq!(outer.pack(), vec![1, 2, 3]);
    assert_eq!(outer.size(), 3);

    outer.parse(&[0x11, 0x22, 0x33]).unwrap();
    assert_eq!(outer.get_path("first.a").unwrap(), Value::Int(0x11));
    assert_eq!(outer.get_path("first.b").unwrap(), Value::Int(0x22));
    assert_eq!(outer.get_int("second").unwrap(), 0x33);

    outer.set_path("first.b", 0x7F).unwrap();
    assert_eq!(outer.pack(), vec![0x11, 0x7F, 0x33]);
    assert!(outer.set("second", 0x1234).is_err());
    assert!(outer.set_path("first.b", 0x100).is_err());
}

#[test]
fn nested_keeps_its_own_byte_order() {
    let t = table(
        Schema::new()
            .with(CompositeDecl::structure("BigInner").byte_order(ByteOrder::Big).field("v", BaseType::U16))
            .with(
                CompositeDecl::structure("LittleOuter")
                    .byte_order(ByteOrder::Little)
                    .field("w", BaseType::U16)
                    .nested("inner", "BigInner"),
            ),
    );
    let mut outer = Instance::new(t.get("LittleOuter").unwrap());
    outer.set("w", 0x0102).unwrap();
    outer.set_path("inner.v", 0x0304).unwrap();
    assert_eq!(outer.pack(), vec![0x02, 0x01, 0x03, 0x04]);
}

// ==================== Unions ====================

#[test]
fn union_aliasing() {
    let t = sl_sb_u();
    let u_ty = t.get("U").unwrap();
    assert_eq!(u_ty.size(), 4);
    let sl = Instance::from_named(t.get("SL").unwrap(), [("a", 0xFFAA), ("b", 1), ("c", 2)]).unwrap();
    let sl_bytes = sl.pack();
    let u = Instance::from_named(u_ty, [("sl", sl.clone())]).unwrap();
    let expected = u32::from_ne_bytes([sl_bytes[0], sl_bytes[1], sl_bytes[2], sl_bytes[3]]);
    assert_eq!(u.get_int("raw").unwrap(), expected as i128);
    if cfg!(target_endian = "little") {
        assert_eq!(u.get_int("raw").unwrap(), 0x0201FFAA);
    }
    assert_eq!(u.get_composite("sl").unwrap(), sl);
    assert_eq!(u.pack(), sl_bytes);
    assert_eq!(u.size(), 4);
}

#[test]
fn union_parse_and_write_other_member() {
    let t = sl_sb_u();
    let mut u = Instance::new(t.get("U").unwrap());
    u.parse(b"\x87\x65\x43\x21").unwrap();
    assert_eq!(u.get_path("sl.a").unwrap(), Value::Int(0x6587));
    assert_eq!(u.get_path("sl.b").unwrap(), Value::Int(0x43));
    assert_eq!(u.get_path("sl.c").unwrap(), Value::Int(0x21));

    u.set("raw", 0x0A0B0C0Du32).unwrap();
    assert_eq!(u.pack(), 0x0A0B0C0Du32.to_ne_bytes().to_vec());
    u.set_path("sl.c", 0xEE).unwrap();
    assert_eq!(u.pack()[3], 0xEE);
}

#[test]
fn union_size_is_largest_member() {
    let t = table(
        Schema::new()
            .with(
                CompositeDecl::structure("Outer")
                    .pack(1)
                    .field("a", BaseType::U8)
                    .field("b", BaseType::U32)
                    .field("c", BaseType::U8),
            )
            .with(
                CompositeDecl::union("W")
                    .field("as_int", BaseType::U32)
                    .nested("as_struct", "Outer"),
            ),
    );
    let w = t.get("W").unwrap();
    assert_eq!(w.size(), 6);
    assert_eq!(w.offset_of("as_struct"), Some(0));
    let inst = Instance::new(w);
    assert_eq!(inst.pack().len(), 6);
}

#[test]
fn union_byte_order_is_forced_native() {
    let non_native = if cfg!(target_endian = "little") { ByteOrder::Big } else { ByteOrder::Little };
    let t = table(
        Schema::new().with(
            CompositeDecl::union("U")
                .byte_order(non_native)
                .field("x", BaseType::U16),
        ),
    );
    let u = t.get("U").unwrap();
    assert_eq!(u.byte_order(), ByteOrder::Native);
    let inst = Instance::from_named(u, [("x", 0x1234)]).unwrap();
    assert_eq!(inst.pack(), 0x1234u16.to_ne_bytes().to_vec());
}

#[test]
fn union_members_must_share_byte_order() {
    let err = TypeTable::resolve(
        &Schema::new()
            .with(CompositeDecl::structure("L").byte_order(ByteOrder::Little).field("a", BaseType::U8))
            .with(CompositeDecl::structure("B").byte_order(ByteOrder::Big).field("a", BaseType::U8))
            .with(CompositeDecl::union("U").nested("l", "L").nested("b", "B")),
    )
    .unwrap_err();
    assert!(matches!(err, DeclarationError::MixedUnionByteOrder { .. }));
}

// ==================== Codec properties ====================

#[test]
fn parse_short_input_fails() {
    let t = sl_sb_u();
    let mut sl = Instance::new(t.get("SL").unwrap());
    let err = sl.parse(&[1, 2, 3]).unwrap_err();
    assert_eq!(
        err,
        CodecError::ShortInput {
            composite: "SL".to_string(),
            expected: 4,
            actual: 3
        }
    );
}

#[test]
fn failed_parse_leaves_instance_unchanged() {
    let t = sl_sb_u();
    let mut sl = Instance::from_named(t.get("SL").unwrap(), [("a", 0xFFAA), ("b", 1), ("c", 2)]).unwrap();
    let before = sl.pack();
    assert!(sl.parse(&[9, 9, 9]).is_err());
    assert_eq!(sl.pack(), before);
    assert_eq!(sl.get_int("a").unwrap(), 0xFFAA);
    assert_eq!(sl.get_int("b").unwrap(), 1);
    assert_eq!(sl.get_int("c").unwrap(), 2);

    let mut u = Instance::new(t.get("U").unwrap());
    u.set("raw", 0x0201FFAA).unwrap();
    let before = u.pack();
    assert!(u.parse(&[0, 0]).is_err());
    assert_eq!(u.pack(), before);
    assert_eq!(u.get_int("raw").unwrap(), 0x0201FFAA);
}

#[test]
fn failed_parse_leaves_nested_instance_unchanged() {
    let t = table(
        Schema::new()
            .with(
                CompositeDecl::structure("Inner")
                    .byte_order(ByteOrder::Big)
                    .field("id", BaseType::U16)
                    .bitfield("lo", BaseType::U8, 4)
                    .bitfield("hi", BaseType::U8, 4),
            )
            .with(
                CompositeDecl::structure("Outer")
                    .nested("inner", "Inner")
                    .field("count", BaseType::U32),
            ),
    );
    let mut outer = Instance::new(t.get("Outer").unwrap());
    outer.set_path("inner.id", 0x1234).unwrap();
    outer.set_path("inner.lo", 5).unwrap();
    outer.set_path("inner.hi", 0xA).unwrap();
    outer.set("count", 77).unwrap();
    let before = outer.pack();
    assert_eq!(before.len(), 8);

    // Long enough for the nested struct, too short for the whole image.
    assert!(matches!(
        outer.parse(&[0xFF; 6]),
        Err(CodecError::ShortInput { expected: 8, actual: 6, .. })
    ));
    assert_eq!(outer.pack(), before);
    assert_eq!(outer.get_path("inner.id").unwrap(), Value::Int(0x1234));
    assert_eq!(outer.get_path("inner.lo").unwrap(), Value::Int(5));
    assert_eq!(outer.get_path("inner.hi").unwrap(), Value::Int(0xA));
    assert_eq!(outer.get_int("count").unwrap(), 77);
}

#[test]
fn parse_ignores_trailing_bytes() {
    let t = sl_sb_u();
    let mut sl = Instance::new(t.get("SL").unwrap());
    sl.parse(&[1, 0, 2, 3, 0xFF, 0xFF]).unwrap();
    assert_eq!(sl.get_int("a").unwrap(), 1);
    assert_eq!(sl.get_int("c").unwrap(), 3);
}

#[test]
fn round_trip_idempotence_and_size() {
    let t = table(
        Schema::new()
            .with(
                CompositeDecl::structure("Hdr")
                    .byte_order(ByteOrder::Big)
                    .field("id", BaseType::U16)
                    .bitfield("ver", BaseType::U8, 3)
                    .bitfield("kind", BaseType::U8, 5)
                    .field("len", BaseType::U32),
            )
            .with(
                CompositeDecl::structure("Packet")
                    .pack(2)
                    .byte_order(ByteOrder::Little)
                    .field("seq", BaseType::I32)
                    .nested("hdr", "Hdr")
                    .field("crc", BaseType::U16)
                    .field("scale", BaseType::F64),
            ),
    );
    let ty = t.get("Packet").unwrap();
    let mut p = Instance::new(ty);
    p.set("seq", -123456).unwrap();
    p.set_path("hdr.id", 0xBEEF).unwrap();
    p.set_path("hdr.ver", 5).unwrap();
    p.set_path("hdr.kind", 17).unwrap();
    p.set_path("hdr.len", 0xDEADBEEFu32).unwrap();
    p.set("crc", 0xFFFF).unwrap();
    p.set("scale", -0.25).unwrap();

    let first = p.pack();
    assert_eq!(first, p.pack());
    assert_eq!(first.len(), ty.size());

    let mut fresh = Instance::new(ty);
    fresh.parse(&first).unwrap();
    assert_eq!(fresh, p);
    assert_eq!(fresh.get_path("hdr.kind").unwrap(), Value::Int(17));
}

#[test]
fn empty_struct_packs_to_nothing() {
    let t = table(Schema::new().with(CompositeDecl::structure("E")));
    let e = Instance::new(t.get("E").unwrap());
    assert!(e.pack().is_empty());
    let mut e2 = e.clone();
    e2.parse(&[]).unwrap();
    assert_eq!(e, e2);
}

// ==================== Declarations ====================

#[test]
fn declaration_errors() {
    let dup_type = TypeTable::resolve(
        &Schema::new()
            .with(CompositeDecl::structure("A"))
            .with(CompositeDecl::union("A")),
    );
    assert_eq!(dup_type.unwrap_err(), DeclarationError::DuplicateType("A".to_string()));

    let unknown = TypeTable::resolve(&Schema::new().with(CompositeDecl::structure("A").nested("x", "Later")));
    assert!(matches!(unknown, Err(DeclarationError::UnknownType { .. })));

    let nested_bits = TypeTable::resolve(
        &Schema::new()
            .with(CompositeDecl::structure("I"))
            .with(CompositeDecl::structure("A").bitfield("x", BaseType::U8, 1).nested("i", "I")),
    );
    assert!(nested_bits.is_ok());
}

#[test]
fn types_are_shareable_across_threads() {
    let t = Arc::new(sl_sb_u());
    std::thread::scope(|s| {
        for i in 0..4u8 {
            let t = Arc::clone(&t);
            s.spawn(move || {
                let ty = t.get("SB").unwrap();
                let inst = Instance::from_positional(ty, [0x0100 + i as u16, i as u16, 0]).unwrap();
                assert_eq!(inst.pack(), vec![0x01, i, i, 0]);
            });
        }
    });
}

// ==================== C declarations ====================

#[test]
fn c_declaration_matches_fields() {
    let t = sl_sb_u();
    assert_eq!(
        c_declaration_text(t.get("U").unwrap()),
        "typedef struct _tag_SL {\n    unsigned short a;\n    unsigned char b;\n    unsigned char c;\n} SL;\n\
         typedef union _tag_U {\n    SL sl;\n    unsigned int raw;\n} U;\n"
    );
}
