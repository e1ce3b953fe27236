//! C declaration output: `typedef struct/union` text for resolved composites.
//!
//! Field order and bit widths are reproduced exactly. Byte offsets only match a C
//! compiler whose packing equals the declared one (emit `#pragma pack` yourself if needed).

use crate::ast::{CompositeType, FieldType, TypeTable};
use std::collections::HashSet;

/// Lines declaring `ty`, preceded by every composite it depends on (each once).
pub fn c_declaration(ty: &CompositeType) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    emit(ty, &mut seen, &mut out);
    out
}

/// [`c_declaration`] joined into one newline-terminated string.
pub fn c_declaration_text(ty: &CompositeType) -> String {
    join(c_declaration(ty))
}

/// All types of a table in declaration order, dependencies first, no repeats.
pub fn c_declarations(table: &TypeTable) -> String {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for ty in table.iter() {
        emit(ty, &mut seen, &mut out);
    }
    join(out)
}

fn join(lines: Vec<String>) -> String {
    let mut s = lines.join("\n");
    if !s.is_empty() {
        s.push('\n');
    }
    s
}

fn emit(ty: &CompositeType, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    if seen.contains(ty.name()) {
        return;
    }
    for nested in ty.nested_types() {
        emit(nested, seen, out);
    }
    seen.insert(ty.name().to_string());

    out.push(format!("typedef {} _tag_{} {{", ty.kind().keyword(), ty.name()));
    for f in ty.fields() {
        let c_type = match &f.ty {
            FieldType::Base(b) => b.c_name(),
            FieldType::Composite(c) => c.name(),
        };
        match f.bit_width {
            Some(w) => out.push(format!("    {} {} : {};", c_type, f.name, w)),
            None => out.push(format!("    {} {};", c_type, f.name)),
        }
    }
    out.push(format!("}} {};", ty.name()));
}
