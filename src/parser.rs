//! Parse schema source into declarations using PEST.

use crate::ast::*;
use crate::primitive::BaseType;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::path::Path;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// Parse schema source into declarations. Semantic checks happen in [`TypeTable::resolve`].
pub fn parse(source: &str) -> Result<Schema, String> {
    let pairs = SchemaParser::parse(Rule::schema, source)
        .map_err(|e| format!("Parse error: {}", e))?;
    let pair = pairs.into_iter().next().ok_or("Empty parse")?;
    build_schema(pair)
}

/// Read and parse a schema file.
pub fn parse_file(path: &Path) -> Result<Schema, String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    parse(&source).map_err(|e| format!("{}: {}", path.display(), e))
}

fn build_schema(pair: pest::iterators::Pair<Rule>) -> Result<Schema, String> {
    let mut schema = Schema::new();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::composite_section {
            schema.push(build_composite(inner)?);
        }
    }
    Ok(schema)
}

fn build_composite(pair: pest::iterators::Pair<Rule>) -> Result<CompositeDecl, String> {
    let mut inner = pair.into_inner();
    let kind = match inner.next().ok_or("composite: missing kind")?.as_str() {
        "struct" => CompositeKind::Struct,
        "union" => CompositeKind::Union,
        other => return Err(format!("Unknown composite kind: {}", other)),
    };
    let name = inner.next().ok_or("composite: missing name")?.as_str().to_string();
    let mut decl = CompositeDecl::new(name, kind);
    for part in inner {
        match part.as_rule() {
            Rule::options => apply_options(&mut decl, part)?,
            Rule::field => decl.fields.push(build_field(part)?),
            _ => {}
        }
    }
    Ok(decl)
}

fn apply_options(decl: &mut CompositeDecl, pair: pest::iterators::Pair<Rule>) -> Result<(), String> {
    let mut have_pack = false;
    let mut have_endian = false;
    for opt in pair.into_inner() {
        match opt.as_rule() {
            Rule::pack_option => {
                if have_pack {
                    return Err(format!("{}: pack given more than once", decl.name));
                }
                have_pack = true;
                let lit = opt.into_inner().next().ok_or("pack: missing value")?;
                decl.pack = lit
                    .as_str()
                    .parse()
                    .map_err(|_| format!("{}: invalid pack value {}", decl.name, lit.as_str()))?;
            }
            Rule::endian_option => {
                if have_endian {
                    return Err(format!("{}: endian given more than once", decl.name));
                }
                have_endian = true;
                let lit = opt.into_inner().next().ok_or("endian: missing value")?;
                decl.byte_order = parse_byte_order(lit.as_str())?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn build_field(pair: pest::iterators::Pair<Rule>) -> Result<FieldDecl, String> {
    let mut inner = pair.into_inner();
    let name = inner.next().ok_or("field: missing name")?.as_str().to_string();
    let type_name = inner.next().ok_or("field: missing type")?.as_str();
    let type_ref = match BaseType::from_short_name(type_name) {
        Some(b) => TypeRef::Base(b),
        None => TypeRef::Named(type_name.to_string()),
    };
    let bit_width = match inner.next() {
        Some(bw) if bw.as_rule() == Rule::bit_width => {
            let lit = bw.into_inner().next().ok_or("bit width: missing value")?;
            Some(
                lit.as_str()
                    .parse::<u32>()
                    .map_err(|_| format!("field {}: invalid bit width {}", name, lit.as_str()))?,
            )
        }
        _ => None,
    };
    Ok(FieldDecl {
        name,
        type_ref,
        bit_width,
    })
}

fn parse_byte_order(s: &str) -> Result<ByteOrder, String> {
    match s {
        "little" => Ok(ByteOrder::Little),
        "big" => Ok(ByteOrder::Big),
        "native" => Ok(ByteOrder::Native),
        _ => Err(format!("Unknown byte order: {}", s)),
    }
}
