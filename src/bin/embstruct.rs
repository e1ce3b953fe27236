//! Inspect schema files: C declarations, layouts, and pack/parse from the shell.
//!
//! Usage:
//!   embstruct cdecl  SCHEMA [TYPE]
//!   embstruct layout SCHEMA TYPE
//!   embstruct parse  SCHEMA TYPE HEX
//!   embstruct pack   SCHEMA TYPE [field=value ...]
//!
//! `field` may be a dotted path into nested composites (`header.flags=3`). Values are
//! decimal, `0x` hex, or floating point. Set `RUST_LOG=debug` to see layout decisions.

use anyhow::{anyhow, bail, Context};
use embstruct::{
    c_declaration_text, c_declarations, decode, parse_file, FieldType, Instance, TypeTable,
    Value,
};
use std::path::Path;
use std::sync::Arc;

fn usage() -> ! {
    eprintln!("usage: embstruct <cdecl|layout|parse|pack> SCHEMA [TYPE] [ARGS...]");
    std::process::exit(2);
}

fn load(path: &str) -> anyhow::Result<TypeTable> {
    let schema = parse_file(Path::new(path)).map_err(|e| anyhow!(e))?;
    TypeTable::resolve(&schema).with_context(|| format!("{}: invalid declaration", path))
}

fn lookup<'a>(table: &'a TypeTable, name: &str) -> anyhow::Result<&'a Arc<embstruct::CompositeType>> {
    table
        .get(name)
        .ok_or_else(|| anyhow!("unknown type {}", name))
}

fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let hex: String = s
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if !hex.is_ascii() {
        bail!("hex input must be ASCII");
    }
    if hex.len() % 2 != 0 {
        bail!("hex input must have an even number of digits");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).with_context(|| format!("invalid hex at {}", i)))
        .collect()
}

fn parse_value(s: &str) -> anyhow::Result<Value> {
    let s = s.trim();
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        let v = i128::from_str_radix(hex, 16).with_context(|| format!("invalid hex value {}", s))?;
        return Ok(Value::Int(if neg { -v } else { v }));
    }
    if let Ok(v) = s.parse::<i128>() {
        return Ok(Value::Int(v));
    }
    s.parse::<f64>()
        .map(Value::Float)
        .with_context(|| format!("invalid value {}", s))
}

fn print_instance(inst: &Instance, prefix: &str) -> anyhow::Result<()> {
    for f in inst.type_def().fields() {
        let path = format!("{}{}", prefix, f.name);
        match inst.get(&f.name)? {
            Value::Composite(nested) => print_instance(&nested, &format!("{}.", path))?,
            Value::Int(v) => println!("{} = {} (0x{:X})", path, v, v),
            Value::Float(v) => println!("{} = {}", path, v),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        usage();
    }
    let table = load(&args[1])?;

    match args[0].as_str() {
        "cdecl" => match args.get(2) {
            Some(name) => print!("{}", c_declaration_text(lookup(&table, name)?)),
            None => print!("{}", c_declarations(&table)),
        },
        "layout" => {
            let ty = lookup(&table, args.get(2).map(String::as_str).unwrap_or_else(|| usage()))?;
            println!(
                "{} {}: size={} align={} pack={} order={:?}",
                ty.kind().keyword(),
                ty.name(),
                ty.size(),
                ty.alignment(),
                ty.pack(),
                ty.endianness()
            );
            for (f, l) in ty.fields().iter().zip(&ty.layout().fields) {
                let ty_name = match &f.ty {
                    FieldType::Base(b) => b.short_name().to_string(),
                    FieldType::Composite(c) => c.name().to_string(),
                };
                match l.bits {
                    Some(bits) => println!(
                        "  {:>4}  {:<16} {} bits {}..{}",
                        l.offset,
                        f.name,
                        ty_name,
                        bits.bit_offset,
                        bits.bit_offset + bits.bit_width
                    ),
                    None => println!("  {:>4}  {:<16} {} ({} bytes)", l.offset, f.name, ty_name, l.size),
                }
            }
        }
        "parse" => {
            if args.len() < 4 {
                usage();
            }
            let ty = lookup(&table, &args[2])?;
            let bytes = parse_hex(&args[3])?;
            let inst = decode(ty, &bytes)?;
            print_instance(&inst, "")?;
        }
        "pack" => {
            let ty = lookup(&table, args.get(2).map(String::as_str).unwrap_or_else(|| usage()))?;
            let mut inst = Instance::new(ty);
            for assignment in &args[3..] {
                let (path, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected field=value, got {}", assignment))?;
                inst.set_path(path.trim(), parse_value(value)?)?;
            }
            let hex: Vec<String> = inst.pack().iter().map(|b| format!("{:02X}", b)).collect();
            println!("{}", hex.join(" "));
        }
        _ => usage(),
    }
    Ok(())
}
