//! Schema fuzz target: feed arbitrary bytes to the schema parser, resolve what parses,
//! and parse the input bytes as every resolved type.
//! Nothing may panic. Build with: cargo fuzz run schema_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    let schema = match embstruct::parse(s) {
        Ok(schema) => schema,
        Err(_) => return,
    };
    if let Ok(table) = embstruct::TypeTable::resolve(&schema) {
        for ty in table.iter() {
            if let Ok(inst) = embstruct::decode(ty, data) {
                assert_eq!(inst.pack().len(), ty.size());
            }
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run schema_fuzz");
}
