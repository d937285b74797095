//! Cross-checks the writer against the independent `elf` crate, the same
//! way the teacher crate validates its own `Builder` output: build an
//! object in-process, write it, then re-open the bytes through a second
//! implementation and compare.

use std::io::{Cursor, Seek, SeekFrom};

use crate::elf::testutil::{build_object, SymSpec, STB_GLOBAL};

#[test]
fn written_object_is_readable_by_an_independent_elf_parser() {
    let mut file = build_object(
        2,
        [0; 24],
        &[SymSpec {
            name: "my_symbol",
            value: 0,
            size: 8,
            bind: STB_GLOBAL,
            typ: 0,
            shndx: 2,
        }],
    );
    let bytes = file.write();

    let mut cursor = Cursor::new(bytes);
    cursor.seek(SeekFrom::Start(0)).unwrap();
    let ef = elf::File::open_stream(&mut cursor).unwrap();

    assert_eq!(ef.ehdr.class, elf::types::ELFCLASS32);
    assert_eq!(ef.ehdr.data, elf::types::ELFDATA2MSB);
    assert_eq!(ef.ehdr.elftype, elf::types::ET_REL);
    assert_eq!(ef.ehdr.machine, elf::types::EM_MIPS);
    assert_eq!(ef.phdrs.len(), 0, "no program headers");
    assert_eq!(ef.sections.len(), 6, "null, shstrtab, text, reginfo, strtab, symtab");

    let symtab = ef.get_section(".symtab").expect(".symtab section");
    let syms = ef.get_symbols(symtab).expect("parseable symbol table");
    assert!(syms.iter().any(|s| s.name == "my_symbol"));
}

#[test]
fn splice_output_round_trips_through_an_independent_elf_parser() {
    use crate::splice::splice_parsed;
    use std::collections::HashSet;

    let mut target = build_object(
        2,
        [0; 24],
        &[SymSpec {
            name: "tempfun0",
            value: 0,
            size: 8,
            bind: STB_GLOBAL,
            typ: 0,
            shndx: 2,
        }],
    );
    let source = build_object(2, [0; 24], &[]);

    let mut temp_names = HashSet::new();
    temp_names.insert("tempfun0".to_string());
    let fn_names = HashSet::new();
    let to_copy = vec![(0u32, 2u32)];

    splice_parsed(&mut target, &source, &to_copy, &temp_names, &fn_names).unwrap();
    let bytes = target.write();

    let mut cursor = Cursor::new(bytes);
    cursor.seek(SeekFrom::Start(0)).unwrap();
    let ef = elf::File::open_stream(&mut cursor).unwrap();
    assert_eq!(ef.ehdr.elftype, elf::types::ET_REL);
    let symtab = ef.get_section(".symtab").expect(".symtab section");
    let syms = ef.get_symbols(symtab).expect("parseable symbol table");
    assert!(
        syms.iter().all(|s| s.name != "tempfun0"),
        "placeholder symbol must not survive splicing"
    );
}

