//! Test-only helpers for assembling minimal, valid MIPS32BE objects
//! directly as [`ElfFile`] values, without going through a real
//! compiler or assembler. Used by this module's round-trip tests and by
//! the splicer's end-to-end scenario tests.

use super::{
    ElfFile, ElfHeader, Section, EI_NIDENT, ELFCLASS32, ELFDATA2MSB, EM_MIPS, ET_REL, SHT_NULL,
    SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB,
};
use crate::elf::Symbol;

/// Describes one symbol to seed into the synthetic object's symtab.
/// Locals must be listed before globals: the caller is responsible for
/// ordering, matching the real ELF convention that `sh_info` on the
/// symtab gives the count of leading local entries.
pub struct SymSpec {
    pub name: &'static str,
    pub value: u32,
    pub size: u32,
    pub bind: u8,
    pub typ: u8,
    pub shndx: u16,
}

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;

/// Build a minimal object with `.text` (`text_words` NOPs), `.reginfo`
/// (24 bytes, caller-supplied), and a symtab seeded from `syms`.
/// Section layout is fixed: 0=null, 1=.shstrtab, 2=.text, 3=.reginfo,
/// 4=.strtab, 5=.symtab — callers that need a `.rel.text`/`.rela.text`
/// append it with `ElfFile::add_section` after construction.
pub fn build_object(text_words: usize, reginfo: [u8; 24], syms: &[SymSpec]) -> ElfFile {
    let mut shstrtab = Section::from_parts(
        1,
        ".shstrtab".into(),
        0,
        SHT_STRTAB,
        0,
        0,
        0,
        0,
        1,
        vec![0],
    );
    let shstrtab_off_shstrtab = shstrtab.add_str(".shstrtab");
    let shstrtab_off_text = shstrtab.add_str(".text");
    let shstrtab_off_reginfo = shstrtab.add_str(".reginfo");
    let shstrtab_off_strtab = shstrtab.add_str(".strtab");
    let shstrtab_off_symtab = shstrtab.add_str(".symtab");
    shstrtab.sh_name = 0;

    let text_data = vec![0u8; text_words * 4];
    let text = Section::from_parts(
        2,
        ".text".into(),
        shstrtab_off_text,
        SHT_PROGBITS,
        0x6, // SHF_ALLOC | SHF_EXECINSTR
        0,
        0,
        4,
        0,
        text_data,
    );

    let reginfo_section = Section::from_parts(
        3,
        ".reginfo".into(),
        shstrtab_off_reginfo,
        SHT_PROGBITS,
        0x2,
        0,
        0,
        4,
        24,
        reginfo.to_vec(),
    );

    let mut strtab = Section::from_parts(4, ".strtab".into(), shstrtab_off_strtab, SHT_STRTAB, 0, 0, 0, 0, 1, vec![0]);

    let mut symtab_data = Vec::new();
    // Null symbol.
    symtab_data.extend_from_slice(&Symbol {
        st_name: 0,
        st_value: 0,
        st_size: 0,
        bind: 0,
        typ: 0,
        st_other: 0,
        st_shndx: 0,
        name: String::new(),
        new_index: None,
    }
    .to_bin());
    let mut num_local = 1u32; // includes the null symbol
    for spec in syms {
        let name_off = strtab.add_str(spec.name);
        if spec.bind == STB_LOCAL {
            num_local += 1;
        }
        symtab_data.extend_from_slice(
            &Symbol {
                st_name: name_off,
                st_value: spec.value,
                st_size: spec.size,
                bind: spec.bind,
                typ: spec.typ,
                st_other: 0,
                st_shndx: spec.shndx,
                name: spec.name.to_string(),
                new_index: None,
            }
            .to_bin(),
        );
    }

    let symtab = Section::from_parts(
        5,
        ".symtab".into(),
        shstrtab_off_symtab,
        SHT_SYMTAB,
        0,
        4, // sh_link -> .strtab
        num_local,
        4,
        16,
        symtab_data,
    );

    let null_section = Section::from_parts(0, String::new(), 0, SHT_NULL, 0, 0, 0, 0, 0, Vec::new());

    let mut e_ident = [0u8; EI_NIDENT];
    e_ident[0..4].copy_from_slice(b"\x7fELF");
    e_ident[4] = ELFCLASS32;
    e_ident[5] = ELFDATA2MSB;

    let header = ElfHeader {
        e_ident,
        e_type: ET_REL,
        e_machine: EM_MIPS,
        e_version: 1,
        e_entry: 0,
        e_phoff: 0,
        e_shoff: 1, // placeholder, recomputed by write()
        e_flags: 0x1000,
        e_ehsize: 52,
        e_phentsize: 0,
        e_phnum: 0,
        e_shentsize: 40,
        e_shnum: 6,
        e_shstrndx: 1,
    };

    shstrtab.sh_name = shstrtab_off_shstrtab;

    let mut file = ElfFile {
        header,
        sections: vec![null_section, shstrtab, text, reginfo_section, strtab, symtab],
        symtab_index: 5,
    };

    // Run the same late_init the parser would, so symbols/relocations
    // are populated for callers that inspect them before writing.
    let strtab_data = file.sections[4].data.clone();
    file.sections[5].init_symtab(4, &strtab_data).unwrap();

    file
}

/// Serializes [`build_object`] with a single `tempfun0` placeholder and
/// re-parses it, for tests that just need *a* valid object.
pub fn build_minimal_object() -> Vec<u8> {
    let mut file = build_object(
        2,
        [0, 0, 0, 0x0f, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        &[SymSpec {
            name: "tempfun0",
            value: 0,
            size: 8,
            bind: STB_GLOBAL,
            typ: 0,
            shndx: 2,
        }],
    );
    file.write()
}
