//! Splices hand-assembled MIPS code into the object a non-cooperative C
//! compiler produced for a source file full of `tempfunN` placeholders.
//!
//! This is the one part of the crate that shells out to an external
//! process (the assembler) and touches the filesystem beyond the two
//! object files it's handed. Everything else here is pure in-memory
//! mutation of two [`ElfFile`] values.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::elf::{ElfFile, Symbol, SHN_UNDEF, SHT_REL, STT_FUNC};
use crate::error::{Error, Result};

/// One `GLOBAL_ASM` block recovered from a C source file: the symbol
/// name the hand-written assembly actually defines, the placeholder
/// name the compiler saw in its stead, the (comment-stripped) body
/// lines, and the number of real instruction lines in that body.
#[derive(Clone, Debug)]
pub struct SplicedFunction {
    pub fn_name: String,
    pub temp_fn_name: String,
    pub body_lines: Vec<String>,
    pub num_instr: usize,
}

/// Assembles `functions` against the placeholders already present in
/// `objfile_path`, then splices the result back into that file in
/// place. `functions` must be in the same order the placeholders
/// appeared in the original C source.
pub fn splice_object(
    objfile_path: &Path,
    functions: &[SplicedFunction],
    asm_prelude: Option<&[u8]>,
    assembler: &str,
) -> Result<()> {
    let data = fs::read(objfile_path)?;
    let mut target = ElfFile::parse(&data)?;

    let (asm_text, to_copy, temp_names, fn_names) = build_assembly(&target, functions)?;

    let mut s_file = tempfile::Builder::new().prefix("mipsobj").suffix(".s").tempfile()?;
    if let Some(prelude) = asm_prelude {
        s_file.write_all(prelude)?;
    }
    s_file.write_all(b".section .text, \"ax\"\n\n")?;
    s_file.write_all(asm_text.as_bytes())?;
    s_file.flush()?;

    let o_file = tempfile::Builder::new().prefix("mipsobj").suffix(".o").tempfile()?;

    run_assembler(assembler, s_file.path(), o_file.path())?;
    let asm_bytes = fs::read(o_file.path())?;
    let source = ElfFile::parse(&asm_bytes)?;

    splice_parsed(&mut target, &source, &to_copy, &temp_names, &fn_names)?;

    let out = target.write();
    fs::write(objfile_path, out)?;
    Ok(())
}

/// Steps 1–2: locate each placeholder's word offset, pad with `nop`s so
/// every spliced function lands at the same address in the generated
/// `.text` as it will in the compiler's `.text`, and append the
/// function's body. Returns the generated assembly source, the
/// `(word_offset, word_count)` copy plan, and the sets of placeholder
/// and real function names.
fn build_assembly(
    target: &ElfFile,
    functions: &[SplicedFunction],
) -> Result<(String, Vec<(u32, u32)>, HashSet<String>, HashSet<String>)> {
    let mut prev_loc: u32 = 0;
    let mut to_copy = Vec::with_capacity(functions.len());
    let mut asm = String::new();
    let mut temp_names = HashSet::new();
    let mut fn_names = HashSet::new();

    for f in functions {
        let (_, value) = target
            .find_symbol(&f.temp_fn_name)
            .ok_or_else(|| Error::SymbolNotFound(f.temp_fn_name.clone()))?;
        if value % 4 != 0 {
            return Err(Error::Misaligned(format!(
                "placeholder `{}` has value {:#x}, which is not word-aligned",
                f.temp_fn_name, value
            )));
        }
        let loc = value / 4;
        if loc < prev_loc {
            return Err(Error::Misaligned(format!(
                "placeholder `{}` at word {} appears before a previous placeholder at word {}",
                f.temp_fn_name, loc, prev_loc
            )));
        }
        log::debug!(
            "placeholder `{}` for `{}` located at word {}",
            f.temp_fn_name, f.fn_name, loc
        );
        for _ in 0..(loc - prev_loc) {
            asm.push_str("nop\n");
        }
        for line in &f.body_lines {
            asm.push_str(line);
            asm.push('\n');
        }
        prev_loc = loc + f.num_instr as u32;
        to_copy.push((loc, f.num_instr as u32));
        temp_names.insert(f.temp_fn_name.clone());
        fn_names.insert(f.fn_name.clone());
    }

    log::debug!(
        "assembly generated: {} function(s), {} bytes of source",
        functions.len(),
        asm.len()
    );
    Ok((asm, to_copy, temp_names, fn_names))
}

/// Steps 4–8: merge `.reginfo`, splice `.text`, merge the symbol tables
/// and remap every relocation that's affected. Does not touch the
/// filesystem; exposed separately from [`splice_object`] so it can be
/// exercised against synthetic objects in tests.
pub(crate) fn splice_parsed(
    target: &mut ElfFile,
    source: &ElfFile,
    to_copy: &[(u32, u32)],
    temp_names: &HashSet<String>,
    fn_names: &HashSet<String>,
) -> Result<()> {
    merge_reginfo(target, source)?;
    splice_text(target, source, to_copy)?;

    let target_text_idx = target
        .find_section(".text")
        .ok_or_else(|| Error::Malformed("target object has no .text section".into()))?
        .index;
    let source_text_idx = source
        .find_section(".text")
        .ok_or_else(|| Error::Malformed("assembled object has no .text section".into()))?
        .index;

    let (target_old_to_new, source_old_to_new, num_local_syms_source) =
        merge_symbols(target, source, temp_names, fn_names, target_text_idx, source_text_idx)?;

    remap_target_relocations(target, target_text_idx, &target_old_to_new)?;
    propagate_source_relocations(
        target,
        source,
        target_text_idx,
        source_text_idx,
        &source_old_to_new,
        num_local_syms_source,
    )?;

    Ok(())
}

/// Step 4: OR the first 20 bytes of `.reginfo` together; the remaining
/// 4 bytes (a MIPS reginfo record is 24 bytes total) are left as the
/// target's, since they don't carry register-use masks.
fn merge_reginfo(target: &mut ElfFile, source: &ElfFile) -> Result<()> {
    let target_idx = target
        .find_section(".reginfo")
        .ok_or_else(|| Error::Malformed("target object has no .reginfo section".into()))?
        .index;
    let source_data = source
        .find_section(".reginfo")
        .ok_or_else(|| Error::Malformed("assembled object has no .reginfo section".into()))?
        .data
        .clone();

    if source_data.len() < 20 || target.sections[target_idx].data.len() < 20 {
        return Err(Error::Malformed(".reginfo section is shorter than 20 bytes".into()));
    }

    for i in 0..20 {
        target.sections[target_idx].data[i] |= source_data[i];
    }
    log::debug!("reginfo merged");
    Ok(())
}

/// Step 5: overwrite the target's `.text` bytes at each `(word_offset,
/// word_count)` entry in the copy plan with the corresponding bytes
/// from the assembled source's `.text`. The target's `.text` length is
/// never changed.
fn splice_text(target: &mut ElfFile, source: &ElfFile, to_copy: &[(u32, u32)]) -> Result<()> {
    let target_idx = target
        .find_section(".text")
        .ok_or_else(|| Error::Malformed("target object has no .text section".into()))?
        .index;
    let source_data = source
        .find_section(".text")
        .ok_or_else(|| Error::Malformed("assembled object has no .text section".into()))?
        .data
        .clone();

    let original_len = target.sections[target_idx].data.len();
    for &(pos_words, count_words) in to_copy {
        let pos = pos_words as usize * 4;
        let count = count_words as usize * 4;
        let end = pos + count;
        if end > target.sections[target_idx].data.len() || end > source_data.len() {
            return Err(Error::Misaligned(format!(
                "spliced region [{}, {}) runs past the end of .text",
                pos, end
            )));
        }
        target.sections[target_idx].data[pos..end].copy_from_slice(&source_data[pos..end]);
    }
    debug_assert_eq!(target.sections[target_idx].data.len(), original_len);
    Ok(())
}

/// Step 6: concatenate string tables, drop placeholder symbols from the
/// target, append the source's global symbols (rewriting their section
/// index and fixing up `STT_FUNC` where the assembler didn't mark a
/// `glabel` as a function), and rebuild the target's `.symtab` in
/// place. Returns `(target_old_index -> new_index, source_old_index ->
/// new_index, source's local symbol count)` for the relocation passes
/// that follow.
///
/// Deliberately does not re-sort locals before globals and does not
/// deduplicate symbols: the downstream linker tolerates both, matching
/// the behavior this splicer is a drop-in replacement for.
fn merge_symbols(
    target: &mut ElfFile,
    source: &ElfFile,
    temp_names: &HashSet<String>,
    fn_names: &HashSet<String>,
    target_text_idx: usize,
    source_text_idx: usize,
) -> Result<(Vec<Option<usize>>, Vec<Option<usize>>, usize)> {
    let target_strtab_idx = target
        .symtab()
        .strtab_index
        .ok_or_else(|| Error::Malformed("target symtab has no linked string table".into()))?;
    let strtab_adj = target.sections[target_strtab_idx].data.len() as u32;

    let source_strtab_idx = source
        .symtab()
        .strtab_index
        .ok_or_else(|| Error::Malformed("assembled object's symtab has no linked string table".into()))?;
    let source_strtab_bytes = source.sections[source_strtab_idx].data.clone();
    target.sections[target_strtab_idx]
        .data
        .extend_from_slice(&source_strtab_bytes);

    let target_syms: Vec<Symbol> = target
        .symtab()
        .symbols
        .clone()
        .ok_or_else(|| Error::Malformed("target symtab was not parsed into symbol entries".into()))?;
    let source_syms: Vec<Symbol> = source
        .symtab()
        .symbols
        .clone()
        .ok_or_else(|| Error::Malformed("assembled object's symtab was not parsed into symbol entries".into()))?;
    let num_local_syms_source = source.symtab().sh_info as usize;

    let mut new_entries = Vec::with_capacity(target_syms.len() + source_syms.len());
    let mut target_old_to_new = vec![None; target_syms.len()];
    let mut source_old_to_new = vec![None; source_syms.len()];
    let mut index = 0usize;

    for (i, sym) in target_syms.into_iter().enumerate() {
        if temp_names.contains(&sym.name) {
            continue;
        }
        let mut sym = sym;
        sym.new_index = Some(index);
        target_old_to_new[i] = Some(index);
        new_entries.push(sym);
        index += 1;
    }

    for (i, mut sym) in source_syms.into_iter().enumerate() {
        if i < num_local_syms_source {
            continue;
        }
        if sym.st_shndx != SHN_UNDEF {
            if sym.st_shndx as usize != source_text_idx {
                return Err(Error::BadAssemblyObject(format!(
                    "symbol `{}` is defined in a section other than its own .text",
                    sym.name
                )));
            }
            sym.st_shndx = target_text_idx as u16;
            if fn_names.contains(&sym.name) {
                sym.typ = STT_FUNC;
            }
        }
        sym.st_name += strtab_adj;
        sym.new_index = Some(index);
        source_old_to_new[i] = Some(index);
        new_entries.push(sym);
        index += 1;
    }

    let new_data: Vec<u8> = new_entries.iter().flat_map(Symbol::to_bin).collect();
    let merged_count = new_entries.len();
    target.symtab_mut().data = new_data;
    target.symtab_mut().symbols = Some(new_entries);

    log::debug!(
        "symbols merged: {} entries in the rebuilt symtab",
        merged_count
    );
    Ok((target_old_to_new, source_old_to_new, num_local_syms_source))
}

/// Step 7: every relocation section that patches the target's old
/// `.text` referenced symbols by their pre-merge index. Rewrite those
/// indices through the mapping `merge_symbols` produced.
fn remap_target_relocations(
    target: &mut ElfFile,
    target_text_idx: usize,
    old_to_new: &[Option<usize>],
) -> Result<()> {
    let relocated_by = target.sections[target_text_idx].relocated_by.clone();
    for r_idx in relocated_by {
        let relocs = target.sections[r_idx].relocations.clone().ok_or_else(|| {
            Error::Malformed(format!(
                "section {} is a relocation table with no parsed relocation entries",
                r_idx
            ))
        })?;
        let mut new_relocs = Vec::with_capacity(relocs.len());
        for mut rel in relocs {
            let new_idx = old_to_new
                .get(rel.sym_index as usize)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    Error::Malformed(format!(
                        "relocation references symbol index {} which no longer exists after splicing",
                        rel.sym_index
                    ))
                })?;
            rel.sym_index = new_idx as u32;
            new_relocs.push(rel);
        }
        target.sections[r_idx].data = new_relocs.iter().flat_map(crate::elf::Relocation::to_bin).collect();
        target.sections[r_idx].relocations = Some(new_relocs);
    }
    log::debug!("target relocations remapped to merged symbol indices");
    Ok(())
}

/// Step 8: relocations the assembler emitted against its own `.text`
/// (all required to point at global symbols) are remapped through the
/// source-side mapping and appended to the target's `.rel.text` /
/// `.rela.text`, creating that section if the target didn't already
/// have one.
fn propagate_source_relocations(
    target: &mut ElfFile,
    source: &ElfFile,
    target_text_idx: usize,
    source_text_idx: usize,
    old_to_new: &[Option<usize>],
    num_local_syms_source: usize,
) -> Result<()> {
    let relocated_by = source.sections[source_text_idx].relocated_by.clone();
    for r_idx in relocated_by {
        let reltab = &source.sections[r_idx];
        let sh_type = reltab.sh_type;
        let relocs = reltab.relocations.clone().ok_or_else(|| {
            Error::Malformed(format!(
                "section {} is a relocation table with no parsed relocation entries",
                r_idx
            ))
        })?;

        let mut new_relocs = Vec::with_capacity(relocs.len());
        for mut rel in relocs {
            if (rel.sym_index as usize) < num_local_syms_source {
                return Err(Error::BadAssemblyObject(format!(
                    "relocation in assembled object points to local symbol index {}",
                    rel.sym_index
                )));
            }
            let new_idx = old_to_new
                .get(rel.sym_index as usize)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    Error::Malformed("relocation references a symbol index outside the source symtab".into())
                })?;
            rel.sym_index = new_idx as u32;
            new_relocs.push(rel);
        }

        let target_idx = if sh_type == SHT_REL {
            match target.find_section(".rel.text") {
                Some(s) => s.index,
                None => target.add_section(
                    ".rel.text",
                    SHT_REL,
                    0,
                    target.symtab_index as u32,
                    target_text_idx as u32,
                    4,
                    crate::elf::REL_SIZE as u32,
                    Vec::new(),
                )?,
            }
        } else {
            match target.find_section(".rela.text") {
                Some(s) => s.index,
                None => target.add_section(
                    ".rela.text",
                    crate::elf::SHT_RELA,
                    0,
                    target.symtab_index as u32,
                    target_text_idx as u32,
                    4,
                    crate::elf::RELA_SIZE as u32,
                    Vec::new(),
                )?,
            }
        };

        let new_data: Vec<u8> = new_relocs.iter().flat_map(crate::elf::Relocation::to_bin).collect();
        target.sections[target_idx].data.extend_from_slice(&new_data);
        target.sections[target_idx]
            .relocations
            .get_or_insert_with(Vec::new)
            .extend(new_relocs);
    }
    log::debug!("source relocations propagated into the target object");
    Ok(())
}

/// Runs the external assembler as a shell command, matching the
/// `<assembler> <inpath> -o <outpath>` contract from the source
/// extraction interface.
fn run_assembler(assembler: &str, s_path: &Path, o_path: &Path) -> Result<()> {
    let cmd = format!("{} {} -o {}", assembler, s_path.display(), o_path.display());
    log::debug!("invoking assembler: {}", cmd);
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&cmd)
        .status()
        .map_err(|e| Error::AssemblerFailed(format!("failed to spawn assembler: {}", e)))?;
    if !status.success() {
        return Err(Error::AssemblerFailed(format!(
            "assembler exited with status {}",
            status
        )));
    }
    Ok(())
}
