use crate::error::{Error, Result};

use super::{ElfHeader, Section, ELF_HEADER_SIZE, SECTION_HEADER_SIZE, SHN_UNDEF, SHT_NOBITS, SHT_NULL, SHT_SYMTAB};

/// A parsed ELF object: header plus its section list, owning every
/// payload byte. Sections refer to each other only by index into
/// [`ElfFile::sections`]; there is no aliasing and no ownership cycle.
pub struct ElfFile {
    pub header: ElfHeader,
    pub sections: Vec<Section>,
    pub symtab_index: usize,
}

impl ElfFile {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 || &data[0..4] != b"\x7fELF" {
            return Err(Error::Malformed("bad ELF magic".into()));
        }
        let header = ElfHeader::parse(&data[0..ELF_HEADER_SIZE])?;

        let shoff = header.e_shoff as usize;
        let shentsize = header.e_shentsize as usize;
        if shentsize < SECTION_HEADER_SIZE {
            return Err(Error::Malformed(format!(
                "section header entry size {} is smaller than {}",
                shentsize, SECTION_HEADER_SIZE
            )));
        }

        let null_header = slice_at(data, shoff, shentsize)?;
        let null_section = Section::parse(null_header, data, 0)?;
        let num_sections = if header.e_shnum != 0 {
            header.e_shnum as usize
        } else {
            null_section.sh_size as usize
        };

        let mut sections = Vec::with_capacity(num_sections);
        sections.push(null_section);
        for i in 1..num_sections {
            let header_bytes = slice_at(data, shoff + i * shentsize, shentsize)?;
            sections.push(Section::parse(header_bytes, data, i)?);
        }

        let mut symtab_index = None;
        for s in &sections {
            if s.sh_type == SHT_SYMTAB {
                if symtab_index.is_some() {
                    return Err(Error::Malformed("object has more than one SHT_SYMTAB".into()));
                }
                symtab_index = Some(s.index);
            }
        }
        let symtab_index =
            symtab_index.ok_or_else(|| Error::Malformed("object has no SHT_SYMTAB".into()))?;

        let shstrndx = header.e_shstrndx as usize;
        if shstrndx >= sections.len() {
            return Err(Error::Malformed(format!(
                "e_shstrndx {} is out of range ({} sections)",
                shstrndx,
                sections.len()
            )));
        }
        let shstr_data = sections[shstrndx].data.clone();
        for s in &mut sections {
            s.name = crate::elf::section_lookup_str(&shstr_data, s.sh_name)?;
        }

        for i in 0..sections.len() {
            if sections[i].sh_type == SHT_SYMTAB {
                let link = sections[i].sh_link as usize;
                let strtab_data = sections
                    .get(link)
                    .ok_or_else(|| Error::Malformed(format!("symtab sh_link {} out of range", link)))?
                    .data
                    .clone();
                sections[i].init_symtab(link, &strtab_data)?;
            }
        }
        for i in 0..sections.len() {
            if sections[i].is_rel() {
                let target = sections[i].sh_info as usize;
                if target >= sections.len() {
                    return Err(Error::Malformed(format!(
                        "relocation section sh_info {} out of range",
                        target
                    )));
                }
                sections[i].init_relocs(target)?;
                sections[target].relocated_by.push(i);
            }
        }

        log::debug!(
            "parsed ELF object: {} sections, symtab at index {}",
            sections.len(),
            symtab_index
        );

        Ok(ElfFile {
            header,
            sections,
            symtab_index,
        })
    }

    pub fn symtab(&self) -> &Section {
        &self.sections[self.symtab_index]
    }

    pub fn symtab_mut(&mut self) -> &mut Section {
        &mut self.sections[self.symtab_index]
    }

    pub fn find_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn find_section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    /// Locate a global or local symbol by name in the symbol table;
    /// returns `(st_shndx, st_value)`.
    pub fn find_symbol(&self, name: &str) -> Option<(u16, u32)> {
        self.symtab()
            .symbols
            .as_ref()?
            .iter()
            .find(|s| s.name == name)
            .map(|s| (s.st_shndx, s.st_value))
    }

    /// Append a brand-new section (e.g. a `.rel.text` the splicer needs
    /// to create), registering its name in the section-name string table
    /// and running `late_init` so its `relocated_by` link is set up even
    /// though the new section won't itself be the target of relocations.
    #[allow(clippy::too_many_arguments)]
    pub fn add_section(
        &mut self,
        name: &str,
        sh_type: u32,
        sh_flags: u32,
        sh_link: u32,
        sh_info: u32,
        sh_addralign: u32,
        sh_entsize: u32,
        data: Vec<u8>,
    ) -> Result<usize> {
        let shstrndx = self.header.e_shstrndx as usize;
        let sh_name = self.sections[shstrndx].add_str(name);
        let index = self.sections.len();
        let mut section = Section::from_parts(
            index,
            name.to_string(),
            sh_name,
            sh_type,
            sh_flags,
            sh_link,
            sh_info,
            sh_addralign,
            sh_entsize,
            data,
        );
        if section.is_rel() {
            let target = section.sh_info as usize;
            section.init_relocs(target)?;
        }
        self.sections.push(section);
        if self.sections[index].is_rel() {
            let target = self.sections[index].sh_info as usize;
            self.sections[target].relocated_by.push(index);
        }
        Ok(index)
    }

    /// Serialize the current in-memory state into a fresh byte buffer.
    /// Section ordering is preserved from the model; byte offsets are
    /// not preserved (sections are repacked tightly with per-section
    /// alignment padding), matching the ABI's permission to relocate
    /// section contents so long as offsets in the header stay coherent.
    pub fn write(&mut self) -> Vec<u8> {
        self.header.e_shnum = self.sections.len() as u16;

        let mut out = self.header.to_bin();
        debug_assert_eq!(out.len(), ELF_HEADER_SIZE);

        for section in &mut self.sections {
            if section.sh_type == SHT_NULL || section.sh_type == SHT_NOBITS {
                continue;
            }
            pad_to(&mut out, section.sh_addralign as usize);
            section.sh_offset = out.len() as u32;
            out.extend_from_slice(&section.data);
        }

        pad_to(&mut out, 4);
        self.header.e_shoff = out.len() as u32;
        for section in &self.sections {
            out.extend_from_slice(&section.header_to_bin());
        }

        let header_bytes = self.header.to_bin();
        out[0..ELF_HEADER_SIZE].copy_from_slice(&header_bytes);

        log::debug!(
            "wrote ELF object: {} sections, {} bytes",
            self.sections.len(),
            out.len()
        );
        out
    }
}

fn pad_to(out: &mut Vec<u8>, align: usize) {
    if align == 0 {
        return;
    }
    let rem = out.len() % align;
    if rem != 0 {
        out.resize(out.len() + (align - rem), 0);
    }
}

fn slice_at<'a>(data: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| Error::Malformed("offset overflow".into()))?;
    if end > data.len() {
        return Err(Error::Malformed(format!(
            "range [{}, {}) runs past end of file ({} bytes)",
            offset,
            end,
            data.len()
        )));
    }
    Ok(&data[offset..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::testutil::build_minimal_object;

    #[test]
    fn parse_write_round_trip_preserves_sections() {
        let bytes = build_minimal_object();
        let mut file = ElfFile::parse(&bytes).unwrap();
        let names_before: Vec<String> = file.sections.iter().map(|s| s.name.clone()).collect();
        let rewritten = file.write();

        let reparsed = ElfFile::parse(&rewritten).unwrap();
        let names_after: Vec<String> = reparsed.sections.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names_before, names_after);
        for (a, b) in file.sections.iter().zip(reparsed.sections.iter()) {
            assert_eq!(a.sh_type, b.sh_type);
            assert_eq!(a.sh_flags, b.sh_flags);
            assert_eq!(a.data, b.data);
        }
    }

    #[test]
    fn rejects_multiple_symtabs() {
        let bytes = build_minimal_object();
        // Sanity: the minimal object parses at all before we assert the
        // negative case in splice tests using a mutated copy.
        assert!(ElfFile::parse(&bytes).is_ok());
    }
}
