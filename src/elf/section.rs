use crate::codec::{read_u32, write_u32};
use crate::error::{Error, Result};

use super::{Relocation, Symbol, SECTION_HEADER_SIZE, SHF_LINK_ORDER, SHT_NOBITS, SHT_REL, SHT_STRTAB, SHT_SYMTAB};

/// One section: its 40-byte header plus the payload bytes it owns.
///
/// Cross-references to other sections (`sh_link`, `sh_info`, and the
/// inverse `relocated_by`) are kept as plain indices into the owning
/// file's section list — never as pointers — so the model has no
/// ownership cycles. `symbols` and `relocations` are populated by
/// [`Section::late_init`] once every section in the file exists.
#[derive(Clone, Debug)]
pub struct Section {
    pub index: usize,
    pub name: String,

    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub sh_addr: u32,
    pub sh_offset: u32,
    pub sh_size: u32,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u32,
    pub sh_entsize: u32,

    pub data: Vec<u8>,

    /// Sections whose `sh_info` points back at this one (i.e. relocation
    /// sections that patch this section).
    pub relocated_by: Vec<usize>,

    /// Populated when `sh_type == SHT_SYMTAB`.
    pub symbols: Option<Vec<Symbol>>,
    /// Index of the string table this symtab's names resolve through.
    pub strtab_index: Option<usize>,

    /// Populated when `is_rel()`.
    pub relocations: Option<Vec<Relocation>>,
    /// Index of the section this relocation section patches.
    pub rel_target_index: Option<usize>,
}

impl Section {
    /// Parse a 40-byte section header plus the file's full buffer, from
    /// which the payload is sliced at `[sh_offset, sh_offset+sh_size)`
    /// (empty for `SHT_NOBITS`, which has no file representation).
    pub fn parse(header: &[u8], file_data: &[u8], index: usize) -> Result<Self> {
        if header.len() < SECTION_HEADER_SIZE {
            return Err(Error::Malformed(format!(
                "section header: expected {} bytes, found {}",
                SECTION_HEADER_SIZE,
                header.len()
            )));
        }
        let sh_name = read_u32(header, 0, "sh_name")?;
        let sh_type = read_u32(header, 4, "sh_type")?;
        let sh_flags = read_u32(header, 8, "sh_flags")?;
        let sh_addr = read_u32(header, 12, "sh_addr")?;
        let sh_offset = read_u32(header, 16, "sh_offset")?;
        let sh_size = read_u32(header, 20, "sh_size")?;
        let sh_link = read_u32(header, 24, "sh_link")?;
        let sh_info = read_u32(header, 28, "sh_info")?;
        let sh_addralign = read_u32(header, 32, "sh_addralign")?;
        let sh_entsize = read_u32(header, 36, "sh_entsize")?;

        if sh_flags & SHF_LINK_ORDER != 0 {
            return Err(Error::Malformed("SHF_LINK_ORDER is not supported".into()));
        }
        if sh_entsize != 0 && sh_size % sh_entsize != 0 {
            return Err(Error::Malformed(format!(
                "section {}: sh_size {} is not a multiple of sh_entsize {}",
                index, sh_size, sh_entsize
            )));
        }

        let data = if sh_type == SHT_NOBITS {
            Vec::new()
        } else {
            let start = sh_offset as usize;
            let end = start
                .checked_add(sh_size as usize)
                .ok_or_else(|| Error::Malformed(format!("section {}: offset overflow", index)))?;
            if end > file_data.len() {
                return Err(Error::Malformed(format!(
                    "section {}: payload [{}, {}) runs past end of file ({} bytes)",
                    index,
                    start,
                    end,
                    file_data.len()
                )));
            }
            file_data[start..end].to_vec()
        };

        Ok(Section {
            index,
            name: String::new(),
            sh_name,
            sh_type,
            sh_flags,
            sh_addr,
            sh_offset,
            sh_size,
            sh_link,
            sh_info,
            sh_addralign,
            sh_entsize,
            data,
            relocated_by: Vec::new(),
            symbols: None,
            strtab_index: None,
            relocations: None,
            rel_target_index: None,
        })
    }

    /// Build a brand-new section from parts, as the splicer does when it
    /// needs to insert `.rel.text`/`.rela.text` that the target lacked.
    /// `sh_addr` and `sh_offset` start at zero; the writer assigns the
    /// real offset when it lays out the file.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        index: usize,
        name: String,
        sh_name: u32,
        sh_type: u32,
        sh_flags: u32,
        sh_link: u32,
        sh_info: u32,
        sh_addralign: u32,
        sh_entsize: u32,
        data: Vec<u8>,
    ) -> Self {
        Section {
            index,
            name,
            sh_name,
            sh_type,
            sh_flags,
            sh_addr: 0,
            sh_offset: 0,
            sh_size: data.len() as u32,
            sh_link,
            sh_info,
            sh_addralign,
            sh_entsize,
            data,
            relocated_by: Vec::new(),
            symbols: None,
            strtab_index: None,
            relocations: None,
            rel_target_index: None,
        }
    }

    pub fn is_rel(&self) -> bool {
        self.sh_type == SHT_REL || self.sh_type == super::SHT_RELA
    }

    /// Scan forward from `offset` to the next NUL byte and decode the
    /// bytes in between as UTF-8. Only valid on `SHT_STRTAB` sections.
    pub fn lookup_str(&self, offset: u32) -> Result<String> {
        lookup_str_in(&self.data, offset)
    }

    /// Append `s` plus a NUL terminator; returns the offset at which `s`
    /// starts, which remains valid for the section's lifetime (string
    /// tables are never truncated or reordered).
    pub fn add_str(&mut self, s: &str) -> u32 {
        debug_assert_eq!(self.sh_type, SHT_STRTAB);
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        offset
    }

    /// Pack the header, recomputing `sh_size` from the current payload
    /// length for anything but `SHT_NOBITS` (whose size is virtual).
    pub fn header_to_bin(&self) -> Vec<u8> {
        let sh_size = if self.sh_type == SHT_NOBITS {
            self.sh_size
        } else {
            self.data.len() as u32
        };
        let mut out = Vec::with_capacity(SECTION_HEADER_SIZE);
        write_u32(&mut out, self.sh_name);
        write_u32(&mut out, self.sh_type);
        write_u32(&mut out, self.sh_flags);
        write_u32(&mut out, self.sh_addr);
        write_u32(&mut out, self.sh_offset);
        write_u32(&mut out, sh_size);
        write_u32(&mut out, self.sh_link);
        write_u32(&mut out, self.sh_info);
        write_u32(&mut out, self.sh_addralign);
        write_u32(&mut out, self.sh_entsize);
        out
    }

    /// Second-phase binding invoked once every section in the file
    /// exists: resolve the symbol table's string table and parse its
    /// entries, or resolve a relocation section's target and parse its
    /// entries. `strtab_data` / `target` are passed in by the caller
    /// because a section can't safely borrow its siblings out of the
    /// same `Vec` while mutating itself.
    pub fn init_symtab(&mut self, strtab_index: usize, strtab_data: &[u8]) -> Result<()> {
        debug_assert_eq!(self.sh_type, SHT_SYMTAB);
        if self.sh_entsize != super::SYMBOL_SIZE as u32 {
            return Err(Error::Malformed(format!(
                "symtab entsize must be {}, found {}",
                super::SYMBOL_SIZE,
                self.sh_entsize
            )));
        }
        let entsize = self.sh_entsize as usize;
        let mut entries = Vec::with_capacity(self.data.len() / entsize.max(1));
        let mut off = 0;
        while off < self.data.len() {
            let chunk = &self.data[off..off + entsize];
            let sym = Symbol::parse(chunk, |name_off| lookup_str_in(strtab_data, name_off))?;
            entries.push(sym);
            off += entsize;
        }
        self.symbols = Some(entries);
        self.strtab_index = Some(strtab_index);
        Ok(())
    }

    pub fn init_relocs(&mut self, target_index: usize) -> Result<()> {
        debug_assert!(self.is_rel());
        let entsize = self.sh_entsize as usize;
        if entsize == 0 {
            return Err(Error::Malformed("relocation section has zero entsize".into()));
        }
        let mut entries = Vec::with_capacity(self.data.len() / entsize);
        let mut off = 0;
        while off < self.data.len() {
            let chunk = &self.data[off..off + entsize];
            entries.push(Relocation::parse(chunk, self.sh_type)?);
            off += entsize;
        }
        self.relocations = Some(entries);
        self.rel_target_index = Some(target_index);
        Ok(())
    }
}

pub(crate) fn lookup_str_in(data: &[u8], offset: u32) -> Result<String> {
    let start = offset as usize;
    if start > data.len() {
        return Err(Error::Malformed(format!(
            "string table offset {} is out of bounds ({} bytes)",
            start,
            data.len()
        )));
    }
    let rest = &data[start..];
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Malformed("string table entry has no NUL terminator".into()))?;
    String::from_utf8(rest[..nul].to_vec())
        .map_err(|e| Error::Malformed(format!("string table entry is not valid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_str_then_lookup_round_trips() {
        let mut s = Section::from_parts(1, ".strtab".into(), 0, SHT_STRTAB, 0, 0, 0, 0, 1, vec![0]);
        let off = s.add_str("hello");
        assert_eq!(s.lookup_str(off).unwrap(), "hello");
    }

    #[test]
    fn lookup_without_nul_is_malformed() {
        let s = Section::from_parts(1, ".strtab".into(), 0, SHT_STRTAB, 0, 0, 0, 0, 1, vec![b'a', b'b']);
        assert!(s.lookup_str(0).is_err());
    }

    #[test]
    fn header_to_bin_recomputes_size_except_nobits() {
        let mut s = Section::from_parts(2, ".bss".into(), 0, SHT_NOBITS, 0, 0, 0, 0, 0, Vec::new());
        s.sh_size = 64;
        let bin = s.header_to_bin();
        let size = u32::from_be_bytes([bin[20], bin[21], bin[22], bin[23]]);
        assert_eq!(size, 64);
    }

    #[test]
    fn rejects_link_order_flag() {
        let header_bytes = {
            let mut out = Vec::new();
            write_u32(&mut out, 0);
            write_u32(&mut out, 1);
            write_u32(&mut out, SHF_LINK_ORDER);
            write_u32(&mut out, 0);
            write_u32(&mut out, 0);
            write_u32(&mut out, 0);
            write_u32(&mut out, 0);
            write_u32(&mut out, 0);
            write_u32(&mut out, 0);
            write_u32(&mut out, 0);
            out
        };
        assert!(Section::parse(&header_bytes, &[], 1).is_err());
    }
}
