use crate::codec::{read_u16, read_u32, write_u16, write_u32};
use crate::error::{Error, Result};

use super::{
    ELFCLASS32, ELFDATA2MSB, ELF_HEADER_SIZE, EI_CLASS, EI_DATA, EI_NIDENT, EM_MIPS, ET_REL,
    SHN_UNDEF,
};

/// The 52-byte `Elf32_Ehdr`.
///
/// `e_ident` is kept verbatim so that OS/ABI bytes we don't interpret
/// round-trip unchanged; every other field is a plain big-endian integer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElfHeader {
    pub e_ident: [u8; EI_NIDENT],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u32,
    pub e_phoff: u32,
    pub e_shoff: u32,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl ElfHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ELF_HEADER_SIZE {
            return Err(Error::Malformed(format!(
                "ELF header: expected at least {} bytes, found {}",
                ELF_HEADER_SIZE,
                data.len()
            )));
        }
        if &data[0..4] != b"\x7fELF" {
            return Err(Error::Malformed("bad ELF magic".into()));
        }

        let mut e_ident = [0u8; EI_NIDENT];
        e_ident.copy_from_slice(&data[0..EI_NIDENT]);

        let mut off = EI_NIDENT;
        let e_type = read_u16(data, off, "e_type")?;
        off += 2;
        let e_machine = read_u16(data, off, "e_machine")?;
        off += 2;
        let e_version = read_u32(data, off, "e_version")?;
        off += 4;
        let e_entry = read_u32(data, off, "e_entry")?;
        off += 4;
        let e_phoff = read_u32(data, off, "e_phoff")?;
        off += 4;
        let e_shoff = read_u32(data, off, "e_shoff")?;
        off += 4;
        let e_flags = read_u32(data, off, "e_flags")?;
        off += 4;
        let e_ehsize = read_u16(data, off, "e_ehsize")?;
        off += 2;
        let e_phentsize = read_u16(data, off, "e_phentsize")?;
        off += 2;
        let e_phnum = read_u16(data, off, "e_phnum")?;
        off += 2;
        let e_shentsize = read_u16(data, off, "e_shentsize")?;
        off += 2;
        let e_shnum = read_u16(data, off, "e_shnum")?;
        off += 2;
        let e_shstrndx = read_u16(data, off, "e_shstrndx")?;

        let hdr = ElfHeader {
            e_ident,
            e_type,
            e_machine,
            e_version,
            e_entry,
            e_phoff,
            e_shoff,
            e_flags,
            e_ehsize,
            e_phentsize,
            e_phnum,
            e_shentsize,
            e_shnum,
            e_shstrndx,
        };
        hdr.validate()?;
        Ok(hdr)
    }

    fn validate(&self) -> Result<()> {
        if self.e_ident[EI_CLASS] != ELFCLASS32 {
            return Err(Error::Malformed("not a 32-bit ELF object".into()));
        }
        if self.e_ident[EI_DATA] != ELFDATA2MSB {
            return Err(Error::Malformed("not a big-endian ELF object".into()));
        }
        if self.e_type != ET_REL {
            return Err(Error::Malformed("not a relocatable (ET_REL) object".into()));
        }
        if self.e_machine != EM_MIPS {
            return Err(Error::Malformed("not a MIPS object".into()));
        }
        if self.e_phoff != 0 {
            return Err(Error::Malformed("program headers are not supported".into()));
        }
        if self.e_shoff == 0 {
            return Err(Error::Malformed("object has no section header table".into()));
        }
        if self.e_shstrndx == SHN_UNDEF {
            return Err(Error::Malformed("object has no section name string table".into()));
        }
        Ok(())
    }

    pub fn to_bin(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ELF_HEADER_SIZE);
        out.extend_from_slice(&self.e_ident);
        write_u16(&mut out, self.e_type);
        write_u16(&mut out, self.e_machine);
        write_u32(&mut out, self.e_version);
        write_u32(&mut out, self.e_entry);
        write_u32(&mut out, self.e_phoff);
        write_u32(&mut out, self.e_shoff);
        write_u32(&mut out, self.e_flags);
        write_u16(&mut out, self.e_ehsize);
        write_u16(&mut out, self.e_phentsize);
        write_u16(&mut out, self.e_phnum);
        write_u16(&mut out, self.e_shentsize);
        write_u16(&mut out, self.e_shnum);
        write_u16(&mut out, self.e_shstrndx);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ElfHeader {
        let mut e_ident = [0u8; EI_NIDENT];
        e_ident[0..4].copy_from_slice(b"\x7fELF");
        e_ident[EI_CLASS] = ELFCLASS32;
        e_ident[EI_DATA] = ELFDATA2MSB;
        ElfHeader {
            e_ident,
            e_type: ET_REL,
            e_machine: EM_MIPS,
            e_version: 1,
            e_entry: 0,
            e_phoff: 0,
            e_shoff: 0x100,
            e_flags: 0x1000,
            e_ehsize: 52,
            e_phentsize: 0,
            e_phnum: 0,
            e_shentsize: 40,
            e_shnum: 5,
            e_shstrndx: 1,
        }
    }

    #[test]
    fn round_trips() {
        let hdr = sample_header();
        let bin = hdr.to_bin();
        assert_eq!(bin.len(), ELF_HEADER_SIZE);
        let parsed = ElfHeader::parse(&bin).unwrap();
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bin = sample_header().to_bin();
        bin[0] = 0;
        assert!(ElfHeader::parse(&bin).is_err());
    }

    #[test]
    fn rejects_little_endian() {
        let mut hdr = sample_header();
        hdr.e_ident[EI_DATA] = 1;
        let bin = hdr.to_bin();
        assert!(ElfHeader::parse(&bin).is_err());
    }
}
