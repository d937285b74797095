use crate::codec::{read_u16, read_u32, read_u8, write_u16, write_u32, write_u8};
use crate::error::{Error, Result};

use super::{SHN_XINDEX, SYMBOL_SIZE};

/// One `Elf32_Sym` entry, decomposed into the fields the splicer actually
/// needs to touch.
///
/// `new_index` is scratch space used only while merging two symbol
/// tables: it records where this symbol will land in the rebuilt table,
/// so relocations can be remapped in a second pass without re-scanning
/// names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub st_name: u32,
    pub st_value: u32,
    pub st_size: u32,
    pub bind: u8,
    pub typ: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub name: String,
    pub new_index: Option<usize>,
}

impl Symbol {
    pub fn parse(data: &[u8], lookup_name: impl FnOnce(u32) -> Result<String>) -> Result<Self> {
        if data.len() < SYMBOL_SIZE {
            return Err(Error::Malformed(format!(
                "symbol entry: expected {} bytes, found {}",
                SYMBOL_SIZE,
                data.len()
            )));
        }
        let st_name = read_u32(data, 0, "st_name")?;
        let st_value = read_u32(data, 4, "st_value")?;
        let st_size = read_u32(data, 8, "st_size")?;
        let st_info = read_u8(data, 12, "st_info")?;
        let st_other = read_u8(data, 13, "st_other")?;
        let st_shndx = read_u16(data, 14, "st_shndx")?;

        if st_shndx == SHN_XINDEX {
            return Err(Error::Malformed(
                "SHN_XINDEX extended section indices are not supported".into(),
            ));
        }

        let name = lookup_name(st_name)?;

        Ok(Symbol {
            st_name,
            st_value,
            st_size,
            bind: st_info >> 4,
            typ: st_info & 0xf,
            st_other,
            st_shndx,
            name,
            new_index: None,
        })
    }

    pub fn visibility(&self) -> u8 {
        self.st_other & 0x3
    }

    pub fn to_bin(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SYMBOL_SIZE);
        let st_info = (self.bind << 4) | self.typ;
        write_u32(&mut out, self.st_name);
        write_u32(&mut out, self.st_value);
        write_u32(&mut out, self.st_size);
        write_u8(&mut out, st_info);
        write_u8(&mut out, self.st_other);
        write_u16(&mut out, self.st_shndx);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Symbol {
        Symbol {
            st_name: 5,
            st_value: 0x40,
            st_size: 16,
            bind: 1,
            typ: 2,
            st_other: 0,
            st_shndx: 3,
            name: "foo".into(),
            new_index: None,
        }
    }

    #[test]
    fn round_trips() {
        let sym = sample();
        let bin = sym.to_bin();
        assert_eq!(bin.len(), SYMBOL_SIZE);
        let parsed = Symbol::parse(&bin, |off| {
            assert_eq!(off, 5);
            Ok("foo".to_string())
        })
        .unwrap();
        assert_eq!(parsed.st_name, sym.st_name);
        assert_eq!(parsed.st_value, sym.st_value);
        assert_eq!(parsed.st_size, sym.st_size);
        assert_eq!(parsed.bind, sym.bind);
        assert_eq!(parsed.typ, sym.typ);
        assert_eq!(parsed.st_shndx, sym.st_shndx);
        assert_eq!(parsed.name, sym.name);
    }

    #[test]
    fn rejects_xindex() {
        let mut sym = sample();
        sym.st_shndx = SHN_XINDEX;
        let bin = sym.to_bin();
        assert!(Symbol::parse(&bin, |_| Ok(String::new())).is_err());
    }
}
