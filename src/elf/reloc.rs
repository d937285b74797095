use crate::codec::{read_u32, write_u32};
use crate::error::{Error, Result};

use super::{REL_SIZE, RELA_SIZE, SHT_REL};

/// One relocation entry, REL or RELA depending on the owning section's
/// `sh_type`. `r_info` is never stored directly: it's recomputed from
/// `sym_index` and `rel_type` on every `to_bin`, so remapping a symbol
/// index during splicing is a single field write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    pub sh_type: u32,
    pub r_offset: u32,
    pub sym_index: u32,
    pub rel_type: u8,
    pub r_addend: Option<u32>,
}

impl Relocation {
    pub fn parse(data: &[u8], sh_type: u32) -> Result<Self> {
        let entsize = if sh_type == SHT_REL { REL_SIZE } else { RELA_SIZE };
        if data.len() < entsize {
            return Err(Error::Malformed(format!(
                "relocation entry: expected {} bytes, found {}",
                entsize,
                data.len()
            )));
        }
        let r_offset = read_u32(data, 0, "r_offset")?;
        let r_info = read_u32(data, 4, "r_info")?;
        let r_addend = if sh_type == SHT_REL {
            None
        } else {
            Some(read_u32(data, 8, "r_addend")?)
        };

        Ok(Relocation {
            sh_type,
            r_offset,
            sym_index: r_info >> 8,
            rel_type: (r_info & 0xff) as u8,
            r_addend,
        })
    }

    pub fn to_bin(&self) -> Vec<u8> {
        let entsize = if self.sh_type == SHT_REL { REL_SIZE } else { RELA_SIZE };
        let mut out = Vec::with_capacity(entsize);
        let r_info = (self.sym_index << 8) | self.rel_type as u32;
        write_u32(&mut out, self.r_offset);
        write_u32(&mut out, r_info);
        if let Some(addend) = self.r_addend {
            write_u32(&mut out, addend);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::SHT_RELA;

    #[test]
    fn round_trips_rel() {
        let rel = Relocation {
            sh_type: SHT_REL,
            r_offset: 0x10,
            sym_index: 7,
            rel_type: 4,
            r_addend: None,
        };
        let bin = rel.to_bin();
        assert_eq!(bin.len(), REL_SIZE);
        assert_eq!(Relocation::parse(&bin, SHT_REL).unwrap(), rel);
    }

    #[test]
    fn round_trips_rela() {
        let rel = Relocation {
            sh_type: SHT_RELA,
            r_offset: 0x10,
            sym_index: 300,
            rel_type: 2,
            r_addend: Some(0x1234),
        };
        let bin = rel.to_bin();
        assert_eq!(bin.len(), RELA_SIZE);
        assert_eq!(Relocation::parse(&bin, SHT_RELA).unwrap(), rel);
    }

    #[test]
    fn sym_index_remap_recomputes_r_info() {
        let mut rel = Relocation {
            sh_type: SHT_REL,
            r_offset: 0,
            sym_index: 5,
            rel_type: 6,
            r_addend: None,
        };
        rel.sym_index = 9;
        let bin = rel.to_bin();
        let expected_info: u32 = (9 << 8) | 6;
        assert_eq!(u32::from_be_bytes([bin[4], bin[5], bin[6], bin[7]]), expected_info);
    }
}
