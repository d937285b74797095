//! Fixed-width big-endian integer packing, matching the on-disk layout of
//! `Elf32_*` records. Every multibyte field in a MIPS 32-bit big-endian
//! object is read and written through these helpers so the record layouts
//! in `elf::header`, `elf::section`, `elf::symbol`, and `elf::reloc` read
//! as plain field lists rather than scattered `from_be_bytes` calls.

use crate::error::{Error, Result};

fn need(buf: &[u8], off: usize, len: usize, what: &str) -> Result<()> {
    if off.checked_add(len).map_or(true, |end| end > buf.len()) {
        return Err(Error::Malformed(format!(
            "{}: expected {} bytes at offset {}, found {}",
            what,
            len,
            off,
            buf.len()
        )));
    }
    Ok(())
}

pub fn read_u8(buf: &[u8], off: usize, what: &str) -> Result<u8> {
    need(buf, off, 1, what)?;
    Ok(buf[off])
}

pub fn read_u16(buf: &[u8], off: usize, what: &str) -> Result<u16> {
    need(buf, off, 2, what)?;
    Ok(u16::from_be_bytes([buf[off], buf[off + 1]]))
}

pub fn read_u32(buf: &[u8], off: usize, what: &str) -> Result<u32> {
    need(buf, off, 4, what)?;
    Ok(u32::from_be_bytes([
        buf[off],
        buf[off + 1],
        buf[off + 2],
        buf[off + 3],
    ]))
}

pub fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u32() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0xdead_beef);
        assert_eq!(read_u32(&buf, 0, "test").unwrap(), 0xdead_beef);
    }

    #[test]
    fn short_buffer_is_malformed() {
        let buf = [0u8; 2];
        assert!(matches!(
            read_u32(&buf, 0, "test"),
            Err(Error::Malformed(_))
        ));
    }
}
