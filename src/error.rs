//! Error types shared by the ELF model, the splicer, and the CLI driver.

use std::io;

/// Everything that can go wrong while parsing, splicing, or writing a MIPS
/// object file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An ELF invariant from the data model was violated: bad magic, wrong
    /// class/encoding, non-relocatable, non-MIPS, `SHN_XINDEX`, more than
    /// one symbol table, a string table entry missing its NUL terminator,
    /// or `sh_size` not a multiple of `sh_entsize`.
    #[error("malformed ELF object: {0}")]
    Malformed(String),

    /// A placeholder function's temp symbol was not present in the
    /// target object's symbol table.
    #[error("placeholder symbol `{0}` not found in target object")]
    SymbolNotFound(String),

    /// A placeholder symbol's value was not word-aligned, or placeholders
    /// were not encountered in non-decreasing address order.
    #[error("misaligned placeholder: {0}")]
    Misaligned(String),

    /// The assembled object violated an assumption the splicer depends on:
    /// a symbol defined outside its own `.text`, or a relocation into a
    /// local symbol.
    #[error("assembled object is unsuitable for splicing: {0}")]
    BadAssemblyObject(String),

    /// The external assembler process exited with a non-zero status, or
    /// could not be spawned at all.
    #[error("assembler failed: {0}")]
    AssemblerFailed(String),

    /// Any I/O failure reading or writing files.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
