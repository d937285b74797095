//! Splices hand-written MIPS assembly into the object files a
//! non-cooperative C compiler produces for source containing
//! `GLOBAL_ASM(...)` blocks.
//!
//! The workflow has two halves, run around a single compiler
//! invocation:
//!
//! 1. [`scan::parse_source`] rewrites a C source file, replacing each
//!    `GLOBAL_ASM` block with a placeholder function whose body is
//!    sized to land at roughly the right address once compiled.
//! 2. [`splice::splice_object`] takes the compiler's output object and
//!    the function list [`scan::parse_source`] recovered, assembles
//!    the real instructions with an external assembler, and splices
//!    them into the placeholders' addresses in place.
//!
//! The [`elf`] module is the data model both halves are built on: a
//! faithful, mutable in-memory representation of a 32-bit big-endian
//! MIPS relocatable ELF object.

pub mod codec;
pub mod elf;
pub mod error;
pub mod scan;
pub mod splice;

pub use error::{Error, Result};
pub use scan::{parse_source, ScanResult};
pub use splice::{splice_object, SplicedFunction};

#[cfg(test)]
mod tests;
