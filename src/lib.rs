//! Bytecode compiler and virtual machine for Minimal BASIC, ECMA-55.
//!
//! This crate is the "core" described by the surrounding workspace: it owns
//! the data model (coded variables, RAM, string pool, DATA pool, bytecode),
//! the compiler (static checks + code generation) and the virtual machine
//! (execution + PRINT formatting). It does not parse BASIC surface syntax
//! itself (that lives in `basrt`, which depends on this crate and drives
//! `compiler::Compiler`'s actions directly) nor does it do file I/O,
//! argument parsing, line editing or program-lifecycle bookkeeping (that's
//! `bas55`'s `Session`, which sits on top of both `basrt` and this crate).

#[macro_use]
extern crate num_derive;

pub mod arraydesc;
pub mod code;
pub mod codedvar;
pub mod compiler;
pub mod datalex;
pub mod datapool;
pub mod error;
pub mod numerics;
pub mod program;
pub mod strpool;
pub mod vm;

pub use error::{Error, Severity};
pub use program::CompiledProgram;

/// Maximum positive BASIC line number.
pub const LINE_NUM_MAX: i32 = 9999;

/// Maximum characters in a BASIC source line, excluding the newline.
pub const LINE_MAX_CHARS: usize = 80;

/// Compile errors accepted before a run is abandoned (`MAX_ERRORS`).
pub const MAX_ERRORS: usize = 20;

/// Significant digits used when checking for constant overflow at compile
/// time (`PRECISION_DIGITS`).
pub const PRECISION_DIGITS: u32 = 6;

/// Significant digits used when parsing a DATA/INPUT datum back into a
/// double (wider than what we print, so round-tripping through READ/INPUT
/// never loses precision the printer didn't already drop).
pub const READ_PRECISION_DIGITS: u32 = 17;

/// Significant digits used by the printer (`NUM_CHARS`/PRINT_NUM format).
pub const PRINT_PRECISION_DIGITS: u32 = 8;

/// Number of letters a variable name can start with (`N_VARNAMES`).
pub const N_VARNAMES: usize = 26;

/// Number of sub-slots per letter: digits 0-9, bare, and `$` (`N_SUBVARS`).
pub const N_SUBVARS: usize = 12;

/// Maximum length of a string literal or string datum (`LET_STRVAR`).
pub const MAX_STR_LEN: usize = 18;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_ecma55_header() {
        assert_eq!(LINE_NUM_MAX, 9999);
        assert_eq!(MAX_ERRORS, 20);
        assert_eq!(N_VARNAMES * N_SUBVARS, 312);
    }
}
