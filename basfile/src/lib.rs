//! Binary (de)serialization of a compiled `bas55` program image: the
//! `.basc` format written by the editor's `COMPILE` command and read back
//! by `bas55 -l`. Framed by hand with `byteorder` (manual, length-prefixed,
//! no `serde`), since a compiled BASIC program is really just a longer
//! instruction tape with a few extra sections (string pool, DATA pool,
//! array descriptors) alongside the code.

use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use byteorder::{ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};

use bc_core::arraydesc::ArrayDescs;
use bc_core::code::{Cell, Code, Opcode};
use bc_core::datapool::{DataPool, DatumType};
use bc_core::strpool::StringPool;
use bc_core::CompiledProgram;
use util::Endian;

const MAGIC: &[u8; 4] = b"BASC";
const FORMAT_VERSION: u16 = 1;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    BadMagic,
    UnsupportedVersion(u16),
    CorruptCell(u8),
    CorruptDatum(u8),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{}", e),
            Error::BadMagic => write!(f, "not a bas55 compiled image"),
            Error::UnsupportedVersion(v) => write!(f, "unsupported .basc version {}", v),
            Error::CorruptCell(tag) => write!(f, "corrupt bytecode cell tag {}", tag),
            Error::CorruptDatum(tag) => write!(f, "corrupt DATA item tag {}", tag),
        }
    }
}

impl std::error::Error for Error {}

fn write_string<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    w.write_u32::<Endian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_string<R: Read>(r: &mut R) -> std::io::Result<String> {
    let len = r.read_u32::<Endian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Writes a compiled program's full state: bytecode, string pool (every
/// slot, with the constant-count boundary), DATA pool, array descriptors,
/// RAM/stack sizing and the string-variable RAM positions the VM needs to
/// pre-seed before a `RUN`.
pub fn write<W: Write>(w: &mut W, program: &CompiledProgram) -> std::io::Result<()> {
    w.write_all(MAGIC)?;
    w.write_u16::<Endian>(FORMAT_VERSION)?;

    w.write_i32::<Endian>(program.base_index)?;
    w.write_i32::<Endian>(program.ram_size)?;
    w.write_i32::<Endian>(program.stack_max)?;

    let texts = program.strings.texts();
    w.write_u32::<Endian>(program.strings.n_const() as u32)?;
    w.write_u32::<Endian>(texts.len() as u32)?;
    for text in texts {
        write_string(w, text)?;
    }

    let items = program.data.items();
    w.write_u32::<Endian>(items.len() as u32)?;
    for (ty, idx) in items {
        let tag: u8 = match ty {
            DatumType::Quoted => 0,
            DatumType::Unquoted => 1,
        };
        w.write_u8(tag)?;
        w.write_u32::<Endian>(idx as u32)?;
    }

    for letter in 0..bc_core::N_VARNAMES {
        let d = program.array_descs.get(letter);
        w.write_i32::<Endian>(d.rampos)?;
        w.write_i32::<Endian>(d.dim1)?;
        w.write_i32::<Endian>(d.dim2)?;
    }

    w.write_u32::<Endian>(program.string_var_ram_positions.len() as u32)?;
    for &pos in &program.string_var_ram_positions {
        w.write_i32::<Endian>(pos)?;
    }

    let cells = program.code.cells();
    w.write_u32::<Endian>(cells.len() as u32)?;
    for cell in cells {
        match *cell {
            Cell::Op(op) => {
                w.write_u8(0)?;
                w.write_u16::<Endian>(op.to_u16().expect("opcode fits u16"))?;
            }
            Cell::Id(id) => {
                w.write_u8(1)?;
                w.write_i32::<Endian>(id)?;
            }
            Cell::Num(n) => {
                w.write_u8(2)?;
                w.write_f64::<Endian>(n)?;
            }
        }
    }

    Ok(())
}

/// Reads a `.basc` image back into a runnable [`CompiledProgram`].
pub fn read<R: Read>(r: &mut R) -> Result<CompiledProgram, Error> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::BadMagic);
    }
    let version = r.read_u16::<Endian>()?;
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let base_index = r.read_i32::<Endian>()?;
    let ram_size = r.read_i32::<Endian>()?;
    let stack_max = r.read_i32::<Endian>()?;

    let n_const = r.read_u32::<Endian>()? as usize;
    let n_strings = r.read_u32::<Endian>()?;
    let mut texts = Vec::with_capacity(n_strings as usize);
    for _ in 0..n_strings {
        texts.push(read_string(r)?);
    }
    let strings = StringPool::from_texts(texts, n_const);

    let n_data = r.read_u32::<Endian>()?;
    let mut items = Vec::with_capacity(n_data as usize);
    for _ in 0..n_data {
        let tag = r.read_u8()?;
        let ty = match tag {
            0 => DatumType::Quoted,
            1 => DatumType::Unquoted,
            other => return Err(Error::CorruptDatum(other)),
        };
        let idx = r.read_u32::<Endian>()? as usize;
        items.push((ty, idx));
    }
    let data = DataPool::from_items(items);

    let mut array_descs = ArrayDescs::new();
    for letter in 0..bc_core::N_VARNAMES {
        let rampos = r.read_i32::<Endian>()?;
        let dim1 = r.read_i32::<Endian>()?;
        let dim2 = r.read_i32::<Endian>()?;
        array_descs.set(letter, rampos, dim1, dim2);
    }

    let n_strvars = r.read_u32::<Endian>()?;
    let mut string_var_ram_positions = Vec::with_capacity(n_strvars as usize);
    for _ in 0..n_strvars {
        string_var_ram_positions.push(r.read_i32::<Endian>()?);
    }

    let n_cells = r.read_u32::<Endian>()?;
    let mut cells = Vec::with_capacity(n_cells as usize);
    for _ in 0..n_cells {
        let tag = r.read_u8()?;
        let cell = match tag {
            0 => {
                let discr = r.read_u16::<Endian>()?;
                let op = Opcode::from_u16(discr).ok_or(Error::CorruptCell(tag))?;
                Cell::Op(op)
            }
            1 => Cell::Id(r.read_i32::<Endian>()?),
            2 => Cell::Num(r.read_f64::<Endian>()?),
            other => return Err(Error::CorruptCell(other)),
        };
        cells.push(cell);
    }
    let code = Code::from_cells(cells);

    Ok(CompiledProgram {
        code,
        strings,
        data,
        array_descs,
        ram_size,
        stack_max,
        base_index,
        string_var_ram_positions,
    })
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<CompiledProgram, Error> {
    read(&mut BufReader::new(File::open(path)?))
}

pub fn write_file<P: AsRef<Path>>(path: P, program: &CompiledProgram) -> Result<(), Error> {
    write(&mut BufWriter::new(File::create(path)?), program)?;
    Ok(())
}

#[cfg(test)]
mod test;
