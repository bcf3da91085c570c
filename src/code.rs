//! The bytecode store: a flat, growable buffer of tagged cells (opcode /
//! integer id / double), plus the `Opcode` enumeration itself. Transcribed
//! from `code.c`'s `union instruction` and `ecma55.h`'s `enum vm_opcode`.

use crate::error::Error;
use num_derive::{FromPrimitive, ToPrimitive};
use util::{EnumFromStr, InteropGetName};
use util_derive::{EnumFromStr, InteropGetName};

/// Every opcode the virtual machine understands. Operand shapes are fixed
/// per opcode (see the external-interface table this mirrors); the
/// compiler never emits an opcode without immediately following it with
/// its required operand cells.
///
/// `FromPrimitive`/`ToPrimitive` give a stable numeric encoding for the
/// `.basc` compiled-image format (`basfile`); `InteropGetName`/
/// `EnumFromStr` (both from `util-derive`) back `bas55`'s `-d` trace
/// output, which prints the mnemonic rather than the numeric opcode.
#[derive(
    Clone, Copy, Eq, PartialEq, Debug, Hash, FromPrimitive, ToPrimitive, InteropGetName, EnumFromStr,
)]
pub enum Opcode {
    /// Push a numeric constant.
    PushNum,
    /// Push a string-pool index.
    PushStr,
    /// Emit a newline; reset the print column.
    PrintNl,
    /// Advance to the next comma zone, wrapping after 5 zones.
    PrintComma,
    /// Pop a column, move the cursor there (wraps modulo the margin).
    PrintTab,
    /// Pop a number, format it, and print it.
    PrintNum,
    /// Pop a string index, print it (wraps across lines at the margin).
    PrintStr,
    /// Pop a value into a scalar numeric variable.
    LetVar,
    /// Pop a string index into a scalar string variable.
    LetStrvar,
    /// Pop (value, index) into a 1-D array element.
    LetList,
    /// Pop (value, index2, index1) into a 2-D array element.
    LetTable,
    /// Push a scalar numeric variable (also used for a DEF FN parameter
    /// slot, which is just another ram cell).
    GetVar,
    /// Push a scalar string variable.
    GetStrvar,
    /// Pop an index, push a 1-D array element.
    GetList,
    /// Pop (index2, index1), push a 2-D array element.
    GetTable,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Neg,
    /// Record the source line currently executing (diagnostics/debug).
    Line,
    /// Push the return address, jump to a function/subroutine body.
    Gosub,
    /// Pop the return address and jump to it.
    Return,
    Goto,
    /// Jump through a table of `k` targets selected by a popped 1-based index.
    OnGoto,
    /// Pop a boolean (0/1), jump to target if true.
    GotoIfTrue,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Eq,
    NotEq,
    /// String equality, by pool-index identity.
    EqStr,
    NotEqStr,
    /// Pop (step, limit, var) into their RAM cells, priming a FOR loop.
    For,
    /// Exit condition for the enclosing FOR; jumps past NEXT when done.
    ForCmp,
    /// Step the loop variable and re-enter the paired FOR_CMP.
    Next,
    /// Rewind the DATA read cursor.
    Restore,
    ReadVar,
    ReadList,
    ReadTable,
    ReadStrvar,
    /// Call a zero-argument internal function (`RND`).
    Ifun0,
    /// Pop an argument, call a one-argument internal function.
    Ifun1,
    /// Reseed the PRNG from a wall-clock sample.
    Randomize,
    /// Begin an INPUT statement's pass-1/pass-2 dispatch chain.
    Input,
    /// One numeric item in an INPUT chain.
    InputNum,
    /// One string item in an INPUT chain.
    InputStr,
    /// Terminates an INPUT chain.
    InputEnd,
    /// One 1-D array item in an INPUT chain.
    InputList,
    /// One 2-D array item in an INPUT chain.
    InputTable,
    /// Debug mode only: warn once on first read of an unassigned variable.
    CheckInitVar,
    /// Debug mode only: mark a variable as assigned.
    SetInitVar,
    /// Halt the virtual machine.
    End,
}

impl Opcode {
    /// `(stack_inc, stack_dec)`, mirroring `vm_ops[]`'s per-opcode pair:
    /// the compiler adds both (independently, since one may be gated by
    /// function-definition scope) to its running stack-depth bound.
    pub fn stack_delta(self) -> (i32, i32) {
        use Opcode::*;
        match self {
            PushNum | PushStr | GetVar | GetStrvar | Ifun0 | InputNum | InputStr => (1, 0),
            PrintNl | PrintComma | Line | Gosub | Return | Goto | Restore | Randomize
            | InputEnd | End | ForCmp | Next | GetList | ReadVar | ReadStrvar | Neg | Ifun1
            | Input | CheckInitVar | SetInitVar => (0, 0),
            PrintTab | PrintNum | PrintStr | LetVar | LetStrvar | GetTable | Add | Sub | Mul
            | Div | Pow | OnGoto | GotoIfTrue | Less | Greater | LessEq | GreaterEq | Eq
            | NotEq | EqStr | NotEqStr | ReadList => (0, -1),
            LetList | ReadTable | InputList => (0, -2),
            LetTable | For | InputTable => (0, -3),
        }
    }
}

/// The fixed table of internal functions (`ABS`, `RND`, ...) that `IFUN0`/
/// `IFUN1` dispatch through. The id is what the compiler stores as the
/// opcode's operand; `basrt` is the only other crate that needs to agree
/// on the numbering, via [`Ifun::id`].
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Ifun {
    Abs,
    Atn,
    Cos,
    Exp,
    Int,
    Log,
    Rnd,
    Sgn,
    Sin,
    Sqr,
    Tan,
}

impl Ifun {
    pub const ALL: [Ifun; 11] = [
        Ifun::Abs, Ifun::Atn, Ifun::Cos, Ifun::Exp, Ifun::Int, Ifun::Log, Ifun::Rnd, Ifun::Sgn,
        Ifun::Sin, Ifun::Sqr, Ifun::Tan,
    ];

    pub fn id(self) -> i32 {
        Self::ALL.iter().position(|&f| f == self).unwrap() as i32
    }

    pub fn from_id(id: i32) -> Option<Ifun> {
        Self::ALL.get(id as usize).copied()
    }

    /// `RND` takes no argument; every other internal function takes one.
    pub fn nparams(self) -> u8 {
        if self == Ifun::Rnd {
            0
        } else {
            1
        }
    }

    /// The name as it appears in BASIC source, for the grammar's keyword
    /// table.
    pub fn name(self) -> &'static str {
        match self {
            Ifun::Abs => "ABS",
            Ifun::Atn => "ATN",
            Ifun::Cos => "COS",
            Ifun::Exp => "EXP",
            Ifun::Int => "INT",
            Ifun::Log => "LOG",
            Ifun::Rnd => "RND",
            Ifun::Sgn => "SGN",
            Ifun::Sin => "SIN",
            Ifun::Sqr => "SQR",
            Ifun::Tan => "TAN",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A single tagged bytecode cell: an opcode, an integer operand (RAM
/// offset, letter index, jump target, count), or a double constant.
#[derive(Clone, Copy, Debug)]
pub enum Cell {
    Op(Opcode),
    Id(i32),
    Num(f64),
}

impl Cell {
    pub fn as_op(self) -> Option<Opcode> {
        match self {
            Cell::Op(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_id(self) -> Option<i32> {
        match self {
            Cell::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_num(self) -> Option<f64> {
        match self {
            Cell::Num(n) => Some(n),
            _ => None,
        }
    }
}

/// The flat, growable instruction buffer. The VM's program counter is an
/// index into this vector.
#[derive(Default)]
pub struct Code {
    cells: Vec<Cell>,
}

impl Code {
    pub fn new() -> Self {
        Code { cells: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Appends an opcode cell and returns its position (used as a patch
    /// target by forward-reference backpatching).
    pub fn add_op(&mut self, op: Opcode) -> usize {
        self.cells.push(Cell::Op(op));
        self.cells.len() - 1
    }

    pub fn add_id(&mut self, id: i32) -> usize {
        self.cells.push(Cell::Id(id));
        self.cells.len() - 1
    }

    pub fn add_num(&mut self, num: f64) -> usize {
        self.cells.push(Cell::Num(num));
        self.cells.len() - 1
    }

    /// Rewrites an already-emitted id cell, used to back-patch forward
    /// jump targets once they become known.
    pub fn set_id(&mut self, pos: usize, id: i32) -> Result<(), Error> {
        match self.cells.get_mut(pos) {
            Some(cell @ Cell::Id(_)) => {
                *cell = Cell::Id(id);
                Ok(())
            }
            _ => Err(Error::Syntax),
        }
    }

    pub fn get(&self, pos: usize) -> Cell {
        self.cells[pos]
    }

    /// The raw cell sequence, for `basfile`'s `.basc` image writer: it
    /// doesn't need to know each opcode's operand arity, only how to
    /// tag and replay individual cells.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Rebuilds a code buffer from a cell sequence read back out of a
    /// `.basc` image.
    pub fn from_cells(cells: Vec<Cell>) -> Self {
        Code { cells }
    }
}

/// A textual listing of `code`, one line per cell: opcodes by mnemonic
/// (via [`InteropGetName`]), operands indented underneath. Backs `bas55`'s
/// `DISASM` command and `-d` debug output.
pub fn disassemble(code: &Code) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for (pc, cell) in code.cells.iter().enumerate() {
        match cell {
            Cell::Op(op) => {
                let raw = op.interop_name();
                let name = String::from_utf8_lossy(&raw[..raw.len() - 1]);
                let _ = writeln!(out, "{:>5}  {}", pc, name);
            }
            Cell::Id(id) => {
                let _ = writeln!(out, "{:>5}    .id {}", pc, id);
            }
            Cell::Num(n) => {
                let _ = writeln!(out, "{:>5}    .num {}", pc, n);
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn append_and_read_back() {
        let mut code = Code::new();
        let op_pos = code.add_op(Opcode::PushNum);
        code.add_num(42.0);
        assert_eq!(code.get(op_pos).as_op(), Some(Opcode::PushNum));
        assert_eq!(code.get(op_pos + 1).as_num(), Some(42.0));
    }

    #[test]
    fn set_id_patches_forward_reference() {
        let mut code = Code::new();
        let goto = code.add_op(Opcode::Goto);
        let target_pos = code.add_id(-1);
        code.set_id(target_pos, 99).unwrap();
        assert_eq!(code.get(goto).as_op(), Some(Opcode::Goto));
        assert_eq!(code.get(target_pos).as_id(), Some(99));
    }

    #[test]
    fn set_id_rejects_non_id_cell() {
        let mut code = Code::new();
        let op_pos = code.add_op(Opcode::End);
        assert!(code.set_id(op_pos, 5).is_err());
    }

    #[test]
    fn stack_delta_push_pop_shapes() {
        assert_eq!(Opcode::PushNum.stack_delta(), (1, 0));
        assert_eq!(Opcode::Add.stack_delta(), (0, -1));
        assert_eq!(Opcode::LetTable.stack_delta(), (0, -3));
    }

    #[test]
    fn ifun_id_roundtrip() {
        for f in Ifun::ALL {
            assert_eq!(Ifun::from_id(f.id()), Some(f));
        }
        assert_eq!(Ifun::Rnd.nparams(), 0);
        assert_eq!(Ifun::Sin.nparams(), 1);
    }

    #[test]
    fn opcode_mnemonic_roundtrips_through_interop_name() {
        let raw = Opcode::PushNum.interop_name();
        let name = std::str::from_utf8(&raw[..raw.len() - 1]).unwrap();
        assert_eq!(name, "PushNum");
        assert_eq!(Opcode::from_str(name).unwrap(), Opcode::PushNum);
    }

    #[test]
    fn disassemble_lists_opcodes_by_mnemonic() {
        let mut code = Code::new();
        code.add_op(Opcode::PushNum);
        code.add_num(42.0);
        code.add_op(Opcode::End);
        let listing = disassemble(&code);
        assert!(listing.contains("PushNum"));
        assert!(listing.contains(".num 42"));
        assert!(listing.contains("End"));
    }
}
