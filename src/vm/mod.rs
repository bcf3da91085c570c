//! The virtual machine: RAM, operand/gosub stacks, and the fetch-execute
//! loop over a compiled [`Code`] buffer. Transcribed from `vm.c`'s
//! `run()` and its per-opcode handler functions.

pub mod print;

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::arraydesc::ArrayDescs;
use crate::code::{Code, Ifun, Opcode};
use crate::datalex::{self, Elem, ParseAs};
use crate::datapool::{DataPool, DatumType};
use crate::error::{Diagnostic, Error};
use crate::numerics::{self, NumFlag, Rng};
use crate::strpool::StringPool;
use crate::MAX_STR_LEN;

/// A value living on the operand stack or in a RAM cell: either a number
/// or a string-pool index. Which variant a given slot holds is fixed for
/// the life of the program by the compiler's static typing, so the
/// accessors below trust that invariant rather than returning `Result`.
#[derive(Clone, Copy, Debug)]
enum Value {
    Num(f64),
    Str(usize),
}

impl Value {
    fn num(self) -> f64 {
        match self {
            Value::Num(n) => n,
            Value::Str(_) => unreachable!("compiler guarantees numeric slot"),
        }
    }

    fn str_index(self) -> usize {
        match self {
            Value::Str(i) => i,
            Value::Num(_) => unreachable!("compiler guarantees string slot"),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Num(0.0)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum InputPass {
    Validate,
    Commit,
}

struct InputState {
    pass: InputPass,
    text: String,
    cursor: usize,
    stack_floor: usize,
    start_pc: usize,
}

/// How the VM stopped running.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Outcome {
    /// Ran off the `END` statement normally.
    Ended,
    /// Stopped by a cooperative break request (Ctrl-C) between statements,
    /// carrying the line that was about to execute.
    Broken(i32),
}

fn round_half_away(x: f64) -> f64 {
    if x >= 0.0 {
        numerics::floor(x + 0.5)
    } else {
        -numerics::floor(-x + 0.5)
    }
}

/// Executes one compiled program. Borrows the artifacts a [`crate::compiler::Compiler`]
/// produced; owns only the transient state that is reset on every `RUN`
/// (ram, stacks, print column, the PRNG and the debug-mode tracking bitmaps).
pub struct Vm<'a> {
    code: &'a Code,
    strings: &'a mut StringPool,
    data: &'a mut DataPool,
    array_descs: &'a ArrayDescs,

    ram: Vec<Value>,
    stack: Vec<Value>,
    gosub_stack: Vec<usize>,
    gosub_capacity: usize,

    pc: usize,
    current_line: i32,
    print_column: usize,
    base_index: i32,
    debug: bool,

    assigned: Vec<bool>,
    warned: Vec<bool>,

    rng: Rng,
    input_state: Option<InputState>,
}

impl<'a> Vm<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        code: &'a Code,
        strings: &'a mut StringPool,
        data: &'a mut DataPool,
        array_descs: &'a ArrayDescs,
        ram_size: i32,
        string_var_ram_positions: &[i32],
        base_index: i32,
        gosub_capacity: usize,
        debug: bool,
    ) -> Self {
        let ram_size = ram_size.max(0) as usize;
        let mut ram = vec![Value::default(); ram_size];
        for &pos in string_var_ram_positions {
            if pos >= 0 {
                ram[pos as usize] = Value::Str(0);
            }
        }
        Vm {
            code,
            strings,
            data,
            array_descs,
            ram,
            stack: Vec::new(),
            gosub_stack: Vec::new(),
            gosub_capacity,
            pc: 0,
            current_line: 0,
            print_column: 0,
            base_index,
            debug,
            assigned: vec![false; ram_size],
            warned: vec![false; ram_size],
            rng: Rng::new(),
            input_state: None,
        }
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("compiler guarantees balanced stack")
    }

    fn pop_num(&mut self) -> f64 {
        self.pop().num()
    }

    fn pop_str(&mut self) -> usize {
        self.pop().str_index()
    }

    fn fetch_id(&mut self) -> i32 {
        let v = self.code.get(self.pc).as_id().expect("id operand");
        self.pc += 1;
        v
    }

    fn fetch_num(&mut self) -> f64 {
        let v = self.code.get(self.pc).as_num().expect("num operand");
        self.pc += 1;
        v
    }

    fn warn(&self, e: Error) {
        eprintln!("{}", Diagnostic::new(e, Some(self.current_line)));
    }

    /// Stores a new string value into a ram cell, maintaining the pool's
    /// refcounts: the incoming value gains an owner before the outgoing
    /// one loses one, so a self-assignment never transiently drops to
    /// zero.
    fn store_strvar(&mut self, rampos: usize, new_index: usize) {
        let old_index = self.ram[rampos].str_index();
        self.strings.inc_refcount(new_index);
        self.strings.dec_refcount(old_index);
        self.ram[rampos] = Value::Str(new_index);
        self.assigned[rampos] = true;
    }

    fn check_init_scalar(&mut self, rampos: usize) {
        if self.debug && !self.assigned[rampos] && !self.warned[rampos] {
            self.warn(Error::InitVar);
            self.warned[rampos] = true;
        }
    }

    fn check_init_array(&mut self, abs: usize) {
        if self.debug && !self.assigned[abs] && !self.warned[abs] {
            self.warn(Error::InitArray);
            self.warned[abs] = true;
        }
    }

    fn list_index(&self, letter_index1: i32, raw: f64) -> Result<usize, Error> {
        let desc = self.array_descs.get(letter_index1 as usize);
        let idx = round_half_away(raw) as i32 - self.base_index;
        if idx < 0 || idx >= desc.dim1 {
            return Err(Error::IndexRange);
        }
        Ok((desc.rampos + idx) as usize)
    }

    fn table_index(&self, letter_index1: i32, raw1: f64, raw2: f64) -> Result<usize, Error> {
        let desc = self.array_descs.get(letter_index1 as usize);
        let i1 = round_half_away(raw1) as i32 - self.base_index;
        let i2 = round_half_away(raw2) as i32 - self.base_index;
        if i1 < 0 || i1 >= desc.dim1 || i2 < 0 || i2 >= desc.dim2 {
            return Err(Error::IndexRange);
        }
        Ok((desc.rampos + i1 * desc.dim2 + i2) as usize)
    }

    fn read_num_datum(&mut self) -> Result<f64, Error> {
        let (datum_type, idx) = self.data.read().map_err(|_| Error::ReadOflow)?;
        if datum_type == DatumType::Quoted {
            return Err(Error::ReadStr);
        }
        let text = self.strings.get(idx).to_string();
        let (elem, _) = datalex::parse_data_elem(&text, ParseAs::AsIs);
        match elem {
            Elem::Num { value } => Ok(value.0),
            _ => Err(Error::ReadStr),
        }
    }

    fn read_str_datum(&mut self) -> Result<usize, Error> {
        let (_datum_type, idx) = self.data.read().map_err(|_| Error::ReadOflow)?;
        let text = self.strings.get(idx).to_string();
        if text.len() > MAX_STR_LEN {
            return Err(Error::DatumTooLong);
        }
        self.strings.intern(&text)
    }

    fn arith_overflow_check(&self, result: f64, a: f64, b: f64) -> bool {
        result.is_infinite() && a.is_finite() && b.is_finite()
    }

    fn call_ifun(&mut self, ifun: Ifun, arg: Option<f64>) -> Result<f64, Error> {
        match ifun {
            Ifun::Rnd => Ok(self.rng.next_f64()),
            Ifun::Abs => Ok(arg.unwrap().abs()),
            Ifun::Int => Ok(numerics::floor(arg.unwrap())),
            Ifun::Sgn => {
                let x = arg.unwrap();
                Ok(if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { 0.0 })
            }
            Ifun::Sin => Ok(self.flagged(numerics::sin(arg.unwrap()))?),
            Ifun::Cos => Ok(self.flagged(numerics::cos(arg.unwrap()))?),
            Ifun::Tan => Ok(self.flagged(numerics::tan(arg.unwrap()))?),
            Ifun::Atn => Ok(self.flagged(numerics::atan(arg.unwrap()))?),
            Ifun::Exp => Ok(self.flagged(numerics::exp(arg.unwrap()))?),
            Ifun::Log => Ok(self.flagged(numerics::log(arg.unwrap()))?),
            Ifun::Sqr => Ok(self.flagged(numerics::sqrt(arg.unwrap()))?),
        }
    }

    /// Turns a `(value, NumFlag)` pair from `numerics` into the value the
    /// VM keeps executing with, warning or failing per the flag.
    fn flagged(&self, pair: (f64, NumFlag)) -> Result<f64, Error> {
        match pair.1 {
            NumFlag::None => Ok(pair.0),
            NumFlag::Range => {
                self.warn(Error::OpOverflow);
                Ok(pair.0)
            }
            NumFlag::Domain => Err(Error::Dom),
        }
    }

    fn prompt_and_read(&mut self, out: &mut dyn Write, input: &mut dyn BufRead) -> Result<String, Error> {
        let _ = out.write_all(b"? ");
        let _ = out.flush();
        let mut line = String::new();
        let n = input.read_line(&mut line).map_err(|_| Error::VoidInput)?;
        if n == 0 {
            return Err(Error::VoidInput);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Runs until `END`, a fatal error, or a cooperative break. Returns
    /// the located diagnostic on a fatal error.
    pub fn run(
        &mut self,
        out: &mut dyn Write,
        input: &mut dyn BufRead,
        break_flag: Option<&AtomicBool>,
    ) -> Result<Outcome, Diagnostic> {
        loop {
            if let Some(flag) = break_flag {
                if flag.load(Ordering::Relaxed) {
                    return Ok(Outcome::Broken(self.current_line));
                }
            }

            let op = self
                .code
                .get(self.pc)
                .as_op()
                .expect("pc always lands on an opcode");
            self.pc += 1;

            match self.step(op, out, input) {
                Ok(true) => return Ok(Outcome::Ended),
                Ok(false) => {}
                Err(e) => return Err(Diagnostic::new(e, Some(self.current_line))),
            }
        }
    }

    /// Executes one opcode (its operands included). Returns `Ok(true)`
    /// when the program has reached `END`.
    fn step(&mut self, op: Opcode, out: &mut dyn Write, input: &mut dyn BufRead) -> Result<bool, Error> {
        use Opcode::*;
        match op {
            PushNum => {
                let n = self.fetch_num();
                self.push(Value::Num(n));
            }
            PushStr => {
                let idx = self.fetch_id() as usize;
                self.push(Value::Str(idx));
            }
            PrintNl => {
                let _ = out.write_all(b"\n");
                self.print_column = 0;
            }
            PrintComma => {
                let (new_col, wrapped) = print::comma_advance(self.print_column);
                if wrapped {
                    let _ = out.write_all(b"\n");
                    self.print_column = 0;
                } else {
                    let n = new_col - self.print_column;
                    let _ = out.write_all(" ".repeat(n).as_bytes());
                    self.print_column = new_col;
                }
            }
            PrintTab => {
                let raw = self.pop_num();
                let n = round_half_away(raw) as i32;
                if n <= 0 {
                    self.warn(Error::InvalTab);
                }
                let target = print::tab_target_column(n);
                if target < self.print_column {
                    let _ = out.write_all(b"\n");
                    self.print_column = 0;
                }
                if target > self.print_column {
                    let _ = out.write_all(" ".repeat(target - self.print_column).as_bytes());
                    self.print_column = target;
                }
            }
            PrintNum => {
                let n = self.pop_num();
                let s = print::sprint_num(n);
                let _ = out.write_all(s.as_bytes());
                self.print_column += s.chars().count();
            }
            PrintStr => {
                let idx = self.pop_str();
                let s = self.strings.get(idx).to_string();
                self.print_wrapped(out, &s);
            }
            LetVar => {
                let rampos = self.fetch_id() as usize;
                let v = self.pop_num();
                if !self.mid_input_validate() {
                    self.ram[rampos] = Value::Num(v);
                    self.assigned[rampos] = true;
                }
            }
            LetStrvar => {
                let rampos = self.fetch_id() as usize;
                let idx = self.pop_str();
                if !self.mid_input_validate() {
                    self.store_strvar(rampos, idx);
                }
            }
            LetList => {
                let letter = self.fetch_id();
                let v = self.pop_num();
                let raw = self.pop_num();
                if !self.mid_input_validate() {
                    let abs = self.list_index(letter, raw)?;
                    self.ram[abs] = Value::Num(v);
                    self.assigned[abs] = true;
                }
            }
            LetTable => {
                let letter = self.fetch_id();
                let v = self.pop_num();
                let raw2 = self.pop_num();
                let raw1 = self.pop_num();
                if !self.mid_input_validate() {
                    let abs = self.table_index(letter, raw1, raw2)?;
                    self.ram[abs] = Value::Num(v);
                    self.assigned[abs] = true;
                }
            }
            GetVar => {
                let rampos = self.fetch_id() as usize;
                self.check_init_scalar(rampos);
                self.push(Value::Num(self.ram[rampos].num()));
            }
            GetStrvar => {
                let rampos = self.fetch_id() as usize;
                self.push(Value::Str(self.ram[rampos].str_index()));
            }
            GetList => {
                let letter = self.fetch_id();
                let raw = self.pop_num();
                let abs = self.list_index(letter, raw)?;
                self.check_init_array(abs);
                self.push(Value::Num(self.ram[abs].num()));
            }
            GetTable => {
                let letter = self.fetch_id();
                let raw2 = self.pop_num();
                let raw1 = self.pop_num();
                let abs = self.table_index(letter, raw1, raw2)?;
                self.check_init_array(abs);
                self.push(Value::Num(self.ram[abs].num()));
            }
            Add => {
                let b = self.pop_num();
                let a = self.pop_num();
                let r = a + b;
                if self.arith_overflow_check(r, a, b) {
                    self.warn(Error::OpOverflow);
                }
                self.push(Value::Num(r));
            }
            Sub => {
                let b = self.pop_num();
                let a = self.pop_num();
                let r = a - b;
                if self.arith_overflow_check(r, a, b) {
                    self.warn(Error::OpOverflow);
                }
                self.push(Value::Num(r));
            }
            Mul => {
                let b = self.pop_num();
                let a = self.pop_num();
                let r = a * b;
                if self.arith_overflow_check(r, a, b) {
                    self.warn(Error::OpOverflow);
                }
                self.push(Value::Num(r));
            }
            Div => {
                let b = self.pop_num();
                let a = self.pop_num();
                if b == 0.0 {
                    self.warn(Error::DivByZero);
                    let r = if a == 0.0 {
                        f64::NAN
                    } else if (a > 0.0) == (b.is_sign_positive()) {
                        f64::INFINITY
                    } else {
                        f64::NEG_INFINITY
                    };
                    self.push(Value::Num(r));
                } else {
                    let r = a / b;
                    if r.is_infinite() {
                        self.warn(Error::OpOverflow);
                    }
                    self.push(Value::Num(r));
                }
            }
            Pow => {
                let y = self.pop_num();
                let x = self.pop_num();
                let (r, flag) = numerics::pow(x, y);
                match flag {
                    NumFlag::None => self.push(Value::Num(r)),
                    NumFlag::Domain => return Err(Error::NegPowReal),
                    NumFlag::Range => {
                        self.warn(if x == 0.0 { Error::ZeroPowNeg } else { Error::OpOverflow });
                        self.push(Value::Num(r));
                    }
                }
            }
            Neg => {
                let a = self.pop_num();
                self.push(Value::Num(-a));
            }
            Line => {
                self.current_line = self.fetch_id();
            }
            Gosub => {
                let target = self.fetch_id() as usize;
                if self.gosub_stack.len() >= self.gosub_capacity {
                    return Err(Error::StackOflow);
                }
                self.gosub_stack.push(self.pc);
                self.pc = target;
            }
            Return => {
                self.pc = self.gosub_stack.pop().ok_or(Error::StackUflow)?;
            }
            Goto => {
                self.pc = self.fetch_id() as usize;
            }
            OnGoto => {
                let count = self.fetch_id();
                let raw = self.pop_num();
                let n = round_half_away(raw) as i32;
                let targets_start = self.pc;
                self.pc += count as usize;
                if n < 1 || n > count {
                    return Err(Error::IndexRange);
                }
                let target = self
                    .code
                    .get(targets_start + (n - 1) as usize)
                    .as_id()
                    .expect("ON GOTO target");
                self.pc = target as usize;
            }
            GotoIfTrue => {
                let target = self.fetch_id() as usize;
                let cond = self.pop_num();
                if cond != 0.0 {
                    self.pc = target;
                }
            }
            Less => self.compare(|a, b| a < b),
            Greater => self.compare(|a, b| a > b),
            LessEq => self.compare(|a, b| a <= b),
            GreaterEq => self.compare(|a, b| a >= b),
            Eq => self.compare(|a, b| a == b),
            NotEq => self.compare(|a, b| a != b),
            EqStr => self.compare_str(|a, b| a == b),
            NotEqStr => self.compare_str(|a, b| a != b),
            For => {
                let limit_rampos = self.fetch_id() as usize;
                let step_rampos = self.fetch_id() as usize;
                let var_rampos = self.fetch_id() as usize;
                let step = self.pop_num();
                let limit = self.pop_num();
                let start = self.pop_num();
                self.ram[step_rampos] = Value::Num(step);
                self.ram[limit_rampos] = Value::Num(limit);
                self.ram[var_rampos] = Value::Num(start);
                self.assigned[var_rampos] = true;
            }
            ForCmp => {
                let cmp_pc = self.pc - 1;
                let limit_rampos = self.code.get(cmp_pc - 3).as_id().unwrap() as usize;
                let step_rampos = self.code.get(cmp_pc - 2).as_id().unwrap() as usize;
                let var_rampos = self.code.get(cmp_pc - 1).as_id().unwrap() as usize;
                let exit_target = self.fetch_id() as usize;
                let var = self.ram[var_rampos].num();
                let limit = self.ram[limit_rampos].num();
                let step = self.ram[step_rampos].num();
                let in_range = if step >= 0.0 { var <= limit } else { var >= limit };
                if !in_range {
                    self.pc = exit_target;
                }
            }
            Next => {
                let cmp_pc = self.fetch_id() as usize;
                let limit_rampos = self.code.get(cmp_pc - 3).as_id().unwrap() as usize;
                let step_rampos = self.code.get(cmp_pc - 2).as_id().unwrap() as usize;
                let var_rampos = self.code.get(cmp_pc - 1).as_id().unwrap() as usize;
                let step = self.ram[step_rampos].num();
                let r = self.ram[var_rampos].num() + step;
                if self.arith_overflow_check(r, self.ram[var_rampos].num(), step) {
                    self.warn(Error::OpOverflow);
                }
                self.ram[var_rampos] = Value::Num(r);
                self.pc = cmp_pc;
            }
            Restore => self.data.restore(),
            ReadVar => {
                let rampos = self.fetch_id() as usize;
                let v = self.read_num_datum()?;
                self.ram[rampos] = Value::Num(v);
                self.assigned[rampos] = true;
            }
            ReadList => {
                let letter = self.fetch_id();
                let raw = self.pop_num();
                let v = self.read_num_datum()?;
                let abs = self.list_index(letter, raw)?;
                self.ram[abs] = Value::Num(v);
                self.assigned[abs] = true;
            }
            ReadTable => {
                let letter = self.fetch_id();
                let raw2 = self.pop_num();
                let raw1 = self.pop_num();
                let v = self.read_num_datum()?;
                let abs = self.table_index(letter, raw1, raw2)?;
                self.ram[abs] = Value::Num(v);
                self.assigned[abs] = true;
            }
            ReadStrvar => {
                let rampos = self.fetch_id() as usize;
                let idx = self.read_str_datum()?;
                self.store_strvar(rampos, idx);
            }
            Ifun0 => {
                let id = self.fetch_id();
                let f = Ifun::from_id(id).expect("known ifun id");
                let r = self.call_ifun(f, None)?;
                self.push(Value::Num(r));
            }
            Ifun1 => {
                let id = self.fetch_id();
                let f = Ifun::from_id(id).expect("known ifun id");
                let arg = self.pop_num();
                let r = self.call_ifun(f, Some(arg))?;
                self.push(Value::Num(r));
            }
            Randomize => {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as u32)
                    .unwrap_or(0);
                self.rng.seed(numerics::thomas_wang_mix(secs));
            }
            Input => {
                let start_pc = self.pc;
                let text = self.prompt_and_read(out, input)?;
                self.input_state = Some(InputState {
                    pass: InputPass::Validate,
                    text,
                    cursor: 0,
                    stack_floor: self.stack.len(),
                    start_pc,
                });
            }
            InputNum => self.input_num_item(out, input)?,
            InputStr => self.input_str_item(out, input)?,
            InputList | InputTable => {
                // The index expression(s) and the pushed value are already
                // on the stack (from the opcodes preceding this one); the
                // commit/validate split happens on whether we store.
                let letter = self.fetch_id();
                let validate = self.mid_input_validate();
                if op == InputTable {
                    let v = self.pop_num();
                    let raw2 = self.pop_num();
                    let raw1 = self.pop_num();
                    if !validate {
                        let abs = self.table_index(letter, raw1, raw2)?;
                        self.ram[abs] = Value::Num(v);
                        self.assigned[abs] = true;
                    }
                } else {
                    let v = self.pop_num();
                    let raw = self.pop_num();
                    if !validate {
                        let abs = self.list_index(letter, raw)?;
                        self.ram[abs] = Value::Num(v);
                        self.assigned[abs] = true;
                    }
                }
            }
            InputEnd => self.input_end(out, input)?,
            CheckInitVar => {
                let rampos = self.fetch_id() as usize;
                self.check_init_scalar(rampos);
            }
            SetInitVar => {
                let rampos = self.fetch_id() as usize;
                self.assigned[rampos] = true;
            }
            End => return Ok(true),
        }
        Ok(false)
    }

    fn compare(&mut self, f: impl Fn(f64, f64) -> bool) {
        let b = self.pop_num();
        let a = self.pop_num();
        self.push(Value::Num(if f(a, b) { 1.0 } else { 0.0 }));
    }

    fn compare_str(&mut self, f: impl Fn(&str, &str) -> bool) {
        let b = self.pop_str();
        let a = self.pop_str();
        let eq = f(self.strings.get(a), self.strings.get(b));
        self.push(Value::Num(if eq { 1.0 } else { 0.0 }));
    }

    fn print_wrapped(&mut self, out: &mut dyn Write, s: &str) {
        let margin = print::PRINT_MARGIN;
        let mut text = s;
        if self.print_column + text.len() > margin {
            let _ = out.write_all(b"\n");
            self.print_column = 0;
        }
        while self.print_column + text.len() > margin {
            let n = margin - self.print_column;
            let (chunk, rest) = text.split_at(n);
            let _ = out.write_all(chunk.as_bytes());
            text = rest;
            self.print_column = 0;
        }
        if !text.is_empty() {
            let _ = out.write_all(text.as_bytes());
            self.print_column += text.len();
        }
    }

    fn mid_input_validate(&self) -> bool {
        matches!(self.input_state, Some(InputState { pass: InputPass::Validate, .. }))
    }

    /// Parses the next token from the current INPUT line at `cursor`, also
    /// swallowing one following comma separator. Returns the consumed
    /// element and leaves `cursor` advanced past it (and the comma, if
    /// any).
    fn next_input_token<'b>(text: &'b str, cursor: &mut usize, parse_as: ParseAs) -> Elem<'b> {
        let (elem, consumed) = datalex::parse_data_elem(&text[*cursor..], parse_as);
        *cursor += consumed;
        if !matches!(elem, Elem::Comma) {
            let (next, next_consumed) = datalex::parse_data_elem(&text[*cursor..], ParseAs::AsIs);
            if matches!(next, Elem::Comma) {
                *cursor += next_consumed;
            }
        }
        elem
    }

    fn input_num_item(&mut self, out: &mut dyn Write, input: &mut dyn BufRead) -> Result<(), Error> {
        let st = self.input_state.as_ref().expect("InputNum outside INPUT");
        let text = st.text.clone();
        let mut cursor = st.cursor;
        let elem = Self::next_input_token(&text, &mut cursor, ParseAs::AsIs);
        match elem {
            Elem::Num { value } if value.0.is_finite() => {
                self.input_state.as_mut().unwrap().cursor = cursor;
                let commit = matches!(self.input_state.as_ref().unwrap().pass, InputPass::Commit);
                self.push(Value::Num(if commit { value.0 } else { 0.0 }));
                Ok(())
            }
            Elem::Num { .. } => self.retry_input(out, input, Error::ConstOverflow),
            _ => self.retry_input(out, input, Error::TooFewInput),
        }
    }

    fn input_str_item(&mut self, out: &mut dyn Write, input: &mut dyn BufRead) -> Result<(), Error> {
        let st = self.input_state.as_ref().expect("InputStr outside INPUT");
        let line = st.text.clone();
        let mut cursor = st.cursor;
        let elem = Self::next_input_token(&line, &mut cursor, ParseAs::AsUnquotedStr);
        let text = match elem {
            Elem::QuotedStr { text, .. } => text.to_string(),
            Elem::UnquotedStr { text } => text.to_string(),
            Elem::Eof => return self.retry_input(out, input, Error::TooFewInput),
            _ => return self.retry_input(out, input, Error::TooFewInput),
        };
        if text.len() > MAX_STR_LEN {
            return Err(Error::DatumTooLong);
        }
        self.input_state.as_mut().unwrap().cursor = cursor;
        let commit = matches!(self.input_state.as_ref().unwrap().pass, InputPass::Commit);
        if commit {
            let idx = self.strings.intern(&text)?;
            self.push(Value::Str(idx));
        } else {
            self.push(Value::Str(0));
        }
        Ok(())
    }

    fn input_end(&mut self, out: &mut dyn Write, input: &mut dyn BufRead) -> Result<(), Error> {
        let st = self.input_state.as_ref().expect("InputEnd outside INPUT");
        let pass = st.pass;
        let remaining = st.text[st.cursor..].to_string();
        let start_pc = st.start_pc;
        let floor = st.stack_floor;

        match pass {
            InputPass::Validate => {
                let (trailing, _) = datalex::parse_data_elem(&remaining, ParseAs::AsIs);
                if !matches!(trailing, Elem::Eof) {
                    return self.retry_input(out, input, Error::TooMuchInput);
                }
                self.stack.truncate(floor);
                let st = self.input_state.as_mut().unwrap();
                st.pass = InputPass::Commit;
                st.cursor = 0;
                self.pc = start_pc;
            }
            InputPass::Commit => {
                self.input_state = None;
            }
        }
        Ok(())
    }

    fn retry_input(&mut self, out: &mut dyn Write, input: &mut dyn BufRead, err: Error) -> Result<(), Error> {
        self.warn(err);
        let floor = self.input_state.as_ref().unwrap().stack_floor;
        self.stack.truncate(floor);
        let start_pc = self.input_state.as_ref().unwrap().start_pc;
        let text = self.prompt_and_read(out, input)?;
        let st = self.input_state.as_mut().unwrap();
        st.pass = InputPass::Validate;
        st.text = text;
        st.cursor = 0;
        self.pc = start_pc;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::{Cell, Code, Opcode};
    use crate::compiler::Compiler;

    fn run_code(code: Code, ram_size: i32) -> (String, Outcome) {
        let mut strings = StringPool::new();
        strings.mark_constants();
        strings.reset();
        let mut data = DataPool::new();
        let array_descs = ArrayDescs::new();
        let mut vm = Vm::new(&code, &mut strings, &mut data, &array_descs, ram_size, &[], 0, 256, false);
        let mut out = Vec::new();
        let mut input = std::io::empty();
        let outcome = vm.run(&mut out, &mut input, None).expect("no fatal error");
        (String::from_utf8(out).unwrap(), outcome)
    }

    #[test]
    fn prints_a_number_and_ends() {
        let mut code = Code::new();
        code.add_op(Opcode::PushNum);
        code.add_num(42.0);
        code.add_op(Opcode::PrintNum);
        code.add_op(Opcode::PrintNl);
        code.add_op(Opcode::End);
        let (out, outcome) = run_code(code, 4);
        assert_eq!(out, " 42 \n");
        assert_eq!(outcome, Outcome::Ended);
    }

    #[test]
    fn let_and_get_roundtrip_through_ram() {
        let mut code = Code::new();
        code.add_op(Opcode::PushNum);
        code.add_num(7.0);
        code.add_op(Opcode::LetVar);
        code.add_id(0);
        code.add_op(Opcode::GetVar);
        code.add_id(0);
        code.add_op(Opcode::PrintNum);
        code.add_op(Opcode::End);
        let (out, _) = run_code(code, 1);
        assert_eq!(out, " 7 ");
    }

    #[test]
    fn division_by_zero_warns_and_produces_infinity() {
        let mut code = Code::new();
        code.add_op(Opcode::PushNum);
        code.add_num(1.0);
        code.add_op(Opcode::PushNum);
        code.add_num(0.0);
        code.add_op(Opcode::Div);
        code.add_op(Opcode::PrintNum);
        code.add_op(Opcode::End);
        let (out, outcome) = run_code(code, 0);
        assert_eq!(out, " INF ");
        assert_eq!(outcome, Outcome::Ended);
    }

    #[test]
    fn on_goto_selects_the_nth_target() {
        let mut code = Code::new();
        code.add_op(Opcode::PushNum);
        code.add_num(2.0);
        code.add_op(Opcode::OnGoto);
        code.add_id(2);
        let patch_a = code.add_id(0);
        let patch_b = code.add_id(0);
        code.add_op(Opcode::PushNum);
        code.add_num(1.0);
        code.add_op(Opcode::PrintNum); // skipped: target is the second entry
        code.set_id(patch_a, code.len() as i32).unwrap();
        let target_b = code.len();
        code.set_id(patch_b, target_b as i32).unwrap();
        code.add_op(Opcode::PushNum);
        code.add_num(9.0);
        code.add_op(Opcode::PrintNum);
        code.add_op(Opcode::End);
        let (out, _) = run_code(code, 0);
        assert_eq!(out, " 9 ");
    }

    #[test]
    fn on_goto_out_of_range_index_is_fatal() {
        let mut code = Code::new();
        code.add_op(Opcode::PushNum);
        code.add_num(5.0);
        code.add_op(Opcode::OnGoto);
        code.add_id(2);
        code.add_id(0);
        code.add_id(0);
        code.add_op(Opcode::End);

        let mut strings = StringPool::new();
        strings.mark_constants();
        strings.reset();
        let mut data = DataPool::new();
        let array_descs = ArrayDescs::new();
        let mut vm = Vm::new(&code, &mut strings, &mut data, &array_descs, 0, &[], 0, 256, false);
        let mut out = Vec::new();
        let mut input = std::io::empty();
        let err = vm.run(&mut out, &mut input, None).unwrap_err();
        assert_eq!(err.error, Error::IndexRange);
    }

    #[test]
    fn goto_if_true_branches() {
        let mut code = Code::new();
        code.add_op(Opcode::PushNum);
        code.add_num(1.0);
        code.add_op(Opcode::GotoIfTrue);
        let patch = code.add_id(0);
        code.add_op(Opcode::PushNum);
        code.add_num(1.0);
        code.add_op(Opcode::PrintNum); // skipped
        let target = code.len();
        code.set_id(patch, target as i32).unwrap();
        code.add_op(Opcode::PushNum);
        code.add_num(9.0);
        code.add_op(Opcode::PrintNum);
        code.add_op(Opcode::End);
        let (out, _) = run_code(code, 0);
        assert_eq!(out, " 9 ");
    }

    #[test]
    fn for_next_loop_sums_to_ten() {
        // Equivalent to: FOR I=1 TO 4: S=S+I: NEXT I: PRINT S: END (I at
        // rampos 0, S at rampos 1, FOR's own limit/step cells at 2,3).
        let mut c = Compiler::new();
        c.declare_lines(&[10]);
        c.begin_line(10);
        let i = crate::codedvar::CodedVar::bare(b'I');
        let s = crate::codedvar::CodedVar::bare(b'S');
        c.numvar_declared(s, crate::compiler::VarType::Num);
        c.add_op(Opcode::PushNum);
        c.add_num(1.0);
        c.add_op(Opcode::PushNum);
        c.add_num(4.0);
        c.add_op(Opcode::PushNum);
        c.add_num(1.0);
        c.for_decl(i);
        c.numvar_expr(s);
        c.numvar_expr(i);
        c.add_op(Opcode::Add);
        c.add_op(Opcode::LetVar);
        let spos = c.rampos_of(s);
        c.add_id(spos);
        c.next_decl(i);
        c.numvar_expr(s);
        c.add_op(Opcode::PrintNum);
        c.end_decl();
        c.end_parsing();
        assert!(c.errors.is_empty(), "{:?}", c.errors);

        let (out, _) = run_code(c.code, c.ram_size());
        assert_eq!(out, " 10 ");
    }

    #[test]
    fn input_commits_only_after_full_line_validates() {
        let mut code = Code::new();
        code.add_op(Opcode::Input);
        code.add_op(Opcode::InputNum);
        code.add_op(Opcode::LetVar);
        code.add_id(0);
        code.add_op(Opcode::InputEnd);
        code.add_op(Opcode::GetVar);
        code.add_id(0);
        code.add_op(Opcode::PrintNum);
        code.add_op(Opcode::End);

        let mut strings = StringPool::new();
        strings.mark_constants();
        strings.reset();
        let mut data = DataPool::new();
        let array_descs = ArrayDescs::new();
        let mut vm = Vm::new(&code, &mut strings, &mut data, &array_descs, 1, &[], 0, 256, false);
        let mut out = Vec::new();
        let mut input = std::io::Cursor::new(b"123\n".to_vec());
        let outcome = vm.run(&mut out, &mut input, None).expect("no fatal error");
        assert_eq!(outcome, Outcome::Ended);
        assert_eq!(String::from_utf8(out).unwrap(), "? 123 ");
    }

    #[test]
    fn break_flag_stops_the_loop_with_the_current_line() {
        let mut code = Code::new();
        code.add_op(Opcode::Line);
        code.add_id(10);
        code.add_op(Opcode::PushNum);
        code.add_num(1.0);
        code.add_op(Opcode::PrintNum);
        code.add_op(Opcode::End);

        let mut strings = StringPool::new();
        strings.mark_constants();
        strings.reset();
        let mut data = DataPool::new();
        let array_descs = ArrayDescs::new();
        let mut vm = Vm::new(&code, &mut strings, &mut data, &array_descs, 0, &[], 0, 256, false);
        let flag = AtomicBool::new(true);
        let mut out = Vec::new();
        let mut input = std::io::empty();
        let outcome = vm.run(&mut out, &mut input, Some(&flag)).unwrap();
        assert_eq!(outcome, Outcome::Broken(0));
        assert!(out.is_empty());
    }
}
