//! The bytecode compiler: one pass over each program line, driven by the
//! front-end grammar. Transcribed from `parse.c`; the `basrt` crate's
//! grammar actions call these entry points in the same order `parse.c`'s
//! own semantic actions did.

use std::collections::HashMap;

use crate::arraydesc::ArrayDescs;
use crate::code::{Code, Opcode};
use crate::codedvar::CodedVar;
use crate::datapool::DatumType;
use crate::error::Error;
use crate::strpool::StringPool;
use crate::{N_SUBVARS, N_VARNAMES};

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum VarType {
    Undef,
    Num,
    List,
    Table,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PstackType {
    Num,
    Str,
}

/// Bookkeeping for a single user function (`DEF FNx`), enough to emit a
/// `GOSUB`/`GET_FN_VAR` pair at each call site and validate arity.
struct UsrFun {
    name: u8,
    nparams: u8,
    param: CodedVar,
    pc: usize,
    vrampos: i32,
    stack_inc: i32,
    stack_dec: i32,
}

/// One FOR/NEXT nesting level, tracked so that jumps into the middle of a
/// loop body (skipping its FOR) can be rejected after compilation.
struct ForBlock {
    coded_var: Option<CodedVar>,
    cmp_pc: usize,
    start_line: i32,
    end_line: i32,
    parent: Option<usize>,
}

struct LinePc {
    line_num: i32,
    pc: Option<usize>,
}

struct LineRef {
    target_line: i32,
    patch_pc: usize,
}

struct Jump {
    from_line: i32,
    to_line: i32,
}

/// Drives one compilation: accumulates bytecode, ram layout, and the full
/// set of compile-time diagnostics (errors and warnings) for a program.
pub struct Compiler {
    pub code: Code,
    pub strings: StringPool,
    pub array_descs: ArrayDescs,
    pub errors: Vec<Error>,

    vartype: [[VarType; N_SUBVARS]; N_VARNAMES],
    vardim: [[i32; 2]; N_VARNAMES],
    dimensioned: [bool; N_VARNAMES],
    rampos: [[i32; N_SUBVARS]; N_VARNAMES],
    ramsize: i32,

    option_declared: bool,
    base_index: i32,
    array_access: bool,

    line_pc: Vec<LinePc>,
    line_refs: Vec<LineRef>,
    jumps: Vec<Jump>,

    usrfuns: Vec<UsrFun>,
    in_fun_def: bool,
    cur_fun: Option<usize>,

    blocks: Vec<ForBlock>,
    cur_block: usize,

    cur_line_num: i32,
    end_seen: bool,
    stack_size: i32,
    stack_max: i32,
}

const MAIN_BLOCK: usize = 0;

impl Compiler {
    pub fn new() -> Self {
        let mut blocks = Vec::new();
        blocks.push(ForBlock {
            coded_var: None,
            cmp_pc: 0,
            start_line: 1,
            end_line: 1,
            parent: None,
        });

        Compiler {
            code: Code::new(),
            strings: StringPool::new(),
            array_descs: ArrayDescs::new(),
            errors: Vec::new(),
            vartype: [[VarType::Undef; N_SUBVARS]; N_VARNAMES],
            vardim: [[11, 11]; N_VARNAMES],
            dimensioned: [false; N_VARNAMES],
            rampos: [[-1; N_SUBVARS]; N_VARNAMES],
            ramsize: 0,
            option_declared: false,
            base_index: 0,
            array_access: false,
            line_pc: Vec::new(),
            line_refs: Vec::new(),
            jumps: Vec::new(),
            usrfuns: Vec::new(),
            in_fun_def: false,
            cur_fun: None,
            blocks,
            cur_block: MAIN_BLOCK,
            cur_line_num: 0,
            end_seen: false,
            stack_size: 0,
            stack_max: 0,
        }
    }

    /// Registers the full set of source line numbers up front, so forward
    /// references can be resolved by binary search regardless of the
    /// order lines are compiled in.
    pub fn declare_lines(&mut self, line_nums: &[i32]) {
        self.line_pc = line_nums
            .iter()
            .map(|&n| LinePc { line_num: n, pc: None })
            .collect();
    }

    fn find_line(&self, line_num: i32) -> Option<usize> {
        self.line_pc.iter().position(|lp| lp.line_num == line_num)
    }

    fn push_error(&mut self, e: Error) {
        self.errors.push(e);
    }

    fn add_to_stack_size(&mut self, delta: i32) {
        if self.in_fun_def {
            if let Some(idx) = self.cur_fun {
                let f = &mut self.usrfuns[idx];
                if delta > 0 {
                    f.stack_inc += delta;
                } else if delta < 0 {
                    f.stack_dec += delta;
                }
                return;
            }
        }
        self.stack_size += delta;
        if self.stack_size > self.stack_max {
            self.stack_max = self.stack_size;
        }
    }

    pub fn add_op(&mut self, op: Opcode) {
        self.code.add_op(op);
        let (inc, dec) = op.stack_delta();
        self.add_to_stack_size(inc);
        self.add_to_stack_size(dec);
    }

    pub fn add_id(&mut self, id: i32) -> usize {
        self.code.add_id(id)
    }

    pub fn add_num(&mut self, num: f64) {
        self.code.add_num(num);
    }

    /// Begins compiling a new source line: emits the `LINE` marker and
    /// resets per-line function-definition state.
    pub fn begin_line(&mut self, num: i32) {
        self.in_fun_def = false;
        self.cur_fun = None;
        self.cur_line_num = num;
        if let Some(slot) = self.line_pc.iter_mut().find(|lp| lp.line_num == num) {
            slot.pc = Some(self.code.len());
        }
        self.add_op(Opcode::Line);
        self.add_id(num);
        if self.end_seen {
            self.push_error(Error::LinesAfterEnd);
        }
    }

    fn ram_too_big(size: i64) -> bool {
        size > i32::MAX as i64 / 2
    }

    fn adjust_dimension(&mut self, max_idx: i32) -> i32 {
        if max_idx == i32::MAX && self.base_index == 0 {
            self.push_error(Error::BigArray);
            return i32::MAX;
        }
        let size = (max_idx - self.base_index + 1) as i64;
        if Self::ram_too_big(size) {
            self.push_error(Error::BigArray);
            return i32::MAX;
        }
        size as i32
    }

    fn ram_exhausted(&mut self) {
        self.ramsize = i32::MAX;
        self.push_error(Error::BigRam);
    }

    fn add_size_to_ram(&mut self, len: i32) {
        let sum = self.ramsize as i64 + len as i64;
        if Self::ram_too_big(sum) {
            self.ram_exhausted();
        } else {
            self.ramsize = sum as i32;
        }
    }

    fn add_table_size_to_ram(&mut self, len1: i32, len2: i32) {
        let product = len1 as i64 * len2 as i64;
        if Self::ram_too_big(product) {
            self.ram_exhausted();
        } else {
            self.add_size_to_ram(product as i32);
        }
    }

    /// Declares a scalar/list/table numeric variable use, allocating ram
    /// and an array descriptor the first time it is seen, or checking
    /// type consistency on every subsequent use.
    pub fn numvar_declared(&mut self, coded_var: CodedVar, var_type: VarType) {
        if coded_var.is_numvar_with_digit() && var_type != VarType::Num {
            self.push_error(Error::NumvarArray);
            return;
        }

        let i1 = coded_var.index1();
        let i2 = coded_var.index2();
        if self.vartype[i1][i2] == VarType::Undef {
            self.vartype[i1][i2] = var_type;
            self.rampos[i1][i2] = self.ramsize;
            match var_type {
                VarType::List => {
                    self.dimensioned[i1] = true;
                    self.array_access = true;
                    let dim1 = self.vardim[i1][0];
                    self.array_descs.set(i1, self.ramsize, dim1, 0);
                    self.add_size_to_ram(dim1);
                }
                VarType::Table => {
                    self.dimensioned[i1] = true;
                    self.array_access = true;
                    let (dim1, dim2) = (self.vardim[i1][0], self.vardim[i1][1]);
                    self.array_descs.set(i1, self.ramsize, dim1, dim2);
                    self.add_table_size_to_ram(dim1, dim2);
                }
                _ => self.add_size_to_ram(1),
            }
            return;
        }

        if self.vartype[i1][i2] != var_type {
            self.push_error(Error::TypeMismatch);
        }
    }

    /// `DIM` statement for one variable: validates the declared bounds
    /// and allocates ram for the array (a repeat `DIM` after first use
    /// is a `DUP_DIM` error).
    pub fn numvar_dimensioned(
        &mut self,
        coded_var: CodedVar,
        var_type: VarType,
        max_idx1: i32,
        max_idx2: i32,
    ) {
        let rampos = self.ramsize;
        if coded_var.is_numvar_with_digit() && var_type != VarType::Num {
            self.push_error(Error::NumvarArray);
            return;
        }

        let mut max_idx1 = max_idx1;
        if max_idx1 < self.base_index {
            self.push_error(Error::InvalDim);
            max_idx1 = self.base_index;
        }
        let mut max_idx2 = max_idx2;
        if var_type == VarType::Table && max_idx2 < self.base_index {
            self.push_error(Error::InvalDim);
            max_idx2 = self.base_index;
        }

        let i1 = coded_var.index1();
        let i2 = coded_var.index2();
        if self.vartype[i1][i2] == VarType::Undef {
            self.vartype[i1][i2] = var_type;
            self.dimensioned[i1] = true;
            self.array_access = true;
            self.rampos[i1][i2] = rampos;
            self.vardim[i1][0] = self.adjust_dimension(max_idx1);
            if var_type == VarType::List {
                self.array_descs.set(i1, rampos, self.vardim[i1][0], 0);
                let dim1 = self.vardim[i1][0];
                self.add_size_to_ram(dim1);
            } else if var_type == VarType::Table {
                self.vardim[i1][1] = self.adjust_dimension(max_idx2);
                let (dim1, dim2) = (self.vardim[i1][0], self.vardim[i1][1]);
                self.array_descs.set(i1, rampos, dim1, dim2);
                self.add_table_size_to_ram(dim1, dim2);
            }
            return;
        }

        if self.vartype[i1][i2] != var_type {
            self.push_error(Error::TypeMismatch);
            return;
        }
        if self.dimensioned[i1] {
            self.push_error(Error::DupDim);
        }
    }

    pub fn rampos_of(&self, coded_var: CodedVar) -> i32 {
        self.rampos[coded_var.index1()][coded_var.index2()]
    }

    /// `OPTION BASE n` — legal only once, and only before any array has
    /// been accessed or dimensioned.
    pub fn option_decl(&mut self, n: i32) {
        if self.option_declared {
            self.push_error(Error::DupOption);
            return;
        }
        self.option_declared = true;
        if self.array_access {
            self.push_error(Error::LateOption);
        }
        match n {
            0 => self.base_index = 0,
            1 => self.base_index = 1,
            _ => self.push_error(Error::Syntax),
        }
    }

    pub fn base_index(&self) -> i32 {
        self.base_index
    }

    /// Declares ram space for a scalar string variable, the first time it
    /// is seen.
    pub fn strvar_decl(&mut self, coded_var: CodedVar) {
        let i1 = coded_var.index1();
        let i2 = coded_var.index2();
        if self.rampos[i1][i2] == -1 {
            self.rampos[i1][i2] = self.ramsize;
            self.add_size_to_ram(1);
        }
    }

    pub fn str_decl(&mut self, text: &str) -> Result<usize, Error> {
        self.strings.intern(text)
    }

    pub fn data_str_decl(&mut self, str_index: usize, datum_type: DatumType, pool: &mut crate::datapool::DataPool) {
        pool.add(str_index, datum_type);
    }

    /// `DEF FNx(param) = expr` header. Returns false when the name is
    /// already declared (the body still compiles, against the original
    /// definition, so later errors stay sensible).
    pub fn fun_decl(&mut self, name: u8, param: CodedVar, nparams: u8) -> bool {
        self.in_fun_def = true;
        if let Some(idx) = self.usrfuns.iter().position(|f| f.name == name) {
            self.push_error(Error::FunRedeclared);
            self.cur_fun = Some(idx);
            return false;
        }
        let vrampos = self.ramsize;
        self.add_size_to_ram(1);
        self.usrfuns.push(UsrFun {
            name,
            nparams,
            param,
            pc: self.code.len(),
            vrampos,
            stack_inc: 0,
            stack_dec: 0,
        });
        self.cur_fun = Some(self.usrfuns.len() - 1);
        true
    }

    fn cur_fun_param(&self) -> Option<(CodedVar, i32)> {
        self.cur_fun.and_then(|i| {
            let f = &self.usrfuns[i];
            if f.nparams > 0 {
                Some((f.param, f.vrampos))
            } else {
                None
            }
        })
    }

    /// A bare numeric variable reference: either the enclosing DEF FN's
    /// own parameter, or an ordinary scalar/array-backed variable.
    pub fn numvar_expr(&mut self, coded_var: CodedVar) {
        if self.in_fun_def {
            if let Some((param, vrampos)) = self.cur_fun_param() {
                if coded_var == param {
                    self.add_op(Opcode::GetVar);
                    self.add_id(vrampos);
                    return;
                }
            }
        }
        self.numvar_declared(coded_var, VarType::Num);
        let pos = self.rampos_of(coded_var);
        self.add_op(Opcode::GetVar);
        self.add_id(pos);
    }

    pub fn list_expr(&mut self, coded_var: CodedVar) {
        if self.in_fun_def && self.cur_fun_param().map(|(p, _)| p) == Some(coded_var) {
            self.push_error(Error::FunargAsArray);
            return;
        }
        self.numvar_declared(coded_var, VarType::List);
        self.add_op(Opcode::GetList);
        self.add_id(coded_var.index1() as i32);
    }

    pub fn table_expr(&mut self, coded_var: CodedVar) {
        if self.in_fun_def && self.cur_fun_param().map(|(p, _)| p) == Some(coded_var) {
            self.push_error(Error::FunargAsArray);
            return;
        }
        self.numvar_declared(coded_var, VarType::Table);
        self.add_op(Opcode::GetTable);
        self.add_id(coded_var.index1() as i32);
    }

    pub fn check_type(&mut self, actual: PstackType, expected: PstackType) {
        if actual != expected {
            match expected {
                PstackType::Num => self.push_error(Error::NumExprExpected),
                PstackType::Str => self.push_error(Error::StrExprExpected),
            }
        }
    }

    pub fn binary_expr(&mut self, op: Opcode) {
        self.add_op(op);
    }

    /// `=`/`<>` between two strings; other relational operators are
    /// undefined on strings per the grammar and reported as an error.
    pub fn string_relop(&mut self, is_eq: bool, is_ne: bool) {
        if is_eq {
            self.add_op(Opcode::EqStr);
        } else if is_ne {
            self.add_op(Opcode::NotEqStr);
        } else {
            self.push_error(Error::StrRelNotEq);
        }
    }

    /// A call to a user-defined function: arity-checks, pushes the
    /// argument into the function's private ram slot, and emits GOSUB.
    pub fn usrfun_call(&mut self, name: u8, nparams: u8) {
        let found = self.usrfuns.iter().position(|f| f.name == name);
        let is_self_recursive = found == self.cur_fun;
        let idx = match found {
            Some(i) if !is_self_recursive => i,
            _ => {
                self.push_error(Error::UndefFun);
                return;
            }
        };
        if self.usrfuns[idx].nparams != nparams {
            self.push_error(Error::BadNparams);
            return;
        }
        if self.usrfuns[idx].nparams > 0 {
            self.add_op(Opcode::LetVar);
            self.add_id(self.usrfuns[idx].vrampos);
        }
        self.add_op(Opcode::Gosub);
        self.add_id(self.usrfuns[idx].pc as i32);
        let (inc, dec) = (self.usrfuns[idx].stack_inc, self.usrfuns[idx].stack_dec);
        self.add_to_stack_size(inc);
        self.add_to_stack_size(dec);
    }

    /// A call to a built-in function (`ABS`, `RND`, ...); `ifun` is its
    /// opcode operand (the internal-function table index).
    pub fn ifun_call(&mut self, ifun: i32, declared_nparams: u8, call_nparams: u8) {
        if declared_nparams != call_nparams {
            self.push_error(Error::BadNparams);
            return;
        }
        if call_nparams == 0 {
            self.add_op(Opcode::Ifun0);
        } else {
            self.add_op(Opcode::Ifun1);
        }
        self.add_id(ifun);
    }

    fn add_jump(&mut self, to_line: i32) {
        self.jumps.push(Jump { from_line: self.cur_line_num, to_line });
    }

    /// Opens a new FOR nesting level rooted at the current line.
    pub fn for_decl(&mut self, coded_var: CodedVar) -> usize {
        let mut b = self.cur_block;
        while b != MAIN_BLOCK {
            if self.blocks[b].coded_var == Some(coded_var) {
                self.push_error(Error::NestedFor);
                break;
            }
            b = self.blocks[b].parent.unwrap_or(MAIN_BLOCK);
        }

        self.blocks.push(ForBlock {
            coded_var: None,
            cmp_pc: 0,
            start_line: self.cur_line_num,
            end_line: self.cur_line_num,
            parent: Some(self.cur_block),
        });
        let block_idx = self.blocks.len() - 1;
        self.cur_block = block_idx;

        self.numvar_declared(coded_var, VarType::Num);
        self.add_op(Opcode::For);

        self.add_id(self.ramsize);
        self.add_size_to_ram(1);
        self.add_id(self.ramsize);
        self.add_size_to_ram(1);
        let pos = self.rampos_of(coded_var);
        self.add_id(pos);

        let cmp_pc = self.code.len();
        self.add_op(Opcode::ForCmp);
        self.add_id(0);

        self.blocks[block_idx].coded_var = Some(coded_var);
        self.blocks[block_idx].cmp_pc = cmp_pc;
        block_idx
    }

    /// Closes the innermost FOR, patching its `FOR_CMP` exit target to
    /// land just past the `NEXT` we emit here.
    pub fn next_decl(&mut self, coded_var: CodedVar) {
        if self.cur_block == MAIN_BLOCK || self.blocks[self.cur_block].coded_var != Some(coded_var) {
            self.push_error(Error::NextWoutFor);
            return;
        }
        self.numvar_declared(coded_var, VarType::Num);
        let cmp_pc = self.blocks[self.cur_block].cmp_pc;
        self.add_op(Opcode::Next);
        self.add_id(cmp_pc as i32);
        let after = self.code.len() as i32;
        let _ = self.code.set_id(cmp_pc + 1, after);

        self.blocks[self.cur_block].end_line = self.cur_line_num;
        if let Some(parent) = self.blocks[self.cur_block].parent {
            self.cur_block = parent;
        }
    }

    /// Emits a jump-target id cell, either immediately (if the target
    /// line has already been compiled) or as a pending patch resolved
    /// once the whole program has been compiled.
    pub fn add_line_ref(&mut self, line_num: i32) {
        self.add_jump(line_num);

        let idx = match self.find_line(line_num) {
            Some(i) => i,
            None => {
                self.push_error(Error::NoLine);
                return;
            }
        };

        if let Some(pc) = self.line_pc[idx].pc {
            self.add_id(pc as i32);
            return;
        }

        let patch_pc = self.code.len();
        self.line_refs.push(LineRef { target_line: line_num, patch_pc });
        self.add_id(0);
    }

    pub fn end_decl(&mut self) {
        self.end_seen = true;
        self.add_op(Opcode::End);
    }

    fn check_fors_without_next(&mut self) {
        let mut b = self.cur_block;
        let mut offenders = Vec::new();
        while b != MAIN_BLOCK {
            offenders.push(self.blocks[b].start_line);
            b = self.blocks[b].parent.unwrap_or(MAIN_BLOCK);
        }
        for _ in offenders {
            self.push_error(Error::ForWithoutNext);
        }
    }

    fn patch_line_references(&mut self) {
        for lr in std::mem::take(&mut self.line_refs) {
            if let Some(idx) = self.find_line(lr.target_line) {
                if let Some(pc) = self.line_pc[idx].pc {
                    let _ = self.code.set_id(lr.patch_pc, pc as i32);
                }
            }
        }
    }

    /// Resolves whether `from_line` and `to_line` sit inside the same
    /// (or no) FOR nesting; jumping into the body of a loop you didn't
    /// enter through its own FOR is rejected.
    fn line_in_block(&self, line_num: i32, block: usize) -> Option<usize> {
        for (i, b) in self.blocks.iter().enumerate() {
            if b.parent == Some(block) {
                if let Some(found) = self.line_in_block(line_num, i) {
                    return Some(found);
                }
            }
        }
        let b = &self.blocks[block];
        if line_num > b.start_line && line_num <= b.end_line {
            Some(block)
        } else {
            None
        }
    }

    fn check_jumps(&mut self) {
        let pairs: Vec<(i32, i32)> = self.jumps.iter().map(|j| (j.from_line, j.to_line)).collect();
        for (from_line, to_line) in pairs {
            let mut fb = self.line_in_block(from_line, MAIN_BLOCK);
            let tb = self.line_in_block(to_line, MAIN_BLOCK);
            while fb != tb && fb.is_some() {
                fb = fb.and_then(|b| self.blocks[b].parent);
            }
            if fb.is_none() && tb.is_some() {
                self.push_error(Error::JumpIntoFor);
            }
        }
    }

    /// Final compilation pass, run once every line has been compiled:
    /// validates open FORs, patches forward line references, and checks
    /// every jump for illegal entry into a loop body.
    pub fn end_parsing(&mut self) {
        self.blocks[MAIN_BLOCK].end_line = self.cur_line_num;
        if !self.end_seen {
            self.push_error(Error::EndUnseen);
        }
        if self.errors.is_empty() {
            self.check_fors_without_next();
        }
        if self.errors.is_empty() {
            self.patch_line_references();
        }
        if self.errors.is_empty() {
            self.check_jumps();
        }
    }

    pub fn ram_size(&self) -> i32 {
        self.ramsize
    }

    pub fn stack_max(&self) -> i32 {
        self.stack_max
    }

    pub fn var_ram_positions(&self) -> HashMap<u16, i32> {
        let mut m = HashMap::new();
        for i1 in 0..N_VARNAMES {
            for i2 in 0..N_SUBVARS {
                if self.rampos[i1][i2] >= 0 {
                    let coded = CodedVar::from_indices(i1, i2);
                    m.insert(coded.raw(), self.rampos[i1][i2]);
                }
            }
        }
        m
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn var(letter: u8) -> CodedVar {
        CodedVar::bare(letter)
    }

    #[test]
    fn first_use_of_scalar_allocates_one_ram_cell() {
        let mut c = Compiler::new();
        c.numvar_declared(var(b'A'), VarType::Num);
        assert_eq!(c.ram_size(), 1);
        assert_eq!(c.rampos_of(var(b'A')), 0);
    }

    #[test]
    fn reusing_a_scalar_as_an_array_is_a_type_mismatch() {
        let mut c = Compiler::new();
        c.numvar_declared(var(b'A'), VarType::Num);
        c.numvar_declared(var(b'A'), VarType::List);
        assert_eq!(c.errors, vec![Error::TypeMismatch]);
    }

    #[test]
    fn dim_allocates_requested_size() {
        let mut c = Compiler::new();
        c.numvar_dimensioned(var(b'A'), VarType::List, 19, 0);
        assert_eq!(c.ram_size(), 20);
    }

    #[test]
    fn repeated_dim_after_first_use_is_an_error() {
        let mut c = Compiler::new();
        c.numvar_dimensioned(var(b'A'), VarType::List, 9, 0);
        c.numvar_dimensioned(var(b'A'), VarType::List, 9, 0);
        assert_eq!(c.errors, vec![Error::DupDim]);
    }

    #[test]
    fn option_base_can_only_be_declared_once() {
        let mut c = Compiler::new();
        c.option_decl(1);
        c.option_decl(0);
        assert_eq!(c.errors, vec![Error::DupOption]);
        assert_eq!(c.base_index(), 1);
    }

    #[test]
    fn option_base_after_array_access_is_late() {
        let mut c = Compiler::new();
        c.numvar_declared(var(b'A'), VarType::List);
        c.option_decl(1);
        assert_eq!(c.errors, vec![Error::LateOption]);
    }

    #[test]
    fn for_next_roundtrip_patches_exit_target() {
        let mut c = Compiler::new();
        c.begin_line(10);
        c.for_decl(var(b'I'));
        c.begin_line(20);
        c.next_decl(var(b'I'));
        assert_eq!(c.cur_block, MAIN_BLOCK);
    }

    #[test]
    fn next_without_matching_for_is_an_error() {
        let mut c = Compiler::new();
        c.begin_line(10);
        c.next_decl(var(b'I'));
        assert_eq!(c.errors, vec![Error::NextWoutFor]);
    }

    #[test]
    fn jump_to_unknown_line_is_an_error() {
        let mut c = Compiler::new();
        c.declare_lines(&[10, 20]);
        c.begin_line(10);
        c.add_line_ref(999);
        assert_eq!(c.errors, vec![Error::NoLine]);
    }

    #[test]
    fn forward_reference_is_patched_after_end_parsing() {
        let mut c = Compiler::new();
        c.declare_lines(&[10, 20]);
        c.begin_line(10);
        c.add_line_ref(20);
        let patch_pos = c.code.len() - 1;
        c.begin_line(20);
        c.end_decl();
        c.end_parsing();
        assert_eq!(c.code.get(patch_pos).as_id(), Some(2));
    }

    #[test]
    fn missing_end_is_reported() {
        let mut c = Compiler::new();
        c.declare_lines(&[10]);
        c.begin_line(10);
        c.end_parsing();
        assert!(c.errors.contains(&Error::EndUnseen));
    }
}
