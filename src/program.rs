//! The output of a successful compile: everything a [`crate::vm::Vm`] needs
//! to execute a program, bundled together so `bas55`'s `Session` has one
//! artifact to hold onto between `RUN`s. Consolidates what `ecma55.c` kept
//! as global state (`g_code`, `g_strings`, `g_data`, `g_arraydsc`,
//! `g_ramsize`) into a single value instead.

use std::collections::HashMap;

use crate::arraydesc::ArrayDescs;
use crate::code::Code;
use crate::datapool::DataPool;
use crate::error::Diagnostic;
use crate::strpool::StringPool;
use crate::vm::{Outcome, Vm};

/// Everything the compiler produced for one program: the bytecode, the
/// (already string-pool-populated) artifacts it references, and the sizing
/// the VM needs to allocate RAM and the operand stack before running.
pub struct CompiledProgram {
    pub code: Code,
    pub strings: StringPool,
    pub data: DataPool,
    pub array_descs: ArrayDescs,
    pub ram_size: i32,
    pub stack_max: i32,
    pub base_index: i32,
    /// rampos of every declared string variable, so the VM can pre-seed
    /// them to the empty string before RUN (mirrors `ecma55.c`'s
    /// `init_str_vars`).
    pub string_var_ram_positions: Vec<i32>,
}

impl CompiledProgram {
    /// Prepares one execution: resets the string pool's non-constant
    /// slots, rewinds the DATA cursor, and runs a fresh [`Vm`] to
    /// completion (or a fatal error / cooperative break).
    pub fn run(
        &mut self,
        out: &mut dyn std::io::Write,
        input: &mut dyn std::io::BufRead,
        break_flag: Option<&std::sync::atomic::AtomicBool>,
        gosub_capacity: usize,
        debug: bool,
    ) -> Result<Outcome, Diagnostic> {
        self.strings.reset();
        self.data.restore();
        let mut vm = Vm::new(
            &self.code,
            &mut self.strings,
            &mut self.data,
            &self.array_descs,
            self.ram_size,
            &self.string_var_ram_positions,
            self.base_index,
            gosub_capacity,
            debug,
        );
        vm.run(out, input, break_flag)
    }
}

/// Maps a compiler's internal `(letter, subslot) -> rampos` table (see
/// [`crate::compiler::Compiler::var_ram_positions`]) down to just the
/// positions that hold string variables, for [`CompiledProgram`] to seed.
pub fn string_var_positions(var_ram_positions: &HashMap<u16, i32>) -> Vec<i32> {
    var_ram_positions
        .iter()
        .filter(|(&coded, _)| (coded & 0xff) as u8 == b'$')
        .map(|(_, &pos)| pos)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::Opcode;

    #[test]
    fn run_resets_pool_and_cursor_between_calls() {
        let mut code = Code::new();
        code.add_op(Opcode::PushNum);
        code.add_num(1.0);
        code.add_op(Opcode::PrintNum);
        code.add_op(Opcode::End);
        let mut strings = StringPool::new();
        strings.mark_constants();
        let mut program = CompiledProgram {
            code,
            strings,
            data: DataPool::new(),
            array_descs: ArrayDescs::new(),
            ram_size: 0,
            stack_max: 1,
            base_index: 0,
            string_var_ram_positions: Vec::new(),
        };
        let mut out = Vec::new();
        let mut input = std::io::empty();
        let outcome = program.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(outcome, Outcome::Ended);
        assert_eq!(String::from_utf8(out).unwrap(), " 1 ");

        // Running again must behave identically (pool reset, cursor rewound).
        let mut out2 = Vec::new();
        let mut input2 = std::io::empty();
        program.run(&mut out2, &mut input2, None, 256, false).unwrap();
        assert_eq!(String::from_utf8(out2).unwrap(), " 1 ");
    }

    #[test]
    fn string_var_positions_filters_by_dollar_suffix() {
        let mut m = HashMap::new();
        m.insert(crate::codedvar::CodedVar::bare(b'A').raw(), 0);
        m.insert(crate::codedvar::CodedVar::string(b'B').raw(), 1);
        let positions = string_var_positions(&m);
        assert_eq!(positions, vec![1]);
    }
}
