//! Drives [`bc_core::compiler::Compiler`] from BASIC source text: parses
//! each line with the `pest` grammar in `grammar.pest` and walks the parse
//! tree to emit bytecode. `bas55` is the only expected caller: it holds
//! the program's lines as a `BTreeMap<i32, String>` (line number to
//! statement text, the number already stripped) and calls [`compile`]
//! whenever it needs a fresh [`bc_core::CompiledProgram`] to RUN.

mod compile;
mod parser;

use std::collections::BTreeMap;

use pest::Parser;

use bc_core::compiler::Compiler;
use bc_core::datapool::DataPool;
use bc_core::error::Diagnostic;
use bc_core::program;
use bc_core::CompiledProgram;

pub use parser::{BasicParser, Rule};

/// Compiles a whole program's source lines into a runnable image.
///
/// Returns every diagnostic raised (including non-fatal warnings) and,
/// when none of them was fatal, the compiled program. Stops accepting new
/// diagnostics once [`bc_core::MAX_ERRORS`] is reached, giving up on a
/// hopelessly broken program rather than flooding the user with cascades.
pub fn compile(lines: &BTreeMap<i32, String>) -> (Option<CompiledProgram>, Vec<Diagnostic>) {
    let line_nums: Vec<i32> = lines.keys().copied().collect();
    let mut compiler = Compiler::new();
    compiler.declare_lines(&line_nums);
    let mut data = DataPool::new();
    let mut diagnostics = Vec::new();

    'lines: for (&num, text) in lines {
        let parsed = BasicParser::parse(Rule::line, text);
        match parsed {
            Ok(mut pairs) => {
                let line_pair = pairs.next().expect("line rule always produces one pair");
                let stmt_pair = line_pair
                    .into_inner()
                    .next()
                    .expect("line always contains one statement");
                compiler.begin_line(num);
                let before = compiler.errors.len();
                compile::compile_statement(&mut compiler, &mut data, stmt_pair);
                for &e in &compiler.errors[before..] {
                    diagnostics.push(Diagnostic::new(e, Some(num)));
                }
            }
            Err(e) => {
                // Each `text` is a single statement with no embedded newline,
                // so the line component of `line_col` is always 1; the
                // column is what matters, the BASIC line number is `num`.
                let col = match e.line_col {
                    pest::error::LineColLocation::Pos((_, col)) => col,
                    pest::error::LineColLocation::Span((_, col), _) => col,
                };
                diagnostics.push(Diagnostic::with_column(bc_core::Error::Syntax, Some(num), col));
            }
        }
        if diagnostics.len() >= bc_core::MAX_ERRORS {
            break 'lines;
        }
    }

    if diagnostics.len() < bc_core::MAX_ERRORS {
        let before = compiler.errors.len();
        compiler.end_parsing();
        for &e in &compiler.errors[before..] {
            diagnostics.push(Diagnostic::new(e, None));
        }
    }

    if diagnostics.iter().any(|d| d.error.is_fatal()) {
        return (None, diagnostics);
    }

    compiler.strings.mark_constants();
    let var_positions = compiler.var_ram_positions();
    let string_var_ram_positions = program::string_var_positions(&var_positions);
    let program = CompiledProgram {
        code: compiler.code,
        strings: compiler.strings,
        data,
        array_descs: compiler.array_descs,
        ram_size: compiler.ram_size(),
        stack_max: compiler.stack_max(),
        base_index: compiler.base_index(),
        string_var_ram_positions,
    };
    (Some(program), diagnostics)
}

#[cfg(test)]
mod test {
    use super::*;
    use bc_core::vm::Outcome;
    use bc_core::Error;

    fn program(lines: &[(i32, &str)]) -> BTreeMap<i32, String> {
        lines.iter().map(|&(n, s)| (n, s.to_string())).collect()
    }

    #[test]
    fn compiles_and_runs_a_small_program() {
        let src = program(&[
            (10, "FOR I = 1 TO 3"),
            (20, "PRINT I"),
            (30, "NEXT I"),
            (40, "END"),
        ]);
        let (compiled, diagnostics) = compile(&src);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let mut compiled = compiled.expect("program should compile");

        let mut out = Vec::new();
        let mut input = std::io::empty();
        let outcome = compiled.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(outcome, Outcome::Ended);
        assert_eq!(String::from_utf8(out).unwrap(), " 1 \n 2 \n 3 \n");
    }

    #[test]
    fn let_and_print_roundtrip_a_string() {
        let src = program(&[
            (10, r#"LET A$ = "HI""#),
            (20, "PRINT A$"),
            (30, "END"),
        ]);
        let (compiled, diagnostics) = compile(&src);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let mut compiled = compiled.unwrap();

        let mut out = Vec::new();
        let mut input = std::io::empty();
        compiled.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "HI\n");
    }

    #[test]
    fn if_then_and_goto_branch_correctly() {
        let src = program(&[
            (10, "LET A = 1"),
            (20, "IF A = 1 THEN 40"),
            (30, "PRINT 0"),
            (40, "PRINT 1"),
            (50, "END"),
        ]);
        let (compiled, diagnostics) = compile(&src);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let mut compiled = compiled.unwrap();

        let mut out = Vec::new();
        let mut input = std::io::empty();
        compiled.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " 1 \n");
    }

    #[test]
    fn read_data_with_restore() {
        let src = program(&[
            (10, "READ A, B"),
            (20, "PRINT A, B"),
            (30, "DATA 1, 2"),
            (40, "END"),
        ]);
        let (compiled, diagnostics) = compile(&src);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let mut compiled = compiled.unwrap();

        let mut out = Vec::new();
        let mut input = std::io::empty();
        compiled.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " 1               2 \n");
    }

    #[test]
    fn def_fn_computes_and_returns_without_falling_through() {
        let src = program(&[
            (10, "DEF FNA(X) = X * X"),
            (20, "PRINT FNA(3)"),
            (30, "END"),
        ]);
        let (compiled, diagnostics) = compile(&src);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let mut compiled = compiled.unwrap();

        let mut out = Vec::new();
        let mut input = std::io::empty();
        compiled.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " 9 \n");
    }

    #[test]
    fn missing_end_is_reported_as_a_diagnostic_with_no_line() {
        let src = program(&[(10, "PRINT 1")]);
        let (compiled, diagnostics) = compile(&src);
        assert!(compiled.is_none());
        assert!(diagnostics.iter().any(|d| d.error == Error::EndUnseen && d.line.is_none()));
    }

    #[test]
    fn goto_unknown_line_is_a_compile_error() {
        let src = program(&[(10, "GOTO 999"), (20, "END")]);
        let (compiled, diagnostics) = compile(&src);
        assert!(compiled.is_none());
        assert!(diagnostics
            .iter()
            .any(|d| d.error == Error::NoLine && d.line == Some(10)));
    }

    #[test]
    fn syntax_error_reports_the_offending_line() {
        let src = program(&[(10, "LET = 5"), (20, "END")]);
        let (compiled, diagnostics) = compile(&src);
        assert!(compiled.is_none());
        assert!(diagnostics
            .iter()
            .any(|d| d.error == Error::Syntax && d.line == Some(10)));
    }

    #[test]
    fn for_loop_prints_a_comma_separated_row() {
        let src = program(&[
            (10, "FOR I = 1 TO 3"),
            (20, "PRINT I,"),
            (30, "NEXT I"),
            (40, "PRINT"),
            (99, "END"),
        ]);
        let (compiled, diagnostics) = compile(&src);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let mut compiled = compiled.unwrap();

        let mut out = Vec::new();
        let mut input = std::io::empty();
        compiled.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " 1              2              3 \n");
    }

    #[test]
    fn read_mixes_numbers_and_a_quoted_string() {
        let src = program(&[
            (10, r#"DATA 1,2,"AB""#),
            (20, "READ X,Y,A$"),
            (30, "PRINT X+Y;A$"),
            (99, "END"),
        ]);
        let (compiled, diagnostics) = compile(&src);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let mut compiled = compiled.unwrap();

        let mut out = Vec::new();
        let mut input = std::io::empty();
        compiled.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " 3 AB\n");
    }

    #[test]
    fn numeric_literal_overflow_warns_but_still_compiles() {
        let src = program(&[(10, "PRINT 1E400"), (99, "END")]);
        let (compiled, diagnostics) = compile(&src);
        assert!(diagnostics
            .iter()
            .any(|d| d.error == Error::ConstOverflow && d.line == Some(10)));
        let mut compiled = compiled.expect("overflow is a warning, not a fatal error");

        let mut out = Vec::new();
        let mut input = std::io::empty();
        compiled.run(&mut out, &mut input, None, 256, false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " INF \n");
    }

    #[test]
    fn option_base_after_dim_is_rejected() {
        let src = program(&[(10, "DIM A(3)"), (20, "OPTION BASE 1"), (99, "END")]);
        let (compiled, diagnostics) = compile(&src);
        assert!(compiled.is_none());
        assert!(diagnostics
            .iter()
            .any(|d| d.error == Error::LateOption && d.line == Some(20)));
    }
}
