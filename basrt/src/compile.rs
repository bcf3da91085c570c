//! Walks a parsed statement and drives `bc_core::compiler::Compiler`'s
//! actions, the way `parse.c`'s grammar semantic actions did (that
//! grammar itself, `grammar.y`, did not survive retrieval, so the
//! statement-level sequencing below is authored directly against the
//! compiler's entry points and the virtual machine's documented stack
//! contract for each opcode).

use pest::iterators::Pair;

use bc_core::code::{Ifun, Opcode};
use bc_core::codedvar::CodedVar;
use bc_core::compiler::{Compiler, PstackType, VarType};
use bc_core::datalex::{self, Elem, ParseAs};
use bc_core::datapool::{DataPool, DatumType};
use bc_core::error::Error;

use crate::parser::Rule;

fn coded_var_numvar(text: &str) -> CodedVar {
    let bytes = text.as_bytes();
    if bytes.len() == 2 {
        CodedVar::with_digit(bytes[0], bytes[1])
    } else {
        CodedVar::bare(bytes[0])
    }
}

fn coded_var_strvar(text: &str) -> CodedVar {
    CodedVar::string(text.as_bytes()[0])
}

fn line_num(pair: Pair<Rule>) -> i32 {
    pair.as_str().parse().unwrap_or(0)
}

fn int_const(pair: Pair<Rule>) -> i32 {
    pair.as_str().parse().unwrap_or(i32::MAX)
}

fn strip_quotes(text: &str) -> &str {
    text.trim_start_matches('"').trim_end_matches('"')
}

/// Reads a BASIC numeric literal the same way a DATA/INPUT datum is read,
/// just truncated to `PRECISION_DIGITS` significant digits. A literal that
/// overflows a double's range is a compile warning, not an error: the
/// parsed infinity is kept and stored, so downstream arithmetic sees it as
/// the grammar's own `HUGE_VAL`-by-another-name rather than being silently
/// replaced by zero.
fn parse_number_literal(c: &mut Compiler, text: &str) -> f64 {
    let (v, _) = datalex::parse_const(text);
    if v.is_infinite() {
        c.errors.push(Error::ConstOverflow);
    }
    v
}

fn ifun_from_name(name: &str) -> Ifun {
    Ifun::ALL
        .iter()
        .copied()
        .find(|f| f.name() == name)
        .expect("grammar only admits known internal function names")
}

pub fn compile_statement(c: &mut Compiler, data: &mut DataPool, pair: Pair<Rule>) {
    let stmt = pair.into_inner().next().expect("statement has one inner rule");
    match stmt.as_rule() {
        Rule::rem_stmt => {}
        Rule::let_stmt => compile_let(c, stmt),
        Rule::print_stmt => compile_print(c, stmt),
        Rule::input_stmt => compile_input(c, stmt),
        Rule::read_stmt => compile_read(c, stmt),
        Rule::data_stmt => compile_data(c, data, stmt),
        Rule::restore_stmt => c.add_op(Opcode::Restore),
        Rule::dim_stmt => compile_dim(c, stmt),
        Rule::def_stmt => compile_def(c, stmt),
        Rule::for_stmt => compile_for(c, stmt),
        Rule::next_stmt => compile_next(c, stmt),
        Rule::on_goto_stmt => compile_on_goto(c, stmt),
        Rule::goto_stmt => {
            c.add_op(Opcode::Goto);
            let target = line_num(stmt.into_inner().next().unwrap());
            c.add_line_ref(target);
        }
        Rule::gosub_stmt => {
            c.add_op(Opcode::Gosub);
            let target = line_num(stmt.into_inner().next().unwrap());
            c.add_line_ref(target);
        }
        Rule::return_stmt => c.add_op(Opcode::Return),
        Rule::if_stmt => compile_if(c, stmt),
        Rule::randomize_stmt => c.add_op(Opcode::Randomize),
        Rule::option_stmt => {
            let n = int_const(stmt.into_inner().next().unwrap());
            c.option_decl(n);
        }
        Rule::end_stmt => c.end_decl(),
        // STOP halts the VM like END but, unlike END, is not the
        // once-per-program terminator: it doesn't set `end_seen` and a
        // program may contain any number of them.
        Rule::stop_stmt => c.add_op(Opcode::End),
        other => unreachable!("unexpected top-level statement rule {:?}", other),
    }
}

fn compile_expr(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    compile_add_expr(c, pair.into_inner().next().unwrap())
}

fn compile_add_expr(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    let mut inner = pair.into_inner().peekable();

    let mut negate = false;
    if inner.peek().map(|p| p.as_rule()) == Some(Rule::sign) {
        negate = inner.next().unwrap().as_str() == "-";
    }
    let mut ty = compile_mul_expr(c, inner.next().unwrap());
    if negate {
        c.check_type(ty, PstackType::Num);
        c.add_op(Opcode::Neg);
        ty = PstackType::Num;
    }

    while let Some(op_pair) = inner.next() {
        let is_add = op_pair.as_str() == "+";
        let mut term_negate = false;
        if inner.peek().map(|p| p.as_rule()) == Some(Rule::sign) {
            term_negate = inner.next().unwrap().as_str() == "-";
        }
        let rhs_ty = compile_mul_expr(c, inner.next().unwrap());
        if term_negate {
            c.check_type(rhs_ty, PstackType::Num);
            c.add_op(Opcode::Neg);
        }
        c.check_type(ty, PstackType::Num);
        c.check_type(rhs_ty, PstackType::Num);
        c.binary_expr(if is_add { Opcode::Add } else { Opcode::Sub });
        ty = PstackType::Num;
    }
    ty
}

fn compile_mul_expr(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    let mut inner = pair.into_inner();
    let mut ty = compile_pow_expr(c, inner.next().unwrap());
    while let Some(op_pair) = inner.next() {
        let is_mul = op_pair.as_str() == "*";
        let rhs_ty = compile_pow_expr(c, inner.next().unwrap());
        c.check_type(ty, PstackType::Num);
        c.check_type(rhs_ty, PstackType::Num);
        c.binary_expr(if is_mul { Opcode::Mul } else { Opcode::Div });
        ty = PstackType::Num;
    }
    ty
}

fn compile_pow_expr(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    let mut inner = pair.into_inner();
    let base_ty = compile_primary(c, inner.next().unwrap());
    if let Some(exp_pair) = inner.next() {
        let exp_ty = compile_pow_expr(c, exp_pair);
        c.check_type(base_ty, PstackType::Num);
        c.check_type(exp_ty, PstackType::Num);
        c.binary_expr(Opcode::Pow);
        return PstackType::Num;
    }
    base_ty
}

fn compile_primary(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    let p = pair.into_inner().next().expect("primary has one inner rule");
    match p.as_rule() {
        Rule::number => {
            let v = parse_number_literal(c, p.as_str());
            c.add_op(Opcode::PushNum);
            c.add_num(v);
            PstackType::Num
        }
        Rule::string_literal => {
            let text = strip_quotes(p.as_str());
            match c.str_decl(text) {
                Ok(idx) => {
                    c.add_op(Opcode::PushStr);
                    c.add_id(idx as i32);
                }
                Err(e) => c.errors.push(e),
            }
            PstackType::Str
        }
        Rule::fn_call => compile_fn_call(c, p),
        Rule::ifun_call => compile_ifun_call(c, p),
        Rule::list_ref => compile_list_get(c, p),
        Rule::table_ref => compile_table_get(c, p),
        Rule::strvar => {
            let var = coded_var_strvar(p.as_str());
            c.strvar_decl(var);
            let pos = c.rampos_of(var);
            c.add_op(Opcode::GetStrvar);
            c.add_id(pos);
            PstackType::Str
        }
        Rule::numvar => {
            c.numvar_expr(coded_var_numvar(p.as_str()));
            PstackType::Num
        }
        Rule::expr => compile_expr(c, p),
        other => unreachable!("unexpected primary rule {:?}", other),
    }
}

fn compile_fn_call(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().as_bytes()[0];
    let arg_ty = compile_expr(c, inner.next().unwrap());
    c.check_type(arg_ty, PstackType::Num);
    c.usrfun_call(name, 1);
    PstackType::Num
}

fn compile_ifun_call(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    let mut inner = pair.into_inner();
    let ifun = ifun_from_name(inner.next().unwrap().as_str());
    match inner.next() {
        Some(arg_pair) => {
            let arg_ty = compile_expr(c, arg_pair);
            c.check_type(arg_ty, PstackType::Num);
            c.ifun_call(ifun.id(), ifun.nparams(), 1);
        }
        None => c.ifun_call(ifun.id(), ifun.nparams(), 0),
    }
    PstackType::Num
}

fn compile_list_get(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    let mut inner = pair.into_inner();
    let var = coded_var_numvar(inner.next().unwrap().as_str());
    let idx_ty = compile_expr(c, inner.next().unwrap());
    c.check_type(idx_ty, PstackType::Num);
    c.list_expr(var);
    PstackType::Num
}

fn compile_table_get(c: &mut Compiler, pair: Pair<Rule>) -> PstackType {
    let mut inner = pair.into_inner();
    let var = coded_var_numvar(inner.next().unwrap().as_str());
    let idx1_ty = compile_expr(c, inner.next().unwrap());
    c.check_type(idx1_ty, PstackType::Num);
    let idx2_ty = compile_expr(c, inner.next().unwrap());
    c.check_type(idx2_ty, PstackType::Num);
    c.table_expr(var);
    PstackType::Num
}

fn compile_let(c: &mut Compiler, pair: Pair<Rule>) {
    let mut inner = pair.into_inner();
    let target = inner.next().unwrap().into_inner().next().unwrap();
    let expr_pair = inner.next().unwrap();

    match target.as_rule() {
        Rule::numvar => {
            let var = coded_var_numvar(target.as_str());
            c.numvar_declared(var, VarType::Num);
            let pos = c.rampos_of(var);
            let ty = compile_expr(c, expr_pair);
            c.check_type(ty, PstackType::Num);
            c.add_op(Opcode::LetVar);
            c.add_id(pos);
        }
        Rule::strvar => {
            let var = coded_var_strvar(target.as_str());
            c.strvar_decl(var);
            let pos = c.rampos_of(var);
            let ty = compile_expr(c, expr_pair);
            c.check_type(ty, PstackType::Str);
            c.add_op(Opcode::LetStrvar);
            c.add_id(pos);
        }
        Rule::list_ref => {
            let mut t = target.into_inner();
            let var = coded_var_numvar(t.next().unwrap().as_str());
            let idx_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx_ty, PstackType::Num);
            let val_ty = compile_expr(c, expr_pair);
            c.check_type(val_ty, PstackType::Num);
            c.numvar_declared(var, VarType::List);
            c.add_op(Opcode::LetList);
            c.add_id(var.index1() as i32);
        }
        Rule::table_ref => {
            let mut t = target.into_inner();
            let var = coded_var_numvar(t.next().unwrap().as_str());
            let idx1_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx1_ty, PstackType::Num);
            let idx2_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx2_ty, PstackType::Num);
            let val_ty = compile_expr(c, expr_pair);
            c.check_type(val_ty, PstackType::Num);
            c.numvar_declared(var, VarType::Table);
            c.add_op(Opcode::LetTable);
            c.add_id(var.index1() as i32);
        }
        other => unreachable!("unexpected assignment target rule {:?}", other),
    }
}

fn compile_print(c: &mut Compiler, pair: Pair<Rule>) {
    let mut trailing_sep = false;
    if let Some(list_pair) = pair.into_inner().next() {
        let mut inner = list_pair.into_inner();
        if let Some(first) = inner.next() {
            compile_print_item(c, first);
        }
        while let Some(sep_pair) = inner.next() {
            if sep_pair.as_str() == "," {
                c.add_op(Opcode::PrintComma);
            }
            match inner.next() {
                Some(item_pair) => {
                    compile_print_item(c, item_pair);
                    trailing_sep = false;
                }
                None => trailing_sep = true,
            }
        }
    }
    if !trailing_sep {
        c.add_op(Opcode::PrintNl);
    }
}

fn compile_print_item(c: &mut Compiler, pair: Pair<Rule>) {
    let p = pair.into_inner().next().expect("print item has one inner rule");
    match p.as_rule() {
        Rule::tab_call => {
            let col_ty = compile_expr(c, p.into_inner().next().unwrap());
            c.check_type(col_ty, PstackType::Num);
            c.add_op(Opcode::PrintTab);
        }
        Rule::expr => match compile_expr(c, p) {
            PstackType::Num => c.add_op(Opcode::PrintNum),
            PstackType::Str => c.add_op(Opcode::PrintStr),
        },
        other => unreachable!("unexpected print item rule {:?}", other),
    }
}

fn compile_input(c: &mut Compiler, pair: Pair<Rule>) {
    c.add_op(Opcode::Input);
    for target in pair.into_inner() {
        compile_input_target(c, target);
    }
    c.add_op(Opcode::InputEnd);
}

fn compile_input_target(c: &mut Compiler, pair: Pair<Rule>) {
    let p = pair.into_inner().next().expect("io target has one inner rule");
    match p.as_rule() {
        Rule::numvar => {
            let var = coded_var_numvar(p.as_str());
            c.numvar_declared(var, VarType::Num);
            let pos = c.rampos_of(var);
            c.add_op(Opcode::InputNum);
            c.add_op(Opcode::LetVar);
            c.add_id(pos);
        }
        Rule::strvar => {
            let var = coded_var_strvar(p.as_str());
            c.strvar_decl(var);
            let pos = c.rampos_of(var);
            c.add_op(Opcode::InputStr);
            c.add_op(Opcode::LetStrvar);
            c.add_id(pos);
        }
        Rule::list_ref => {
            let mut t = p.into_inner();
            let var = coded_var_numvar(t.next().unwrap().as_str());
            let idx_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx_ty, PstackType::Num);
            c.numvar_declared(var, VarType::List);
            c.add_op(Opcode::InputNum);
            c.add_op(Opcode::InputList);
            c.add_id(var.index1() as i32);
        }
        Rule::table_ref => {
            let mut t = p.into_inner();
            let var = coded_var_numvar(t.next().unwrap().as_str());
            let idx1_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx1_ty, PstackType::Num);
            let idx2_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx2_ty, PstackType::Num);
            c.numvar_declared(var, VarType::Table);
            c.add_op(Opcode::InputNum);
            c.add_op(Opcode::InputTable);
            c.add_id(var.index1() as i32);
        }
        other => unreachable!("unexpected INPUT target rule {:?}", other),
    }
}

fn compile_read(c: &mut Compiler, pair: Pair<Rule>) {
    for target in pair.into_inner() {
        compile_read_target(c, target);
    }
}

fn compile_read_target(c: &mut Compiler, pair: Pair<Rule>) {
    let p = pair.into_inner().next().expect("io target has one inner rule");
    match p.as_rule() {
        Rule::numvar => {
            let var = coded_var_numvar(p.as_str());
            c.numvar_declared(var, VarType::Num);
            let pos = c.rampos_of(var);
            c.add_op(Opcode::ReadVar);
            c.add_id(pos);
        }
        Rule::strvar => {
            let var = coded_var_strvar(p.as_str());
            c.strvar_decl(var);
            let pos = c.rampos_of(var);
            c.add_op(Opcode::ReadStrvar);
            c.add_id(pos);
        }
        Rule::list_ref => {
            let mut t = p.into_inner();
            let var = coded_var_numvar(t.next().unwrap().as_str());
            let idx_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx_ty, PstackType::Num);
            c.numvar_declared(var, VarType::List);
            c.add_op(Opcode::ReadList);
            c.add_id(var.index1() as i32);
        }
        Rule::table_ref => {
            let mut t = p.into_inner();
            let var = coded_var_numvar(t.next().unwrap().as_str());
            let idx1_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx1_ty, PstackType::Num);
            let idx2_ty = compile_expr(c, t.next().unwrap());
            c.check_type(idx2_ty, PstackType::Num);
            c.numvar_declared(var, VarType::Table);
            c.add_op(Opcode::ReadTable);
            c.add_id(var.index1() as i32);
        }
        other => unreachable!("unexpected READ target rule {:?}", other),
    }
}

fn intern_datum(c: &mut Compiler, data: &mut DataPool, text: &str, ty: DatumType) {
    match c.str_decl(text) {
        Ok(idx) => c.data_str_decl(idx, ty, data),
        Err(e) => c.errors.push(e),
    }
}

/// `DATA` items are stored as raw text (quoted or not); a READ only
/// decides whether an item looks numeric when it knows the target
/// variable's type, so the lexer here is forced to `AsUnquotedStr` to
/// always hand back the literal text instead of a pre-parsed number.
fn compile_data(c: &mut Compiler, data: &mut DataPool, pair: Pair<Rule>) {
    let mut s = pair.into_inner().next().unwrap().as_str();
    let mut awaiting_item = true;
    loop {
        let (elem, consumed) = datalex::parse_data_elem(s, ParseAs::AsUnquotedStr);
        s = &s[consumed..];
        if awaiting_item {
            match elem {
                Elem::Eof => break,
                Elem::Comma => intern_datum(c, data, "", DatumType::Unquoted),
                Elem::QuotedStr { text, terminated } => {
                    if !terminated {
                        c.errors.push(Error::StrNoend);
                    }
                    intern_datum(c, data, text, DatumType::Quoted);
                    awaiting_item = false;
                }
                Elem::UnquotedStr { text } => {
                    intern_datum(c, data, text, DatumType::Unquoted);
                    awaiting_item = false;
                }
                Elem::InvalChar(_) => {
                    c.errors.push(Error::InvalChars);
                    break;
                }
                Elem::Num { .. } => unreachable!("AsUnquotedStr never yields Num"),
            }
        } else {
            match elem {
                Elem::Eof => break,
                Elem::Comma => awaiting_item = true,
                _ => {
                    c.errors.push(Error::InvalChars);
                    break;
                }
            }
        }
    }
}

fn compile_dim(c: &mut Compiler, pair: Pair<Rule>) {
    for item in pair.into_inner() {
        let mut inner = item.into_inner();
        let var = coded_var_numvar(inner.next().unwrap().as_str());
        let dim1 = int_const(inner.next().unwrap());
        match inner.next() {
            Some(dim2_pair) => {
                let dim2 = int_const(dim2_pair);
                c.numvar_dimensioned(var, VarType::Table, dim1, dim2);
            }
            None => c.numvar_dimensioned(var, VarType::List, dim1, 0),
        }
    }
}

/// `DEF FN` bodies aren't reached by straight-line execution (a call jumps
/// to them with `GOSUB`), so the statement compiles to a `GOTO` around the
/// body, the body itself, and a closing `RETURN` that hands the computed
/// value back to the caller.
fn compile_def(c: &mut Compiler, pair: Pair<Rule>) {
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().as_bytes()[0];
    let param = coded_var_numvar(inner.next().unwrap().as_str());
    let body_pair = inner.next().unwrap();

    c.add_op(Opcode::Goto);
    let patch_pos = c.add_id(-1);

    c.fun_decl(name, param, 1);
    let body_ty = compile_expr(c, body_pair);
    c.check_type(body_ty, PstackType::Num);
    c.add_op(Opcode::Return);

    let after = c.code.len() as i32;
    let _ = c.code.set_id(patch_pos, after);
}

fn compile_for(c: &mut Compiler, pair: Pair<Rule>) {
    let mut inner = pair.into_inner();
    let var = coded_var_numvar(inner.next().unwrap().as_str());

    let start_ty = compile_expr(c, inner.next().unwrap());
    c.check_type(start_ty, PstackType::Num);
    let limit_ty = compile_expr(c, inner.next().unwrap());
    c.check_type(limit_ty, PstackType::Num);
    match inner.next() {
        Some(step_pair) => {
            let step_ty = compile_expr(c, step_pair);
            c.check_type(step_ty, PstackType::Num);
        }
        None => {
            c.add_op(Opcode::PushNum);
            c.add_num(1.0);
        }
    }
    c.for_decl(var);
}

fn compile_next(c: &mut Compiler, pair: Pair<Rule>) {
    let var = coded_var_numvar(pair.into_inner().next().unwrap().as_str());
    c.next_decl(var);
}

fn compile_on_goto(c: &mut Compiler, pair: Pair<Rule>) {
    let mut inner = pair.into_inner();
    let selector_ty = compile_expr(c, inner.next().unwrap());
    c.check_type(selector_ty, PstackType::Num);

    let targets: Vec<i32> = inner.map(line_num).collect();
    c.add_op(Opcode::OnGoto);
    c.add_id(targets.len() as i32);
    for target in targets {
        c.add_line_ref(target);
    }
}

/// `IF a <relop> b THEN line`: decides the relop's opcode from the left
/// operand's type, then requires the right operand to match it.
fn compile_if(c: &mut Compiler, pair: Pair<Rule>) {
    let mut inner = pair.into_inner();
    let lhs_ty = compile_expr(c, inner.next().unwrap());
    let relop = inner.next().unwrap().as_str().to_string();
    let rhs_ty = compile_expr(c, inner.next().unwrap());
    let target = line_num(inner.next().unwrap());

    if lhs_ty == PstackType::Num {
        c.check_type(rhs_ty, PstackType::Num);
        let op = match relop.as_str() {
            "<" => Opcode::Less,
            ">" => Opcode::Greater,
            "<=" => Opcode::LessEq,
            ">=" => Opcode::GreaterEq,
            "=" => Opcode::Eq,
            "<>" => Opcode::NotEq,
            _ => unreachable!("grammar only admits known relops"),
        };
        c.binary_expr(op);
    } else {
        c.check_type(rhs_ty, PstackType::Str);
        c.string_relop(relop == "=", relop == "<>");
    }

    c.add_op(Opcode::GotoIfTrue);
    c.add_line_ref(target);
}
