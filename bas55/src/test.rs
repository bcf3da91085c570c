use super::*;

fn small_program(session: &mut Session) {
    session.set_line(10, Some("LET A = 2")).unwrap();
    session.set_line(20, Some("LET B = 3")).unwrap();
    session.set_line(30, Some("PRINT A + B")).unwrap();
    session.set_line(99, Some("END")).unwrap();
}

#[test]
fn fresh_session_starts_dirty() {
    let session = Session::new();
    assert_eq!(session.state, LifecycleState::Dirty);
}

#[test]
fn set_line_validates_range_and_length() {
    let mut session = Session::new();
    assert!(session.set_line(0, Some("END")).is_err());
    assert!(session.set_line(10_000, Some("END")).is_err());
    assert!(session.set_line(10, Some(&"A".repeat(200))).is_err());
    assert!(session.set_line(10, Some("END")).is_ok());
}

#[test]
fn setting_empty_text_deletes_the_line() {
    let mut session = Session::new();
    session.set_line(10, Some("END")).unwrap();
    assert_eq!(session.lines.len(), 1);
    session.set_line(10, Some("")).unwrap();
    assert!(session.lines.is_empty());
}

#[test]
fn compile_then_run_reaches_ready_and_produces_output() {
    let mut session = Session::new();
    small_program(&mut session);
    let diagnostics = session.compile();
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    assert_eq!(session.state, LifecycleState::Ready);

    let mut out = Vec::new();
    let mut input = std::io::empty();
    let outcome = session.run(&mut out, &mut input).unwrap();
    assert_eq!(outcome, Outcome::Ended);
    assert_eq!(String::from_utf8(out).unwrap(), " 5 \n");
}

#[test]
fn run_without_a_clean_compile_is_rejected() {
    let mut session = Session::new();
    small_program(&mut session);
    let mut out = Vec::new();
    let mut input = std::io::empty();
    assert!(matches!(session.run(&mut out, &mut input), Err(RunError::NotReady)));
}

#[test]
fn editing_after_compile_reverts_to_dirty() {
    let mut session = Session::new();
    small_program(&mut session);
    session.compile();
    assert_eq!(session.state, LifecycleState::Ready);
    session.set_line(40, Some("REM noop")).unwrap();
    assert_eq!(session.state, LifecycleState::Dirty);
}

#[test]
fn save_then_load_round_trips_the_source_buffer() {
    let path = "session_roundtrip_test.bas";
    let mut session = Session::new();
    small_program(&mut session);
    session.save(path).unwrap();

    let mut loaded = Session::new();
    loaded.load(path).unwrap();
    std::fs::remove_file(path).unwrap();

    assert_eq!(loaded.lines, session.lines);
}

#[test]
fn load_rejects_out_of_order_lines() {
    let path = "session_bad_order_test.bas";
    std::fs::write(path, "20 PRINT 1\n10 PRINT 2\n").unwrap();
    let mut session = Session::new();
    let err = session.load(path).unwrap_err();
    std::fs::remove_file(path).unwrap();
    assert_eq!(err, Error::InvalLineOrder);
}

#[test]
fn compile_to_file_then_load_compiled_runs_identically() {
    let path = "session_compiled_test.basc";
    let mut session = Session::new();
    small_program(&mut session);
    session.compile_to_file(path).unwrap();

    let mut loaded = Session::new();
    loaded.load_compiled(path).unwrap();
    std::fs::remove_file(path).unwrap();
    assert_eq!(loaded.state, LifecycleState::Ready);

    let mut out = Vec::new();
    let mut input = std::io::empty();
    let outcome = loaded.run(&mut out, &mut input).unwrap();
    assert_eq!(outcome, Outcome::Ended);
    assert_eq!(String::from_utf8(out).unwrap(), " 5 \n");
}

#[test]
fn renum_reindexes_lines_preserving_order_and_text() {
    let mut session = Session::new();
    small_program(&mut session);
    session.renum(100, 100);
    let nums: Vec<i32> = session.lines.keys().copied().collect();
    assert_eq!(nums, vec![100, 200, 300, 400]);
    assert_eq!(session.lines.get(&300).unwrap(), "PRINT A + B");
}

#[test]
fn new_program_clears_everything() {
    let mut session = Session::new();
    small_program(&mut session);
    session.compile();
    session.new_program();
    assert!(session.lines.is_empty());
    assert_eq!(session.state, LifecycleState::Dirty);
}

#[test]
fn parse_command_recognizes_a_source_line() {
    assert_eq!(
        parse_command("10 LET A = 1").unwrap(),
        Command::SourceLine { num: 10, text: Some("LET A = 1".to_string()) }
    );
    assert_eq!(
        parse_command("10").unwrap(),
        Command::SourceLine { num: 10, text: None }
    );
}

#[test]
fn parse_command_recognizes_named_commands_case_insensitively() {
    assert_eq!(parse_command("run").unwrap(), Command::Run);
    assert_eq!(parse_command("RUN").unwrap(), Command::Run);
    assert_eq!(parse_command("quit").unwrap(), Command::Quit);
    assert_eq!(parse_command("bye").unwrap(), Command::Quit);
    assert_eq!(parse_command("new").unwrap(), Command::New);
    assert_eq!(parse_command("help").unwrap(), Command::Help);
}

#[test]
fn parse_command_list_accepts_an_optional_range() {
    assert_eq!(parse_command("LIST").unwrap(), Command::List { from: None, to: None });
    assert_eq!(parse_command("LIST 10").unwrap(), Command::List { from: Some(10), to: Some(10) });
    assert_eq!(parse_command("LIST 10,30").unwrap(), Command::List { from: Some(10), to: Some(30) });
}

#[test]
fn parse_command_debug_accepts_on_off_or_nothing() {
    assert_eq!(parse_command("DEBUG").unwrap(), Command::Debug(None));
    assert_eq!(parse_command("DEBUG ON").unwrap(), Command::Debug(Some(true)));
    assert_eq!(parse_command("DEBUG OFF").unwrap(), Command::Debug(Some(false)));
    assert!(parse_command("DEBUG MAYBE").is_err());
}

#[test]
fn parse_command_save_load_compile_require_a_filename() {
    assert!(parse_command("SAVE").is_err());
    assert_eq!(parse_command("SAVE prog.bas").unwrap(), Command::Save("prog.bas".to_string()));
    assert_eq!(parse_command("LOAD prog.bas").unwrap(), Command::Load("prog.bas".to_string()));
    assert_eq!(parse_command("COMPILE prog.basc").unwrap(), Command::Compile("prog.basc".to_string()));
}

#[test]
fn parse_command_rejects_unknown_words() {
    assert!(parse_command("FROBNICATE").is_err());
}

#[test]
fn parse_command_recognizes_disasm() {
    assert_eq!(parse_command("DISASM").unwrap(), Command::Disasm);
}

#[test]
fn disassemble_is_none_before_a_compile_and_some_after() {
    let mut session = Session::new();
    small_program(&mut session);
    assert!(session.disassemble().is_none());
    session.compile();
    let listing = session.disassemble().unwrap();
    assert!(listing.contains("PushNum") || listing.contains("GetVar"));
    assert!(listing.contains("End"));
}
