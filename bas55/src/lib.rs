//! Session state and editor-command handling that sits on top of
//! `basrt` (compilation) and `bc-core` (execution): the program-lifecycle
//! state machine ("Idle -> Dirty -> {Ready, Errors}"), the numbered-line
//! source buffer, and the small set of editor commands (RUN, LIST, SAVE,
//! LOAD, RENUM, NEW, QUIT, HELP, DEBUG, SETGOSUB, COMPILE). `main.rs` is a
//! thin REPL shell around [`Session`]; everything that can be unit-tested
//! without a terminal lives here.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, Write};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bc_core::error::{Diagnostic, Error};
use bc_core::vm::Outcome;
use bc_core::CompiledProgram;
use bc_core::{LINE_MAX_CHARS, LINE_NUM_MAX};

/// Default GOSUB return-address stack capacity (`-g`'s default).
pub const DEFAULT_GOSUB_CAPACITY: usize = 256;

/// Whether the in-memory program matches what was last compiled. Any edit
/// (`set_line`, `load`, `new_program`, `renum`) reverts `Dirty`; `compile`
/// moves to `Ready` or `Errors`; `run` requires `Ready`.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum LifecycleState {
    Dirty,
    Errors,
    Ready,
}

/// All mutable state for one editing/running session: the numbered-line
/// source buffer plus whatever the last successful compile produced, kept
/// as a plain `Option<CompiledProgram>` since `bc-core` already bundles
/// everything a RUN needs into that one value.
pub struct Session {
    pub lines: BTreeMap<i32, String>,
    pub state: LifecycleState,
    compiled: Option<CompiledProgram>,
    pub debug: bool,
    pub gosub_capacity: usize,
    pub break_flag: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Session {
            lines: BTreeMap::new(),
            state: LifecycleState::Dirty,
            compiled: None,
            debug: false,
            gosub_capacity: DEFAULT_GOSUB_CAPACITY,
            break_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adds, replaces, or (when `text` is `None`/empty) deletes a numbered
    /// source line, per `cmd.c`'s `parse_n_run_cmd`/`line.c`'s
    /// `add_line`/`del_line`. Any edit invalidates the compiled state.
    pub fn set_line(&mut self, num: i32, text: Option<&str>) -> Result<(), Error> {
        if num <= 0 || num > LINE_NUM_MAX {
            return Err(Error::InvalLineNum);
        }
        match text {
            None => {
                self.lines.remove(&num);
            }
            Some(t) if t.is_empty() => {
                self.lines.remove(&num);
            }
            Some(t) => {
                if t.len() > LINE_MAX_CHARS {
                    return Err(Error::LineTooLong);
                }
                self.lines.insert(num, t.to_string());
            }
        }
        self.state = LifecycleState::Dirty;
        Ok(())
    }

    /// Compiles the current source buffer. Always sets `state` to either
    /// `Ready` or `Errors`, and returns every diagnostic (the compile-error/
    /// warning and run-time-warning streams share the same `stderr`-prefixed
    /// convention).
    pub fn compile(&mut self) -> Vec<Diagnostic> {
        let (compiled, diagnostics) = basrt::compile(&self.lines);
        self.state = if compiled.is_some() { LifecycleState::Ready } else { LifecycleState::Errors };
        self.compiled = compiled;
        diagnostics
    }

    /// Runs the last compiled program. `RUN` requires `Ready`; an edit
    /// since the last compile, or a compile that failed, makes this
    /// unavailable.
    pub fn run(
        &mut self,
        out: &mut dyn Write,
        input: &mut dyn BufRead,
    ) -> Result<Outcome, RunError> {
        if self.state != LifecycleState::Ready {
            return Err(RunError::NotReady);
        }
        let program = self.compiled.as_mut().expect("Ready implies a compiled program");
        program
            .run(out, input, Some(&self.break_flag), self.gosub_capacity, self.debug)
            .map_err(RunError::Fatal)
    }

    /// A mnemonic listing of the last compiled program's bytecode, for
    /// `DISASM`/`-d` debug output. `None` before a successful compile.
    pub fn disassemble(&self) -> Option<String> {
        self.compiled.as_ref().map(|p| bc_core::code::disassemble(&p.code))
    }

    pub fn list(&self, from: Option<i32>, to: Option<i32>) -> String {
        let mut s = String::new();
        for (&num, text) in &self.lines {
            if from.map_or(true, |f| num >= f) && to.map_or(true, |t| num <= t) {
                s.push_str(&num.to_string());
                s.push(' ');
                s.push_str(text);
                s.push('\n');
            }
        }
        s
    }

    /// Persists the source buffer as plain ASCII, one `"<num> <text>"` line
    /// per statement, strictly ascending — the buffer is a `BTreeMap`, so
    /// it already is.
    pub fn save(&self, path: &str) -> Result<(), Error> {
        let mut out = String::new();
        for (num, text) in &self.lines {
            out.push_str(&num.to_string());
            out.push(' ');
            out.push_str(text);
            out.push('\n');
        }
        fs::write(path, out).map_err(|_| Error::Fopen)
    }

    /// Loads a plain-text source file, replacing the current buffer.
    /// Rejects anything that doesn't match the persisted-source grammar:
    /// a positive line number, a single separating space/tab, then up to
    /// `LINE_MAX_CHARS` characters, lines strictly ascending by number.
    pub fn load(&mut self, path: &str) -> Result<(), Error> {
        let text = fs::read_to_string(path).map_err(|_| Error::Fopen)?;
        let mut lines = BTreeMap::new();
        let mut last_num = 0;
        for raw in text.lines() {
            if raw.is_empty() {
                continue;
            }
            let sep = raw.find(|c: char| c == ' ' || c == '\t').ok_or(Error::SpaceLineNum)?;
            let (num_str, rest) = raw.split_at(sep);
            let num: i32 = num_str.parse().map_err(|_| Error::InvalLineNum)?;
            if num <= 0 || num > LINE_NUM_MAX {
                return Err(Error::InvalLineNum);
            }
            if num <= last_num {
                return Err(Error::InvalLineOrder);
            }
            last_num = num;
            let body = &rest[1..];
            if body.len() > LINE_MAX_CHARS {
                return Err(Error::LineTooLong);
            }
            if lines.insert(num, body.to_string()).is_some() {
                return Err(Error::DupLine);
            }
        }
        self.lines = lines;
        self.state = LifecycleState::Dirty;
        Ok(())
    }

    /// `COMPILE fname`: compiles the current buffer and, only if it
    /// succeeds, writes the resulting image to a `.basc` file via
    /// `basfile`.
    pub fn compile_to_file(&mut self, path: &str) -> Result<Vec<Diagnostic>, CompileToFileError> {
        let diagnostics = self.compile();
        match &self.compiled {
            Some(program) => {
                basfile::write_file(path, program).map_err(CompileToFileError::Write)?;
                Ok(diagnostics)
            }
            None => Err(CompileToFileError::CompileFailed(diagnostics)),
        }
    }

    /// `bas55 -l FILE`/LOAD of a previously `COMPILE`d image: skips
    /// source compilation entirely and jumps straight to `Ready`.
    pub fn load_compiled(&mut self, path: &str) -> Result<(), basfile::Error> {
        let program = basfile::read_file(path)?;
        self.compiled = Some(program);
        self.lines.clear();
        self.state = LifecycleState::Ready;
        Ok(())
    }

    /// Renumbers every line starting at `start`, stepping by `step`.
    /// Intentionally does not rewrite `GOTO`/`GOSUB`/`THEN` targets
    /// elsewhere in the source: a renumber that silently rewrites jump
    /// targets embedded in arbitrary statement text is its own feature
    /// with its own edge cases (a numeric literal that isn't a jump
    /// target, a line-number-shaped DATA item), not something this state
    /// machine should guess at. Callers that need a safe renumber should
    /// `LIST`, edit, and reload rather than rely on reference rewriting.
    pub fn renum(&mut self, start: i32, step: i32) {
        let renumbered: BTreeMap<i32, String> = self
            .lines
            .iter()
            .enumerate()
            .map(|(i, (_, text))| (start + i as i32 * step, text.clone()))
            .collect();
        self.lines = renumbered;
        self.state = LifecycleState::Dirty;
    }

    pub fn new_program(&mut self) {
        self.lines.clear();
        self.compiled = None;
        self.state = LifecycleState::Dirty;
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

#[derive(Debug)]
pub enum RunError {
    NotReady,
    Fatal(Diagnostic),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RunError::NotReady => write!(f, "error: program has no clean compile to run"),
            RunError::Fatal(d) => write!(f, "{}", d),
        }
    }
}

#[derive(Debug)]
pub enum CompileToFileError {
    CompileFailed(Vec<Diagnostic>),
    Write(basfile::Error),
}

/// One parsed line of editor input: either a bare numbered source line
/// (add/replace/delete) or a named command.
#[derive(Debug, PartialEq)]
pub enum Command {
    SourceLine { num: i32, text: Option<String> },
    Run,
    List { from: Option<i32>, to: Option<i32> },
    Save(String),
    Load(String),
    Renum,
    New,
    Quit,
    Help,
    Debug(Option<bool>),
    SetGosub(usize),
    Compile(String),
    Disasm,
}

/// Parses one line of interactive input into a [`Command`], per `cmd.c`'s
/// `parse_n_run_cmd` dispatch. A line starting with a digit is a source
/// line; otherwise the first whitespace-delimited word (case-insensitive)
/// names a command.
pub fn parse_command(line: &str) -> Result<Command, Error> {
    let trimmed = line.trim_end();
    if trimmed.is_empty() {
        return Err(Error::EmptyLine);
    }

    if trimmed.chars().next().unwrap().is_ascii_digit() {
        let sep = trimmed.find(|c: char| c == ' ' || c == '\t');
        let (num_str, rest) = match sep {
            Some(i) => (&trimmed[..i], trimmed[i + 1..].trim_start()),
            None => (trimmed, ""),
        };
        let num: i32 = num_str.parse().map_err(|_| Error::InvalLineNum)?;
        if num <= 0 || num > LINE_NUM_MAX {
            return Err(Error::InvalLineNum);
        }
        let text = if rest.is_empty() { None } else { Some(rest.to_string()) };
        return Ok(Command::SourceLine { num, text });
    }

    let mut words = trimmed.split_whitespace();
    let cmd = words.next().unwrap().to_ascii_uppercase();
    let rest: Vec<&str> = words.collect();

    match cmd.as_str() {
        "RUN" => Ok(Command::Run),
        "LIST" => match rest.first() {
            None => Ok(Command::List { from: None, to: None }),
            Some(spec) => {
                let mut parts = spec.splitn(2, ',');
                let from = parts.next().filter(|s| !s.is_empty()).map(|s| s.parse()).transpose().map_err(|_| Error::InvalCmd)?;
                let to = parts.next().filter(|s| !s.is_empty()).map(|s| s.parse()).transpose().map_err(|_| Error::InvalCmd)?;
                Ok(Command::List { from, to: to.or(from) })
            }
        },
        "SAVE" => rest.first().map(|f| Command::Save(f.to_string())).ok_or(Error::BadNargs),
        "LOAD" => rest.first().map(|f| Command::Load(f.to_string())).ok_or(Error::BadNargs),
        "RENUM" => Ok(Command::Renum),
        "NEW" => Ok(Command::New),
        "QUIT" | "BYE" => Ok(Command::Quit),
        "HELP" => Ok(Command::Help),
        "DEBUG" => match rest.first().map(|s| s.to_ascii_uppercase()) {
            None => Ok(Command::Debug(None)),
            Some(ref s) if s == "ON" => Ok(Command::Debug(Some(true))),
            Some(ref s) if s == "OFF" => Ok(Command::Debug(Some(false))),
            Some(_) => Err(Error::InvalCmd),
        },
        "SETGOSUB" => rest
            .first()
            .and_then(|s| s.parse().ok())
            .map(Command::SetGosub)
            .ok_or(Error::BadNargs),
        "COMPILE" => rest.first().map(|f| Command::Compile(f.to_string())).ok_or(Error::BadNargs),
        "DISASM" => Ok(Command::Disasm),
        _ => Err(Error::InvalCmd),
    }
}

#[cfg(test)]
mod test;
