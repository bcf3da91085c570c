//! The CLI binary: argument parsing, the SIGINT break flag, and a thin
//! line-editor REPL around [`bas55::Session`].

#[macro_use]
extern crate clap;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Arg;

use bas55::{parse_command, Command, LifecycleState, Session};
use bc_core::error::Diagnostic;
use bc_core::vm::Outcome;

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        eprintln!("{}", d);
    }
}

fn install_break_handler(session: &Session) {
    let flag = session.break_flag.clone();
    let _ = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed));
}

/// Loads and runs one file non-interactively (`bas55 [-l] [-g N] [-d]
/// FILE`). Returns the process exit code: 0 on a normal `END`/`STOP`, 1 on
/// a load/compile/run failure.
fn run_file(path: &str, load_compiled: bool, gosub_capacity: usize, debug: bool) -> u8 {
    let mut session = Session::new();
    session.gosub_capacity = gosub_capacity;
    session.debug = debug;
    install_break_handler(&session);

    if load_compiled {
        if let Err(e) = session.load_compiled(path) {
            eprintln!("error: {}", e);
            return 1;
        }
    } else {
        if let Err(e) = session.load(path) {
            eprintln!("error: {}", e);
            return 1;
        }
        let diagnostics = session.compile();
        print_diagnostics(&diagnostics);
        if session.state != LifecycleState::Ready {
            return 1;
        }
    }

    if debug {
        if let Some(listing) = session.disassemble() {
            print!("{}", listing);
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stdin = io::stdin();
    let mut input = stdin.lock();
    match session.run(&mut out, &mut input) {
        Ok(Outcome::Ended) => 0,
        Ok(Outcome::Broken(line)) => {
            println!("* break at {} *", line);
            0
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

/// The interactive editor: reads command lines from stdin until `QUIT`/
/// `BYE` or end of input. Each line is either a bare numbered source line
/// or one of the named commands.
fn run_editor(gosub_capacity: usize, debug: bool) {
    let mut session = Session::new();
    session.gosub_capacity = gosub_capacity;
    session.debug = debug;
    install_break_handler(&session);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let line = match lines.next() {
            Some(Ok(l)) => l,
            Some(Err(_)) | None => break,
        };

        let command = match parse_command(&line) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {}", e);
                continue;
            }
        };

        match command {
            Command::SourceLine { num, text } => {
                if let Err(e) = session.set_line(num, text.as_deref()) {
                    eprintln!("error: {}", e);
                }
            }
            Command::Run => {
                let diagnostics = session.compile();
                print_diagnostics(&diagnostics);
                if session.state != LifecycleState::Ready {
                    continue;
                }
                if session.debug {
                    if let Some(listing) = session.disassemble() {
                        print!("{}", listing);
                    }
                }
                let stdout = io::stdout();
                let mut out = stdout.lock();
                let stdin = io::stdin();
                let mut input = stdin.lock();
                match session.run(&mut out, &mut input) {
                    Ok(Outcome::Ended) => {}
                    Ok(Outcome::Broken(at)) => println!("* break at {} *", at),
                    Err(e) => eprintln!("{}", e),
                }
            }
            Command::List { from, to } => print!("{}", session.list(from, to)),
            Command::Save(path) => {
                if let Err(e) = session.save(&path) {
                    eprintln!("error: {}", e);
                }
            }
            Command::Load(path) => {
                if let Err(e) = session.load(&path) {
                    eprintln!("error: {}", e);
                }
            }
            Command::Renum => session.renum(10, 10),
            Command::New => session.new_program(),
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Debug(on) => {
                session.debug = on.unwrap_or(!session.debug);
                println!("debug is {}", if session.debug { "on" } else { "off" });
            }
            Command::SetGosub(n) => session.gosub_capacity = n,
            Command::Compile(path) => match session.compile_to_file(&path) {
                Ok(diagnostics) => print_diagnostics(&diagnostics),
                Err(bas55::CompileToFileError::CompileFailed(diagnostics)) => {
                    print_diagnostics(&diagnostics);
                }
                Err(bas55::CompileToFileError::Write(e)) => eprintln!("error: {}", e),
            },
            Command::Disasm => {
                let diagnostics = session.compile();
                print_diagnostics(&diagnostics);
                match session.disassemble() {
                    Some(listing) => print!("{}", listing),
                    None => eprintln!("error: program has no clean compile to disassemble"),
                }
            }
        }
    }
}

fn print_help() {
    println!("RUN                  compile and execute the program");
    println!("LIST [start[,end]]   list source lines");
    println!("SAVE fname           write the source buffer to fname");
    println!("LOAD fname           replace the source buffer from fname");
    println!("RENUM                renumber lines starting at 10, step 10");
    println!("NEW                  clear the source buffer");
    println!("COMPILE fname        compile and write a .basc image");
    println!("DISASM               compile and print a bytecode listing");
    println!("DEBUG [ON|OFF]       toggle uninitialized-variable warnings and trace output");
    println!("SETGOSUB n           set the GOSUB stack capacity");
    println!("QUIT / BYE           exit the editor");
    println!("<num> <text>         add or replace a source line");
    println!("<num>                delete a source line");
}

fn print_version() {
    println!("{} {}", crate_name!(), crate_version!());
    println!("An interactive interpreter for ECMA-55 Minimal BASIC.");
    println!("Copyright (C) {}.", crate_authors!());
}

fn main() -> ExitCode {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("PROGRAM")
                .help("BASIC source file to load, compile and run")
                .index(1),
        )
        .arg(
            Arg::with_name("load-compiled")
                .short("l")
                .long("load-compiled")
                .help("Treat PROGRAM as a previously COMPILEd .basc image"),
        )
        .arg(
            Arg::with_name("gosub-stack")
                .short("g")
                .long("gosub-stack")
                .takes_value(true)
                .value_name("N")
                .default_value("256")
                .help("Sets the GOSUB return-address stack capacity"),
        )
        .arg(
            Arg::with_name("debug")
                .short("d")
                .long("debug")
                .help("Start with uninitialized-variable warnings on"),
        )
        .arg(Arg::with_name("version").short("v").long("version").help("Print version and exit"))
        .get_matches();

    if matches.is_present("version") {
        print_version();
        return ExitCode::SUCCESS;
    }

    let gosub_capacity = value_t!(matches.value_of("gosub-stack"), usize).unwrap_or_else(|e| e.exit());
    let debug = matches.is_present("debug");

    let code = match matches.value_of("PROGRAM") {
        Some(path) => run_file(path, matches.is_present("load-compiled"), gosub_capacity, debug),
        None => {
            run_editor(gosub_capacity, debug);
            0
        }
    };

    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(code)
    }
}
