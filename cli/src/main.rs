use runtime::{CliReporter, Runtime};
use std::{env, fs, process, rc::Rc};

fn main() {
    let mut args = env::args().skip(1);
    let subcommand = args.next().unwrap_or_else(|| {
        eprintln!("expected a subcommand");
        process::exit(exitcode::USAGE);
    });
    match subcommand.as_str() {
        "compile" => {
            let path = args.next().unwrap_or_else(|| {
                eprintln!("expected a file path");
                process::exit(exitcode::USAGE);
            });
            if args.next().is_some() {
                eprintln!("unexpected number of arguments");
                process::exit(exitcode::USAGE);
            }
            let source = fs::read_to_string(&path).unwrap_or_else(|err| {
                eprintln!("error reading file: {err}");
                process::exit(exitcode::IOERR);
            });
            let module: Rc<str> = Rc::from(module_name(&path));
            run(&source, module);
        }
        "help" => {
            println!("{}", HELP_TEXT);
        }
        _ => {
            eprintln!("unexpected subcommand '{subcommand}'");
            process::exit(exitcode::USAGE);
        }
    }
}

const HELP_TEXT: &str = "\
usage:
    compile compile <path>    compile a source file and print its bytecode
    compile help              print this message";

fn module_name(path: &str) -> &str {
    let base = path.rsplit('/').next().unwrap_or(path);
    match base.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => base,
    }
}

fn run(source: &str, module: Rc<str>) {
    let reporter = CliReporter::new();
    let mut collaborator = Runtime::new(reporter);
    match compiler::compile(&mut collaborator, Rc::clone(&module), source) {
        Ok(function) => {
            let function = function.borrow();
            print!("{}", function.chunk.disassemble(&module));
        }
        Err(()) => {
            let reporter = collaborator.into_reporter();
            process::exit(if reporter.had_errors() {
                exitcode::DATAERR
            } else {
                exitcode::OK
            });
        }
    }
}
