use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use holt::{File, process};

const USAGE: &str = "\
Usage: holt [FILE]

Reads a proof script from FILE (or stdin) and checks it.

Options:
  -v, --version  Print version
  -h, --help     Print this help
";

fn main() -> ExitCode {
    env_logger::init();

    let mut path: Option<String> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-v" | "--version" => {
                println!("holt {}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            "-h" | "--help" => {
                print!("{}", USAGE);
                return ExitCode::SUCCESS;
            }
            _ if arg.starts_with('-') => {
                eprintln!("unknown option: {}", arg);
                eprint!("{}", USAGE);
                return ExitCode::FAILURE;
            }
            _ => {
                if path.replace(arg).is_some() {
                    eprintln!("expected at most one FILE");
                    eprint!("{}", USAGE);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    let (name, contents) = match &path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(contents) => (path.clone(), contents),
            Err(err) => {
                eprintln!("error: failed to read {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut contents = String::new();
            if let Err(err) = std::io::stdin().read_to_string(&mut contents) {
                eprintln!("error: failed to read stdin: {}", err);
                return ExitCode::FAILURE;
            }
            ("<stdin>".to_owned(), contents)
        }
    };

    match process(Arc::new(File::new(name, contents))) {
        Ok(()) => {
            println!("all good");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
