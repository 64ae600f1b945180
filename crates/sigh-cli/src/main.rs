use std::{env, fs, process::ExitCode};

use sigh::{Runner, SighError, StdPrint};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let dump_ast = args.iter().any(|a| a == "--dump-ast");
    let Some(file_path) = args.iter().find(|a| !a.starts_with("--")) else {
        eprintln!("usage: sigh <file.si> [--dump-ast]");
        return ExitCode::FAILURE;
    };

    let code = match read_file(file_path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runner = match Runner::new(&code, file_path) {
        Ok(runner) => runner,
        Err(err) => {
            report(file_path, &err);
            return ExitCode::FAILURE;
        }
    };

    if dump_ast {
        match serde_json::to_string_pretty(&runner.dump_ast()) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: could not serialize the AST: {err}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    match runner.run(&mut StdPrint) {
        Ok(Some(value)) => {
            eprintln!("program returned: {value:?}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            report(file_path, &err);
            ExitCode::FAILURE
        }
    }
}

fn report(file_path: &str, err: &SighError) {
    match err {
        SighError::Semantic(errors) => {
            for error in errors {
                eprintln!("{file_path}: {error}");
            }
        }
        other => eprintln!("{file_path}: {other}"),
    }
}

fn read_file(file_path: &str) -> Result<String, String> {
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("{file_path} is not a file"));
            }
        }
        Err(err) => {
            return Err(format!("could not read {file_path}: {err}"));
        }
    }
    fs::read_to_string(file_path).map_err(|err| format!("could not read {file_path}: {err}"))
}
