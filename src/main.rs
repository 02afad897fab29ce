use clap::Parser;
use ellu_dl::cli::{self, Args};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Args::parse();
    match cli::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let chain = cli::error_chain(&e);
            if args.verbose {
                eprintln!("error: {}", chain[0]);
                for cause in &chain[1..] {
                    eprintln!("  caused by: {}", cause);
                }
            } else {
                eprintln!("error: {}", chain.join(": "));
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
