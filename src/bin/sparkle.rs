use std::io::Read as _;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;

/// Batch raster compositor; reads a Sparkle script from standard input.
#[derive(Parser, Debug)]
#[command(name = "sparkle", version)]
struct Cli {}

fn read_stdin() -> anyhow::Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("read script from standard input")?;
    Ok(input)
}

fn main() -> ExitCode {
    let _cli = Cli::parse();
    let module = std::env::args().next().unwrap_or_else(|| "sparkle".to_owned());

    let input = match read_stdin() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{module}: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match sparkle::run_script(&module, &input) {
        Ok(_) => ExitCode::SUCCESS,
        // Diagnostics were already written to stderr.
        Err(_) => ExitCode::FAILURE,
    }
}
