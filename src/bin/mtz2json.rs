use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use mtzjson::convert::{mtz_to_json, ConvertError, ExportOptions, Outcome};

#[derive(Parser)]
#[command(
    name = "mtz2json",
    version,
    about = "Convert an MTZ reflection file to JSON",
    disable_version_flag = true
)]
struct Cli {
    /// Write the JSON document on a single line
    #[arg(short, long)]
    compact: bool,
    /// Do not add timestamp to history
    #[arg(short = 'n', long)]
    no_timestamp: bool,
    /// Allow the output path to equal the input path
    #[arg(short, long)]
    force: bool,
    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
    /// MTZ file to read
    input: PathBuf,
    /// JSON file to write
    output: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.input == cli.output && !cli.force {
        eprintln!("Input and output filenames must be different.");
        return ExitCode::FAILURE;
    }

    let options = ExportOptions {
        compact:    cli.compact,
        provenance: !cli.no_timestamp,
        ..ExportOptions::default()
    };
    let result = mtz_to_json(&cli.input, &cli.output, &options);
    match &result {
        Ok(()) => println!("{}", cli.output.display()),
        Err(e @ ConvertError::ReadInput { .. }) => {
            tracing::error!("{e}");
            println!("No such file.");
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Failed.");
        }
    }
    ExitCode::from(Outcome::of(&result).exit_code())
}
