use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use mtzjson::convert::{json_to_mtz, ImportOptions, Outcome};

#[derive(Parser)]
#[command(
    name = "json2mtz",
    version,
    about = "Convert a JSON reflection document to an MTZ file",
    disable_version_flag = true
)]
struct Cli {
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
    /// JSON file to read
    input: PathBuf,
    /// MTZ file to write
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

    let options = ImportOptions {
        provenance: !cli.no_timestamp,
        ..ImportOptions::default()
    };
    let result = json_to_mtz(&cli.input, &cli.output, &options);
    let outcome = Outcome::of(&result);
    if let Err(e) = &result {
        tracing::error!("{e}");
    }
    match outcome {
        Outcome::Success => println!("{}", cli.output.display()),
        Outcome::InputUnreadable => eprintln!("Unable to read JSON file."),
        Outcome::ConversionOrWriteFailed => {
            eprintln!("Unable to convert to MTZ file / write MTZ file.")
        }
    }
    ExitCode::from(outcome.exit_code())
}
