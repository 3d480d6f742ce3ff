mod cli;
mod exit_codes;
mod logging;
mod output;
mod plan_yaml;
mod presets;
mod run;
mod run_error;

use clap::Parser;
use mimalloc::MiMalloc;

use crate::exit_codes::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Help and version requests exit cleanly; any other parse failure is invalid input.
fn parse_cli() -> Result<cli::Cli, ExitCode> {
    cli::Cli::try_parse().map_err(|err| {
        use clap::error::ErrorKind;
        let _ = err.print();
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
            _ => ExitCode::InvalidInput,
        }
    })
}

fn show_presets(args: cli::PresetsArgs) -> ExitCode {
    match args.show {
        Some(preset) => print!("{}", preset.yaml()),
        None => print!("{}", presets::render_list()),
    }
    ExitCode::Success
}

#[tokio::main]
async fn main() {
    let cli = match parse_cli() {
        Ok(cli) => cli,
        Err(code) => std::process::exit(code.as_i32()),
    };

    logging::init(cli.verbose);

    let code = match cli.command {
        cli::Command::Run(args) => run::run(args).await.unwrap_or_else(|err| {
            eprintln!("{err}");
            err.exit_code()
        }),
        cli::Command::Presets(args) => show_presets(args),
    };

    std::process::exit(code.as_i32());
}
