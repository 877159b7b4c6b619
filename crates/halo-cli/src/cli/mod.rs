mod commands;
mod helpers;

use clap::Parser;
use halo_core::domain::HaloError;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let diagnostic = error.as_halo_error();
            eprintln!("{}", diagnostic.diagnostic_line());
            diagnostic.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("halo-ps".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            helpers::init_tracing(cli.log_level.as_deref())?;
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "halo-ps", version, about = "Halo-model matter power spectrum tables")]
struct Cli {
    /// Tracing filter, e.g. `info` or `halo_core=debug`; overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Tabulate P(k) and xi(R) over the configured redshifts and write the table
    Tabulate(commands::TabulateArgs),
    /// Tabulate the configured Fourier profile (and optionally NFW surface densities)
    ProfileTable(commands::ProfileTableArgs),
    /// Summarize a power-spectrum table
    Inspect(commands::InspectArgs),
    /// Interpolate P(k) or xi(R) from a power-spectrum table
    Query(commands::QueryArgs),
    /// Print the file prefixes derived from a configuration
    Prefix(commands::PrefixArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Tabulate(args) => commands::run_tabulate_command(args),
        CliCommand::ProfileTable(args) => commands::run_profile_table_command(args),
        CliCommand::Inspect(args) => commands::run_inspect_command(args),
        CliCommand::Query(args) => commands::run_query_command(args),
        CliCommand::Prefix(args) => commands::run_prefix_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(HaloError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_halo_error(&self) -> HaloError {
        match self {
            Self::Usage(message) => {
                HaloError::configuration("CONFIG.CLI_USAGE", message.trim_end().to_string())
            }
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => HaloError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
