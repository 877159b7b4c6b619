use super::CliError;
use super::helpers::*;
use halo_core::common::config::{HaloModelConfig, load_config};
use halo_core::common::naming::{checkpoint_prefix, profile_prefix, surface_prefix, table_prefix};
use halo_core::halos::load_halos;
use halo_core::power::PowerSpectrumEngine;
use halo_core::profiles::{generate_profile_table, generate_surface_table, load_or_compute_profiles};
use halo_core::table::{TableFormat, read_table};
use halo_core::tabulation::{TableRequest, generate_ps};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Clone, Copy, clap::ValueEnum)]
pub(super) enum FormatArg {
    /// Named datasets
    Dset,
    /// Fixed-order sequential records
    Bin,
}

impl From<FormatArg> for TableFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Dset => TableFormat::Dataset,
            FormatArg::Bin => TableFormat::Sequential,
        }
    }
}

#[derive(clap::Args)]
pub(super) struct InputArgs {
    /// Halo-model configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Tabulated halo population (JSON)
    #[arg(long)]
    halos: PathBuf,

    /// Directory for generated tables
    #[arg(long, default_value = ".")]
    destination: PathBuf,

    /// Overwrite existing tables
    #[arg(long)]
    clobber: bool,
}

#[derive(clap::Args)]
pub(super) struct WorkerFlags {
    /// Rank of this worker within its group
    #[arg(long, default_value_t = 0)]
    rank: usize,

    /// Number of cooperating workers
    #[arg(long, default_value_t = 1)]
    size: usize,

    /// Shared directory the workers rendezvous in; must start empty
    #[arg(long)]
    rendezvous: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct TabulateArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Table format used for the default file name
    #[arg(long, value_enum, default_value = "dset")]
    format: FormatArg,

    /// Explicit output file; its suffix decides the format
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory of per-worker checkpoint logs [default: <destination>/tmp]
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Do not read or write checkpoint logs
    #[arg(long)]
    no_checkpoint: bool,

    /// Use the linear matter power spectrum only
    #[arg(long)]
    linear: bool,

    /// Directory searched for a profile table [default: <destination>]
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Tabulate the profile in memory when no table is found
    #[arg(long)]
    tabulate_profiles: bool,

    #[command(flatten)]
    workers: WorkerFlags,
}

#[derive(clap::Args)]
pub(super) struct ProfileTableArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Also tabulate NFW surface densities
    #[arg(long)]
    surface: bool,

    #[command(flatten)]
    workers: WorkerFlags,
}

#[derive(clap::Args)]
pub(super) struct InspectArgs {
    /// Power-spectrum table (.dset or .bin)
    table: PathBuf,
}

#[derive(clap::Args)]
#[command(group(clap::ArgGroup::new("scale").required(true).args(["k", "r"])))]
pub(super) struct QueryArgs {
    /// Power-spectrum table (.dset or .bin)
    table: PathBuf,

    /// Redshift; rows are interpolated linearly in z
    #[arg(long)]
    z: f64,

    /// Wavenumbers in 1/cMpc, comma separated
    #[arg(long, value_delimiter = ',')]
    k: Vec<f64>,

    /// Separations in cMpc, comma separated
    #[arg(long, value_delimiter = ',')]
    r: Vec<f64>,
}

#[derive(clap::Args)]
pub(super) struct PrefixArgs {
    /// Halo-model configuration (JSON)
    #[arg(long)]
    config: PathBuf,
}

#[derive(Serialize)]
struct TabulateSummary {
    path: PathBuf,
    rank: usize,
    written: bool,
    computed: Vec<f64>,
    resumed: Vec<f64>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct ProfileTableSummary {
    profile: PathBuf,
    surface: Option<PathBuf>,
}

#[derive(Serialize)]
struct PrefixSummary {
    table: String,
    checkpoint: String,
    profile: String,
    surface: String,
}

pub(super) fn run_tabulate_command(args: TabulateArgs) -> Result<i32, CliError> {
    let mut config = load_inputs_config(&args.input)?;
    if args.no_checkpoint {
        config.checkpoint = false;
    }
    if args.linear {
        config.linear_only = true;
    }

    let halos = load_halos(&args.input.halos).map_err(CliError::Compute)?;
    let communicator = open_communicator(
        args.workers.rank,
        args.workers.size,
        args.workers.rendezvous.as_deref(),
    )?;

    let profile_dir = args
        .profile_dir
        .unwrap_or_else(|| args.input.destination.clone());
    let lookup = load_or_compute_profiles(
        &config,
        &halos,
        &profile_dir,
        args.tabulate_profiles,
        communicator.as_ref(),
    )
    .map_err(CliError::Compute)?;
    let engine =
        PowerSpectrumEngine::new(&config, &halos, lookup.profile).map_err(CliError::Compute)?;

    let mut request = TableRequest::new(args.input.destination);
    request.format = args.format.into();
    request.output = args.output;
    if let Some(checkpoint_dir) = args.checkpoint_dir {
        request.checkpoint_dir = checkpoint_dir;
    }

    let generated =
        generate_ps(&config, &engine, communicator.as_ref(), &request).map_err(CliError::Compute)?;

    let mut warnings = warning_lines(&lookup.warnings);
    warnings.extend(warning_lines(&generated.report.warnings));
    print_json(&TabulateSummary {
        path: generated.path,
        rank: communicator.context().rank(),
        written: generated.written,
        computed: generated.report.computed,
        resumed: generated.report.resumed,
        warnings,
    })?;
    Ok(0)
}

pub(super) fn run_profile_table_command(args: ProfileTableArgs) -> Result<i32, CliError> {
    let config = load_inputs_config(&args.input)?;
    let halos = load_halos(&args.input.halos).map_err(CliError::Compute)?;
    let communicator = open_communicator(
        args.workers.rank,
        args.workers.size,
        args.workers.rendezvous.as_deref(),
    )?;
    let destination = &args.input.destination;

    let profile = generate_profile_table(
        &config,
        &halos,
        destination,
        config.clobber,
        communicator.as_ref(),
    )
    .map_err(CliError::Compute)?;
    let surface = if args.surface {
        Some(
            generate_surface_table(
                &config,
                &halos,
                destination,
                config.clobber,
                communicator.as_ref(),
            )
            .map_err(CliError::Compute)?,
        )
    } else {
        None
    };

    if communicator.context().is_leader() {
        print_json(&ProfileTableSummary { profile, surface })?;
    }
    Ok(0)
}

pub(super) fn run_inspect_command(args: InspectArgs) -> Result<i32, CliError> {
    let table = read_table(&args.table).map_err(CliError::Compute)?;
    print_json(&TableSummary::of(&args.table, &table))?;
    Ok(0)
}

pub(super) fn run_query_command(args: QueryArgs) -> Result<i32, CliError> {
    let table = read_table(&args.table).map_err(CliError::Compute)?;
    if !args.k.is_empty() {
        for k in &args.k {
            let value = table.ps_at(args.z, *k).map_err(CliError::Compute)?;
            println!("{:.8e} {:.8e}", k, value);
        }
    } else {
        for r in &args.r {
            let value = table.cf_at(args.z, *r).map_err(CliError::Compute)?;
            println!("{:.8e} {:.8e}", r, value);
        }
    }
    Ok(0)
}

pub(super) fn run_prefix_command(args: PrefixArgs) -> Result<i32, CliError> {
    let config = load_config(&args.config).map_err(CliError::Compute)?;
    let summary = PrefixSummary {
        table: table_prefix(&config).map_err(CliError::Compute)?,
        checkpoint: checkpoint_prefix(&config).map_err(CliError::Compute)?,
        profile: profile_prefix(&config).map_err(CliError::Compute)?,
        surface: surface_prefix(&config).map_err(CliError::Compute)?,
    };
    print_json(&summary)?;
    Ok(0)
}

fn load_inputs_config(input: &InputArgs) -> Result<HaloModelConfig, CliError> {
    let mut config = load_config(&input.config).map_err(CliError::Compute)?;
    if input.clobber {
        config.clobber = true;
    }
    Ok(config)
}
