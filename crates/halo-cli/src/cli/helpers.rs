use super::CliError;
use anyhow::Context;
use halo_core::domain::TabulationWarning;
use halo_core::table::PsTable;
use halo_core::tabulation::{Communicator, FileCommunicator, SoloCommunicator, WorkerContext};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the stderr subscriber. `--log-level` wins over `RUST_LOG`, which
/// wins over `info`.
pub(super) fn init_tracing(log_level: Option<&str>) -> Result<(), CliError> {
    let filter = match log_level {
        Some(directive) => EnvFilter::try_new(directive).map_err(|error| {
            CliError::Usage(format!("invalid --log-level '{}': {}", directive, error))
        })?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    // Repeated runs in one process keep the first subscriber.
    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
    Ok(())
}

/// Solo worker unless a group is requested, in which case every rank must
/// share the same fresh rendezvous directory.
pub(super) fn open_communicator(
    rank: usize,
    size: usize,
    rendezvous: Option<&Path>,
) -> Result<Box<dyn Communicator>, CliError> {
    if size == 1 && rank == 0 && rendezvous.is_none() {
        return Ok(Box::new(SoloCommunicator));
    }

    let directory = rendezvous.ok_or_else(|| {
        CliError::Usage(format!(
            "--rendezvous is required for a worker group (rank {} of {})",
            rank, size
        ))
    })?;
    let context = WorkerContext::new(rank, size).map_err(|error| CliError::Compute(error.into()))?;
    let communicator = FileCommunicator::new(directory.to_path_buf(), context)
        .map_err(|error| CliError::Compute(error.into()))?;
    Ok(Box::new(communicator))
}

pub(super) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{}", rendered);
    Ok(())
}

pub(super) fn warning_lines(warnings: &[TabulationWarning]) -> Vec<String> {
    warnings.iter().map(ToString::to_string).collect()
}

#[derive(Debug, Serialize)]
pub(super) struct GridSummary {
    pub(super) count: usize,
    pub(super) min: Option<f64>,
    pub(super) max: Option<f64>,
}

impl GridSummary {
    pub(super) fn of(values: &[f64]) -> Self {
        Self {
            count: values.len(),
            min: values.first().copied(),
            max: values.last().copied(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct TableSummary {
    pub(super) path: PathBuf,
    pub(super) version: String,
    pub(super) mass_function: String,
    pub(super) redshift: GridSummary,
    pub(super) wavenumber: GridSummary,
    pub(super) radius: GridSummary,
}

impl TableSummary {
    pub(super) fn of(path: &Path, table: &PsTable) -> Self {
        Self {
            path: path.to_path_buf(),
            version: table.provenance.version.clone(),
            mass_function: table.provenance.mass_function.clone(),
            redshift: GridSummary::of(&table.tab_z),
            wavenumber: GridSummary::of(&table.tab_k),
            radius: GridSummary::of(&table.tab_r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GridSummary, open_communicator};
    use crate::cli::CliError;

    #[test]
    fn single_worker_needs_no_rendezvous() {
        let communicator = open_communicator(0, 1, None).expect("solo");
        assert!(communicator.context().is_leader());
    }

    #[test]
    fn worker_group_without_rendezvous_is_a_usage_error() {
        let error = open_communicator(1, 2, None).err().expect("missing rendezvous");
        assert!(matches!(error, CliError::Usage(_)));
    }

    #[test]
    fn empty_grid_summary_has_no_bounds() {
        let summary = GridSummary::of(&[]);
        assert_eq!(summary.count, 0);
        assert!(summary.min.is_none());
    }
}
