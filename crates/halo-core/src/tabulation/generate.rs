//! Tabulate-and-save entry point for power-spectrum tables.

use super::manager::{TabulationManager, TabulationReport};
use super::workers::Communicator;
use crate::common::config::HaloModelConfig;
use crate::common::naming::table_prefix;
use crate::domain::{HaloError, HaloResult};
use crate::power::PowerSpectrumEngine;
use crate::table::{TableFormat, write_table};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a generated table goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRequest {
    /// Directory for the default `<prefix>.<suffix>` name.
    pub destination: PathBuf,
    /// Explicit file name; its suffix decides the format.
    pub output: Option<PathBuf>,
    pub format: TableFormat,
    pub checkpoint_dir: PathBuf,
}

impl TableRequest {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        Self {
            checkpoint_dir: destination.join("tmp"),
            destination,
            output: None,
            format: TableFormat::Dataset,
        }
    }

    pub fn resolve_path(&self, config: &HaloModelConfig) -> HaloResult<PathBuf> {
        match &self.output {
            Some(path) => Ok(path.clone()),
            None => Ok(self
                .destination
                .join(format!("{}.{}", table_prefix(config)?, self.format.suffix()))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTable {
    pub path: PathBuf,
    /// Only the leader writes.
    pub written: bool,
    pub report: TabulationReport,
}

/// Tabulates the power spectrum and writes it from the leader. Fails before
/// any computation when the target exists and `config.clobber` is off.
pub fn generate_ps(
    config: &HaloModelConfig,
    engine: &PowerSpectrumEngine<'_>,
    communicator: &dyn Communicator,
    request: &TableRequest,
) -> HaloResult<GeneratedTable> {
    let path = request.resolve_path(config)?;
    let format = TableFormat::from_path(&path)?;
    if format != request.format {
        tracing::warn!(
            path = %path.display(),
            requested = request.format.suffix(),
            "suffix of the output file does not match the requested format; using the suffix"
        );
    }

    let leader = communicator.context().is_leader();
    if path.exists() {
        if !config.clobber {
            return Err(HaloError::io_conflict(
                "IO.TABLE_EXISTS",
                format!("'{}' exists; set clobber or remove it", path.display()),
            ));
        }
        if leader {
            remove_stale(&path)?;
        }
    }

    let mut manager = TabulationManager::new(config, engine, communicator, &request.checkpoint_dir)?;
    let report = manager.run()?;

    if !leader {
        return Ok(GeneratedTable {
            path,
            written: false,
            report,
        });
    }

    write_table(&report.table, &path, format, config.clobber)?;
    Ok(GeneratedTable {
        path,
        written: true,
        report,
    })
}

fn remove_stale(path: &Path) -> HaloResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(HaloError::io_at("IO.TABLE_REMOVE", "remove", path, source)),
    }
}
