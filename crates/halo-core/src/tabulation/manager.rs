//! Distributed tabulation of `P(k)` and `xi(R)` over the redshift grid.
//!
//! Every worker runs the same sequence of phases and the same collectives:
//!
//! 1. `Init`: empty result matrices; this worker's checkpoint log is read
//!    (or deleted under `clobber`).
//! 2. `Assigning`: completed redshifts are gathered from every worker; the
//!    remaining ones are dealt out round-robin by position.
//! 3. `Computing`: owned redshifts are computed in grid order and appended
//!    to the log one by one.
//! 4. `Reconciling`: restored rows are filled in, keeping a redshift only on
//!    the lowest rank that checkpointed it.
//! 5. `Merging`: an elementwise all-reduce assembles the full table on every
//!    worker, since each row is non-zero on exactly one worker.

use super::checkpoint::{CheckpointLog, CheckpointRecord, LoadedCheckpoint, same_redshift};
use super::workers::Communicator;
use crate::common::config::HaloModelConfig;
use crate::common::naming::checkpoint_prefix;
use crate::domain::{HaloError, HaloResult, TabulationWarning};
use crate::numerics::{DenseMatrix, matrix_from_row_major, matrix_to_row_major, set_matrix_row};
use crate::power::PowerSpectrumEngine;
use crate::table::{Provenance, PsTable};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabulationPhase {
    Init,
    Assigning,
    Computing,
    Reconciling,
    Merging,
    Done,
}

/// Outcome of one worker's run. `table` is complete on every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulationReport {
    pub table: PsTable,
    pub warnings: Vec<TabulationWarning>,
    /// Redshifts this worker computed in this run.
    pub computed: Vec<f64>,
    /// Redshifts this worker restored from its checkpoint log.
    pub resumed: Vec<f64>,
}

pub struct TabulationManager<'a> {
    engine: &'a PowerSpectrumEngine<'a>,
    communicator: &'a dyn Communicator,
    checkpoint: Option<CheckpointLog>,
    clobber: bool,
    provenance: Provenance,
    phase: TabulationPhase,
}

impl<'a> TabulationManager<'a> {
    /// Checkpoint logs live under `checkpoint_dir`, one per rank. They are
    /// not used in linear-only mode or when `config.checkpoint` is off.
    pub fn new(
        config: &HaloModelConfig,
        engine: &'a PowerSpectrumEngine<'a>,
        communicator: &'a dyn Communicator,
        checkpoint_dir: impl AsRef<Path>,
    ) -> HaloResult<Self> {
        let checkpoint = if config.checkpoint && !engine.is_linear_only() {
            Some(CheckpointLog::new(
                checkpoint_dir,
                &checkpoint_prefix(config)?,
                communicator.context().rank(),
            ))
        } else {
            None
        };

        Ok(Self {
            engine,
            communicator,
            checkpoint,
            clobber: config.clobber,
            provenance: Provenance::current(config.mass_function.clone()),
            phase: TabulationPhase::Init,
        })
    }

    pub fn phase(&self) -> TabulationPhase {
        self.phase
    }

    pub fn checkpoint_log(&self) -> Option<&CheckpointLog> {
        self.checkpoint.as_ref()
    }

    pub fn run(&mut self) -> HaloResult<TabulationReport> {
        self.enter(TabulationPhase::Init);
        let halos = self.engine.halos();
        let tab_z = halos.tab_z().to_vec();
        let mut table = PsTable::empty(
            tab_z.clone(),
            self.engine.tab_k().to_vec(),
            self.engine.tab_r().to_vec(),
            self.provenance.clone(),
        );

        if self.engine.is_linear_only() {
            return self.tabulate_linear(table);
        }

        let mut warnings = Vec::new();
        let loaded = self.load_checkpoints(&table)?;
        warnings.extend(loaded.warning.iter().cloned());
        let restored = loaded.records;

        self.enter(TabulationPhase::Assigning);
        let own_done: Vec<f64> = restored.iter().map(|record| record.z).collect();
        let done_by = self.communicator.all_gather_ranked(&own_done)?;

        let pending: Vec<usize> = (0..tab_z.len())
            .filter(|index| !done_by.iter().any(|(_, z)| same_redshift(*z, tab_z[*index])))
            .collect();
        let context = self.communicator.context();
        let assigned: Vec<usize> = pending
            .iter()
            .enumerate()
            .filter(|(position, _)| context.owns(*position))
            .map(|(_, index)| *index)
            .collect();

        if context.size() > 1 && pending.len() % context.size() != 0 {
            let warning = TabulationWarning::UnevenLoad {
                pending: pending.len(),
                workers: context.size(),
            };
            if context.is_leader() {
                tracing::warn!(%warning);
            }
            warnings.push(warning);
        }
        tracing::debug!(
            rank = context.rank(),
            pending = pending.len(),
            assigned = assigned.len(),
            "assigned redshifts"
        );

        self.enter(TabulationPhase::Computing);
        let mut computed = Vec::with_capacity(assigned.len());
        for (done, index) in assigned.iter().enumerate() {
            let z = tab_z[*index];
            tracing::info!(rank = context.rank(), z, "computing power spectrum");
            let record = self.compute_row(z)?;
            set_matrix_row(&mut table.ps_mm, *index, &record.ps);
            set_matrix_row(&mut table.cf_mm, *index, &record.cf);

            if let Some(log) = &self.checkpoint {
                log.append(&record)?;
            }
            computed.push(z);
            tracing::info!(
                rank = context.rank(),
                z,
                done = done + 1,
                total = assigned.len(),
                "finished redshift"
            );
        }

        self.enter(TabulationPhase::Reconciling);
        self.communicator.barrier()?;
        let mut resumed = Vec::new();
        for record in &restored {
            let owner = done_by
                .iter()
                .filter(|(_, z)| same_redshift(*z, record.z))
                .map(|(rank, _)| *rank)
                .min();
            if owner != Some(context.rank()) {
                tracing::debug!(
                    rank = context.rank(),
                    z = record.z,
                    "skipping checkpoint also held by a lower rank"
                );
                continue;
            }
            if let Some(index) = tab_z.iter().position(|z| same_redshift(*z, record.z)) {
                set_matrix_row(&mut table.ps_mm, index, &record.ps);
                set_matrix_row(&mut table.cf_mm, index, &record.cf);
                resumed.push(record.z);
            }
        }

        self.enter(TabulationPhase::Merging);
        table.ps_mm = self.reduce_matrix(&table.ps_mm)?;
        table.cf_mm = self.reduce_matrix(&table.cf_mm)?;

        self.enter(TabulationPhase::Done);
        Ok(TabulationReport {
            table,
            warnings,
            computed,
            resumed,
        })
    }

    fn enter(&mut self, phase: TabulationPhase) {
        tracing::debug!(rank = self.communicator.context().rank(), ?phase, "tabulation phase");
        self.phase = phase;
    }

    /// Own log records on this grid, first occurrence of each redshift.
    fn load_checkpoints(&self, table: &PsTable) -> HaloResult<LoadedCheckpoint> {
        let Some(log) = &self.checkpoint else {
            return Ok(LoadedCheckpoint::default());
        };

        if self.clobber {
            if log.clear()? {
                tracing::info!(path = %log.path().display(), "removed stale checkpoint log");
            }
            return Ok(LoadedCheckpoint::default());
        }

        let loaded = log.load()?;
        let mut records: Vec<CheckpointRecord> = Vec::with_capacity(loaded.records.len());
        for record in loaded.records {
            if record.ps.len() != table.tab_k.len() || record.cf.len() != table.tab_r.len() {
                return Err(HaloError::format(
                    "FORMAT.CHECKPOINT_SHAPE",
                    format!(
                        "checkpoint '{}' holds rows of length {}/{} for z={}, expected {}/{}",
                        log.path().display(),
                        record.ps.len(),
                        record.cf.len(),
                        record.z,
                        table.tab_k.len(),
                        table.tab_r.len()
                    ),
                ));
            }
            let on_grid = table.tab_z.iter().any(|z| same_redshift(*z, record.z));
            let seen = records.iter().any(|kept| same_redshift(kept.z, record.z));
            if on_grid && !seen {
                records.push(record);
            }
        }

        if !records.is_empty() {
            let redshifts: Vec<f64> = records.iter().map(|record| record.z).collect();
            tracing::info!(
                rank = self.communicator.context().rank(),
                ?redshifts,
                "loaded checkpoints"
            );
        }
        Ok(LoadedCheckpoint {
            records,
            warning: loaded.warning,
        })
    }

    fn compute_row(&self, z: f64) -> HaloResult<CheckpointRecord> {
        let tab_k = self.engine.tab_k();
        let matter = self.engine.matter();
        let ps = self.engine.get_ps_mm(z, tab_k, &matter, &matter)?;
        let cf = self
            .engine
            .transform()
            .get_cf_at(tab_k, &ps, self.engine.tab_r())?;
        Ok(CheckpointRecord { z, ps, cf })
    }

    /// Linear P(k) on the table grid and its transform; every worker fills
    /// every row and no collectives run.
    fn tabulate_linear(&mut self, mut table: PsTable) -> HaloResult<TabulationReport> {
        let tab_k_lin = self.engine.halos().tab_k_lin().to_vec();
        let tab_z = table.tab_z.clone();

        self.enter(TabulationPhase::Computing);
        for (index, z) in tab_z.iter().enumerate() {
            let ps = self.engine.get_ps_lin(*z, &table.tab_k)?;
            let native = self.engine.get_ps_lin(*z, &tab_k_lin)?;
            let cf = self
                .engine
                .transform()
                .get_cf_at(&tab_k_lin, &native, &table.tab_r)?;
            set_matrix_row(&mut table.ps_mm, index, &ps);
            set_matrix_row(&mut table.cf_mm, index, &cf);
        }

        self.enter(TabulationPhase::Done);
        Ok(TabulationReport {
            table,
            warnings: Vec::new(),
            computed: tab_z,
            resumed: Vec::new(),
        })
    }

    fn reduce_matrix(&self, matrix: &DenseMatrix) -> HaloResult<DenseMatrix> {
        let mut values = matrix_to_row_major(matrix);
        self.communicator.all_reduce_sum(&mut values)?;
        matrix_from_row_major(matrix.nrows(), matrix.ncols(), &values).ok_or_else(|| {
            HaloError::internal("RUN.MERGE", "all-reduce changed the table shape")
        })
    }
}
