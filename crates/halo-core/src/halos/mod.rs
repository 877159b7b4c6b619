//! Halo population consumed by the halo model: mass function, bias and
//! collapsed fraction on a `(z, M)` grid plus the linear matter P(k).

pub mod cosmology;

pub use cosmology::{Cosmology, FlatLambdaCdm};

use crate::common::config::HaloModelConfig;
use crate::domain::{HaloError, HaloResult};
use crate::numerics::{DenseMatrix, matrix_from_rows, matrix_row};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest `log10(M)` offset under which two mass grids are the same grid.
const LOG10_MASS_TOLERANCE: f64 = 1.0e-6;

/// Read-only view of a tabulated halo population.
///
/// Every matrix is indexed `[z][M]` except the linear power spectrum, which
/// is `[z][k_lin]`.
pub trait HaloPopulation {
    fn tab_z(&self) -> &[f64];
    fn tab_m(&self) -> &[f64];
    fn tab_dndlnm(&self) -> &DenseMatrix;
    fn tab_bias(&self) -> &DenseMatrix;
    fn tab_fcoll(&self) -> &DenseMatrix;
    fn tab_k_lin(&self) -> &[f64];
    fn tab_ps_lin(&self) -> &DenseMatrix;
    fn cosmology(&self) -> &dyn Cosmology;
}

#[derive(Debug, Clone)]
pub struct TabulatedHalos {
    cosmology: FlatLambdaCdm,
    tab_z: Vec<f64>,
    tab_m: Vec<f64>,
    tab_dndlnm: DenseMatrix,
    tab_bias: DenseMatrix,
    tab_fcoll: DenseMatrix,
    tab_k_lin: Vec<f64>,
    tab_ps_lin: DenseMatrix,
}

/// On-disk JSON layout of [`TabulatedHalos`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HaloTableDocument {
    #[serde(default)]
    pub cosmology: FlatLambdaCdm,
    pub tab_z: Vec<f64>,
    #[serde(rename = "tab_M")]
    pub tab_m: Vec<f64>,
    pub tab_dndlnm: Vec<Vec<f64>>,
    pub tab_bias: Vec<Vec<f64>>,
    pub tab_fcoll: Vec<Vec<f64>>,
    pub tab_k_lin: Vec<f64>,
    pub tab_ps_lin: Vec<Vec<f64>>,
}

impl TabulatedHalos {
    pub fn from_document(document: HaloTableDocument) -> HaloResult<Self> {
        document.cosmology.validate()?;

        let nz = document.tab_z.len();
        let nm = document.tab_m.len();
        let nk = document.tab_k_lin.len();

        if nz == 0 {
            return Err(invalid_population("tab_z must not be empty"));
        }
        require_finite("tab_z", &document.tab_z)?;
        require_strictly_increasing_positive("tab_M", &document.tab_m)?;
        require_strictly_increasing_positive("tab_k_lin", &document.tab_k_lin)?;
        if nm < 2 {
            return Err(invalid_population("tab_M needs at least two masses"));
        }
        if nk < 2 {
            return Err(invalid_population("tab_k_lin needs at least two wavenumbers"));
        }

        let tab_dndlnm = shaped_matrix("tab_dndlnm", &document.tab_dndlnm, nz, nm)?;
        let tab_bias = shaped_matrix("tab_bias", &document.tab_bias, nz, nm)?;
        let tab_fcoll = shaped_matrix("tab_fcoll", &document.tab_fcoll, nz, nm)?;
        let tab_ps_lin = shaped_matrix("tab_ps_lin", &document.tab_ps_lin, nz, nk)?;

        if document
            .tab_ps_lin
            .iter()
            .flatten()
            .any(|value| *value <= 0.0)
        {
            return Err(invalid_population(
                "tab_ps_lin must be strictly positive for log interpolation",
            ));
        }

        Ok(Self {
            cosmology: document.cosmology,
            tab_z: document.tab_z,
            tab_m: document.tab_m,
            tab_dndlnm,
            tab_bias,
            tab_fcoll,
            tab_k_lin: document.tab_k_lin,
            tab_ps_lin,
        })
    }

    /// Snapshot of any population in the on-disk layout.
    pub fn document_of(population: &dyn HaloPopulation, cosmology: FlatLambdaCdm) -> HaloTableDocument {
        let rows = |matrix: &DenseMatrix| -> Vec<Vec<f64>> {
            (0..matrix.nrows()).map(|row| matrix_row(matrix, row)).collect()
        };

        HaloTableDocument {
            cosmology,
            tab_z: population.tab_z().to_vec(),
            tab_m: population.tab_m().to_vec(),
            tab_dndlnm: rows(population.tab_dndlnm()),
            tab_bias: rows(population.tab_bias()),
            tab_fcoll: rows(population.tab_fcoll()),
            tab_k_lin: population.tab_k_lin().to_vec(),
            tab_ps_lin: rows(population.tab_ps_lin()),
        }
    }

    pub fn to_document(&self) -> HaloTableDocument {
        Self::document_of(self, self.cosmology)
    }
}

impl HaloPopulation for TabulatedHalos {
    fn tab_z(&self) -> &[f64] {
        &self.tab_z
    }

    fn tab_m(&self) -> &[f64] {
        &self.tab_m
    }

    fn tab_dndlnm(&self) -> &DenseMatrix {
        &self.tab_dndlnm
    }

    fn tab_bias(&self) -> &DenseMatrix {
        &self.tab_bias
    }

    fn tab_fcoll(&self) -> &DenseMatrix {
        &self.tab_fcoll
    }

    fn tab_k_lin(&self) -> &[f64] {
        &self.tab_k_lin
    }

    fn tab_ps_lin(&self) -> &DenseMatrix {
        &self.tab_ps_lin
    }

    fn cosmology(&self) -> &dyn Cosmology {
        &self.cosmology
    }
}

pub fn load_halos(path: impl AsRef<Path>) -> HaloResult<TabulatedHalos> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)
        .map_err(|source| HaloError::io_at("IO.HALOS", "read", path, source))?;
    let document: HaloTableDocument = serde_json::from_str(&source).map_err(|source| {
        HaloError::format(
            "FORMAT.HALOS",
            format!("failed to parse halo table '{}': {}", path.display(), source),
        )
    })?;
    TabulatedHalos::from_document(document)
}

pub fn write_halos(path: impl AsRef<Path>, document: &HaloTableDocument) -> HaloResult<()> {
    let path = path.as_ref();
    let encoded = serde_json::to_string(document).map_err(|source| {
        HaloError::internal(
            "RUN.HALOS_ENCODE",
            format!("failed to encode halo table '{}': {}", path.display(), source),
        )
    })?;
    fs::write(path, encoded).map_err(|source| HaloError::io_at("IO.HALOS", "write", path, source))
}

/// Fails unless `halos` is tabulated on the redshift and mass grids named
/// by `config`. Table, checkpoint and profile file names are derived from
/// the configuration alone.
pub fn ensure_matches_config(halos: &dyn HaloPopulation, config: &HaloModelConfig) -> HaloResult<()> {
    let redshifts = config.redshifts()?;
    if !same_redshifts(halos.tab_z(), &redshifts, config.ztol) {
        return Err(HaloError::configuration(
            "CONFIG.HALO_REDSHIFTS",
            format!(
                "halo population redshifts {:?} differ from the configured grid {:?} (ztol {})",
                halos.tab_z(),
                redshifts,
                config.ztol
            ),
        ));
    }

    let log10_masses = config.log10_masses()?;
    let population: Vec<f64> = halos.tab_m().iter().map(|mass| mass.log10()).collect();
    if !same_log10_masses(&population, &log10_masses) {
        return Err(HaloError::configuration(
            "CONFIG.HALO_MASSES",
            format!(
                "halo population spans {} masses over log10(M) [{}, {}], configured grid has {} over [{}, {}]",
                population.len(),
                population.first().copied().unwrap_or(f64::NAN),
                population.last().copied().unwrap_or(f64::NAN),
                log10_masses.len(),
                config.log_mass_min,
                config.log_mass_max
            ),
        ));
    }
    Ok(())
}

/// Same redshifts within `ztol`, in the same or in reversed order.
pub fn same_redshifts(lhs: &[f64], rhs: &[f64], ztol: f64) -> bool {
    let close = |pair: (&f64, &f64)| (pair.0 - pair.1).abs() <= ztol;
    lhs.len() == rhs.len()
        && (lhs.iter().zip(rhs).all(close) || lhs.iter().zip(rhs.iter().rev()).all(close))
}

/// Same mass grid, compared in `log10(M)`.
pub fn same_masses(lhs: &[f64], rhs: &[f64]) -> bool {
    let lhs: Vec<f64> = lhs.iter().map(|mass| mass.log10()).collect();
    let rhs: Vec<f64> = rhs.iter().map(|mass| mass.log10()).collect();
    same_log10_masses(&lhs, &rhs)
}

fn same_log10_masses(lhs: &[f64], rhs: &[f64]) -> bool {
    lhs.len() == rhs.len()
        && lhs
            .iter()
            .zip(rhs)
            .all(|(lhs, rhs)| (lhs - rhs).abs() <= LOG10_MASS_TOLERANCE)
}

fn shaped_matrix(
    field: &str,
    rows: &[Vec<f64>],
    nrows: usize,
    ncols: usize,
) -> HaloResult<DenseMatrix> {
    if rows.len() != nrows || rows.iter().any(|row| row.len() != ncols) {
        return Err(invalid_population(format!(
            "'{}' must have shape [{}][{}]",
            field, nrows, ncols
        )));
    }
    for row in rows {
        require_finite(field, row)?;
    }
    matrix_from_rows(rows)
        .ok_or_else(|| invalid_population(format!("'{}' has ragged rows", field)))
}

fn require_finite(field: &str, values: &[f64]) -> HaloResult<()> {
    if let Some(value) = values.iter().find(|value| !value.is_finite()) {
        return Err(invalid_population(format!(
            "'{}' contains non-finite value {}",
            field, value
        )));
    }
    Ok(())
}

fn require_strictly_increasing_positive(field: &str, values: &[f64]) -> HaloResult<()> {
    require_finite(field, values)?;
    if values.iter().any(|value| *value <= 0.0) {
        return Err(invalid_population(format!("'{}' must be positive", field)));
    }
    if values.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(invalid_population(format!(
            "'{}' must be strictly increasing",
            field
        )));
    }
    Ok(())
}

fn invalid_population(message: impl Into<String>) -> HaloError {
    HaloError::configuration("CONFIG.HALO_POPULATION", message)
}

#[cfg(test)]
mod tests {
    use super::{
        HaloPopulation, HaloTableDocument, TabulatedHalos, ensure_matches_config, load_halos,
        same_redshifts, write_halos,
    };
    use crate::common::config::HaloModelConfig;
    use crate::halos::FlatLambdaCdm;
    use crate::testing::{toy_config, toy_halos};
    use tempfile::TempDir;

    fn small_document() -> HaloTableDocument {
        HaloTableDocument {
            cosmology: FlatLambdaCdm::default(),
            tab_z: vec![6.0, 8.0],
            tab_m: vec![1.0e8, 1.0e9, 1.0e10],
            tab_dndlnm: vec![vec![3.0, 2.0, 1.0], vec![2.0, 1.0, 0.5]],
            tab_bias: vec![vec![1.0, 2.0, 3.0], vec![1.5, 2.5, 3.5]],
            tab_fcoll: vec![vec![0.3, 0.2, 0.0], vec![0.2, 0.1, 0.0]],
            tab_k_lin: vec![0.1, 1.0],
            tab_ps_lin: vec![vec![10.0, 1.0], vec![8.0, 0.8]],
        }
    }

    #[test]
    fn document_round_trips_through_json_file() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("halos.json");
        let document = small_document();
        write_halos(&path, &document).expect("halos should be written");

        let halos = load_halos(&path).expect("halos should load");
        assert_eq!(halos.tab_z(), &[6.0, 8.0]);
        assert_eq!(halos.tab_fcoll()[(1, 1)], 0.1);
        assert_eq!(halos.tab_ps_lin()[(0, 1)], 1.0);
        assert_eq!(halos.to_document(), document);
    }

    #[test]
    fn non_monotonic_masses_are_rejected() {
        let mut document = small_document();
        document.tab_m = vec![1.0e8, 1.0e10, 1.0e9];
        let error = TabulatedHalos::from_document(document).expect_err("masses out of order");
        assert_eq!(error.placeholder(), "CONFIG.HALO_POPULATION");
        assert!(error.message().contains("strictly increasing"));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let mut document = small_document();
        document.tab_bias = vec![vec![1.0, 2.0]];
        let error = TabulatedHalos::from_document(document).expect_err("bad shape");
        assert!(error.message().contains("tab_bias"));
    }

    #[test]
    fn population_must_sit_on_the_configured_grids() {
        let halos = toy_halos();
        ensure_matches_config(&halos, &toy_config()).expect("toy grids agree");

        let fewer_redshifts = HaloModelConfig {
            redshift_max: 8.0,
            ..toy_config()
        };
        let error = ensure_matches_config(&halos, &fewer_redshifts).expect_err("z grid differs");
        assert_eq!(error.placeholder(), "CONFIG.HALO_REDSHIFTS");

        let narrower_masses = HaloModelConfig {
            log_mass_min: 9.0,
            ..toy_config()
        };
        let error = ensure_matches_config(&halos, &narrower_masses).expect_err("mass grid differs");
        assert_eq!(error.placeholder(), "CONFIG.HALO_MASSES");

        let shifted_masses = HaloModelConfig {
            log_mass_min: 8.05,
            log_mass_max: 15.05,
            ..toy_config()
        };
        let error = ensure_matches_config(&halos, &shifted_masses).expect_err("same size, other masses");
        assert_eq!(error.placeholder(), "CONFIG.HALO_MASSES");
    }

    #[test]
    fn redshift_grids_compare_within_tolerance_in_either_order() {
        assert!(same_redshifts(&[10.0, 8.0, 6.0], &[6.0, 8.0, 10.0], 1.0e-3));
        assert!(same_redshifts(&[6.0005, 8.0], &[6.0, 8.0], 1.0e-3));
        assert!(!same_redshifts(&[6.0, 8.0], &[6.0, 8.5], 1.0e-3));
        assert!(!same_redshifts(&[6.0, 8.0], &[6.0, 8.0, 10.0], 1.0e-3));
    }
}
