//! The persisted power-spectrum table and its interpolated lookups.

pub mod codec;
pub mod io;

pub use codec::{Dataset, DatasetContainer};
pub use io::{TableFormat, read_table, read_table_as, write_table};

use crate::domain::{HaloError, HaloResult};
use crate::numerics::{
    DenseMatrix, interpolate_linear, interpolate_log_log, matrix_row, matrix_to_row_major,
};
use faer::Mat;

/// Who produced a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub version: String,
    pub mass_function: String,
}

impl Provenance {
    pub fn current(mass_function: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mass_function: mass_function.into(),
        }
    }

    pub(crate) fn to_attributes(&self) -> Vec<(String, String)> {
        vec![
            ("version".to_string(), self.version.clone()),
            ("mass_function".to_string(), self.mass_function.clone()),
        ]
    }

    pub(crate) fn from_attributes(attributes: &[(String, String)]) -> Self {
        let lookup = |key: &str| {
            attributes
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        };
        Self {
            version: lookup("version"),
            mass_function: lookup("mass_function"),
        }
    }
}

/// `P(k)` and `xi(R)` tabulated on a redshift grid.
///
/// `ps_mm` is `[z][k]` and `cf_mm` is `[z][R]`.
#[derive(Debug, Clone)]
pub struct PsTable {
    pub tab_z: Vec<f64>,
    pub tab_r: Vec<f64>,
    pub tab_k: Vec<f64>,
    pub ps_mm: DenseMatrix,
    pub cf_mm: DenseMatrix,
    pub provenance: Provenance,
}

impl PartialEq for PsTable {
    fn eq(&self, other: &Self) -> bool {
        self.tab_z == other.tab_z
            && self.tab_r == other.tab_r
            && self.tab_k == other.tab_k
            && same_matrix(&self.ps_mm, &other.ps_mm)
            && same_matrix(&self.cf_mm, &other.cf_mm)
            && self.provenance == other.provenance
    }
}

impl PsTable {
    /// Zero-filled table on the given grids.
    pub fn empty(tab_z: Vec<f64>, tab_k: Vec<f64>, tab_r: Vec<f64>, provenance: Provenance) -> Self {
        let ps_mm = Mat::zeros(tab_z.len(), tab_k.len());
        let cf_mm = Mat::zeros(tab_z.len(), tab_r.len());
        Self {
            tab_z,
            tab_r,
            tab_k,
            ps_mm,
            cf_mm,
            provenance,
        }
    }

    /// Shape check used after decoding and before writing.
    pub fn validate(&self) -> HaloResult<()> {
        let nz = self.tab_z.len();
        if self.ps_mm.nrows() != nz || self.ps_mm.ncols() != self.tab_k.len() {
            return Err(shape_error("tab_ps_mm", nz, self.tab_k.len(), &self.ps_mm));
        }
        if self.cf_mm.nrows() != nz || self.cf_mm.ncols() != self.tab_r.len() {
            return Err(shape_error("tab_cf_mm", nz, self.tab_r.len(), &self.cf_mm));
        }
        Ok(())
    }

    pub fn ps_row(&self, z_index: usize) -> Vec<f64> {
        matrix_row(&self.ps_mm, z_index)
    }

    pub fn cf_row(&self, z_index: usize) -> Vec<f64> {
        matrix_row(&self.cf_mm, z_index)
    }

    /// `P(k)` at any `z` inside the table, linear in `z` between rows.
    pub fn ps_at(&self, z: f64, k: f64) -> HaloResult<f64> {
        self.lookup(z, k, &self.tab_k, &self.ps_mm)
    }

    /// `xi(R)` at any `z` inside the table, linear in `z` between rows.
    pub fn cf_at(&self, z: f64, r: f64) -> HaloResult<f64> {
        self.lookup(z, r, &self.tab_r, &self.cf_mm)
    }

    fn lookup(&self, z: f64, x: f64, grid: &[f64], values: &DenseMatrix) -> HaloResult<f64> {
        let (lower, upper, fraction) = self.bracket(z)?;
        let at_row = |row: usize| -> HaloResult<f64> {
            row_value(x, grid, &matrix_row(values, row)).ok_or_else(|| {
                HaloError::out_of_range(
                    "RANGE.TABLE_SCALE",
                    format!("cannot interpolate table row at scale {}", x),
                )
            })
        };

        let low = at_row(lower)?;
        if lower == upper || fraction == 0.0 {
            return Ok(low);
        }
        let high = at_row(upper)?;
        Ok(low + fraction * (high - low))
    }

    /// Rows bracketing `z` plus the interpolation weight of the upper row.
    /// The redshift grid may run in either direction.
    fn bracket(&self, z: f64) -> HaloResult<(usize, usize, f64)> {
        let out_of_range = || {
            HaloError::out_of_range(
                "RANGE.REDSHIFT",
                format!("redshift {} is outside the tabulated range", z),
            )
        };
        if !z.is_finite() || self.tab_z.is_empty() {
            return Err(out_of_range());
        }

        let mut order: Vec<usize> = (0..self.tab_z.len()).collect();
        order.sort_by(|lhs, rhs| self.tab_z[*lhs].total_cmp(&self.tab_z[*rhs]));

        for pair in order.windows(2) {
            let (z0, z1) = (self.tab_z[pair[0]], self.tab_z[pair[1]]);
            if z >= z0 && z <= z1 {
                let fraction = if z1 > z0 { (z - z0) / (z1 - z0) } else { 0.0 };
                return Ok((pair[0], pair[1], fraction));
            }
        }

        match order.as_slice() {
            [only] if self.tab_z[*only] == z => Ok((*only, *only, 0.0)),
            _ => Err(out_of_range()),
        }
    }
}

fn same_matrix(lhs: &DenseMatrix, rhs: &DenseMatrix) -> bool {
    lhs.nrows() == rhs.nrows()
        && lhs.ncols() == rhs.ncols()
        && matrix_to_row_major(lhs) == matrix_to_row_major(rhs)
}

fn row_value(x: f64, grid: &[f64], row: &[f64]) -> Option<f64> {
    if row.iter().all(|value| *value > 0.0) {
        interpolate_log_log(x, grid, row)
    } else {
        interpolate_linear(x, grid, row)
    }
}

fn shape_error(field: &str, nrows: usize, ncols: usize, matrix: &DenseMatrix) -> HaloError {
    HaloError::format(
        "FORMAT.TABLE_SHAPE",
        format!(
            "'{}' has shape [{}][{}], expected [{}][{}]",
            field,
            matrix.nrows(),
            matrix.ncols(),
            nrows,
            ncols
        ),
    )
}
