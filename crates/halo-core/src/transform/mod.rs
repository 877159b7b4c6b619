//! Conversions between P(k) and xi(R).

pub mod fftlog;
pub mod quadrature;

pub use fftlog::{FftLogError, FftLogOutput, correlation_to_power, power_to_correlation};
pub use quadrature::{SincQuadrature, TabulatedFunction};

use crate::common::config::{TransformConfig, TransformSolverKind};
use crate::common::constants::{FOUR_PI, TWO_PI_SQUARED};
use crate::domain::{HaloError, HaloResult};
use crate::numerics::interpolate_log_linear;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformSolver {
    FftLog { bias: f64 },
    Quadrature(SincQuadrature),
}

/// Hankel-type transforms between tabulated power spectra and correlation
/// functions. Native output grids are the reciprocal of the input grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformLayer {
    solver: TransformSolver,
}

impl Default for TransformLayer {
    fn default() -> Self {
        Self::new(TransformConfig::default())
    }
}

impl TransformLayer {
    pub fn new(config: TransformConfig) -> Self {
        let solver = match config.solver {
            TransformSolverKind::Fftlog => TransformSolver::FftLog { bias: config.bias },
            TransformSolverKind::Quadrature => TransformSolver::Quadrature(SincQuadrature {
                epsrel: config.epsrel,
                epsabs: config.epsabs,
            }),
        };
        Self { solver }
    }

    pub fn solver(&self) -> TransformSolver {
        self.solver
    }

    /// `xi(R)` on the native grid `R = 1 / k` (ascending).
    pub fn get_cf(&self, k: &[f64], ps: &[f64]) -> HaloResult<(Vec<f64>, Vec<f64>)> {
        self.transform(k, ps, Direction::PowerToCorrelation)
    }

    /// `xi(R)` at arbitrary `R`. FFTLog output is interpolated linearly in
    /// `ln R` from the native grid; quadrature evaluates `R` directly.
    pub fn get_cf_at(&self, k: &[f64], ps: &[f64], r: &[f64]) -> HaloResult<Vec<f64>> {
        self.transform_at(k, ps, r, Direction::PowerToCorrelation)
    }

    /// Inverse transform, `P(k)` on the native grid `k = 1 / R`.
    pub fn get_ps_from_cf(&self, r: &[f64], cf: &[f64]) -> HaloResult<(Vec<f64>, Vec<f64>)> {
        self.transform(r, cf, Direction::CorrelationToPower)
    }

    pub fn get_ps_from_cf_at(&self, r: &[f64], cf: &[f64], k: &[f64]) -> HaloResult<Vec<f64>> {
        self.transform_at(r, cf, k, Direction::CorrelationToPower)
    }

    /// `xi(R)` of a power spectrum given as a function over `[k_min, k_max]`,
    /// by direct quadrature regardless of the configured solver.
    pub fn get_cf_from_function<F>(
        &self,
        r: &[f64],
        k_min: f64,
        k_max: f64,
        mut ps: F,
    ) -> HaloResult<Vec<f64>>
    where
        F: FnMut(f64) -> f64,
    {
        let quadrature = match self.solver {
            TransformSolver::Quadrature(quadrature) => quadrature,
            TransformSolver::FftLog { .. } => {
                let defaults = TransformConfig::default();
                SincQuadrature {
                    epsrel: defaults.epsrel,
                    epsabs: defaults.epsabs,
                }
            }
        };

        r.iter()
            .map(|radius| {
                quadrature
                    .transform(*radius, k_min, k_max, 1.0 / TWO_PI_SQUARED, &mut ps)
                    .map_err(HaloError::from)
            })
            .collect()
    }

    fn transform(
        &self,
        x: &[f64],
        values: &[f64],
        direction: Direction,
    ) -> HaloResult<(Vec<f64>, Vec<f64>)> {
        match self.solver {
            TransformSolver::FftLog { bias } => {
                let output = match direction {
                    Direction::PowerToCorrelation => power_to_correlation(x, values, bias)?,
                    Direction::CorrelationToPower => correlation_to_power(x, values, bias)?,
                };
                Ok((output.abscissa, output.values))
            }
            TransformSolver::Quadrature(quadrature) => {
                let output_grid: Vec<f64> = x.iter().rev().map(|value| 1.0 / value).collect();
                let transformed =
                    quadrature_at(quadrature, x, values, &output_grid, direction)?;
                Ok((output_grid, transformed))
            }
        }
    }

    fn transform_at(
        &self,
        x: &[f64],
        values: &[f64],
        target: &[f64],
        direction: Direction,
    ) -> HaloResult<Vec<f64>> {
        match self.solver {
            TransformSolver::FftLog { .. } => {
                let (native, transformed) = self.transform(x, values, direction)?;
                resample(&native, &transformed, target)
            }
            TransformSolver::Quadrature(quadrature) => {
                quadrature_at(quadrature, x, values, target, direction)
            }
        }
    }
}

/// Sinc quadrature over a spline of the samples, plus their continuation
/// below the grid when there is one.
fn quadrature_at(
    quadrature: SincQuadrature,
    x: &[f64],
    values: &[f64],
    target: &[f64],
    direction: Direction,
) -> HaloResult<Vec<f64>> {
    let function = TabulatedFunction::new(x, values).ok_or_else(|| {
        HaloError::computation(
            "RUN.TRANSFORM_INPUT",
            format!(
                "transform needs a positive, strictly increasing grid of at least 2 points with matching samples, got {} and {}",
                x.len(),
                values.len()
            ),
        )
    })?;
    let prefactor = direction.prefactor();
    let sampled = |point: f64| function.evaluate(point);

    target
        .iter()
        .map(|y| -> HaloResult<f64> {
            let mut value =
                quadrature.transform(*y, function.lower(), function.upper(), prefactor, sampled)?;
            if function.continues_below() {
                value += quadrature.transform(*y, 0.0, function.lower(), prefactor, sampled)?;
            }
            Ok(value)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    PowerToCorrelation,
    CorrelationToPower,
}

impl Direction {
    fn prefactor(self) -> f64 {
        match self {
            Self::PowerToCorrelation => 1.0 / TWO_PI_SQUARED,
            Self::CorrelationToPower => FOUR_PI,
        }
    }
}

fn resample(native: &[f64], values: &[f64], target: &[f64]) -> HaloResult<Vec<f64>> {
    target
        .iter()
        .map(|point| {
            interpolate_log_linear(*point, native, values).ok_or_else(|| {
                HaloError::out_of_range(
                    "RANGE.TRANSFORM_GRID",
                    format!("cannot interpolate transform onto scale {}", point),
                )
            })
        })
        .collect()
}
