//! Halo-model run configuration.
//!
//! Field names on disk use the `halo_*` parameter names, so parameter dumps
//! from earlier pipelines load without translation.

use crate::domain::{HaloError, HaloResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::grid::LogGrid;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HaloModelConfig {
    #[serde(rename = "halo_profile")]
    pub profile: String,
    #[serde(rename = "halo_cmr")]
    pub concentration_relation: String,
    #[serde(rename = "halo_delta")]
    pub overdensity: f64,
    #[serde(rename = "halo_mf")]
    pub mass_function: String,

    #[serde(rename = "halo_logMmin")]
    pub log_mass_min: f64,
    #[serde(rename = "halo_logMmax")]
    pub log_mass_max: f64,
    #[serde(rename = "halo_dlogM")]
    pub log_mass_step: f64,

    #[serde(rename = "halo_zmin")]
    pub redshift_min: f64,
    #[serde(rename = "halo_zmax")]
    pub redshift_max: f64,
    #[serde(rename = "halo_dz")]
    pub redshift_step: f64,

    #[serde(rename = "halo_lnk_min")]
    pub ln_k_min: f64,
    #[serde(rename = "halo_lnk_max")]
    pub ln_k_max: f64,
    #[serde(rename = "halo_dlnk")]
    pub ln_k_step: f64,

    #[serde(rename = "halo_lnR_min")]
    pub ln_r_min: f64,
    #[serde(rename = "halo_lnR_max")]
    pub ln_r_max: f64,
    #[serde(rename = "halo_dlnR")]
    pub ln_r_step: f64,

    #[serde(rename = "halo_ps_linear")]
    pub linear_only: bool,
    #[serde(rename = "halo_ps_load")]
    pub load_table: bool,

    pub checkpoint: bool,
    pub clobber: bool,
    pub ztol: f64,
    pub profile_parameters: ProfileParameters,
    pub transform: TransformConfig,
}

impl Default for HaloModelConfig {
    fn default() -> Self {
        Self {
            profile: "nfw".to_string(),
            concentration_relation: "duffy".to_string(),
            overdensity: 200.0,
            mass_function: "ST".to_string(),
            log_mass_min: 4.0,
            log_mass_max: 16.0,
            log_mass_step: 0.01,
            redshift_min: 5.0,
            redshift_max: 60.0,
            redshift_step: 0.05,
            ln_k_min: -9.0,
            ln_k_max: 9.0,
            ln_k_step: 0.05,
            ln_r_min: -9.0,
            ln_r_max: 9.0,
            ln_r_step: 0.05,
            linear_only: false,
            load_table: false,
            checkpoint: true,
            clobber: false,
            ztol: 1.0e-3,
            profile_parameters: ProfileParameters::default(),
            transform: TransformConfig::default(),
        }
    }
}

/// Shape parameters of the non-NFW profile families, in cMpc.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileParameters {
    /// Effective horizon of the r^-2 profile.
    pub rmax: f64,
    /// Core scale of the arctangent profile.
    pub rstar: f64,
    /// Scale length of the exponential profile.
    pub scale_radius: f64,
}

impl Default for ProfileParameters {
    fn default() -> Self {
        Self {
            rmax: 1.0e2,
            rstar: 10.0,
            scale_radius: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformSolverKind {
    Fftlog,
    Quadrature,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    pub solver: TransformSolverKind,
    pub epsrel: f64,
    pub epsabs: f64,
    /// Power-law bias of the FFTLog transform.
    pub bias: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            solver: TransformSolverKind::Fftlog,
            epsrel: 1.0e-6,
            epsabs: 0.0,
            bias: 1.5,
        }
    }
}

impl HaloModelConfig {
    pub fn k_grid(&self) -> HaloResult<LogGrid> {
        LogGrid::from_bounds(self.ln_k_min, self.ln_k_max, self.ln_k_step)
    }

    pub fn r_grid(&self) -> HaloResult<LogGrid> {
        LogGrid::from_bounds(self.ln_r_min, self.ln_r_max, self.ln_r_step)
    }

    /// Number of mass intervals; must be integral for the table names.
    pub fn log_mass_size(&self) -> HaloResult<usize> {
        integral_size(
            "halo_logMmin/halo_logMmax/halo_dlogM",
            (self.log_mass_max - self.log_mass_min) / self.log_mass_step,
        )
    }

    /// Number of redshift points (inclusive of both ends).
    pub fn redshift_size(&self) -> HaloResult<usize> {
        integral_size(
            "halo_zmin/halo_zmax/halo_dz",
            (self.redshift_max - self.redshift_min) / self.redshift_step + 1.0,
        )
    }

    /// `zmin, zmin + dz, ..., zmax`.
    pub fn redshifts(&self) -> HaloResult<Vec<f64>> {
        let count = self.redshift_size()?;
        Ok((0..count)
            .map(|index| self.redshift_min + self.redshift_step * index as f64)
            .collect())
    }

    /// `log10(M)` of the mass grid, both ends included.
    pub fn log10_masses(&self) -> HaloResult<Vec<f64>> {
        let count = self.log_mass_size()? + 1;
        Ok((0..count)
            .map(|index| self.log_mass_min + self.log_mass_step * index as f64)
            .collect())
    }

    pub fn validate(&self) -> HaloResult<()> {
        for (field, value) in [
            ("halo_delta", self.overdensity),
            ("halo_dlogM", self.log_mass_step),
            ("halo_dz", self.redshift_step),
            ("halo_dlnk", self.ln_k_step),
            ("halo_dlnR", self.ln_r_step),
            ("ztol", self.ztol),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(HaloError::configuration(
                    "CONFIG.INVALID_VALUE",
                    format!("'{}' must be finite and > 0, got {}", field, value),
                ));
            }
        }

        for (field, lower, upper) in [
            ("halo_logM", self.log_mass_min, self.log_mass_max),
            ("halo_z", self.redshift_min, self.redshift_max),
            ("halo_lnk", self.ln_k_min, self.ln_k_max),
            ("halo_lnR", self.ln_r_min, self.ln_r_max),
        ] {
            if !lower.is_finite() || !upper.is_finite() || upper < lower {
                return Err(HaloError::configuration(
                    "CONFIG.INVALID_RANGE",
                    format!(
                        "'{}' range must be finite and ordered, got [{}, {}]",
                        field, lower, upper
                    ),
                ));
            }
        }

        let transform = self.transform;
        if !transform.epsrel.is_finite()
            || !transform.epsabs.is_finite()
            || transform.epsrel < 0.0
            || transform.epsabs < 0.0
        {
            return Err(HaloError::configuration(
                "CONFIG.TRANSFORM_TOLERANCE",
                format!(
                    "transform tolerances must be finite and >= 0, got epsrel={}, epsabs={}",
                    transform.epsrel, transform.epsabs
                ),
            ));
        }

        self.log_mass_size()?;
        self.redshift_size()?;
        Ok(())
    }
}

fn integral_size(field: &str, size: f64) -> HaloResult<usize> {
    let rounded = size.round();
    if !size.is_finite() || rounded < 0.0 || (size - rounded).abs() > 1.0e-6 {
        return Err(HaloError::configuration(
            "CONFIG.GRID_SIZE",
            format!("'{}' must describe an integral number of steps, got {}", field, size),
        ));
    }
    Ok(rounded as usize)
}

pub fn load_config(path: impl AsRef<Path>) -> HaloResult<HaloModelConfig> {
    let path = path.as_ref();
    let source =
        fs::read_to_string(path).map_err(|source| HaloError::io_at("IO.CONFIG", "read", path, source))?;
    let config: HaloModelConfig = serde_json::from_str(&source).map_err(|source| {
        HaloError::configuration(
            "CONFIG.PARSE",
            format!("failed to parse config '{}': {}", path.display(), source),
        )
    })?;
    config.validate()?;
    Ok(config)
}
