//! Fourier-space halo profiles `u(k | M, z)`.
//!
//! Every variant is normalized so that `u -> 1` as `k -> 0`.

pub mod concentration;
pub mod nfw;
pub mod table;

pub use concentration::{ConcentrationRelation, get_concentration};
pub use nfw::{NfwGeometry, NfwProfile};
pub use table::{
    ProfileLookup, ProfileModel, ProfileTable, SurfaceTable, TableSource, generate_profile_table,
    generate_surface_table, load_or_compute_profiles, read_surface_table, surface_radii,
    tabulate_profiles, tabulate_surface_density,
};

use crate::common::config::{HaloModelConfig, ProfileParameters};
use crate::domain::{HaloError, HaloResult};
use crate::halos::Cosmology;
use crate::numerics::sine_cosine_integrals;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const CGM_RAHMATI_RSTAR: f64 = 0.0025;
const CGM_RAHMATI_EXPONENT: f64 = 0.75;
const CGM_STEIDEL_RSTAR: f64 = 0.2;
const CGM_STEIDEL_EXPONENT: f64 = 0.85;

/// A Fourier-space profile evaluated at `(z, M, k)`.
pub trait FourierProfile {
    fn evaluate(&self, z: f64, mass: f64, k: f64) -> f64;

    /// Profile at every mass of a halo grid. `z_index` lets tabulated
    /// profiles address their own redshift row.
    fn evaluate_over_masses(&self, _z_index: usize, z: f64, masses: &[f64], k: f64) -> Vec<f64> {
        masses.iter().map(|mass| self.evaluate(z, *mass, k)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    Nfw,
    Isl,
    IslExp,
    Exp,
    CgmRahmati,
    CgmSteidel,
}

impl ProfileKind {
    pub const ALL: [Self; 6] = [
        Self::Nfw,
        Self::Isl,
        Self::IslExp,
        Self::Exp,
        Self::CgmRahmati,
        Self::CgmSteidel,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nfw => "nfw",
            Self::Isl => "isl",
            Self::IslExp => "isl_exp",
            Self::Exp => "exp",
            Self::CgmRahmati => "cgm_rahmati",
            Self::CgmSteidel => "cgm_steidel",
        }
    }
}

impl FromStr for ProfileKind {
    type Err = HaloError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                HaloError::configuration(
                    "CONFIG.PROFILE",
                    format!("unrecognized halo profile '{}'", value),
                )
            })
    }
}

impl Display for ProfileKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Closed-form profile families.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalyticProfile {
    Nfw(NfwProfile),
    /// r^-2 profile truncated at `rmax`.
    Isl { rmax: f64 },
    IslExp { rstar: f64 },
    Exp { scale_radius: f64 },
    CgmRahmati,
    CgmSteidel,
}

impl AnalyticProfile {
    pub fn new(
        kind: ProfileKind,
        relation: ConcentrationRelation,
        overdensity: f64,
        cosmology: &dyn Cosmology,
        parameters: ProfileParameters,
    ) -> HaloResult<Self> {
        Ok(match kind {
            ProfileKind::Nfw => Self::Nfw(NfwProfile::new(
                relation,
                overdensity,
                cosmology.mean_matter_density0(),
            )?),
            ProfileKind::Isl => Self::Isl {
                rmax: positive_parameter("rmax", parameters.rmax)?,
            },
            ProfileKind::IslExp => Self::IslExp {
                rstar: positive_parameter("rstar", parameters.rstar)?,
            },
            ProfileKind::Exp => Self::Exp {
                scale_radius: positive_parameter("scale_radius", parameters.scale_radius)?,
            },
            ProfileKind::CgmRahmati => Self::CgmRahmati,
            ProfileKind::CgmSteidel => Self::CgmSteidel,
        })
    }

    pub fn from_config(config: &HaloModelConfig, cosmology: &dyn Cosmology) -> HaloResult<Self> {
        Self::new(
            config.profile.parse()?,
            config.concentration_relation.parse()?,
            config.overdensity,
            cosmology,
            config.profile_parameters,
        )
    }

    pub fn kind(&self) -> ProfileKind {
        match self {
            Self::Nfw(_) => ProfileKind::Nfw,
            Self::Isl { .. } => ProfileKind::Isl,
            Self::IslExp { .. } => ProfileKind::IslExp,
            Self::Exp { .. } => ProfileKind::Exp,
            Self::CgmRahmati => ProfileKind::CgmRahmati,
            Self::CgmSteidel => ProfileKind::CgmSteidel,
        }
    }
}

impl FourierProfile for AnalyticProfile {
    fn evaluate(&self, z: f64, mass: f64, k: f64) -> f64 {
        match *self {
            Self::Nfw(nfw) => nfw.fourier(z, mass, k),
            Self::Isl { rmax } => {
                let x = rmax * k;
                if x == 0.0 {
                    1.0
                } else {
                    sine_cosine_integrals(x).0 / x
                }
            }
            Self::IslExp { rstar } => arctangent_ratio(rstar * k),
            Self::Exp { scale_radius } => {
                let kappa = k * scale_radius;
                1.0 / (1.0 + kappa * kappa).powi(2)
            }
            Self::CgmRahmati => {
                arctangent_ratio((CGM_RAHMATI_RSTAR * k).powf(CGM_RAHMATI_EXPONENT))
            }
            Self::CgmSteidel => {
                arctangent_ratio((CGM_STEIDEL_RSTAR * k).powf(CGM_STEIDEL_EXPONENT))
            }
        }
    }
}

fn arctangent_ratio(x: f64) -> f64 {
    if x == 0.0 { 1.0 } else { x.atan() / x }
}

fn positive_parameter(field: &str, value: f64) -> HaloResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(HaloError::configuration(
            "CONFIG.PROFILE_PARAMETER",
            format!("profile parameter '{}' must be finite and > 0, got {}", field, value),
        ))
    }
}
