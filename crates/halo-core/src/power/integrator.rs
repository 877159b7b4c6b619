//! Mass integrals of the halo model at one `(k, z)`.
//!
//! Each side of an integral is a [`Tracer`]: a Fourier profile plus the way
//! halos are weighted. Mass weighting is normalized by the mean matter
//! density and, without a mass floor, corrected for the mass that lies
//! below the tabulated grid.

use crate::domain::{HaloError, HaloResult, HaloTerm};
use crate::halos::HaloPopulation;
use crate::numerics::{matrix_row, nearest_index, trapezoid, trapezoid_masked};
use crate::profiles::FourierProfile;

/// Mean number of tracers per halo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Occupation<'a> {
    Constant(f64),
    /// One value per tabulated halo mass.
    PerMass(&'a [f64]),
}

impl Default for Occupation<'_> {
    fn default() -> Self {
        Self::Constant(1.0)
    }
}

impl Occupation<'_> {
    fn values(&self, mass_count: usize) -> HaloResult<Vec<f64>> {
        match *self {
            Self::Constant(value) => Ok(vec![value; mass_count]),
            Self::PerMass(values) if values.len() == mass_count => Ok(values.to_vec()),
            Self::PerMass(values) => Err(HaloError::configuration(
                "CONFIG.OCCUPATION",
                format!(
                    "occupation holds {} values but the halo grid has {} masses",
                    values.len(),
                    mass_count
                ),
            )),
        }
    }
}

/// One side of a halo-model integral.
#[derive(Clone, Copy)]
pub struct Tracer<'a> {
    pub profile: &'a dyn FourierProfile,
    /// Luminosity per tabulated halo mass. Replaces mass weighting.
    pub luminosity: Option<&'a [f64]>,
    /// Minimum halo mass; normalizes by the collapsed fraction above it.
    pub mass_floor: Option<f64>,
    pub occupation: Occupation<'a>,
}

impl<'a> Tracer<'a> {
    /// Mass-weighted matter tracer.
    pub fn matter(profile: &'a dyn FourierProfile) -> Self {
        Self {
            profile,
            luminosity: None,
            mass_floor: None,
            occupation: Occupation::default(),
        }
    }

    pub fn with_luminosity(mut self, luminosity: &'a [f64]) -> Self {
        self.luminosity = Some(luminosity);
        self
    }

    pub fn with_mass_floor(mut self, mass_floor: f64) -> Self {
        self.mass_floor = Some(mass_floor);
        self
    }

    pub fn with_occupation(mut self, occupation: Occupation<'a>) -> Self {
        self.occupation = occupation;
        self
    }

    /// Neither luminosity nor a mass floor: plain matter weighting.
    pub fn is_mass_weighted(&self) -> bool {
        self.luminosity.is_none() && self.mass_floor.is_none()
    }
}

/// Weight, normalization and small-halo correction of one side.
#[derive(Debug, Clone, PartialEq)]
struct Weighting {
    weight: Vec<f64>,
    norm: f64,
    correction: f64,
}

pub struct HaloIntegrator<'a> {
    halos: &'a dyn HaloPopulation,
}

impl<'a> HaloIntegrator<'a> {
    pub fn new(halos: &'a dyn HaloPopulation) -> Self {
        Self { halos }
    }

    /// One-halo integral `(I, None)` or the two two-halo partial integrals
    /// `(I1, Some(I2))` at wavenumber `k` and redshift row `z_index`.
    pub fn integrate(
        &self,
        k: f64,
        z_index: usize,
        side1: &Tracer<'_>,
        side2: &Tracer<'_>,
        term: HaloTerm,
    ) -> HaloResult<(f64, Option<f64>)> {
        let tab_z = self.halos.tab_z();
        let z = *tab_z.get(z_index).ok_or_else(|| {
            HaloError::out_of_range(
                "RANGE.REDSHIFT_INDEX",
                format!("redshift index {} exceeds {} tabulated redshifts", z_index, tab_z.len()),
            )
        })?;

        let tab_m = self.halos.tab_m();
        let ln_m: Vec<f64> = tab_m.iter().map(|mass| mass.ln()).collect();
        let dndlnm = matrix_row(self.halos.tab_dndlnm(), z_index);
        let fcoll = matrix_row(self.halos.tab_fcoll(), z_index);
        let in_domain: Vec<bool> = fcoll.iter().map(|value| *value > 0.0).collect();

        let profile1 = self.profile_row(side1, z_index, z, k);
        let profile2 = self.profile_row(side2, z_index, z, k);
        let weighting1 = self.weighting(side1, z_index, &dndlnm, &fcoll, &ln_m)?;
        let weighting2 = self.weighting(side2, z_index, &dndlnm, &fcoll, &ln_m)?;
        let occupation1 = side1.occupation.values(tab_m.len())?;

        match term {
            HaloTerm::OneHalo => {
                let integrand: Vec<f64> = (0..tab_m.len())
                    .map(|index| {
                        dndlnm[index]
                            * occupation1[index]
                            * weighting1.weight[index]
                            * weighting2.weight[index]
                            * profile1[index]
                            * profile2[index]
                            / weighting1.norm
                            / weighting2.norm
                    })
                    .collect();
                let result = trapezoid_masked(&integrand, &ln_m, &in_domain);
                tracing::debug!(k, z, result, "one-halo integral");
                Ok((result, None))
            }
            HaloTerm::TwoHalo => {
                let bias = matrix_row(self.halos.tab_bias(), z_index);
                let occupation2 = side2.occupation.values(tab_m.len())?;
                let partial = |occupation: &[f64], profile: &[f64], weighting: &Weighting| {
                    let integrand: Vec<f64> = (0..tab_m.len())
                        .map(|index| {
                            dndlnm[index]
                                * occupation[index]
                                * weighting.weight[index]
                                * profile[index]
                                * bias[index]
                                / weighting.norm
                        })
                        .collect();
                    trapezoid_masked(&integrand, &ln_m, &in_domain) + weighting.correction
                };

                let first = partial(&occupation1, &profile1, &weighting1);
                let second = partial(&occupation2, &profile2, &weighting2);
                tracing::debug!(k, z, first, second, "two-halo integrals");
                Ok((first, Some(second)))
            }
        }
    }

    /// Poisson term `int dndlnM N L1 L2 dlnM` over the whole mass grid.
    /// Absent luminosities fall back to `M / rho_mean`.
    pub fn shot_noise(
        &self,
        z_index: usize,
        luminosity1: Option<&[f64]>,
        luminosity2: Option<&[f64]>,
        occupation: Occupation<'_>,
    ) -> HaloResult<f64> {
        let tab_m = self.halos.tab_m();
        let ln_m: Vec<f64> = tab_m.iter().map(|mass| mass.ln()).collect();
        let dndlnm = matrix_row(self.halos.tab_dndlnm(), z_index);
        let occupation = occupation.values(tab_m.len())?;
        let mean_density = self.halos.cosmology().mean_matter_density0();

        let weight = |luminosity: Option<&[f64]>| -> HaloResult<Vec<f64>> {
            match luminosity {
                Some(values) => checked_luminosity(values, tab_m.len()).map(<[f64]>::to_vec),
                None => Ok(tab_m.iter().map(|mass| mass / mean_density).collect()),
            }
        };
        let weight1 = weight(luminosity1)?;
        let weight2 = weight(luminosity2)?;

        let integrand: Vec<f64> = (0..tab_m.len())
            .map(|index| dndlnm[index] * occupation[index] * weight1[index] * weight2[index])
            .collect();
        Ok(trapezoid(&integrand, &ln_m))
    }

    fn profile_row(&self, tracer: &Tracer<'_>, z_index: usize, z: f64, k: f64) -> Vec<f64> {
        tracer
            .profile
            .evaluate_over_masses(z_index, z, self.halos.tab_m(), k)
            .into_iter()
            .map(f64::abs)
            .collect()
    }

    fn weighting(
        &self,
        tracer: &Tracer<'_>,
        z_index: usize,
        dndlnm: &[f64],
        fcoll: &[f64],
        ln_m: &[f64],
    ) -> HaloResult<Weighting> {
        let tab_m = self.halos.tab_m();

        if let Some(luminosity) = tracer.luminosity {
            return Ok(Weighting {
                weight: checked_luminosity(luminosity, tab_m.len())?.to_vec(),
                norm: 1.0,
                correction: 0.0,
            });
        }

        let mean_density = self.halos.cosmology().mean_matter_density0();
        let weight = tab_m.to_vec();

        match tracer.mass_floor {
            Some(floor) => {
                let index = nearest_index(floor, tab_m).ok_or_else(|| {
                    HaloError::computation("NUMERIC.MASS_FLOOR", "halo mass grid is empty")
                })?;
                let collapsed = fcoll[index];
                if collapsed <= 0.0 {
                    return Err(HaloError::computation(
                        "NUMERIC.MASS_FLOOR",
                        format!(
                            "collapsed fraction above mass floor {:e} is zero at redshift index {}",
                            floor, z_index
                        ),
                    ));
                }
                Ok(Weighting {
                    weight,
                    norm: mean_density * collapsed,
                    correction: 0.0,
                })
            }
            None => {
                let bias = matrix_row(self.halos.tab_bias(), z_index);
                let resolved: Vec<f64> = (0..tab_m.len())
                    .map(|index| dndlnm[index] * tab_m[index] / mean_density * bias[index])
                    .collect();
                Ok(Weighting {
                    weight,
                    norm: mean_density,
                    correction: 1.0 - trapezoid(&resolved, ln_m),
                })
            }
        }
    }
}

fn checked_luminosity(values: &[f64], mass_count: usize) -> HaloResult<&[f64]> {
    if values.len() != mass_count {
        return Err(HaloError::configuration(
            "CONFIG.LUMINOSITY",
            format!(
                "luminosity holds {} values but the halo grid has {} masses",
                values.len(),
                mass_count
            ),
        ));
    }
    Ok(values)
}
