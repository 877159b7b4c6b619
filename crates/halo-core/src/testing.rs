//! Shared fixtures for unit, integration and CLI tests.
//!
//! The toy population uses a Press-Schechter multiplicity function with a
//! power-law `sigma(M)` growing as `1 / (1 + z)`, which is enough to make
//! every halo-model integral well defined without an external mass-function
//! generator.

use crate::common::config::HaloModelConfig;
use crate::common::constants::{DELTA_COLLAPSE, PI};
use crate::halos::{Cosmology, FlatLambdaCdm, HaloTableDocument, TabulatedHalos};

pub const TOY_REDSHIFTS: [f64; 3] = [6.0, 8.0, 10.0];

const LOG_MASS_MIN: f64 = 8.0;
const LOG_MASS_STEP: f64 = 0.1;
const MASS_COUNT: usize = 71;
const SIGMA_PIVOT: f64 = 3.0;
const SIGMA_SLOPE: f64 = 0.1;
const LINEAR_AMPLITUDE: f64 = 2.0e6;
const LINEAR_TURNOVER: f64 = 0.02;
const LN_K_LIN_STEP: f64 = 0.05;

/// Configuration matching [`toy_halos`]: NFW with Duffy concentrations on
/// `10^8..10^15` Msun and `z = 6, 8, 10`.
pub fn toy_config() -> HaloModelConfig {
    HaloModelConfig {
        profile: "nfw".to_string(),
        concentration_relation: "duffy".to_string(),
        mass_function: "ST".to_string(),
        log_mass_min: 8.0,
        log_mass_max: 15.0,
        log_mass_step: 0.1,
        redshift_min: 6.0,
        redshift_max: 10.0,
        redshift_step: 2.0,
        ln_k_min: -5.0,
        ln_k_max: 5.0,
        ln_k_step: 0.05,
        ln_r_min: -5.0,
        ln_r_max: 5.0,
        ln_r_step: 0.1,
        ..HaloModelConfig::default()
    }
}

pub fn toy_halos() -> TabulatedHalos {
    TabulatedHalos::from_document(toy_document())
        .expect("toy halo population should be well formed")
}

pub fn toy_document() -> HaloTableDocument {
    let cosmology = FlatLambdaCdm::default();
    let mean_density = cosmology.mean_matter_density0();

    let tab_m: Vec<f64> = (0..MASS_COUNT)
        .map(|index| 10_f64.powf(LOG_MASS_MIN + LOG_MASS_STEP * index as f64))
        .collect();
    let tab_k_lin = toy_linear_wavenumbers();

    let mut tab_dndlnm = Vec::new();
    let mut tab_bias = Vec::new();
    let mut tab_fcoll = Vec::new();
    let mut tab_ps_lin = Vec::new();

    for z in TOY_REDSHIFTS {
        let peaks: Vec<f64> = tab_m.iter().map(|mass| DELTA_COLLAPSE / sigma(z, *mass)).collect();

        tab_dndlnm.push(
            tab_m
                .iter()
                .zip(&peaks)
                .map(|(mass, nu)| {
                    mean_density / mass
                        * (2.0 / PI).sqrt()
                        * nu
                        * (-0.5 * nu * nu).exp()
                        * SIGMA_SLOPE
                })
                .collect(),
        );
        tab_bias.push(
            peaks
                .iter()
                .map(|nu| 1.0 + (nu * nu - 1.0) / DELTA_COLLAPSE)
                .collect(),
        );
        tab_fcoll.push(
            peaks
                .iter()
                .map(|nu| complementary_error_function(nu / 2_f64.sqrt()))
                .collect(),
        );
        tab_ps_lin.push(tab_k_lin.iter().map(|k| toy_linear_power(z, *k)).collect());
    }

    HaloTableDocument {
        cosmology,
        tab_z: TOY_REDSHIFTS.to_vec(),
        tab_m,
        tab_dndlnm,
        tab_bias,
        tab_fcoll,
        tab_k_lin,
        tab_ps_lin,
    }
}

/// Log-uniform `k` from `1e-4` to just under `1e3`.
pub fn toy_linear_wavenumbers() -> Vec<f64> {
    let ln_min = 1.0e-4_f64.ln();
    let ln_max = 1.0e3_f64.ln();
    let count = ((ln_max - ln_min) / LN_K_LIN_STEP).floor() as usize + 1;
    (0..count)
        .map(|index| (ln_min + LN_K_LIN_STEP * index as f64).exp())
        .collect()
}

pub fn toy_linear_power(z: f64, k: f64) -> f64 {
    let growth = 7.0 / (1.0 + z);
    let ratio = k / LINEAR_TURNOVER;
    LINEAR_AMPLITUDE * k / (1.0 + ratio * ratio).powi(2) * growth * growth
}

fn sigma(z: f64, mass: f64) -> f64 {
    SIGMA_PIVOT * (mass / 1.0e8).powf(-SIGMA_SLOPE) * 7.0 / (1.0 + z)
}

// Chebyshev fit with fractional error below 1.2e-7 everywhere.
fn complementary_error_function(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let tail = t * (-z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77)))))))))
        .exp();
    if x >= 0.0 { tail } else { 2.0 - tail }
}

#[cfg(test)]
mod tests {
    use super::{TOY_REDSHIFTS, complementary_error_function, toy_config, toy_halos};
    use crate::halos::HaloPopulation;

    #[test]
    fn toy_population_matches_toy_config_grids() {
        let config = toy_config();
        let halos = toy_halos();
        assert_eq!(halos.tab_z(), TOY_REDSHIFTS.as_slice());
        assert_eq!(halos.tab_m().len(), config.log_mass_size().expect("size") + 1);
        assert!((halos.tab_m()[70] / 1.0e15 - 1.0).abs() < 1.0e-10);
    }

    #[test]
    fn collapsed_fraction_falls_with_mass_and_redshift() {
        let halos = toy_halos();
        let fcoll = halos.tab_fcoll();
        assert!(fcoll[(1, 0)] > fcoll[(1, 70)]);
        assert!(fcoll[(0, 30)] > fcoll[(2, 30)]);
        assert!(fcoll[(2, 70)] > 0.0);
    }

    #[test]
    fn error_function_fit_hits_known_values() {
        assert!((complementary_error_function(0.0) - 1.0).abs() < 1.0e-7);
        assert!((complementary_error_function(1.0) - 0.157_299_207).abs() < 1.0e-7);
        assert!((complementary_error_function(-1.0) - 1.842_700_793).abs() < 1.0e-7);
    }
}
