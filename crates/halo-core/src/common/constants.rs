//! Physical constants shared by the halo-model kernels.
//!
//! Masses are in Msun and lengths in comoving Mpc throughout.

pub const PI: f64 = std::f64::consts::PI;
pub const FOUR_PI: f64 = 4.0 * PI;
pub const TWO_PI_SQUARED: f64 = 2.0 * PI * PI;

/// Critical density today over h^2, in Msun / cMpc^3.
pub const CRITICAL_DENSITY_H2: f64 = 2.775e11;

/// Linear collapse threshold for spherical collapse.
pub const DELTA_COLLAPSE: f64 = 1.686;

/// Surface-density tables are sampled in log10 R over this range, in cMpc.
pub const SURFACE_LOG10_R_MIN: f64 = -3.0;
pub const SURFACE_LOG10_R_MAX: f64 = 1.0;
pub const SURFACE_LOG10_R_STEP: f64 = 0.25;

#[cfg(test)]
mod tests {
    use super::{
        CRITICAL_DENSITY_H2, FOUR_PI, PI, SURFACE_LOG10_R_MAX, SURFACE_LOG10_R_MIN,
        SURFACE_LOG10_R_STEP, TWO_PI_SQUARED,
    };

    #[test]
    fn constants_match_expected_relationships() {
        assert!((FOUR_PI - 4.0 * PI).abs() <= 1.0e-15);
        assert!((TWO_PI_SQUARED - 19.739_208_802_178_716).abs() <= 1.0e-12);
        assert!(CRITICAL_DENSITY_H2 > 2.7e11 && CRITICAL_DENSITY_H2 < 2.8e11);

        let steps = (SURFACE_LOG10_R_MAX - SURFACE_LOG10_R_MIN) / SURFACE_LOG10_R_STEP;
        assert_eq!(steps, 16.0);
    }
}
