use super::concentration::ConcentrationRelation;
use crate::common::constants::FOUR_PI;
use crate::domain::{HaloError, HaloResult};
use crate::numerics::{AdaptiveSimpsonInput, integrate_adaptive_simpson, sine_cosine_integrals};

const SURFACE_EPSREL: f64 = 1.0e-10;
const SURFACE_T_SCALE: f64 = 1.0e4;
const SURFACE_T_FLOOR: f64 = 1.0e2;

/// Navarro-Frenk-White halos for a fixed concentration relation, overdensity
/// and mean matter density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NfwProfile {
    relation: ConcentrationRelation,
    overdensity: f64,
    mean_density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NfwGeometry {
    pub concentration: f64,
    pub virial_radius: f64,
    pub scale_radius: f64,
}

impl NfwProfile {
    pub fn new(
        relation: ConcentrationRelation,
        overdensity: f64,
        mean_density: f64,
    ) -> HaloResult<Self> {
        if !overdensity.is_finite() || overdensity <= 0.0 {
            return Err(HaloError::configuration(
                "CONFIG.NFW",
                format!("overdensity must be finite and > 0, got {}", overdensity),
            ));
        }
        if !mean_density.is_finite() || mean_density <= 0.0 {
            return Err(HaloError::configuration(
                "CONFIG.NFW",
                format!("mean density must be finite and > 0, got {}", mean_density),
            ));
        }

        Ok(Self {
            relation,
            overdensity,
            mean_density,
        })
    }

    pub fn relation(&self) -> ConcentrationRelation {
        self.relation
    }

    /// Radius enclosing `overdensity` times the mean density.
    pub fn virial_radius(&self, mass: f64) -> f64 {
        (3.0 * mass / (FOUR_PI * self.overdensity * self.mean_density)).cbrt()
    }

    pub fn geometry(&self, z: f64, mass: f64) -> NfwGeometry {
        let concentration = self.relation.concentration(z, mass);
        let virial_radius = self.virial_radius(mass);
        NfwGeometry {
            concentration,
            virial_radius,
            scale_radius: virial_radius / concentration,
        }
    }

    /// Normalized Fourier transform `u(k | M)` (Cooray & Sheth 2002, eq. 81).
    pub fn fourier(&self, z: f64, mass: f64, k: f64) -> f64 {
        let geometry = self.geometry(z, mass);
        let c = geometry.concentration;
        let scaled_k = k * geometry.scale_radius;
        if scaled_k == 0.0 {
            return 1.0;
        }

        let (si_outer, ci_outer) = sine_cosine_integrals((1.0 + c) * scaled_k);
        let (si_inner, ci_inner) = sine_cosine_integrals(scaled_k);
        let norm = 1.0 / mass_factor(c);

        norm * (scaled_k.sin() * (si_outer - si_inner)
            - (c * scaled_k).sin() / ((1.0 + c) * scaled_k)
            + scaled_k.cos() * (ci_outer - ci_inner))
    }

    /// Real-space density per unit halo mass at radius `r`. With `truncate`,
    /// zero beyond the virial radius. `r = 0` yields the cusp limit `+inf`.
    pub fn density(&self, z: f64, mass: f64, r: f64, truncate: bool) -> f64 {
        let geometry = self.geometry(z, mass);
        density_at(geometry, r, truncate)
    }

    /// Projected surface density `2 int_R^inf r rho(r) / sqrt(r^2 - R^2) dr`
    /// of the untruncated profile.
    pub fn surface_density(&self, z: f64, mass: f64, projected_radius: f64) -> HaloResult<f64> {
        if !projected_radius.is_finite() || projected_radius < 0.0 {
            return Err(HaloError::out_of_range(
                "RANGE.PROJECTED_RADIUS",
                format!("projected radius must be finite and >= 0, got {}", projected_radius),
            ));
        }
        if projected_radius == 0.0 {
            return Ok(f64::INFINITY);
        }

        let geometry = self.geometry(z, mass);
        // r = R cosh t removes the inverse square-root endpoint singularity.
        let t_max = (SURFACE_T_SCALE * geometry.scale_radius / projected_radius)
            .max(SURFACE_T_FLOOR)
            .acosh();
        let outcome = integrate_adaptive_simpson(
            AdaptiveSimpsonInput::new(0.0, t_max, SURFACE_EPSREL, 0.0),
            |t| {
                let r = projected_radius * t.cosh();
                r * density_at(geometry, r, false)
            },
        )?;

        if outcome.unconverged_panels > 0 {
            tracing::debug!(
                z,
                mass,
                projected_radius,
                panels = outcome.unconverged_panels,
                "surface density quadrature reached depth limit"
            );
        }

        Ok(2.0 * outcome.value)
    }
}

fn mass_factor(c: f64) -> f64 {
    (1.0 + c).ln() - c / (1.0 + c)
}

fn characteristic_overdensity(c: f64) -> f64 {
    c.powi(3) / FOUR_PI / mass_factor(c)
}

fn density_at(geometry: NfwGeometry, r: f64, truncate: bool) -> f64 {
    let c = geometry.concentration;
    let x = r / geometry.scale_radius;
    if truncate && x / c > 1.0 {
        return 0.0;
    }
    if x == 0.0 {
        return f64::INFINITY;
    }
    characteristic_overdensity(c) / geometry.virial_radius.powi(3) / (x * (1.0 + x).powi(2))
}

#[cfg(test)]
mod tests {
    use super::NfwProfile;
    use crate::common::constants::FOUR_PI;
    use crate::numerics::{AdaptiveSimpsonInput, integrate_adaptive_simpson};
    use crate::profiles::concentration::ConcentrationRelation;

    const MEAN_DENSITY: f64 = 3.8e10;

    fn profile() -> NfwProfile {
        NfwProfile::new(ConcentrationRelation::Duffy, 200.0, MEAN_DENSITY).expect("nfw")
    }

    #[test]
    fn virial_radius_encloses_overdense_mass() {
        let nfw = profile();
        let mass = 1.0e12;
        let radius = nfw.virial_radius(mass);
        let enclosed = FOUR_PI / 3.0 * 200.0 * MEAN_DENSITY * radius.powi(3);
        assert_close("mass", mass, enclosed, 0.0, 1.0e-12);
    }

    #[test]
    fn fourier_profile_tends_to_unity_at_large_scales() {
        let nfw = profile();
        assert_eq!(nfw.fourier(8.0, 1.0e10, 0.0), 1.0);
        assert_close("u(k->0)", 1.0, nfw.fourier(8.0, 1.0e10, 1.0e-6), 1.0e-6, 0.0);
        assert_close("u(k->0)", 1.0, nfw.fourier(0.0, 1.0e14, 1.0e-4), 1.0e-4, 0.0);
    }

    #[test]
    fn fourier_profile_decays_inside_the_halo() {
        let nfw = profile();
        let geometry = nfw.geometry(8.0, 1.0e12);
        let small = nfw.fourier(8.0, 1.0e12, 0.1 / geometry.virial_radius);
        let large = nfw.fourier(8.0, 1.0e12, 100.0 / geometry.virial_radius);
        assert!(small > large);
        assert!(large.abs() < 0.1);
    }

    #[test]
    fn density_integrates_to_unity_within_virial_radius() {
        let nfw = profile();
        let (z, mass) = (6.0, 1.0e11);
        let geometry = nfw.geometry(z, mass);
        let outcome = integrate_adaptive_simpson(
            AdaptiveSimpsonInput::new(
                (geometry.scale_radius * 1.0e-8).ln(),
                geometry.virial_radius.ln(),
                1.0e-10,
                0.0,
            ),
            |ln_r| {
                let r = ln_r.exp();
                FOUR_PI * r.powi(3) * nfw.density(z, mass, r, false)
            },
        )
        .expect("integration");
        assert_close("enclosed fraction", 1.0, outcome.value, 0.0, 1.0e-6);
    }

    #[test]
    fn density_handles_cusp_and_truncation() {
        let nfw = profile();
        let geometry = nfw.geometry(8.0, 1.0e10);
        assert_eq!(nfw.density(8.0, 1.0e10, 0.0, true), f64::INFINITY);
        assert_eq!(nfw.density(8.0, 1.0e10, 2.0 * geometry.virial_radius, true), 0.0);
        assert!(nfw.density(8.0, 1.0e10, 2.0 * geometry.virial_radius, false) > 0.0);
    }

    #[test]
    fn surface_density_matches_closed_form_at_scale_radius() {
        let nfw = profile();
        let (z, mass) = (8.0, 1.0e10);
        let geometry = nfw.geometry(z, mass);
        let rho_s = nfw.density(z, mass, geometry.scale_radius, false) * 4.0;
        let expected = 2.0 * rho_s * geometry.scale_radius / 3.0;

        let sigma = nfw
            .surface_density(z, mass, geometry.scale_radius)
            .expect("surface density");
        assert_close("sigma(r_s)", expected, sigma, 0.0, 1.0e-6);
        assert_eq!(
            nfw.surface_density(z, mass, 0.0).expect("surface density"),
            f64::INFINITY
        );
    }

    fn assert_close(label: &str, expected: f64, actual: f64, abs_tol: f64, rel_tol: f64) {
        let abs_diff = (actual - expected).abs();
        let rel_diff = abs_diff / expected.abs().max(1.0e-300);
        assert!(
            abs_diff <= abs_tol || rel_diff <= rel_tol,
            "{label} expected={expected:.15e} actual={actual:.15e} abs_diff={abs_diff:.3e} rel_diff={rel_diff:.3e}"
        );
    }
}
