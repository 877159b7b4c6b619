use crate::common::constants::CRITICAL_DENSITY_H2;
use crate::domain::{HaloError, HaloResult};
use serde::{Deserialize, Serialize};

/// Background cosmology consumed by the halo model.
pub trait Cosmology {
    /// Mean matter density today, in Msun / cMpc^3.
    fn mean_matter_density0(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FlatLambdaCdm {
    pub omega_m_0: f64,
    /// Dimensionless Hubble parameter `h`.
    pub hubble: f64,
}

impl FlatLambdaCdm {
    pub fn new(omega_m_0: f64, hubble: f64) -> HaloResult<Self> {
        let cosmology = Self { omega_m_0, hubble };
        cosmology.validate()?;
        Ok(cosmology)
    }

    pub fn validate(&self) -> HaloResult<()> {
        if !self.omega_m_0.is_finite() || self.omega_m_0 <= 0.0 || self.omega_m_0 > 1.0 {
            return Err(HaloError::configuration(
                "CONFIG.COSMOLOGY",
                format!("omega_m_0 must lie in (0, 1], got {}", self.omega_m_0),
            ));
        }
        if !self.hubble.is_finite() || self.hubble <= 0.0 {
            return Err(HaloError::configuration(
                "CONFIG.COSMOLOGY",
                format!("hubble must be finite and > 0, got {}", self.hubble),
            ));
        }
        Ok(())
    }
}

impl Default for FlatLambdaCdm {
    fn default() -> Self {
        Self {
            omega_m_0: 0.3089,
            hubble: 0.6774,
        }
    }
}

impl Cosmology for FlatLambdaCdm {
    fn mean_matter_density0(&self) -> f64 {
        self.omega_m_0 * CRITICAL_DENSITY_H2 * self.hubble * self.hubble
    }
}
