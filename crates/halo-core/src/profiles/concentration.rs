use crate::domain::{HaloError, HaloResult};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Named concentration-mass relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcentrationRelation {
    /// Duffy et al. (2008), Table 1 row 4 (z = 0-2).
    Duffy,
    Zehavi,
}

impl ConcentrationRelation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Duffy => "duffy",
            Self::Zehavi => "zehavi",
        }
    }

    pub fn concentration(self, z: f64, mass: f64) -> f64 {
        match self {
            Self::Duffy => 6.71 * (mass / 2.0e12).powf(-0.091) * (1.0 + z).powf(-0.44),
            Self::Zehavi => 9.0 * (mass / 1.5e13).powf(-0.13) / (1.0 + z),
        }
    }
}

impl FromStr for ConcentrationRelation {
    type Err = HaloError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "duffy" => Ok(Self::Duffy),
            "zehavi" => Ok(Self::Zehavi),
            _ => Err(HaloError::configuration(
                "CONFIG.CMR",
                format!("unrecognized concentration-mass relation '{}'", value),
            )),
        }
    }
}

impl Display for ConcentrationRelation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Concentration of a halo of `mass` at redshift `z` under the named relation.
pub fn get_concentration(relation: &str, z: f64, mass: f64) -> HaloResult<f64> {
    Ok(relation.parse::<ConcentrationRelation>()?.concentration(z, mass))
}

#[cfg(test)]
mod tests {
    use super::{ConcentrationRelation, get_concentration};
    use crate::domain::HaloErrorCategory;

    #[test]
    fn duffy_pivot_mass_at_z0_is_671() {
        let concentration = get_concentration("duffy", 0.0, 2.0e12).expect("duffy");
        assert!((concentration - 6.71).abs() < 1.0e-12);
    }

    #[test]
    fn zehavi_scales_inversely_with_one_plus_z() {
        let low = ConcentrationRelation::Zehavi.concentration(0.0, 1.5e13);
        let high = ConcentrationRelation::Zehavi.concentration(2.0, 1.5e13);
        assert!((low - 9.0).abs() < 1.0e-12);
        assert!((high - 3.0).abs() < 1.0e-12);
    }

    #[test]
    fn unknown_relation_is_a_configuration_error() {
        let error = get_concentration("bullock", 0.0, 1.0e12).expect_err("unknown relation");
        assert_eq!(error.category(), HaloErrorCategory::Configuration);
        assert_eq!(error.placeholder(), "CONFIG.CMR");
    }

    #[test]
    fn concentration_decreases_with_mass() {
        let relation = ConcentrationRelation::Duffy;
        assert!(relation.concentration(6.0, 1.0e8) > relation.concentration(6.0, 1.0e12));
    }
}
