//! Deterministic file prefixes for cached tables.
//!
//! Two runs with the same configuration always resolve to the same names,
//! which is what makes a table on disk usable as a cache.

use super::config::HaloModelConfig;
use super::constants::{SURFACE_LOG10_R_MAX, SURFACE_LOG10_R_MIN, SURFACE_LOG10_R_STEP};
use crate::domain::HaloResult;

const REDSHIFT_SEGMENT: &str = "_z_";
const RADIUS_SEGMENT: &str = "_lnR_";

/// Prefix of the power-spectrum table, e.g.
/// `halo_ps_ST_nfw_duffy_logM_1200_4-16_z_1101_5-60_lnR_-9.0-9.0_dlnR_0.050_lnk_-9.0-9.0_dlnk_0.050`.
pub fn table_prefix(config: &HaloModelConfig) -> HaloResult<String> {
    let mass_size = config.log_mass_size()?;
    let redshift_size = config.redshift_size()?;

    Ok(format!(
        "halo_ps_{}_{}_{}_logM_{}_{}-{}_z_{}_{}-{}_lnR_{:.1}-{:.1}_dlnR_{:.3}_lnk_{:.1}-{:.1}_dlnk_{:.3}",
        config.mass_function,
        config.profile,
        config.concentration_relation,
        mass_size,
        truncate(config.log_mass_min),
        truncate(config.log_mass_max),
        redshift_size,
        truncate(config.redshift_min),
        truncate(config.redshift_max),
        config.ln_r_min,
        config.ln_r_max,
        config.ln_r_step,
        config.ln_k_min,
        config.ln_k_max,
        config.ln_k_step,
    ))
}

/// Table prefix without the redshift segment, so checkpoints survive an
/// extension of the redshift range.
pub fn checkpoint_prefix(config: &HaloModelConfig) -> HaloResult<String> {
    let prefix = table_prefix(config)?;
    Ok(strip_redshift_segment(&prefix))
}

pub fn profile_prefix(config: &HaloModelConfig) -> HaloResult<String> {
    let mass_size = config.log_mass_size()?;
    let redshift_size = config.redshift_size()?;

    Ok(format!(
        "halo_prof_{}_{}_logM_{}_{}-{}_z_{}_{}-{}_lnk_{:.1}-{:.1}_dlnk_{:.3}",
        config.profile,
        config.concentration_relation,
        mass_size,
        truncate(config.log_mass_min),
        truncate(config.log_mass_max),
        redshift_size,
        truncate(config.redshift_min),
        truncate(config.redshift_max),
        config.ln_k_min,
        config.ln_k_max,
        config.ln_k_step,
    ))
}

pub fn surface_prefix(config: &HaloModelConfig) -> HaloResult<String> {
    let mass_size = config.log_mass_size()?;
    let redshift_size = config.redshift_size()?;

    Ok(format!(
        "halo_surf_{}_logM_{}_{}-{}_z_{}_{}-{}_logR_{:.1}-{:.1}_dlnR_{:.3}",
        config.concentration_relation,
        mass_size,
        truncate(config.log_mass_min),
        truncate(config.log_mass_max),
        redshift_size,
        truncate(config.redshift_min),
        truncate(config.redshift_max),
        SURFACE_LOG10_R_MIN,
        SURFACE_LOG10_R_MAX,
        SURFACE_LOG10_R_STEP,
    ))
}

fn strip_redshift_segment(prefix: &str) -> String {
    match (prefix.find(REDSHIFT_SEGMENT), prefix.find(RADIUS_SEGMENT)) {
        (Some(start), Some(end)) if start < end => {
            format!("{}{}", &prefix[..start], &prefix[end..])
        }
        _ => prefix.to_string(),
    }
}

// Grid bounds appear as integers in names; fractional parts are dropped.
fn truncate(value: f64) -> i64 {
    value as i64
}

#[cfg(test)]
mod tests {
    use super::{checkpoint_prefix, profile_prefix, surface_prefix, table_prefix};
    use crate::common::config::HaloModelConfig;

    fn sample_config() -> HaloModelConfig {
        HaloModelConfig {
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

    #[test]
    fn table_prefix_encodes_every_grid() {
        let prefix = table_prefix(&sample_config()).expect("prefix");
        assert_eq!(
            prefix,
            "halo_ps_ST_nfw_duffy_logM_70_8-15_z_3_6-10_lnR_-5.0-5.0_dlnR_0.100_lnk_-5.0-5.0_dlnk_0.050"
        );
    }

    #[test]
    fn checkpoint_prefix_drops_redshift_range() {
        let short = sample_config();
        let extended = HaloModelConfig {
            redshift_max: 20.0,
            ..sample_config()
        };

        let prefix = checkpoint_prefix(&short).expect("prefix");
        assert!(!prefix.contains("_z_"));
        assert_eq!(prefix, checkpoint_prefix(&extended).expect("prefix"));
        assert_ne!(
            table_prefix(&short).expect("prefix"),
            table_prefix(&extended).expect("prefix")
        );
    }

    #[test]
    fn profile_and_surface_prefixes_follow_convention() {
        let config = sample_config();
        assert_eq!(
            profile_prefix(&config).expect("prefix"),
            "halo_prof_nfw_duffy_logM_70_8-15_z_3_6-10_lnk_-5.0-5.0_dlnk_0.050"
        );
        assert_eq!(
            surface_prefix(&config).expect("prefix"),
            "halo_surf_duffy_logM_70_8-15_z_3_6-10_logR_-3.0-1.0_dlnR_0.250"
        );
    }

    #[test]
    fn non_integral_grid_has_no_name() {
        let config = HaloModelConfig {
            redshift_step: 3.0,
            ..sample_config()
        };
        assert!(table_prefix(&config).is_err());
    }
}
