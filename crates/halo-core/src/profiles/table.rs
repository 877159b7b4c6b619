//! Lookup tables of Fourier profiles over `(z, M, k)` and NFW surface
//! densities over `(z, M, R)`, plus the cache-or-compute accessor that
//! prefers a table on disk and falls back to analytic evaluation.

use super::{AnalyticProfile, FourierProfile, NfwProfile, ProfileKind};
use crate::common::config::HaloModelConfig;
use crate::common::constants::{SURFACE_LOG10_R_MAX, SURFACE_LOG10_R_MIN, SURFACE_LOG10_R_STEP};
use crate::common::naming::{profile_prefix, surface_prefix};
use crate::domain::{HaloError, HaloResult, TabulationWarning};
use crate::halos::{HaloPopulation, ensure_matches_config, same_masses, same_redshifts};
use crate::numerics::{interpolate_linear, interpolate_log_log, nearest_index};
use crate::table::DatasetContainer;
use crate::tabulation::workers::Communicator;
use std::fs;
use std::path::{Path, PathBuf};

const TABLE_SUFFIX: &str = "dset";
const PROFILE_DATASET_PREFIX: &str = "tab_u_";
const SURFACE_DATASET: &str = "tab_Sigma_nfw";
const LARGE_TABLE_BYTES: usize = 8_000_000_000;

/// Where a derived table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableSource {
    /// Read from disk.
    Loaded,
    /// Tabulated in memory for this run.
    Computed,
    /// No table; values are evaluated analytically on demand.
    Missing,
}

/// `u(k | M, z)` sampled on `[z][M][k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    kind: ProfileKind,
    tab_z: Vec<f64>,
    tab_m: Vec<f64>,
    tab_k: Vec<f64>,
    values: Vec<f64>,
}

impl ProfileTable {
    pub fn new(
        kind: ProfileKind,
        tab_z: Vec<f64>,
        tab_m: Vec<f64>,
        tab_k: Vec<f64>,
        values: Vec<f64>,
    ) -> HaloResult<Self> {
        let expected = tab_z.len() * tab_m.len() * tab_k.len();
        if values.len() != expected || tab_k.len() < 2 {
            return Err(HaloError::format(
                "FORMAT.PROFILE_TABLE_SHAPE",
                format!(
                    "profile table holds {} values, expected {} x {} x {} with at least 2 wavenumbers",
                    values.len(),
                    tab_z.len(),
                    tab_m.len(),
                    tab_k.len()
                ),
            ));
        }
        Ok(Self {
            kind,
            tab_z,
            tab_m,
            tab_k,
            values,
        })
    }

    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    pub fn tab_z(&self) -> &[f64] {
        &self.tab_z
    }

    pub fn tab_m(&self) -> &[f64] {
        &self.tab_m
    }

    pub fn tab_k(&self) -> &[f64] {
        &self.tab_k
    }

    /// The `k` samples at one `(z, M)` grid point.
    pub fn row(&self, z_index: usize, m_index: usize) -> &[f64] {
        let nk = self.tab_k.len();
        let start = (z_index * self.tab_m.len() + m_index) * nk;
        &self.values[start..start + nk]
    }

    fn dataset_name(&self) -> String {
        format!("{}{}", PROFILE_DATASET_PREFIX, self.kind)
    }

    pub fn to_container(&self) -> HaloResult<DatasetContainer> {
        let mut container = DatasetContainer::new();
        container.insert(
            self.dataset_name(),
            vec![self.tab_z.len(), self.tab_m.len(), self.tab_k.len()],
            self.values.clone(),
        )?;
        container.insert("tab_k", vec![self.tab_k.len()], self.tab_k.clone())?;
        container.insert("tab_M", vec![self.tab_m.len()], self.tab_m.clone())?;
        container.insert("tab_z", vec![self.tab_z.len()], self.tab_z.clone())?;
        container.set_attribute("version", env!("CARGO_PKG_VERSION"));
        Ok(container)
    }

    pub fn from_container(container: &DatasetContainer) -> HaloResult<Self> {
        let name = container
            .dataset_names()
            .find(|name| name.starts_with(PROFILE_DATASET_PREFIX))
            .ok_or_else(|| {
                HaloError::format(
                    "FORMAT.PROFILE_TABLE",
                    "container has no 'tab_u_*' profile dataset",
                )
            })?
            .to_string();
        let kind: ProfileKind = name[PROFILE_DATASET_PREFIX.len()..].parse()?;

        Self::new(
            kind,
            container.require("tab_z", 1)?.data.clone(),
            container.require("tab_M", 1)?.data.clone(),
            container.require("tab_k", 1)?.data.clone(),
            container.require(&name, 3)?.data.clone(),
        )
    }
}

impl FourierProfile for ProfileTable {
    /// Nearest tabulated `z` and `M`, linear in `k` (clamped at the ends).
    fn evaluate(&self, z: f64, mass: f64, k: f64) -> f64 {
        let z_index = nearest_index(z, &self.tab_z).unwrap_or(0);
        let m_index = nearest_mass_index(mass, &self.tab_m);
        interpolate_linear(k, &self.tab_k, self.row(z_index, m_index)).unwrap_or(0.0)
    }

    fn evaluate_over_masses(&self, z_index: usize, z: f64, masses: &[f64], k: f64) -> Vec<f64> {
        let same_grid = z_index < self.tab_z.len() && masses == self.tab_m.as_slice();
        if !same_grid {
            return masses.iter().map(|mass| self.evaluate(z, *mass, k)).collect();
        }
        (0..self.tab_m.len())
            .map(|m_index| {
                interpolate_linear(k, &self.tab_k, self.row(z_index, m_index)).unwrap_or(0.0)
            })
            .collect()
    }
}

/// NFW surface density `Sigma(R | M, z)` sampled on `[z][M][R]`, with `R`
/// in cMpc from `10^-3` to `10`.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceTable {
    tab_z: Vec<f64>,
    tab_m: Vec<f64>,
    tab_r: Vec<f64>,
    values: Vec<f64>,
}

impl SurfaceTable {
    pub fn tab_r(&self) -> &[f64] {
        &self.tab_r
    }

    pub fn tab_m(&self) -> &[f64] {
        &self.tab_m
    }

    pub fn tab_z(&self) -> &[f64] {
        &self.tab_z
    }

    pub fn row(&self, z_index: usize, m_index: usize) -> &[f64] {
        let nr = self.tab_r.len();
        let start = (z_index * self.tab_m.len() + m_index) * nr;
        &self.values[start..start + nr]
    }

    /// Nearest tabulated `z` and `M`, log-log in `R`.
    pub fn sigma(&self, z: f64, mass: f64, projected_radius: f64) -> Option<f64> {
        let z_index = nearest_index(z, &self.tab_z)?;
        let m_index = nearest_mass_index(mass, &self.tab_m);
        interpolate_log_log(projected_radius, &self.tab_r, self.row(z_index, m_index))
    }

    pub fn to_container(&self) -> HaloResult<DatasetContainer> {
        let mut container = DatasetContainer::new();
        container.insert(
            SURFACE_DATASET,
            vec![self.tab_z.len(), self.tab_m.len(), self.tab_r.len()],
            self.values.clone(),
        )?;
        container.insert("tab_R", vec![self.tab_r.len()], self.tab_r.clone())?;
        container.insert("tab_M", vec![self.tab_m.len()], self.tab_m.clone())?;
        container.insert("tab_z", vec![self.tab_z.len()], self.tab_z.clone())?;
        container.set_attribute("version", env!("CARGO_PKG_VERSION"));
        Ok(container)
    }

    pub fn from_container(container: &DatasetContainer) -> HaloResult<Self> {
        let table = Self {
            tab_z: container.require("tab_z", 1)?.data.clone(),
            tab_m: container.require("tab_M", 1)?.data.clone(),
            tab_r: container.require("tab_R", 1)?.data.clone(),
            values: container.require(SURFACE_DATASET, 3)?.data.clone(),
        };
        if table.values.len() != table.tab_z.len() * table.tab_m.len() * table.tab_r.len() {
            return Err(HaloError::format(
                "FORMAT.SURFACE_TABLE_SHAPE",
                "surface table size does not match its grids",
            ));
        }
        Ok(table)
    }
}

/// Projected radii of the surface-density table.
pub fn surface_radii() -> Vec<f64> {
    let count = ((SURFACE_LOG10_R_MAX - SURFACE_LOG10_R_MIN) / SURFACE_LOG10_R_STEP).round() as usize + 1;
    (0..count)
        .map(|index| 10_f64.powf(SURFACE_LOG10_R_MIN + SURFACE_LOG10_R_STEP * index as f64))
        .collect()
}

/// Profile used by the power-spectrum engine: a lookup table when one is
/// available, otherwise the closed form.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileModel {
    Tabulated(ProfileTable),
    Analytic(AnalyticProfile),
}

impl FourierProfile for ProfileModel {
    fn evaluate(&self, z: f64, mass: f64, k: f64) -> f64 {
        match self {
            Self::Tabulated(table) => table.evaluate(z, mass, k),
            Self::Analytic(profile) => profile.evaluate(z, mass, k),
        }
    }

    fn evaluate_over_masses(&self, z_index: usize, z: f64, masses: &[f64], k: f64) -> Vec<f64> {
        match self {
            Self::Tabulated(table) => table.evaluate_over_masses(z_index, z, masses, k),
            Self::Analytic(profile) => profile.evaluate_over_masses(z_index, z, masses, k),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileLookup {
    pub profile: ProfileModel,
    pub source: TableSource,
    pub path: PathBuf,
    pub warnings: Vec<TabulationWarning>,
}

/// Loads the profile table named by `config` from `directory`. Without one,
/// either tabulates it in memory (`tabulate_missing`) or falls back to the
/// analytic profile; both fallbacks report `ProfileTableMissing`.
pub fn load_or_compute_profiles(
    config: &HaloModelConfig,
    halos: &dyn HaloPopulation,
    directory: &Path,
    tabulate_missing: bool,
    communicator: &dyn Communicator,
) -> HaloResult<ProfileLookup> {
    ensure_matches_config(halos, config)?;
    let path = directory.join(format!("{}.{}", profile_prefix(config)?, TABLE_SUFFIX));

    if path.exists() {
        let bytes =
            fs::read(&path).map_err(|source| HaloError::io_at("IO.PROFILE_TABLE", "read", &path, source))?;
        let table = ProfileTable::from_container(&DatasetContainer::decode(&bytes)?)?;
        if !same_redshifts(&table.tab_z, halos.tab_z(), config.ztol)
            || !same_masses(&table.tab_m, halos.tab_m())
        {
            return Err(HaloError::format(
                "FORMAT.PROFILE_TABLE_GRID",
                format!(
                    "profile table '{}' was built on a different halo grid",
                    path.display()
                ),
            ));
        }
        tracing::info!(path = %path.display(), "loaded profile table");
        return Ok(ProfileLookup {
            profile: ProfileModel::Tabulated(table),
            source: TableSource::Loaded,
            path,
            warnings: Vec::new(),
        });
    }

    let warning = TabulationWarning::ProfileTableMissing {
        path: path.display().to_string(),
    };
    tracing::warn!(%warning);

    let analytic = AnalyticProfile::from_config(config, halos.cosmology())?;
    let (profile, source) = if tabulate_missing {
        let table = tabulate_profiles(config, halos, &analytic, communicator)?;
        (ProfileModel::Tabulated(table), TableSource::Computed)
    } else {
        (ProfileModel::Analytic(analytic), TableSource::Missing)
    };

    Ok(ProfileLookup {
        profile,
        source,
        path,
        warnings: vec![warning],
    })
}

/// Tabulates `profile` on the halo grid and the configured `k` grid.
/// Redshift `i` is computed by the worker that owns `i`; the rows are then
/// merged by an all-reduce so every worker returns the full table.
pub fn tabulate_profiles(
    config: &HaloModelConfig,
    halos: &dyn HaloPopulation,
    profile: &AnalyticProfile,
    communicator: &dyn Communicator,
) -> HaloResult<ProfileTable> {
    let context = communicator.context();
    let tab_k = config.k_grid()?.values().to_vec();
    let tab_z = halos.tab_z().to_vec();
    let tab_m = halos.tab_m().to_vec();
    let (nm, nk) = (tab_m.len(), tab_k.len());

    let mut values = vec![0.0; tab_z.len() * nm * nk];
    warn_if_large("u(z|k,M)", values.len());

    for (z_index, z) in tab_z.iter().enumerate() {
        if !context.owns(z_index) {
            continue;
        }
        for (m_index, mass) in tab_m.iter().enumerate() {
            let start = (z_index * nm + m_index) * nk;
            for (offset, k) in tab_k.iter().enumerate() {
                values[start + offset] = profile.evaluate(*z, *mass, *k);
            }
        }
        tracing::debug!(rank = context.rank(), z, "tabulated profile row");
    }

    communicator.all_reduce_sum(&mut values)?;
    ProfileTable::new(profile.kind(), tab_z, tab_m, tab_k, values)
}

pub fn tabulate_surface_density(
    halos: &dyn HaloPopulation,
    nfw: &NfwProfile,
    communicator: &dyn Communicator,
) -> HaloResult<SurfaceTable> {
    let context = communicator.context();
    let tab_r = surface_radii();
    let tab_z = halos.tab_z().to_vec();
    let tab_m = halos.tab_m().to_vec();
    let (nm, nr) = (tab_m.len(), tab_r.len());

    let mut values = vec![0.0; tab_z.len() * nm * nr];
    warn_if_large("Sigma(z|M,R)", values.len());

    for (z_index, z) in tab_z.iter().enumerate() {
        if !context.owns(z_index) {
            continue;
        }
        for (m_index, mass) in tab_m.iter().enumerate() {
            let start = (z_index * nm + m_index) * nr;
            for (offset, radius) in tab_r.iter().enumerate() {
                values[start + offset] = nfw.surface_density(*z, *mass, *radius)?;
            }
        }
        tracing::debug!(rank = context.rank(), z, "tabulated surface density row");
    }

    communicator.all_reduce_sum(&mut values)?;
    Ok(SurfaceTable {
        tab_z,
        tab_m,
        tab_r,
        values,
    })
}

/// Tabulates the configured profile and has the leader write it to
/// `destination`. Every worker returns the resolved path.
pub fn generate_profile_table(
    config: &HaloModelConfig,
    halos: &dyn HaloPopulation,
    destination: &Path,
    clobber: bool,
    communicator: &dyn Communicator,
) -> HaloResult<PathBuf> {
    ensure_matches_config(halos, config)?;
    let path = destination.join(format!("{}.{}", profile_prefix(config)?, TABLE_SUFFIX));
    ensure_writable(&path, clobber)?;

    let profile = AnalyticProfile::from_config(config, halos.cosmology())?;
    if communicator.context().is_leader() {
        tracing::info!(path = %path.display(), "will save profile table");
    }
    let table = tabulate_profiles(config, halos, &profile, communicator)?;

    if communicator.context().is_leader() {
        write_container(&path, &table.to_container()?)?;
    }
    Ok(path)
}

pub fn generate_surface_table(
    config: &HaloModelConfig,
    halos: &dyn HaloPopulation,
    destination: &Path,
    clobber: bool,
    communicator: &dyn Communicator,
) -> HaloResult<PathBuf> {
    ensure_matches_config(halos, config)?;
    let path = destination.join(format!("{}.{}", surface_prefix(config)?, TABLE_SUFFIX));
    ensure_writable(&path, clobber)?;

    let nfw = NfwProfile::new(
        config.concentration_relation.parse()?,
        config.overdensity,
        halos.cosmology().mean_matter_density0(),
    )?;
    let table = tabulate_surface_density(halos, &nfw, communicator)?;

    if communicator.context().is_leader() {
        write_container(&path, &table.to_container()?)?;
    }
    Ok(path)
}

pub fn read_surface_table(path: &Path) -> HaloResult<SurfaceTable> {
    let bytes =
        fs::read(path).map_err(|source| HaloError::io_at("IO.SURFACE_TABLE", "read", path, source))?;
    SurfaceTable::from_container(&DatasetContainer::decode(&bytes)?)
}

fn nearest_mass_index(mass: f64, tab_m: &[f64]) -> usize {
    if mass > 0.0 {
        let log_grid: Vec<f64> = tab_m.iter().map(|value| value.ln()).collect();
        nearest_index(mass.ln(), &log_grid).unwrap_or(0)
    } else {
        0
    }
}

fn ensure_writable(path: &Path, clobber: bool) -> HaloResult<()> {
    if path.exists() && !clobber {
        return Err(HaloError::io_conflict(
            "IO.TABLE_EXISTS",
            format!("'{}' exists and clobber was not requested", path.display()),
        ));
    }
    Ok(())
}

fn write_container(path: &Path, container: &DatasetContainer) -> HaloResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| HaloError::io_at("IO.TABLE_DIRECTORY", "create", parent, source))?;
    }
    fs::write(path, container.encode())
        .map_err(|source| HaloError::io_at("IO.TABLE_WRITE", "write", path, source))?;
    tracing::info!(path = %path.display(), "wrote table");
    Ok(())
}

fn warn_if_large(label: &str, count: usize) {
    let bytes = count.saturating_mul(std::mem::size_of::<f64>());
    if bytes > LARGE_TABLE_BYTES {
        tracing::warn!(table = label, bytes, "table is projected to exceed 8 GB");
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ProfileModel, ProfileTable, SurfaceTable, TableSource, generate_profile_table,
        generate_surface_table, load_or_compute_profiles, read_surface_table, surface_radii,
        tabulate_profiles,
    };
    use crate::common::config::HaloModelConfig;
    use crate::common::naming::profile_prefix;
    use crate::domain::{HaloErrorCategory, TabulationWarning};
    use crate::halos::HaloPopulation;
    use crate::profiles::{AnalyticProfile, FourierProfile, ProfileKind};
    use crate::table::DatasetContainer;
    use crate::tabulation::workers::SoloCommunicator;
    use crate::testing::{toy_config, toy_halos};
    use tempfile::TempDir;

    #[test]
    fn surface_radii_cover_three_decades_to_ten() {
        let radii = surface_radii();
        assert_eq!(radii.len(), 17);
        assert!((radii[0] - 1.0e-3).abs() < 1.0e-15);
        assert!((radii[16] - 10.0).abs() < 1.0e-12);
    }

    #[test]
    fn tabulated_profile_matches_analytic_on_grid() {
        let config = toy_config();
        let halos = toy_halos();
        let analytic = AnalyticProfile::from_config(&config, halos.cosmology()).expect("profile");
        let table = tabulate_profiles(&config, &halos, &analytic, &SoloCommunicator).expect("table");

        let k = table.tab_k()[40];
        let mass = halos.tab_m()[30];
        assert_eq!(table.evaluate(8.0, mass, k), analytic.evaluate(8.0, mass, k));

        let row = table.evaluate_over_masses(1, 8.0, halos.tab_m(), k);
        assert_eq!(row[30], analytic.evaluate(8.0, mass, k));
    }

    #[test]
    fn profile_table_survives_container_round_trip() {
        let table = ProfileTable::new(
            ProfileKind::IslExp,
            vec![6.0],
            vec![1.0e10, 1.0e11],
            vec![0.1, 1.0],
            vec![1.0, 0.5, 0.9, 0.4],
        )
        .expect("table");
        let decoded = DatasetContainer::decode(&table.to_container().expect("container").encode())
            .expect("decode");
        assert!(decoded.get("tab_u_isl_exp").is_some());
        assert_eq!(ProfileTable::from_container(&decoded).expect("table"), table);
    }

    #[test]
    fn accessor_reports_missing_computed_and_loaded_tables() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = toy_config();
        let halos = toy_halos();

        let missing =
            load_or_compute_profiles(&config, &halos, temp.path(), false, &SoloCommunicator)
                .expect("fallback");
        assert_eq!(missing.source, TableSource::Missing);
        assert!(matches!(missing.profile, ProfileModel::Analytic(_)));
        assert!(matches!(
            missing.warnings.as_slice(),
            [TabulationWarning::ProfileTableMissing { .. }]
        ));

        let computed =
            load_or_compute_profiles(&config, &halos, temp.path(), true, &SoloCommunicator)
                .expect("computed");
        assert_eq!(computed.source, TableSource::Computed);

        let path = generate_profile_table(&config, &halos, temp.path(), false, &SoloCommunicator)
            .expect("generate");
        assert_eq!(path, missing.path);
        let loaded = load_or_compute_profiles(&config, &halos, temp.path(), false, &SoloCommunicator)
            .expect("loaded");
        assert_eq!(loaded.source, TableSource::Loaded);
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.profile, computed.profile);

        let error = generate_profile_table(&config, &halos, temp.path(), false, &SoloCommunicator)
            .expect_err("existing table");
        assert_eq!(error.category(), HaloErrorCategory::IoConflict);
    }

    #[test]
    fn stored_table_on_other_redshifts_is_rejected() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = toy_config();
        let halos = toy_halos();
        let tab_k = config.k_grid().expect("k grid").values().to_vec();
        let values = vec![1.0; 3 * halos.tab_m().len() * tab_k.len()];
        let stale = ProfileTable::new(
            ProfileKind::Nfw,
            vec![6.0, 8.0, 12.0],
            halos.tab_m().to_vec(),
            tab_k,
            values,
        )
        .expect("table");
        let path = temp
            .path()
            .join(format!("{}.dset", profile_prefix(&config).expect("prefix")));
        std::fs::write(&path, stale.to_container().expect("container").encode())
            .expect("table should be written");

        let error = load_or_compute_profiles(&config, &halos, temp.path(), false, &SoloCommunicator)
            .expect_err("redshifts differ");
        assert_eq!(error.category(), HaloErrorCategory::Format);
        assert_eq!(error.placeholder(), "FORMAT.PROFILE_TABLE_GRID");
    }

    #[test]
    fn population_off_the_configured_grid_is_refused_before_writing() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = HaloModelConfig {
            redshift_min: 8.0,
            ..toy_config()
        };
        let halos = toy_halos();

        let error = generate_profile_table(&config, &halos, temp.path(), false, &SoloCommunicator)
            .expect_err("z grid differs");
        assert_eq!(error.placeholder(), "CONFIG.HALO_REDSHIFTS");
        let error = generate_surface_table(&config, &halos, temp.path(), false, &SoloCommunicator)
            .expect_err("z grid differs");
        assert_eq!(error.placeholder(), "CONFIG.HALO_REDSHIFTS");
        assert_eq!(std::fs::read_dir(temp.path()).expect("listing").count(), 0);
    }

    #[test]
    fn surface_table_is_written_and_read_back() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = toy_config();
        let halos = toy_halos();

        let path = generate_surface_table(&config, &halos, temp.path(), false, &SoloCommunicator)
            .expect("surface table");
        let table: SurfaceTable = read_surface_table(&path).expect("read");
        assert_eq!(table.tab_r().len(), 17);
        assert_eq!(table.tab_m(), halos.tab_m());

        let mass = halos.tab_m()[20];
        let inner = table.sigma(8.0, mass, 1.0e-3).expect("sigma");
        let outer = table.sigma(8.0, mass, 1.0).expect("sigma");
        assert!(inner > outer && outer > 0.0);
    }
}
