//! Halo-model power spectra and the matter correlation function at a
//! tabulated redshift.

use super::integrator::{HaloIntegrator, Occupation, Tracer};
use crate::common::config::HaloModelConfig;
use crate::common::naming::table_prefix;
use crate::domain::{HaloError, HaloResult, HaloTerm};
use crate::halos::{HaloPopulation, ensure_matches_config};
use crate::numerics::{interpolate_linear, interpolate_log_log, matrix_row, nearest_index};
use crate::profiles::{AnalyticProfile, ProfileModel};
use crate::table::{PsTable, TableFormat, read_table};
use crate::transform::TransformLayer;
use std::path::Path;

/// Relative tolerance under which a requested `R` grid is the table grid.
const SCALE_MATCH_TOLERANCE: f64 = 1.0e-10;

pub struct PowerSpectrumEngine<'a> {
    halos: &'a dyn HaloPopulation,
    profile: ProfileModel,
    transform: TransformLayer,
    linear_only: bool,
    load_table: bool,
    ztol: f64,
    tab_k: Vec<f64>,
    tab_r: Vec<f64>,
    table: Option<PsTable>,
}

impl<'a> PowerSpectrumEngine<'a> {
    pub fn new(
        config: &HaloModelConfig,
        halos: &'a dyn HaloPopulation,
        profile: ProfileModel,
    ) -> HaloResult<Self> {
        config.validate()?;
        ensure_matches_config(halos, config)?;
        Ok(Self {
            halos,
            profile,
            transform: TransformLayer::new(config.transform),
            linear_only: config.linear_only,
            load_table: config.load_table,
            ztol: config.ztol,
            tab_k: config.k_grid()?.values().to_vec(),
            tab_r: config.r_grid()?.values().to_vec(),
            table: None,
        })
    }

    /// Engine over the configured analytic profile.
    pub fn from_config(config: &HaloModelConfig, halos: &'a dyn HaloPopulation) -> HaloResult<Self> {
        let profile = AnalyticProfile::from_config(config, halos.cosmology())?;
        Self::new(config, halos, ProfileModel::Analytic(profile))
    }

    /// Serves [`Self::get_cf_mm`] from `table` when table loading is enabled.
    pub fn with_table(mut self, table: PsTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Attaches the table named by `config` under `directory` if table
    /// loading is enabled and either format is present.
    pub fn load_cached_table(self, config: &HaloModelConfig, directory: &Path) -> HaloResult<Self> {
        if !self.load_table {
            return Ok(self);
        }

        let prefix = table_prefix(config)?;
        for format in [TableFormat::Dataset, TableFormat::Sequential] {
            let path = directory.join(format!("{}.{}", prefix, format.suffix()));
            if path.exists() {
                tracing::info!(path = %path.display(), "loaded power-spectrum table");
                return Ok(self.with_table(read_table(&path)?));
            }
        }

        tracing::warn!(
            directory = %directory.display(),
            prefix,
            "no power-spectrum table to load; correlation functions will be computed"
        );
        Ok(self)
    }

    pub fn halos(&self) -> &'a dyn HaloPopulation {
        self.halos
    }

    pub fn profile(&self) -> &ProfileModel {
        &self.profile
    }

    pub fn transform(&self) -> &TransformLayer {
        &self.transform
    }

    pub fn tab_k(&self) -> &[f64] {
        &self.tab_k
    }

    pub fn tab_r(&self) -> &[f64] {
        &self.tab_r
    }

    pub fn is_linear_only(&self) -> bool {
        self.linear_only
    }

    /// Mass-weighted tracer over this engine's profile.
    pub fn matter(&self) -> Tracer<'_> {
        Tracer::matter(&self.profile)
    }

    /// Row of the tabulated redshift nearest `z`, provided it lies within
    /// `ztol`.
    pub fn redshift_index(&self, z: f64) -> HaloResult<usize> {
        nearest_within(z, self.halos.tab_z(), self.ztol)
    }

    /// Linear matter power spectrum, log-log interpolated in `k`.
    pub fn get_ps_lin(&self, z: f64, k: &[f64]) -> HaloResult<Vec<f64>> {
        let z_index = self.redshift_index(z)?;
        self.linear_power(z_index, k)
    }

    pub fn get_ps_1h(
        &self,
        z: f64,
        k: &[f64],
        side1: &Tracer<'_>,
        side2: &Tracer<'_>,
    ) -> HaloResult<Vec<f64>> {
        let z_index = self.redshift_index(z)?;
        let integrator = HaloIntegrator::new(self.halos);
        k.iter()
            .map(|wavenumber| {
                integrator
                    .integrate(*wavenumber, z_index, side1, side2, HaloTerm::OneHalo)
                    .map(|(value, _)| value)
            })
            .collect()
    }

    /// Two-halo term. In linear-only mode with plain mass weighting on both
    /// sides this is the linear power spectrum itself.
    pub fn get_ps_2h(
        &self,
        z: f64,
        k: &[f64],
        side1: &Tracer<'_>,
        side2: &Tracer<'_>,
    ) -> HaloResult<Vec<f64>> {
        let z_index = self.redshift_index(z)?;
        let linear = self.linear_power(z_index, k)?;
        if self.linear_only && side1.is_mass_weighted() && side2.is_mass_weighted() {
            return Ok(linear);
        }

        let integrator = HaloIntegrator::new(self.halos);
        k.iter()
            .zip(linear)
            .map(|(wavenumber, power)| {
                let (first, second) =
                    integrator.integrate(*wavenumber, z_index, side1, side2, HaloTerm::TwoHalo)?;
                let second = second.ok_or_else(|| {
                    HaloError::internal("RUN.TWO_HALO", "two-halo integral returned one side")
                })?;
                Ok(first * second * power)
            })
            .collect()
    }

    /// Shot noise; the same value at every `k`.
    pub fn get_ps_shot(
        &self,
        z: f64,
        k: &[f64],
        luminosity1: Option<&[f64]>,
        luminosity2: Option<&[f64]>,
        occupation: Occupation<'_>,
    ) -> HaloResult<Vec<f64>> {
        let z_index = self.redshift_index(z)?;
        let value = HaloIntegrator::new(self.halos).shot_noise(
            z_index,
            luminosity1,
            luminosity2,
            occupation,
        )?;
        Ok(vec![value; k.len()])
    }

    /// One-halo plus two-halo power. Linear-only mode drops the one-halo term.
    pub fn get_ps_mm(
        &self,
        z: f64,
        k: &[f64],
        side1: &Tracer<'_>,
        side2: &Tracer<'_>,
    ) -> HaloResult<Vec<f64>> {
        let two_halo = self.get_ps_2h(z, k, side1, side2)?;
        if self.linear_only {
            return Ok(two_halo);
        }

        let one_halo = self.get_ps_1h(z, k, side1, side2)?;
        Ok(one_halo
            .into_iter()
            .zip(two_halo)
            .map(|(one, two)| one + two)
            .collect())
    }

    /// Matter correlation function. Without `r` the transform's native grid
    /// is returned. A loaded table row is preferred when table loading is
    /// enabled.
    pub fn get_cf_mm(&self, z: f64, r: Option<&[f64]>) -> HaloResult<(Vec<f64>, Vec<f64>)> {
        if self.load_table {
            if let Some(table) = &self.table {
                return self.tabulated_correlation(table, z, r);
            }
        }

        let k = if self.linear_only {
            self.halos.tab_k_lin().to_vec()
        } else {
            self.tab_k.clone()
        };
        let matter = self.matter();
        let ps = self.get_ps_mm(z, &k, &matter, &matter)?;

        match r {
            Some(radii) => Ok((radii.to_vec(), self.transform.get_cf_at(&k, &ps, radii)?)),
            None => self.transform.get_cf(&k, &ps),
        }
    }

    /// Inverse transform `xi(R) -> P(k)` on the native grid `k = 1 / R`.
    pub fn get_ps_from_cf(&self, r: &[f64], cf: &[f64]) -> HaloResult<(Vec<f64>, Vec<f64>)> {
        self.transform.get_ps_from_cf(r, cf)
    }

    fn linear_power(&self, z_index: usize, k: &[f64]) -> HaloResult<Vec<f64>> {
        let tab_k_lin = self.halos.tab_k_lin();
        let row = matrix_row(self.halos.tab_ps_lin(), z_index);
        k.iter()
            .map(|wavenumber| {
                interpolate_log_log(*wavenumber, tab_k_lin, &row).ok_or_else(|| {
                    HaloError::computation(
                        "NUMERIC.LINEAR_POWER",
                        format!("cannot interpolate the linear power spectrum at k={}", wavenumber),
                    )
                })
            })
            .collect()
    }

    fn tabulated_correlation(
        &self,
        table: &PsTable,
        z: f64,
        r: Option<&[f64]>,
    ) -> HaloResult<(Vec<f64>, Vec<f64>)> {
        let z_index = nearest_within(z, &table.tab_z, self.ztol)?;
        let row = table.cf_row(z_index);

        let radii = match r {
            Some(radii) if !same_grid(radii, &table.tab_r) => radii,
            _ => return Ok((table.tab_r.clone(), row)),
        };

        let values = radii
            .iter()
            .map(|radius| {
                interpolate_linear(*radius, &table.tab_r, &row).ok_or_else(|| {
                    HaloError::computation(
                        "NUMERIC.TABLE_CF",
                        format!("cannot interpolate the tabulated correlation at R={}", radius),
                    )
                })
            })
            .collect::<HaloResult<Vec<f64>>>()?;
        Ok((radii.to_vec(), values))
    }
}

fn nearest_within(z: f64, tab_z: &[f64], ztol: f64) -> HaloResult<usize> {
    let out_of_range = || {
        HaloError::out_of_range(
            "RANGE.REDSHIFT",
            format!("redshift {} is not within {} of a tabulated redshift", z, ztol),
        )
    };
    let index = nearest_index(z, tab_z).ok_or_else(out_of_range)?;
    if (tab_z[index] - z).abs() > ztol {
        return Err(out_of_range());
    }
    Ok(index)
}

fn same_grid(lhs: &[f64], rhs: &[f64]) -> bool {
    lhs.len() == rhs.len()
        && lhs.iter().zip(rhs).all(|(left, right)| {
            (left - right).abs() <= SCALE_MATCH_TOLERANCE * left.abs().max(right.abs())
        })
}
