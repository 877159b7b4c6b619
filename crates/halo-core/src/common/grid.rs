use crate::domain::{HaloError, HaloResult};

const ARANGE_FUZZ: f64 = 1.0e-9;

/// Immutable log-spaced grid, `exp(arange(min, max + step, step))`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogGrid {
    ln_min: f64,
    ln_step: f64,
    values: Vec<f64>,
}

impl LogGrid {
    pub fn from_bounds(ln_min: f64, ln_max: f64, ln_step: f64) -> HaloResult<Self> {
        if !ln_min.is_finite() || !ln_max.is_finite() || ln_max < ln_min {
            return Err(HaloError::configuration(
                "CONFIG.GRID_BOUNDS",
                format!("log grid bounds must be finite and ordered, got [{}, {}]", ln_min, ln_max),
            ));
        }
        if !ln_step.is_finite() || ln_step <= 0.0 {
            return Err(HaloError::configuration(
                "CONFIG.GRID_STEP",
                format!("log grid step must be finite and > 0, got {}", ln_step),
            ));
        }

        let count = ((ln_max - ln_min) / ln_step + ARANGE_FUZZ).floor() as usize + 1;
        let values = (0..count)
            .map(|index| (ln_min + ln_step * index as f64).exp())
            .collect();

        Ok(Self {
            ln_min,
            ln_step,
            values,
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn ln_min(&self) -> f64 {
        self.ln_min
    }

    pub fn ln_step(&self) -> f64 {
        self.ln_step
    }
}
