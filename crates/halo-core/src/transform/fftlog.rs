//! Order-zero spherical Hankel transform on a log-uniform grid (FFTLog).
//!
//! Computes `G(y) = C int_0^inf x^2 F(x) j0(x y) dx`. With `q` the power-law
//! bias, `x^(3-q) F(x)` is expanded in log-periodic modes whose transforms
//! are known in closed form through the Mellin transform of `j0`:
//!
//! `int_0^inf t^(s-1) j0(t) dt = 2^(s-2) sqrt(pi) Gamma(s/2) / Gamma((3-s)/2)`.
//!
//! The output grid is `y_k = exp(-ln x_(N-1) + k dlnx)`, so a forward
//! transform followed by the inverse (bias `3 - q`) lands back on `x`.

use crate::domain::HaloError;
use crate::numerics::ln_gamma;
use num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

const UNIFORMITY_TOLERANCE: f64 = 1.0e-6;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FftLogError {
    #[error("FFTLog needs at least 2 samples, got {count}")]
    TooFewPoints { count: usize },
    #[error("FFTLog abscissa and values differ in length ({abscissa} vs {values})")]
    LengthMismatch { abscissa: usize, values: usize },
    #[error("FFTLog abscissa must be finite and > 0, got {value} at index {index}")]
    NonPositiveAbscissa { index: usize, value: f64 },
    #[error("FFTLog abscissa is not log-uniform at index {index}")]
    NonUniformGrid { index: usize },
    #[error("FFTLog input value is not finite at index {index}")]
    NonFiniteValue { index: usize },
    #[error("FFTLog bias must be finite, got {bias}")]
    InvalidBias { bias: f64 },
}

impl From<FftLogError> for HaloError {
    fn from(error: FftLogError) -> Self {
        HaloError::computation("RUN.FFTLOG", error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FftLogOutput {
    pub abscissa: Vec<f64>,
    pub values: Vec<f64>,
}

/// `xi(R) = 1/(2 pi^2) int k^2 P(k) j0(kR) dk`.
pub fn power_to_correlation(k: &[f64], ps: &[f64], bias: f64) -> Result<FftLogOutput, FftLogError> {
    hankel_j0(k, ps, bias, 1.0 / (2.0 * PI * PI))
}

/// `P(k) = 4 pi int R^2 xi(R) j0(kR) dR`, the inverse of [`power_to_correlation`]
/// when called with the same bias.
pub fn correlation_to_power(r: &[f64], cf: &[f64], bias: f64) -> Result<FftLogOutput, FftLogError> {
    hankel_j0(r, cf, 3.0 - bias, 4.0 * PI)
}

pub fn hankel_j0(
    x: &[f64],
    values: &[f64],
    bias: f64,
    prefactor: f64,
) -> Result<FftLogOutput, FftLogError> {
    let n = x.len();
    let dlnx = validate(x, values, bias)?;

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);

    let mut modes: Vec<Complex64> = x
        .iter()
        .zip(values)
        .map(|(abscissa, value)| {
            Complex64::new(prefactor * value * abscissa.powf(3.0 - bias), 0.0)
        })
        .collect();
    fft.process(&mut modes);

    let period = n as f64 * dlnx;
    let log_product = -((n - 1) as f64) * dlnx;
    let nyquist = (n % 2 == 0).then_some(n / 2);

    for (index, mode) in modes.iter_mut().enumerate() {
        let signed = if index > n / 2 || Some(index) == nyquist {
            index as f64 - n as f64
        } else {
            index as f64
        };
        let eta = 2.0 * PI * signed / period;
        let kernel = mellin_j0(Complex64::new(bias, eta));
        let phase = Complex64::new(0.0, -eta * log_product).exp();

        let coefficient = *mode / n as f64;
        *mode = if Some(index) == nyquist {
            // The unpaired mode must stay real; phase is +-1 here.
            let real_kernel = kernel.norm() * kernel.arg().cos().signum();
            coefficient * (real_kernel * phase.re)
        } else {
            coefficient * kernel * phase
        };
    }

    fft.process(&mut modes);

    let ln_y0 = -x[n - 1].ln();
    let abscissa: Vec<f64> = (0..n)
        .map(|index| (ln_y0 + index as f64 * dlnx).exp())
        .collect();
    let values = abscissa
        .iter()
        .zip(&modes)
        .map(|(y, mode)| y.powf(-bias) * mode.re)
        .collect();

    Ok(FftLogOutput { abscissa, values })
}

fn mellin_j0(s: Complex64) -> Complex64 {
    let ln_kernel = (s - 2.0) * std::f64::consts::LN_2 + 0.5 * PI.ln() + ln_gamma(s / 2.0)
        - ln_gamma((3.0 - s) / 2.0);
    ln_kernel.exp()
}

fn validate(x: &[f64], values: &[f64], bias: f64) -> Result<f64, FftLogError> {
    if x.len() != values.len() {
        return Err(FftLogError::LengthMismatch {
            abscissa: x.len(),
            values: values.len(),
        });
    }
    if x.len() < 2 {
        return Err(FftLogError::TooFewPoints { count: x.len() });
    }
    if !bias.is_finite() {
        return Err(FftLogError::InvalidBias { bias });
    }
    for (index, value) in x.iter().enumerate() {
        if !value.is_finite() || *value <= 0.0 {
            return Err(FftLogError::NonPositiveAbscissa {
                index,
                value: *value,
            });
        }
    }
    if let Some(index) = values.iter().position(|value| !value.is_finite()) {
        return Err(FftLogError::NonFiniteValue { index });
    }

    let dlnx = (x[x.len() - 1].ln() - x[0].ln()) / (x.len() - 1) as f64;
    if dlnx <= 0.0 {
        return Err(FftLogError::NonUniformGrid { index: 1 });
    }
    for index in 1..x.len() {
        let step = x[index].ln() - x[index - 1].ln();
        if (step - dlnx).abs() > UNIFORMITY_TOLERANCE * dlnx.max(1.0) {
            return Err(FftLogError::NonUniformGrid { index });
        }
    }

    Ok(dlnx)
}
