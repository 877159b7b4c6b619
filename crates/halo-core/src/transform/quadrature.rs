//! Direct quadrature of `C int x^2 F(x) sinc(x y) dx`, panel by panel.
//!
//! Panels break at a log grid in `x` and at every zero of `sin(x y)` so each
//! adaptive Simpson call sees at most half an oscillation.

use crate::numerics::{
    AdaptiveSimpsonInput, CubicSpline, QuadratureError, integrate_adaptive_simpson,
};
use std::f64::consts::PI;

const LOG_BREAK_STEP: f64 = 0.25;
const MAX_PANELS: usize = 20_000;
/// `x^2 f(x)` of a power law `x^s` stays finite at zero only for `s > -2`.
const MIN_CONTINUATION_SLOPE: f64 = -2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SincQuadrature {
    pub epsrel: f64,
    pub epsabs: f64,
}

impl SincQuadrature {
    /// `prefactor * int_lower^upper x^2 f(x) sinc(x y) dx`.
    pub fn transform<F>(
        &self,
        y: f64,
        lower: f64,
        upper: f64,
        prefactor: f64,
        mut function: F,
    ) -> Result<f64, QuadratureError>
    where
        F: FnMut(f64) -> f64,
    {
        let breaks = breakpoints(lower, upper, y);
        let mut total = 0.0;
        let mut unconverged = 0;

        for panel in breaks.windows(2) {
            let outcome = integrate_adaptive_simpson(
                AdaptiveSimpsonInput::new(panel[0], panel[1], self.epsrel, self.epsabs),
                |x| x * x * function(x) * sinc(x * y),
            )?;
            total += outcome.value;
            unconverged += outcome.unconverged_panels;
        }

        if unconverged > 0 {
            tracing::debug!(y, panels = unconverged, "sinc quadrature reached depth limit");
        }

        Ok(prefactor * total)
    }
}

/// Smooth interpolant of tabulated samples for the sinc quadrature.
///
/// Positive samples are splined in `(ln x, ln f)`, signed ones in
/// `(ln x, f)`. The function is zero above the grid and follows the
/// spline's end tangent below it, which makes positive samples a power law
/// there. A power law too steep for `x^2 f(x)` to vanish at zero is not
/// continued.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedFunction {
    spline: CubicSpline,
    logarithmic: bool,
    lower: f64,
    upper: f64,
    lower_slope: Option<f64>,
}

impl TabulatedFunction {
    /// `None` unless `x` is positive and strictly increasing with one
    /// sample per point.
    pub fn new(x: &[f64], values: &[f64]) -> Option<Self> {
        if x.iter().any(|value| *value <= 0.0) {
            return None;
        }

        let logarithmic = values.iter().all(|value| *value > 0.0);
        let ln_x: Vec<f64> = x.iter().map(|value| value.ln()).collect();
        let ordinate: Vec<f64> = if logarithmic {
            values.iter().map(|value| value.ln()).collect()
        } else {
            values.to_vec()
        };
        let spline = CubicSpline::natural(&ln_x, &ordinate)?;
        let lower_slope = Some(spline.slope_at_lower())
            .filter(|slope| !logarithmic || *slope > MIN_CONTINUATION_SLOPE);

        Some(Self {
            spline,
            logarithmic,
            lower: x[0],
            upper: x[x.len() - 1],
            lower_slope,
        })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Whether the function is continued on `(0, lower)`.
    pub fn continues_below(&self) -> bool {
        self.lower_slope.is_some()
    }

    pub fn evaluate(&self, point: f64) -> f64 {
        if point <= 0.0 || point > self.upper {
            return 0.0;
        }
        let value = if point < self.lower {
            match self.lower_slope {
                Some(slope) => {
                    let start = self.spline.lower();
                    self.spline.evaluate(start) + slope * (point.ln() - start)
                }
                None => return 0.0,
            }
        } else {
            self.spline.evaluate(point.ln())
        };
        if self.logarithmic { value.exp() } else { value }
    }
}

fn sinc(argument: f64) -> f64 {
    if argument.abs() < 1.0e-8 {
        1.0 - argument * argument / 6.0
    } else {
        argument.sin() / argument
    }
}

fn breakpoints(lower: f64, upper: f64, y: f64) -> Vec<f64> {
    let mut breaks = vec![lower, upper];

    if lower > 0.0 && upper > lower {
        let span = (upper / lower).ln();
        let count = (span / LOG_BREAK_STEP).floor() as usize;
        breaks.extend((1..=count.min(MAX_PANELS / 2)).map(|index| {
            lower * (LOG_BREAK_STEP * index as f64).exp()
        }));
    }

    if y > 0.0 {
        let half_period = PI / y;
        let first = (lower / half_period).ceil().max(1.0) as usize;
        let last = (upper / half_period).floor() as usize;
        if last >= first {
            let available = MAX_PANELS.saturating_sub(breaks.len());
            let stride = ((last - first + 1) / available.max(1)).max(1);
            breaks.extend(
                (first..=last)
                    .step_by(stride)
                    .map(|zero| zero as f64 * half_period),
            );
        }
    }

    breaks.retain(|point| *point >= lower && *point <= upper);
    breaks.sort_by(f64::total_cmp);
    breaks.dedup_by(|a, b| (*a - *b).abs() <= 1.0e-14 * b.abs().max(1.0e-300));
    breaks
}

#[cfg(test)]
mod tests {
    use super::{SincQuadrature, TabulatedFunction, breakpoints};
    use std::f64::consts::PI;

    #[test]
    fn gaussian_power_spectrum_matches_closed_form() {
        let solver = SincQuadrature {
            epsrel: 1.0e-10,
            epsabs: 0.0,
        };
        for r in [0.1, 1.0, 4.0] {
            let xi = solver
                .transform(r, 1.0e-6, 12.0, 1.0 / (2.0 * PI * PI), |k| (-k * k).exp())
                .expect("transform");
            let expected = PI.sqrt() / 4.0 * (-r * r / 4.0).exp() / (2.0 * PI * PI);
            assert!(((xi - expected) / expected).abs() < 1.0e-7, "R={r}");
        }
    }

    #[test]
    fn breakpoints_include_sine_zeros_and_stay_sorted() {
        let breaks = breakpoints(0.5, 10.0, PI);
        assert_eq!(breaks.first(), Some(&0.5));
        assert_eq!(breaks.last(), Some(&10.0));
        assert!(breaks.windows(2).all(|pair| pair[1] > pair[0]));
        for zero in 1..=10 {
            assert!(breaks.iter().any(|point| (point - zero as f64).abs() < 1.0e-12));
        }
    }

    #[test]
    fn power_law_samples_are_reproduced_and_continued_below() {
        let x = [1.0, 10.0, 100.0];
        let function = TabulatedFunction::new(&x, &[2.0, 20.0, 200.0]).expect("function");
        assert!(function.continues_below());
        assert!((function.evaluate(3.162_277_660_168_379_5) - 6.324_555_320_336_759).abs() < 1.0e-12);
        assert!((function.evaluate(0.1) - 0.2).abs() < 1.0e-12);
        assert!((function.evaluate(100.0) - 200.0).abs() < 1.0e-10);
        assert_eq!(function.evaluate(1000.0), 0.0);
        assert_eq!(function.evaluate(0.0), 0.0);

        let steep = TabulatedFunction::new(&x, &[1.0, 1.0e-3, 1.0e-6]).expect("function");
        assert!(!steep.continues_below());
        assert_eq!(steep.evaluate(0.5), 0.0);
    }

    #[test]
    fn signed_samples_are_splined_and_continued_along_the_end_tangent() {
        let x = [1.0, 10.0, 100.0];
        let function = TabulatedFunction::new(&x, &[1.0, -1.0, 1.0]).expect("function");
        assert!((function.evaluate(3.162_277_660_168_379_5) + 0.375).abs() < 1.0e-12);
        assert!(function.continues_below());
        assert!((function.evaluate(0.1) - 4.0).abs() < 1.0e-12);
        assert!(TabulatedFunction::new(&[0.0, 1.0], &[1.0, 1.0]).is_none());
    }
}
