use crate::domain::HaloError;

const DEFAULT_MAX_DEPTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveSimpsonInput {
    pub lower: f64,
    pub upper: f64,
    pub epsrel: f64,
    pub epsabs: f64,
    pub max_depth: usize,
}

impl AdaptiveSimpsonInput {
    pub fn new(lower: f64, upper: f64, epsrel: f64, epsabs: f64) -> Self {
        Self {
            lower,
            upper,
            epsrel,
            epsabs,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuadratureError {
    #[error("quadrature bound '{field}' must be finite, got {value}")]
    NonFiniteBound { field: &'static str, value: f64 },
    #[error("quadrature tolerances must be finite and >= 0, got epsrel={epsrel}, epsabs={epsabs}")]
    InvalidTolerance { epsrel: f64, epsabs: f64 },
    #[error("quadrature integrand is not finite at x={x}, got {value}")]
    NonFiniteIntegrand { x: f64, value: f64 },
}

impl From<QuadratureError> for HaloError {
    fn from(error: QuadratureError) -> Self {
        HaloError::computation("RUN.QUADRATURE", error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureOutcome {
    pub value: f64,
    /// Sub-intervals accepted at the depth limit without meeting tolerance.
    pub unconverged_panels: usize,
}

/// Adaptive Simpson quadrature of `integrand` over `[lower, upper]`.
///
/// A panel is accepted once `|S2 - S1| <= 15 max(epsabs, epsrel |S2|)`, with
/// the absolute budget halved at each split. Panels that hit `max_depth` are
/// accepted with Richardson extrapolation and counted in the outcome.
pub fn integrate_adaptive_simpson<F>(
    input: AdaptiveSimpsonInput,
    mut integrand: F,
) -> Result<QuadratureOutcome, QuadratureError>
where
    F: FnMut(f64) -> f64,
{
    validate_input(input)?;

    if input.lower == input.upper {
        return Ok(QuadratureOutcome {
            value: 0.0,
            unconverged_panels: 0,
        });
    }

    let mut evaluate = |x: f64| -> Result<f64, QuadratureError> {
        let value = integrand(x);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(QuadratureError::NonFiniteIntegrand { x, value })
        }
    };

    let a = input.lower;
    let b = input.upper;
    let m = 0.5 * (a + b);
    let fa = evaluate(a)?;
    let fm = evaluate(m)?;
    let fb = evaluate(b)?;
    let whole = simpson(a, b, fa, fm, fb);

    let mut unconverged_panels = 0;
    let value = refine(
        &mut evaluate,
        Panel {
            a,
            b,
            fa,
            fm,
            fb,
            whole,
        },
        input.epsabs,
        input.epsrel,
        input.max_depth,
        &mut unconverged_panels,
    )?;

    Ok(QuadratureOutcome {
        value,
        unconverged_panels,
    })
}

#[derive(Debug, Clone, Copy)]
struct Panel {
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
}

fn refine<E>(
    evaluate: &mut E,
    panel: Panel,
    epsabs: f64,
    epsrel: f64,
    depth: usize,
    unconverged_panels: &mut usize,
) -> Result<f64, QuadratureError>
where
    E: FnMut(f64) -> Result<f64, QuadratureError>,
{
    let m = 0.5 * (panel.a + panel.b);
    let left_mid = 0.5 * (panel.a + m);
    let right_mid = 0.5 * (m + panel.b);
    let f_left_mid = evaluate(left_mid)?;
    let f_right_mid = evaluate(right_mid)?;
    let left = simpson(panel.a, m, panel.fa, f_left_mid, panel.fm);
    let right = simpson(m, panel.b, panel.fm, f_right_mid, panel.fb);
    let refined = left + right;
    let delta = refined - panel.whole;

    if delta.abs() <= 15.0 * epsabs.max(epsrel * refined.abs()) {
        return Ok(refined + delta / 15.0);
    }
    if depth == 0 || m == panel.a || m == panel.b {
        *unconverged_panels += 1;
        return Ok(refined + delta / 15.0);
    }

    let left_value = refine(
        evaluate,
        Panel {
            a: panel.a,
            b: m,
            fa: panel.fa,
            fm: f_left_mid,
            fb: panel.fm,
            whole: left,
        },
        0.5 * epsabs,
        epsrel,
        depth - 1,
        unconverged_panels,
    )?;
    let right_value = refine(
        evaluate,
        Panel {
            a: m,
            b: panel.b,
            fa: panel.fm,
            fm: f_right_mid,
            fb: panel.fb,
            whole: right,
        },
        0.5 * epsabs,
        epsrel,
        depth - 1,
        unconverged_panels,
    )?;

    Ok(left_value + right_value)
}

fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fm + fb)
}

fn validate_input(input: AdaptiveSimpsonInput) -> Result<(), QuadratureError> {
    if !input.lower.is_finite() {
        return Err(QuadratureError::NonFiniteBound {
            field: "lower",
            value: input.lower,
        });
    }
    if !input.upper.is_finite() {
        return Err(QuadratureError::NonFiniteBound {
            field: "upper",
            value: input.upper,
        });
    }
    if !input.epsrel.is_finite()
        || !input.epsabs.is_finite()
        || input.epsrel < 0.0
        || input.epsabs < 0.0
    {
        return Err(QuadratureError::InvalidTolerance {
            epsrel: input.epsrel,
            epsabs: input.epsabs,
        });
    }

    Ok(())
}
