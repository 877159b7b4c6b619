use num_complex::Complex64;
use std::f64::consts::{FRAC_PI_2, PI};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const SICI_MAX_ITER: usize = 200;
const SICI_EPS: f64 = 1.0e-16;
const SICI_FP_MIN: f64 = 1.0e-300;
const SICI_SERIES_CUTOFF: f64 = 2.0;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Sine and cosine integrals `(Si(x), Ci(x))`.
///
/// Power series below `|x| = 2`, modified Lentz continued fraction for the
/// complex exponential integral above. `Ci(0)` is `-inf`; negative arguments
/// return `Si(-x) = -Si(x)` and the real part of `Ci`.
pub fn sine_cosine_integrals(x: f64) -> (f64, f64) {
    let t = x.abs();
    if t == 0.0 {
        return (0.0, f64::NEG_INFINITY);
    }

    let (si, ci) = if t > SICI_SERIES_CUTOFF {
        continued_fraction_sici(t)
    } else {
        series_sici(t)
    };

    if x < 0.0 { (-si, ci) } else { (si, ci) }
}

fn continued_fraction_sici(t: f64) -> (f64, f64) {
    let mut b = Complex64::new(1.0, t);
    let mut c = Complex64::new(1.0 / SICI_FP_MIN, 0.0);
    let mut d = Complex64::new(1.0, 0.0) / b;
    let mut h = d;

    for iteration in 2..=SICI_MAX_ITER {
        let a = -(((iteration - 1) * (iteration - 1)) as f64);
        b += Complex64::new(2.0, 0.0);
        d = Complex64::new(1.0, 0.0) / (d * a + b);
        c = b + Complex64::new(a, 0.0) / c;
        let delta = c * d;
        h *= delta;
        if (delta.re - 1.0).abs() + delta.im.abs() < SICI_EPS {
            break;
        }
    }

    h *= Complex64::new(t.cos(), -t.sin());
    (FRAC_PI_2 + h.im, -h.re)
}

fn series_sici(t: f64) -> (f64, f64) {
    let (sums, sumc) = if t < SICI_FP_MIN.sqrt() {
        (t, 0.0)
    } else {
        let mut sum = 0.0;
        let mut sums = 0.0;
        let mut sumc = 0.0;
        let mut sign = 1.0;
        let mut fact = 1.0;
        let mut odd = true;

        for iteration in 1..=SICI_MAX_ITER {
            let order = iteration as f64;
            fact *= t / order;
            let term = fact / order;
            sum += sign * term;
            let error = term / sum.abs();
            if odd {
                sign = -sign;
                sums = sum;
                sum = sumc;
            } else {
                sumc = sum;
                sum = sums;
            }
            if error < SICI_EPS {
                break;
            }
            odd = !odd;
        }

        (sums, sumc)
    };

    (sums, sumc + t.ln() + EULER_GAMMA)
}

/// Principal-value logarithm of the gamma function for complex arguments
/// (Lanczos, g = 7). The imaginary part is only defined modulo `2 pi`, which
/// cancels in `exp` of differences.
pub fn ln_gamma(z: Complex64) -> Complex64 {
    if z.re < 0.5 {
        let reflected = Complex64::new(PI, 0.0) / (z * PI).sin();
        return reflected.ln() - ln_gamma(Complex64::new(1.0, 0.0) - z);
    }

    let shifted = z - 1.0;
    let mut series = Complex64::new(LANCZOS_COEFFICIENTS[0], 0.0);
    for (index, coefficient) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        series += *coefficient / (shifted + index as f64);
    }

    let t = shifted + LANCZOS_G + 0.5;
    Complex64::new(0.5 * (2.0 * PI).ln(), 0.0) + (shifted + 0.5) * t.ln() - t + series.ln()
}
