//! Natural cubic spline through tabulated samples.

/// `C2` piecewise cubic with zero curvature at both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    curvature: Vec<f64>,
}

impl CubicSpline {
    /// `None` unless the grids match, hold at least two points, and `x` is
    /// strictly increasing.
    pub fn natural(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.len() < 2 || x.len() != y.len() || x.windows(2).any(|pair| pair[1] <= pair[0]) {
            return None;
        }

        Some(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            curvature: natural_curvature(x, y),
        })
    }

    pub fn lower(&self) -> f64 {
        self.x[0]
    }

    pub fn upper(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    /// Value at `point`, clamped to the end samples outside the grid.
    pub fn evaluate(&self, point: f64) -> f64 {
        let last = self.x.len() - 1;
        if point <= self.x[0] {
            return self.y[0];
        }
        if point >= self.x[last] {
            return self.y[last];
        }

        let upper = self.x.partition_point(|knot| *knot <= point).min(last);
        let lower = upper - 1;
        let h = self.x[upper] - self.x[lower];
        let a = (self.x[upper] - point) / h;
        let b = (point - self.x[lower]) / h;
        a * self.y[lower]
            + b * self.y[upper]
            + ((a * a * a - a) * self.curvature[lower] + (b * b * b - b) * self.curvature[upper])
                * h
                * h
                / 6.0
    }

    /// First derivative at the lower end of the grid.
    pub fn slope_at_lower(&self) -> f64 {
        let h = self.x[1] - self.x[0];
        (self.y[1] - self.y[0]) / h - h * (2.0 * self.curvature[0] + self.curvature[1]) / 6.0
    }
}

/// Second derivatives at the knots: a tridiagonal solve with the natural
/// end conditions, by forward elimination and back substitution.
fn natural_curvature(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut curvature = vec![0.0; n];
    if n < 3 {
        return curvature;
    }

    let interior = n - 2;
    let mut diagonal = Vec::with_capacity(interior);
    let mut rhs = Vec::with_capacity(interior);
    for i in 1..n - 1 {
        let left = x[i] - x[i - 1];
        let right = x[i + 1] - x[i];
        diagonal.push(2.0 * (left + right));
        rhs.push(6.0 * ((y[i + 1] - y[i]) / right - (y[i] - y[i - 1]) / left));
    }

    // Row j couples knots j, j+1, j+2; rows j-1 and j share x[j+1] - x[j].
    for j in 1..interior {
        let coupling = x[j + 1] - x[j];
        let factor = coupling / diagonal[j - 1];
        diagonal[j] -= factor * coupling;
        rhs[j] -= factor * rhs[j - 1];
    }

    curvature[interior] = rhs[interior - 1] / diagonal[interior - 1];
    for j in (0..interior - 1).rev() {
        let coupling = x[j + 2] - x[j + 1];
        curvature[j + 1] = (rhs[j] - coupling * curvature[j + 2]) / diagonal[j];
    }
    curvature
}
