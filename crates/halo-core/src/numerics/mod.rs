pub mod quadrature;
pub mod special;
pub mod spline;

pub use quadrature::{
    AdaptiveSimpsonInput, QuadratureError, QuadratureOutcome, integrate_adaptive_simpson,
};
pub use special::{ln_gamma, sine_cosine_integrals};
pub use spline::CubicSpline;

use faer::Mat;

/// Row-major `[row][column]` table of reals, e.g. `[z][M]`.
pub type DenseMatrix = Mat<f64>;

pub fn matrix_row(matrix: &DenseMatrix, row: usize) -> Vec<f64> {
    (0..matrix.ncols()).map(|column| matrix[(row, column)]).collect()
}

pub fn set_matrix_row(matrix: &mut DenseMatrix, row: usize, values: &[f64]) {
    for (column, value) in values.iter().enumerate().take(matrix.ncols()) {
        matrix[(row, column)] = *value;
    }
}

/// Builds a matrix from equally sized rows; `None` when rows are ragged.
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> Option<DenseMatrix> {
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != ncols) {
        return None;
    }
    Some(Mat::from_fn(rows.len(), ncols, |row, column| rows[row][column]))
}

/// Flattens a matrix row-major, the layout used by collectives and codecs.
pub fn matrix_to_row_major(matrix: &DenseMatrix) -> Vec<f64> {
    let mut values = Vec::with_capacity(matrix.nrows() * matrix.ncols());
    for row in 0..matrix.nrows() {
        for column in 0..matrix.ncols() {
            values.push(matrix[(row, column)]);
        }
    }
    values
}

pub fn matrix_from_row_major(nrows: usize, ncols: usize, values: &[f64]) -> Option<DenseMatrix> {
    if values.len() != nrows * ncols {
        return None;
    }
    Some(Mat::from_fn(nrows, ncols, |row, column| values[row * ncols + column]))
}

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value);
    }

    sum
}

/// Composite trapezoid rule over a (possibly non-uniform) abscissa.
/// Fewer than two points integrate to zero.
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    let count = y.len().min(x.len());
    if count < 2 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut correction = 0.0;
    for index in 1..count {
        let panel = 0.5 * (x[index] - x[index - 1]) * (y[index] + y[index - 1]);
        kahan_add(&mut sum, &mut correction, panel);
    }

    sum
}

/// Trapezoid rule restricted to the points where `mask` is set. The masked-out
/// points are removed from the domain, so neighbours across a gap are joined.
pub fn trapezoid_masked(y: &[f64], x: &[f64], mask: &[bool]) -> f64 {
    let (kept_y, kept_x): (Vec<f64>, Vec<f64>) = y
        .iter()
        .zip(x)
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|((value, abscissa), _)| (*value, *abscissa))
        .unzip();
    trapezoid(&kept_y, &kept_x)
}

/// Linear interpolation with boundary clamping, matching `numpy.interp`.
pub fn interpolate_linear(x: f64, x_grid: &[f64], y_grid: &[f64]) -> Option<f64> {
    if x_grid.len() < 2 || x_grid.len() != y_grid.len() {
        return None;
    }

    let last = x_grid.len() - 1;
    if x <= x_grid[0] {
        return Some(y_grid[0]);
    }
    if x >= x_grid[last] {
        return Some(y_grid[last]);
    }

    match x_grid.binary_search_by(|knot| knot.total_cmp(&x)) {
        Ok(index) => Some(y_grid[index]),
        Err(upper) => {
            let lower = upper - 1;
            let x0 = x_grid[lower];
            let x1 = x_grid[upper];
            if x1 == x0 {
                return Some(y_grid[upper]);
            }
            let fraction = (x - x0) / (x1 - x0);
            Some(y_grid[lower] + fraction * (y_grid[upper] - y_grid[lower]))
        }
    }
}

/// Interpolates `ln y` linearly in `ln x`. Both grids must be positive.
pub fn interpolate_log_log(x: f64, x_grid: &[f64], y_grid: &[f64]) -> Option<f64> {
    if x <= 0.0 || x_grid.iter().any(|value| *value <= 0.0) {
        return None;
    }
    if y_grid.iter().any(|value| *value <= 0.0) {
        return None;
    }

    let log_x: Vec<f64> = x_grid.iter().map(|value| value.ln()).collect();
    let log_y: Vec<f64> = y_grid.iter().map(|value| value.ln()).collect();
    interpolate_linear(x.ln(), &log_x, &log_y).map(f64::exp)
}

/// Interpolates `y` linearly in `ln x`.
pub fn interpolate_log_linear(x: f64, x_grid: &[f64], y_grid: &[f64]) -> Option<f64> {
    if x <= 0.0 || x_grid.iter().any(|value| *value <= 0.0) {
        return None;
    }

    let log_x: Vec<f64> = x_grid.iter().map(|value| value.ln()).collect();
    interpolate_linear(x.ln(), &log_x, y_grid)
}

/// Index of the grid point closest to `value`; ties resolve to the lower index.
pub fn nearest_index(value: f64, grid: &[f64]) -> Option<usize> {
    grid.iter()
        .enumerate()
        .filter(|(_, point)| point.is_finite())
        .min_by(|(lhs_index, lhs), (rhs_index, rhs)| {
            (*lhs - value)
                .abs()
                .total_cmp(&(*rhs - value).abs())
                .then_with(|| lhs_index.cmp(rhs_index))
        })
        .map(|(index, _)| index)
}
