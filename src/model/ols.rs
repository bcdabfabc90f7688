//! Ridge-regularized least squares.
//!
//! The seasonal model is linear in its coefficients, so fitting it is one
//! problem of the form
//!
//! ```text
//! minimize ||y - Xβ||² + Σ_j λ_j β_j²
//! ```
//!
//! The penalty is folded in by appending one row `sqrt(λ_j) e_j` (target 0)
//! per penalized column, after which the system is an ordinary tall least
//! squares problem solved with SVD.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Least squares with a per-column L2 penalty. `penalties.len()` must equal
/// the column count; zero entries are unpenalized.
pub fn solve_ridge(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    penalties: &[f64],
) -> Option<DVector<f64>> {
    let (n, p) = x.shape();
    if penalties.len() != p || y.len() != n {
        return None;
    }

    let extra: Vec<(usize, f64)> = penalties
        .iter()
        .enumerate()
        .filter(|(_, l)| **l > 0.0)
        .map(|(j, l)| (j, l.sqrt()))
        .collect();

    if extra.is_empty() {
        return solve_least_squares(x, y);
    }

    let mut xa = DMatrix::<f64>::zeros(n + extra.len(), p);
    xa.rows_mut(0, n).copy_from(x);
    for (row, &(j, s)) in extra.iter().enumerate() {
        xa[(n + row, j)] = s;
    }
    let mut ya = DVector::<f64>::zeros(n + extra.len());
    ya.rows_mut(0, n).copy_from(y);

    solve_least_squares(&xa, &ya)
}
