// Small dense solvers for symmetric positive definite systems.

use ndarray::{Array1, Array2};

/// Lower triangular Cholesky factor of `a`.
///
/// Returns None when a pivot falls below `pivot_tolerance` times its diagonal
/// entry, i.e. when the matrix is singular or not positive definite.
pub(crate) fn cholesky(a: &Array2<f64>, pivot_tolerance: f64) -> Option<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return None;
    }
    let mut l: Array2<f64> = Array2::zeros((n, n));
    for j in 0..n {
        let mut d = a[[j, j]];
        for k in 0..j {
            d -= l[[j, k]] * l[[j, k]];
        }
        if !d.is_finite() || d <= pivot_tolerance * a[[j, j]].abs() || d <= 0.0 {
            return None;
        }
        let ljj = d.sqrt();
        l[[j, j]] = ljj;
        for i in (j + 1)..n {
            let mut s = a[[i, j]];
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = s / ljj;
        }
    }
    Some(l)
}

/// Solves `L L^T x = b` given the Cholesky factor `L`.
pub(crate) fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    // Forward substitution: L z = b
    let mut z: Array1<f64> = Array1::zeros(n);
    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= l[[i, k]] * z[k];
        }
        z[i] = s / l[[i, i]];
    }
    // Back substitution: L^T x = z
    let mut x: Array1<f64> = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut s = z[i];
        for k in (i + 1)..n {
            s -= l[[k, i]] * x[k];
        }
        x[i] = s / l[[i, i]];
    }
    x
}

/// The inverse of `L L^T`, column by column.
pub(crate) fn cholesky_inverse(l: &Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv: Array2<f64> = Array2::zeros((n, n));
    for j in 0..n {
        let mut e: Array1<f64> = Array1::zeros(n);
        e[j] = 1.0;
        let col = cholesky_solve(l, &e);
        inv.column_mut(j).assign(&col);
    }
    inv
}
