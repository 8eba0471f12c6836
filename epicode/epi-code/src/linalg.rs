//! Dense linear algebra kernels for the factorization
//! Alejandro Gonzales-Irribarren, 2025
//!
//! Everything here works on small matrices (marks x marks, codes x codes),
//! so plain dense algorithms are used: cyclic Jacobi for symmetric
//! eigen-decompositions, Householder QR for least squares and the
//! Lawson-Hanson active set method for non-negative least squares.

use anyhow::{bail, Result};
use log::warn;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOL: f64 = 1e-14;

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// # Returns
///
/// * `(Array1<f64>, Array2<f64>)` - eigenvalues in descending order and
///   the matching eigenvectors as columns
pub fn symmetric_eigen(a: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = a.nrows();
    if n != a.ncols() {
        bail!("ERROR: eigen-decomposition needs a square matrix, got {:?}", a.dim());
    }

    let mut a = a.to_owned();
    let mut v = Array2::<f64>::eye(n);
    let scale = a.iter().map(|x| x * x).sum::<f64>().sqrt();

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| a[[i, j]] * a[[i, j]])
            .sum::<f64>()
            .sqrt();
        if off <= JACOBI_TOL * scale.max(f64::MIN_POSITIVE) {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let values = Array1::from_iter(order.iter().map(|&i| a[[i, i]]));
    let vectors = v.select(Axis(1), &order);

    Ok((values, vectors))
}

/// Leading `k` singular triplets of `x` from the eigen-decomposition of
/// `xᵀx`. Left vectors of (numerically) zero singular values are zero.
///
/// # Returns
///
/// * `(U, S, Vt)` with shapes (n_samples, k), (k,) and (k, n_features)
pub fn truncated_svd(
    x: ArrayView2<f64>,
    k: usize,
) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>)> {
    let (m, n) = x.dim();
    if k > n {
        bail!(
            "ERROR: cannot extract {} singular vectors from a matrix with {} columns",
            k,
            n
        );
    }

    let gram = x.t().dot(&x);
    let (values, vectors) = symmetric_eigen(gram.view())?;

    let sv: Array1<f64> = values.slice(s![..k]).mapv(|v| v.max(0.0).sqrt());
    let vt = vectors.slice(s![.., ..k]).t().to_owned();
    let cutoff = sv.get(0).copied().unwrap_or(0.0) * f64::EPSILON * m.max(n) as f64;

    let mut u = Array2::<f64>::zeros((m, k));
    for j in 0..k {
        if sv[j] <= cutoff || sv[j] == 0.0 {
            continue;
        }
        let col = x.dot(&vt.row(j)) / sv[j];
        u.column_mut(j).assign(&col);
    }

    Ok((u, sv, vt))
}

/// Least squares solution of `a x ≈ b` by Householder QR. Columns that are
/// numerically dependent on earlier ones get a zero coefficient.
pub fn lstsq(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let (m, n) = a.dim();
    let mut r = a.to_owned();
    let mut qtb = b.to_owned();
    let steps = m.min(n);

    for k in 0..steps {
        let col = r.slice(s![k.., k]);
        let norm = col.dot(&col).sqrt();
        if norm == 0.0 {
            continue;
        }

        let alpha = if r[[k, k]] > 0.0 { -norm } else { norm };
        let mut v = r.slice(s![k.., k]).to_owned();
        v[0] -= alpha;
        let vnorm2 = v.dot(&v);
        if vnorm2 == 0.0 {
            continue;
        }

        for j in k..n {
            let proj = 2.0 * v.dot(&r.slice(s![k.., j])) / vnorm2;
            r.slice_mut(s![k.., j]).scaled_add(-proj, &v);
        }
        let proj = 2.0 * v.dot(&qtb.slice(s![k..])) / vnorm2;
        qtb.slice_mut(s![k..]).scaled_add(-proj, &v);
    }

    let rmax = (0..steps).map(|k| r[[k, k]].abs()).fold(0.0, f64::max);
    let tol = rmax * f64::EPSILON * m.max(n) as f64;

    let mut x = Array1::<f64>::zeros(n);
    for k in (0..steps).rev() {
        let rkk = r[[k, k]];
        if rkk.abs() <= tol {
            continue;
        }

        let mut acc = qtb[k];
        for j in (k + 1)..n {
            acc -= r[[k, j]] * x[j];
        }
        x[k] = acc / rkk;
    }

    x
}

/// Non-negative least squares, `argmin ||a x - b||` subject to `x >= 0`,
/// with the Lawson-Hanson active set method.
///
/// # Arguments
///
/// * `a` - (m, n) design matrix
/// * `b` - (m,) target
///
/// # Returns
///
/// * `(Array1<f64>, f64)` - the solution and the residual norm
///
/// # Example
///
/// ```rust
/// use ndarray::array;
/// use epi_code::linalg::nnls;
///
/// let (x, rnorm) = nnls(array![[1.0, 0.0], [0.0, 1.0]].view(), array![2.0, -1.0].view()).unwrap();
/// assert_eq!(x.to_vec(), vec![2.0, 0.0]);
/// assert_eq!(rnorm, 1.0);
/// ```
pub fn nnls(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<(Array1<f64>, f64)> {
    let (m, n) = a.dim();
    if b.len() != m {
        bail!(
            "ERROR: nnls target has {} values for a {} x {} matrix",
            b.len(),
            m,
            n
        );
    }

    let max_iter = 3 * n.max(1);
    let anorm = a.iter().map(|v| v.abs()).fold(0.0, f64::max);
    let tol = 10.0 * f64::EPSILON * anorm * m.max(n) as f64;

    let mut x = Array1::<f64>::zeros(n);
    let mut passive = vec![false; n];
    let mut skip = vec![false; n];
    let mut iter = 0;

    'outer: loop {
        let resid = &b - &a.dot(&x);
        let w = a.t().dot(&resid);

        let candidate = (0..n)
            .filter(|&j| !passive[j] && !skip[j])
            .max_by(|&i, &j| w[i].total_cmp(&w[j]));
        let j = match candidate {
            Some(j) if w[j] > tol => j,
            _ => break,
        };
        passive[j] = true;

        let mut first = true;
        loop {
            iter += 1;
            if iter > max_iter {
                warn!("nnls reached its iteration limit ({})", max_iter);
                break 'outer;
            }

            let idx: Vec<usize> = (0..n).filter(|&i| passive[i]).collect();
            let zp = lstsq(a.select(Axis(1), &idx).view(), b);
            let mut z = Array1::<f64>::zeros(n);
            for (k, &i) in idx.iter().enumerate() {
                z[i] = zp[k];
            }

            if first && z[j] <= 0.0 {
                // the new variable cannot enter, try the next best one
                passive[j] = false;
                skip[j] = true;
                continue 'outer;
            }
            first = false;

            if idx.iter().all(|&i| z[i] > 0.0) {
                x = z;
                skip.iter_mut().for_each(|s| *s = false);
                break;
            }

            let alpha = idx
                .iter()
                .filter(|&&i| z[i] <= 0.0)
                .map(|&i| x[i] / (x[i] - z[i]))
                .fold(f64::INFINITY, f64::min);

            x = &x + &((&z - &x) * alpha);
            for &i in &idx {
                if x[i] <= tol {
                    x[i] = 0.0;
                    passive[i] = false;
                }
            }
        }
    }

    let resid = &b - &a.dot(&x);
    let rnorm = resid.dot(&resid).sqrt();

    Ok((x, rnorm))
}

/// Frobenius norm
pub fn norm(x: ArrayView2<f64>) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}
