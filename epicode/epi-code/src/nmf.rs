//! Projected gradient NMF with sparse components
//! Alejandro Gonzales-Irribarren, 2025
//!
//! Factorizes a non-negative loci x marks matrix `X ≈ W H` by alternating
//! non-negative least squares, each solved with Lin's projected gradient
//! method. Sparseness is enforced on the components (rows of `H`, the
//! codes) through an extra penalty row, while `eta` keeps `W` bounded.
//!
//! Lin, C.-J. Projected gradient methods for non-negative matrix
//! factorization. Neural Computation 19, 2756-2779 (2007).

use anyhow::{bail, Result};
use log::{info, warn};
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use config::{parse_params, InitMethod, ParamValue};

use crate::linalg::{nnls, norm, truncated_svd};

pub const DEFAULT_MAX_ITER: usize = 1000;
pub const DEFAULT_TOL: f64 = 1e-4;
pub const DEFAULT_NLS_MAX_ITER: usize = 2000;
pub const DEFAULT_BETA: f64 = 1.0;
pub const DEFAULT_ETA: f64 = 0.1;

// values below this are zeroed after NNDSVD
const NNDSVD_EPS: f64 = 1e-6;
// sufficient decrease and step shrink of the inner line search
const SIGMA: f64 = 0.01;
const STEP_BETA: f64 = 0.1;
const MAX_INNER_ITER: usize = 20;

/// Tuning knobs of the factorization, settable as `key:value` pairs
#[derive(Debug, Clone, PartialEq)]
pub struct NmfParams {
    pub max_iter: usize,
    pub tol: f64,
    pub nls_max_iter: usize,
    pub beta: f64,
    pub eta: f64,
    pub random_state: Option<u64>,
}

impl Default for NmfParams {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_MAX_ITER,
            tol: DEFAULT_TOL,
            nls_max_iter: DEFAULT_NLS_MAX_ITER,
            beta: DEFAULT_BETA,
            eta: DEFAULT_ETA,
            random_state: None,
        }
    }
}

impl NmfParams {
    /// Builds parameters from a "key:value,key:value" string on top of the
    /// defaults. Unknown keys and values of the wrong type are errors.
    ///
    /// # Example
    ///
    /// ```rust
    /// use epi_code::nmf::NmfParams;
    ///
    /// let params = NmfParams::from_params(Some("max_iter:200,tol:0.001")).unwrap();
    /// assert_eq!(params.max_iter, 200);
    /// assert_eq!(params.tol, 0.001);
    /// ```
    pub fn from_params(params: Option<&str>) -> Result<Self> {
        let mut nmf = Self::default();

        for (key, value) in parse_params(params)? {
            match key.as_str() {
                "max_iter" => nmf.max_iter = as_count(&key, &value)?,
                "nls_max_iter" => nmf.nls_max_iter = as_count(&key, &value)?,
                "tol" => nmf.tol = as_number(&key, &value)?,
                "beta" => nmf.beta = as_number(&key, &value)?,
                "eta" => nmf.eta = as_number(&key, &value)?,
                "random_state" => nmf.random_state = Some(as_count(&key, &value)? as u64),
                _ => bail!(
                    "ERROR: unknown factorization parameter {:?}, expected one of: max_iter, tol, nls_max_iter, beta, eta, random_state",
                    key
                ),
            }
        }

        Ok(nmf)
    }
}

fn as_count(key: &str, value: &ParamValue) -> Result<usize> {
    match value.as_usize() {
        Some(v) => Ok(v),
        None => bail!("ERROR: {} must be a non-negative integer, got {}", key, value),
    }
}

fn as_number(key: &str, value: &ParamValue) -> Result<f64> {
    match value.as_f64() {
        Some(v) if v >= 0.0 => Ok(v),
        _ => bail!("ERROR: {} must be a non-negative number, got {}", key, value),
    }
}

/// A configured factorization of rank `n_components`
#[derive(Debug, Clone)]
pub struct Nmf {
    pub n_components: usize,
    pub init: InitMethod,
    pub params: NmfParams,
}

/// Result of a fit: the codes (components) and fit diagnostics
#[derive(Debug, Clone)]
pub struct NmfModel {
    pub components: Array2<f64>,
    pub n_iter: usize,
    pub reconstruction_err: f64,
    pub comp_sparseness: f64,
    pub data_sparseness: f64,
}

impl Nmf {
    pub fn new(n_components: usize, init: InitMethod, params: NmfParams) -> Self {
        Self {
            n_components,
            init,
            params,
        }
    }

    /// Fits the model and returns it with the fitted `W`
    pub fn fit_transform(&self, x: ArrayView2<f64>) -> Result<(Array2<f64>, NmfModel)> {
        check_input(x, self.n_components)?;

        let (n_samples, n_features) = x.dim();
        let c = self.n_components;
        let p = &self.params;

        let (mut w, mut h) = initialize(x, c, self.init, p.random_state)?;

        let mut grad_w = w.dot(&h.dot(&h.t())) - x.dot(&h.t());
        let mut grad_h = w.t().dot(&w).dot(&h) - w.t().dot(&x);
        let init_grad = (sum_sq(grad_w.view()) + sum_sq(grad_h.view())).sqrt();

        let mut tol_w = p.tol.max(0.001) * init_grad;
        let mut tol_h = tol_w;
        let tol = p.tol * init_grad;

        // W sub-problem: [Xᵀ; 0] ≈ [Hᵀ; sqrt(eta) I] Wᵀ
        let zero_block = Array2::<f64>::zeros((c, n_samples));
        let xt_ext = concatenate(Axis(0), &[x.t(), zero_block.view()])?;
        let eta_block = Array2::<f64>::eye(c) * p.eta.sqrt();
        // H sub-problem: [X; 0] ≈ [W; sqrt(beta) 1] H
        let zero_row = Array2::<f64>::zeros((1, n_features));
        let x_ext = concatenate(Axis(0), &[x.view(), zero_row.view()])?;
        let beta_row = Array2::<f64>::from_elem((1, c), p.beta.sqrt());

        let mut n_iter = 0;
        for it in 1..=p.max_iter {
            n_iter = it;

            let proj = (projected_sum_sq(grad_w.view(), w.view())
                + projected_sum_sq(grad_h.view(), h.view()))
            .sqrt();
            if proj < tol {
                break;
            }

            let ht_ext = concatenate(Axis(0), &[h.t(), eta_block.view()])?;
            let (wt, gwt, iter_w) =
                nls_subproblem(xt_ext.view(), ht_ext.view(), w.t().to_owned(), tol_w, p.nls_max_iter);
            w = wt.reversed_axes();
            grad_w = gwt.reversed_axes();
            if iter_w == 1 {
                tol_w *= 0.1;
            }

            let w_ext = concatenate(Axis(0), &[w.view(), beta_row.view()])?;
            let (hn, gh, iter_h) =
                nls_subproblem(x_ext.view(), w_ext.view(), h, tol_h, p.nls_max_iter);
            h = hn;
            grad_h = gh;
            if iter_h == 1 {
                tol_h *= 0.1;
            }
        }

        if n_iter == p.max_iter {
            warn!("iteration limit ({}) reached during fit", p.max_iter);
        }

        let reconstruction_err = norm((&x - &w.dot(&h)).view());
        let model = NmfModel {
            comp_sparseness: sparseness(h.iter().copied()),
            data_sparseness: sparseness(w.iter().copied()),
            components: h,
            n_iter,
            reconstruction_err,
        };

        info!(
            "fit [{} x {}] with {} codes in {} iterations, error {:.4}, code sparseness {:.4}, weight sparseness {:.4}",
            n_samples,
            n_features,
            c,
            model.n_iter,
            model.reconstruction_err,
            model.comp_sparseness,
            model.data_sparseness
        );

        Ok((w, model))
    }

    pub fn fit(&self, x: ArrayView2<f64>) -> Result<NmfModel> {
        self.fit_transform(x).map(|(_, model)| model)
    }
}

impl NmfModel {
    /// Builds a model around existing codes, e.g. read from an `.epi` file
    pub fn from_components(components: Array2<f64>) -> Self {
        let comp_sparseness = sparseness(components.iter().copied());
        Self {
            components,
            n_iter: 0,
            reconstruction_err: f64::NAN,
            comp_sparseness,
            data_sparseness: f64::NAN,
        }
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Code weights of every row of `x`: row-wise NNLS against the codes
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.components.ncols() {
            bail!(
                "ERROR: {} features in the data, {} in the codes",
                x.ncols(),
                self.components.ncols()
            );
        }

        let ht = self.components.t();
        let rows = (0..x.nrows())
            .into_par_iter()
            .map(|i| nnls(ht, x.row(i)).map(|(w, _)| w))
            .collect::<Result<Vec<Array1<f64>>>>()?;

        let mut w = Array2::<f64>::zeros((x.nrows(), self.n_components()));
        for (i, row) in rows.into_iter().enumerate() {
            w.row_mut(i).assign(&row);
        }

        Ok(w)
    }
}

/// Solves `min ||v - w h||` over `h >= 0` by projected gradient descent,
/// starting from `h`. Returns the solution, its last gradient and the
/// number of outer iterations used.
pub fn nls_subproblem(
    v: ArrayView2<f64>,
    w: ArrayView2<f64>,
    h_init: Array2<f64>,
    tol: f64,
    max_iter: usize,
) -> (Array2<f64>, Array2<f64>, usize) {
    let wtv = w.t().dot(&v);
    let wtw = w.t().dot(&w);

    let mut alpha = 1.0;
    let mut h = h_init;
    let mut grad = wtw.dot(&h) - &wtv;
    let mut n_iter = 0;

    for it in 1..=max_iter {
        n_iter = it;
        grad = wtw.dot(&h) - &wtv;

        if projected_sum_sq(grad.view(), h.view()).sqrt() < tol {
            break;
        }

        let mut hp = h.clone();
        let mut decr_alpha = false;

        for inner in 1..MAX_INNER_ITER {
            let hn = (&h - &(&grad * alpha)).mapv(|v| v.max(0.0));
            let d = &hn - &h;
            let gradd = (&grad * &d).sum();
            let dqd = (&wtw.dot(&d) * &d).sum();
            let suff_decr = (1.0 - SIGMA) * gradd + 0.5 * dqd < 0.0;

            if inner == 1 {
                decr_alpha = !suff_decr;
                hp = h.clone();
            }

            if decr_alpha {
                if suff_decr {
                    h = hn;
                    break;
                }
                alpha *= STEP_BETA;
            } else if !suff_decr || hp == hn {
                h = hp;
                break;
            } else {
                alpha /= STEP_BETA;
                hp = hn;
            }
        }
    }

    if n_iter == max_iter {
        warn!("iteration limit ({}) reached in nls subproblem", max_iter);
    }

    (h, grad, n_iter)
}

/// Starting factors `(W, H)` for a fit.
///
/// NNDSVD builds them from the leading singular triplets, keeping the
/// dominant sign-part of every triplet. `nndsvda` fills the zeros with the
/// mean of `x`, `nndsvdar` with small random values and `random` draws
/// both factors from a scaled half-normal distribution.
///
/// Boutsidis, C. & Gallopoulos, E. SVD based initialization: A head start
/// for nonnegative matrix factorization. Pattern Recognition 41, 1350-1362 (2008).
pub fn initialize(
    x: ArrayView2<f64>,
    c: usize,
    method: InitMethod,
    seed: Option<u64>,
) -> Result<(Array2<f64>, Array2<f64>)> {
    if c < 1 {
        bail!("ERROR: the number of codes must be at least 1");
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::seed_from_u64(rand::random()),
    };

    let (n_samples, n_features) = x.dim();
    let avg = x.mean().unwrap_or(0.0);

    if method == InitMethod::Random {
        let scale = (avg / c as f64).sqrt();
        let w = Array2::from_shape_simple_fn((n_samples, c), || scale * half_normal(&mut rng));
        let h = Array2::from_shape_simple_fn((c, n_features), || scale * half_normal(&mut rng));
        return Ok((w, h));
    }

    let (u, sv, vt) = truncated_svd(x, c)?;
    let mut w = Array2::<f64>::zeros((n_samples, c));
    let mut h = Array2::<f64>::zeros((c, n_features));

    w.column_mut(0).assign(&u.column(0).mapv(|v| sv[0].sqrt() * v.abs()));
    h.row_mut(0).assign(&vt.row(0).mapv(|v| sv[0].sqrt() * v.abs()));

    for j in 1..c {
        let (xc, yr) = (u.column(j), vt.row(j));
        let (xp, yp) = (xc.mapv(|v| v.max(0.0)), yr.mapv(|v| v.max(0.0)));
        let (xn, yn) = (xc.mapv(|v| (-v).max(0.0)), yr.mapv(|v| (-v).max(0.0)));

        let (xp_nrm, yp_nrm) = (vnorm(&xp), vnorm(&yp));
        let (xn_nrm, yn_nrm) = (vnorm(&xn), vnorm(&yn));
        let (mp, mn) = (xp_nrm * yp_nrm, xn_nrm * yn_nrm);

        let (uu, vv, sigma) = if mp > mn {
            (safe_div(xp, xp_nrm), safe_div(yp, yp_nrm), mp)
        } else {
            (safe_div(xn, xn_nrm), safe_div(yn, yn_nrm), mn)
        };

        let lbd = (sv[j] * sigma).sqrt();
        w.column_mut(j).assign(&(uu * lbd));
        h.row_mut(j).assign(&(vv * lbd));
    }

    w.mapv_inplace(|v| if v < NNDSVD_EPS { 0.0 } else { v });
    h.mapv_inplace(|v| if v < NNDSVD_EPS { 0.0 } else { v });

    match method {
        InitMethod::Nndsvda => {
            w.mapv_inplace(|v| if v == 0.0 { avg } else { v });
            h.mapv_inplace(|v| if v == 0.0 { avg } else { v });
        }
        InitMethod::Nndsvdar => {
            w.mapv_inplace(|v| if v == 0.0 { avg * half_normal(&mut rng) / 100.0 } else { v });
            h.mapv_inplace(|v| if v == 0.0 { avg * half_normal(&mut rng) / 100.0 } else { v });
        }
        _ => (),
    }

    Ok((w, h))
}

/// Hoyer sparseness of a set of values: 0 for a flat vector, 1 for a
/// vector with a single non-zero entry.
///
/// Hoyer, P. O. Non-negative matrix factorization with sparseness
/// constraints. Journal of Machine Learning Research 5, 1457-1469 (2004).
pub fn sparseness<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let eps = f64::EPSILON;
    let (mut n, mut l1, mut l2) = (0usize, 0.0, 0.0);

    for v in values {
        n += 1;
        l1 += v.abs();
        l2 += v * v;
    }

    if n < 2 {
        return 0.0;
    }

    let sqrt_n = (n as f64).sqrt();
    (sqrt_n - (l1 + eps) / (l2.sqrt() + eps)) / (sqrt_n - 1.0)
}

fn check_input(x: ArrayView2<f64>, c: usize) -> Result<()> {
    if c < 1 {
        bail!("ERROR: the number of codes must be at least 1");
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        bail!("ERROR: cannot factorize an empty matrix {:?}", x.dim());
    }
    if x.iter().any(|v| !v.is_finite()) {
        bail!("ERROR: input matrix contains NaN or infinite values");
    }
    if x.iter().any(|v| *v < 0.0) {
        bail!("ERROR: input matrix contains negative values");
    }

    Ok(())
}

fn half_normal<R: Rng>(rng: &mut R) -> f64 {
    // Box-Muller, u1 in (0, 1]
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();

    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()).abs()
}

fn sum_sq(x: ArrayView2<f64>) -> f64 {
    x.iter().map(|v| v * v).sum()
}

/// Squared norm of the gradient entries that can still move: negative
/// gradients anywhere and any gradient where the variable is positive
fn projected_sum_sq(grad: ArrayView2<f64>, x: ArrayView2<f64>) -> f64 {
    grad.iter()
        .zip(x.iter())
        .filter(|(g, v)| **g < 0.0 || **v > 0.0)
        .map(|(g, _)| g * g)
        .sum()
}

fn vnorm(x: &Array1<f64>) -> f64 {
    x.dot(x).sqrt()
}

fn safe_div(x: Array1<f64>, d: f64) -> Array1<f64> {
    if d == 0.0 {
        x
    } else {
        x / d
    }
}
