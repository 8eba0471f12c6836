//! Small statistics used by the scaling steps
//! Alejandro Gonzales-Irribarren, 2025

/// Plotting-position parameters of the quantile rule (alphap, betap)
pub const ALPHAP: f64 = 0.4;
pub const BETAP: f64 = 0.4;

/// Median of a slice, averaging the two middle values for even lengths.
/// Returns NaN for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Empirical quantile of already sorted values with plotting positions
/// `(k - alphap) / (n + 1 - alphap - betap)`.
///
/// # Arguments
///
/// * `sorted` - ascending values without NaN
/// * `p` - probability in [0, 1]
///
/// # Returns
///
/// * `f64` - the quantile, NaN for no values
///
/// # Example
///
/// ```rust
/// use epi_scale::stats::mquantile;
///
/// let q = mquantile(&[1.0, 2.0, 3.0, 4.0], 0.0);
/// assert_eq!(q, 1.0);
/// ```
pub fn mquantile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    match n {
        0 => return f64::NAN,
        1 => return sorted[0],
        _ => (),
    }

    let m = ALPHAP + p * (1.0 - ALPHAP - BETAP);
    let aleph = n as f64 * p + m;
    let k = aleph.clamp(1.0, (n - 1) as f64).floor();
    let gamma = (aleph - k).clamp(0.0, 1.0);
    let k = k as usize;

    (1.0 - gamma) * sorted[k - 1] + gamma * sorted[k]
}

/// Double sigmoid around `loc`, with `lq`/`uq` setting the left and right
/// spread. A zero spread leaves that side unscaled.
pub fn dsig(value: f64, lq: f64, loc: f64, uq: f64) -> f64 {
    let alpha_l = loc - lq;
    let alpha_r = uq - loc;

    let mut a = value - loc;
    if a < 0.0 {
        if alpha_l != 0.0 {
            a /= -0.5 * alpha_l;
        }
    } else if alpha_r != 0.0 {
        a /= -0.5 * alpha_r;
    }

    1.0 / (1.0 + a.exp())
}

/// Sample standard deviation (ddof = 1); NaN for fewer than two values
pub fn std_ddof1(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();

    (ss / (n - 1) as f64).sqrt()
}
