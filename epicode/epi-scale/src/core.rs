use anyhow::{bail, Result};
use log::{info, warn};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use std::path::{Path, PathBuf};

use config::{
    replace_last, validate, ColumnScaling, PairScaling, ARR, ARR_EXTENSIONS, A_SUFFIX, B_SUFFIX,
    GAIN_SUFFIX, LOSS_SUFFIX, LVL, SENTINEL,
};
use epi_pack::{derive_path, EpiArray};

use crate::stats::{dsig, median, mquantile, std_ddof1};

/// Scales observed counts of paired samples (A/B column pairs) and writes
/// `{stem}_{method}.arr` next to the input.
pub fn scale_pairs(arr: &Path, method: PairScaling) -> Result<PathBuf> {
    validate(arr, &ARR_EXTENSIONS)?;
    let raw = EpiArray::read(arr)?;

    let scaled = match method {
        PairScaling::Deseq => deseq(&raw.data)?,
    };

    let fn_out = derive_path(arr, &method.to_string(), ARR);
    EpiArray::new(raw.names, scaled)?.write(&fn_out)?;
    info!("saved: {}", fn_out.display());

    Ok(fn_out)
}

/// Turns scaled pair counts into per-region gain and loss levels and writes
/// `{stem}_lvl.arr` next to the input. `x:a` columns become `x:g` (gain),
/// `x:b` columns become `x:l` (loss).
pub fn scale_differential(arr: &Path) -> Result<PathBuf> {
    validate(arr, &ARR_EXTENSIONS)?;
    let scaled = EpiArray::read(arr)?;

    let names = gain_loss_names(&scaled.names);
    let levels = gain_loss(&scaled.data)?;
    info!(
        "{} regions with gain/loss levels for {} marks",
        levels.nrows(),
        levels.ncols() / 2
    );

    let fn_out = derive_path(arr, LVL, ARR);
    EpiArray::new(names, levels)?.write(&fn_out)?;
    info!("saved: {}", fn_out.display());

    Ok(fn_out)
}

/// Scales every column (feature) of an array and writes
/// `{stem}_{method}.arr` next to the input.
pub fn scale_features(arr: &Path, method: ColumnScaling) -> Result<PathBuf> {
    validate(arr, &ARR_EXTENSIONS)?;
    let raw = EpiArray::read(arr)?;

    let scaled = scale_columns(&raw.data, method);

    let fn_out = derive_path(arr, &method.to_string(), ARR);
    EpiArray::new(raw.names, scaled)?.write(&fn_out)?;
    info!("saved: {}", fn_out.display());

    Ok(fn_out)
}

/// DESeq median-of-ratios scaling of column pairs.
///
/// Sentinel cells become NaN. Rows free of sentinels are divided, pair by
/// pair, by size factors estimated on the rows where both counts of the
/// pair are non-zero.
///
/// # Arguments
///
/// * `raw` - bins x (m1:a, m1:b, m2:a, m2:b, ...) counts with sentinel rows
///
/// # Returns
///
/// * `Array2<f64>` - scaled counts of the same shape
pub fn deseq(raw: &Array2<f64>) -> Result<Array2<f64>> {
    if raw.ncols() % 2 != 0 {
        bail!(
            "ERROR: paired counts need an even number of columns, found {}",
            raw.ncols()
        );
    }

    let sentinel = SENTINEL as f64;
    let is_sentinel = |v: &f64| *v == sentinel;
    let sel: Vec<usize> = raw
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| !row.iter().any(is_sentinel))
        .map(|(idx, _)| idx)
        .collect();

    let mut scaled = raw.mapv(|v| if v == sentinel { f64::NAN } else { v });
    let counts = raw.select(Axis(0), &sel);

    let factors = (0..raw.ncols() / 2)
        .into_par_iter()
        .map(|pair| {
            size_factors(counts.slice(s![.., 2 * pair..2 * pair + 2])).map(|sf| (pair, sf))
        })
        .collect::<Result<Vec<_>>>()?;

    for (pair, (sfa, sfb)) in factors {
        info!("pair {}: size factors {:.4} / {:.4}", pair, sfa, sfb);
        for &row in &sel {
            scaled[[row, 2 * pair]] = raw[[row, 2 * pair]] / sfa;
            scaled[[row, 2 * pair + 1]] = raw[[row, 2 * pair + 1]] / sfb;
        }
    }

    Ok(scaled)
}

/// Size factors of a two-column count matrix: exp of the column medians of
/// log counts centered by their row means, over rows without zeros.
fn size_factors(counts: ArrayView2<f64>) -> Result<(f64, f64)> {
    let mut da = Vec::new();
    let mut db = Vec::new();

    for row in counts.axis_iter(Axis(0)) {
        if row.iter().any(|v| *v == 0.0) {
            continue;
        }

        let (la, lb) = (row[0].ln(), row[1].ln());
        let mean = (la + lb) / 2.0;
        da.push(la - mean);
        db.push(lb - mean);
    }

    if da.is_empty() {
        bail!("ERROR: no bin with non-zero counts in both samples, size factors are undefined");
    }

    Ok((median(&da).exp(), median(&db).exp()))
}

/// Gain and loss per region from paired (a, b) columns.
///
/// Rows up to a NaN row form one region. For every pair the per-bin change
/// `b - a` is split into its positive part (gain) and negative part (loss),
/// each summed over the region and divided by the number of rows it spans,
/// closing sentinel included.
pub fn gain_loss(scaled: &Array2<f64>) -> Result<Array2<f64>> {
    if scaled.ncols() % 2 != 0 {
        bail!(
            "ERROR: paired levels need an even number of columns, found {}",
            scaled.ncols()
        );
    }

    let npairs = scaled.ncols() / 2;
    let mut levels: Vec<f64> = Vec::new();
    let mut gl = vec![0.0; 2 * npairs];
    let mut bins = 0usize;
    let mut nregions = 0usize;

    let mut close = |gl: &mut Vec<f64>, bins: &mut usize, sealed: bool| {
        let rows = if sealed { *bins + 1 } else { *bins };
        let denom = rows.max(1) as f64;
        levels.extend(gl.iter().map(|v| v / denom));
        gl.iter_mut().for_each(|v| *v = 0.0);
        *bins = 0;
        nregions += 1;
    };

    for row in scaled.axis_iter(Axis(0)) {
        if row.iter().any(|v| v.is_nan()) {
            close(&mut gl, &mut bins, true);
            continue;
        }

        accumulate(row, &mut gl);
        bins += 1;
    }

    if bins > 0 {
        warn!("last region is not closed by a sentinel row, closing it");
        close(&mut gl, &mut bins, false);
    }

    Ok(Array2::from_shape_vec((nregions, 2 * npairs), levels)?)
}

fn accumulate(row: ArrayView1<f64>, gl: &mut [f64]) {
    for c in 0..gl.len() / 2 {
        let d = row[2 * c + 1] - row[2 * c];
        if d > 0.0 {
            gl[2 * c] += d;
        }
        if d < 0.0 {
            gl[2 * c + 1] -= d;
        }
    }
}

/// `x:a` -> `x:g` and `x:b` -> `x:l`, rewriting only the last suffix
pub fn gain_loss_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|name| {
            let name = replace_last(name, A_SUFFIX, GAIN_SUFFIX);
            replace_last(&name, B_SUFFIX, LOSS_SUFFIX)
        })
        .collect()
}

/// Scales every column independently. NaN cells stay NaN and are left out
/// of the column statistics.
pub fn scale_columns(data: &Array2<f64>, method: ColumnScaling) -> Array2<f64> {
    let columns: Vec<Vec<f64>> = data.columns().into_iter().map(|c| c.to_vec()).collect();
    let columns: Vec<Vec<f64>> = columns
        .par_iter()
        .map(|col| match method.upper_quantile() {
            Some(hi) => sigmoid_column(col, hi),
            None => whiten_column(col),
        })
        .collect();

    let mut scaled = data.clone();
    for (j, col) in columns.into_iter().enumerate() {
        for (i, v) in col.into_iter().enumerate() {
            scaled[[i, j]] = v;
        }
    }

    scaled
}

/// Double sigmoid scaling into [0, 1): the column minimum maps to 0 and
/// the `hi` quantile sets the spread.
pub fn sigmoid_column(col: &[f64], hi: f64) -> Vec<f64> {
    let mut sorted: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let lq = mquantile(&sorted, 0.0);
    let uq = mquantile(&sorted, hi);

    col.iter()
        .map(|&v| {
            if v.is_nan() {
                v
            } else {
                (dsig(v, lq, lq, uq) - 0.5) * 2.0
            }
        })
        .collect()
}

/// Divides a column by its sample standard deviation; a constant column
/// becomes NaN.
pub fn whiten_column(col: &[f64]) -> Vec<f64> {
    let values: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
    let mut dev = std_ddof1(&values);

    if dev == 0.0 {
        dev = f64::NAN;
    }

    col.iter().map(|v| v / dev).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_deseq_identical_columns_keep_counts() {
        let raw = array![[5.0, 5.0], [10.0, 10.0], [-1.0, -1.0], [3.0, 3.0], [-1.0, -1.0]];
        let scaled = deseq(&raw).unwrap();

        assert_eq!(scaled[[0, 0]], 5.0);
        assert_eq!(scaled[[1, 1]], 10.0);
        assert!(scaled[[2, 0]].is_nan());
        assert!(scaled[[4, 1]].is_nan());
        assert_eq!(scaled[[3, 0]], 3.0);
    }

    #[test]
    fn test_deseq_doubled_column_scales_to_equal() {
        let raw = array![
            [4.0, 8.0, 1.0, 1.0],
            [10.0, 20.0, 2.0, 2.0],
            [0.0, 6.0, 5.0, 5.0],
            [-1.0, -1.0, -1.0, -1.0]
        ];
        let scaled = deseq(&raw).unwrap();

        for row in 0..2 {
            assert!((scaled[[row, 0]] - scaled[[row, 1]]).abs() < 1e-9);
        }
        // sqrt(2) both ways: a is scaled up, b down
        assert!((scaled[[0, 0]] - 4.0 * 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(scaled[[2, 0]], 0.0);
        assert_eq!(scaled[[2, 2]], 5.0);
    }

    #[test]
    fn test_deseq_rejects_odd_columns_and_all_zero_pairs() {
        assert!(deseq(&array![[1.0, 2.0, 3.0]]).is_err());
        assert!(deseq(&array![[0.0, 2.0], [3.0, 0.0]]).is_err());
    }

    #[test]
    fn test_gain_loss_divides_by_region_rows() {
        // two pairs, two regions (2 bins and 1 bin, each closed by a sentinel)
        let scaled = array![
            [1.0, 3.0, 4.0, 1.0],
            [2.0, 1.0, 0.0, 0.0],
            [NAN, NAN, NAN, NAN],
            [0.0, 5.0, 2.0, 2.0],
            [NAN, NAN, NAN, NAN]
        ];
        let levels = gain_loss(&scaled).unwrap();

        assert_eq!(levels.dim(), (2, 4));
        assert_eq!(levels.row(0).to_vec(), vec![2.0 / 3.0, 1.0 / 3.0, 0.0, 1.0]);
        assert_eq!(levels.row(1).to_vec(), vec![2.5, 0.0, 0.0, 0.0]);

        let single = gain_loss(&array![[1.0, 3.0], [2.0, 1.0], [NAN, NAN]]).unwrap();
        assert_eq!(single, array![[2.0 / 3.0, 1.0 / 3.0]]);
    }

    #[test]
    fn test_gain_loss_closes_trailing_region_and_empty_regions() {
        let scaled = array![[NAN, NAN], [1.0, 0.0]];
        let levels = gain_loss(&scaled).unwrap();

        assert_eq!(levels, array![[0.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_gain_loss_names() {
        let names = vec![
            "H3K4me3:a".to_string(),
            "H3K4me3:b".to_string(),
            "x:a:b".to_string(),
        ];

        assert_eq!(
            gain_loss_names(&names),
            vec!["H3K4me3:g", "H3K4me3:l", "x:g:l"]
        );
    }

    #[test]
    fn test_sigmoid_column_range() {
        let col = vec![0.5, 1.0, 2.0, NAN, 8.0, 0.5];
        let scaled = sigmoid_column(&col, 0.95);

        assert_eq!(scaled[0], 0.0);
        assert_eq!(scaled[5], 0.0);
        assert!(scaled[3].is_nan());
        for v in scaled.iter().filter(|v| !v.is_nan()) {
            assert!((0.0..1.0).contains(v));
        }
        assert!(scaled[1] < scaled[2] && scaled[2] < scaled[4]);
    }

    #[test]
    fn test_whiten_column() {
        let scaled = whiten_column(&[1.0, 3.0]);
        let dev = 2f64.sqrt();
        assert!((scaled[0] - 1.0 / dev).abs() < 1e-12);
        assert!((scaled[1] - 3.0 / dev).abs() < 1e-12);

        assert!(whiten_column(&[2.0, 2.0, 2.0]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_scale_columns_per_column() {
        let data = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0]];

        let whitened = scale_columns(&data, ColumnScaling::Whiten);
        assert_eq!(whitened.column(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(whitened[[0, 1]].is_nan());

        let sig = scale_columns(&data, ColumnScaling::Sigmoid(95.0));
        assert_eq!(sig[[0, 0]], 0.0);
        assert_eq!(sig[[2, 1]], 0.0);
    }

    #[test]
    fn test_scale_tasks_write_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let cnt = dir.path().join("run_cnt.arr");
        std::fs::write(
            &cnt,
            "m:a\tm:b\n2\t4\n4\t8\n-1\t-1\n1\t2\n-1\t-1\n",
        )
        .unwrap();

        let pairs = scale_pairs(&cnt, PairScaling::Deseq).unwrap();
        assert_eq!(pairs, dir.path().join("run_cnt_deseq.arr"));

        let lvl = scale_differential(&pairs).unwrap();
        assert_eq!(lvl, dir.path().join("run_cnt_deseq_lvl.arr"));

        let levels = EpiArray::read(&lvl).unwrap();
        assert_eq!(levels.names, vec!["m:g", "m:l"]);
        assert_eq!(levels.nrows(), 2);
        // identical after scaling, nothing gained or lost
        assert!(levels.data.iter().all(|v| v.abs() < 1e-9));

        let sig = scale_features(&lvl, ColumnScaling::Sigmoid(95.0)).unwrap();
        assert_eq!(sig, dir.path().join("run_cnt_deseq_lvl_sig95.arr"));
    }
}
