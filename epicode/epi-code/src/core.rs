use anyhow::{bail, Context, Result};
use log::info;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use rayon::prelude::*;

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use config::{validate, InitMethod, ARR, ARR_EXTENSIONS, EPI, EPI_EXTENSIONS, METHOD};
use epi_pack::{base_path, derive_path, EpiArray};

use crate::nmf::{sparseness, Nmf, NmfModel, NmfParams};

/// Discovers `c` codes in a loci x features array.
///
/// Writes the codes (`H`, codes x marks) to
/// `{stem}_pgnmf-c#{c}-i#{init}-p#{params}.epi` and, with `transform`, the
/// per-locus code weights (`W`, loci x codes) to the matching `.arr`.
pub fn code(
    arr: &Path,
    init: InitMethod,
    c: usize,
    params: Option<&str>,
    transform: bool,
) -> Result<(PathBuf, Option<PathBuf>)> {
    validate(arr, &ARR_EXTENSIONS)?;
    let x = EpiArray::read(arr)?;

    let nmf = Nmf::new(c, init, NmfParams::from_params(params)?);
    let model = nmf
        .fit(x.data.view())
        .with_context(|| format!("ERROR: could not factorize {}", arr.display()))?;

    let tag = code_tag(init, c, params);
    let fn_epi = derive_path(arr, &tag, EPI);
    EpiArray::new(x.names.clone(), model.components.clone())?.write(&fn_epi)?;
    info!("saved: {}", fn_epi.display());

    if !transform {
        return Ok((fn_epi, None));
    }

    let w = model.transform(x.data.view())?;
    let fn_arr = derive_path(arr, &tag, ARR);
    EpiArray::new(code_names(w.ncols()), w)?.write(&fn_arr)?;
    info!("saved: {}", fn_arr.display());

    Ok((fn_epi, Some(fn_arr)))
}

/// Discovers `c` codes in each array separately and pools them.
///
/// All arrays must share their column labels. The stacked codes are
/// written to `{base}_pgnmf-....epi`; the weights of every locus of every
/// array against the pooled codes go to `{base}_pgnmf-....arr`.
pub fn multi_code(
    arrs: &[PathBuf],
    base: &Path,
    init: InitMethod,
    c: usize,
    params: Option<&str>,
) -> Result<(PathBuf, PathBuf)> {
    if arrs.is_empty() {
        bail!("ERROR: at least one array is required");
    }

    let (marks, xs) = read_arrays(arrs)?;
    let nmf_params = NmfParams::from_params(params)?;

    let hs = xs
        .par_iter()
        .zip(arrs.par_iter())
        .map(|(x, arr)| {
            Nmf::new(c, init, nmf_params.clone())
                .fit(x.view())
                .map(|model| model.components)
                .with_context(|| format!("ERROR: could not factorize {}", arr.display()))
        })
        .collect::<Result<Vec<Array2<f64>>>>()?;

    let h = stack(&hs)?;
    let x = stack(&xs)?;
    info!(
        "pooled {} codes from {} arrays over {} loci",
        h.nrows(),
        arrs.len(),
        x.nrows()
    );

    let model = NmfModel::from_components(h);
    let w = model.transform(x.view())?;

    if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }

    let tag = code_tag(init, c, params);
    let fn_epi = base_path(base, &tag, EPI);
    EpiArray::new(marks, model.components)?.write(&fn_epi)?;
    info!("saved: {}", fn_epi.display());

    let fn_arr = base_path(base, &tag, ARR);
    EpiArray::new(code_names(arrs.len() * c), w)?.write(&fn_arr)?;
    info!("saved: {}", fn_arr.display());

    Ok((fn_epi, fn_arr))
}

/// Weights of every locus of `arr` against existing codes from `epi`.
///
/// The output goes to `{outdir}/{base}.arr`, with `base` defaulting to
/// `{arr stem}_{epi stem}`.
pub fn recode(arr: &Path, epi: &Path, outdir: &Path, base: Option<&str>) -> Result<PathBuf> {
    validate(arr, &ARR_EXTENSIONS)?;
    validate(epi, &EPI_EXTENSIONS)?;

    let x = EpiArray::read(arr)?;
    let codes = EpiArray::read(epi)?;

    if x.names != codes.names {
        bail!(
            "ERROR: marks of {} ({}) do not match the codes in {} ({})",
            arr.display(),
            x.names.join(", "),
            epi.display(),
            codes.names.join(", ")
        );
    }

    let model = NmfModel::from_components(codes.data);
    let w = model.transform(x.data.view())?;

    let base = match base {
        Some(base) => base.to_string(),
        None => format!("{}_{}", file_stem(arr), file_stem(epi)),
    };

    create_dir_all(outdir)?;
    let fn_out = outdir.join(format!("{}.{}", base, ARR));
    EpiArray::new(code_names(w.ncols()), w)?.write(&fn_out)?;
    info!("saved: {}", fn_out.display());

    Ok(fn_out)
}

/// Mean Hoyer sparseness of the rows of an array (codes in an `.epi`
/// file, weights in an `.arr` file)
pub fn sparsity(arr: &Path) -> Result<f64> {
    let ext: Vec<&str> = ARR_EXTENSIONS.iter().chain(EPI_EXTENSIONS.iter()).copied().collect();
    validate(arr, &ext)?;

    let x = EpiArray::read(arr)?;
    let value = mean_row_sparseness(x.data.view());
    info!("sparsity of {}: {}", arr.display(), value);

    Ok(value)
}

pub fn mean_row_sparseness(x: ArrayView2<f64>) -> f64 {
    if x.nrows() == 0 {
        return f64::NAN;
    }

    x.rows()
        .into_iter()
        .map(|row| sparseness(row.iter().copied()))
        .sum::<f64>()
        / x.nrows() as f64
}

/// `pgnmf-c#{c}-i#{init}-p#{params}`
pub fn code_tag(init: InitMethod, c: usize, params: Option<&str>) -> String {
    format!("{}-c#{}-i#{}-p#{}", METHOD, c, init, params.unwrap_or(""))
}

/// `c1..cN`
pub fn code_names(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("c{}", i)).collect()
}

fn read_arrays(arrs: &[PathBuf]) -> Result<(Vec<String>, Vec<Array2<f64>>)> {
    let mut marks: Option<Vec<String>> = None;
    let mut xs = Vec::with_capacity(arrs.len());

    for arr in arrs {
        validate(arr, &ARR_EXTENSIONS)?;
        let x = EpiArray::read(arr)?;

        match &marks {
            Some(marks) if *marks != x.names => bail!(
                "ERROR: marks of {} ({}) differ from the first array ({})",
                arr.display(),
                x.names.join(", "),
                marks.join(", ")
            ),
            Some(_) => (),
            None => marks = Some(x.names.clone()),
        }

        xs.push(x.data);
    }

    Ok((marks.unwrap_or_default(), xs))
}

fn stack(parts: &[Array2<f64>]) -> Result<Array2<f64>> {
    let views: Vec<ArrayView2<f64>> = parts.iter().map(|p| p.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn write_levels(dir: &Path, name: &str, scale: f64) -> PathBuf {
        let w = array![
            [1.0, 0.0],
            [0.9, 0.1],
            [0.0, 1.0],
            [0.2, 0.8],
            [0.5, 0.5],
            [1.0, 0.2]
        ];
        let h = array![[1.0, 0.7, 0.0], [0.0, 0.3, 1.0]];
        let path = dir.join(name);

        EpiArray::new(
            vec!["H3K4me3".into(), "H3K27ac".into(), "H3K27me3".into()],
            w.dot(&h) * scale,
        )
        .unwrap()
        .write(&path)
        .unwrap();

        path
    }

    #[test]
    fn test_code_names_and_tag() {
        assert_eq!(code_names(3), vec!["c1", "c2", "c3"]);
        assert_eq!(
            code_tag(InitMethod::Nndsvd, 4, None),
            "pgnmf-c#4-i#nndsvd-p#"
        );
        assert_eq!(
            code_tag(InitMethod::Random, 2, Some("max_iter:10")),
            "pgnmf-c#2-i#random-p#max_iter:10"
        );
    }

    #[test]
    fn test_code_writes_epi_and_arr() {
        let dir = tempfile::tempdir().unwrap();
        let arr = write_levels(dir.path(), "run_lvl_sig95.arr", 1.0);

        let (epi, weights) = code(&arr, InitMethod::Nndsvd, 2, None, true).unwrap();
        assert_eq!(
            epi,
            dir.path().join("run_lvl_sig95_pgnmf-c#2-i#nndsvd-p#.epi")
        );

        let codes = EpiArray::read(&epi).unwrap();
        assert_eq!(codes.names, vec!["H3K4me3", "H3K27ac", "H3K27me3"]);
        assert_eq!(codes.data.dim(), (2, 3));

        let weights = EpiArray::read(weights.unwrap()).unwrap();
        assert_eq!(weights.names, vec!["c1", "c2"]);
        assert_eq!(weights.data.dim(), (6, 2));
        assert!(weights.data.iter().all(|v| *v >= 0.0));

        let (_, none) = code(&arr, InitMethod::Nndsvd, 2, None, false).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_multi_code_pools_codes() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_levels(dir.path(), "0_run_lvl_sig95.arr", 1.0);
        let b = write_levels(dir.path(), "1_run_lvl_sig95.arr", 2.0);
        let base = dir.path().join("out").join("discriminatory");

        let (epi, arr) = multi_code(
            &[a.clone(), b.clone()],
            &base,
            InitMethod::Nndsvd,
            2,
            Some("random_state:1"),
        )
        .unwrap();

        assert_eq!(
            arr,
            dir.path()
                .join("out")
                .join("discriminatory_pgnmf-c#2-i#nndsvd-p#random_state:1.arr")
        );

        let codes = EpiArray::read(&epi).unwrap();
        assert_eq!(codes.data.dim(), (4, 3));

        let weights = EpiArray::read(&arr).unwrap();
        assert_eq!(weights.names, vec!["c1", "c2", "c3", "c4"]);
        assert_eq!(weights.data.nrows(), 12);
    }

    #[test]
    fn test_multi_code_rejects_different_marks() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_levels(dir.path(), "a.arr", 1.0);
        let b = dir.path().join("b.arr");
        std::fs::write(&b, "H3K4me3\tH3K9me3\tH3K27me3\n1\t0\t1\n").unwrap();

        let base = dir.path().join("pooled");
        assert!(multi_code(&[a, b], &base, InitMethod::Nndsvd, 1, None).is_err());
    }

    #[test]
    fn test_recode_against_existing_codes() {
        let dir = tempfile::tempdir().unwrap();
        let arr = write_levels(dir.path(), "run_lvl.arr", 1.0);
        let epi = dir.path().join("codes.epi");
        std::fs::write(
            &epi,
            "H3K4me3\tH3K27ac\tH3K27me3\n1\t0.7\t0\n0\t0.3\t1\n",
        )
        .unwrap();

        let out = recode(&arr, &epi, &dir.path().join("recoded"), None).unwrap();
        assert_eq!(out, dir.path().join("recoded").join("run_lvl_codes.arr"));

        let w = EpiArray::read(&out).unwrap();
        assert!((w.data[[0, 0]] - 1.0).abs() < 1e-9);
        assert!(w.data[[0, 1]].abs() < 1e-9);
        assert!((w.data[[3, 1]] - 0.8).abs() < 1e-9);

        let other = dir.path().join("other.epi");
        std::fs::write(&other, "a\tb\tc\n1\t1\t1\n").unwrap();
        assert!(recode(&arr, &other, dir.path(), Some("x")).is_err());
    }

    #[test]
    fn test_sparsity_of_rows() {
        let dir = tempfile::tempdir().unwrap();
        let epi = dir.path().join("codes.epi");
        std::fs::write(&epi, "a\tb\tc\td\n0\t0\t2\t0\n1\t1\t1\t1\n").unwrap();

        let value = sparsity(&epi).unwrap();
        assert!((value - 0.5).abs() < 1e-9);
    }
}
