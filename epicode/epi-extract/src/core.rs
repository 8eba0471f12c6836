use anyhow::{bail, Result};
use dashmap::DashMap;
use log::info;
use ndarray::Array2;
use rayon::prelude::*;

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use config::{
    get_progress_bar, run_id, shorten_names, validate, validate_index, A_SUFFIX, ARR,
    BAM_EXTENSIONS, BED_EXTENSIONS, B_SUFFIX, CNT, LVL,
};
use epi_pack::{parse_bed, write_counts, EpiArray};

use crate::counter::{absolute_levels, differential_counts, with_bam};

/// Estimates enrichment levels of every mark (BAM file) at every region of
/// a BED6+ file: overlapping reads divided by region length.
///
/// The result is written to `{outdir}/{runid}_lvl.arr`, with one column per
/// BAM file in input order. The run aborts if that file already exists.
pub fn extract_absolute(
    bed: &Path,
    bams: &[PathBuf],
    outdir: &Path,
    runid: Option<&str>,
    shorten: bool,
    threads: usize,
) -> Result<PathBuf> {
    check_inputs(bed, bams)?;
    create_dir_all(outdir)?;

    let runid = resolve_runid(runid, bed, bams);
    info!("runid: {}", runid);

    let regions = parse_bed(bed)?;
    info!("number of query regions: {}", regions.len());

    let fn_out = outdir.join(format!("{}_{}.{}", runid, LVL, ARR));
    if fn_out.exists() {
        bail!("ERROR: {} exists in {}", runid, outdir.display());
    }

    let names = absolute_names(bams, shorten);
    let columns = par_columns(bams, threads, "Counting reads", |bam| {
        with_bam(bam, |counter| absolute_levels(counter, &regions))
    })?;
    let levels = column_stack(&columns, regions.len())?;

    info!("bam number: {}", bams.len());
    info!("bam names: {}", names.join(", "));

    EpiArray::new(names, levels)?.write(&fn_out)?;
    info!("saved: {}", fn_out.display());

    Ok(fn_out)
}

/// Counts reads of paired samples (A and B lists) in `step`-bp bins of every
/// region. Columns are interleaved as `mark:a, mark:b` per pair and a `-1`
/// row closes every region.
///
/// The result is written to `{outdir}/{runid}_cnt.arr` and is the input of
/// the pair scaling step. The run aborts if that file already exists.
#[allow(clippy::too_many_arguments)]
pub fn extract_differential(
    bed: &Path,
    abams: &[PathBuf],
    bbams: &[PathBuf],
    outdir: &Path,
    runid: Option<&str>,
    shorten: bool,
    step: u64,
    threads: usize,
) -> Result<PathBuf> {
    if step == 0 {
        bail!("ERROR: step must be a positive number of base pairs");
    }

    let mut abams = abams.to_vec();
    let mut bbams = bbams.to_vec();
    abams.sort();
    bbams.sort();

    check_inputs(bed, &abams)?;
    check_inputs(bed, &bbams)?;
    create_dir_all(outdir)?;

    let all: Vec<PathBuf> = abams.iter().chain(bbams.iter()).cloned().collect();
    let runid = resolve_runid(runid, bed, &all);
    info!("runid: {}", runid);

    let regions = parse_bed(bed)?;
    info!("number of query regions: {}", regions.len());

    let fn_out = outdir.join(format!("{}_{}.{}", runid, CNT, ARR));
    if fn_out.exists() {
        bail!("ERROR: {} exists in {}", runid, outdir.display());
    }

    let names = differential_names(&abams, &bbams, shorten)?;
    let pairs: Vec<(PathBuf, PathBuf)> = abams.into_iter().zip(bbams).collect();

    let results = par_columns(&pairs, threads, "Counting read pairs", |(abam, bbam)| {
        let label = format!("files: {} - {}", abam.display(), bbam.display());
        with_bam(abam, |acounter| {
            with_bam(bbam, |bcounter| {
                differential_counts(acounter, bcounter, &regions, step, &label)
            })
        })
    })?;

    let nrows = results.first().map(|(a, _)| a.len()).unwrap_or(0);
    let columns: Vec<Vec<i64>> = results
        .into_iter()
        .flat_map(|(a, b)| [a, b])
        .collect();
    let counts = column_stack(&columns, nrows)?;

    info!("bam pair number: {}", pairs.len());
    info!("bam names: {}", names.join(", "));

    write_counts(&fn_out, &names, counts.view())?;
    info!("saved: {}", fn_out.display());

    Ok(fn_out)
}

/// Column names for absolute mode: BAM file stems, optionally shortened
pub fn absolute_names(bams: &[PathBuf], shorten: bool) -> Vec<String> {
    let names = bam_names(bams);

    if shorten {
        shorten_names(&names)
    } else {
        names
    }
}

/// Column names for differential mode. A and B files are matched by the
/// part of their stem before the first underscore.
pub fn differential_names(
    abams: &[PathBuf],
    bbams: &[PathBuf],
    shorten: bool,
) -> Result<Vec<String>> {
    let prefix = |name: String| name.split('_').next().unwrap_or_default().to_string();
    let anames: Vec<String> = bam_names(abams).into_iter().map(prefix).collect();
    let bnames: Vec<String> = bam_names(bbams).into_iter().map(prefix).collect();

    if anames != bnames {
        bail!(
            "ERROR: A and B BAM files do not pair up by name: {:?} vs {:?}",
            anames,
            bnames
        );
    }

    let names = if shorten {
        shorten_names(&anames)
    } else {
        anames
    };

    Ok(names
        .iter()
        .flat_map(|name| [format!("{name}{A_SUFFIX}"), format!("{name}{B_SUFFIX}")])
        .collect())
}

/// BAM file names without directory and final extension
pub fn bam_names(bams: &[PathBuf]) -> Vec<String> {
    bams.iter()
        .map(|bam| {
            bam.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        })
        .collect()
}

/// Runs `f` over every input on a dedicated pool of `threads` workers and
/// returns the results in input order.
pub fn par_columns<I, T, F>(inputs: &[I], threads: usize, msg: &str, f: F) -> Result<Vec<T>>
where
    I: Sync,
    T: Send + Sync,
    F: Fn(&I) -> Result<T> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(config::MIN_THREADS))
        .build()?;

    let pb = get_progress_bar(inputs.len() as u64, msg);
    let acc: DashMap<usize, T> = DashMap::new();

    pool.install(|| {
        inputs
            .par_iter()
            .enumerate()
            .try_for_each(|(idx, input)| -> Result<()> {
                let column = f(input)?;
                acc.insert(idx, column);
                pb.inc(1);
                Ok(())
            })
    })?;
    pb.finish_and_clear();

    (0..inputs.len())
        .map(|idx| match acc.remove(&idx) {
            Some((_, column)) => Ok(column),
            None => bail!("ERROR: missing result for input {}", idx),
        })
        .collect()
}

/// Stacks equally long columns into a rows x columns matrix
pub fn column_stack<T: Clone>(columns: &[Vec<T>], nrows: usize) -> Result<Array2<T>> {
    if let Some(col) = columns.iter().find(|col| col.len() != nrows) {
        bail!(
            "ERROR: column of length {} does not match {} rows",
            col.len(),
            nrows
        );
    }

    Ok(Array2::from_shape_fn((nrows, columns.len()), |(i, j)| {
        columns[j][i].clone()
    }))
}

/// The given run id, or a hash of the inputs when none (or an empty one) is given
pub fn resolve_runid(runid: Option<&str>, bed: &Path, bams: &[PathBuf]) -> String {
    match runid {
        Some(runid) if !runid.is_empty() => runid.to_string(),
        _ => {
            let mut parts = vec![bed.to_path_buf()];
            parts.extend(bams.iter().cloned());
            run_id(&parts)
        }
    }
}

fn check_inputs(bed: &Path, bams: &[PathBuf]) -> Result<()> {
    validate(bed, &BED_EXTENSIONS)?;

    if bams.is_empty() {
        bail!("ERROR: a set of BAM files is required");
    }
    for bam in bams {
        validate(bam, &BAM_EXTENSIONS)?;
        validate_index(bam)?;
    }

    Ok(())
}
