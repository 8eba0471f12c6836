//! epicode: discover epigenetic codes from ChIP-seq data
//! Alejandro Gonzales-Irribarren, 2025
//!
//! Entry point library chaining the single tools into the three modes:
//! absolute (marks present together), differential (marks gained or lost
//! together between two conditions) and discriminatory (marks telling sets
//! of loci apart). Every mode leaves a `{runid}_run.json` descriptor with
//! its parameters and outputs in the output directory.

pub mod cli;

use anyhow::{bail, Result};
use log::info;

use std::path::{Path, PathBuf};

use config::{run_id, ArgCheck, DISCRIMINATORY_RUNID};
use epi_code::{code, lib_epi_code, multi_code};
use epi_extract::{core::resolve_runid, extract_absolute, extract_differential, lib_epi_extract};
use epi_pack::RunDescriptor;
use epi_scale::{lib_epi_scale, scale_differential, scale_features, scale_pairs};

use crate::cli::{AbsoluteArgs, CodeOpts, Commands, DifferentialArgs, DiscriminatoryArgs};

/// Runs a mode or a single task, returning the files it produced
pub fn run(command: Commands) -> Result<Vec<PathBuf>> {
    match command {
        Commands::Absolute(args) => absolute(&args).map(|d| vec![d]),
        Commands::Differential(args) => differential(&args).map(|d| vec![d]),
        Commands::Discriminatory(args) => discriminatory(&args).map(|d| vec![d]),
        Commands::ExtractAbsolute(task) => {
            lib_epi_extract(task_args("absolute", task.args)).map(|p| vec![p])
        }
        Commands::ExtractDifferential(task) => {
            lib_epi_extract(task_args("differential", task.args)).map(|p| vec![p])
        }
        Commands::ScalePairs(task) => {
            lib_epi_scale(task_args("pairs", task.args)).map(|p| vec![p])
        }
        Commands::ScaleDifferential(task) => {
            lib_epi_scale(task_args("differential", task.args)).map(|p| vec![p])
        }
        Commands::ScaleFeatures(task) => {
            lib_epi_scale(task_args("features", task.args)).map(|p| vec![p])
        }
        Commands::Code(task) => lib_epi_code(task_args("code", task.args)),
        Commands::MultiCode(task) => lib_epi_code(task_args("multi", task.args)),
        Commands::Recode(task) => lib_epi_code(task_args("recode", task.args)),
        Commands::Sparsity(task) => lib_epi_code(task_args("sparsity", task.args)),
    }
}

/// Absolute mode: extract levels, scale columns and find codes.
///
/// # Arguments
///
/// * `args` - absolute mode arguments, checked before running
///
/// # Returns
///
/// Path to the run descriptor
///
/// # Example
///
/// ```rust, no_run
/// use clap::Parser;
/// use epicode::{absolute, cli::{Cli, Commands}};
///
/// let cli = Cli::parse_from(["epicode", "absolute", "-b", "tss.bed", "-a", "k4.bam", "-c", "3"]);
/// if let Commands::Absolute(args) = cli.command {
///     absolute(&args).unwrap();
/// }
/// ```
pub fn absolute(args: &AbsoluteArgs) -> Result<PathBuf> {
    args.check()?;
    let opts = &args.opts;

    let runid = resolve_runid(opts.runid.as_deref(), &args.bed, &args.bams);
    info!("running absolute mode as {}", runid);

    let lvl = extract_absolute(
        &args.bed,
        &args.bams,
        &args.outdir,
        Some(&runid),
        opts.shorten,
        opts.threads,
    )?;
    let outputs = scale_and_code(&lvl, opts)?;

    let mut descriptor = describe("absolute", &runid, opts)
        .param("bed", args.bed.display())
        .param("bams", join_paths(&args.bams));
    descriptor.output(&lvl);
    outputs.iter().for_each(|out| descriptor.output(out));

    descriptor.write(&args.outdir)
}

/// Differential mode: extract binned paired counts, normalize pairs,
/// summarize gains and losses per region, scale columns and find codes.
pub fn differential(args: &DifferentialArgs) -> Result<PathBuf> {
    args.check()?;
    let opts = &args.opts;

    let mut all: Vec<PathBuf> = args.abams.clone();
    all.sort();
    let mut bbams = args.bbams.clone();
    bbams.sort();
    all.extend(bbams);

    let runid = resolve_runid(opts.runid.as_deref(), &args.bed, &all);
    info!("running differential mode as {}", runid);

    let cnt = extract_differential(
        &args.bed,
        &args.abams,
        &args.bbams,
        &args.outdir,
        Some(&runid),
        opts.shorten,
        args.step,
        opts.threads,
    )?;
    let pairs = scale_pairs(&cnt, args.pairsca)?;
    let lvl = scale_differential(&pairs)?;
    let outputs = scale_and_code(&lvl, opts)?;

    let mut descriptor = describe("differential", &runid, opts)
        .param("bed", args.bed.display())
        .param("abams", join_paths(&args.abams))
        .param("bbams", join_paths(&args.bbams))
        .param("step", args.step)
        .param("pairsca", args.pairsca);
    for out in [&cnt, &pairs, &lvl].into_iter().chain(outputs.iter()) {
        descriptor.output(out);
    }

    descriptor.write(&args.outdir)
}

/// Discriminatory mode: extract and scale levels of every BED file, then
/// pool the codes found in each of them.
///
/// Single arrays are named `{i}_{runid}`; the pooled codes and weights use
/// `{outdir}/{runid}` as base, `discriminatory` when no run id is given.
pub fn discriminatory(args: &DiscriminatoryArgs) -> Result<PathBuf> {
    args.check()?;
    let opts = &args.opts;

    let (runid, base) = match opts.runid.as_deref().filter(|r| !r.is_empty()) {
        Some(runid) => (runid.to_string(), runid.to_string()),
        None => {
            let parts: Vec<&Path> = args.get_beds().into_iter().chain(args.get_bams()).collect();
            (run_id(&parts), DISCRIMINATORY_RUNID.to_string())
        }
    };
    info!("running discriminatory mode as {}", runid);

    let mut descriptor = describe("discriminatory", &base, opts)
        .param("beds", join_paths(&args.beds))
        .param("bams", join_paths(&args.bams));

    let mut scaled = Vec::with_capacity(args.beds.len());
    for (idx, bed) in args.beds.iter().enumerate() {
        let lvl = extract_absolute(
            bed,
            &args.bams,
            &args.outdir,
            Some(&format!("{}_{}", idx, runid)),
            opts.shorten,
            opts.threads,
        )?;
        let sca = scale_features(&lvl, opts.colsca)?;

        descriptor.output(&lvl);
        descriptor.output(&sca);
        scaled.push(sca);
    }

    let (epi, arr) = multi_code(
        &scaled,
        &args.outdir.join(&base),
        opts.init,
        opts.c,
        opts.params.as_deref(),
    )?;
    descriptor.output(&epi);
    descriptor.output(&arr);

    descriptor.write(&args.outdir)
}

/// Scales the columns of a levels array and codes it, returning the scaled
/// array, the codes and the code weights in that order
pub fn scale_and_code(lvl: &Path, opts: &CodeOpts) -> Result<Vec<PathBuf>> {
    let sca = scale_features(lvl, opts.colsca)?;
    let (epi, arr) = code(&sca, opts.init, opts.c, opts.params.as_deref(), true)?;

    match arr {
        Some(arr) => Ok(vec![sca, epi, arr]),
        None => bail!("ERROR: no code weights were written for {}", sca.display()),
    }
}

fn describe(mode: &str, runid: &str, opts: &CodeOpts) -> RunDescriptor {
    RunDescriptor::new(mode, runid)
        .param("c", opts.c)
        .param("colsca", opts.colsca)
        .param("init", opts.init)
        .param("params", opts.params.as_deref().unwrap_or_default())
        .param("shorten", opts.shorten)
        .param("threads", opts.threads)
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Prepends the subtool name to raw task arguments
pub fn task_args(subtool: &str, args: Vec<String>) -> Vec<String> {
    std::iter::once(subtool.to_string()).chain(args).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use epi_pack::EpiArray;
    use ndarray::array;

    fn opts(c: usize) -> CodeOpts {
        let c = c.to_string();
        let cli = Cli::try_parse_from([
            "epicode",
            "absolute",
            "-b",
            "x.bed",
            "-a",
            "x.bam",
            "-c",
            c.as_str(),
            "-r",
            "test",
            "-p",
            "max_iter:200,random_state:7",
        ])
        .unwrap();

        match cli.command {
            Commands::Absolute(args) => args.opts,
            _ => panic!("expected absolute"),
        }
    }

    #[test]
    fn test_task_args_prepend_subtool() {
        let args = task_args("features", vec!["--arr".into(), "x.arr".into()]);
        assert_eq!(args, vec!["features", "--arr", "x.arr"]);
    }

    #[test]
    fn test_scale_and_code_chain() {
        let dir = tempfile::tempdir().unwrap();
        let lvl = dir.path().join("test_lvl.arr");

        let data = array![
            [0.10, 0.00, 0.50],
            [0.20, 0.05, 0.40],
            [0.90, 0.80, 0.00],
            [0.80, 0.90, 0.10],
            [0.00, 0.10, 0.70],
            [0.50, 0.40, 0.30],
        ];
        let names = vec!["H3K4me3".to_string(), "H3K27ac".to_string(), "H3K27me3".to_string()];
        EpiArray::new(names.clone(), data).unwrap().write(&lvl).unwrap();

        let outputs = scale_and_code(&lvl, &opts(2)).unwrap();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.iter().all(|p| p.exists()));
        assert_eq!(outputs[0], dir.path().join("test_lvl_sig95.arr"));

        let epi = EpiArray::read(&outputs[1]).unwrap();
        assert_eq!(epi.names, names);
        assert_eq!(epi.nrows(), 2);
        assert!(epi.data.iter().all(|v| *v >= 0.0));

        let w = EpiArray::read(&outputs[2]).unwrap();
        assert_eq!(w.names, vec!["c1", "c2"]);
        assert_eq!(w.nrows(), 6);
    }

    #[test]
    fn test_descriptor_records_options() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = describe("absolute", "test", &opts(3)).param("bed", "x.bed");
        descriptor.output("test_lvl.arr");

        let path = descriptor.write(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("test_run.json"));

        let written: RunDescriptor =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.params["c"], "3");
        assert_eq!(written.params["colsca"], "sig95");
        assert_eq!(written.params["init"], "nndsvd");
        assert_eq!(written.params["params"], "max_iter:200,random_state:7");
        assert_eq!(written.outputs, vec![PathBuf::from("test_lvl.arr")]);
    }

    #[test]
    fn test_modes_reject_missing_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "epicode",
            "discriminatory",
            "-b",
            "a.bed,b.bed",
            "-a",
            "x.bam",
            "-c",
            "2",
            "-o",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();

        match cli.command {
            Commands::Discriminatory(args) => {
                assert_eq!(args.beds.len(), 2);
                assert!(discriminatory(&args).is_err());
            }
            _ => panic!("expected discriminatory"),
        }
    }
}
