//! Read count extraction for epigenomic marks
//! Alejandro Gonzales-Irribarren, 2025
//!
//! This module turns a set of indexed BAM files and a BED6+ file of
//! reference regions into the count matrices consumed by the scaling
//! and coding steps.
//!
//! Two subtools are provided. `absolute` estimates the enrichment level
//! of every mark at every region (reads per base pair). `differential`
//! counts reads of paired A/B samples in fixed-size bins, closing each
//! region with a sentinel row. Every BAM file (or pair) is processed
//! by its own worker.

pub mod cli;
pub mod core;
pub mod counter;

pub use crate::core::{extract_absolute, extract_differential};

use anyhow::Result;
use config::ArgCheck;

use std::path::PathBuf;

use crate::cli::{Args, SubArgs};

/// Checks the arguments of a subtool and runs it, returning the output array
pub fn run(command: SubArgs) -> Result<PathBuf> {
    match command {
        SubArgs::Absolute { args } => {
            args.check()?;
            extract_absolute(
                &args.bed,
                &args.bams,
                &args.outdir,
                args.runid.as_deref(),
                args.shorten,
                args.threads,
            )
        }
        SubArgs::Differential { args } => {
            args.check()?;
            extract_differential(
                &args.bed,
                &args.abams,
                &args.bbams,
                &args.outdir,
                args.runid.as_deref(),
                args.shorten,
                args.step,
                args.threads,
            )
        }
    }
}

/// Library entry point taking raw command-line arguments without the binary name
pub fn lib_epi_extract(args: Vec<String>) -> Result<PathBuf> {
    run(Args::from(args).command)
}
