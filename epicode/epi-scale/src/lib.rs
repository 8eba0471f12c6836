//! Scaling of epigenomic mark arrays
//! Alejandro Gonzales-Irribarren, 2025
//!
//! Three subtools normalize the arrays produced by epi-extract before
//! they are factorized: `pairs` corrects paired A/B counts for sequencing
//! depth (DESeq size factors), `differential` turns them into per-region
//! gain/loss levels and `features` brings every column to a comparable
//! range (double sigmoid or whitening).

pub mod cli;
pub mod core;
pub mod stats;

pub use crate::core::{scale_differential, scale_features, scale_pairs};

use anyhow::Result;

use std::path::PathBuf;

use crate::cli::{Args, SubArgs};

/// Checks the arguments of a subtool and runs it, returning the output array
pub fn run(command: SubArgs) -> Result<PathBuf> {
    match command {
        SubArgs::Pairs { args } => {
            args.check()?;
            scale_pairs(&args.arr, args.pairsca)
        }
        SubArgs::Differential { args } => {
            args.check()?;
            scale_differential(&args.arr)
        }
        SubArgs::Features { args } => {
            args.check()?;
            scale_features(&args.arr, args.colsca)
        }
    }
}

/// Library entry point taking raw command-line arguments without the binary name
pub fn lib_epi_scale(args: Vec<String>) -> Result<PathBuf> {
    run(Args::from(args).command)
}
