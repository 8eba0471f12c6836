//! Discovery of epigenetic codes by non-negative matrix factorization
//! Alejandro Gonzales-Irribarren, 2025
//!
//! This module factorizes scaled loci x marks arrays into codes (groups
//! of marks that occur, change or discriminate together) and per-locus
//! code weights.
//!
//! Four subtools are provided: `code` factorizes a single array, `multi`
//! factorizes several arrays separately and pools their codes, `recode`
//! weights an array against existing codes and `sparsity` reports how
//! concentrated the rows of an array or codes file are.

pub mod cli;
pub mod core;
pub mod linalg;
pub mod nmf;

pub use crate::core::{code, multi_code, recode, sparsity};

use anyhow::Result;

use std::path::PathBuf;

use crate::cli::{Args, SubArgs};

/// Checks the arguments of a subtool and runs it, returning its output files
pub fn run(command: SubArgs) -> Result<Vec<PathBuf>> {
    match command {
        SubArgs::Code { args } => {
            args.check()?;
            let (epi, arr) = code(
                &args.arr,
                args.init,
                args.c,
                args.params.as_deref(),
                args.transform,
            )?;
            Ok(std::iter::once(epi).chain(arr).collect())
        }
        SubArgs::Multi { args } => {
            args.check()?;
            let (epi, arr) = multi_code(
                &args.arrs,
                &args.base,
                args.init,
                args.c,
                args.params.as_deref(),
            )?;
            Ok(vec![epi, arr])
        }
        SubArgs::Recode { args } => {
            args.check()?;
            let arr = recode(&args.arr, &args.epi, &args.outdir, args.base.as_deref())?;
            Ok(vec![arr])
        }
        SubArgs::Sparsity { args } => {
            let value = sparsity(&args.arr)?;
            println!("{}", value);
            Ok(vec![])
        }
    }
}

/// Library entry point taking raw command-line arguments without the binary name
pub fn lib_epi_code(args: Vec<String>) -> Result<Vec<PathBuf>> {
    run(Args::from(args).command)
}
