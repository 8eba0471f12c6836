//! epicode: discover epigenetic codes from ChIP-seq data
//! Alejandro Gonzales-Irribarren, 2025
//!
//! This is the entry point for the epicode CLI. It runs one of the three
//! modes (absolute, differential, discriminatory) from BED and BAM files
//! to codes, or any single task of a mode on its own:
//!
//! - extract-absolute / extract-differential
//! - scale-pairs / scale-differential / scale-features
//! - code / multi-code / recode / sparsity
//!
//! To get help on a single task, run:
//!
//! ```shell
//! epicode scale-features -- --help
//! ```

use clap::Parser;
use log::{error, info, Level};
use simple_logger::init_with_level;

use epicode::{cli::Cli, run};

fn main() {
    let start = std::time::Instant::now();
    init_with_level(Level::Info).unwrap();

    let cli = Cli::parse();
    init();

    let outputs = run(cli.command).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });

    for out in outputs {
        info!("output: {}", out.display());
    }

    let elapsed = start.elapsed();
    info!("Elapsed time: {:.3?}", elapsed);
}

fn init() {
    let message = format!(
        r#"

        epicode: discover epigenetic codes from ChIP-seq data

        modes:

        - absolute: marks present together
        - differential: marks gained or lost together
        - discriminatory: marks telling sets of loci apart

        > version: {}
        > author: alejandro gonzales-irribarren, 2025

        * to get help on a single task, run:
            epicode <TASK> -- --help

        "#,
        env!("CARGO_PKG_VERSION")
    );

    println!("{}", message);
}
