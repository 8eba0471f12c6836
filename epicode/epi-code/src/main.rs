//! Discovery of epigenetic codes by non-negative matrix factorization
//! Alejandro Gonzales-Irribarren, 2025

use clap::{self, Parser};
use log::{error, info, Level};
use simple_logger::init_with_level;

use epi_code::{cli::Args, run};

fn main() {
    let start = std::time::Instant::now();
    init_with_level(Level::Info).unwrap();

    let args: Args = Args::parse();

    run(args.command).unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(1);
    });

    let elapsed = start.elapsed();
    info!("Elapsed time: {:.3?}", elapsed);
}
