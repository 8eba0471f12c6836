use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod fns;
pub mod mods;

pub use fns::*;
pub use mods::*;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// numeric values
pub const MIN_THREADS: usize = 1;
pub const DEFAULT_PAR: usize = 4;
pub const MIN_BED_FIELDS: usize = 3;
pub const BED6_FIELDS: usize = 6;
pub const SHORTEN_MIN_LENGTH: usize = 6;
pub const DEFAULT_STEP: u64 = 100;
pub const SENTINEL: i64 = -1;

// algorithm names
pub const DEFAULT_COLSCA: &str = "sig95";
pub const DEFAULT_PAIRSCA: &str = "deseq";
pub const DEFAULT_INIT: &str = "nndsvd";
pub const METHOD: &str = "pgnmf";

// file names
pub const LVL: &str = "lvl";
pub const CNT: &str = "cnt";
pub const ARR: &str = "arr";
pub const EPI: &str = "epi";
pub const DESCRIPTOR: &str = "run.json";
pub const ABSOLUTE_OUT: &str = "absolute_out";
pub const DIFFERENTIAL_OUT: &str = "differential_out";
pub const DISCRIMINATORY_OUT: &str = "discriminatory_out";
pub const DISCRIMINATORY_RUNID: &str = "discriminatory";

// column suffixes
pub const A_SUFFIX: &str = ":a";
pub const B_SUFFIX: &str = ":b";
pub const GAIN_SUFFIX: &str = ":g";
pub const LOSS_SUFFIX: &str = ":l";

// extensions
pub const BED_EXTENSIONS: [&str; 2] = ["bed", "txt"];
pub const BAM_EXTENSIONS: [&str; 1] = ["bam"];
pub const ARR_EXTENSIONS: [&str; 1] = ["arr"];
pub const EPI_EXTENSIONS: [&str; 1] = ["epi"];
pub const INDEX_EXTENSIONS: [&str; 2] = ["bai", "csi"];

// os
#[cfg(not(windows))]
const TICK_SETTINGS: (&str, u64) = ("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ", 80);
#[cfg(windows)]
const TICK_SETTINGS: (&str, u64) = (r"+-x| ", 200);

/// return a pre-configured progress bar
pub fn get_progress_bar(length: u64, msg: &str) -> ProgressBar {
    let progressbar_style = ProgressStyle::default_spinner()
        .tick_chars(TICK_SETTINGS.0)
        .template(" {spinner} {msg:<30} {wide_bar} ETA {eta_precise} ")
        .expect("no template error");

    let progress_bar = ProgressBar::new(length);

    progress_bar.set_style(progressbar_style);
    progress_bar.enable_steady_tick(Duration::from_millis(TICK_SETTINGS.1));
    progress_bar.set_message(msg.to_owned());

    progress_bar
}

/// argument checker for all subcommands reading BED + BAM files
pub trait ArgCheck {
    fn check(&self) -> Result<(), CliError> {
        self.validate_args()
    }

    fn validate_args(&self) -> Result<(), CliError> {
        self.check_beds()?;
        self.check_bams()?;

        if self.get_threads() < MIN_THREADS {
            return Err(CliError::InvalidInput(format!(
                "ERROR: number of threads must be at least {}",
                MIN_THREADS
            )));
        }

        Ok(())
    }

    fn check_beds(&self) -> Result<(), CliError> {
        let beds = self.get_beds();
        if beds.is_empty() {
            let err = "No BED6+ file provided".to_string();
            return Err(CliError::InvalidInput(err));
        }
        for bed in beds {
            validate(bed, &BED_EXTENSIONS)?;
        }

        Ok(())
    }

    fn check_bams(&self) -> Result<(), CliError> {
        let bams = self.get_bams();
        if bams.is_empty() {
            let err = "No BAM files provided".to_string();
            return Err(CliError::InvalidInput(err));
        }
        for bam in bams {
            validate(bam, &BAM_EXTENSIONS)?;
            validate_index(bam)?;
        }

        Ok(())
    }

    fn get_beds(&self) -> Vec<&Path>;
    fn get_bams(&self) -> Vec<&Path>;
    fn get_threads(&self) -> usize;
}

/// error handling for CLI
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// argument validation
pub fn validate(arg: &Path, extensions: &[&str]) -> Result<(), CliError> {
    if !arg.exists() {
        return Err(CliError::InvalidInput(format!(
            "ERROR: {:?} does not exist",
            arg
        )));
    }

    if !arg.is_file() {
        return Err(CliError::InvalidInput(format!(
            "ERROR: {:?} is not a file",
            arg
        )));
    }

    match arg.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if extensions.contains(&ext) => (),
        _ => {
            return Err(CliError::InvalidInput(format!(
                "ERROR: file {:?} does not have any of the expected extensions {:?}",
                arg, extensions
            )))
        }
    }

    match std::fs::metadata(arg) {
        Ok(metadata) if metadata.len() == 0 => Err(CliError::InvalidInput(format!(
            "ERROR: file {:?} is empty",
            arg
        ))),
        Ok(_) => Ok(()),
        Err(e) => Err(CliError::IoError(e)),
    }
}

/// BAM files are queried by region, so an index must sit next to them
/// either as `<file>.bam.bai` or `<file>.bai` (same for .csi)
pub fn validate_index(bam: &Path) -> Result<(), CliError> {
    let found = INDEX_EXTENSIONS.iter().any(|ext| {
        let appended = PathBuf::from(format!("{}.{}", bam.display(), ext));
        let replaced = bam.with_extension(ext);

        appended.is_file() || replaced.is_file()
    });

    if found {
        Ok(())
    } else {
        Err(CliError::InvalidInput(format!(
            "ERROR: no index (.bai/.csi) found for {:?}",
            bam
        )))
    }
}
