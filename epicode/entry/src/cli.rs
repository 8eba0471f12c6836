use clap::{ArgAction, Args, Parser, Subcommand};
use config::{
    ArgCheck, CliError, ColumnScaling, InitMethod, PairScaling, ABSOLUTE_OUT, DEFAULT_COLSCA,
    DEFAULT_INIT, DEFAULT_PAIRSCA, DEFAULT_PAR, DEFAULT_STEP, DIFFERENTIAL_OUT,
    DISCRIMINATORY_OUT,
};

use std::path::{Path, PathBuf};

const TASK_HELP: &str = "Arguments passed to the task, run with `-- --help` for details";

#[derive(Parser, Debug)]
#[command(name = "epicode")]
#[command(about = "epicode: discover epigenetic codes from ChIP-seq data")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Alejandro Gonzales-Irribarren, 2025")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Codes of marks present together in one condition
    #[command(name = "absolute")]
    Absolute(AbsoluteArgs),
    /// Codes of marks gained or lost together between two conditions
    #[command(name = "differential")]
    Differential(DifferentialArgs),
    /// Codes telling two or more sets of loci apart
    #[command(name = "discriminatory")]
    Discriminatory(DiscriminatoryArgs),

    #[command(name = "extract-absolute")]
    ExtractAbsolute(TaskArgs),
    #[command(name = "extract-differential")]
    ExtractDifferential(TaskArgs),
    #[command(name = "scale-pairs")]
    ScalePairs(TaskArgs),
    #[command(name = "scale-differential")]
    ScaleDifferential(TaskArgs),
    #[command(name = "scale-features")]
    ScaleFeatures(TaskArgs),
    #[command(name = "code")]
    Code(TaskArgs),
    #[command(name = "multi-code")]
    MultiCode(TaskArgs),
    #[command(name = "recode")]
    Recode(TaskArgs),
    #[command(name = "sparsity")]
    Sparsity(TaskArgs),
}

#[derive(Debug, Args)]
pub struct TaskArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, help = TASK_HELP)]
    pub args: Vec<String>,
}

/// Options shared by the three pipelines
#[derive(Debug, Args, Clone)]
pub struct CodeOpts {
    #[arg(
        short = 'c',
        long = "codes",
        required = true,
        value_name = "N",
        help = "Number of expected codes (factorization rank)"
    )]
    pub c: usize,

    #[arg(
        long = "colsca",
        value_name = "METHOD",
        help = "Column scaling method: sigNN or whiten",
        default_value = DEFAULT_COLSCA
    )]
    pub colsca: ColumnScaling,

    #[arg(
        short = 'i',
        long = "init",
        value_name = "METHOD",
        help = "Initialization: nndsvd, nndsvda, nndsvdar or random",
        default_value = DEFAULT_INIT
    )]
    pub init: InitMethod,

    #[arg(
        short = 'p',
        long = "params",
        required = false,
        value_name = "KEY:VALUE,...",
        help = "Factorization parameters (max_iter, tol, nls_max_iter, beta, eta, random_state)"
    )]
    pub params: Option<String>,

    #[arg(
        short = 'r',
        long = "runid",
        required = false,
        value_name = "RUNID",
        help = "Run id prefixing all output files"
    )]
    pub runid: Option<String>,

    #[arg(
        short = 's',
        long = "shorten",
        help = "Strip the longest common substring from BAM names",
        action = ArgAction::SetTrue
    )]
    pub shorten: bool,

    #[arg(
        short = 't',
        long = "threads",
        help = "Number of BAM files processed in parallel",
        value_name = "THREADS",
        default_value_t = DEFAULT_PAR
    )]
    pub threads: usize,
}

impl CodeOpts {
    fn check_codes(&self) -> Result<(), CliError> {
        if self.c < 1 {
            return Err(CliError::InvalidInput(
                "ERROR: c (number of codes) must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Args, Clone)]
pub struct AbsoluteArgs {
    #[arg(
        short = 'b',
        long = "bed",
        required = true,
        value_name = "PATH",
        help = "Genomic regions in BED6+ format"
    )]
    pub bed: PathBuf,

    #[arg(
        short = 'a',
        long = "bams",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Coordinate sorted and indexed BAM files, one per mark"
    )]
    pub bams: Vec<PathBuf>,

    #[arg(
        short = 'o',
        long = "outdir",
        value_name = "PATH",
        help = "Output directory",
        default_value = ABSOLUTE_OUT
    )]
    pub outdir: PathBuf,

    #[command(flatten)]
    pub opts: CodeOpts,
}

impl ArgCheck for AbsoluteArgs {
    fn check(&self) -> Result<(), CliError> {
        self.validate_args()?;
        self.opts.check_codes()
    }

    fn get_beds(&self) -> Vec<&Path> {
        vec![self.bed.as_path()]
    }

    fn get_bams(&self) -> Vec<&Path> {
        self.bams.iter().map(|b| b.as_path()).collect()
    }

    fn get_threads(&self) -> usize {
        self.opts.threads
    }
}

#[derive(Debug, Args, Clone)]
pub struct DifferentialArgs {
    #[arg(
        short = 'b',
        long = "bed",
        required = true,
        value_name = "PATH",
        help = "Genomic regions in BED6+ format"
    )]
    pub bed: PathBuf,

    #[arg(
        short = 'a',
        long = "abams",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Sorted and indexed BAM files of condition A"
    )]
    pub abams: Vec<PathBuf>,

    #[arg(
        short = 'B',
        long = "bbams",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Sorted and indexed BAM files of condition B"
    )]
    pub bbams: Vec<PathBuf>,

    #[arg(
        short = 'o',
        long = "outdir",
        value_name = "PATH",
        help = "Output directory",
        default_value = DIFFERENTIAL_OUT
    )]
    pub outdir: PathBuf,

    #[arg(
        long = "step",
        help = "Bin size in base pairs",
        value_name = "BP",
        default_value_t = DEFAULT_STEP
    )]
    pub step: u64,

    #[arg(
        long = "pairsca",
        value_name = "METHOD",
        help = "Pair scaling method",
        default_value = DEFAULT_PAIRSCA
    )]
    pub pairsca: PairScaling,

    #[command(flatten)]
    pub opts: CodeOpts,
}

impl ArgCheck for DifferentialArgs {
    fn check(&self) -> Result<(), CliError> {
        self.validate_args()?;
        self.opts.check_codes()?;

        if self.abams.len() != self.bbams.len() {
            return Err(CliError::InvalidInput(format!(
                "ERROR: {} A files and {} B files, samples must pair up",
                self.abams.len(),
                self.bbams.len()
            )));
        }

        Ok(())
    }

    fn get_beds(&self) -> Vec<&Path> {
        vec![self.bed.as_path()]
    }

    fn get_bams(&self) -> Vec<&Path> {
        self.abams
            .iter()
            .chain(self.bbams.iter())
            .map(|b| b.as_path())
            .collect()
    }

    fn get_threads(&self) -> usize {
        self.opts.threads
    }
}

#[derive(Debug, Args, Clone)]
pub struct DiscriminatoryArgs {
    #[arg(
        short = 'b',
        long = "beds",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Two or more BED6+ files with different types of loci"
    )]
    pub beds: Vec<PathBuf>,

    #[arg(
        short = 'a',
        long = "bams",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Coordinate sorted and indexed BAM files, one per mark"
    )]
    pub bams: Vec<PathBuf>,

    #[arg(
        short = 'o',
        long = "outdir",
        value_name = "PATH",
        help = "Output directory",
        default_value = DISCRIMINATORY_OUT
    )]
    pub outdir: PathBuf,

    #[command(flatten)]
    pub opts: CodeOpts,
}

impl ArgCheck for DiscriminatoryArgs {
    fn check(&self) -> Result<(), CliError> {
        if self.beds.len() < 2 {
            return Err(CliError::InvalidInput(
                "ERROR: at least two BED files are required".to_string(),
            ));
        }

        self.validate_args()?;
        self.opts.check_codes()
    }

    fn get_beds(&self) -> Vec<&Path> {
        self.beds.iter().map(|b| b.as_path()).collect()
    }

    fn get_bams(&self) -> Vec<&Path> {
        self.bams.iter().map(|b| b.as_path()).collect()
    }

    fn get_threads(&self) -> usize {
        self.opts.threads
    }
}
