use clap::{ArgAction, Parser, Subcommand};
use config::{validate, CliError, InitMethod, ARR_EXTENSIONS, DEFAULT_INIT, EPI_EXTENSIONS};

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubArgs,
}

impl Args {
    pub fn from(args: Vec<String>) -> Self {
        let mut full_args = vec![env!("CARGO_PKG_NAME").to_string()];
        full_args.extend(args);

        Args::parse_from(full_args)
    }
}

#[derive(Debug, Subcommand)]
pub enum SubArgs {
    #[command(name = "code")]
    Code {
        #[command(flatten)]
        args: CodeArgs,
    },
    #[command(name = "multi")]
    Multi {
        #[command(flatten)]
        args: MultiArgs,
    },
    #[command(name = "recode")]
    Recode {
        #[command(flatten)]
        args: RecodeArgs,
    },
    #[command(name = "sparsity")]
    Sparsity {
        #[command(flatten)]
        args: SparsityArgs,
    },
}

#[derive(Debug, Parser, Clone)]
pub struct CodeArgs {
    #[arg(
        short = 'a',
        long = "arr",
        required = true,
        value_name = "PATH",
        help = "Path to loci x scaled features array"
    )]
    pub arr: PathBuf,

    #[arg(
        short = 'c',
        long = "codes",
        required = true,
        value_name = "N",
        help = "Number of expected codes (factorization rank)"
    )]
    pub c: usize,

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
        long = "no-transform",
        help = "Only write the codes, skip the per-locus weights",
        action = ArgAction::SetFalse
    )]
    pub transform: bool,
}

impl CodeArgs {
    pub fn check(&self) -> Result<(), CliError> {
        validate(&self.arr, &ARR_EXTENSIONS)?;
        check_codes(self.c)
    }
}

#[derive(Debug, Parser, Clone)]
pub struct MultiArgs {
    #[arg(
        short = 'a',
        long = "arrs",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Paths to loci x scaled features arrays sharing their marks"
    )]
    pub arrs: Vec<PathBuf>,

    #[arg(
        short = 'b',
        long = "base",
        required = true,
        value_name = "PATH",
        help = "Common base path of the output files"
    )]
    pub base: PathBuf,

    #[arg(
        short = 'c',
        long = "codes",
        required = true,
        value_name = "N",
        help = "Number of expected codes per array"
    )]
    pub c: usize,

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
}

impl MultiArgs {
    pub fn check(&self) -> Result<(), CliError> {
        for arr in &self.arrs {
            validate(arr, &ARR_EXTENSIONS)?;
        }
        check_codes(self.c)
    }
}

#[derive(Debug, Parser, Clone)]
pub struct RecodeArgs {
    #[arg(
        short = 'a',
        long = "arr",
        required = true,
        value_name = "PATH",
        help = "Path to loci x scaled features array"
    )]
    pub arr: PathBuf,

    #[arg(
        short = 'e',
        long = "epi",
        required = true,
        value_name = "PATH",
        help = "Path to existing codes (.epi)"
    )]
    pub epi: PathBuf,

    #[arg(
        short = 'o',
        long = "outdir",
        value_name = "PATH",
        help = "Output directory",
        default_value = "."
    )]
    pub outdir: PathBuf,

    #[arg(
        short = 'b',
        long = "base",
        required = false,
        value_name = "NAME",
        help = "Output file name without extension"
    )]
    pub base: Option<String>,
}

impl RecodeArgs {
    pub fn check(&self) -> Result<(), CliError> {
        validate(&self.arr, &ARR_EXTENSIONS)?;
        validate(&self.epi, &EPI_EXTENSIONS)
    }
}

#[derive(Debug, Parser, Clone)]
pub struct SparsityArgs {
    #[arg(
        short = 'a',
        long = "arr",
        required = true,
        value_name = "PATH",
        help = "Path to an array or codes file"
    )]
    pub arr: PathBuf,
}

fn check_codes(c: usize) -> Result<(), CliError> {
    if c < 1 {
        return Err(CliError::InvalidInput(
            "ERROR: the number of codes must be at least 1".to_string(),
        ));
    }

    Ok(())
}
