use clap::{Parser, Subcommand};
use config::{
    validate, CliError, ColumnScaling, PairScaling, ARR_EXTENSIONS, DEFAULT_COLSCA,
    DEFAULT_PAIRSCA,
};

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
    #[command(name = "pairs")]
    Pairs {
        #[command(flatten)]
        args: PairsArgs,
    },
    #[command(name = "differential")]
    Differential {
        #[command(flatten)]
        args: DifferentialArgs,
    },
    #[command(name = "features")]
    Features {
        #[command(flatten)]
        args: FeaturesArgs,
    },
}

#[derive(Debug, Parser, Clone)]
pub struct PairsArgs {
    #[arg(
        short = 'a',
        long = "arr",
        required = true,
        value_name = "PATH",
        help = "Path to paired counts array (*_cnt.arr)"
    )]
    pub arr: PathBuf,

    #[arg(
        long = "pairsca",
        value_name = "METHOD",
        help = "Pair scaling method",
        default_value = DEFAULT_PAIRSCA
    )]
    pub pairsca: PairScaling,
}

impl PairsArgs {
    pub fn check(&self) -> Result<(), CliError> {
        validate(&self.arr, &ARR_EXTENSIONS)
    }
}

#[derive(Debug, Parser, Clone)]
pub struct DifferentialArgs {
    #[arg(
        short = 'a',
        long = "arr",
        required = true,
        value_name = "PATH",
        help = "Path to scaled paired counts array (*_deseq.arr)"
    )]
    pub arr: PathBuf,
}

impl DifferentialArgs {
    pub fn check(&self) -> Result<(), CliError> {
        validate(&self.arr, &ARR_EXTENSIONS)
    }
}

#[derive(Debug, Parser, Clone)]
pub struct FeaturesArgs {
    #[arg(
        short = 'a',
        long = "arr",
        required = true,
        value_name = "PATH",
        help = "Path to loci x features array (*_lvl.arr)"
    )]
    pub arr: PathBuf,

    #[arg(
        long = "colsca",
        value_name = "METHOD",
        help = "Column scaling method: sigNN or whiten",
        default_value = DEFAULT_COLSCA
    )]
    pub colsca: ColumnScaling,
}

impl FeaturesArgs {
    pub fn check(&self) -> Result<(), CliError> {
        validate(&self.arr, &ARR_EXTENSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_method_parsing() {
        let args = Args::try_parse_from(["epi-scale", "features", "--arr", "x_lvl.arr"]).unwrap();
        match args.command {
            SubArgs::Features { args } => assert_eq!(args.colsca, ColumnScaling::Sigmoid(95.0)),
            _ => panic!("expected features subcommand"),
        }

        let args = Args::try_parse_from([
            "epi-scale", "features", "--arr", "x_lvl.arr", "--colsca", "whiten",
        ])
        .unwrap();
        match args.command {
            SubArgs::Features { args } => assert_eq!(args.colsca, ColumnScaling::Whiten),
            _ => panic!("expected features subcommand"),
        }

        assert!(Args::try_parse_from([
            "epi-scale", "features", "--arr", "x_lvl.arr", "--colsca", "zscore",
        ])
        .is_err());
        assert!(
            Args::try_parse_from(["epi-scale", "pairs", "--arr", "x.arr", "--pairsca", "tmm"])
                .is_err()
        );
    }
}
