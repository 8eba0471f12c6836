use clap::{ArgAction, Parser, Subcommand};
use config::{ArgCheck, CliError, DEFAULT_STEP};

use std::path::{Path, PathBuf};

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
    #[command(name = "absolute")]
    Absolute {
        #[command(flatten)]
        args: AbsoluteArgs,
    },
    #[command(name = "differential")]
    Differential {
        #[command(flatten)]
        args: DifferentialArgs,
    },
}

#[derive(Debug, Parser, Clone)]
pub struct AbsoluteArgs {
    #[arg(
        short = 'b',
        long = "bed",
        required = true,
        value_name = "PATH",
        help = "Path to BED6+ file with reference regions"
    )]
    pub bed: PathBuf,

    #[arg(
        short = 'a',
        long = "bams",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Paths to indexed BAM files, one per mark"
    )]
    pub bams: Vec<PathBuf>,

    #[arg(
        short = 'o',
        long = "outdir",
        required = true,
        value_name = "PATH",
        help = "Output directory"
    )]
    pub outdir: PathBuf,

    #[arg(
        short = 'r',
        long = "runid",
        required = false,
        value_name = "RUNID",
        help = "Run identifier, derived from the inputs when missing"
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
        help = "Number of threads",
        value_name = "THREADS",
        default_value_t = num_cpus::get()
    )]
    pub threads: usize,
}

impl ArgCheck for AbsoluteArgs {
    fn get_beds(&self) -> Vec<&Path> {
        vec![self.bed.as_path()]
    }

    fn get_bams(&self) -> Vec<&Path> {
        self.bams.iter().map(|b| b.as_path()).collect()
    }

    fn get_threads(&self) -> usize {
        self.threads
    }
}

#[derive(Debug, Parser, Clone)]
pub struct DifferentialArgs {
    #[arg(
        short = 'b',
        long = "bed",
        required = true,
        value_name = "PATH",
        help = "Path to BED6+ file with reference regions"
    )]
    pub bed: PathBuf,

    #[arg(
        short = 'a',
        long = "abams",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Paths to indexed BAM files of sample A"
    )]
    pub abams: Vec<PathBuf>,

    #[arg(
        short = 'B',
        long = "bbams",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Paths to indexed BAM files of sample B"
    )]
    pub bbams: Vec<PathBuf>,

    #[arg(
        short = 'o',
        long = "outdir",
        required = true,
        value_name = "PATH",
        help = "Output directory"
    )]
    pub outdir: PathBuf,

    #[arg(
        short = 'r',
        long = "runid",
        required = false,
        value_name = "RUNID",
        help = "Run identifier, derived from the inputs when missing"
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
        long = "step",
        help = "Bin size in base pairs",
        value_name = "BP",
        default_value_t = DEFAULT_STEP
    )]
    pub step: u64,

    #[arg(
        short = 't',
        long = "threads",
        help = "Number of threads",
        value_name = "THREADS",
        default_value_t = num_cpus::get()
    )]
    pub threads: usize,
}

impl ArgCheck for DifferentialArgs {
    fn check(&self) -> Result<(), CliError> {
        self.validate_args()?;

        if self.abams.len() != self.bbams.len() {
            return Err(CliError::InvalidInput(format!(
                "ERROR: {} A files and {} B files, samples must pair up",
                self.abams.len(),
                self.bbams.len()
            )));
        }

        if self.step == 0 {
            return Err(CliError::InvalidInput(
                "ERROR: step must be a positive number of base pairs".to_string(),
            ));
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
        self.threads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_from_library_call() {
        let args = Args::from(
            ["absolute", "-b", "regions.bed", "-a", "x.bam,y.bam", "-o", "out", "-s"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );

        match args.command {
            SubArgs::Absolute { args } => {
                assert_eq!(args.bams, vec![PathBuf::from("x.bam"), PathBuf::from("y.bam")]);
                assert!(args.shorten);
            }
            _ => panic!("expected absolute subcommand"),
        }
    }

    #[test]
    fn test_parse_differential_args() {
        let args = Args::try_parse_from([
            "epi-extract",
            "differential",
            "-b",
            "regions.bed",
            "-a",
            "x_a.bam,y_a.bam",
            "-B",
            "x_b.bam,y_b.bam",
            "-o",
            "out",
            "--step",
            "250",
        ])
        .unwrap();

        match args.command {
            SubArgs::Differential { args } => {
                assert_eq!(args.abams.len(), 2);
                assert_eq!(args.bbams[1], PathBuf::from("y_b.bam"));
                assert_eq!(args.step, 250);
                assert!(!args.shorten);
                assert!(args.runid.is_none());
            }
            _ => panic!("expected differential subcommand"),
        }
    }

    #[test]
    fn test_check_rejects_unpaired_samples() {
        let dir = tempfile::tempdir().unwrap();
        let bed = dir.path().join("regions.bed");
        std::fs::write(&bed, "chr1\t0\t100\n").unwrap();

        let mut bams = Vec::new();
        for name in ["x_a.bam", "x_b.bam", "y_b.bam"] {
            let bam = dir.path().join(name);
            std::fs::write(&bam, "BAM").unwrap();
            std::fs::write(dir.path().join(format!("{}.bai", name)), "BAI").unwrap();
            bams.push(bam);
        }

        let args = DifferentialArgs {
            bed,
            abams: vec![bams[0].clone()],
            bbams: vec![bams[1].clone(), bams[2].clone()],
            outdir: dir.path().to_path_buf(),
            runid: None,
            shorten: false,
            step: DEFAULT_STEP,
            threads: 1,
        };
        assert!(args.check().is_err());

        let paired = DifferentialArgs {
            bbams: vec![bams[1].clone()],
            ..args
        };
        assert!(paired.check().is_ok());
    }
}
