//! Records and file formats shared by the epicode tools
//! Alejandro Gonzales-Irribarren, 2025
//!
//! This module holds the pieces every sub-tool reads or writes:
//! BED6+ reference regions, the labelled `.arr`/`.epi` matrices
//! passed between pipeline steps, output path derivation and the
//! JSON run descriptor summarizing a complete pipeline run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub mod array;
pub mod record;

pub use array::{format_float, write_counts, EpiArray};
pub use record::Bed6;

fn reader<P: AsRef<Path> + Debug>(file: P) -> Result<String> {
    let mut handle = File::open(&file)
        .with_context(|| format!("ERROR: could not open file: {:?}", file))?;
    let mut contents = String::new();
    handle.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Parses a BED6+ file into regions, preserving file order.
pub fn parse_bed<P: AsRef<Path> + Debug>(path: P) -> Result<Vec<Bed6>> {
    let contents = reader(&path)?;
    let mut regions = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let record = Bed6::parse(line)
            .with_context(|| format!("ERROR: malformed line {} in {:?}", idx + 1, path))?;

        if let Some(record) = record {
            regions.push(record);
        }
    }

    log::info!("Regions parsed from {:?}: {}", path, regions.len());
    Ok(regions)
}

/// Builds the output path of a step from its input: the final extension is
/// dropped and `_{suffix}.{ext}` appended, in the input's directory.
///
/// # Example
///
/// ```rust
/// use std::path::{Path, PathBuf};
/// use epi_pack::derive_path;
///
/// let out = derive_path(Path::new("out/run_lvl.arr"), "sig95", "arr");
/// assert_eq!(out, PathBuf::from("out/run_lvl_sig95.arr"));
/// ```
pub fn derive_path(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    input.with_file_name(format!("{}_{}.{}", stem, suffix, ext))
}

/// Appends `_{suffix}.{ext}` to a base path that has no extension of its own
pub fn base_path(base: &Path, suffix: &str, ext: &str) -> PathBuf {
    let name = base
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    base.with_file_name(format!("{}_{}.{}", name, suffix, ext))
}

/// Summary of a pipeline run, written as `{runid}_run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub mode: String,
    pub runid: String,
    pub version: String,
    pub params: BTreeMap<String, String>,
    pub outputs: Vec<PathBuf>,
}

impl RunDescriptor {
    pub fn new(mode: &str, runid: &str) -> Self {
        Self {
            mode: mode.to_string(),
            runid: runid.to_string(),
            version: config::VERSION.to_string(),
            params: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn param<V: ToString>(mut self, key: &str, value: V) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn output<P: AsRef<Path>>(&mut self, path: P) {
        self.outputs.push(path.as_ref().to_path_buf());
    }

    pub fn write(&self, outdir: &Path) -> Result<PathBuf> {
        let path = outdir.join(format!("{}_{}", self.runid, config::DESCRIPTOR));
        let file = File::create(&path)
            .with_context(|| format!("ERROR: could not create file: {}", path.display()))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        log::info!("Run descriptor written to: {}", path.display());

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bed_keeps_order_and_skips_negatives() {
        let mut file = tempfile::Builder::new().suffix(".bed").tempfile().unwrap();
        writeln!(file, "track name=promoters").unwrap();
        writeln!(file, "chr2\t500\t900\tp1\t0\t+").unwrap();
        writeln!(file, "chr1\t-10\t90\tp2\t0\t-").unwrap();
        writeln!(file, "chr1\t100\t300\tp3\t0\t-").unwrap();

        let regions = parse_bed(file.path()).unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].chrom, "chr2");
        assert_eq!(regions[1].name.as_deref(), Some("p3"));
    }

    #[test]
    fn test_parse_bed_reports_line_number() {
        let mut file = tempfile::Builder::new().suffix(".bed").tempfile().unwrap();
        writeln!(file, "chr1\t0\t100").unwrap();
        writeln!(file, "chr1\tzero\t100").unwrap();

        let err = parse_bed(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_derive_and_base_paths() {
        assert_eq!(
            derive_path(Path::new("/tmp/x/run_cnt.arr"), "deseq", "arr"),
            PathBuf::from("/tmp/x/run_cnt_deseq.arr")
        );
        assert_eq!(
            base_path(Path::new("out/discriminatory"), "pgnmf-c#4", "epi"),
            PathBuf::from("out/discriminatory_pgnmf-c#4.epi")
        );
    }

    #[test]
    fn test_run_descriptor_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = RunDescriptor::new("absolute", "42").param("c", 4);
        descriptor.output("absolute_out/42_lvl.arr");

        let path = descriptor.write(dir.path()).unwrap();
        let back: RunDescriptor =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(back, descriptor);
        assert_eq!(back.params.get("c").map(String::as_str), Some("4"));
    }
}
