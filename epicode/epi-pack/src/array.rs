use anyhow::{bail, Context, Result};
use ndarray::{Array2, ArrayView2};

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A labelled matrix as stored in `.arr`/`.epi` files: one header row of
/// tab-separated column names followed by tab-separated numeric rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EpiArray {
    pub names: Vec<String>,
    pub data: Array2<f64>,
}

impl EpiArray {
    pub fn new(names: Vec<String>, data: Array2<f64>) -> Result<Self> {
        if names.len() != data.ncols() {
            bail!(
                "ERROR: {} column names for a matrix with {} columns",
                names.len(),
                data.ncols()
            );
        }

        Ok(Self { names, data })
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// Reads a labelled array from disk.
    ///
    /// # Example
    ///
    /// ```rust, no_run
    /// use epi_pack::EpiArray;
    ///
    /// let arr = EpiArray::read("absolute_out/run_lvl.arr").unwrap();
    /// println!("{} loci x {} marks", arr.nrows(), arr.ncols());
    /// ```
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("ERROR: could not open file: {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => bail!("ERROR: {} is empty", path.display()),
        };
        let names: Vec<String> = header
            .trim()
            .split('\t')
            .map(|name| name.to_string())
            .collect();

        let mut values = Vec::new();
        let mut nrows = 0;

        for (idx, line) in lines.enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let row = line
                .split('\t')
                .map(|v| v.trim().parse::<f64>())
                .collect::<Result<Vec<f64>, _>>()
                .with_context(|| {
                    format!(
                        "ERROR: non-numeric value in {} at line {}",
                        path.display(),
                        idx + 2
                    )
                })?;

            if row.len() != names.len() {
                bail!(
                    "ERROR: {} at line {} has {} values, header has {}",
                    path.display(),
                    idx + 2,
                    row.len(),
                    names.len()
                );
            }

            values.extend(row);
            nrows += 1;
        }

        let data = Array2::from_shape_vec((nrows, names.len()), values)?;
        log::info!(
            "Loaded {} [{} x {}]",
            path.display(),
            data.nrows(),
            data.ncols()
        );

        Ok(Self { names, data })
    }

    /// Writes the array with values in scientific notation
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_matrix(path, &self.names, self.data.view(), format_float)
    }
}

/// Writes an integer matrix (raw counts with sentinels) under a header
pub fn write_counts<P: AsRef<Path>>(
    path: P,
    names: &[String],
    counts: ArrayView2<i64>,
) -> Result<()> {
    write_matrix(path, names, counts, |v| v.to_string())
}

fn write_matrix<P, T, F>(path: P, names: &[String], data: ArrayView2<T>, fmt: F) -> Result<()>
where
    P: AsRef<Path>,
    F: Fn(&T) -> String,
{
    let path = path.as_ref();
    if names.len() != data.ncols() {
        bail!(
            "ERROR: {} column names for a matrix with {} columns",
            names.len(),
            data.ncols()
        );
    }

    let file = File::create(path)
        .with_context(|| format!("ERROR: could not create file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", names.join("\t"))?;
    for row in data.rows() {
        let line: Vec<String> = row.iter().map(&fmt).collect();
        writeln!(writer, "{}", line.join("\t"))?;
    }
    writer.flush()?;

    Ok(())
}

/// Formats a float as `%.18e` does: 18 decimals and a signed, two-digit
/// exponent. Non-finite values are written as `nan`/`inf`/`-inf`.
pub fn format_float(value: &f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if *value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let repr = format!("{:.18e}", value);
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => repr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_format_float_matches_scientific_layout() {
        assert_eq!(format_float(&1.5), "1.500000000000000000e+00");
        assert_eq!(format_float(&0.0), "0.000000000000000000e+00");
        assert_eq!(format_float(&-0.25), "-2.500000000000000000e-01");
        assert_eq!(format_float(&-0.00025), "-2.500000000000000052e-04");
        assert_eq!(format_float(&1.0e120), "1.000000000000000000e+120");
        assert_eq!(format_float(&f64::NAN), "nan");
        assert_eq!(format_float(&f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_epiarray_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_lvl.arr");

        let arr = EpiArray::new(
            vec!["H3K4me3".to_string(), "H3K27ac".to_string()],
            array![[0.25, 1.0], [f64::NAN, 3.0e-5]],
        )
        .unwrap();
        arr.write(&path).unwrap();

        let back = EpiArray::read(&path).unwrap();
        assert_eq!(back.names, arr.names);
        assert_eq!(back.data[[0, 0]], 0.25);
        assert!(back.data[[1, 0]].is_nan());
        assert_eq!(back.data[[1, 1]], 3.0e-5);
    }

    #[test]
    fn test_epiarray_read_counts_and_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_cnt.arr");

        write_counts(
            &path,
            &["m:a".to_string(), "m:b".to_string()],
            array![[3_i64, 4], [-1, -1]].view(),
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "m:a\tm:b\n3\t4\n-1\t-1\n"
        );

        let back = EpiArray::read(&path).unwrap();
        assert_eq!(back.data, array![[3.0, 4.0], [-1.0, -1.0]]);

        let ragged = dir.path().join("ragged.arr");
        std::fs::write(&ragged, "a\tb\n1\t2\n3\n").unwrap();
        assert!(EpiArray::read(&ragged).is_err());
    }

    #[test]
    fn test_epiarray_rejects_mismatched_names() {
        assert!(EpiArray::new(vec!["a".to_string()], array![[1.0, 2.0]]).is_err());
    }
}
