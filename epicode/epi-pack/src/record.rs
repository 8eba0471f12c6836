use anyhow::{bail, Context, Result};

use config::{BED6_FIELDS, MIN_BED_FIELDS};

/// A reference region from a BED6+ file. Coordinates are 0-based,
/// half-open; columns 4-6 are kept verbatim when present.
#[derive(Debug, PartialEq, Clone)]
pub struct Bed6 {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub name: Option<String>,
    pub score: Option<String>,
    pub strand: Option<String>,
}

impl Bed6 {
    /// Parses a single BED6+ line.
    ///
    /// Returns `Ok(None)` for lines without a usable region: blank lines,
    /// comments, `track`/`browser` lines and regions with a negative start
    /// (index queries cannot handle them).
    ///
    /// # Example
    ///
    /// ```rust
    /// use epi_pack::Bed6;
    ///
    /// let bed = Bed6::parse("chr1\t100\t200\tpromoter\t0\t+").unwrap().unwrap();
    /// assert_eq!(bed.len(), 100);
    /// ```
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim_end_matches(['\n', '\r']);

        if line.trim().is_empty()
            || line.starts_with('#')
            || line.starts_with("track")
            || line.starts_with("browser")
        {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split('\t').take(BED6_FIELDS).collect();
        if fields.len() < MIN_BED_FIELDS {
            bail!(
                "ERROR: expected at least {} tab-separated fields, found {}",
                MIN_BED_FIELDS,
                fields.len()
            );
        }

        let start = fields[1]
            .trim()
            .parse::<i64>()
            .with_context(|| format!("ERROR: cannot parse start {:?}", fields[1]))?;
        let end = fields[2]
            .trim()
            .parse::<i64>()
            .with_context(|| format!("ERROR: cannot parse end {:?}", fields[2]))?;

        if start < 0 {
            log::warn!(
                "Skipping region {}:{}-{} with a negative start",
                fields[0],
                start,
                end
            );
            return Ok(None);
        }

        if end < start {
            bail!("ERROR: region end {} is smaller than start {}", end, start);
        }

        let optional = |idx: usize| fields.get(idx).map(|f| f.to_string());

        Ok(Some(Self {
            chrom: fields[0].to_string(),
            start: start as u64,
            end: end as u64,
            name: optional(3),
            score: optional(4),
            strand: optional(5),
        }))
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Splits the region into `step`-sized bins starting at `start`. The last
    /// bin keeps the full step even if it runs past `end`, so counts match
    /// fixed-width binning.
    pub fn bins(&self, step: u64) -> impl Iterator<Item = (u64, u64)> + '_ {
        (self.start..self.end)
            .step_by(step.max(1) as usize)
            .map(move |s| (s, s + step.max(1)))
    }
}
