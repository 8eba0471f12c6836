use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use noodles_bam as bam;
use noodles_core::{region::Interval, Position, Region};
use noodles_sam::Header;

use std::path::Path;

use epi_pack::Bed6;

/// Counts the reads overlapping a half-open, 0-based interval.
pub trait ReadCounter {
    fn count(&mut self, chrom: &str, start: u64, end: u64) -> Result<u64>;
}

impl<F> ReadCounter for F
where
    F: FnMut(&str, u64, u64) -> Result<u64>,
{
    fn count(&mut self, chrom: &str, start: u64, end: u64) -> Result<u64> {
        self(chrom, start, end)
    }
}

/// Opens an indexed BAM file and hands a region counter over it to `f`.
///
/// Every call opens its own reader, so workers never share file handles.
/// Regions on chromosomes absent from the header count zero reads.
///
/// # Example
///
/// ```rust, no_run
/// use std::path::Path;
/// use epi_extract::counter::with_bam;
///
/// let n = with_bam(Path::new("H3K4me3.bam"), |counter| {
///     counter.count("chr1", 1_000, 2_000)
/// })
/// .unwrap();
/// ```
pub fn with_bam<T, F>(path: &Path, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn ReadCounter) -> Result<T>,
{
    let mut reader = bam::io::indexed_reader::Builder::default()
        .build_from_path(path)
        .with_context(|| format!("ERROR: could not open file: {}", path.display()))?;

    let header: Header = reader
        .read_header()
        .with_context(|| format!("ERROR: could not read header for file: {}", path.display()))?;

    let mut counter = |chrom: &str, start: u64, end: u64| -> Result<u64> {
        if end <= start {
            return Ok(0);
        }

        if !header.reference_sequences().contains_key(chrom.as_bytes()) {
            warn!(
                "{} has no reference sequence {}, counting 0 reads",
                path.display(),
                chrom
            );
            return Ok(0);
        }

        let lower = Position::new(start as usize + 1)
            .ok_or_else(|| anyhow!("ERROR: invalid region start: {}", start))?;
        let upper = Position::new(end as usize)
            .ok_or_else(|| anyhow!("ERROR: invalid region end: {}", end))?;
        let region = Region::new(chrom, Interval::from(lower..=upper));

        let query = reader
            .query(&header, &region)
            .with_context(|| format!("ERROR: could not query region: {}", region))?;

        let mut n = 0;
        for record in query {
            record?;
            n += 1;
        }

        Ok(n)
    };

    f(&mut counter)
}

/// Reads per base pair for every region. Zero-length regions get 0.
pub fn absolute_levels(counter: &mut dyn ReadCounter, regions: &[Bed6]) -> Result<Vec<f64>> {
    regions
        .iter()
        .map(|reg| {
            if reg.is_empty() {
                return Ok(0.0);
            }

            let n = counter.count(&reg.chrom, reg.start, reg.end)?;
            Ok(n as f64 / reg.len() as f64)
        })
        .collect()
}

/// Raw counts of two samples in `step`-sized bins of every region.
///
/// Each region contributes one row per bin followed by a `SENTINEL` row,
/// which is how downstream steps find region boundaries.
pub fn differential_counts(
    a: &mut dyn ReadCounter,
    b: &mut dyn ReadCounter,
    regions: &[Bed6],
    step: u64,
    label: &str,
) -> Result<(Vec<i64>, Vec<i64>)> {
    let mut acount = Vec::new();
    let mut bcount = Vec::new();
    let mut current: Option<&str> = None;

    for reg in regions {
        if let Some(chrom) = current {
            if chrom != reg.chrom {
                info!("{} : {} counted", label, chrom);
            }
        }
        current = Some(reg.chrom.as_str());

        for (s, e) in reg.bins(step) {
            acount.push(a.count(&reg.chrom, s, e)? as i64);
            bcount.push(b.count(&reg.chrom, s, e)? as i64);
        }

        acount.push(config::SENTINEL);
        bcount.push(config::SENTINEL);
    }

    if let Some(chrom) = current {
        info!("{} : {} counted (finished)", label, chrom);
    }

    Ok((acount, bcount))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory reads given as (chrom, start, end)
    pub(crate) struct MemoryCounter {
        pub reads: Vec<(&'static str, u64, u64)>,
    }

    impl ReadCounter for MemoryCounter {
        fn count(&mut self, chrom: &str, start: u64, end: u64) -> Result<u64> {
            Ok(self
                .reads
                .iter()
                .filter(|(c, s, e)| *c == chrom && *s < end && start < *e)
                .count() as u64)
        }
    }

    fn region(line: &str) -> Bed6 {
        Bed6::parse(line).unwrap().unwrap()
    }

    /// Writes a coordinate-sorted BAM with `.bam.bai` index holding one
    /// chromosome (`chr1`, 1 kb) and 10M reads at the given 0-based starts
    fn write_indexed_bam(dir: &Path, starts: &[usize]) -> std::path::PathBuf {
        use noodles_csi::binning_index::{index::reference_sequence::bin::Chunk, Indexer};
        use noodles_sam::alignment::{
            io::Write as _,
            record::{
                cigar::{op::Kind, Op},
                Flags,
            },
            record_buf::Cigar,
            Record as _, RecordBuf,
        };
        use noodles_sam::header::record::value::{map::ReferenceSequence, Map};
        use std::num::NonZeroUsize;

        let path = dir.join("reads.bam");
        let header = Header::builder()
            .add_reference_sequence(
                "chr1",
                Map::<ReferenceSequence>::new(NonZeroUsize::try_from(1_000).unwrap()),
            )
            .build();

        let mut writer = bam::io::Writer::new(std::fs::File::create(&path).unwrap());
        writer.write_header(&header).unwrap();
        for start in starts {
            let record = RecordBuf::builder()
                .set_flags(Flags::empty())
                .set_reference_sequence_id(0)
                .set_alignment_start(Position::try_from(start + 1).unwrap())
                .set_cigar([Op::new(Kind::Match, 10)].into_iter().collect::<Cigar>())
                .build();
            writer.write_alignment_record(&header, &record).unwrap();
        }
        writer.try_finish().unwrap();
        drop(writer);

        let mut reader = bam::io::reader::Builder.build_from_path(&path).unwrap();
        let header = reader.read_header().unwrap();
        let mut record = bam::Record::default();
        let mut indexer = Indexer::default();
        let mut start_position = reader.get_ref().virtual_position();

        while reader.read_record(&mut record).unwrap() != 0 {
            let end_position = reader.get_ref().virtual_position();
            let context = match (
                record.reference_sequence_id().transpose().unwrap(),
                record.alignment_start().transpose().unwrap(),
                record.alignment_end().transpose().unwrap(),
            ) {
                (Some(id), Some(start), Some(end)) => Some((id, start, end, true)),
                _ => None,
            };
            indexer
                .add_record(context, Chunk::new(start_position, end_position))
                .unwrap();
            start_position = end_position;
        }

        let index = indexer.build(header.reference_sequences().len());
        bam::bai::write(dir.join("reads.bam.bai"), &index).unwrap();

        path
    }

    #[test]
    fn test_with_bam_counts_half_open_regions() {
        let dir = tempfile::tempdir().unwrap();
        // 0-based [90, 100), [150, 160), [199, 209), [200, 210)
        let bam = write_indexed_bam(dir.path(), &[90, 150, 199, 200]);

        let counts = with_bam(&bam, |counter| {
            Ok(vec![
                counter.count("chr1", 100, 200)?,
                counter.count("chr1", 0, 100)?,
                counter.count("chr1", 209, 1_000)?,
                counter.count("chr1", 300, 300)?,
                counter.count("chrX", 0, 1_000)?,
            ])
        })
        .unwrap();

        assert_eq!(counts, vec![2, 1, 1, 0, 0]);

        let levels = with_bam(&bam, |counter| {
            absolute_levels(counter, &[region("chr1\t100\t200"), region("chr2\t0\t10")])
        })
        .unwrap();
        assert_eq!(levels, vec![0.02, 0.0]);
    }

    #[test]
    fn test_absolute_levels_normalizes_by_length() {
        let mut counter = MemoryCounter {
            reads: vec![("chr1", 10, 60), ("chr1", 90, 140), ("chr2", 0, 50)],
        };
        let regions = vec![
            region("chr1\t0\t100"),
            region("chr2\t0\t200"),
            region("chr3\t0\t10"),
            region("chr1\t50\t50"),
        ];

        let levels = absolute_levels(&mut counter, &regions).unwrap();

        assert_eq!(levels, vec![0.02, 0.005, 0.0, 0.0]);
    }

    #[test]
    fn test_differential_counts_adds_sentinels() {
        let mut a = MemoryCounter {
            reads: vec![("chr1", 0, 10), ("chr1", 150, 160), ("chr1", 160, 170)],
        };
        let mut b = MemoryCounter {
            reads: vec![("chr1", 110, 120)],
        };
        let regions = vec![region("chr1\t0\t200"), region("chr1\t500\t550")];

        let (acount, bcount) = differential_counts(&mut a, &mut b, &regions, 100, "a - b").unwrap();

        assert_eq!(acount, vec![1, 2, -1, 0, -1]);
        assert_eq!(bcount, vec![0, 1, -1, 0, -1]);
    }

    #[test]
    fn test_closures_are_counters() {
        let mut calls = 0;
        let mut counter = |_: &str, start: u64, end: u64| -> Result<u64> {
            calls += 1;
            Ok(end - start)
        };

        let levels = absolute_levels(&mut counter, &[region("chr1\t0\t4")]).unwrap();
        assert_eq!(levels, vec![1.0]);
        assert_eq!(calls, 1);
    }
}
