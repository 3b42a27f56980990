use std::{io::{BufRead, Read}, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use genome::{ChrIdx, Position};
use log::{debug, trace, warn};

use super::{fold_maf, Locus};
use crate::parse;

mod error;
pub use error::BedReaderError;

/// Magic bytes opening a variant-major PLINK `.bed` file.
const BED_MAGIC: [u8; 3] = [0x6c, 0x1b, 0x01];

/// Streaming reader over a PLINK `.bed` + `.bim` + `.fam` fileset.
///
/// The `.bim` file drives the shallow cursor; the binary `.bed` stream is
/// only touched on `deep_read`, fast-forwarding over the records of loci
/// that were skipped shallow. `pending_loci` counts `.bim` lines consumed
/// since the last deep read, so a second deep read on the same locus (zero
/// pending) reports the duplicate-position signal.
pub struct BedReader {
    data           : Box<dyn BufRead>,
    bim            : Box<dyn BufRead>,
    path           : PathBuf,
    subjects       : Vec<String>,
    bytes_per_locus: usize,
    pending_loci   : usize,
    allow_missings : bool,
    good           : bool,
}

impl BedReader {
    /// Open `path` and its `.bim`/`.fam` siblings, and check the magic.
    ///
    /// # Errors
    /// - if any of the three files is missing or unopenable
    /// - if the magic bytes do not announce a variant-major `.bed` file
    /// - if a `.fam` row cannot be parsed as a subject.
    pub fn new(path: &Path, allow_missings: bool) -> Result<BedReader> {
        use BedReaderError::{BadMagic, MissingSibling};

        let bim_path = parse::find_sibling_file(path, "bim")
            .ok_or_else(|| MissingSibling { path: path.to_path_buf(), ext: "bim" })?;
        let fam_path = parse::find_sibling_file(path, "fam")
            .ok_or_else(|| MissingSibling { path: path.to_path_buf(), ext: "fam" })?;

        let mut data = parse::open(path)?;
        let mut magic = [0u8; 3];
        data.read_exact(&mut magic)
            .with_context(|| format!("While reading the header of '{}'", path.display()))?;
        if magic != BED_MAGIC {
            return Err(BadMagic(path.to_path_buf()).into());
        }

        let subjects = Self::parse_fam(&fam_path)?;
        let bytes_per_locus = (subjects.len() + 3) / 4;
        debug!("Opened file '{}'. Read mode: plink bed. Found {} subjects.",
               path.display(), subjects.len());

        Ok(BedReader {
            data,
            bim: parse::open(&bim_path)?,
            path: path.to_path_buf(),
            subjects,
            bytes_per_locus,
            pending_loci: 0,
            allow_missings,
            good: true,
        })
    }

    /// Subject ids (`fid_iid`) from the `.fam` file.
    fn parse_fam(path: &Path) -> Result<Vec<String>> {
        let mut subjects = Vec::new();
        for (line_nr, line) in parse::open(path)?.lines().enumerate() {
            let line = line.with_context(|| format!("While reading '{}'", path.display()))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return Err(BedReaderError::MalformedFam {
                    path: path.to_path_buf(),
                    line: line_nr + 1,
                }.into());
            }
            subjects.push(format!("{}_{}", fields[0], fields[1]));
        }
        Ok(subjects)
    }

    /// Advance the `.bim` cursor, skipping unparseable entries.
    pub fn next_shallow(&mut self, locus: &mut Locus) -> Result<bool> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.bim.read_line(&mut line)
                .with_context(|| format!("While reading the bim file of '{}'", self.path.display()))?;
            if n == 0 {
                self.good = false;
                return Ok(false);
            }
            self.pending_loci += 1;

            // 1 rs573167194 0 141000084 A G
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                continue;
            }
            let Ok(chr) = fields[0].parse::<ChrIdx>() else { continue };
            let Ok(pos) = fields[3].parse::<Position>() else { continue };

            locus.chr = chr;
            locus.pos = pos;
            locus.id = fields[1].to_string();
            locus.reference = fields[4].to_string();
            locus.alternate = fields[5].to_string();
            locus.info.clear();
            locus.format.clear();
            locus.pinfo.clear();
            locus.clear();
            return Ok(true);
        }
    }

    /// Decode the 2-bit genotype block of the current `.bim` entry.
    ///
    /// Each byte packs four genotypes, least-significant pair first:
    /// `00` homozygous-ref (dosage 2), `01` missing, `10` heterozygous,
    /// `11` homozygous-alt (dosage 0). A flipped locus swaps the homozygotes.
    pub fn deep_read(&mut self, locus: &mut Locus) -> Result<bool> {
        locus.dosages.clear();

        if self.pending_loci == 0 {
            debug!("Duplicate position {}:{} in file '{}': ignoring all but first",
                   locus.chr, locus.pos, self.path.display());
            return Ok(false);
        }

        // drop the records of shallow-skipped loci from the data stream
        if self.pending_loci > 1 {
            let skip = (self.bytes_per_locus * (self.pending_loci - 1)) as u64;
            std::io::copy(&mut self.data.by_ref().take(skip), &mut std::io::sink())
                .with_context(|| format!("While skipping records in '{}'", self.path.display()))?;
        }
        self.pending_loci = 0;

        let mut buffer = vec![0u8; self.bytes_per_locus];
        if let Err(e) = self.data.read_exact(&mut buffer) {
            warn!("plink bed reader: deep read error: {e}");
            return Ok(false);
        }

        let dosages = [
            match locus.switch_ar { true => 0.0, false => 2.0 }, // 00
            1.0,                                                 // 10
            match locus.switch_ar { true => 2.0, false => 0.0 }, // 11
        ];

        let mut total = 0.0f64;
        'decode: for byte in buffer {
            for offset in 0..4 {
                let code = (byte >> (offset * 2)) & 0x03;
                let dosage = match code {
                    0b00 => dosages[0],
                    0b01 => {
                        trace!("plink bed reader: missing data point for subject #{}",
                               locus.dosages.len());
                        if !self.allow_missings {
                            return Ok(false);
                        }
                        f32::NAN
                    }
                    0b10 => dosages[1],
                    _    => dosages[2],
                };
                if !dosage.is_nan() {
                    total += f64::from(dosage);
                }
                locus.dosages.push(dosage);
                if locus.dosages.len() == self.subjects.len() {
                    break 'decode;
                }
            }
        }

        locus.maf = fold_maf(total / (2.0 * self.subjects.len() as f64));
        Ok(true)
    }

    #[must_use]
    pub fn is_good(&self) -> bool {
        self.good
    }

    #[must_use]
    pub fn subject_ids(&self) -> &[String] {
        &self.subjects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    const FAM: &str = "F1 I1 0 0 1 -9\nF2 I2 0 0 2 -9\n";

    fn write_fileset(bed_payload: &[u8], bim: &str, fam: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let tmpdir = tempfile::tempdir()?;
        let bed_path = tmpdir.path().join("cohort.bed");
        let mut bed = Vec::from(BED_MAGIC);
        bed.extend_from_slice(bed_payload);
        std::fs::write(&bed_path, &bed)?;
        std::fs::File::create(tmpdir.path().join("cohort.bim"))?.write_all(bim.as_bytes())?;
        std::fs::File::create(tmpdir.path().join("cohort.fam"))?.write_all(fam.as_bytes())?;
        Ok((tmpdir, bed_path))
    }

    #[test]
    fn rejects_bad_magic() -> Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let bed_path = tmpdir.path().join("cohort.bed");
        std::fs::write(&bed_path, [0x6c, 0x1b, 0x00, 0xff])?;
        std::fs::write(tmpdir.path().join("cohort.bim"), "1 rs1 0 100 A G\n")?;
        std::fs::write(tmpdir.path().join("cohort.fam"), FAM)?;
        assert!(BedReader::new(&bed_path, false).is_err());
        Ok(())
    }

    #[test]
    fn missing_sibling_is_fatal() -> Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let bed_path = tmpdir.path().join("cohort.bed");
        std::fs::write(&bed_path, BED_MAGIC)?;
        assert!(BedReader::new(&bed_path, false).is_err());
        Ok(())
    }

    #[test]
    fn fam_subjects_are_fid_iid() -> Result<()> {
        let (_tmpdir, bed_path) = write_fileset(&[], "", FAM)?;
        let reader = BedReader::new(&bed_path, false)?;
        assert_eq!(reader.subject_ids(), ["F1_I1", "F2_I2"]);
        assert_eq!(reader.bytes_per_locus, 1);
        Ok(())
    }

    #[test]
    fn malformed_fam_is_fatal() -> Result<()> {
        let (_tmpdir, bed_path) = write_fileset(&[], "", "F1 I1 0 0\n")?;
        assert!(BedReader::new(&bed_path, false).is_err());
        Ok(())
    }

    #[test]
    fn decode_two_bit_genotypes() -> Result<()> {
        // subject 1 in bits 0-1 (code 11 -> dosage 0), subject 2 in
        // bits 2-3 (code 00 -> dosage 2)
        let (_tmpdir, bed_path) = write_fileset(&[0b0000_0011], "1 rs1 0 100 A G\n", FAM)?;
        let mut reader = BedReader::new(&bed_path, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert_eq!((locus.chr, locus.pos), (ChrIdx(1), Position(100)));
        assert!(reader.deep_read(&mut locus)?);
        assert_eq!(locus.dosages, [0.0, 2.0]);
        assert!((locus.maf - 0.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn flip_swaps_homozygotes() -> Result<()> {
        let (_tmpdir, bed_path) = write_fileset(&[0b0000_1011], "1 rs1 0 100 A G\n", FAM)?;
        let mut reader = BedReader::new(&bed_path, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        locus.switch_ar = true;
        assert!(reader.deep_read(&mut locus)?);
        // code 11 -> 2 under flip; code 10 stays heterozygous
        assert_eq!(locus.dosages, [2.0, 1.0]);
        Ok(())
    }

    #[test]
    fn missing_needs_allow_missings() -> Result<()> {
        let bim = "1 rs1 0 100 A G\n";
        // subject 1 code 01 (missing), subject 2 code 10 (het)
        let (_tmpdir, bed_path) = write_fileset(&[0b0000_1001], bim, FAM)?;
        let mut strict = BedReader::new(&bed_path, false)?;
        let mut locus = Locus::default();
        assert!(strict.next_shallow(&mut locus)?);
        assert!(!strict.deep_read(&mut locus)?);

        let mut lenient = BedReader::new(&bed_path, true)?;
        assert!(lenient.next_shallow(&mut locus)?);
        assert!(lenient.deep_read(&mut locus)?);
        assert!(locus.dosages[0].is_nan());
        assert_eq!(locus.dosages[1], 1.0);
        Ok(())
    }

    #[test]
    fn skipped_loci_fast_forward_the_data_stream() -> Result<()> {
        let bim = "1 rs1 0 100 A G\n1 rs2 0 200 C T\n1 rs3 0 300 G A\n";
        // rs1: both hom-ref(00->2); rs2: both hom-alt(11->0); rs3: both het
        let payload = [0b0000_0000, 0b0000_1111, 0b0000_1010];
        let (_tmpdir, bed_path) = write_fileset(&payload, bim, FAM)?;
        let mut reader = BedReader::new(&bed_path, false)?;
        let mut locus = Locus::default();

        // skip rs1 and rs2 shallow, then deep read rs3
        assert!(reader.next_shallow(&mut locus)?);
        assert!(reader.next_shallow(&mut locus)?);
        assert!(reader.next_shallow(&mut locus)?);
        assert_eq!(locus.id, "rs3");
        assert!(reader.deep_read(&mut locus)?);
        assert_eq!(locus.dosages, [1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn second_deep_read_reports_duplicate() -> Result<()> {
        let (_tmpdir, bed_path) = write_fileset(&[0b0000_0000], "1 rs1 0 100 A G\n", FAM)?;
        let mut reader = BedReader::new(&bed_path, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert!(reader.deep_read(&mut locus)?);
        assert!(!reader.deep_read(&mut locus)?);
        Ok(())
    }
}
