use std::{io::BufRead, path::{Path, PathBuf}};

use ahash::AHashMap;
use anyhow::{Context, Result};
use genome::{ChrIdx, Position, coordinate::chr_index::AUTOSOME_MAX};
use log::{debug, trace, warn};

use super::{fold_maf, Locus};
use crate::parse;

mod error;
pub use error::VcfReaderError;

/// Payload format of a VCF file, decided once from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VcfFormat {
    /// Colon-separated `DS` dosage field (preferred).
    Dosage,
    /// Hard-called `GT` genotypes.
    Genotype,
    /// Per-record DS-then-GT fallback, for PLINK-exported files.
    Hybrid,
}

/// Streaming reader over a `.vcf(.gz)` file.
///
/// Lines are parsed in two stages: `next_shallow` fills the locus metadata
/// from the nine fixed columns and stashes the per-subject payload;
/// `deep_read` consumes that payload once. A second `deep_read` without an
/// intervening `next_shallow` reports the record as duplicated.
pub struct VcfReader {
    source        : Box<dyn BufRead>,
    path          : PathBuf,
    subjects      : Vec<String>,
    format        : VcfFormat,
    payload       : Option<Vec<String>>,
    allow_missings: bool,
    good          : bool,
}

impl VcfReader {
    /// Open a VCF file and scan its header.
    ///
    /// # Errors
    /// - if the file cannot be opened
    /// - if no `#CHROM` header line or no subject columns are found
    /// - if the header declares none of the supported FORMAT ids.
    pub fn new(path: &Path, hard_calls: bool, allow_missings: bool) -> Result<VcfReader> {
        let mut source = parse::open(path)?;
        let (format, subjects) = Self::parse_header(&mut source, path, hard_calls)?;
        debug!("Opened file '{}'. Read mode: {format:?}. Found {} subjects.",
               path.display(), subjects.len());
        Ok(VcfReader {
            source,
            path: path.to_path_buf(),
            subjects,
            format,
            payload: None,
            allow_missings,
            good: true,
        })
    }

    /// Scan description lines up to `#CHROM`, recording the available FORMAT
    /// ids and whether the file was exported by PLINK.
    fn parse_header(
        source    : &mut Box<dyn BufRead>,
        path      : &Path,
        hard_calls: bool,
    ) -> Result<(VcfFormat, Vec<String>)> {
        use VcfReaderError::{MissingHeader, NoFormatTag, NoSubjects, UnsupportedFormat};

        let mut plink_source = false;
        let mut found_format_tag = false;
        let mut ds_available = false;
        let mut gt_available = false;
        let mut subjects: Option<Vec<String>> = None;

        let mut line = String::new();
        loop {
            line.clear();
            let n = source.read_line(&mut line)
                .with_context(|| format!("While scanning the header of '{}'", path.display()))?;
            if n == 0 {
                break;
            }

            if line.starts_with("##source=PLINK") {
                warn!("File '{}' was created by PLINK\n\
                       PLINK implementation of VCF files is broken, attempting work-around\n\
                       As a result, the options --hard-calls and --allow-missings are ignored\n\
                       To remove this warning and disable the work-around, remove any lines \
                       starting with '##source=PLINK' from the VCF file.", path.display());
                plink_source = true;
            }

            if line.starts_with("##FORMAT=") {
                found_format_tag = true;
                ds_available |= line.contains("ID=DS");
                gt_available |= line.contains("ID=GT");
                continue;
            }

            if line.starts_with("#CHROM") {
                let columns: Vec<&str> = line.split_whitespace().collect();
                if columns.len() < 10 {
                    return Err(NoSubjects(path.to_path_buf()).into());
                }
                subjects = Some(columns[9..].iter().map(|id| (*id).to_string()).collect());
                break;
            }
        }

        let Some(subjects) = subjects else {
            return Err(MissingHeader(path.to_path_buf()).into());
        };

        let format = if plink_source {
            VcfFormat::Hybrid
        } else if ds_available && !hard_calls {
            VcfFormat::Dosage
        } else if gt_available {
            VcfFormat::Genotype
        } else if !found_format_tag {
            return Err(NoFormatTag(path.to_path_buf()).into());
        } else {
            let wanted = match hard_calls { true => "GT", false => "GT, DS" };
            return Err(UnsupportedFormat(path.to_path_buf(), wanted).into());
        };

        Ok((format, subjects))
    }

    /// Advance to the next parseable data line.
    ///
    /// Lines with an unsupported chromosome code or too few columns are
    /// skipped silently, as in the rest of the ecosystem's VCF tooling.
    pub fn next_shallow(&mut self, locus: &mut Locus) -> Result<bool> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.source.read_line(&mut line)
                .with_context(|| format!("While reading from '{}'", self.path.display()))?;
            if n == 0 {
                self.good = false;
                return Ok(false);
            }
            if line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 9 {
                continue;
            }
            let Ok(chr) = fields[0].parse::<ChrIdx>() else { continue };
            let Ok(pos) = fields[1].parse::<Position>() else { continue };

            locus.chr = chr;
            locus.pos = pos;
            locus.id = fields[2].to_string();
            locus.reference = fields[3].to_ascii_uppercase();
            locus.alternate = fields[4].to_ascii_uppercase();
            locus.info = fields[7].to_string();
            locus.format = fields[8].to_string();
            locus.pinfo.clear();
            locus.clear();

            self.payload = Some(fields[9..].iter().map(|s| (*s).to_string()).collect());
            return Ok(true);
        }
    }

    /// Parse the stashed per-subject payload of the current record.
    pub fn deep_read(&mut self, locus: &mut Locus) -> Result<bool> {
        let Some(payload) = self.payload.take() else {
            debug!("In file '{}' locus {locus} appears to be duplicated. Skipping.",
                   self.path.display());
            return Ok(false);
        };
        if payload.len() != self.subjects.len() {
            warn!("Read {} individuals, expected {}: skipping locus {locus}",
                  payload.len(), self.subjects.len());
            return Ok(false);
        }
        let parsed = match self.format {
            VcfFormat::Dosage   => self.read_ds(locus, &payload),
            VcfFormat::Genotype => self.read_gt(locus, &payload),
            VcfFormat::Hybrid   => self.read_hybrid(locus, &payload),
        };
        Ok(parsed)
    }

    /// Hard-call mode: dosage is the per-subject count of first-alt alleles
    /// (of reference alleles when the locus is flipped). Haploid single-allele
    /// genotypes are allowed past the autosomes and shrink the MAF
    /// denominator by one allele each.
    fn read_gt(&self, locus: &mut Locus, payload: &[String]) -> bool {
        let Some(gt_idx) = field_index(&locus.format, "GT") else {
            return false;
        };

        locus.dosages.clear();
        let mut ds_sum = 0.0f64;
        let mut haploid = 0usize;

        for (subject, field) in self.subjects.iter().zip(payload) {
            let Some(genotype) = field.split(':').nth(gt_idx) else {
                warn!("In file '{}' subject {subject} has no GT entry for locus {locus}. Skipping.",
                      self.path.display());
                return false;
            };
            let alleles: Vec<&str> = genotype.split(['|', '/']).collect();
            if alleles.len() == 1 && locus.chr > ChrIdx(AUTOSOME_MAX) {
                haploid += 1;
            } else if alleles.len() != 2 {
                warn!("In file '{}' subject {subject} has incomplete data for locus {locus}. Skipping.",
                      self.path.display());
                return false;
            }

            let mut dosage = 0.0f32;
            let mut missing = false;
            for allele in &alleles {
                match *allele {
                    "." => {
                        trace!("vcf reader: missing data point for subject {subject}");
                        if !self.allow_missings {
                            return false;
                        }
                        missing = true;
                    }
                    "1" if !locus.switch_ar => dosage += 1.0,
                    "0" if locus.switch_ar  => dosage += 1.0,
                    other if other.bytes().all(|b| b.is_ascii_digit()) => (),
                    other => {
                        warn!("vcf reader: unexpected genotype entry in file '{}': '{other}'",
                              self.path.display());
                    }
                }
            }

            if missing {
                locus.dosages.push(f32::NAN);
            } else {
                locus.dosages.push(dosage);
                ds_sum += f64::from(dosage);
            }
        }

        let denominator = 2.0 * self.subjects.len() as f64 - haploid as f64;
        locus.maf = fold_maf(ds_sum / denominator);
        true
    }

    /// Dosage mode: extract the `DS` subfield and parse it as a float.
    /// Flipped loci read as `2 - dosage`.
    fn read_ds(&self, locus: &mut Locus, payload: &[String]) -> bool {
        let Some(ds_idx) = field_index(&locus.format, "DS") else {
            warn!("In file '{}' for {locus} no DS info found", self.path.display());
            return false;
        };

        locus.dosages.clear();
        let mut ds_sum = 0.0f64;
        for field in payload {
            let Some(raw) = field.split(':').nth(ds_idx) else {
                warn!("Failed to read {locus}: missing DS entry. Skipping locus.");
                return false;
            };
            let Ok(mut dosage) = raw.parse::<f32>() else {
                warn!("Failed to read {locus}");
                warn!("Something is wrong with the VCF file. Skipping locus.");
                return false;
            };
            if locus.switch_ar {
                dosage = 2.0 - dosage;
            }
            locus.dosages.push(dosage);
            ds_sum += f64::from(dosage);
        }

        locus.maf = fold_maf(ds_sum / (2.0 * self.subjects.len() as f64));
        true
    }

    /// PLINK work-around: resolve the FORMAT keys per record and try DS
    /// before falling back on GT for every subject.
    fn read_hybrid(&self, locus: &mut Locus, payload: &[String]) -> bool {
        let keys: Vec<&str> = locus.format.split(':').collect();

        locus.dosages.clear();
        let mut ds_sum = 0.0f64;
        for field in payload {
            let genotype: AHashMap<&str, &str> = keys.iter().copied().zip(field.split(':')).collect();

            let mut dosage: Option<f32> = genotype.get("DS").and_then(|raw| raw.parse().ok());
            if dosage.is_none() {
                dosage = genotype.get("GT").and_then(|raw| parse_hard_call(raw));
            }
            let Some(mut dosage) = dosage else {
                warn!("Failed to read {locus}");
                warn!("Something is wrong with the VCF file (gt). Skipping locus.");
                return false;
            };

            if locus.switch_ar {
                dosage = 2.0 - dosage;
            }
            locus.dosages.push(dosage);
            ds_sum += f64::from(dosage);
        }

        locus.maf = fold_maf(ds_sum / (2.0 * self.subjects.len() as f64));
        true
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

/// Index of `key` among the colon-separated FORMAT descriptors.
fn field_index(format: &str, key: &str) -> Option<usize> {
    format.split(':').position(|field| field == key)
}

/// Parse a diploid hard call like `0|1`, accepting only 0/1 alleles.
fn parse_hard_call(genotype: &str) -> Option<f32> {
    let bytes = genotype.as_bytes();
    if bytes.len() != 3 {
        return None;
    }
    let (left, right) = (bytes[0], bytes[2]);
    if !matches!(left, b'0' | b'1') || !matches!(right, b'0' | b'1') {
        return None;
    }
    Some(f32::from(left - b'0') + f32::from(right - b'0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    const GT_HEADER: &str = "##fileformat=VCFv4.2\n\
        ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

    const DS_HEADER: &str = "##fileformat=VCFv4.2\n\
        ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
        ##FORMAT=<ID=DS,Number=1,Type=Float,Description=\"Dosage\">\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

    fn vcf_reader(content: &str, hard_calls: bool, allow_missings: bool) -> Result<VcfReader> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("cohort.vcf");
        std::fs::File::create(&path)?.write_all(content.as_bytes())?;
        let reader = VcfReader::new(&path, hard_calls, allow_missings);
        tmpdir.close()?;
        reader
    }

    #[test]
    fn header_prefers_ds_over_gt() -> Result<()> {
        let reader = vcf_reader(DS_HEADER, false, false)?;
        assert_eq!(reader.format, VcfFormat::Dosage);
        assert_eq!(reader.subject_ids(), ["S1", "S2"]);
        Ok(())
    }

    #[test]
    fn hard_calls_force_gt() -> Result<()> {
        let reader = vcf_reader(DS_HEADER, true, false)?;
        assert_eq!(reader.format, VcfFormat::Genotype);
        Ok(())
    }

    #[test]
    fn plink_source_forces_hybrid() -> Result<()> {
        let content = format!("##source=PLINKv1.90\n{DS_HEADER}");
        let reader = vcf_reader(&content, false, false)?;
        assert_eq!(reader.format, VcfFormat::Hybrid);
        Ok(())
    }

    #[test]
    fn header_without_subjects_is_fatal() {
        let content = "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"x\">\n\
                       #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\n";
        assert!(vcf_reader(content, false, false).is_err());
    }

    #[test]
    fn header_without_format_tag_is_fatal() {
        let content = "##fileformat=VCFv4.2\n\
                       #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";
        assert!(vcf_reader(content, false, false).is_err());
    }

    #[test]
    fn shallow_parse_normalises_fields() -> Result<()> {
        let content = format!("{GT_HEADER}chrX\t154426970\trs123\ta\tg\t.\tPASS\tAF=0.2\tGT\t0/1\t1/1\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert_eq!(locus.chr, ChrIdx(23));
        assert_eq!(locus.pos, Position(154_426_970));
        assert_eq!(locus.reference, "A");
        assert_eq!(locus.alternate, "G");
        assert_eq!(locus.format, "GT");
        assert!(!reader.next_shallow(&mut locus)?);
        assert!(!reader.is_good());
        Ok(())
    }

    #[test]
    fn shallow_skips_invalid_chromosomes() -> Result<()> {
        let content = format!("{GT_HEADER}\
            GL000195.1\t10\trs0\tA\tG\t.\t.\t.\tGT\t0/0\t0/0\n\
            1\t100\trs1\tA\tG\t.\t.\t.\tGT\t0/0\t1/1\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert_eq!(locus.pos, Position(100));
        Ok(())
    }

    #[test]
    fn gt_deep_read_counts_alt_alleles() -> Result<()> {
        let content = format!("{GT_HEADER}1\t100\trs1\tA\tG\t.\t.\t.\tGT:DP\t0|0:12\t1/1:10\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert!(reader.deep_read(&mut locus)?);
        assert_eq!(locus.dosages, [0.0, 2.0]);
        assert!((locus.maf - 0.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn gt_deep_read_respects_flip() -> Result<()> {
        let content = format!("{GT_HEADER}1\t100\trs1\tG\tA\t.\t.\t.\tGT\t1/1\t0/0\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        locus.parse_alt();
        locus.switch_alt_ref();
        assert!(reader.deep_read(&mut locus)?);
        assert_eq!(locus.dosages, [0.0, 2.0]);
        Ok(())
    }

    #[test]
    fn gt_missing_rejected_unless_allowed() -> Result<()> {
        let line = "1\t100\trs1\tA\tG\t.\t.\t.\tGT\t./.\t1/1\n";

        let mut strict = vcf_reader(&format!("{GT_HEADER}{line}"), false, false)?;
        let mut locus = Locus::default();
        assert!(strict.next_shallow(&mut locus)?);
        assert!(!strict.deep_read(&mut locus)?);

        let mut lenient = vcf_reader(&format!("{GT_HEADER}{line}"), false, true)?;
        assert!(lenient.next_shallow(&mut locus)?);
        assert!(lenient.deep_read(&mut locus)?);
        assert!(locus.dosages[0].is_nan());
        assert_eq!(locus.dosages[1], 2.0);
        Ok(())
    }

    #[test]
    fn haploid_genotypes_allowed_past_autosomes() -> Result<()> {
        let content = format!("{GT_HEADER}X\t100\trs1\tA\tG\t.\t.\t.\tGT\t1\t0/1\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert!(reader.deep_read(&mut locus)?);
        assert_eq!(locus.dosages, [1.0, 1.0]);
        // denominator: 2 * 2 subjects - 1 haploid allele; 2/3 folds to 1/3
        assert!((locus.maf - (1.0 / 3.0)).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn haploid_genotypes_rejected_on_autosomes() -> Result<()> {
        let content = format!("{GT_HEADER}1\t100\trs1\tA\tG\t.\t.\t.\tGT\t1\t0/1\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert!(!reader.deep_read(&mut locus)?);
        Ok(())
    }

    #[test]
    fn ds_deep_read_parses_dosages() -> Result<()> {
        let content = format!("{DS_HEADER}1\t100\trs1\tA\tG\t.\t.\t.\tGT:DS\t0/1:0.9\t1/1:1.8\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert!(reader.deep_read(&mut locus)?);
        assert_eq!(locus.dosages, [0.9, 1.8]);
        assert!((locus.maf - (1.0 - 2.7 / 4.0)).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn ds_deep_read_respects_flip() -> Result<()> {
        let content = format!("{DS_HEADER}1\t100\trs1\tG\tA\t.\t.\t.\tGT:DS\t0/1:0.5\t1/1:2\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        locus.parse_alt();
        locus.switch_alt_ref();
        assert!(reader.deep_read(&mut locus)?);
        assert_eq!(locus.dosages, [1.5, 0.0]);
        Ok(())
    }

    #[test]
    fn second_deep_read_reports_duplicate() -> Result<()> {
        let content = format!("{GT_HEADER}1\t100\trs1\tA\tG\t.\t.\t.\tGT\t0/0\t1/1\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert!(reader.deep_read(&mut locus)?);
        assert!(!reader.deep_read(&mut locus)?);
        Ok(())
    }

    #[test]
    fn hybrid_tries_ds_then_gt() -> Result<()> {
        let content = format!("##source=PLINKv1.90\n{DS_HEADER}\
            1\t100\trs1\tA\tG\t.\t.\t.\tGT:DS\t0/1:bad\t1/1:1.7\n");
        let mut reader = vcf_reader(&content, false, false)?;
        let mut locus = Locus::default();
        assert!(reader.next_shallow(&mut locus)?);
        assert!(reader.deep_read(&mut locus)?);
        assert_eq!(locus.dosages, [1.0, 1.7]);
        Ok(())
    }

    #[test]
    fn format_field_indexing() {
        assert_eq!(field_index("GT:AD:DS", "DS"), Some(2));
        assert_eq!(field_index("GT:AD:DS", "GT"), Some(0));
        assert_eq!(field_index("GT:AD", "DS"), None);
    }

    #[test]
    fn hard_call_parsing() {
        assert_eq!(parse_hard_call("0/1"), Some(1.0));
        assert_eq!(parse_hard_call("1|1"), Some(2.0));
        assert_eq!(parse_hard_call("./."), None);
        assert_eq!(parse_hard_call("2/0"), None);
        assert_eq!(parse_hard_call("0"), None);
    }
}
