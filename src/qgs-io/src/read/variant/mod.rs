use std::{fmt::{self, Display, Formatter}, path::PathBuf};

use ahash::AHashMap;
use anyhow::Result;
use genome::{ChrIdx, Coordinate, Position};
use log::debug;

pub mod vcf;
pub use vcf::VcfReader;

pub mod bed;
pub use bed::BedReader;

pub mod dosage;
pub use dosage::DosageReader;

mod error;
pub use error::VariantReaderError;

/// One row of a genotype file.
///
/// A locus is *shallow* right after `next_shallow` (metadata only, cheap to
/// compare and skip) and *deep* once `deep_read` has filled `dosages`. The
/// coordinator keeps one locus per stream and reuses it as the cursor.
#[derive(Debug, Clone, Default)]
pub struct Locus {
    pub chr      : ChrIdx,
    pub pos      : Position,
    pub id       : String,
    /// Reference allele. Swapped with `palt[0]` when `switch_ar` is raised.
    pub reference: String,
    /// Comma-joined alternate allele string, as read.
    pub alternate: String,
    /// `alternate`, split. Empty until `parse_alt`.
    pub palt     : Vec<String>,
    /// Raw INFO column (VCF only).
    pub info     : String,
    /// INFO key/value pairs. Empty until `parse_info`.
    pub pinfo    : AHashMap<String, String>,
    /// FORMAT column (VCF only).
    pub format   : String,
    /// Folded minor-allele frequency, filled by `deep_read`.
    pub maf      : f64,
    /// Orientation flip: dosages are reinterpreted as `2 - dosage`.
    pub switch_ar: bool,
    /// Per-subject dosages in [0, 2], NaN for missing. Filled by `deep_read`.
    pub dosages  : Vec<f32>,
}

impl Locus {
    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.chr, self.pos)
    }

    /// Split the comma-joined alt string into `palt`.
    pub fn parse_alt(&mut self) {
        self.palt = self.alternate
            .split(',')
            .filter(|alt| !alt.is_empty())
            .map(str::to_string)
            .collect();
    }

    /// Parse the `;`-separated `key=value` INFO column into `pinfo`.
    /// Flags without a value are ignored.
    pub fn parse_info(&mut self) {
        for item in self.info.split(';') {
            if let Some((key, value)) = item.split_once('=') {
                self.pinfo.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Raise the orientation flip and swap ref with the first alt, so the
    /// locus is keyed under the canonical (reference-panel) orientation.
    pub fn switch_alt_ref(&mut self) {
        self.switch_ar = true;
        if let Some(first_alt) = self.palt.first_mut() {
            std::mem::swap(first_alt, &mut self.reference);
        }
    }

    /// Reset the per-locus derived state. The (chr, pos) cursor survives.
    pub fn clear(&mut self) {
        self.maf = 0.0;
        self.switch_ar = false;
        self.palt.clear();
        self.dosages.clear();
    }
}

impl Display for Locus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} [{}]", self.chr, self.pos, self.id)
    }
}

/// Fold an allele frequency onto the minor side.
pub(crate) fn fold_maf(frequency: f64) -> f64 {
    match frequency > 0.5 {
        true  => 1.0 - frequency,
        false => frequency,
    }
}

/// Streaming reader over one of the three supported genotype formats.
///
/// One selection happens per input, so the per-record dispatch is a plain
/// match over the variants rather than dynamic dispatch.
pub enum VariantReader {
    Vcf(VcfReader),
    Bed(BedReader),
    Dosage(DosageReader),
}

impl VariantReader {
    /// Select a format from the input path(s) and open the reader.
    ///
    /// More than one path means PLINK dosage; a single path selects on its
    /// suffix (`.dosage(.gz)`, `.bed(.gz)`), defaulting to VCF.
    ///
    /// # Errors
    /// if no path was provided, or the selected reader fails to initialise.
    pub fn open(paths: &[PathBuf], hard_calls: bool, allow_missings: bool) -> Result<VariantReader> {
        let Some(first) = paths.first() else {
            return Err(VariantReaderError::MissingInput.into());
        };
        if paths.len() > 1 {
            debug!("Assuming files '{}' etc are plink dosage format.", first.display());
            return Ok(Self::Dosage(DosageReader::open_all(paths)?));
        }

        let name = first.to_string_lossy();
        if name.ends_with(".dosage") || name.ends_with(".dosage.gz") {
            debug!("Assuming file '{name}' is plink dosage format.");
            Ok(Self::Dosage(DosageReader::open_all(paths)?))
        } else if name.ends_with(".bed") || name.ends_with(".bed.gz") {
            debug!("Assuming input file '{name}' is PLINK BED format.");
            Ok(Self::Bed(BedReader::new(first, allow_missings)?))
        } else {
            debug!("Assuming input file '{name}' is VCF format (default).");
            Ok(Self::Vcf(VcfReader::new(first, hard_calls, allow_missings)?))
        }
    }

    /// Advance to the next record, filling `locus` with metadata only.
    /// Ok(false) once the stream is exhausted.
    pub fn next_shallow(&mut self, locus: &mut Locus) -> Result<bool> {
        match self {
            Self::Vcf(reader)    => reader.next_shallow(locus),
            Self::Bed(reader)    => reader.next_shallow(locus),
            Self::Dosage(reader) => reader.next_shallow(locus),
        }
    }

    /// Parse the dosage payload of the current record into `locus.dosages`
    /// and compute its MAF. Ok(false) rejects the locus (duplicate position,
    /// disallowed missing data, or a malformed payload).
    pub fn deep_read(&mut self, locus: &mut Locus) -> Result<bool> {
        match self {
            Self::Vcf(reader)    => reader.deep_read(locus),
            Self::Bed(reader)    => reader.deep_read(locus),
            Self::Dosage(reader) => reader.deep_read(locus),
        }
    }

    /// False once the underlying stream(s) hit end of input.
    #[must_use]
    pub fn is_good(&self) -> bool {
        match self {
            Self::Vcf(reader)    => reader.is_good(),
            Self::Bed(reader)    => reader.is_good(),
            Self::Dosage(reader) => reader.is_good(),
        }
    }

    #[must_use]
    pub fn num_subjects(&self) -> usize {
        self.subject_ids().len()
    }

    #[must_use]
    pub fn subject_id(&self, idx: usize) -> &str {
        &self.subject_ids()[idx]
    }

    /// Subject identifiers, in dosage-vector order.
    #[must_use]
    pub fn subject_ids(&self) -> &[String] {
        match self {
            Self::Vcf(reader)    => reader.subject_ids(),
            Self::Bed(reader)    => reader.subject_ids(),
            Self::Dosage(reader) => reader.subject_ids(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_alt_splits_on_commas() {
        let mut locus = Locus { alternate: "G,T".to_string(), ..Locus::default() };
        locus.parse_alt();
        assert_eq!(locus.palt, ["G", "T"]);

        locus.alternate = String::new();
        locus.parse_alt();
        assert!(locus.palt.is_empty());
    }

    #[test]
    fn parse_info_keeps_keyed_entries() {
        let mut locus = Locus { info: "AF=0.5;DB;R2=0.97".to_string(), ..Locus::default() };
        locus.parse_info();
        assert_eq!(locus.pinfo.get("AF").map(String::as_str), Some("0.5"));
        assert_eq!(locus.pinfo.get("R2").map(String::as_str), Some("0.97"));
        assert_eq!(locus.pinfo.get("DB"), None);
    }

    #[test]
    fn switch_alt_ref_swaps_orientation() {
        let mut locus = Locus {
            reference: "G".to_string(),
            alternate: "A".to_string(),
            ..Locus::default()
        };
        locus.parse_alt();
        locus.switch_alt_ref();
        assert!(locus.switch_ar);
        assert_eq!(locus.reference, "A");
        assert_eq!(locus.palt[0], "G");
    }

    #[test]
    fn clear_keeps_the_cursor() {
        let mut locus = Locus {
            chr: ChrIdx(5), pos: Position(42),
            maf: 0.3, switch_ar: true,
            dosages: vec![1.0, 2.0],
            ..Locus::default()
        };
        locus.clear();
        assert_eq!(locus.chr, ChrIdx(5));
        assert_eq!(locus.pos, Position(42));
        assert!(locus.dosages.is_empty());
        assert!(!locus.switch_ar);
    }

    #[test]
    fn maf_folding() {
        assert!((fold_maf(0.7) - 0.3).abs() < 1e-9);
        assert!((fold_maf(0.5) - 0.5).abs() < 1e-9);
        assert!((fold_maf(0.1) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn open_requires_input() {
        assert!(VariantReader::open(&[], false, false).is_err());
    }
}
