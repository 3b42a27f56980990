use std::path::{Path, PathBuf};
use clap::Parser;

use serde::Serialize;

use log::{info, warn};

use anyhow::Result;

use crate::error::ParserError;

/// Compute per-gene quantitative genetic scores from streaming genotype data.
///
/// For every region of the gene database, the distance between each cohort
/// subject and the reference panel is aggregated over the variants falling
/// within the region's (flanked) window, and written as one delimited row.
#[derive(Parser, Debug, Serialize)]
#[clap(name = "qgs", version)]
pub struct Cli {
    /// Path to cohort input file(s).
    ///
    /// A single VCF or PLINK BED file, or one or more PLINK dosage files.
    /// May be gz-compressed.
    #[clap(long, required(true), multiple_values(true))]
    pub sample: Vec<PathBuf>,
    /// Path to the reference panel file, in VCF format. May be gz-compressed.
    #[clap(long, required(true))]
    pub reference: PathBuf,
    /// Path to the gene database, in Gene Transfer Format. May be gz-compressed.
    ///
    /// Regions must be sorted on (chromosome, start).
    #[clap(long, required(true))]
    pub genes: PathBuf,
    /// Filename for the writeable output file.
    ///
    /// Any existing file will be overwritten without warning. A '.gz' suffix
    /// gz-compresses the output.
    #[clap(long, required(true))]
    pub out: PathBuf,
    /// Symmetrical flanking region in kb, applied around every gene.
    #[clap(long, default_value("0"))]
    pub flank: u64,
    /// Asymmetrical flanking region in kb, before the region start. Overrides --flank.
    #[clap(long)]
    pub pre_flank: Option<u64>,
    /// Asymmetrical flanking region in kb, past the region stop. Overrides --flank.
    #[clap(long)]
    pub post_flank: Option<u64>,
    /// Minor allele frequency threshold.
    ///
    /// Loci whose MAF lies below the threshold on either the sample or the
    /// reference side are excluded from scoring.
    #[clap(long, default_value("0.01"))]
    pub maf: f64,
    /// key=value pair(s) for filtering the gene file.
    ///
    /// All constraints must match a region's attributes for it to be scored,
    /// e.g. '--gtf-filter type=gene gene_type=protein_coding'
    #[clap(long, multiple_values(true))]
    pub gtf_filter: Vec<String>,
    /// File name of whitespace-separated snp-names for snps to include.
    ///
    /// Snps not in the file will be excluded.
    #[clap(long)]
    pub include_snps: Option<PathBuf>,
    /// File name of whitespace-separated snp-names for snps to exclude.
    ///
    /// Snps in the file will be excluded.
    #[clap(long)]
    pub exclude_snps: Option<PathBuf>,
    /// Chromosome to include, numeric value. X = 23, Y = 24, MT = 25
    #[clap(long)]
    pub chr: Option<u8>,
    /// Force the program to use hard calls (GT) instead of DS data in VCF input.
    #[clap(long)]
    pub hard_calls: bool,
    /// Include loci with missing data points, printing 'NaN' for those subjects.
    #[clap(long)]
    pub allow_missings: bool,
    /// Include loci with missing data points, assuming homozygous-ref for any
    /// missing genotype. Implies --allow-missings.
    #[clap(long)]
    pub fill_missings: bool,
    /// Weighted scores. VCF INFO field name which contains the weight for
    /// each locus, e.g. '--weight-by R2'.
    #[clap(long)]
    pub weight_by: Option<String>,
    /// Replace the standard comma output delimiter. Must be a single character.
    #[clap(long, default_value(","))]
    pub delimiter: String,
    /// Include the variants used for each score in the output file, in place
    /// of the used-loci count column.
    #[clap(long)]
    pub output_variants: bool,
    /// Give more verbose output.
    #[clap(long)]
    pub verbose: bool,
    /// Give a lot more verbose output.
    #[clap(long)]
    pub debug: bool,
    /// Give all possible output (warning: a lot).
    #[clap(long)]
    pub trace: bool,
}

impl Cli {
    /// Echo the parsed arguments, so every log records the exact invocation.
    pub fn serialize(&self) {
        if let Ok(yaml) = serde_yaml::to_string(&self) {
            info!("\n---- Command line args ----\n{}\n---", yaml);
        }
    }

    /// Logging verbosity for `logger::Logger::init`.
    #[must_use]
    pub fn verbosity(&self) -> u8 {
        if self.trace        { 3 }
        else if self.debug   { 2 }
        else if self.verbose { 1 }
        else                 { 0 }
    }

    /// The output delimiter as a single character.
    ///
    /// # Errors
    /// if the user provided anything other than exactly one character.
    pub fn delimiter(&self) -> Result<char> {
        let mut chars = self.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(delimiter), None) => Ok(delimiter),
            _ => Err(ParserError::InvalidDelimiter(self.delimiter.clone()).into()),
        }
    }

    /// Effective (pre, post) flanking distances in base pairs.
    ///
    /// CLI flank values are kilobases; asymmetrical overrides fall back on
    /// the symmetrical `--flank` when unset.
    #[must_use]
    pub fn flanks(&self) -> (u64, u64) {
        let pre  = self.pre_flank.unwrap_or(self.flank);
        let post = self.post_flank.unwrap_or(self.flank);
        (pre * 1000, post * 1000)
    }

    /// Whether missing sample data points are tolerated.
    #[must_use]
    pub fn allow_missings(&self) -> bool {
        self.allow_missings || self.fill_missings
    }

    /// The variant-set file to apply, with include taking precedence when
    /// the user provided both.
    #[must_use]
    pub fn variant_set(&self) -> (Option<&Path>, Option<&Path>) {
        if self.include_snps.is_some() && self.exclude_snps.is_some() {
            warn!("Both --include-snps and --exclude-snps have been set. \
                   This is not possible. --exclude-snps will be ignored.");
            return (self.include_snps.as_deref(), None);
        }
        (self.include_snps.as_deref(), self.exclude_snps.as_deref())
    }
}
