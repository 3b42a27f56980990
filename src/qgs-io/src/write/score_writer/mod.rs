use std::{
    fmt::Write as _,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use genome::{ChrIdx, Position};

use crate::parse;

mod error;
pub use error::ScoreWriterError;

/// Fixed columns preceding the per-subject score cells.
pub const FIXED_COLUMNS: [&str; 9] = [
    "gene_name", "gene_id", "chr", "start", "stop",
    "Nsample", "Nref", "num_loci", "total_num_loci",
];

/// One finished gene row, ready for formatting.
///
/// `loci` holds either the used-loci count or, under `--output-variants`,
/// the `|`-joined list of variants that contributed. `start` and `stop` are
/// the flank-adjusted window bounds.
#[derive(Debug, Clone, Default)]
pub struct GeneResult {
    pub gene_name     : String,
    pub gene_id       : String,
    pub chr           : ChrIdx,
    pub start         : Position,
    pub stop          : Position,
    pub n_sample      : usize,
    pub n_ref         : usize,
    pub loci          : String,
    pub total_num_loci: usize,
    pub scores        : Vec<f64>,
}

/// Delimited text writer for gene score rows. A `.gz` output path
/// gz-compresses transparently.
///
/// Every row is flushed on write, so an output failure aborts the run at the
/// offending gene instead of at the final flush.
pub struct ScoreWriter {
    sink     : BufWriter<Box<dyn Write>>,
    delimiter: char,
    path     : PathBuf,
}

impl ScoreWriter {
    /// Create (or overwrite) the output file.
    ///
    /// # Errors
    /// if `path` is not writeable for the current user.
    pub fn create(path: &Path, delimiter: char) -> Result<ScoreWriter> {
        let sink = BufWriter::new(parse::create(path)?);
        Ok(ScoreWriter { sink, delimiter, path: path.to_path_buf() })
    }

    /// Write the header row: fixed columns, then one column per subject.
    pub fn write_header<'a>(&mut self, subjects: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let mut row = FIXED_COLUMNS.join(&self.delimiter.to_string());
        for subject in subjects {
            row.push(self.delimiter);
            row.push_str(subject);
        }
        self.write_row(&row)
    }

    /// Write one gene row. NaN cells serialise as the literal `NaN`.
    pub fn write_gene(&mut self, gene: &GeneResult) -> Result<()> {
        let d = self.delimiter;
        let mut row = format!(
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            gene.gene_name, gene.gene_id, gene.chr, gene.start, gene.stop,
            gene.n_sample, gene.n_ref, gene.loci, gene.total_num_loci,
        );
        for score in &gene.scores {
            match score.is_nan() {
                true  => { let _ = write!(row, "{d}NaN"); }
                false => { let _ = write!(row, "{d}{score}"); }
            }
        }
        self.write_row(&row)
    }

    fn write_row(&mut self, row: &str) -> Result<()> {
        let path = self.path.clone();
        writeln!(self.sink, "{row}")
            .map_err(|e| ScoreWriterError::WriteFailure(path.clone(), e))
            .with_context(|| format!("Failed to write to '{}'", path.display()))?;
        self.sink.flush()
            .map_err(|e| ScoreWriterError::WriteFailure(path.clone(), e))
            .with_context(|| format!("Failed to write to '{}'", path.display()))
    }
}
