use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcfReaderError {
    #[error("no samples found in file '{0}': can't use input file")]
    NoSubjects(PathBuf),

    #[error("no #CHROM header line found in file '{0}'")]
    MissingHeader(PathBuf),

    #[error("VCF file '{0}' does not contain a FORMAT tag in the header. Add one.")]
    NoFormatTag(PathBuf),

    #[error("no supported data format ({1}) found in file '{0}': can't use input file")]
    UnsupportedFormat(PathBuf, &'static str),
}
