use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BedReaderError {
    #[error("input file '{0}' not recognised as PLINK BED format, or in id-major format. \
             Maybe your PLINK version is out of date (or too new?)")]
    BadMagic(PathBuf),

    #[error("cannot find {ext} file of '{path}'")]
    MissingSibling { path: PathBuf, ext: &'static str },

    #[error("PLINK fam file '{path}' read error on line {line}: cannot parse subject")]
    MalformedFam { path: PathBuf, line: usize },
}
