use genome::Coordinate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DosageReaderError {
    #[error("cannot find map file of '{0}'")]
    MissingMap(PathBuf),

    #[error("file '{0}' does not have any samples")]
    NoSubjects(PathBuf),

    #[error("none of the dosage input files carries a usable 'SNP A1 A2 …' header")]
    NoUsableInput,

    #[error("file '{0}' has different subjects than the previous file: can't proceed")]
    SubjectMismatch(PathBuf),

    #[error("file '{path}' line {line} has wrong locus order: {next} follows {prev}")]
    OutOfOrder { path: PathBuf, line: usize, prev: Coordinate, next: Coordinate },

    #[error("reading locus {id} in '{path}' we discovered our initial guess of 0-1 dosages \
             was incorrect. Please discard current results and rerun with dosage specified.")]
    ScaleContradiction { path: PathBuf, id: String },

    #[error("dosage file '{path}' contains genotype probabilities outside [0, 1] on line {line}")]
    ProbabilityOutOfRange { path: PathBuf, line: usize },
}
