use thiserror::Error;

#[derive(Debug, Error)]
pub enum VariantReaderError {
    #[error("no input file provided")]
    MissingInput,
}
