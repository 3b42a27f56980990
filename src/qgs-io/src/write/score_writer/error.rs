use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreWriterError {
    #[error("failed to write to '{0}': {1}")]
    WriteFailure(PathBuf, #[source] std::io::Error),
}
