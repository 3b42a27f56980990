use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot open '{0}' for reading: {1}")]
    OpenFile(PathBuf, #[source] std::io::Error),

    #[error("cannot open '{0}' for writing: {1}")]
    CreateFile(PathBuf, #[source] std::io::Error),
}
