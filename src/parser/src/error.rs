use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("--delimiter must be a single character (got '{0}')")]
    InvalidDelimiter(String),
}
