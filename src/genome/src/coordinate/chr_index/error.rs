use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChrIdxError {
    #[error("'{0}' is not a valid chromosome code")]
    ParseChr(String),

    #[error("chromosome code {0} lies outside the accepted 1..=26 range")]
    OutOfRange(u8),
}
