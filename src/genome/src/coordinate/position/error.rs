use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' is not a valid base-pair position")]
pub struct ParsePositionError(pub String);
