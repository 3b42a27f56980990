use genome::Coordinate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeneReaderError {
    #[error("gene database is not sorted on (chromosome, start): region at {next} follows region at {prev}")]
    OutOfOrder { prev: Coordinate, next: Coordinate },
}
