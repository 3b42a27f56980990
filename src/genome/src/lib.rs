pub mod coordinate;
pub use coordinate::{ChrIdx, ChrIdxError, Coordinate, ParsePositionError, Position};

pub mod strand;
pub use strand::Strand;
