pub mod score_writer;
pub use score_writer::{GeneResult, ScoreWriter};
