pub mod gene;
pub use gene::{GeneBlock, GeneReader};

pub mod variant;
pub use variant::{Locus, VariantReader};

pub mod snplist;
