use std::path::Path;

use ahash::{AHashMap, AHashSet};
use log::trace;
use qgs_io::read::{gene::GeneBlock, snplist, Locus};

/// AND-composed `key=value` constraints over gene attributes.
#[derive(Debug, Default)]
pub struct GtfFilter {
    constraints: AHashMap<String, String>,
}

impl GtfFilter {
    /// Build from raw `key=value` arguments; tokens without a `=` are ignored.
    #[must_use]
    pub fn from_pairs(pairs: &[String]) -> GtfFilter {
        let constraints = pairs.iter()
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        GtfFilter { constraints }
    }

    /// True when the gene carries every constrained attribute with the
    /// constrained value.
    #[must_use]
    pub fn pass(&self, gene: &GeneBlock) -> bool {
        for (key, want) in &self.constraints {
            match gene.attr.get(key) {
                None => {
                    trace!("Region does not have info for gtf-filter '{key}': skipping");
                    return false;
                }
                Some(value) if value != want => {
                    trace!("Region fails gtf-filter '{key}={want}' (has value '{value}'): skipping");
                    return false;
                }
                Some(_) => (),
            }
        }
        true
    }
}

/// Variant include/exclude set, matched by id with a `chr:pos` fallback.
///
/// An empty member set deactivates the filter, so a missing or empty snp
/// file degrades to "no filter" after its warning instead of rejecting
/// every locus.
#[derive(Debug, Default)]
pub struct VariantFilter {
    members: AHashSet<String>,
    include: bool,
}

impl VariantFilter {
    /// Build from the (already precedence-resolved) CLI paths: at most one of
    /// `include`/`exclude` is expected to be set.
    #[must_use]
    pub fn from_paths(include: Option<&Path>, exclude: Option<&Path>) -> VariantFilter {
        match (include, exclude) {
            (Some(path), _) => VariantFilter {
                members: snplist::read_variant_set(path),
                include: true,
            },
            (None, Some(path)) => VariantFilter {
                members: snplist::read_variant_set(path),
                include: false,
            },
            (None, None) => VariantFilter::default(),
        }
    }

    /// True when the locus passes: membership is required in include mode
    /// and disqualifying in exclude mode.
    #[must_use]
    pub fn pass(&self, locus: &Locus) -> bool {
        if self.members.is_empty() {
            return true;
        }
        let member = self.members.contains(&locus.id)
            || self.members.contains(&format!("{}:{}", locus.chr, locus.pos));
        member == self.include
    }
}
