use std::collections::BTreeMap;

use genome::{ChrIdx, Coordinate, Position};

/// Scores and bookkeeping for one (chromosome, position, ref-allele) key.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Per-subject dosage distances. Empty while the variant has only been
    /// observed shallow.
    pub scores: Vec<f32>,
    pub weight: f32,
    /// `sample-id/reference-id` of the pair that produced the scores.
    pub id    : String,
}

impl Default for Entry {
    fn default() -> Self {
        Self { scores: Vec::new(), weight: 1.0, id: String::new() }
    }
}

impl Entry {
    /// True when the variant was observed but never scored.
    #[must_use]
    pub fn is_shallow(&self) -> bool {
        self.scores.is_empty()
    }
}

type AlleleMap = BTreeMap<String, Entry>;

/// Bounded in-memory window of per-variant scores, ordered by coordinate so
/// completed genes can be flushed by prefix.
///
/// Entries are keyed chromosome → position → ref-allele. Shallow recording
/// keeps the first entry per key, so a duplicated variant can never wipe a
/// computed score.
#[derive(Debug, Default)]
pub struct ScoreWindow {
    chromosomes: BTreeMap<ChrIdx, BTreeMap<Position, AlleleMap>>,
}

impl ScoreWindow {
    /// Record a shallow observation; an existing entry is left untouched.
    pub fn touch(&mut self, coordinate: Coordinate, ref_allele: &str) {
        self.allele_map(coordinate).entry(ref_allele.to_string()).or_default();
    }

    /// Mutable access to the entry at a key, creating it if needed.
    pub fn entry_mut(&mut self, coordinate: Coordinate, ref_allele: &str) -> &mut Entry {
        self.allele_map(coordinate).entry(ref_allele.to_string()).or_default()
    }

    fn allele_map(&mut self, coordinate: Coordinate) -> &mut AlleleMap {
        self.chromosomes
            .entry(coordinate.chromosome)
            .or_default()
            .entry(coordinate.position)
            .or_default()
    }

    /// Drop the entry recorded under a stale ref-allele key, if any.
    pub fn remove_allele(&mut self, coordinate: Coordinate, ref_allele: &str) {
        if let Some(positions) = self.chromosomes.get_mut(&coordinate.chromosome) {
            if let Some(alleles) = positions.get_mut(&coordinate.position) {
                alleles.remove(ref_allele);
            }
        }
    }

    /// Prefix-erase: drop every position before `start` on `chr`, along with
    /// every chromosome before `chr`. The gene stream is monotonic on
    /// (chromosome, start), so the dropped keys can never be aggregated.
    pub fn flush_before(&mut self, chr: ChrIdx, start: Position) {
        self.chromosomes.retain(|window_chr, _| *window_chr >= chr);
        if let Some(positions) = self.chromosomes.get_mut(&chr) {
            *positions = positions.split_off(&start);
        }
    }

    /// Iterate entries on `chr` at positions up to and including `stop`, in
    /// (position, ref-allele) order.
    pub fn region(&self, chr: ChrIdx, stop: Position) -> impl Iterator<Item = (Position, &str, &Entry)> + '_ {
        self.chromosomes.get(&chr).into_iter().flat_map(move |positions| {
            positions.range(..=stop).flat_map(|(pos, alleles)| {
                alleles.iter().map(|(allele, entry)| (*pos, allele.as_str(), entry))
            })
        })
    }

    /// Number of distinct positions currently held, across chromosomes.
    #[must_use]
    pub fn loci_in_memory(&self) -> usize {
        self.chromosomes.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chromosomes.values().all(BTreeMap::is_empty)
    }
}
