use log::{debug, info};

/// Per-stream variant bookkeeping, accumulated by the coordinator and
/// reported once at the end of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocusCounts {
    /// Shallow records pulled from the stream.
    pub read           : usize,
    /// Records whose (chr, pos) coincided with the other stream's cursor.
    pub overlapping    : usize,
    pub non_overlapping: usize,
    /// Coincident records inside the active gene window.
    pub inside_regions : usize,
    pub outside_regions: usize,
    /// Records rejected by a filter, reconciliation or a failed deep read.
    pub skipped        : usize,
    /// Loci on which at least one missing dosage was filled.
    pub filled_missing : usize,
    /// Records that contributed to a score.
    pub used           : usize,
}

/// Which genotype stream a counter update applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Sample,
    Reference,
}

/// Counters for the two genotype streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunCounts {
    pub sample   : LocusCounts,
    pub reference: LocusCounts,
}

impl RunCounts {
    pub fn side_mut(&mut self, side: Side) -> &mut LocusCounts {
        match side {
            Side::Sample    => &mut self.sample,
            Side::Reference => &mut self.reference,
        }
    }

    /// Count a decision that affects both streams at once.
    pub fn each_mut(&mut self, apply: impl Fn(&mut LocusCounts)) {
        apply(&mut self.sample);
        apply(&mut self.reference);
    }

    /// Log the run summary: totals at Info, the breakdown at Debug.
    pub fn report(&self) {
        let totals = self.sample;
        let overlapping = self.sample.overlapping + self.reference.overlapping;
        let pct = |count: usize| match totals.read {
            0 => 0.0,
            _ => count as f64 * 100.0 / totals.read as f64,
        };

        info!("Sample statistics:\n  Loci read: {}\n  Loci used: {} ({:.3}%)",
              totals.read, totals.used, pct(totals.used));

        debug!("Overlapping: {} ({:.3}%)\n  \
                Skipped: {} ({:.3}%)\n  \
                Inside regions: {} ({:.3}%)\n  \
                Outside regions: {} ({:.3}%)\n  \
                With missings: {} ({:.3}%)",
               overlapping, pct(overlapping),
               totals.skipped, pct(totals.skipped),
               totals.inside_regions, pct(totals.inside_regions),
               totals.outside_regions, pct(totals.outside_regions),
               totals.filled_missing, pct(totals.filled_missing));
    }
}
