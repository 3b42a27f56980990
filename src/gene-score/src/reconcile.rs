use qgs_io::read::Locus;

/// Outcome of aligning a sample locus against the reference locus sharing
/// its (chromosome, position).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleAlignment {
    /// Orientations agree; proceed as-is.
    Concordant,
    /// The sample's ref/alt are swapped relative to the reference. The
    /// caller must flip the sample orientation and drop the score-window
    /// entry recorded under the stale ref key.
    Flipped,
    /// Either side carries no alt alleles.
    MissingAlt,
    /// Unresolvable ref/alt disagreement; the locus pair is unusable.
    Mismatch,
}

/// Decide how the sample orientation relates to the reference orientation.
///
/// Parses both alt lists as a side effect and mutates nothing else; acting
/// on the decision (flip, clear, skip) is the coordinator's job.
pub fn reconcile(sample: &mut Locus, reference: &mut Locus) -> AlleleAlignment {
    sample.parse_alt();
    reference.parse_alt();

    if sample.palt.is_empty() || reference.palt.is_empty() {
        return AlleleAlignment::MissingAlt;
    }
    if sample.reference != reference.reference
        && sample.reference == reference.palt[0]
        && reference.reference == sample.palt[0]
    {
        return AlleleAlignment::Flipped;
    }
    if sample.reference != reference.reference || sample.palt[0] != reference.palt[0] {
        return AlleleAlignment::Mismatch;
    }
    AlleleAlignment::Concordant
}
