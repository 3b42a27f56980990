use ahash::AHashMap;
use ordered_float::OrderedFloat;
use qgs_io::read::Locus;

/// Per-subject dosage distance between one sample locus and the reference
/// panel at the same coordinate.
///
/// `score[i] = Σ_j |sample[i] − reference[j]|` over reference subjects `j`
/// with non-missing dosages. A missing sample dosage propagates as NaN.
/// Dosages are drawn from a tiny set ({0, 1, 2} for hard calls, a small
/// grid for imputed data), so the inner pass over the reference panel runs
/// once per distinct sample dosage.
#[must_use]
pub fn dosage_distance(sample: &Locus, reference: &Locus) -> Vec<f32> {
    let mut out = Vec::with_capacity(sample.dosages.len());
    let mut cache: AHashMap<OrderedFloat<f32>, f32> = AHashMap::new();

    for &dosage in &sample.dosages {
        if dosage.is_nan() {
            out.push(f32::NAN);
            continue;
        }
        let score = *cache.entry(OrderedFloat(dosage)).or_insert_with(|| {
            reference.dosages.iter()
                .filter(|reference_dosage| !reference_dosage.is_nan())
                .map(|reference_dosage| (dosage - reference_dosage).abs())
                .sum()
        });
        out.push(score);
    }
    out
}
