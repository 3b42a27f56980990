use anyhow::Result;
use genome::{ChrIdx, Position, Strand};
use log::{debug, info, trace, warn};
use qgs_io::{
    read::{gene::GeneBlock, GeneReader, Locus, VariantReader},
    write::{GeneResult, ScoreWriter},
};

use crate::{
    filters::{GtfFilter, VariantFilter},
    reconcile::{reconcile, AlleleAlignment},
    score::dosage_distance,
    stats::{RunCounts, Side},
    window::ScoreWindow,
};

/// Sentinel chromosome for a sample cursor that ran past its last record.
/// Parks the sample side "after everything" so the reference side keeps
/// draining and the last gene's bookkeeping stays correct.
const PAST_END: ChrIdx = ChrIdx(99);

/// Weight factors below this are treated as zero at emission time.
const WEIGHT_EPSILON: f64 = 1e-5;

/// Tunables of one streaming pass, resolved from the command line.
/// Flank distances are in base pairs.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub pre_flank      : u64,
    pub post_flank     : u64,
    pub maf_limit      : f64,
    pub fill_missings  : bool,
    pub chr_filter     : Option<ChrIdx>,
    pub weight_by      : Option<String>,
    pub output_variants: bool,
}

/// Three-way merge-join over the gene stream and the two genotype streams.
///
/// The outer loop pulls gene regions; the inner loop advances whichever
/// genotype cursor lies behind, recording every observed variant in the
/// score window and scoring those where both streams coincide. When the
/// cursors move past a gene, the window is prefix-flushed to the gene start
/// and everything up to the gene stop is aggregated into one output row.
pub struct Coordinator {
    genes         : GeneReader,
    sample        : VariantReader,
    reference     : VariantReader,
    gtf_filter    : GtfFilter,
    variant_filter: VariantFilter,
    writer        : ScoreWriter,
    options       : RunOptions,
    window        : ScoreWindow,
    counts        : RunCounts,
    sample_locus  : Locus,
    ref_locus     : Locus,
}

/// True when the (flanked) gene window lies strictly before the cursor.
fn gene_before(gene: &GeneBlock, locus: &Locus) -> bool {
    gene.chr < locus.chr || (gene.chr == locus.chr && gene.stop < locus.pos)
}

/// Strand-aware flanking: the pre-flank widens the transcription-start side,
/// which for reverse-strand genes is the stop side.
fn apply_flanks(gene: &mut GeneBlock, pre_flank: u64, post_flank: u64) {
    let (before, after) = match gene.strand {
        Strand::Reverse => (post_flank, pre_flank),
        _               => (pre_flank, post_flank),
    };
    gene.start = gene.start.saturating_sub(before);
    gene.stop = gene.stop + after;
}

impl Coordinator {
    pub fn new(
        genes         : GeneReader,
        sample        : VariantReader,
        reference     : VariantReader,
        gtf_filter    : GtfFilter,
        variant_filter: VariantFilter,
        writer        : ScoreWriter,
        options       : RunOptions,
    ) -> Coordinator {
        Coordinator {
            genes, sample, reference, gtf_filter, variant_filter, writer, options,
            window      : ScoreWindow::default(),
            counts      : RunCounts::default(),
            sample_locus: Locus::default(),
            ref_locus   : Locus::default(),
        }
    }

    fn streams_good(&self) -> bool {
        self.sample.is_good() && self.reference.is_good()
    }

    /// Run the full pass. Consumes the coordinator; the readers and writer
    /// close when it drops.
    pub fn run(mut self) -> Result<()> {
        // (chr, start) of the last gene read, tracked so the outer loop can
        // tell whether windowed scores are still reachable once the genotype
        // streams dry up
        let mut last_gene: Option<(ChrIdx, Position)> = None;

        loop {
            if !self.streams_good() {
                trace!("No more genetic data left to read. {} loci still in memory.",
                       self.window.loci_in_memory());
                let reachable = last_gene.is_some_and(|(chr, start)| {
                    chr == self.ref_locus.chr && start <= self.ref_locus.pos
                });
                if self.window.is_empty() || !reachable {
                    trace!("Genetic region starts after last read. Stopping.");
                    break;
                }
            }

            let Some(mut gene) = self.genes.next_block()? else {
                trace!("No more genetic regions left to read. Stopping.");
                break;
            };
            trace!("Gene: read {gene} from gene file.");
            last_gene = Some((gene.chr, gene.start));

            if let Some(target) = self.options.chr_filter {
                if gene.chr < target {
                    trace!("Gene: gene fails chr filter, skipping.");
                    continue;
                }
                if gene.chr > target {
                    break;
                }
            }

            if !self.gtf_filter.pass(&gene) {
                continue;
            }

            apply_flanks(&mut gene, self.options.pre_flank, self.options.post_flank);
            last_gene = Some((gene.chr, gene.start));

            self.scan_gene(&gene)?;
            self.emit_gene(&gene)?;
        }

        self.counts.report();
        info!("Run completed");
        Ok(())
    }

    /// Inner merge loop: advance the behind cursor until both genotype
    /// streams have moved past `gene`, scoring every coincident pair.
    fn scan_gene(&mut self, gene: &GeneBlock) -> Result<()> {
        loop {
            if !self.streams_good() {
                return Ok(());
            }

            // the reference side advances on ties, so a freshly matched pair
            // is left behind in one step
            let behind = match self.ref_locus.chr == ChrIdx(0)
                || self.ref_locus.coordinate() <= self.sample_locus.coordinate()
            {
                true  => Side::Reference,
                false => Side::Sample,
            };

            if self.ref_locus.chr != ChrIdx(0)
                && gene_before(gene, &self.ref_locus)
                && gene_before(gene, &self.sample_locus)
            {
                trace!("Gene: gene lies in front of current loci. Read next gene.");
                return Ok(());
            }

            match behind {
                Side::Reference => {
                    if !self.reference.next_shallow(&mut self.ref_locus)? {
                        return Ok(());
                    }
                    trace!("Reference: read {} from reference file.", self.ref_locus);
                    self.window.touch(self.ref_locus.coordinate(), &self.ref_locus.reference);
                }
                Side::Sample => {
                    if !self.sample.next_shallow(&mut self.sample_locus)? {
                        self.sample_locus.chr = PAST_END;
                        continue;
                    }
                    trace!("Sample: read {} from sample file.", self.sample_locus);
                    self.window.touch(self.sample_locus.coordinate(), &self.sample_locus.reference);
                }
            }
            self.counts.side_mut(behind).read += 1;

            if self.sample_locus.chr != self.ref_locus.chr || self.sample_locus.pos != self.ref_locus.pos {
                self.counts.side_mut(behind).non_overlapping += 1;
                continue;
            }
            self.counts.side_mut(behind).overlapping += 1;

            if !self.variant_filter.pass(&self.sample_locus) {
                trace!("Filter: sample locus rejected by the variant set. Skipping.");
                self.counts.each_mut(|counts| counts.skipped += 1);
                continue;
            }

            // only the lower bound gates the deep read: loci past the stop
            // may still fall inside a later, overlapping gene
            if self.sample_locus.chr != gene.chr || self.sample_locus.pos < gene.start {
                trace!("Match: locus {} does not lie within block. Skipping.", self.sample_locus);
                self.counts.each_mut(|counts| counts.outside_regions += 1);
                continue;
            }

            trace!("Match: locus {} found in sample and reference. Attempting deep read.",
                   self.sample_locus);
            self.counts.each_mut(|counts| counts.inside_regions += 1);

            match reconcile(&mut self.sample_locus, &mut self.ref_locus) {
                AlleleAlignment::MissingAlt => {
                    trace!("Match: locus {} is missing alt data: skipping locus.", self.sample_locus);
                    self.counts.each_mut(|counts| counts.skipped += 1);
                    continue;
                }
                AlleleAlignment::Mismatch => {
                    trace!("Match: locus {} has ref/alt mismatch between sample and reference. \
                            Skipping locus.", self.sample_locus);
                    self.sample_locus.clear();
                    self.ref_locus.clear();
                    self.counts.each_mut(|counts| counts.skipped += 1);
                    continue;
                }
                AlleleAlignment::Flipped => {
                    trace!("Match: locus {} has flipped ref/alt data. Correcting.", self.sample_locus);
                    // the shallow entry under the non-canonical orientation
                    // must not linger in the window
                    let stale_ref = self.sample_locus.reference.clone();
                    self.window.remove_allele(self.sample_locus.coordinate(), &stale_ref);
                    self.sample_locus.switch_alt_ref();
                }
                AlleleAlignment::Concordant => (),
            }

            if !self.deep_read_pair()? {
                continue;
            }

            if self.options.fill_missings {
                self.fill_missings();
            }

            let scores = dosage_distance(&self.sample_locus, &self.ref_locus);
            let entry = self.window.entry_mut(self.sample_locus.coordinate(), &self.sample_locus.reference);
            entry.scores = scores;
            entry.id = format!("{}/{}", self.sample_locus.id, self.ref_locus.id);
            self.counts.each_mut(|counts| counts.used += 1);

            if self.options.weight_by.is_some() {
                self.apply_weight();
            }
        }
    }

    /// Deep-read both cursors and apply the MAF floor. False rejects the
    /// pair; the cursors keep their coordinates so merging continues.
    fn deep_read_pair(&mut self) -> Result<bool> {
        let sample_ok = self.sample.deep_read(&mut self.sample_locus)?;
        if !sample_ok || self.sample_locus.maf < self.options.maf_limit {
            match sample_ok {
                true  => trace!("Match: sample locus MAF below filter ({}).", self.sample_locus.maf),
                false => trace!("Match: sample locus excluded. Skipping locus."),
            }
            self.sample_locus.clear();
            self.counts.each_mut(|counts| counts.skipped += 1);
            return Ok(false);
        }

        let reference_ok = self.reference.deep_read(&mut self.ref_locus)?;
        if !reference_ok || self.ref_locus.maf < self.options.maf_limit {
            match reference_ok {
                true  => trace!("Match: reference locus MAF below filter ({}).", self.ref_locus.maf),
                false => trace!("Match: reference locus excluded. Skipping locus."),
            }
            self.sample_locus.clear();
            self.ref_locus.clear();
            self.counts.each_mut(|counts| counts.skipped += 1);
            return Ok(false);
        }

        trace!("Locus {} deep read successful. Calculating score.", self.sample_locus);
        Ok(true)
    }

    /// Replace missing sample dosages with the homozygous-ref dosage
    /// (2 on a flipped locus, 0 otherwise).
    fn fill_missings(&mut self) {
        let fill = match self.sample_locus.switch_ar {
            true  => 2.0,
            false => 0.0,
        };
        let mut filled = 0usize;
        for dosage in &mut self.sample_locus.dosages {
            if dosage.is_nan() {
                *dosage = fill;
                filled += 1;
            }
        }
        if filled > 0 {
            self.counts.sample.filled_missing += 1;
            trace!("Filled {filled} missing values.");
        }
    }

    /// Fold the `--weight-by` INFO field of the sample locus into its stored
    /// window entry. A missing or non-numeric value leaves the variant at
    /// weight 1 with a warning.
    fn apply_weight(&mut self) {
        let Some(field) = self.options.weight_by.clone() else { return };
        self.sample_locus.parse_info();

        let Some(raw) = self.sample_locus.pinfo.get(&field) else {
            warn!("Weight INFO field '{field}' not available for locus {}. Not including weight.",
                  self.sample_locus);
            return;
        };
        let Ok(weight) = raw.parse::<f32>() else {
            warn!("Weight INFO field '{field}' not a number for locus {}. Not including weight.",
                  self.sample_locus);
            return;
        };

        let entry = self.window.entry_mut(self.sample_locus.coordinate(), &self.sample_locus.reference);
        for score in &mut entry.scores {
            *score *= weight;
        }
        entry.weight = weight;
    }

    /// Flush the window below the gene, aggregate what remains inside its
    /// bounds and write one output row.
    ///
    /// Positive weights accumulate into the normaliser; negative weights
    /// contribute their magnitude as an additive term instead, keeping the
    /// final cells inside [0, 1].
    fn emit_gene(&mut self, gene: &GeneBlock) -> Result<()> {
        self.window.flush_before(gene.chr, gene.start);

        let num_subjects = self.sample.num_subjects();
        let num_reference = self.reference.num_subjects();
        let mut totals = vec![0.0f64; num_subjects];
        let mut used_loci: Vec<String> = Vec::new();
        let mut unused_loci: Vec<String> = Vec::new();
        let mut correction = 0.0f64;
        let mut addition = 0.0f64;

        for (pos, allele, entry) in self.window.region(gene.chr, gene.stop) {
            if entry.is_shallow() {
                unused_loci.push(format!("{}:{}:{}", gene.chr, pos, allele));
                continue;
            }
            used_loci.push(format!("{}:{}:{}({})", gene.chr, pos, allele, entry.id));

            match entry.weight < 0.0 {
                true  => addition += f64::from(-2.0 * entry.weight),
                false => correction += f64::from(2.0 * entry.weight),
            }
            for (total, score) in totals.iter_mut().zip(&entry.scores) {
                match score.is_nan() {
                    true  => *total = f64::NAN,
                    false => *total += f64::from(*score),
                }
            }
        }

        let num_loci = used_loci.len();
        let total_num_loci = num_loci + unused_loci.len();

        if num_loci == 0 {
            trace!("Gene: no loci in {}: skipping.", gene.id());
            return Ok(());
        }
        if correction < WEIGHT_EPSILON && addition < WEIGHT_EPSILON {
            trace!("Gene: no loci with sufficient weights in {}: skipping.", gene.id());
            return Ok(());
        }

        trace!("Loci included in {}: {}", gene.id(), used_loci.join("|"));
        trace!("Loci not included in {}: {}", gene.id(), unused_loci.join("|"));
        debug!("Outputting score for {} ({}:{}-{}) based on {num_loci}/{total_num_loci} loci.",
               gene.id(), gene.chr, gene.start, gene.stop);

        let additive = addition * num_reference as f64;
        let denominator = (correction + addition) * num_reference as f64;
        let scores = totals.into_iter()
            .map(|total| match total.is_nan() {
                true  => f64::NAN,
                false => (total + additive) / denominator,
            })
            .collect();

        let result = GeneResult {
            gene_name     : gene.name().to_string(),
            gene_id       : gene.id().to_string(),
            chr           : gene.chr,
            start         : gene.start,
            stop          : gene.stop,
            n_sample      : num_subjects,
            n_ref         : num_reference,
            loci          : match self.options.output_variants {
                true  => used_loci.join("|"),
                false => num_loci.to_string(),
            },
            total_num_loci,
            scores,
        };
        self.writer.write_gene(&result)
    }
}
