pub mod coordinator;
pub mod filters;
pub mod reconcile;
pub mod score;
pub mod stats;
pub mod window;

use anyhow::Result;
use genome::ChrIdx;
use log::debug;
use qgs_io::{
    read::{GeneReader, VariantReader},
    write::ScoreWriter,
};

use crate::coordinator::{Coordinator, RunOptions};
use crate::filters::{GtfFilter, VariantFilter};

/// Build every collaborator from the parsed command line and run one
/// streaming pass over the three inputs.
pub fn run(cli: &parser::Cli) -> Result<()> {
    let (pre_flank, post_flank) = cli.flanks();
    let delimiter = cli.delimiter()?;

    let gtf_filter = GtfFilter::from_pairs(&cli.gtf_filter);
    let (include, exclude) = cli.variant_set();
    let variant_filter = VariantFilter::from_paths(include, exclude);

    let genes = GeneReader::new(&cli.genes)?;
    let reference = VariantReader::open(std::slice::from_ref(&cli.reference), cli.hard_calls, false)?;
    let sample = VariantReader::open(&cli.sample, cli.hard_calls, cli.allow_missings())?;

    let mut writer = ScoreWriter::create(&cli.out, delimiter)?;
    debug!("Outputting subject ids and header.");
    writer.write_header(sample.subject_ids().iter().map(String::as_str))?;

    let options = RunOptions {
        pre_flank,
        post_flank,
        maf_limit      : cli.maf,
        fill_missings  : cli.fill_missings,
        chr_filter     : cli.chr.map(ChrIdx),
        weight_by      : cli.weight_by.clone(),
        output_variants: cli.output_variants,
    };

    Coordinator::new(genes, sample, reference, gtf_filter, variant_filter, writer, options).run()
}
