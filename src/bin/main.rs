use std::process;

use clap::Parser;

#[macro_use]
extern crate log;

/// Parse command line arguments and run the scoring pass.
fn main() {
    // ----------------------------- Run CLI Parser
    let cli = parser::Cli::parse();

    // ----------------------------- Init logger.
    logger::Logger::init(cli.verbosity());
    info!("qgs v{}", env!("CARGO_PKG_VERSION"));

    // ----------------------------- Serialize command line arguments
    cli.serialize();

    // ----------------------------- Stream genes and genotypes.
    if let Err(e) = gene_score::run(&cli) {
        error!("{e:?}");
        process::exit(1);
    }
}
