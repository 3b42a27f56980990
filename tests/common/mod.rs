use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tempfile::TempDir;

/// A scratch directory holding the input files of one pipeline run.
pub struct Fixture {
    _tempdir: TempDir,
    path    : PathBuf,
}

pub const GT_VCF_HEADER_2: &str = "\
##fileformat=VCFv4.2\n\
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

pub const GT_VCF_HEADER_3: &str = "\
##fileformat=VCFv4.2\n\
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tR1\tR2\tR3\n";

impl Fixture {
    pub fn new() -> Self {
        let tempdir = tempfile::tempdir().expect("create tempdir");
        let path = tempdir.path().to_path_buf();
        Self { _tempdir: tempdir, path }
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.path.join(filename)
    }

    pub fn arg(&self, filename: &str) -> String {
        self.path(filename).to_string_lossy().into_owned()
    }

    pub fn write(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.path(filename);
        File::create(&path)
            .and_then(|mut file| file.write_all(content.as_bytes()))
            .expect("write fixture file");
        path
    }

    pub fn write_bytes(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.path(filename);
        std::fs::write(&path, content).expect("write fixture file");
        path
    }

    pub fn write_gz(&self, filename: &str, content: &str) -> PathBuf {
        use flate2::{write::GzEncoder, Compression};
        let path = self.path(filename);
        let mut encoder = GzEncoder::new(File::create(&path).expect("create fixture file"), Compression::default());
        encoder.write_all(content.as_bytes()).expect("write fixture file");
        encoder.finish().expect("finish gz fixture");
        path
    }

    pub fn read(&self, filename: &str) -> String {
        std::fs::read_to_string(self.path(filename)).expect("read output file")
    }
}

/// The 3-subject reference panel shared by most scenarios: dosages 0, 1, 2
/// at 1:100.
pub fn reference_panel() -> String {
    format!("{GT_VCF_HEADER_3}1\t100\trsr\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\n")
}

/// Parse a full argument vector and run the pipeline.
pub fn run_qgs(args: &[String]) -> anyhow::Result<()> {
    let cli = parser::Cli::try_parse_from(args).expect("parse test command line");
    gene_score::run(&cli)
}

/// Assemble the standard argument vector and run, returning the output rows.
pub fn run_to_rows(fixture: &Fixture, extra_args: &[&str]) -> anyhow::Result<Vec<String>> {
    let mut args: Vec<String> = [
        "qgs",
        "--sample", &fixture.arg("sample.vcf"),
        "--reference", &fixture.arg("reference.vcf"),
        "--genes", &fixture.arg("genes.gtf"),
        "--out", &fixture.arg("scores.csv"),
    ].iter().map(ToString::to_string).collect();
    args.extend(extra_args.iter().map(ToString::to_string));

    run_qgs(&args)?;
    Ok(fixture.read("scores.csv").lines().map(ToString::to_string).collect())
}
