use std::{fmt::{self, Display, Formatter}, io::BufRead, path::Path};

use ahash::AHashMap;
use anyhow::{Context, Result};
use genome::{ChrIdx, Coordinate, Position, Strand};
use itertools::Itertools;
use log::trace;

use crate::parse;

mod error;
pub use error::GeneReaderError;

/// One region from the gene database.
///
/// `attr` always carries `gene_name` and `gene_id`; when the input provides
/// neither, both default to a `chr:start-stop` string.
#[derive(Debug, Clone, Default)]
pub struct GeneBlock {
    pub chr   : ChrIdx,
    pub start : Position,
    pub stop  : Position,
    pub strand: Strand,
    pub attr  : AHashMap<String, String>,
}

impl GeneBlock {
    /// Parse one GTF-like line: eight fixed fields
    /// (chr source type start stop score strand phase) followed by
    /// whitespace-separated `key value` attribute pairs, where values may be
    /// `"…";`-quoted. Returns None for anything malformed.
    fn parse(line: &str) -> Option<GeneBlock> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            return None;
        }

        let chr: ChrIdx     = fields[0].parse().ok()?;
        let start: Position = fields[3].parse().ok()?;
        let stop: Position  = fields[4].parse().ok()?;
        if start == Position(0) || stop < start {
            return None;
        }

        let mut attr = AHashMap::with_capacity(4 + (fields.len() - 8) / 2);
        attr.insert("chr".to_string(), fields[0].to_string());
        attr.insert("source".to_string(), fields[1].to_string());
        attr.insert("type".to_string(), fields[2].to_string());
        for pair in fields[8..].chunks(2) {
            let [key, value] = pair else { break };
            attr.insert((*key).to_string(), unquote(value).to_string());
        }

        if !attr.contains_key("gene_name") {
            attr.insert("gene_name".to_string(), format!("{chr}:{start}-{stop}"));
        }
        if !attr.contains_key("gene_id") {
            let name = attr["gene_name"].clone();
            attr.insert("gene_id".to_string(), name);
        }

        Some(GeneBlock { chr, start, stop, strand: Strand::from(fields[6]), attr })
    }

    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.chr, self.start)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.attr.get("gene_name").map_or("", String::as_str)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.attr.get("gene_id").map_or("", String::as_str)
    }
}

/// Strip GTF attribute quoting: `"value";` -> `value`.
fn unquote(value: &str) -> &str {
    match value.len() > 3 && value.starts_with('"') && value.ends_with("\";") {
        true  => &value[1..value.len() - 2],
        false => value,
    }
}

impl Display for GeneBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let attrs = self.attr.iter()
            .map(|(key, value)| format!("{key}={value}"))
            .sorted()
            .join(";");
        write!(f, "{}:{}-{} [strand={};{attrs}]", self.chr, self.start, self.stop, self.strand)
    }
}

/// Streaming reader over a (possibly gz-compressed) GTF-like gene database.
///
/// Comment lines and malformed lines are skipped; the stream of yielded
/// blocks must be monotonic non-decreasing on (chromosome, start), since the
/// downstream score window flushes by coordinate prefix.
pub struct GeneReader {
    source: Box<dyn BufRead>,
    last  : Option<Coordinate>,
}

impl GeneReader {
    /// # Errors
    /// if `path` cannot be opened for reading.
    pub fn new(path: &Path) -> Result<GeneReader> {
        let source = parse::open(path)
            .with_context(|| format!("While opening gene database '{}'", path.display()))?;
        Ok(GeneReader { source, last: None })
    }

    /// The next well-formed gene block, or None at end of input.
    ///
    /// # Errors
    /// - on unreadable input
    /// - when a block is out of (chromosome, start) order.
    pub fn next_block(&mut self) -> Result<Option<GeneBlock>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.source.read_line(&mut line)
                .context("While reading from the gene database")?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some(block) = GeneBlock::parse(trimmed) else {
                trace!("Failed to read line from gene file. Skipping.");
                continue;
            };

            let coordinate = block.coordinate();
            if let Some(last) = self.last {
                if coordinate < last {
                    return Err(GeneReaderError::OutOfOrder { prev: last, next: coordinate }.into());
                }
            }
            self.last = Some(coordinate);
            return Ok(Some(block));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    const LINE: &str = "1\thavana\tgene\t11869\t14409\t.\t+\t.\tgene_id \"ENSG00000223972\"; gene_name \"DDX11L1\";";

    fn reader_over(content: &str) -> Result<GeneReader> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("genes.gtf");
        std::fs::File::create(&path)?.write_all(content.as_bytes())?;
        // tmpdir may be dropped once the file handle is open
        let reader = GeneReader::new(&path);
        tmpdir.close()?;
        reader
    }

    #[test]
    fn parse_gtf_line() {
        let block = GeneBlock::parse(LINE).expect("well-formed line");
        assert_eq!(block.chr, ChrIdx(1));
        assert_eq!(block.start, Position(11_869));
        assert_eq!(block.stop, Position(14_409));
        assert_eq!(block.strand, Strand::Forward);
        assert_eq!(block.id(), "ENSG00000223972");
        assert_eq!(block.name(), "DDX11L1");
        assert_eq!(block.attr["type"], "gene");
    }

    #[test]
    fn parse_defaults_name_and_id() {
        let block = GeneBlock::parse("chr2 ensembl gene 100 200 . - .").expect("well-formed line");
        assert_eq!(block.name(), "2:100-200");
        assert_eq!(block.id(), "2:100-200");
        assert_eq!(block.strand, Strand::Reverse);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(GeneBlock::parse("1 havana gene").is_none());
        assert!(GeneBlock::parse("NOPE havana gene 1 2 . + .").is_none());
        assert!(GeneBlock::parse("1 havana gene 200 100 . + .").is_none()); // stop < start
        assert!(GeneBlock::parse("1 havana gene 0 100 . + .").is_none());
    }

    #[test]
    fn unquote_values() {
        assert_eq!(unquote("\"DDX11L1\";"), "DDX11L1");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("\"\";"), "\"\";"); // too short to unquote
    }

    #[test]
    fn skips_comments_and_junk() -> Result<()> {
        let content = format!("## gtf header\n#!genome-build GRCh38\nnot a gene line\n{LINE}\n");
        let mut reader = reader_over(&content)?;
        assert_eq!(reader.next_block()?.expect("one block").name(), "DDX11L1");
        assert!(reader.next_block()?.is_none());
        Ok(())
    }

    #[test]
    fn out_of_order_input_is_fatal() -> Result<()> {
        let content = "1 x gene 500 600 . + .\n1 x gene 100 200 . + .\n";
        let mut reader = reader_over(content)?;
        assert!(reader.next_block()?.is_some());
        let err = reader.next_block().expect_err("second block is out of order");
        assert!(err.downcast_ref::<GeneReaderError>().is_some());
        Ok(())
    }
}
