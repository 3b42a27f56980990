use std::{io::Read, path::Path};

use ahash::AHashSet;
use anyhow::Result;
use log::{debug, warn};

use crate::parse;

/// Read a whitespace-separated list of variant identifiers.
///
/// Lenient by contract: an unopenable or empty file yields an empty set with
/// a warning, so a bad `--include-snps`/`--exclude-snps` argument degrades
/// the filter instead of aborting the run.
#[must_use]
pub fn read_variant_set(path: &Path) -> AHashSet<String> {
    match try_read_variant_set(path) {
        Ok(set) => {
            if set.is_empty() {
                warn!("No loci read from file '{}'.", path.display());
            }
            debug!("Read {} loci from '{}'.", set.len(), path.display());
            set
        }
        Err(_) => {
            warn!("Cannot open file '{}'. No loci read.", path.display());
            AHashSet::new()
        }
    }
}

fn try_read_variant_set(path: &Path) -> Result<AHashSet<String>> {
    let mut content = String::new();
    parse::open(path)?.read_to_string(&mut content)?;
    Ok(content.split_whitespace().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn reads_whitespace_separated_ids() -> anyhow::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("snps.txt");
        std::fs::File::create(&path)?.write_all(b"rs1 rs2\nrs3\t1:400\n")?;

        let set = read_variant_set(&path);
        assert_eq!(set.len(), 4);
        assert!(set.contains("rs1"));
        assert!(set.contains("1:400"));
        Ok(())
    }

    #[test]
    fn unopenable_file_yields_empty_set() {
        let set = read_variant_set(Path::new("/nonexistent/snps.txt"));
        assert!(set.is_empty());
    }
}
