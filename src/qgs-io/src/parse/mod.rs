use std::{
    cmp::Ordering,
    fs::File,
    io::{BufRead, BufReader, Write},
    iter::Peekable,
    path::{Path, PathBuf},
    str::Chars,
};

use anyhow::{Context, Result};
use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};
use log::trace;

mod error;
pub use error::ParseError;

/// Return true when the path carries a `.gz` suffix.
#[must_use]
pub fn is_gzipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Open a file for buffered reading, transparently decompressing gzip
/// content when the path ends in `.gz`.
///
/// # Errors
/// if `path` cannot be opened for reading.
pub fn open(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)
        .map_err(|e| ParseError::OpenFile(path.to_path_buf(), e))
        .with_context(|| format!("While opening '{}' for reading", path.display()))?;
    Ok(match is_gzipped(path) {
        true  => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        false => Box::new(BufReader::new(file)),
    })
}

/// Create (or truncate) a file for writing, gz-compressing the output when
/// the path ends in `.gz`.
///
/// # Errors
/// if `path` cannot be created, e.g. for lack of UNIX permissions.
pub fn create(path: &Path) -> Result<Box<dyn Write>> {
    let file = File::create(path)
        .map_err(|e| ParseError::CreateFile(path.to_path_buf(), e))
        .with_context(|| format!("While opening '{}' for writing", path.display()))?;
    Ok(match is_gzipped(path) {
        true  => Box::new(GzEncoder::new(file, Compression::default())),
        false => Box::new(file),
    })
}

/// Probe for a sibling metadata file next to `path`.
///
/// Candidates are tried in order: `<path>.<ext>`, `<path>.<ext>.gz`, then the
/// same pair with up to two trailing extensions stripped from `path`, so that
/// `cohort.bed.gz` also probes `cohort.bed.<ext>(.gz)` and `cohort.<ext>(.gz)`.
#[must_use]
pub fn find_sibling_file(path: &Path, ext: &str) -> Option<PathBuf> {
    let mut base = path.to_string_lossy().into_owned();
    let mut candidates = vec![format!("{base}.{ext}"), format!("{base}.{ext}.gz")];
    for _ in 0..2 {
        let Some(idx) = base.rfind('.') else { break };
        base.truncate(idx);
        candidates.push(format!("{base}.{ext}"));
        candidates.push(format!("{base}.{ext}.gz"));
    }

    for candidate in candidates {
        trace!("Probing for sibling file '{candidate}'");
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            trace!("File found.");
            return Some(candidate);
        }
    }
    trace!("File not found.");
    None
}

/// Order paths so that embedded integers compare numerically, i.e.
/// `chunk2.dosage` sorts before `chunk10.dosage`.
pub fn natural_sort(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None,    None   ) => return Ordering::Equal,
            (None,    Some(_)) => return Ordering::Less,
            (Some(_), None   ) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                match take_number(&mut ai).cmp(&take_number(&mut bi)) {
                    Ordering::Equal => (),
                    other           => return other,
                }
            }
            (Some(ca), Some(cb)) => {
                match ca.cmp(&cb) {
                    Ordering::Equal => { ai.next(); bi.next(); }
                    other           => return other,
                }
            }
        }
    }
}

fn take_number(iter: &mut Peekable<Chars>) -> u64 {
    let mut value: u64 = 0;
    while let Some(c) = iter.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        value = value.saturating_mul(10).saturating_add(u64::from(c as u8 - b'0'));
        iter.next();
    }
    value
}
