use std::{io::BufRead, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use genome::{ChrIdx, Coordinate, Position};
use log::{debug, trace, warn};

use super::{fold_maf, Locus};
use crate::parse;

mod error;
pub use error::DosageReaderError;

/// Streaming reader over one or more PLINK dosage files, each with a `.map`
/// sibling (chr, id, cM, bp).
///
/// Several files concatenate in natural-sort order and must agree on their
/// subject list. The per-subject encoding is inferred from the first
/// deep-read line: a maximum value above 1 means plain dosages, anything
/// else means genotype probabilities (1, 2 or 3 values per subject).
pub struct DosageReader {
    paths    : Vec<PathBuf>,
    file_idx : usize,
    path     : PathBuf,
    map_path : PathBuf,
    source   : Box<dyn BufRead>,
    map      : Box<dyn BufRead>,
    subjects : Vec<String>,
    payload  : Option<Vec<String>>,
    first_max: Option<f32>,
    line_nr  : usize,
    last     : Option<Coordinate>,
    good     : bool,
}

impl DosageReader {
    /// Open the natural-sort-first usable file of `paths`.
    ///
    /// # Errors
    /// - if no file has a usable `SNP A1 A2 …` header
    /// - if any file misses its `.map` sibling
    /// - if a later file disagrees on the subject list.
    pub fn open_all(paths: &[PathBuf]) -> Result<DosageReader> {
        let mut sorted = paths.to_vec();
        parse::natural_sort(&mut sorted);

        let mut reader = DosageReader {
            paths    : sorted,
            file_idx : 0,
            path     : PathBuf::new(),
            map_path : PathBuf::new(),
            source   : Box::new(std::io::empty()),
            map      : Box::new(std::io::empty()),
            subjects : Vec::new(),
            payload  : None,
            first_max: None,
            line_nr  : 0,
            last     : None,
            good     : true,
        };
        if !reader.open_next()? {
            return Err(DosageReaderError::NoUsableInput.into());
        }
        Ok(reader)
    }

    /// Open the next queued file pair. Ok(false) once the queue is dry.
    fn open_next(&mut self) -> Result<bool> {
        use DosageReaderError::{MissingMap, NoSubjects, SubjectMismatch};
        loop {
            let Some(path) = self.paths.get(self.file_idx).cloned() else {
                return Ok(false);
            };
            self.file_idx += 1;
            self.line_nr = 0;

            let map_path = parse::find_sibling_file(&path, "map")
                .ok_or_else(|| MissingMap(path.clone()))?;
            let mut source = parse::open(&path)?;
            let map = parse::open(&map_path)?;

            let Some(subjects) = Self::parse_header(&mut source, &path)? else {
                warn!("Input file '{}' does not have a proper header: skipping file.", path.display());
                continue;
            };
            if self.subjects.is_empty() {
                if subjects.is_empty() {
                    return Err(NoSubjects(path).into());
                }
                self.subjects = subjects;
            } else if subjects != self.subjects {
                return Err(SubjectMismatch(path).into());
            }

            debug!("Opened file '{}'. Read mode: plink dosage. Found {} subjects.",
                   path.display(), self.subjects.len());
            self.source = source;
            self.map = map;
            self.map_path = map_path;
            self.path = path;
            return Ok(true);
        }
    }

    /// Parse the `SNP A1 A2 FID1 IID1 …` header line. None when the file
    /// does not open with the expected three column names.
    fn parse_header(source: &mut Box<dyn BufRead>, path: &Path) -> Result<Option<Vec<String>>> {
        let mut line = String::new();
        let n = source.read_line(&mut line)
            .with_context(|| format!("While reading the header of '{}'", path.display()))?;
        if n == 0 {
            return Ok(None);
        }

        let mut tokens = line.split_whitespace();
        if (tokens.next(), tokens.next(), tokens.next()) != (Some("SNP"), Some("A1"), Some("A2")) {
            return Ok(None);
        }

        let mut subjects = Vec::new();
        while let Some(fid) = tokens.next() {
            let Some(iid) = tokens.next() else {
                warn!("Found sample fid without iid in file '{}' on line 1. fid={fid}: \
                       ignoring individual.", path.display());
                break;
            };
            subjects.push(format!("{fid}_{iid}"));
        }
        Ok(Some(subjects))
    }

    /// Advance map and dosage files in lock step, rolling over to the next
    /// queued file at map EOF.
    pub fn next_shallow(&mut self, locus: &mut Locus) -> Result<bool> {
        loop {
            self.line_nr += 1;

            let mut map_line = String::new();
            let n = self.map.read_line(&mut map_line)
                .with_context(|| format!("While reading '{}'", self.map_path.display()))?;
            if n == 0 {
                trace!("Map EOF: opening next");
                if self.open_next()? {
                    continue;
                }
                self.good = false;
                return Ok(false);
            }

            // the dosage line is consumed unconditionally to keep both
            // streams in sync across skips
            let mut data_line = String::new();
            if self.source.read_line(&mut data_line)
                .with_context(|| format!("While reading '{}'", self.path.display()))? == 0
            {
                trace!("Can't read line from dosage file.");
                self.good = false;
                return Ok(false);
            }

            // 9 rs573167194 0 141000084
            let map_fields: Vec<&str> = map_line.split_whitespace().collect();
            let Some((chr, id, pos)) = Self::parse_map_fields(&map_fields) else {
                warn!("Can't parse line {} of map file '{}'. Skipping.",
                      self.line_nr, self.map_path.display());
                continue;
            };
            if map_fields.len() > 4 {
                warn!("Unexpected data in map file '{}'. Value={}. Ignoring.",
                      self.map_path.display(), map_fields[4]);
            }

            let coordinate = Coordinate::new(chr, pos);
            if let Some(last) = self.last {
                if coordinate < last {
                    return Err(DosageReaderError::OutOfOrder {
                        path: self.path.clone(),
                        line: self.line_nr,
                        prev: last,
                        next: coordinate,
                    }.into());
                }
            }

            // rs573167194 T A 1 0 ...
            let mut tokens = data_line.split_whitespace();
            let (Some(data_id), Some(a1), Some(a2)) = (tokens.next(), tokens.next(), tokens.next())
            else {
                warn!("Can't parse line from dosage file '{}'. Skipping.", self.path.display());
                continue;
            };
            if data_id != id {
                warn!("Dosage and map file out of sync on map line {}: read snps {data_id} \
                       (dosage) and {id} (map). Skipping.", self.line_nr);
                continue;
            }

            self.last = Some(coordinate);
            locus.chr = chr;
            locus.pos = pos;
            locus.id = id.to_string();
            locus.reference = a1.to_string();
            locus.alternate = a2.to_string();
            locus.info.clear();
            locus.format.clear();
            locus.pinfo.clear();
            locus.clear();
            self.payload = Some(tokens.map(str::to_string).collect());
            return Ok(true);
        }
    }

    fn parse_map_fields<'a>(fields: &[&'a str]) -> Option<(ChrIdx, &'a str, Position)> {
        if fields.len() < 4 {
            return None;
        }
        let chr = fields[0].parse().ok()?;
        let pos = fields[3].parse().ok()?;
        Some((chr, fields[1], pos))
    }

    /// Convert the stashed per-subject values of the current line into
    /// dosages, inferring the encoding on the first call.
    pub fn deep_read(&mut self, locus: &mut Locus) -> Result<bool> {
        use DosageReaderError::{ProbabilityOutOfRange, ScaleContradiction};

        locus.dosages.clear();
        let Some(payload) = self.payload.take() else {
            debug!("Duplicate position {locus} in file '{}': ignoring all but first",
                   self.path.display());
            return Ok(false);
        };

        let mut data = Vec::with_capacity(payload.len());
        let mut max = 0.0f32;
        for raw in &payload {
            let Ok(value) = raw.parse::<f32>() else {
                warn!("Failed to parse dosage value '{raw}' for {locus}. Skipping locus.");
                return Ok(false);
            };
            max = max.max(value);
            data.push(value);
        }

        let first_max = *self.first_max.get_or_insert_with(|| {
            trace!("First dosage line contains max dosage of {max}: we assume a 0-{} dosage scale.",
                   match max > 1.0 { true => 2, false => 1 });
            max
        });
        if first_max <= 1.0 && max > 1.0 {
            return Err(ScaleContradiction { path: self.path.clone(), id: locus.id.clone() }.into());
        }

        let num_subjects = self.subjects.len();
        if data.len() == num_subjects {
            // values are the dosages themselves
            if first_max <= 1.0 {
                for dosage in &mut data {
                    *dosage *= 2.0;
                }
            }
            if locus.switch_ar {
                for dosage in &mut data {
                    *dosage = 2.0 - *dosage;
                }
            }
            locus.dosages = data;
        } else if data.len() == num_subjects * 2 {
            // P(A1A1) and P(A1A2); P(A2A2) is the remainder
            for pair in data.chunks_exact(2) {
                let (a1, a2) = (pair[0], pair[1]);
                let a3 = 1.0 - (a1 + a2);
                if a3 < 0.0 {
                    return Err(ProbabilityOutOfRange {
                        path: self.path.clone(), line: self.line_nr,
                    }.into());
                }
                let dosage = match locus.switch_ar {
                    true  => a2 + 2.0 * a1,
                    false => a2 + 2.0 * a3,
                };
                if !(0.0..=2.0).contains(&dosage) {
                    return Err(ProbabilityOutOfRange {
                        path: self.path.clone(), line: self.line_nr,
                    }.into());
                }
                locus.dosages.push(dosage);
            }
        } else if data.len() == num_subjects * 3 {
            // the three genotype probabilities
            for triple in data.chunks_exact(3) {
                let (a1, a2, a3) = (triple[0], triple[1], triple[2]);
                let dosage = match locus.switch_ar {
                    true  => a2 + 2.0 * a1,
                    false => a2 + 2.0 * a3,
                };
                if !(0.0..=2.0).contains(&dosage) {
                    return Err(ProbabilityOutOfRange {
                        path: self.path.clone(), line: self.line_nr,
                    }.into());
                }
                locus.dosages.push(dosage);
            }
        } else {
            warn!("Read {} values for {} subjects in '{}': skipping locus",
                  data.len(), num_subjects, self.path.display());
            return Ok(false);
        }

        let sum: f64 = locus.dosages.iter().map(|dosage| f64::from(*dosage)).sum();
        locus.maf = fold_maf(sum / (2.0 * num_subjects as f64));
        Ok(true)
    }

    #[must_use]
    pub fn is_good(&self) -> bool {
        self.good
    }

    #[must_use]
    pub fn subject_ids(&self) -> &[String] {
        &self.subjects
    }
}
