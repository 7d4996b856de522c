//! Persistence: a directory holding one `index.json` plus one append-only
//! `<name>.jsonl` record file per polynomial.
//!
//! Extension appends whole prime ranges in one buffered write, then rewrites
//! the index atomically (temp file + rename). A crash between the two leaves
//! records ahead of the index; `verify_index` detects it, `rebuild_index`
//! repairs it, and `extend_roots` refuses to run until it is repaired, so a
//! retry can never double-count.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::CensusError;
use crate::poly::Polynomial;
use crate::primes;
use crate::record::{PrimeGroup, RootRecord};
use crate::solver;

const INDEX_FILE: &str = "index.json";
const SCHEMA_VERSION: &str = "1";

/// Per-polynomial metadata. `root_count` and `last_prime` are updated
/// together with every completed extension; extension always resumes at
/// `next_prime(last_prime)`, so coverage is contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialIndexEntry {
    pub coefficients: Vec<i64>,
    pub degree: u32,
    pub galois_group_id: u32,
    pub root_count: u64,
    pub last_prime: u64,
}

impl PolynomialIndexEntry {
    pub fn polynomial(&self) -> Polynomial {
        Polynomial::new(self.coefficients.clone())
    }
}

/// Result of registering a polynomial. Already-present is a status, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
}

/// Result of an extension request. An upper bound at or below the covered
/// range is a no-op status, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
    Extended { new_roots: u64, last_prime: u64 },
    NothingToDo,
}

/// Options for [`RootStore::stream_roots`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamConfig {
    /// Keep only records whose prime has exactly this many roots.
    pub total: Option<u32>,
    /// Cap on the number of records yielded.
    pub limit: Option<u64>,
}

/// What `verify_index` found: index metadata next to what the record file
/// actually holds.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReport {
    pub name: String,
    pub index_count: u64,
    pub index_prime: u64,
    pub record_count: u64,
    pub record_prime: u64,
    /// The record file ends in a torn line or a prime group shorter than
    /// its own `total_for_prime` (crash remnant).
    pub incomplete_tail: bool,
}

impl IndexReport {
    /// The index may legitimately be ahead of the last *recorded* prime
    /// (a trailing run of primes with zero roots), so only a record file
    /// ahead of the index, a count mismatch, or an incomplete tail counts
    /// as drift.
    pub fn is_consistent(&self) -> bool {
        self.index_count == self.record_count
            && self.record_prime <= self.index_prime
            && !self.incomplete_tail
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    schema_version: String,
    polynomials: BTreeMap<String, PolynomialIndexEntry>,
}

impl IndexFile {
    fn empty() -> IndexFile {
        IndexFile {
            schema_version: SCHEMA_VERSION.to_string(),
            polynomials: BTreeMap::new(),
        }
    }
}

/// The root store. One physical record file per polynomial keeps
/// extensions of different polynomials independent; a per-polynomial mutex
/// serializes the read-solve-append-update sequence for the same one.
pub struct RootStore {
    dir: PathBuf,
    index: Mutex<IndexFile>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RootStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<RootStore, CensusError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| CensusError::storage(format!("creating store dir {}", dir.display()), e))?;

        let index_path = dir.join(INDEX_FILE);
        let index = if index_path.exists() {
            let contents = fs::read_to_string(&index_path)
                .map_err(|e| CensusError::storage(format!("reading {}", index_path.display()), e))?;
            serde_json::from_str(&contents).map_err(|e| CensusError::MalformedIndex {
                path: index_path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            IndexFile::empty()
        };

        Ok(RootStore {
            dir,
            index: Mutex::new(index),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Register a polynomial. A repeat registration is reported, not raised.
    pub fn register(
        &self,
        f: &Polynomial,
        galois_group_id: u32,
    ) -> Result<RegisterOutcome, CensusError> {
        if f.is_zero() {
            return Err(CensusError::InvalidPolynomial {
                name: f.name(),
                reason: String::from("cannot register the zero polynomial"),
            });
        }
        let name = f.name();
        let mut index = self.index.lock().unwrap();
        if index.polynomials.contains_key(&name) {
            log::info!("{} is already registered", f);
            return Ok(RegisterOutcome::AlreadyRegistered);
        }

        let path = self.record_path(&name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CensusError::storage(format!("creating {}", path.display()), e))?;

        index.polynomials.insert(
            name.clone(),
            PolynomialIndexEntry {
                coefficients: f.coefficients().to_vec(),
                degree: f.degree(),
                galois_group_id,
                root_count: 0,
                last_prime: 0,
            },
        );
        self.persist(&index)?;
        log::info!("registered {} (group {})", f, galois_group_id);
        Ok(RegisterOutcome::Registered)
    }

    /// Extend the computed range for `f` to cover all primes below
    /// `upper_bound`. Resumes at `next_prime(last_prime)`; idempotent for
    /// bounds already covered.
    pub fn extend_roots(
        &self,
        f: &Polynomial,
        upper_bound: u64,
    ) -> Result<ExtendOutcome, CensusError> {
        let name = f.name();
        let guard = self.poly_lock(&name);
        let _held = guard.lock().unwrap();

        let entry = self.index_entry_by_name(&name)?;
        let path = self.record_path(&name);

        // Crash evidence: records ahead of the index mean a previous
        // extension appended but never committed. Refuse rather than
        // duplicate; rebuild_index adopts or truncates the orphans.
        let (tail, clean) = last_record(&path, &name)?;
        if !clean {
            return Err(CensusError::Corrupt {
                name: name.clone(),
                line: 0,
                reason: String::from("unterminated trailing record; run rebuild_index"),
            });
        }
        if let Some(tail) = tail {
            if tail.prime > entry.last_prime {
                let scan = scan_records(&path, &name)?;
                return Err(CensusError::IndexDrift {
                    name,
                    index_count: entry.root_count,
                    index_prime: entry.last_prime,
                    record_count: scan.count,
                    record_prime: scan.last_prime,
                });
            }
        }

        let resume = primes::next_prime(entry.last_prime)
            .ok_or(CensusError::PrimeRangeExhausted { after: entry.last_prime })?;
        if resume >= upper_bound {
            log::info!(
                "{} already covered through prime {} (asked for < {})",
                f,
                entry.last_prime,
                upper_bound
            );
            return Ok(ExtendOutcome::NothingToDo);
        }

        log::info!("extending {} over primes [{}, {})", f, resume, upper_bound);
        let records = solver::solve(f, resume, upper_bound)?;

        let mut buf = String::new();
        for r in &records {
            let line = serde_json::to_string(r).map_err(|e| CensusError::Corrupt {
                name: name.clone(),
                line: 0,
                reason: format!("encoding record: {}", e),
            })?;
            buf.push_str(&line);
            buf.push('\n');
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| CensusError::storage(format!("appending to {}", path.display()), e))?;
        file.write_all(buf.as_bytes())
            .map_err(|e| CensusError::storage(format!("appending to {}", path.display()), e))?;
        file.flush()
            .map_err(|e| CensusError::storage(format!("flushing {}", path.display()), e))?;

        // The range was processed through its last prime even when that
        // prime contributed zero roots.
        let covered = primes::last_prime_below(upper_bound).unwrap_or(entry.last_prime);
        let new_roots = records.len() as u64;

        let mut index = self.index.lock().unwrap();
        let e = index
            .polynomials
            .get_mut(&name)
            .ok_or_else(|| CensusError::NotRegistered { name: name.clone() })?;
        e.root_count += new_roots;
        e.last_prime = covered;
        self.persist(&index)?;

        log::info!(
            "recorded {} new roots for {}, covered through prime {}",
            new_roots,
            f,
            covered
        );
        Ok(ExtendOutcome::Extended {
            new_roots,
            last_prime: covered,
        })
    }

    /// Lazy stream of records in `(prime, root)` order. Each call opens a
    /// fresh reader; the stream snapshots the file length at open, so an
    /// in-flight append is never partially visible.
    pub fn stream_roots(
        &self,
        f: &Polynomial,
        config: &StreamConfig,
    ) -> Result<RootStream, CensusError> {
        let name = f.name();
        self.index_entry_by_name(&name)?;
        let path = self.record_path(&name);
        let file = File::open(&path)
            .map_err(|e| CensusError::storage(format!("opening {}", path.display()), e))?;
        let len = file
            .metadata()
            .map_err(|e| CensusError::storage(format!("inspecting {}", path.display()), e))?
            .len();
        Ok(RootStream {
            name,
            reader: BufReader::new(file.take(len)),
            filter_total: config.total,
            remaining: config.limit,
            line: 0,
        })
    }

    /// Lazy stream of per-prime groups in ascending prime order.
    pub fn grouped_by_prime(&self, f: &Polynomial) -> Result<GroupedRoots, CensusError> {
        Ok(GroupedRoots {
            stream: self.stream_roots(f, &StreamConfig::default())?,
            pending: None,
            done: false,
        })
    }

    /// Registered polynomials matching the optional filters, ordered by
    /// `(degree, galois_group_id, coefficients)`.
    pub fn list_polynomials(
        &self,
        degree: Option<u32>,
        galois_group_id: Option<u32>,
    ) -> Vec<PolynomialIndexEntry> {
        let index = self.index.lock().unwrap();
        let mut entries: Vec<PolynomialIndexEntry> = index
            .polynomials
            .values()
            .filter(|e| degree.map_or(true, |d| e.degree == d))
            .filter(|e| galois_group_id.map_or(true, |g| e.galois_group_id == g))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            (a.degree, a.galois_group_id, &a.coefficients)
                .cmp(&(b.degree, b.galois_group_id, &b.coefficients))
        });
        entries
    }

    /// The index entry for `f`, or `NotRegistered`.
    pub fn index_entry(&self, f: &Polynomial) -> Result<PolynomialIndexEntry, CensusError> {
        self.index_entry_by_name(&f.name())
    }

    /// Total roots recorded for `f`: from the index, or counted from the
    /// record file when filtering by per-prime root count.
    pub fn count_roots(&self, f: &Polynomial, total: Option<u32>) -> Result<u64, CensusError> {
        match total {
            None => Ok(self.index_entry(f)?.root_count),
            Some(t) => {
                let config = StreamConfig {
                    total: Some(t),
                    limit: None,
                };
                let mut n = 0u64;
                for record in self.stream_roots(f, &config)? {
                    record?;
                    n += 1;
                }
                Ok(n)
            }
        }
    }

    /// Recompute `root_count`/`last_prime` from the record file and report
    /// any disagreement with the index. Touches nothing.
    pub fn verify_index(&self, f: &Polynomial) -> Result<IndexReport, CensusError> {
        let name = f.name();
        let entry = self.index_entry_by_name(&name)?;
        let scan = scan_records(&self.record_path(&name), &name)?;
        let report = IndexReport {
            name: name.clone(),
            index_count: entry.root_count,
            index_prime: entry.last_prime,
            record_count: scan.count,
            record_prime: scan.last_prime,
            incomplete_tail: scan.truncate_at.is_some(),
        };
        if !report.is_consistent() {
            log::warn!(
                "index drift for {}: index ({}, {}) vs records ({}, {})",
                name,
                report.index_count,
                report.index_prime,
                report.record_count,
                report.record_prime
            );
        }
        Ok(report)
    }

    /// Rescan every record file and correct the index from observed state.
    /// A trailing prime group shorter than its own `total_for_prime` (the
    /// only shape a torn append can take) is truncated; complete orphan
    /// records ahead of the index are adopted. Returns the number of
    /// entries repaired.
    pub fn rebuild_index(&self) -> Result<usize, CensusError> {
        let mut index = self.index.lock().unwrap();
        let names: Vec<String> = index.polynomials.keys().cloned().collect();
        let mut repaired = 0usize;

        for name in names {
            let path = self.record_path(&name);
            let scan = scan_records(&path, &name)?;
            let mut changed = false;

            if let Some(at) = scan.truncate_at {
                log::warn!(
                    "truncating incomplete trailing records in {} at byte {}",
                    path.display(),
                    at
                );
                let file = OpenOptions::new()
                    .write(true)
                    .open(&path)
                    .map_err(|e| CensusError::storage(format!("opening {}", path.display()), e))?;
                file.set_len(at)
                    .map_err(|e| CensusError::storage(format!("truncating {}", path.display()), e))?;
                changed = true;
            }

            let entry = index
                .polynomials
                .get_mut(&name)
                .ok_or_else(|| CensusError::NotRegistered { name: name.clone() })?;
            if scan.count != entry.root_count || scan.last_prime > entry.last_prime {
                // Fewer records than the index claims means data was lost:
                // fall back so the missing range gets recomputed. More
                // records means an uncommitted extension: adopt it.
                let new_last = if scan.count < entry.root_count {
                    scan.last_prime
                } else {
                    entry.last_prime.max(scan.last_prime)
                };
                log::warn!(
                    "rebuilding index entry for {}: roots {} -> {}, last prime {} -> {}",
                    name,
                    entry.root_count,
                    scan.count,
                    entry.last_prime,
                    new_last
                );
                entry.root_count = scan.count;
                entry.last_prime = new_last;
                changed = true;
            }
            if changed {
                repaired += 1;
            }
        }

        if repaired > 0 {
            self.persist(&index)?;
        }
        Ok(repaired)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", name))
    }

    fn index_entry_by_name(&self, name: &str) -> Result<PolynomialIndexEntry, CensusError> {
        self.index
            .lock()
            .unwrap()
            .polynomials
            .get(name)
            .cloned()
            .ok_or_else(|| CensusError::NotRegistered {
                name: name.to_string(),
            })
    }

    fn poly_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Atomic index rewrite: temp file then rename.
    fn persist(&self, index: &IndexFile) -> Result<(), CensusError> {
        let json = serde_json::to_string_pretty(index).map_err(|e| CensusError::MalformedIndex {
            path: INDEX_FILE.to_string(),
            reason: e.to_string(),
        })?;
        let tmp = self.dir.join("index.json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| CensusError::storage(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, self.dir.join(INDEX_FILE))
            .map_err(|e| CensusError::storage("committing index".to_string(), e))?;
        Ok(())
    }
}

/// Streaming reader over one polynomial's record file. Yields records in
/// `(prime, root)` order; a final unterminated line (torn write) is
/// ignored rather than surfaced, since it is invisible to the snapshot
/// contract and repaired by `rebuild_index`.
pub struct RootStream {
    name: String,
    reader: BufReader<std::io::Take<File>>,
    filter_total: Option<u32>,
    remaining: Option<u64>,
    line: u64,
}

impl Iterator for RootStream {
    type Item = Result<RootRecord, CensusError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            let mut line = String::new();
            let n = match self.reader.read_line(&mut line) {
                Ok(n) => n,
                Err(e) => {
                    self.remaining = Some(0);
                    return Some(Err(CensusError::storage(
                        format!("reading records for {}", self.name),
                        e,
                    )));
                }
            };
            if n == 0 {
                return None;
            }
            self.line += 1;
            if !line.ends_with('\n') {
                // torn tail within the snapshot
                return None;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RootRecord>(trimmed) {
                Ok(record) => {
                    if let Some(t) = self.filter_total {
                        if record.total_for_prime != t {
                            continue;
                        }
                    }
                    if let Some(rem) = self.remaining.as_mut() {
                        *rem -= 1;
                    }
                    return Some(Ok(record));
                }
                Err(e) => {
                    self.remaining = Some(0);
                    return Some(Err(CensusError::Corrupt {
                        name: self.name.clone(),
                        line: self.line,
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }
}

/// Adapter grouping a [`RootStream`] into per-prime batches.
pub struct GroupedRoots {
    stream: RootStream,
    pending: Option<RootRecord>,
    done: bool,
}

impl Iterator for GroupedRoots {
    type Item = Result<PrimeGroup, CensusError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let first = match self.pending.take() {
            Some(r) => r,
            None => match self.stream.next() {
                Some(Ok(r)) => r,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            },
        };
        let prime = first.prime;
        let mut records = vec![first];
        loop {
            match self.stream.next() {
                Some(Ok(r)) if r.prime == prime => records.push(r),
                Some(Ok(r)) => {
                    self.pending = Some(r);
                    break;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => break,
            }
        }
        Some(Ok(PrimeGroup { prime, records }))
    }
}

struct ScanResult {
    count: u64,
    last_prime: u64,
    /// Byte offset at which a crash remnant starts, if one exists.
    truncate_at: Option<u64>,
}

/// Sequential scan of a record file: count, highest fully-recorded prime,
/// and the truncation point for any incomplete tail. Performs no repair.
fn scan_records(path: &Path, name: &str) -> Result<ScanResult, CensusError> {
    let file = File::open(path)
        .map_err(|e| CensusError::storage(format!("opening {}", path.display()), e))?;
    let mut reader = BufReader::new(file);

    let mut offset = 0u64;
    let mut group_start = 0u64;
    let mut group: Vec<RootRecord> = Vec::new();
    let mut count = 0u64;
    let mut last_prime = 0u64;
    let mut truncate_at: Option<u64> = None;
    let mut line_no = 0u64;

    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| CensusError::storage(format!("reading {}", path.display()), e))?
            as u64;
        if n == 0 {
            break;
        }
        line_no += 1;
        if !line.ends_with('\n') {
            truncate_at = Some(offset);
            break;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            offset += n;
            continue;
        }
        let record: RootRecord =
            serde_json::from_str(trimmed).map_err(|e| CensusError::Corrupt {
                name: name.to_string(),
                line: line_no,
                reason: e.to_string(),
            })?;
        if group.last().map(|g| g.prime) != Some(record.prime) {
            if !group.is_empty() {
                count += group.len() as u64;
                last_prime = group[0].prime;
            }
            group.clear();
            group_start = offset;
        }
        group.push(record);
        offset += n;
    }

    if !group.is_empty() {
        let expected = group[0].total_for_prime as u64;
        if group.len() as u64 == expected {
            // complete: a torn fragment after it (if any) is cut on its own
            count += group.len() as u64;
            last_prime = group[0].prime;
        } else {
            // short of its own total: the whole group is a crash remnant
            truncate_at = Some(group_start);
        }
    }

    Ok(ScanResult {
        count,
        last_prime,
        truncate_at,
    })
}

/// Read the last complete record of a file without a full scan (backward
/// window from EOF). Returns the record, if any, and whether the file ends
/// cleanly on a newline.
fn last_record(path: &Path, name: &str) -> Result<(Option<RootRecord>, bool), CensusError> {
    const WINDOW: u64 = 8192;
    let mut file = File::open(path)
        .map_err(|e| CensusError::storage(format!("opening {}", path.display()), e))?;
    let len = file
        .metadata()
        .map_err(|e| CensusError::storage(format!("inspecting {}", path.display()), e))?
        .len();
    if len == 0 {
        return Ok((None, true));
    }
    let start = len.saturating_sub(WINDOW);
    file.seek(SeekFrom::Start(start))
        .map_err(|e| CensusError::storage(format!("seeking {}", path.display()), e))?;
    let mut chunk = String::new();
    file.read_to_string(&mut chunk)
        .map_err(|e| CensusError::storage(format!("reading tail of {}", path.display()), e))?;

    let clean = chunk.ends_with('\n');
    let last_line = chunk
        .split('\n')
        .rev()
        .skip(if clean { 0 } else { 1 })
        .find(|l| !l.trim().is_empty());
    let record = match last_line {
        // A window landing mid-file always contains at least one full line
        // (records are far shorter than the window), so a parse failure
        // here is real corruption.
        Some(line) => Some(serde_json::from_str::<RootRecord>(line).map_err(|e| {
            CensusError::Corrupt {
                name: name.to_string(),
                line: 0,
                reason: e.to_string(),
            }
        })?),
        None => None,
    };
    Ok((record, clean))
}
