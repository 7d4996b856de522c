//! Streaming aggregation over a store's ordered record stream: bucket
//! partitions of normalized roots, cumulative density snapshots (by root
//! count or by prime), and the square-distance-from-uniform statistic used
//! for equidistribution testing.
//!
//! Everything here consumes [`RootStore::stream_roots`] lazily; nothing
//! materializes the full record set.

use crate::error::CensusError;
use crate::poly::Polynomial;
use crate::primes;
use crate::store::{RootStore, StreamConfig};

/// Options for [`density_series`]: cumulative snapshots every `interval`
/// roots, optionally primed by a first snapshot after `start` roots, over
/// records optionally filtered by per-prime root count.
#[derive(Debug, Clone, Copy)]
pub struct SeriesConfig {
    pub precision: usize,
    pub interval: u64,
    pub start: Option<u64>,
    pub total: Option<u32>,
}

/// Options for [`density_by_prime`]: snapshots every `skip` distinct
/// primes, suppressed (but still accumulating) below the `start` prime.
#[derive(Debug, Clone, Copy)]
pub struct PrimeSeriesConfig {
    pub precision: usize,
    pub skip: u64,
    pub start: Option<u64>,
    pub total: Option<u32>,
}

/// Bucket index of a normalized root in `precision` equal-width bins.
pub fn bucket(normalized: f64, precision: usize) -> usize {
    assert!(precision >= 1, "precision must be at least 1");
    let b = (normalized * precision as f64).floor() as usize;
    b.min(precision - 1)
}

/// Lazy sequence of bucket indices, one per root, in store order.
pub fn partition(
    store: &RootStore,
    f: &Polynomial,
    precision: usize,
) -> Result<Partitions, CensusError> {
    partition_filtered(store, f, precision, None)
}

fn partition_filtered(
    store: &RootStore,
    f: &Polynomial,
    precision: usize,
    total: Option<u32>,
) -> Result<Partitions, CensusError> {
    assert!(precision >= 1, "precision must be at least 1");
    let config = StreamConfig { total, limit: None };
    Ok(Partitions {
        stream: store.stream_roots(f, &config)?,
        precision,
    })
}

/// Iterator of bucket indices over a record stream.
pub struct Partitions {
    stream: crate::store::RootStream,
    precision: usize,
}

impl Iterator for Partitions {
    type Item = Result<usize, CensusError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.stream.next()?;
        Some(record.map(|r| bucket(r.normalized, self.precision)))
    }
}

/// Relative frequency per bucket over all recorded roots. `None` when no
/// roots are recorded yet (density of nothing is undefined, not a fault).
pub fn density(
    store: &RootStore,
    f: &Polynomial,
    precision: usize,
) -> Result<Option<Vec<f64>>, CensusError> {
    let mut counts = vec![0u64; precision];
    for b in partition(store, f, precision)? {
        counts[b?] += 1;
    }
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return Ok(None);
    }
    Ok(Some(
        counts.iter().map(|&c| c as f64 / total as f64).collect(),
    ))
}

/// Cumulative density snapshots every `config.interval` roots, plus an
/// optional priming snapshot after `config.start` roots and a final
/// snapshot for any remainder. Each snapshot covers everything from the
/// first record, not a sliding window.
pub fn density_series(
    store: &RootStore,
    f: &Polynomial,
    config: &SeriesConfig,
) -> Result<DensitySeries, CensusError> {
    assert!(config.interval >= 1, "interval must be at least 1");
    Ok(DensitySeries {
        parts: partition_filtered(store, f, config.precision, config.total)?,
        counts: vec![0u64; config.precision],
        seen: 0,
        since_snapshot: 0,
        interval: config.interval,
        start: config.start.filter(|&s| s > 0),
        primed: false,
        finished: false,
    })
}

/// Iterator of cumulative density snapshots by root count.
pub struct DensitySeries {
    parts: Partitions,
    counts: Vec<u64>,
    seen: u64,
    since_snapshot: u64,
    interval: u64,
    start: Option<u64>,
    primed: bool,
    finished: bool,
}

impl DensitySeries {
    fn snapshot(&self) -> Vec<f64> {
        self.counts
            .iter()
            .map(|&c| c as f64 / self.seen as f64)
            .collect()
    }
}

impl Iterator for DensitySeries {
    type Item = Result<Vec<f64>, CensusError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if let Some(start) = self.start {
            if !self.primed {
                self.primed = true;
                while self.seen < start {
                    match self.parts.next() {
                        Some(Ok(b)) => {
                            self.counts[b] += 1;
                            self.seen += 1;
                        }
                        Some(Err(e)) => {
                            self.finished = true;
                            return Some(Err(e));
                        }
                        None => break,
                    }
                }
                if self.seen == 0 {
                    self.finished = true;
                    return None;
                }
                return Some(Ok(self.snapshot()));
            }
        }

        loop {
            match self.parts.next() {
                Some(Ok(b)) => {
                    self.counts[b] += 1;
                    self.seen += 1;
                    self.since_snapshot += 1;
                    if self.since_snapshot == self.interval {
                        self.since_snapshot = 0;
                        return Some(Ok(self.snapshot()));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    if self.since_snapshot > 0 {
                        return Some(Ok(self.snapshot()));
                    }
                    return None;
                }
            }
        }
    }
}

/// Cumulative density snapshots taken once every `config.skip` distinct
/// primes, each paired with the prime at which it was taken. With a
/// `start` prime, accumulation begins immediately but the first snapshot
/// is emitted at the first prime >= `start`.
pub fn density_by_prime(
    store: &RootStore,
    f: &Polynomial,
    config: &PrimeSeriesConfig,
) -> Result<PrimeDensitySeries, CensusError> {
    assert!(config.skip >= 1, "skip must be at least 1");
    assert!(config.precision >= 1, "precision must be at least 1");
    // grouped_by_prime has no per-record filter; apply `total` per group
    Ok(PrimeDensitySeries {
        groups: store.grouped_by_prime(f)?,
        counts: vec![0u64; config.precision],
        precision: config.precision,
        seen: 0,
        skip: config.skip,
        start: config.start,
        total: config.total,
        groups_since: 0,
        primed: false,
        finished: false,
    })
}

/// Iterator of `(density, prime)` snapshots by distinct prime.
pub struct PrimeDensitySeries {
    groups: crate::store::GroupedRoots,
    counts: Vec<u64>,
    precision: usize,
    seen: u64,
    skip: u64,
    start: Option<u64>,
    total: Option<u32>,
    groups_since: u64,
    primed: bool,
    finished: bool,
}

impl PrimeDensitySeries {
    fn snapshot(&self) -> Vec<f64> {
        self.counts
            .iter()
            .map(|&c| c as f64 / self.seen as f64)
            .collect()
    }
}

impl Iterator for PrimeDensitySeries {
    type Item = Result<(Vec<f64>, u64), CensusError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let group = match self.groups.next() {
                Some(Ok(g)) => g,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };
            if let Some(t) = self.total {
                if group.records.len() as u32 != t {
                    continue;
                }
            }
            for record in &group.records {
                self.counts[bucket(record.normalized, self.precision)] += 1;
                self.seen += 1;
            }

            if let Some(start) = self.start {
                if !self.primed {
                    if group.prime < start {
                        continue;
                    }
                    self.primed = true;
                    self.groups_since = 0;
                    return Some(Ok((self.snapshot(), group.prime)));
                }
            }

            self.groups_since += 1;
            if self.groups_since == self.skip {
                self.groups_since = 0;
                return Some(Ok((self.snapshot(), group.prime)));
            }
        }
    }
}

/// Sum over buckets of `(observed - 1/k)^2`: a scalar closeness-to-uniform
/// statistic, smaller is closer to uniform.
pub fn square_distance_from_uniform(density: &[f64]) -> f64 {
    if density.is_empty() {
        return 0.0;
    }
    let uniform = 1.0 / density.len() as f64;
    density.iter().map(|d| (d - uniform) * (d - uniform)).sum()
}

/// Fraction of primes up to `last_prime` having exactly `k` roots, for
/// `k` in `[0, degree]`. Primes absent from the record stream contributed
/// zero roots; the prime stream fills them in. `None` before any extension
/// has run.
pub fn prime_tally(
    store: &RootStore,
    f: &Polynomial,
) -> Result<Option<Vec<f64>>, CensusError> {
    let entry = store.index_entry(f)?;
    if entry.last_prime < 2 {
        return Ok(None);
    }
    let degree = entry.degree as usize;
    let mut tally = vec![0u64; degree + 1];
    let mut groups = store.grouped_by_prime(f)?;
    let mut next_group = groups.next().transpose()?;

    for p in primes::primes_in(2, entry.last_prime + 1) {
        match &next_group {
            Some(g) if g.prime == p => {
                tally[g.records.len().min(degree)] += 1;
                next_group = groups.next().transpose()?;
            }
            _ => tally[0] += 1,
        }
    }

    let total: u64 = tally.iter().sum();
    Ok(Some(
        tally.iter().map(|&c| c as f64 / total as f64).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> (tempfile::TempDir, RootStore, Polynomial) {
        let dir = tempfile::tempdir().unwrap();
        let store = RootStore::open(dir.path()).unwrap();
        let f = Polynomial::new(vec![-2, 0, 1]); // x^2 - 2
        store.register(&f, 2).unwrap();
        store.extend_roots(&f, 100).unwrap(); // 23 roots, last prime 97
        (dir, store, f)
    }

    #[test]
    fn test_bucket_mapping() {
        // the concrete partition scenario: precision 4 over these
        // normalized values lands one root in each bucket
        let normalized = [0.1, 0.3, 0.6, 0.9];
        let buckets: Vec<usize> = normalized.iter().map(|&v| bucket(v, 4)).collect();
        assert_eq!(buckets, vec![0, 1, 2, 3]);
        assert_eq!(bucket(0.0, 4), 0);
        assert_eq!(bucket(0.999999, 4), 3);
        assert_eq!(bucket(0.25, 4), 1);
    }

    #[test]
    #[should_panic(expected = "precision must be at least 1")]
    fn test_bucket_rejects_zero_precision() {
        bucket(0.5, 0);
    }

    #[test]
    fn test_partition_streams_in_store_order() {
        let (_dir, store, f) = seeded_store();
        let buckets: Vec<usize> = partition(&store, &f, 10)
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(buckets.len(), 23);
        // first records: (2,0) -> 0.0, (7,3) -> 3/7, (7,4) -> 4/7
        assert_eq!(&buckets[..3], &[0, 4, 5]);
    }

    #[test]
    fn test_density_sums_to_one() {
        let (_dir, store, f) = seeded_store();
        for precision in [1usize, 4, 7, 50] {
            let d = density(&store, &f, precision).unwrap().unwrap();
            assert_eq!(d.len(), precision);
            let sum: f64 = d.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "precision {}: {}", precision, sum);
        }
    }

    #[test]
    fn test_density_of_empty_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = RootStore::open(dir.path()).unwrap();
        let f = Polynomial::new(vec![-2, 0, 1]);
        store.register(&f, 2).unwrap();
        assert_eq!(density(&store, &f, 10).unwrap(), None);
        assert_eq!(prime_tally(&store, &f).unwrap(), None);
    }

    #[test]
    fn test_density_series_snapshot_cadence() {
        let (_dir, store, f) = seeded_store();
        let config = SeriesConfig {
            precision: 5,
            interval: 10,
            start: None,
            total: None,
        };
        let snapshots: Vec<Vec<f64>> = density_series(&store, &f, &config)
            .unwrap()
            .map(|s| s.unwrap())
            .collect();
        // 23 roots: snapshots at 10, 20, and the remainder of 3
        assert_eq!(snapshots.len(), 3);
        for s in &snapshots {
            let sum: f64 = s.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_density_series_with_priming_start() {
        let (_dir, store, f) = seeded_store();
        let config = SeriesConfig {
            precision: 5,
            interval: 10,
            start: Some(5),
            total: None,
        };
        let snapshots: Vec<Vec<f64>> = density_series(&store, &f, &config)
            .unwrap()
            .map(|s| s.unwrap())
            .collect();
        // priming at 5, then 15, then the remainder at 23
        assert_eq!(snapshots.len(), 3);
    }

    #[test]
    fn test_density_by_prime_cadence() {
        let (_dir, store, f) = seeded_store();
        let config = PrimeSeriesConfig {
            precision: 5,
            skip: 3,
            start: None,
            total: None,
        };
        let primes_at: Vec<u64> = density_by_prime(&store, &f, &config)
            .unwrap()
            .map(|s| s.unwrap().1)
            .collect();
        // contributing primes: 2, 7, 17, 23, 31, 41, 47, 71, 73, 79, 89, 97
        assert_eq!(primes_at, vec![17, 41, 73, 97]);
    }

    #[test]
    fn test_density_by_prime_with_start() {
        let (_dir, store, f) = seeded_store();
        let config = PrimeSeriesConfig {
            precision: 5,
            skip: 3,
            start: Some(30),
            total: None,
        };
        let series: Vec<(Vec<f64>, u64)> = density_by_prime(&store, &f, &config)
            .unwrap()
            .map(|s| s.unwrap())
            .collect();
        // primed at the first contributing prime >= 30, then every 3rd
        let primes_at: Vec<u64> = series.iter().map(|s| s.1).collect();
        assert_eq!(primes_at, vec![31, 71, 89]);
        // accumulation below the start prime is included in the snapshot
        let sum: f64 = series[0].0.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_square_distance_from_uniform() {
        assert_eq!(square_distance_from_uniform(&[0.25; 4]), 0.0);
        let skewed = [1.0, 0.0, 0.0, 0.0];
        let expected = (0.75f64 * 0.75) + 3.0 * (0.25 * 0.25);
        assert!((square_distance_from_uniform(&skewed) - expected).abs() < 1e-12);
        assert_eq!(square_distance_from_uniform(&[]), 0.0);
    }

    #[test]
    fn test_prime_tally_counts_rootless_primes() {
        let (_dir, store, f) = seeded_store();
        let tally = prime_tally(&store, &f).unwrap().unwrap();
        assert_eq!(tally.len(), 3); // degree 2 -> totals 0, 1, 2
        // 25 primes <= 97; 12 contribute (2 with one root, 11 with two)
        let primes_total = 25.0;
        assert!((tally[0] - 13.0 / primes_total).abs() < 1e-12);
        assert!((tally[1] - 1.0 / primes_total).abs() < 1e-12);
        assert!((tally[2] - 11.0 / primes_total).abs() < 1e-12);
        let sum: f64 = tally.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
}
