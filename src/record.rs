//! The canonical root tuple and its grouped-by-prime view.

use serde::{Deserialize, Serialize};

/// One discovered root of `f` modulo a prime.
///
/// Invariants, maintained by the solver and preserved by the store:
/// - `0 <= root < prime`
/// - `normalized == root as f64 / prime as f64` (stored once for cheap
///   aggregation)
/// - `rank` runs 1..=`total_for_prime` within a prime's group, assigned by
///   ascending root
/// - `total_for_prime <= degree(f)`
/// - the full record set for a polynomial is totally ordered by
///   `(prime, root)` ascending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootRecord {
    pub root: u64,
    pub prime: u64,
    pub normalized: f64,
    pub rank: u32,
    pub total_for_prime: u32,
}

/// All roots sharing one prime, in ascending root order.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimeGroup {
    pub prime: u64,
    pub records: Vec<RootRecord>,
}

impl PrimeGroup {
    /// The raw residues of this group, ascending.
    pub fn roots(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.root).collect()
    }
}
