//! Root solving: for each prime `p` in a range, every residue `r` in
//! `[0, p)` with `f(r) = 0 mod p`.
//!
//! Two paths produce identical output: the general residue scan, and a
//! half-range scan for even polynomials that mirrors each root `x` to
//! `p - x`. The solver is pure and range-pure; resumption bookkeeping
//! belongs to the store.

use rayon::prelude::*;

use crate::error::CensusError;
use crate::poly::Polynomial;
use crate::primes;
use crate::record::RootRecord;

/// Solve `[p_low, p_high)`, picking the symmetric path automatically for
/// even polynomials. Records come back ordered by `(prime, root)`.
pub fn solve(f: &Polynomial, p_low: u64, p_high: u64) -> Result<Vec<RootRecord>, CensusError> {
    if f.is_even() && f.degree() > 0 {
        solve_range_even(f, p_low, p_high)
    } else {
        solve_range(f, p_low, p_high)
    }
}

/// General path: scan every residue of every prime in `[p_low, p_high)`.
/// `p_low` is advanced to the next prime if composite. A nonzero polynomial
/// of degree `d` has at most `d` roots mod p, so each scan stops early once
/// `d` roots are collected.
pub fn solve_range(f: &Polynomial, p_low: u64, p_high: u64) -> Result<Vec<RootRecord>, CensusError> {
    validate(f)?;
    if f.degree() == 0 {
        return Ok(Vec::new());
    }
    solve_with(f, p_low, p_high, roots_mod)
}

/// Even-polynomial path: roots mod an odd prime come in pairs `{x, p - x}`,
/// so scanning `[0, (p+1)/2)` and mirroring covers everything. Prime 2 has
/// no usable symmetry and is tested directly on {0, 1}. Output is identical
/// to [`solve_range`], ordering included.
pub fn solve_range_even(
    f: &Polynomial,
    p_low: u64,
    p_high: u64,
) -> Result<Vec<RootRecord>, CensusError> {
    validate(f)?;
    if !f.is_even() {
        return Err(CensusError::InvalidPolynomial {
            name: f.name(),
            reason: String::from("not an even polynomial"),
        });
    }
    if f.degree() == 0 {
        return Ok(Vec::new());
    }
    solve_with(f, p_low, p_high, roots_mod_even)
}

fn validate(f: &Polynomial) -> Result<(), CensusError> {
    if f.is_zero() {
        return Err(CensusError::InvalidPolynomial {
            name: f.name(),
            reason: String::from("the zero polynomial has roots everywhere"),
        });
    }
    Ok(())
}

/// Fan per-prime scans out across threads; flattening the per-prime vectors
/// back in prime order keeps the output deterministic.
fn solve_with(
    f: &Polynomial,
    p_low: u64,
    p_high: u64,
    roots_of: fn(&Polynomial, u64) -> Vec<u64>,
) -> Result<Vec<RootRecord>, CensusError> {
    let primes: Vec<u64> = primes::primes_in(p_low, p_high).collect();
    log::debug!(
        "solving {} over {} primes in [{}, {})",
        f,
        primes.len(),
        p_low,
        p_high
    );
    let groups: Vec<Vec<RootRecord>> = primes
        .par_iter()
        .map(|&p| records_for_prime(p, roots_of(f, p)))
        .collect();
    Ok(groups.into_iter().flatten().collect())
}

/// All roots of `f` mod `p` by direct scan, ascending, capped at degree.
fn roots_mod(f: &Polynomial, p: u64) -> Vec<u64> {
    let cap = f.degree() as usize;
    let mut roots = Vec::new();
    for x in 0..p {
        if f.eval_mod(x, p) == 0 {
            roots.push(x);
            if roots.len() == cap {
                break;
            }
        }
    }
    roots
}

/// Half-range scan for even `f`: collect roots in `[0, (p+1)/2)`, then
/// mirror `x -> p - x` (0 is its own mirror and is not doubled). Mirrors of
/// descending low roots land ascending above `(p-1)/2`, so the combined
/// list is already sorted.
fn roots_mod_even(f: &Polynomial, p: u64) -> Vec<u64> {
    if p == 2 {
        return (0..2).filter(|&x| f.eval_mod(x, 2) == 0).collect();
    }
    let cap = f.degree() as usize;
    let mut low = Vec::new();
    for x in 0..(p + 1) / 2 {
        if f.eval_mod(x, p) == 0 {
            low.push(x);
            if low.len() == cap {
                break;
            }
        }
    }
    let mut roots = low.clone();
    for &x in low.iter().rev() {
        if x != 0 {
            roots.push(p - x);
        }
    }
    roots.truncate(cap);
    roots
}

fn records_for_prime(prime: u64, roots: Vec<u64>) -> Vec<RootRecord> {
    let total = roots.len() as u32;
    roots
        .into_iter()
        .enumerate()
        .map(|(i, root)| RootRecord {
            root,
            prime,
            normalized: root as f64 / prime as f64,
            rank: i as u32 + 1,
            total_for_prime: total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuples(records: &[RootRecord]) -> Vec<(u64, u64)> {
        records.iter().map(|r| (r.prime, r.root)).collect()
    }

    #[test]
    fn test_x_squared_minus_two_scenario() {
        // 2 is a quadratic residue only mod p = 2 and p = +-1 mod 8
        let f = Polynomial::new(vec![-2, 0, 1]);
        let records = solve_range(&f, 3, 20).unwrap();
        assert_eq!(tuples(&records), vec![(7, 3), (7, 4), (17, 6), (17, 11)]);
        for r in &records {
            assert!(r.total_for_prime <= 2);
            assert_eq!(r.total_for_prime, 2);
            assert!(r.root < r.prime);
            assert_eq!(r.normalized, r.root as f64 / r.prime as f64);
        }
        assert_eq!(records[0].rank, 1);
        assert_eq!(records[1].rank, 2);
    }

    #[test]
    fn test_prime_two_root_at_zero() {
        let f = Polynomial::new(vec![-2, 0, 1]);
        let records = solve_range(&f, 2, 3).unwrap();
        assert_eq!(tuples(&records), vec![(2, 0)]);
        assert_eq!(records[0].total_for_prime, 1);
        assert_eq!(records[0].normalized, 0.0);
    }

    #[test]
    fn test_even_path_matches_general() {
        for coeffs in [
            vec![-2i64, 0, 1],          // x^2 - 2
            vec![-2, 0, 0, 0, 1],       // x^4 - 2
            vec![3, 0, -5, 0, 2],       // 2x^4 - 5x^2 + 3
            vec![1, 0, 1],              // x^2 + 1, no roots mod p = 3 mod 4
        ] {
            let f = Polynomial::new(coeffs);
            let general = solve_range(&f, 2, 200).unwrap();
            let even = solve_range_even(&f, 2, 200).unwrap();
            assert_eq!(general, even, "mismatch for {}", f);
        }
    }

    #[test]
    fn test_even_path_rejects_odd_polynomial() {
        let f = Polynomial::new(vec![0, 1]);
        assert!(matches!(
            solve_range_even(&f, 2, 10),
            Err(CensusError::InvalidPolynomial { .. })
        ));
    }

    #[test]
    fn test_matches_brute_force() {
        let f = Polynomial::new(vec![-7, 4, 0, 1]); // x^3 + 4x - 7
        let records = solve_range(&f, 2, 100).unwrap();
        for p in crate::primes::primes_in(2, 100) {
            let expected: Vec<u64> = (0..p).filter(|&x| f.eval_mod(x, p) == 0).collect();
            let found: Vec<u64> = records
                .iter()
                .filter(|r| r.prime == p)
                .map(|r| r.root)
                .collect();
            assert_eq!(found, expected, "p = {}", p);
            assert!(found.len() as u32 <= f.degree());
        }
    }

    #[test]
    fn test_degree_cap_when_content_shared_with_prime() {
        // 3x mod 3 vanishes everywhere; the degree bound caps collection
        let f = Polynomial::new(vec![0, 3]);
        let records = solve_range(&f, 3, 4).unwrap();
        assert_eq!(tuples(&records), vec![(3, 0)]);
    }

    #[test]
    fn test_constant_polynomial_has_no_roots() {
        let f = Polynomial::new(vec![5]);
        assert!(solve_range(&f, 2, 100).unwrap().is_empty());
    }

    #[test]
    fn test_zero_polynomial_rejected() {
        let f = Polynomial::new(vec![0]);
        assert!(matches!(
            solve_range(&f, 2, 10),
            Err(CensusError::InvalidPolynomial { .. })
        ));
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let f = Polynomial::new(vec![-2, 0, 1]);
        assert!(solve_range(&f, 50, 10).unwrap().is_empty());
    }

    #[test]
    fn test_composite_lower_bound_advanced() {
        let f = Polynomial::new(vec![-2, 0, 1]);
        // 6 advances to 7; identical to asking from 7
        assert_eq!(
            solve_range(&f, 6, 20).unwrap(),
            solve_range(&f, 7, 20).unwrap()
        );
    }
}
