//! Prime enumeration: deterministic Miller-Rabin for u64 and increasing
//! prime streams that never skip or repeat a prime.

/// Modular exponentiation: base^exp mod m using the binary method.
pub fn mod_pow(base: u64, mut exp: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }
    let m = m as u128;
    let mut result = 1u128;
    let mut b = base as u128 % m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        exp >>= 1;
        b = b * b % m;
    }
    result as u64
}

/// Deterministic Miller-Rabin primality test, valid for all u64.
/// Uses witnesses {2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37}.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    // Write n-1 = 2^s * d with d odd
    let mut d = n - 1;
    let mut s = 0u32;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    let witnesses = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    'outer: for &a in &witnesses {
        if a >= n {
            continue;
        }
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..s - 1 {
            x = (x as u128 * x as u128 % n as u128) as u64;
            if x == n - 1 {
                continue 'outer;
            }
        }
        return false;
    }
    true
}

/// Smallest prime strictly greater than `n`, or None past u64 range.
pub fn next_prime(n: u64) -> Option<u64> {
    if n < 2 {
        return Some(2);
    }
    let mut candidate = n.checked_add(1)?;
    if candidate % 2 == 0 {
        candidate = candidate.checked_add(1)?;
    }
    loop {
        if is_prime(candidate) {
            return Some(candidate);
        }
        candidate = candidate.checked_add(2)?;
    }
}

/// Smallest prime greater than or equal to `n`.
pub fn first_prime_from(n: u64) -> Option<u64> {
    if n <= 2 {
        return Some(2);
    }
    if is_prime(n) {
        return Some(n);
    }
    next_prime(n)
}

/// Largest prime strictly below `n`, or None if there is none.
pub fn last_prime_below(n: u64) -> Option<u64> {
    (2..n).rev().find(|&m| is_prime(m))
}

/// Increasing stream of primes in the half-open interval `[lo, hi)`.
pub fn primes_in(lo: u64, hi: u64) -> PrimeRange {
    PrimeRange {
        next: first_prime_from(lo),
        hi,
    }
}

/// Increasing stream of primes starting at the first prime >= `lo`.
pub fn primes_from(lo: u64) -> PrimeRange {
    primes_in(lo, u64::MAX)
}

/// Iterator over primes in a half-open range, in ascending order.
#[derive(Debug, Clone)]
pub struct PrimeRange {
    next: Option<u64>,
    hi: u64,
}

impl Iterator for PrimeRange {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let p = self.next?;
        if p >= self.hi {
            self.next = None;
            return None;
        }
        self.next = next_prime(p);
        Some(p)
    }
}

/// Sieve of Eratosthenes up to and including `limit`. Ground truth for
/// testing the stream; also handy for small factor bases.
pub fn sieve_primes(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return Vec::new();
    }
    let size = limit as usize + 1;
    let mut composite = vec![false; size];
    let mut primes = Vec::new();
    for i in 2..size {
        if !composite[i] {
            primes.push(i as u64);
            let mut j = i * i;
            while j < size {
                composite[j] = true;
                j += i;
            }
        }
    }
    primes
}
