//! Roots of integer polynomials modulo primes.
//!
//! Given a polynomial `f` and a prime range, the solver finds every residue
//! `r` with `f(r) = 0 mod p` for each prime `p`, exploiting the reflection
//! symmetry of even polynomials. The store persists the resulting records
//! incrementally: extension resumes where the last run stopped, survives
//! crashes detectably, and streams its ordered output. The aggregation
//! layer turns that stream into bucket densities and time series for
//! equidistribution experiments.
//!
//! Symbolic algebra (irreducibility, Galois groups) is a caller-side
//! concern: the engine stores an opaque group id and never computes one.

pub mod aggregate;
pub mod error;
pub mod poly;
pub mod primes;
pub mod record;
pub mod solver;
pub mod store;

pub use error::CensusError;
pub use poly::Polynomial;
pub use record::{PrimeGroup, RootRecord};
pub use store::{
    ExtendOutcome, IndexReport, PolynomialIndexEntry, RegisterOutcome, RootStore, StreamConfig,
};
