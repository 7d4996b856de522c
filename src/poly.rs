//! Integer polynomials: coefficient identity, evenness, and modular
//! evaluation over u64 residues with u128 intermediates.

use num_integer::Integer;

use crate::error::CensusError;

/// A polynomial with integer coefficients `c_0 + c_1 x + ... + c_n x^n`.
///
/// The coefficient sequence *is* the identity: two polynomials with
/// different sequences are distinct even when numerically related. Trailing
/// zero coefficients are trimmed on construction so the identity is
/// canonical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Polynomial {
    coeffs: Vec<i64>,
}

impl Polynomial {
    /// Build from coefficients `c_0..c_n`, trimming trailing zeros.
    pub fn new(mut coeffs: Vec<i64>) -> Polynomial {
        while coeffs.len() > 1 && coeffs.last() == Some(&0) {
            coeffs.pop();
        }
        if coeffs.is_empty() {
            coeffs.push(0);
        }
        Polynomial { coeffs }
    }

    /// Build from rational coefficients `numerator/denominator`, clearing
    /// denominators by the lcm. The resulting integer polynomial has the
    /// same roots modulo any prime not dividing the lcm.
    pub fn from_rationals(terms: &[(i64, i64)]) -> Result<Polynomial, CensusError> {
        let mut scale: i64 = 1;
        for &(_, den) in terms {
            if den == 0 {
                return Err(CensusError::InvalidPolynomial {
                    name: String::from("<rational>"),
                    reason: String::from("zero denominator"),
                });
            }
            scale = scale.lcm(&den.abs());
        }
        let coeffs = terms
            .iter()
            .map(|&(num, den)| num * (scale / den))
            .collect();
        Ok(Polynomial::new(coeffs))
    }

    /// Parse the canonical `c0_c1_..._cn` name back into a polynomial.
    /// Inverse of [`Polynomial::name`] on canonical sequences.
    pub fn parse(name: &str) -> Result<Polynomial, CensusError> {
        let coeffs = name
            .split('_')
            .map(|part| part.parse::<i64>())
            .collect::<Result<Vec<i64>, _>>()
            .map_err(|e| CensusError::InvalidPolynomial {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Polynomial::new(coeffs))
    }

    /// Canonical identity string: coefficients joined by `_`,
    /// e.g. `x^2 - 2` is `-2_0_1`. Used as the storage key.
    pub fn name(&self) -> String {
        let parts: Vec<String> = self.coeffs.iter().map(|c| c.to_string()).collect();
        parts.join("_")
    }

    pub fn coefficients(&self) -> &[i64] {
        &self.coeffs
    }

    pub fn degree(&self) -> u32 {
        (self.coeffs.len() - 1) as u32
    }

    /// The identically-zero polynomial. Root solving rejects it.
    pub fn is_zero(&self) -> bool {
        self.coeffs == [0]
    }

    /// True when `f(x) = f(-x)`: every odd-index coefficient is zero.
    /// Even polynomials admit the symmetric half-range root scan.
    pub fn is_even(&self) -> bool {
        self.coeffs
            .iter()
            .enumerate()
            .all(|(i, &c)| i % 2 == 0 || c == 0)
    }

    /// Evaluate `f(x) mod p` by Horner's rule. Coefficients are reduced
    /// into `[0, p)` first; intermediates stay in u128.
    pub fn eval_mod(&self, x: u64, p: u64) -> u64 {
        let pm = p as u128;
        let xm = x as u128 % pm;
        let mut acc: u128 = 0;
        for &c in self.coeffs.iter().rev() {
            let cm = ((c as i128 % p as i128 + p as i128) as u128) % pm;
            acc = (acc * xm + cm) % pm;
        }
        acc as u64
    }
}

impl std::fmt::Display for Polynomial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (i, &c) in self.coeffs.iter().enumerate().rev() {
            if c == 0 && self.coeffs.len() > 1 {
                continue;
            }
            if first {
                if c < 0 {
                    write!(f, "-")?;
                }
                first = false;
            } else if c < 0 {
                write!(f, " - ")?;
            } else {
                write!(f, " + ")?;
            }
            let mag = c.unsigned_abs();
            match i {
                0 => write!(f, "{}", mag)?,
                _ => {
                    if mag != 1 {
                        write!(f, "{}*", mag)?;
                    }
                    if i == 1 {
                        write!(f, "x")?;
                    } else {
                        write!(f, "x^{}", i)?;
                    }
                }
            }
        }
        if first {
            write!(f, "0")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        let f = Polynomial::new(vec![-2, 0, 1]);
        assert_eq!(f.name(), "-2_0_1");
        assert_eq!(Polynomial::parse("-2_0_1").unwrap(), f);
    }

    #[test]
    fn test_trailing_zeros_trimmed() {
        let f = Polynomial::new(vec![1, 2, 0, 0]);
        assert_eq!(f.coefficients(), &[1, 2]);
        assert_eq!(f.degree(), 1);
    }

    #[test]
    fn test_zero_polynomial() {
        let f = Polynomial::new(vec![0, 0, 0]);
        assert!(f.is_zero());
        assert_eq!(f.degree(), 0);
        assert_eq!(f.name(), "0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Polynomial::parse("1_x_3").is_err());
        assert!(Polynomial::parse("").is_err());
    }

    #[test]
    fn test_from_rationals_clears_denominators() {
        // 1/2 + x/3 -> 3 + 2x after scaling by lcm(2,3) = 6
        let f = Polynomial::from_rationals(&[(1, 2), (1, 3)]).unwrap();
        assert_eq!(f.coefficients(), &[3, 2]);
        assert!(Polynomial::from_rationals(&[(1, 0)]).is_err());
    }

    #[test]
    fn test_is_even() {
        assert!(Polynomial::new(vec![-2, 0, 1]).is_even()); // x^2 - 2
        assert!(Polynomial::new(vec![5, 0, 0, 0, 3]).is_even()); // 3x^4 + 5
        assert!(!Polynomial::new(vec![0, 1]).is_even()); // x
        assert!(!Polynomial::new(vec![-2, 1, 1]).is_even());
    }

    #[test]
    fn test_eval_mod() {
        let f = Polynomial::new(vec![-2, 0, 1]); // x^2 - 2
        assert_eq!(f.eval_mod(3, 7), 0); // 9 - 2 = 7
        assert_eq!(f.eval_mod(4, 7), 0); // 16 - 2 = 14
        assert_eq!(f.eval_mod(2, 7), 2);
        assert_eq!(f.eval_mod(6, 17), 0); // 36 - 2 = 34
        assert_eq!(f.eval_mod(0, 2), 0); // -2 is even
    }

    #[test]
    fn test_eval_mod_negative_coefficients() {
        let f = Polynomial::new(vec![-7, -3, 2]); // 2x^2 - 3x - 7
        for x in 0..11u64 {
            let direct = (2 * (x as i128) * (x as i128) - 3 * x as i128 - 7).rem_euclid(11);
            assert_eq!(f.eval_mod(x, 11) as i128, direct);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Polynomial::new(vec![-2, 0, 1]).to_string(), "x^2 - 2");
        assert_eq!(Polynomial::new(vec![0, 3]).to_string(), "3*x");
        assert_eq!(Polynomial::new(vec![0]).to_string(), "0");
    }
}
