//! Forbidden lift offsets.
//!
//! Lifting a residue r mod M to modulus M·p picks an offset t in [0, p) and
//! forms x = r + M·t. Two offsets break eligibility:
//!
//! - forbidden1: x ≡ 0 (mod p), i.e. t ≡ −r · M⁻¹ (mod p)
//! - forbidden2: 2x + 1 ≡ 0 (mod p), i.e. t ≡ −(2r+1) · (2M)⁻¹ (mod p)
//!
//! When M or 2M vanishes mod p the inverse does not exist, the offset is
//! undefined, and the residue is either dropped outright (if r or 2r+1 is
//! already divisible by p) or kept with no constraint from that side.

use serde::Serialize;

use residue_core::{is_prime_u64, mod_inv, mul_mod};

use crate::error::LiftError;
use crate::residue::Modulus;

/// What to do with one residue when lifting by a prime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LiftPolicy {
    /// Keep the residue, skipping the defined forbidden offsets.
    Keep {
        forbidden1: Option<u64>,
        forbidden2: Option<u64>,
    },
    /// The residue has no eligible lifts at all.
    DropEntirely,
}

impl LiftPolicy {
    /// Whether offset `t` must be skipped.
    pub fn is_forbidden(&self, t: u64) -> bool {
        match *self {
            LiftPolicy::Keep {
                forbidden1,
                forbidden2,
            } => forbidden1 == Some(t) || forbidden2 == Some(t),
            LiftPolicy::DropEntirely => true,
        }
    }

    /// Both offsets defined and equal.
    pub fn is_collision(&self) -> bool {
        matches!(
            *self,
            LiftPolicy::Keep {
                forbidden1: Some(a),
                forbidden2: Some(b),
            } if a == b
        )
    }

    /// Number of offsets in [0, p) that survive.
    pub fn survivor_count(&self, prime: u64) -> u64 {
        match *self {
            LiftPolicy::DropEntirely => 0,
            LiftPolicy::Keep {
                forbidden1,
                forbidden2,
            } => match (forbidden1, forbidden2) {
                (Some(a), Some(b)) if a == b => prime - 1,
                (Some(_), Some(_)) => prime - 2,
                (Some(_), None) | (None, Some(_)) => prime - 1,
                (None, None) => prime,
            },
        }
    }
}

/// Precomputed inverses for lifting from `modulus` to `modulus * prime`.
#[derive(Debug, Clone, Copy)]
pub struct ForbiddenCalculator {
    modulus: Modulus,
    prime: u64,
    inv_m: Option<u64>,
    inv_two_m: Option<u64>,
}

impl ForbiddenCalculator {
    pub fn new(modulus: Modulus, prime: u64) -> Result<Self, LiftError> {
        if !is_prime_u64(prime) {
            return Err(LiftError::NotPrime(prime));
        }
        let m_mod_p = modulus.value() % prime;
        let two_m_mod_p = mul_mod(2, m_mod_p, prime);
        Ok(Self {
            modulus,
            prime,
            inv_m: mod_inv(m_mod_p, prime),
            inv_two_m: mod_inv(two_m_mod_p, prime),
        })
    }

    pub fn modulus(&self) -> Modulus {
        self.modulus
    }

    pub fn prime(&self) -> u64 {
        self.prime
    }

    /// True when either coefficient M or 2M vanishes mod p.
    pub fn is_degenerate(&self) -> bool {
        self.inv_m.is_none() || self.inv_two_m.is_none()
    }

    /// Classify residue `r` (taken mod M) for this lift.
    pub fn policy(&self, r: u64) -> LiftPolicy {
        let p = self.prime;
        let r_mod_p = r % p;
        let companion = (2 * r_mod_p + 1) % p;

        let forbidden1 = match self.inv_m {
            Some(inv) => Some(mul_mod((p - r_mod_p) % p, inv, p)),
            None if r_mod_p == 0 => return LiftPolicy::DropEntirely,
            None => None,
        };
        let forbidden2 = match self.inv_two_m {
            Some(inv) => Some(mul_mod((p - companion) % p, inv, p)),
            None if companion == 0 => return LiftPolicy::DropEntirely,
            None => None,
        };

        LiftPolicy::Keep {
            forbidden1,
            forbidden2,
        }
    }
}

/// One-shot forbidden-value computation for (M, p, r).
pub fn forbidden_values(modulus: Modulus, prime: u64, r: u64) -> Result<LiftPolicy, LiftError> {
    Ok(ForbiddenCalculator::new(modulus, prime)?.policy(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use residue_core::gcd;

    fn m(v: u64) -> Modulus {
        Modulus::new(v).unwrap()
    }

    #[test]
    fn test_forbidden_offsets_hit_multiples_of_p() {
        for &(modulus, prime) in &[(2u64, 3u64), (6, 5), (30, 7), (210, 11), (2310, 13), (9_699_690, 23)] {
            let calc = ForbiddenCalculator::new(m(modulus), prime).unwrap();
            for r in (0..modulus.min(5000)).filter(|&r| gcd(r, modulus) == 1) {
                let LiftPolicy::Keep { forbidden1, forbidden2 } = calc.policy(r) else {
                    panic!("non-degenerate lift dropped r={}", r);
                };
                let f1 = forbidden1.expect("forbidden1 defined");
                let f2 = forbidden2.expect("forbidden2 defined");
                assert!(f1 < prime && f2 < prime);
                let x1 = r as u128 + modulus as u128 * f1 as u128;
                assert_eq!(x1 % prime as u128, 0, "r={} M={} p={}", r, modulus, prime);
                let x2 = r as u128 + modulus as u128 * f2 as u128;
                assert_eq!((2 * x2 + 1) % prime as u128, 0, "r={} M={} p={}", r, modulus, prime);
            }
        }
    }

    #[test]
    fn test_known_values() {
        // 5 mod 6 lifted by 5: 5 + 6t ≡ 0 at t=0, 2(5 + 6t) + 1 ≡ 0 at t=2
        assert_eq!(
            forbidden_values(m(6), 5, 5).unwrap(),
            LiftPolicy::Keep {
                forbidden1: Some(0),
                forbidden2: Some(2)
            }
        );
        // 1 mod 2 lifted by 3: t=1 gives 3, t=0 gives companion 3
        assert_eq!(
            forbidden_values(m(2), 3, 1).unwrap(),
            LiftPolicy::Keep {
                forbidden1: Some(1),
                forbidden2: Some(0)
            }
        );
    }

    #[test]
    fn test_no_single_level_collision_for_odd_prime() {
        // f1 = f2 would force 0 ≡ -1 (mod p)
        for prime in [3u64, 5, 7, 11, 13, 23, 29] {
            let calc = ForbiddenCalculator::new(m(2), prime).unwrap();
            for r in 0..2 * prime {
                assert!(!calc.policy(r).is_collision());
            }
        }
    }

    #[test]
    fn test_degenerate_prime_dividing_modulus() {
        let calc = ForbiddenCalculator::new(m(30), 5).unwrap();
        assert!(calc.is_degenerate());
        // 2*2+1 = 5: dropped
        assert_eq!(calc.policy(2), LiftPolicy::DropEntirely);
        // r divisible by 5: dropped
        assert_eq!(calc.policy(25), LiftPolicy::DropEntirely);
        // neither: kept, unconstrained
        let policy = calc.policy(11);
        assert_eq!(
            policy,
            LiftPolicy::Keep {
                forbidden1: None,
                forbidden2: None
            }
        );
        assert_eq!(policy.survivor_count(5), 5);
    }

    #[test]
    fn test_lift_to_two_from_trivial() {
        // M=1, p=2: forbidden1 = 0, 2M vanishes mod 2 but 2*0+1 is odd
        let policy = forbidden_values(Modulus::ONE, 2, 0).unwrap();
        assert_eq!(
            policy,
            LiftPolicy::Keep {
                forbidden1: Some(0),
                forbidden2: None
            }
        );
        assert_eq!(policy.survivor_count(2), 1);
        assert!(policy.is_forbidden(0));
        assert!(!policy.is_forbidden(1));
    }

    #[test]
    fn test_rejects_composite() {
        assert!(matches!(
            ForbiddenCalculator::new(m(30), 9),
            Err(LiftError::NotPrime(9))
        ));
        assert!(ForbiddenCalculator::new(m(30), 1).is_err());
        assert!(ForbiddenCalculator::new(m(30), 0).is_err());
    }

    #[test]
    fn test_survivor_count() {
        let keep = |a, b| LiftPolicy::Keep {
            forbidden1: a,
            forbidden2: b,
        };
        assert_eq!(keep(Some(1), Some(2)).survivor_count(7), 5);
        assert_eq!(keep(Some(3), Some(3)).survivor_count(7), 6);
        assert_eq!(keep(None, Some(3)).survivor_count(7), 6);
        assert_eq!(LiftPolicy::DropEntirely.survivor_count(7), 0);
        assert!(keep(Some(3), Some(3)).is_collision());
        assert!(!keep(None, None).is_collision());
    }
}
