//! Primorial moduli and the sets of residues still eligible for
//! Sophie Germain / safe-prime candidacy modulo them.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use residue_core::gcd;

use crate::error::LiftError;

/// A modulus in the primorial chain. Only ever replaced by `extend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Modulus(u64);

impl Modulus {
    /// The trivial modulus 1; its only residue is 0.
    pub const ONE: Modulus = Modulus(1);

    /// The fifth primorial, 2·3·5·7·11.
    pub const P5: Modulus = Modulus(2310);

    pub fn new(value: u64) -> Result<Self, LiftError> {
        if value == 0 {
            return Err(LiftError::ZeroModulus);
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The modulus `self * prime`, failing instead of wrapping.
    pub fn extend(self, prime: u64) -> Result<Modulus, LiftError> {
        self.0
            .checked_mul(prime)
            .map(Modulus)
            .ok_or(LiftError::ModulusOverflow {
                modulus: self.0,
                prime,
            })
    }

    /// Whether `ancestor` divides this modulus.
    pub fn is_multiple_of(self, ancestor: Modulus) -> bool {
        self.0 % ancestor.0 == 0
    }
}

impl fmt::Display for Modulus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check that `r` is a canonical residue coprime to `modulus`.
pub fn check_residue(r: u64, modulus: Modulus) -> Result<(), LiftError> {
    if r >= modulus.0 || gcd(r, modulus.0) != 1 {
        return Err(LiftError::InvalidResidue {
            residue: r,
            modulus: modulus.0,
        });
    }
    Ok(())
}

/// Residues modulo a primorial that can still be Sophie Germain primes.
///
/// Every element is strictly less than the modulus and coprime to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidueSet {
    modulus: Modulus,
    residues: HashSet<u64>,
}

impl ResidueSet {
    /// An empty set at `modulus`, to be filled by a lift.
    pub fn empty(modulus: Modulus) -> Self {
        Self {
            modulus,
            residues: HashSet::new(),
        }
    }

    pub fn with_capacity(modulus: Modulus, capacity: usize) -> Self {
        Self {
            modulus,
            residues: HashSet::with_capacity(capacity),
        }
    }

    /// The single residue 0 mod 1, the root of every primorial chain.
    pub fn trivial() -> Self {
        Self {
            modulus: Modulus::ONE,
            residues: std::iter::once(0).collect(),
        }
    }

    /// Build a set from explicit residues, validating each one.
    pub fn from_residues<I>(modulus: Modulus, residues: I) -> Result<Self, LiftError>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut set = Self::empty(modulus);
        for r in residues {
            check_residue(r, modulus)?;
            set.residues.insert(r);
        }
        Ok(set)
    }

    pub(crate) fn from_parts(modulus: Modulus, residues: HashSet<u64>) -> Self {
        Self { modulus, residues }
    }

    pub fn modulus(&self) -> Modulus {
        self.modulus
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn contains(&self, r: u64) -> bool {
        self.residues.contains(&r)
    }

    pub fn iter(&self) -> impl Iterator<Item = &u64> + '_ {
        self.residues.iter()
    }

    /// Residues in increasing order.
    pub fn sorted(&self) -> Vec<u64> {
        let mut v: Vec<u64> = self.residues.iter().copied().collect();
        v.sort_unstable();
        v
    }

    /// Re-check every element against the modulus.
    pub fn validate(&self) -> Result<(), LiftError> {
        self.residues
            .iter()
            .try_for_each(|&r| check_residue(r, self.modulus))
    }

    /// Residues of the safe primes 2r+1 whose Sophie Germain part lies in
    /// this set.
    pub fn safe_prime_image(&self) -> HashSet<u64> {
        let m = self.modulus.0 as u128;
        self.residues
            .iter()
            .map(|&r| ((2 * r as u128 + 1) % m) as u64)
            .collect()
    }

    /// Project onto a modulus dividing this one.
    pub fn reduce_to(&self, ancestor: Modulus) -> Result<ResidueSet, LiftError> {
        if !self.modulus.is_multiple_of(ancestor) {
            return Err(LiftError::NotAnAncestor {
                modulus: self.modulus.0,
                ancestor: ancestor.0,
            });
        }
        let residues = self.residues.iter().map(|&r| r % ancestor.0).collect();
        Ok(Self::from_parts(ancestor, residues))
    }
}

impl Extend<u64> for ResidueSet {
    fn extend<T: IntoIterator<Item = u64>>(&mut self, iter: T) {
        self.residues.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulus_extend() {
        let m = Modulus::new(30).unwrap();
        assert_eq!(m.extend(7).unwrap().value(), 210);
        assert!(matches!(
            Modulus::new(u64::MAX / 2).unwrap().extend(3),
            Err(LiftError::ModulusOverflow { .. })
        ));
        assert!(Modulus::new(0).is_err());
    }

    #[test]
    fn test_from_residues_rejects_invalid() {
        let m = Modulus::new(30).unwrap();
        assert!(ResidueSet::from_residues(m, [11, 23, 29]).is_ok());
        assert!(matches!(
            ResidueSet::from_residues(m, [11, 25]),
            Err(LiftError::InvalidResidue { residue: 25, .. })
        ));
        assert!(matches!(
            ResidueSet::from_residues(m, [31]),
            Err(LiftError::InvalidResidue { residue: 31, .. })
        ));
    }

    #[test]
    fn test_trivial_set() {
        let t = ResidueSet::trivial();
        assert_eq!(t.modulus(), Modulus::ONE);
        assert_eq!(t.sorted(), vec![0]);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_safe_prime_image() {
        let m = Modulus::new(30).unwrap();
        let set = ResidueSet::from_residues(m, [11, 23, 29]).unwrap();
        let mut image: Vec<u64> = set.safe_prime_image().into_iter().collect();
        image.sort_unstable();
        assert_eq!(image, vec![17, 23, 29]);
    }

    #[test]
    fn test_reduce_to() {
        let m = Modulus::new(210).unwrap();
        let set = ResidueSet::from_residues(m, [11, 41, 53]).unwrap();
        let reduced = set.reduce_to(Modulus::new(30).unwrap()).unwrap();
        assert_eq!(reduced.sorted(), vec![11, 23]);
        assert!(set.reduce_to(Modulus::new(11).unwrap()).is_err());
    }
}
