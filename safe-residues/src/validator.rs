//! Checks that concrete Sophie Germain / safe primes fall only in the
//! residue classes predicted by the lift.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use residue_core::distinct_prime_factors;

use crate::residue::{Modulus, ResidueSet};

/// Safe-prime residues mod 2310 (the images 2r+1 of the Sophie Germain
/// residues at the fifth primorial).
pub const SAFE_PRIME_RESIDUES_2310: [u64; 135] = [
    17, 47, 53, 59, 83, 107, 137, 149, 167, 173, 179, 227, 233, 257, 263, 269, 293, 299, 317, 347,
    359, 377, 383, 389, 437, 443, 467, 479, 503, 509, 527, 557, 563, 569, 587, 593, 599, 629, 647,
    653, 677, 689, 713, 719, 767, 773, 779, 797, 809, 839, 857, 863, 887, 893, 899, 923, 929, 977,
    983, 989, 1007, 1019, 1049, 1073, 1097, 1103, 1109, 1139, 1157, 1187, 1193, 1217, 1223, 1229,
    1259, 1283, 1307, 1313, 1319, 1349, 1367, 1403, 1427, 1433, 1439, 1469, 1487, 1493, 1517, 1523,
    1553, 1559, 1577, 1613, 1619, 1637, 1643, 1649, 1679, 1697, 1703, 1733, 1763, 1769, 1787, 1817,
    1823, 1829, 1847, 1853, 1889, 1907, 1913, 1943, 1949, 1973, 1979, 1997, 2027, 2033, 2039, 2063,
    2099, 2117, 2147, 2153, 2159, 2183, 2207, 2237, 2243, 2249, 2273, 2279, 2309,
];

/// Which kind of prime the candidates are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandidateKind {
    /// p with (p-1)/2 prime; checked against {2r+1 mod M}.
    SafePrime,
    /// q with 2q+1 prime; checked against the residue set itself.
    SophieGermain,
}

/// Hit counts per residue class.
#[derive(Debug, Clone, Serialize)]
pub struct ResidueFrequency {
    pub distinct: usize,
    pub mean: f64,
    pub max: u64,
    pub min: u64,
    /// Most frequent residues, descending by count then ascending residue.
    pub top: Vec<(u64, u64)>,
}

impl ResidueFrequency {
    pub fn from_counts(counts: &HashMap<u64, u64>, top_n: usize) -> Self {
        let distinct = counts.len();
        let total: u64 = counts.values().sum();
        let mut top: Vec<(u64, u64)> = counts.iter().map(|(&r, &c)| (r, c)).collect();
        top.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        top.truncate(top_n);
        Self {
            distinct,
            mean: if distinct > 0 { total as f64 / distinct as f64 } else { 0.0 },
            max: counts.values().copied().max().unwrap_or(0),
            min: counts.values().copied().min().unwrap_or(0),
            top,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub modulus: Modulus,
    pub kind: CandidateKind,
    pub candidates: usize,
    pub distinct_residues: usize,
    pub valid_residues: usize,
    /// Residues outside the predicted set, ascending.
    pub invalid_residues: Vec<u64>,
    /// Candidates whose residue is outside the predicted set.
    pub invalid_candidates: Vec<u64>,
    /// Candidates too small to be constrained by every prime factor of M.
    pub below_floor: Vec<u64>,
    pub frequency: ResidueFrequency,
}

impl ValidationReport {
    /// No candidate escaped the predicted residue classes.
    pub fn passed(&self) -> bool {
        self.invalid_candidates.is_empty()
    }

    pub fn valid_pct(&self) -> f64 {
        if self.distinct_residues == 0 {
            100.0
        } else {
            100.0 * self.valid_residues as f64 / self.distinct_residues as f64
        }
    }
}

/// Membership test of candidates against a predicted residue set.
#[derive(Debug, Clone)]
pub struct ResidueValidator {
    modulus: Modulus,
    kind: CandidateKind,
    targets: HashSet<u64>,
    /// Largest prime factor of the modulus.
    floor: u64,
}

impl ResidueValidator {
    pub fn for_safe_primes(set: &ResidueSet) -> Self {
        Self::new(set.modulus(), CandidateKind::SafePrime, set.safe_prime_image())
    }

    pub fn for_sophie_germain(set: &ResidueSet) -> Self {
        Self::new(
            set.modulus(),
            CandidateKind::SophieGermain,
            set.iter().copied().collect(),
        )
    }

    /// Validator for safe primes built from the static table mod 2310.
    pub fn reference_2310() -> Self {
        Self::new(
            Modulus::P5,
            CandidateKind::SafePrime,
            SAFE_PRIME_RESIDUES_2310.iter().copied().collect(),
        )
    }

    fn new(modulus: Modulus, kind: CandidateKind, targets: HashSet<u64>) -> Self {
        let floor = distinct_prime_factors(modulus.value())
            .last()
            .copied()
            .unwrap_or(1);
        Self {
            modulus,
            kind,
            targets,
            floor,
        }
    }

    pub fn modulus(&self) -> Modulus {
        self.modulus
    }

    pub fn targets(&self) -> &HashSet<u64> {
        &self.targets
    }

    /// The Sophie Germain part must exceed every prime factor of M,
    /// otherwise it is itself one of those factors.
    fn is_below_floor(&self, candidate: u64) -> bool {
        let sophie_germain = match self.kind {
            CandidateKind::SafePrime => candidate / 2,
            CandidateKind::SophieGermain => candidate,
        };
        sophie_germain <= self.floor
    }

    pub fn validate(&self, candidates: &[u64]) -> ValidationReport {
        let m = self.modulus.value();
        let mut counts: HashMap<u64, u64> = HashMap::new();
        let mut invalid_candidates = Vec::new();
        let mut below_floor = Vec::new();

        for &c in candidates {
            if self.is_below_floor(c) {
                below_floor.push(c);
                continue;
            }
            let r = c % m;
            *counts.entry(r).or_insert(0) += 1;
            if !self.targets.contains(&r) {
                invalid_candidates.push(c);
            }
        }

        let mut invalid_residues: Vec<u64> = counts
            .keys()
            .copied()
            .filter(|r| !self.targets.contains(r))
            .collect();
        invalid_residues.sort_unstable();

        if !invalid_candidates.is_empty() {
            log::error!(
                "{} candidates fall outside the predicted residues mod {}: {:?}",
                invalid_candidates.len(),
                self.modulus,
                invalid_residues
            );
        }
        if !below_floor.is_empty() {
            log::warn!(
                "{} candidates are not larger than the largest prime factor of {}",
                below_floor.len(),
                self.modulus
            );
        }

        ValidationReport {
            modulus: self.modulus,
            kind: self.kind,
            candidates: candidates.len(),
            distinct_residues: counts.len(),
            valid_residues: counts.len() - invalid_residues.len(),
            invalid_residues,
            invalid_candidates,
            below_floor,
            frequency: ResidueFrequency::from_counts(&counts, 10),
        }
    }
}

/// Validate `candidates` against every level of a chain.
pub fn validate_lineage(
    candidates: &[u64],
    levels: &[ResidueSet],
    kind: CandidateKind,
) -> BTreeMap<Modulus, ValidationReport> {
    levels
        .iter()
        .map(|set| {
            let validator = match kind {
                CandidateKind::SafePrime => ResidueValidator::for_safe_primes(set),
                CandidateKind::SophieGermain => ResidueValidator::for_sophie_germain(set),
            };
            (set.modulus(), validator.validate(candidates))
        })
        .collect()
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Modulus:        {} ({:?})", self.modulus, self.kind)?;
        writeln!(f, "  Candidates:     {}", self.candidates)?;
        writeln!(f, "  Distinct res.:  {}", self.distinct_residues)?;
        writeln!(
            f,
            "  Valid:          {}/{} ({:.1}%)",
            self.valid_residues,
            self.distinct_residues,
            self.valid_pct()
        )?;
        if !self.invalid_residues.is_empty() {
            writeln!(f, "  INVALID:        {:?}", self.invalid_residues)?;
        }
        if !self.below_floor.is_empty() {
            writeln!(f, "  Below floor:    {:?}", self.below_floor)?;
        }
        writeln!(
            f,
            "  Per residue:    mean {:.2}, max {}, min {}",
            self.frequency.mean, self.frequency.max, self.frequency.min
        )?;
        writeln!(f, "  Result:         {}", if self.passed() { "PASS" } else { "FAIL" })?;
        Ok(())
    }
}
