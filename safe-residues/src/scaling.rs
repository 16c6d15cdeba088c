//! The (p-2) scaling law: Res(M·p) = Res(M) · (p - 2).

use std::fmt;

use num_bigint::BigUint;
use num_traits::One;
use serde::Serialize;

use residue_core::{gcd, primorial_index, SMALL_PRIMES};

use crate::residue::Modulus;

/// Independently known residue counts for small primorials.
pub const KNOWN_RESIDUE_COUNTS: &[(u64, u64)] = &[
    (2, 1),
    (6, 1),
    (30, 3),
    (210, 15),
    (2310, 135),
    (30_030, 1_485),
    (510_510, 22_275),
    (9_699_690, 378_675),
];

/// How far an observed count strays from the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Exact,
    /// |error| < 0.1%
    Excellent,
    /// |error| < 1%
    Good,
    SignificantDeviation,
}

impl Verdict {
    fn classify(observed: u64, predicted: u64, error_pct: f64) -> Self {
        if observed == predicted {
            Verdict::Exact
        } else if error_pct.abs() < 0.1 {
            Verdict::Excellent
        } else if error_pct.abs() < 1.0 {
            Verdict::Good
        } else {
            Verdict::SignificantDeviation
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Exact => write!(f, "exact"),
            Verdict::Excellent => write!(f, "excellent (<0.1%)"),
            Verdict::Good => write!(f, "good (<1%)"),
            Verdict::SignificantDeviation => write!(f, "significant deviation"),
        }
    }
}

/// Observed vs. predicted residue count for one level.
#[derive(Debug, Clone, Serialize)]
pub struct ScalingLawRecord {
    pub previous_modulus: Modulus,
    pub modulus: Modulus,
    pub prime: u64,
    pub previous_count: u64,
    pub observed_count: u64,
    pub predicted_count: u64,
    pub ratio: f64,
    pub epsilon: f64,
    pub error_pct: f64,
    pub verdict: Verdict,
    /// Exhaustive count at `modulus`, when it was small enough to enumerate.
    pub brute_force: Option<u64>,
}

impl ScalingLawRecord {
    pub fn holds(&self) -> bool {
        self.verdict == Verdict::Exact
    }

    /// Attach the exhaustive count when `modulus` is at most `limit`.
    pub fn with_brute_force(mut self, limit: u64) -> Self {
        if self.modulus.value() <= limit {
            self.brute_force = Some(brute_force_count(self.modulus));
        }
        self
    }

    /// The observed count disagrees with exhaustive enumeration.
    pub fn brute_force_mismatch(&self) -> bool {
        self.brute_force.is_some_and(|n| n != self.observed_count)
    }
}

/// Compare the observed count at M·p against N·(p-2).
pub fn verify(
    previous_modulus: Modulus,
    prime: u64,
    previous_count: u64,
    observed_count: u64,
) -> ScalingLawRecord {
    let factor = prime.saturating_sub(2);
    let predicted_count = previous_count.saturating_mul(factor);
    let modulus = Modulus::new(previous_modulus.value().saturating_mul(prime))
        .unwrap_or(previous_modulus);

    let ratio = if previous_count > 0 {
        observed_count as f64 / previous_count as f64
    } else {
        0.0
    };
    let epsilon = if previous_count > 0 {
        ratio - factor as f64
    } else {
        0.0
    };
    let error_pct = if predicted_count > 0 {
        100.0 * (observed_count as f64 - predicted_count as f64) / predicted_count as f64
    } else if observed_count == predicted_count {
        0.0
    } else {
        f64::INFINITY
    };

    ScalingLawRecord {
        previous_modulus,
        modulus,
        prime,
        previous_count,
        observed_count,
        predicted_count,
        ratio,
        epsilon,
        error_pct,
        verdict: Verdict::classify(observed_count, predicted_count, error_pct),
        brute_force: None,
    }
}

/// Closed form for the first n primes: Res(2) = 1, then a factor of
/// (p - 2) for every further prime.
pub fn predicted_residue_count(primes: &[u64]) -> BigUint {
    primes
        .iter()
        .skip(1)
        .fold(BigUint::one(), |acc, &p| acc * BigUint::from(p.saturating_sub(2)))
}

/// The count a primorial's residue set must have, if known.
pub fn known_count(modulus: Modulus) -> Option<u64> {
    if let Some(&(_, count)) = KNOWN_RESIDUE_COUNTS
        .iter()
        .find(|(m, _)| *m == modulus.value())
    {
        return Some(count);
    }
    let n = primorial_index(modulus.value())?;
    if n == 0 {
        return None;
    }
    u64::try_from(predicted_residue_count(&SMALL_PRIMES[..n])).ok()
}

/// Largest modulus [`ScalingLawRecord::with_brute_force`] is asked to
/// enumerate by the pipeline.
pub const BRUTE_FORCE_LIMIT: u64 = 30_030;

/// Brute-force count of r in [0, M) with gcd(r, M) = gcd(2r+1, M) = 1.
pub fn brute_force_count(modulus: Modulus) -> u64 {
    let m = modulus.value();
    (0..m)
        .filter(|&r| gcd(r, m) == 1 && gcd((2 * r + 1) % m, m) == 1)
        .count() as u64
}

/// Direction of the epsilon trend between two anomalous levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum EpsilonTrend {
    Amplification(f64),
    Attenuation(f64),
    Stable,
}

/// Compare |epsilon| of `later` against `earlier`.
pub fn epsilon_trend(earlier: &ScalingLawRecord, later: &ScalingLawRecord) -> EpsilonTrend {
    let (a, b) = (earlier.epsilon.abs(), later.epsilon.abs());
    if a == b {
        EpsilonTrend::Stable
    } else if a == 0.0 {
        EpsilonTrend::Amplification(f64::INFINITY)
    } else if b > a {
        EpsilonTrend::Amplification(b / a)
    } else {
        EpsilonTrend::Attenuation(b / a)
    }
}

impl fmt::Display for ScalingLawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Modulus:        {} = {} x {}", self.modulus, self.previous_modulus, self.prime)?;
        writeln!(f, "  Previous count: {}", self.previous_count)?;
        writeln!(f, "  Observed count: {}", self.observed_count)?;
        writeln!(f, "  Predicted:      {}", self.predicted_count)?;
        writeln!(f, "  Ratio:          {:.6} (theory {})", self.ratio, self.prime.saturating_sub(2))?;
        writeln!(f, "  Epsilon:        {:+.6}", self.epsilon)?;
        writeln!(f, "  Error:          {:+.4}%", self.error_pct)?;
        writeln!(f, "  Verdict:        {}", self.verdict)?;
        if let Some(n) = self.brute_force {
            writeln!(f, "  Brute force:    {}", n)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(v: u64) -> Modulus {
        Modulus::new(v).unwrap()
    }

    #[test]
    fn test_exact_law() {
        let rec = verify(m(210), 11, 15, 135);
        assert_eq!(rec.predicted_count, 135);
        assert_eq!(rec.epsilon, 0.0);
        assert_eq!(rec.error_pct, 0.0);
        assert_eq!(rec.verdict, Verdict::Exact);
        assert_eq!(rec.modulus.value(), 2310);
        assert!(rec.holds());
    }

    #[test]
    fn test_deviation_bands() {
        // 378675 * 21 = 7952175
        let rec = verify(m(9_699_690), 23, 378_675, 7_968_646);
        assert!(rec.epsilon > 0.04 && rec.epsilon < 0.05, "epsilon {}", rec.epsilon);
        assert_eq!(rec.verdict, Verdict::Good);

        let rec = verify(m(30), 7, 1000, 5001);
        assert_eq!(rec.verdict, Verdict::Excellent);

        let rec = verify(m(30), 7, 100, 550);
        assert_eq!(rec.verdict, Verdict::SignificantDeviation);
        assert!((rec.error_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_inputs_do_not_produce_nan() {
        let rec = verify(Modulus::ONE, 2, 1, 1);
        assert_eq!(rec.predicted_count, 0);
        assert!(rec.error_pct.is_infinite());
        assert_eq!(rec.verdict, Verdict::SignificantDeviation);

        let rec = verify(m(6), 5, 0, 0);
        assert_eq!(rec.verdict, Verdict::Exact);
        assert!(!rec.epsilon.is_nan() && !rec.error_pct.is_nan());
    }

    #[test]
    fn test_closed_form() {
        let primes = [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29];
        assert_eq!(predicted_residue_count(&primes), BigUint::from(214_708_725u64));
        assert_eq!(predicted_residue_count(&primes[..1]), BigUint::one());
        assert_eq!(predicted_residue_count(&primes[..5]), BigUint::from(135u32));
    }

    #[test]
    fn test_known_count() {
        assert_eq!(known_count(m(2310)), Some(135));
        assert_eq!(known_count(m(223_092_870)), Some(7_952_175));
        assert_eq!(known_count(m(100)), None);
        assert_eq!(known_count(Modulus::ONE), None);
    }

    #[test]
    fn test_known_table_matches_brute_force() {
        for &(modulus, count) in KNOWN_RESIDUE_COUNTS.iter().filter(|(m, _)| *m <= 30_030) {
            assert_eq!(brute_force_count(m(modulus)), count, "modulus {}", modulus);
        }
    }

    #[test]
    fn test_brute_force_cross_check() {
        let rec = verify(m(210), 11, 15, 135).with_brute_force(BRUTE_FORCE_LIMIT);
        assert_eq!(rec.brute_force, Some(135));
        assert!(!rec.brute_force_mismatch());

        let rec = verify(m(6), 5, 1, 2).with_brute_force(BRUTE_FORCE_LIMIT);
        assert_eq!(rec.brute_force, Some(3));
        assert!(rec.brute_force_mismatch());

        let rec = verify(m(30_030), 17, 1485, 22_275).with_brute_force(BRUTE_FORCE_LIMIT);
        assert_eq!(rec.brute_force, None);
    }

    #[test]
    fn test_epsilon_trend() {
        let a = verify(m(9_699_690), 23, 100, 2105);
        let b = verify(m(223_092_870), 29, 100, 2710);
        assert!(matches!(epsilon_trend(&a, &b), EpsilonTrend::Amplification(x) if x > 1.0));
        assert!(matches!(epsilon_trend(&b, &a), EpsilonTrend::Attenuation(x) if x < 1.0));
        assert_eq!(epsilon_trend(&a, &a), EpsilonTrend::Stable);
    }
}
