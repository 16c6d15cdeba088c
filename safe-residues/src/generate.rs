//! Safe-prime search, either over every odd candidate or only over the
//! candidates whose residue mod M lies in the predicted safe-prime image.

use std::time::{Duration, Instant};

use num_bigint::BigUint;
use serde::Serialize;

use residue_core::PrimalityOracle;

use crate::residue::{Modulus, ResidueSet};

/// p is a safe prime: p and (p-1)/2 are both (probably) prime.
pub fn is_safe_prime<O: PrimalityOracle + ?Sized>(oracle: &O, p: u64) -> bool {
    p >= 5 && p % 2 == 1 && oracle.is_probably_prime_u64(p) && oracle.is_probably_prime_u64(p / 2)
}

/// q is a Sophie Germain prime: q and 2q+1 are both (probably) prime.
pub fn is_sophie_germain<O: PrimalityOracle + ?Sized>(oracle: &O, q: u64) -> bool {
    if !oracle.is_probably_prime_u64(q) {
        return false;
    }
    let safe = BigUint::from(q) * 2u32 + 1u32;
    oracle.is_probably_prime(&safe)
}

/// Result of one search run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub primes: Vec<u64>,
    /// Candidates passed to the oracle.
    pub tested: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SearchOutcome {
    fn new() -> Self {
        Self {
            primes: Vec::new(),
            tested: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Naive vs. residue-filtered search over the same range.
#[derive(Debug, Clone, Serialize)]
pub struct SearchComparison {
    pub naive_tested: u64,
    pub filtered_tested: u64,
    pub reduction_pct: f64,
    pub naive_secs: f64,
    pub filtered_secs: f64,
    pub speedup: f64,
    /// Both searches found the same primes.
    pub agree: bool,
}

impl SearchComparison {
    pub fn new(naive: &SearchOutcome, filtered: &SearchOutcome) -> Self {
        let reduction_pct = if naive.tested > 0 {
            100.0 * (1.0 - filtered.tested as f64 / naive.tested as f64)
        } else {
            0.0
        };
        let naive_secs = naive.elapsed.as_secs_f64();
        let filtered_secs = filtered.elapsed.as_secs_f64();
        let speedup = if filtered_secs > 0.0 {
            naive_secs / filtered_secs
        } else if filtered.tested > 0 {
            naive.tested as f64 / filtered.tested as f64
        } else {
            0.0
        };
        Self {
            naive_tested: naive.tested,
            filtered_tested: filtered.tested,
            reduction_pct,
            naive_secs,
            filtered_secs,
            speedup,
            agree: naive.primes == filtered.primes,
        }
    }
}

/// Safe-prime search driven by a primality oracle.
pub struct SafePrimeSearch<'a, O: PrimalityOracle + ?Sized> {
    oracle: &'a O,
}

impl<'a, O: PrimalityOracle + ?Sized> SafePrimeSearch<'a, O> {
    pub fn new(oracle: &'a O) -> Self {
        Self { oracle }
    }

    pub fn oracle(&self) -> &'a O {
        self.oracle
    }

    /// Test every odd number from `start` until `count` safe primes are found.
    pub fn naive(&self, start: u64, count: usize) -> SearchOutcome {
        let timer = Instant::now();
        let mut out = SearchOutcome::new();
        let mut candidate = Some(start | 1);

        while let Some(c) = candidate {
            if out.primes.len() >= count {
                break;
            }
            out.tested += 1;
            if is_safe_prime(self.oracle, c) {
                out.primes.push(c);
            }
            candidate = c.checked_add(2);
        }

        out.elapsed = timer.elapsed();
        log::info!(
            "Naive search: {} safe primes from {} after {} tests",
            out.primes.len(),
            start,
            out.tested
        );
        out
    }

    /// Test only k·M + s for s in the safe-prime image of `set`.
    ///
    /// Safe primes whose Sophie Germain part divides M (5, 7, 23, ...) are
    /// outside the image and therefore never found; start above M.
    pub fn residue_filtered(&self, start: u64, count: usize, set: &ResidueSet) -> SearchOutcome {
        let mut image: Vec<u64> = set.safe_prime_image().into_iter().collect();
        image.sort_unstable();
        self.residue_filtered_with(start, count, set.modulus(), &image)
    }

    /// As `residue_filtered`, with an explicit sorted list of residues.
    pub fn residue_filtered_with(
        &self,
        start: u64,
        count: usize,
        modulus: Modulus,
        residues: &[u64],
    ) -> SearchOutcome {
        let timer = Instant::now();
        let mut out = SearchOutcome::new();
        if residues.is_empty() {
            log::warn!("No safe-prime residues mod {}; nothing to search", modulus);
            return out;
        }

        let m = modulus.value();
        let mut base = Some(start - start % m);
        'blocks: while let Some(b) = base {
            for &s in residues {
                if out.primes.len() >= count {
                    break 'blocks;
                }
                let Some(c) = b.checked_add(s) else {
                    break 'blocks;
                };
                if c < start {
                    continue;
                }
                out.tested += 1;
                if is_safe_prime(self.oracle, c) {
                    out.primes.push(c);
                }
            }
            base = b.checked_add(m);
        }

        out.elapsed = timer.elapsed();
        log::info!(
            "Residue-filtered search mod {}: {} safe primes from {} after {} tests",
            modulus,
            out.primes.len(),
            start,
            out.tested
        );
        out
    }

    /// Run both searches from `start` and compare the work done.
    pub fn compare(&self, start: u64, count: usize, set: &ResidueSet) -> (SearchOutcome, SearchOutcome, SearchComparison) {
        let naive = self.naive(start, count);
        let filtered = self.residue_filtered(start, count, set);
        let comparison = SearchComparison::new(&naive, &filtered);
        if !comparison.agree {
            log::warn!("Naive and residue-filtered searches disagree");
        }
        (naive, filtered, comparison)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lift::LiftEngine;
    use residue_core::MillerRabin;

    fn level(primes: &[u64]) -> ResidueSet {
        LiftEngine::default()
            .lift_chain(&ResidueSet::trivial(), primes)
            .unwrap()
            .pop()
            .unwrap()
    }

    #[test]
    fn test_is_safe_prime() {
        let oracle = MillerRabin::default();
        let safe: Vec<u64> = (0..200).filter(|&p| is_safe_prime(&oracle, p)).collect();
        assert_eq!(safe, vec![5, 7, 11, 23, 47, 59, 83, 107, 167, 179]);
        assert!(is_sophie_germain(&oracle, 89));
        assert!(!is_sophie_germain(&oracle, 7));
    }

    #[test]
    fn test_naive_search() {
        let oracle = MillerRabin::default();
        let out = SafePrimeSearch::new(&oracle).naive(4, 6);
        assert_eq!(out.primes, vec![5, 7, 11, 23, 47, 59]);
        // 5, 7, ..., 59
        assert_eq!(out.tested, 28);
    }

    #[test]
    fn test_filtered_search_agrees_with_naive() {
        let oracle = MillerRabin::default();
        let set = level(&[2, 3, 5, 7, 11]);
        let search = SafePrimeSearch::new(&oracle);
        let (naive, filtered, cmp) = search.compare(2311, 20, &set);
        assert_eq!(naive.primes, filtered.primes);
        assert!(cmp.agree);
        assert!(filtered.tested < naive.tested);
        assert!(cmp.reduction_pct > 80.0, "reduction {}", cmp.reduction_pct);
    }

    #[test]
    fn test_filtered_search_from_mid_block() {
        let oracle = MillerRabin::default();
        let set = level(&[2, 3, 5]);
        let search = SafePrimeSearch::new(&oracle);
        let out = search.residue_filtered(100, 3, &set);
        assert_eq!(out.primes, vec![107, 167, 179]);
    }

    #[test]
    fn test_empty_residue_list() {
        let oracle = MillerRabin::default();
        let out = SafePrimeSearch::new(&oracle).residue_filtered_with(100, 5, Modulus::P5, &[]);
        assert!(out.primes.is_empty());
        assert_eq!(out.tested, 0);
    }
}
