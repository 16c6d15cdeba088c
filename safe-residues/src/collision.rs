//! Collision analysis: residues whose two forbidden offsets coincide.
//!
//! A collision removes one offset instead of two, so each collided parent
//! leaves p - 1 children instead of p - 2. At a single level with p not
//! dividing M the condition f1 = f2 reduces to 0 ≡ -1 (mod p) and cannot
//! hold; any flagged residue therefore points at upstream composition, not
//! at same-level arithmetic. The naive test and a composed test across the
//! ancestor levels both implement `CollisionProbe`.

use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::error::LiftError;
use crate::forbidden::{ForbiddenCalculator, LiftPolicy};
use crate::residue::Modulus;

/// Residue classes mod 30 that stay eligible at every level above 30.
pub const MOD30_CLASSES: [u64; 3] = [11, 23, 29];

/// Default cap on the collision residues kept in a report.
pub const DEFAULT_SAMPLE_LIMIT: usize = 1000;

/// Classification of one residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollisionClass {
    /// Both forbidden offsets defined and equal.
    Collision { offset: u64 },
    /// Offsets differ, or at least one is undefined.
    Normal,
    /// The degenerate policy removes the residue entirely.
    Dropped,
}

impl From<LiftPolicy> for CollisionClass {
    fn from(policy: LiftPolicy) -> Self {
        match policy {
            LiftPolicy::DropEntirely => CollisionClass::Dropped,
            LiftPolicy::Keep {
                forbidden1: Some(a),
                forbidden2: Some(b),
            } if a == b => CollisionClass::Collision { offset: a },
            LiftPolicy::Keep { .. } => CollisionClass::Normal,
        }
    }
}

/// A collision test for residues at a fixed modulus against a probe prime.
pub trait CollisionProbe {
    fn classify(&self, r: u64) -> CollisionClass;

    /// The prime whose lift the probe examines.
    fn probe_prime(&self) -> u64;

    /// Modulus of the residues the probe classifies.
    fn modulus(&self) -> Modulus;

    /// f1 = f2 reduces to 0 ≡ -1 (mod p) at every step the probe tests.
    fn is_unsatisfiable(&self) -> bool;

    fn describe(&self) -> String;
}

/// The naive test: f1(r, q) == f2(r, q) at the current modulus.
#[derive(Debug, Clone, Copy)]
pub struct SingleLevelProbe {
    calc: ForbiddenCalculator,
}

impl SingleLevelProbe {
    pub fn new(modulus: Modulus, prime: u64) -> Result<Self, LiftError> {
        Ok(Self {
            calc: ForbiddenCalculator::new(modulus, prime)?,
        })
    }
}

impl CollisionProbe for SingleLevelProbe {
    fn classify(&self, r: u64) -> CollisionClass {
        self.calc.policy(r % self.calc.modulus().value()).into()
    }

    fn probe_prime(&self) -> u64 {
        self.calc.prime()
    }

    fn modulus(&self) -> Modulus {
        self.calc.modulus()
    }

    fn is_unsatisfiable(&self) -> bool {
        !self.calc.is_degenerate()
    }

    fn describe(&self) -> String {
        format!(
            "single-level f1=f2 at mod {} with p={}",
            self.calc.modulus(),
            self.calc.prime()
        )
    }
}

/// Applies the single-level test at every step of a primorial chain.
///
/// A residue r mod M_n is reduced to r mod M_k for each ancestor level and
/// tested against the prime that extended that level; the last step tests
/// against the probe prime itself. The first collision found wins. The
/// step out of the trivial modulus 1 is skipped: every residue reduces to
/// 0 there.
#[derive(Debug, Clone)]
pub struct ComposedProbe {
    modulus: Modulus,
    steps: Vec<ForbiddenCalculator>,
}

impl ComposedProbe {
    /// `chain` holds the primes whose product is the residue modulus;
    /// `probe` is the next prime.
    pub fn new(chain: &[u64], probe: u64) -> Result<Self, LiftError> {
        let mut steps = Vec::with_capacity(chain.len() + 1);
        let mut modulus = Modulus::ONE;
        for &p in chain {
            if modulus != Modulus::ONE {
                steps.push(ForbiddenCalculator::new(modulus, p)?);
            }
            modulus = modulus.extend(p)?;
        }
        steps.push(ForbiddenCalculator::new(modulus, probe)?);
        Ok(Self { modulus, steps })
    }

    pub fn depth(&self) -> usize {
        self.steps.len()
    }
}

impl CollisionProbe for ComposedProbe {
    fn classify(&self, r: u64) -> CollisionClass {
        let mut last = CollisionClass::Normal;
        for calc in &self.steps {
            let reduced = r % calc.modulus().value();
            match CollisionClass::from(calc.policy(reduced)) {
                c @ CollisionClass::Collision { .. } => return c,
                c => last = c,
            }
        }
        last
    }

    fn probe_prime(&self) -> u64 {
        self.steps.last().map(|c| c.prime()).unwrap_or(0)
    }

    fn modulus(&self) -> Modulus {
        self.modulus
    }

    fn is_unsatisfiable(&self) -> bool {
        self.steps.iter().all(|c| !c.is_degenerate())
    }

    fn describe(&self) -> String {
        let primes: Vec<String> = self.steps.iter().map(|c| c.prime().to_string()).collect();
        format!("composed f1=f2 across primes [{}]", primes.join(", "))
    }
}

/// Uniformity of collision residues over the classes 11, 23, 29 mod 30.
#[derive(Debug, Clone, Serialize)]
pub struct Mod30Symmetry {
    pub counts: [u64; 3],
    pub symmetric: bool,
    pub max_deviation: f64,
}

impl Mod30Symmetry {
    pub fn from_distribution(dist: &BTreeMap<u64, u64>) -> Self {
        let counts = MOD30_CLASSES.map(|c| dist.get(&c).copied().unwrap_or(0));
        let mean = counts.iter().sum::<u64>() as f64 / 3.0;
        let max_deviation = counts
            .iter()
            .map(|&c| (c as f64 - mean).abs())
            .fold(0.0, f64::max);
        Self {
            counts,
            symmetric: counts.iter().all(|&c| c == counts[0]),
            max_deviation,
        }
    }
}

/// How the computed collision count compares with an observed anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnomalyMatch {
    Exact,
    /// Within 100 residues.
    Close(i64),
    Significant(i64),
}

/// Statistics of one collision pass.
#[derive(Debug, Clone, Serialize)]
pub struct CollisionReport {
    pub modulus: Modulus,
    pub probe_prime: u64,
    pub probe: String,
    pub total: u64,
    pub collisions: u64,
    pub normal: u64,
    pub dropped: u64,
    pub collision_mod_prime: BTreeMap<u64, u64>,
    pub normal_mod_prime: BTreeMap<u64, u64>,
    pub collision_mod30: BTreeMap<u64, u64>,
    pub mod30_symmetry: Mod30Symmetry,
    /// Smallest collision residues, up to the sample limit.
    pub collision_sample: Vec<u64>,
    /// The collision congruence has no solutions at any probed step.
    pub algebraically_unsatisfiable: bool,
    /// Parents observed off the (p-2) count in a lift of the same set.
    pub observed_anomaly: Option<u64>,
    pub observed_match: Option<AnomalyMatch>,
}

impl CollisionReport {
    fn pct(&self, n: u64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * n as f64 / self.total as f64
        }
    }

    pub fn collision_pct(&self) -> f64 {
        self.pct(self.collisions)
    }

    pub fn normal_pct(&self) -> f64 {
        self.pct(self.normal)
    }

    /// Excess children the collisions add over the (p-2) prediction.
    pub fn excess_children(&self) -> u64 {
        self.collisions
    }

    pub fn compare_with_observed(&self, observed_anomaly: u64) -> AnomalyMatch {
        let diff = self.collisions as i64 - observed_anomaly as i64;
        match diff.abs() {
            0 => AnomalyMatch::Exact,
            d if d < 100 => AnomalyMatch::Close(diff),
            _ => AnomalyMatch::Significant(diff),
        }
    }

    /// Attach the anomalous-parent count of an actual lift and its match.
    pub fn with_observed(mut self, observed_anomaly: u64) -> Self {
        self.observed_match = Some(self.compare_with_observed(observed_anomaly));
        self.observed_anomaly = Some(observed_anomaly);
        self
    }
}

/// Streams residues through a probe, keeping only counters and a bounded
/// sample.
pub struct CollisionAnalyzer<P: CollisionProbe> {
    probe: P,
    sample_limit: usize,
    progress_interval: usize,
}

impl CollisionAnalyzer<SingleLevelProbe> {
    /// The naive analyzer for residues mod `modulus` against `prime`.
    pub fn single_level(modulus: Modulus, prime: u64) -> Result<Self, LiftError> {
        Ok(Self::new(SingleLevelProbe::new(modulus, prime)?))
    }
}

impl<P: CollisionProbe> CollisionAnalyzer<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            progress_interval: crate::lift::DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = limit;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Classify residues modulo the probe's modulus.
    pub fn analyze<I>(&self, residues: I) -> CollisionReport
    where
        I: IntoIterator<Item = u64>,
    {
        let modulus = self.probe.modulus();
        let unsatisfiable = self.probe.is_unsatisfiable();
        let q = self.probe.probe_prime().max(1);
        let mut collision_mod_prime = BTreeMap::new();
        let mut normal_mod_prime = BTreeMap::new();
        let mut collision_mod30 = BTreeMap::new();
        // max-heap holding the smallest `sample_limit` collision residues
        let mut sample: BinaryHeap<u64> = BinaryHeap::with_capacity(self.sample_limit + 1);
        let (mut total, mut collisions, mut normal, mut dropped) = (0u64, 0u64, 0u64, 0u64);
        let start = Instant::now();

        for r in residues {
            total += 1;
            match self.probe.classify(r) {
                CollisionClass::Collision { .. } => {
                    collisions += 1;
                    *collision_mod_prime.entry(r % q).or_insert(0) += 1;
                    *collision_mod30.entry(r % 30).or_insert(0) += 1;
                    if self.sample_limit > 0 {
                        sample.push(r);
                        if sample.len() > self.sample_limit {
                            sample.pop();
                        }
                    }
                }
                CollisionClass::Normal => {
                    normal += 1;
                    *normal_mod_prime.entry(r % q).or_insert(0) += 1;
                }
                CollisionClass::Dropped => dropped += 1,
            }

            if self.progress_interval > 0 && total % self.progress_interval as u64 == 0 {
                log::info!("  analyzed {} residues ({:.1?})", total, start.elapsed());
            }
        }

        if collisions > 0 && unsatisfiable {
            log::warn!(
                "{} collisions flagged mod {} although f1=f2 is unsatisfiable for p={}",
                collisions,
                modulus,
                q
            );
        }

        let mod30_symmetry = Mod30Symmetry::from_distribution(&collision_mod30);
        CollisionReport {
            modulus,
            probe_prime: self.probe.probe_prime(),
            probe: self.probe.describe(),
            total,
            collisions,
            normal,
            dropped,
            collision_mod_prime,
            normal_mod_prime,
            collision_mod30,
            mod30_symmetry,
            collision_sample: sample.into_sorted_vec(),
            algebraically_unsatisfiable: unsatisfiable,
            observed_anomaly: None,
            observed_match: None,
        }
    }
}

impl fmt::Display for CollisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Probe:          {}", self.probe)?;
        writeln!(f, "  Residues:       {}", self.total)?;
        writeln!(f, "  Collisions:     {} ({:.3}%)", self.collisions, self.collision_pct())?;
        writeln!(f, "  Normal:         {} ({:.3}%)", self.normal, self.normal_pct())?;
        writeln!(f, "  Dropped:        {}", self.dropped)?;
        writeln!(
            f,
            "  f1=f2 solvable: {}",
            if self.algebraically_unsatisfiable { "no (0 = -1 mod p)" } else { "undecided (degenerate step)" }
        )?;
        writeln!(f, "  Excess:         {}", self.excess_children())?;
        if let (Some(observed), Some(m)) = (self.observed_anomaly, self.observed_match) {
            writeln!(f, "  Observed:       {} anomalous parents ({:?})", observed, m)?;
        }
        if !self.collision_mod_prime.is_empty() {
            writeln!(f, "  Collisions mod {}:", self.probe_prime)?;
            for (class, count) in &self.collision_mod_prime {
                writeln!(f, "    r = {:>3} : {}", class, count)?;
            }
        }
        let s = &self.mod30_symmetry;
        writeln!(
            f,
            "  Mod 30 (11/23/29): {:?} {}",
            s.counts,
            if s.symmetric {
                "symmetric".to_string()
            } else {
                format!("asymmetric, max deviation {:.0}", s.max_deviation)
            }
        )?;
        Ok(())
    }
}
