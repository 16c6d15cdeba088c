//! CRT lift of a residue set from modulus M to M·p.
//!
//! Each parent residue r mod M yields the children r + M·t for every offset
//! t in [0, p) not forbidden by its `LiftPolicy`. Parents are independent,
//! so the engine streams children to a `LiftSink` one parent at a time and
//! callers choose how much to keep: the full set, counts only, or a
//! per-parent profile.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::error::LiftError;
use crate::forbidden::{ForbiddenCalculator, LiftPolicy};
use crate::residue::{check_residue, Modulus, ResidueSet};

/// Default number of parents between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 50_000;

/// Consumer of lifted residues.
pub trait LiftSink {
    /// Called once per parent with its policy and surviving children.
    fn accept(&mut self, parent: u64, policy: &LiftPolicy, children: &[u64]);
}

impl LiftSink for ResidueSet {
    fn accept(&mut self, _parent: u64, _policy: &LiftPolicy, children: &[u64]) {
        self.extend(children.iter().copied());
    }
}

/// Discards children; the engine's summary already carries the counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountOnly;

impl LiftSink for CountOnly {
    fn accept(&mut self, _parent: u64, _policy: &LiftPolicy, _children: &[u64]) {}
}

impl<A: LiftSink, B: LiftSink> LiftSink for (A, B) {
    fn accept(&mut self, parent: u64, policy: &LiftPolicy, children: &[u64]) {
        self.0.accept(parent, policy, children);
        self.1.accept(parent, policy, children);
    }
}

impl<S: LiftSink + ?Sized> LiftSink for &mut S {
    fn accept(&mut self, parent: u64, policy: &LiftPolicy, children: &[u64]) {
        (**self).accept(parent, policy, children);
    }
}

/// Engine settings.
#[derive(Debug, Clone, Copy)]
pub struct LiftOptions {
    /// Parents between progress log lines; 0 disables progress logging.
    pub progress_interval: usize,
    /// Use rayon to lift parents across threads when materializing a set.
    pub parallel: bool,
}

impl Default for LiftOptions {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            parallel: false,
        }
    }
}

/// Counts gathered while lifting one level.
#[derive(Debug, Clone, Serialize)]
pub struct LiftSummary {
    pub modulus: Modulus,
    pub prime: u64,
    pub new_modulus: Modulus,
    /// Parents consumed.
    pub parents: u64,
    /// Children emitted.
    pub children: u64,
    /// Parents dropped entirely by the degenerate policy.
    pub dropped: u64,
    /// Parents whose two forbidden offsets coincided.
    pub collisions: u64,
    /// Parents with one or both offsets undefined (but not dropped).
    pub partially_constrained: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl LiftSummary {
    fn new(modulus: Modulus, prime: u64, new_modulus: Modulus) -> Self {
        Self {
            modulus,
            prime,
            new_modulus,
            parents: 0,
            children: 0,
            dropped: 0,
            collisions: 0,
            partially_constrained: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, policy: &LiftPolicy, children: usize) {
        self.parents += 1;
        self.children += children as u64;
        match *policy {
            LiftPolicy::DropEntirely => self.dropped += 1,
            LiftPolicy::Keep {
                forbidden1: Some(a),
                forbidden2: Some(b),
            } => {
                if a == b {
                    self.collisions += 1;
                }
            }
            LiftPolicy::Keep { .. } => self.partially_constrained += 1,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.parents += other.parents;
        self.children += other.children;
        self.dropped += other.dropped;
        self.collisions += other.collisions;
        self.partially_constrained += other.partially_constrained;
        self
    }

    /// No collision, drop or undefined offset occurred, so the count must
    /// scale by exactly p - 2.
    pub fn is_clean(&self) -> bool {
        self.dropped == 0 && self.collisions == 0 && self.partially_constrained == 0
    }
}

/// Write the surviving children of `r` into `out`, returning its policy.
pub fn lift_residue(calc: &ForbiddenCalculator, r: u64, out: &mut Vec<u64>) -> LiftPolicy {
    out.clear();
    let policy = calc.policy(r);
    if policy != LiftPolicy::DropEntirely {
        let m = calc.modulus().value();
        out.extend(
            (0..calc.prime())
                .filter(|&t| !policy.is_forbidden(t))
                .map(|t| r + m * t),
        );
    }
    policy
}

/// Drives lifts level by level.
#[derive(Debug, Clone, Default)]
pub struct LiftEngine {
    options: LiftOptions,
}

impl LiftEngine {
    pub fn new(options: LiftOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LiftOptions {
        &self.options
    }

    /// Stream the lift of `parents` (residues mod `modulus`) by `prime`
    /// into `sink`. `total` is only used for progress estimates.
    pub fn lift_into<I, S>(
        &self,
        parents: I,
        total: Option<usize>,
        modulus: Modulus,
        prime: u64,
        sink: &mut S,
    ) -> Result<LiftSummary, LiftError>
    where
        I: IntoIterator<Item = u64>,
        S: LiftSink + ?Sized,
    {
        let calc = ForbiddenCalculator::new(modulus, prime)?;
        let new_modulus = modulus.extend(prime)?;
        let mut summary = LiftSummary::new(modulus, prime, new_modulus);
        let mut children = Vec::with_capacity(prime as usize);
        let start = Instant::now();

        log::debug!(
            "Lifting mod {} -> {} (p={}, degenerate={})",
            modulus,
            new_modulus,
            prime,
            calc.is_degenerate()
        );

        for r in parents {
            check_residue(r, modulus)?;
            let policy = lift_residue(&calc, r, &mut children);
            summary.record(&policy, children.len());
            sink.accept(r, &policy, &children);

            if self.options.progress_interval > 0
                && summary.parents % self.options.progress_interval as u64 == 0
            {
                log_progress(summary.parents, total, start.elapsed());
            }
        }

        summary.elapsed = start.elapsed();
        log::info!(
            "Lifted {} residues mod {} to {} residues mod {} in {:.1?}",
            summary.parents,
            modulus,
            summary.children,
            new_modulus,
            summary.elapsed
        );
        Ok(summary)
    }

    /// Materialize the lifted set.
    pub fn lift(&self, set: &ResidueSet, prime: u64) -> Result<(ResidueSet, LiftSummary), LiftError> {
        if self.options.parallel {
            return self.lift_par(set, prime);
        }
        let new_modulus = set.modulus().extend(prime)?;
        let capacity = set.len().saturating_mul(prime.saturating_sub(2).max(1) as usize);
        let mut out = ResidueSet::with_capacity(new_modulus, capacity);
        let summary = self.lift_into(
            set.iter().copied(),
            Some(set.len()),
            set.modulus(),
            prime,
            &mut out,
        )?;
        Ok((out, summary))
    }

    /// Count the lifted set without storing it.
    pub fn count(&self, set: &ResidueSet, prime: u64) -> Result<LiftSummary, LiftError> {
        self.lift_into(
            set.iter().copied(),
            Some(set.len()),
            set.modulus(),
            prime,
            &mut CountOnly,
        )
    }

    /// Lift across rayon workers; each thread builds its own partial set.
    pub fn lift_par(&self, set: &ResidueSet, prime: u64) -> Result<(ResidueSet, LiftSummary), LiftError> {
        let modulus = set.modulus();
        let calc = ForbiddenCalculator::new(modulus, prime)?;
        let new_modulus = modulus.extend(prime)?;
        let parents: Vec<u64> = set.iter().copied().collect();
        let start = Instant::now();

        let empty = || {
            (
                HashSet::<u64>::new(),
                LiftSummary::new(modulus, prime, new_modulus),
                Vec::<u64>::with_capacity(prime as usize),
            )
        };

        let (residues, mut summary, _) = parents
            .par_iter()
            .try_fold(empty, |(mut acc, mut summary, mut buf), &r| {
                check_residue(r, modulus)?;
                let policy = lift_residue(&calc, r, &mut buf);
                summary.record(&policy, buf.len());
                acc.extend(buf.iter().copied());
                Ok::<_, LiftError>((acc, summary, buf))
            })
            .try_reduce(empty, |(mut a, sa, buf), (b, sb, _)| {
                if a.len() < b.len() {
                    let mut b = b;
                    b.extend(a);
                    return Ok((b, sa.merge(sb), buf));
                }
                a.extend(b);
                Ok((a, sa.merge(sb), buf))
            })?;

        summary.elapsed = start.elapsed();
        log::info!(
            "Lifted {} residues mod {} to {} residues mod {} in {:.1?} (parallel)",
            summary.parents,
            modulus,
            residues.len(),
            new_modulus,
            summary.elapsed
        );
        Ok((ResidueSet::from_parts(new_modulus, residues), summary))
    }

    /// Lift successively by each prime in `primes`.
    pub fn lift_chain(&self, set: &ResidueSet, primes: &[u64]) -> Result<Vec<ResidueSet>, LiftError> {
        let mut levels = Vec::with_capacity(primes.len());
        let mut current = set.clone();
        for &p in primes {
            let (next, _) = self.lift(&current, p)?;
            levels.push(next.clone());
            current = next;
        }
        Ok(levels)
    }
}

fn log_progress(done: u64, total: Option<usize>, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };
    match total {
        Some(total) if total > 0 => {
            let remaining = (total as u64).saturating_sub(done) as f64;
            let eta = if rate > 0.0 { remaining / rate } else { 0.0 };
            log::info!(
                "  {}/{} ({:.1}%) | {:.0} res/s | ETA: {:.0}s",
                done,
                total,
                100.0 * done as f64 / total as f64,
                rate,
                eta
            );
        }
        _ => log::info!("  {} | {:.0} res/s", done, rate),
    }
}
