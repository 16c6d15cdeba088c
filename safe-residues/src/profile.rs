//! Per-parent extension counts of a lift.
//!
//! Under the (p-2) law every parent has exactly p - 2 children. The profile
//! records the histogram of children per parent so departures can be traced
//! to individual parents rather than only to the aggregate count.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::forbidden::LiftPolicy;
use crate::lift::LiftSink;
use crate::residue::{Modulus, ResidueSet};

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionProfile {
    pub prime: u64,
    /// children per parent -> number of parents
    pub histogram: BTreeMap<u64, u64>,
}

impl ExtensionProfile {
    pub fn new(prime: u64) -> Self {
        Self {
            prime,
            histogram: BTreeMap::new(),
        }
    }

    /// Profile a materialized lifted set by grouping children under their
    /// parent residue mod `previous`.
    pub fn from_lifted(lifted: &ResidueSet, previous: Modulus) -> Self {
        let prime = lifted.modulus().value() / previous.value();
        let mut per_parent: HashMap<u64, u64> = HashMap::new();
        for &x in lifted.iter() {
            *per_parent.entry(x % previous.value()).or_insert(0) += 1;
        }
        let mut profile = Self::new(prime);
        for count in per_parent.into_values() {
            *profile.histogram.entry(count).or_insert(0) += 1;
        }
        profile
    }

    pub fn expected(&self) -> u64 {
        self.prime.saturating_sub(2)
    }

    pub fn parents(&self) -> u64 {
        self.histogram.values().sum()
    }

    pub fn min(&self) -> Option<u64> {
        self.histogram.keys().next().copied()
    }

    pub fn max(&self) -> Option<u64> {
        self.histogram.keys().next_back().copied()
    }

    pub fn mean(&self) -> f64 {
        let parents = self.parents();
        if parents == 0 {
            return 0.0;
        }
        let children: u64 = self.histogram.iter().map(|(k, v)| k * v).sum();
        children as f64 / parents as f64
    }

    /// Root-mean-square deviation from p - 2.
    pub fn std_dev(&self) -> f64 {
        let parents = self.parents();
        if parents == 0 {
            return 0.0;
        }
        let expected = self.expected() as f64;
        let sq: f64 = self
            .histogram
            .iter()
            .map(|(&k, &v)| (k as f64 - expected).powi(2) * v as f64)
            .sum();
        (sq / parents as f64).sqrt()
    }

    pub fn variation_pct(&self) -> f64 {
        match self.expected() {
            0 => 0.0,
            e => 100.0 * self.std_dev() / e as f64,
        }
    }

    /// Every parent has the same number of children.
    pub fn is_uniform(&self) -> bool {
        self.histogram.len() <= 1
    }

    /// Parents whose child count differs from p - 2.
    pub fn anomalous_parents(&self) -> u64 {
        let expected = self.expected();
        self.histogram
            .iter()
            .filter(|(&k, _)| k != expected)
            .map(|(_, &v)| v)
            .sum()
    }
}

impl LiftSink for ExtensionProfile {
    fn accept(&mut self, _parent: u64, _policy: &LiftPolicy, children: &[u64]) {
        *self.histogram.entry(children.len() as u64).or_insert(0) += 1;
    }
}

impl fmt::Display for ExtensionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parents = self.parents();
        writeln!(f, "  Parents:        {}", parents)?;
        writeln!(f, "  Min / Max:      {:?} / {:?}", self.min(), self.max())?;
        writeln!(f, "  Mean:           {:.6}", self.mean())?;
        for (children, count) in &self.histogram {
            let pct = if parents > 0 { 100.0 * *count as f64 / parents as f64 } else { 0.0 };
            writeln!(f, "    {:>3} extensions : {} parents ({:.3}%)", children, count, pct)?;
        }
        if self.is_uniform() {
            writeln!(f, "  Uniform:        yes")?;
        } else {
            writeln!(
                f,
                "  Uniform:        no (std-dev {:.4}, variation {:.3}%)",
                self.std_dev(),
                self.variation_pct()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lift::LiftEngine;

    #[test]
    fn test_profile_from_sink_is_uniform() {
        let engine = LiftEngine::default();
        let base = engine
            .lift_chain(&ResidueSet::from_residues(Modulus::new(2).unwrap(), [1]).unwrap(), &[3, 5, 7])
            .unwrap()
            .pop()
            .unwrap();
        let mut profile = ExtensionProfile::new(11);
        engine
            .lift_into(base.iter().copied(), None, base.modulus(), 11, &mut profile)
            .unwrap();
        assert_eq!(profile.parents(), 15);
        assert!(profile.is_uniform());
        assert_eq!(profile.min(), Some(9));
        assert_eq!(profile.mean(), 9.0);
        assert_eq!(profile.std_dev(), 0.0);
        assert_eq!(profile.anomalous_parents(), 0);
    }

    #[test]
    fn test_profile_from_lifted_set() {
        let engine = LiftEngine::default();
        let parent = ResidueSet::from_residues(Modulus::new(30).unwrap(), [11, 23, 29]).unwrap();
        let (child, _) = engine.lift(&parent, 7).unwrap();
        let profile = ExtensionProfile::from_lifted(&child, parent.modulus());
        assert_eq!(profile.prime, 7);
        assert_eq!(profile.histogram.get(&5), Some(&3));
    }

    #[test]
    fn test_non_uniform_statistics() {
        let mut profile = ExtensionProfile::new(23);
        profile.histogram.insert(21, 3);
        profile.histogram.insert(22, 1);
        assert!(!profile.is_uniform());
        assert_eq!(profile.anomalous_parents(), 1);
        assert_eq!(profile.max(), Some(22));
        assert!((profile.mean() - 21.25).abs() < 1e-12);
        assert!((profile.std_dev() - 0.5).abs() < 1e-12);
    }
}
