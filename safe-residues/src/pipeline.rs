//! Level-by-level driver over a residue store.
//!
//! Level n is the primorial of the first n primes (level 1 is M = 2). A set
//! missing from the store is regenerated by lifting from the nearest lower
//! level that is stored or has a static seed. Stored and seeded sets must
//! match the closed-form count; lifted sets that miss it are reported.

use num_bigint::BigUint;

use residue_core::{primorial, PrimalityOracle, SMALL_PRIMES};

use crate::collision::{CollisionAnalyzer, CollisionReport, ComposedProbe};
use crate::error::{PipelineError, StoreError};
use crate::generate::{is_sophie_germain, SafePrimeSearch, SearchComparison};
use crate::lift::{LiftEngine, LiftSummary};
use crate::profile::ExtensionProfile;
use crate::report::ReportSink;
use crate::residue::{Modulus, ResidueSet};
use crate::scaling::{
    known_count, predicted_residue_count, verify, ScalingLawRecord, BRUTE_FORCE_LIMIT,
};
use crate::store::ResidueStore;
use crate::validator::{validate_lineage, CandidateKind, ResidueValidator, ValidationReport};

/// Highest level whose modulus fits in a u64 (47#).
pub const MAX_LEVEL: usize = SMALL_PRIMES.len();

/// Sophie Germain residues mod 2310.
pub const SOPHIE_GERMAIN_RESIDUES_2310: [u64; 135] = [
    23, 29, 41, 53, 83, 89, 113, 131, 149, 173, 179, 191, 221, 233, 239, 251, 263, 281, 293, 299,
    323, 359, 383, 389, 419, 431, 443, 449, 461, 491, 503, 509, 551, 569, 593, 611, 629, 641, 653,
    659, 683, 701, 713, 719, 743, 761, 779, 809, 821, 839, 851, 881, 893, 911, 923, 953, 971, 989,
    1013, 1019, 1031, 1049, 1073, 1079, 1091, 1103, 1121, 1139, 1163, 1181, 1223, 1229, 1241, 1271,
    1283, 1289, 1301, 1313, 1343, 1349, 1373, 1409, 1433, 1439, 1451, 1469, 1481, 1493, 1499, 1511,
    1541, 1553, 1559, 1583, 1601, 1619, 1643, 1649, 1679, 1691, 1703, 1709, 1733, 1751, 1763, 1769,
    1811, 1829, 1871, 1889, 1901, 1913, 1931, 1943, 1961, 1973, 1979, 2003, 2021, 2039, 2063, 2069,
    2081, 2099, 2111, 2129, 2141, 2153, 2171, 2213, 2231, 2273, 2279, 2291, 2309,
];

/// Built-in residue sets for the small primorials.
pub fn static_seed(modulus: Modulus) -> Option<ResidueSet> {
    let residues: &[u64] = match modulus.value() {
        2 => &[1],
        6 => &[5],
        30 => &[11, 23, 29],
        2310 => &SOPHIE_GERMAIN_RESIDUES_2310,
        _ => return None,
    };
    ResidueSet::from_residues(modulus, residues.iter().copied()).ok()
}

/// Outcome of validating independently generated safe primes.
#[derive(Debug, Clone)]
pub struct ValidationSummary {
    /// Every check passed.
    pub passed: bool,
    /// The set the residue-filtered search used.
    pub target: ResidueSet,
    /// Safe primes from the naive search, which never consults a residue set.
    pub primes: Vec<u64>,
    pub comparison: SearchComparison,
    /// Per-level safe-prime reports, then the Sophie Germain report, then
    /// the mod-2310 reference report.
    pub reports: Vec<ValidationReport>,
    /// Halves of `primes` the oracle rejects as Sophie Germain primes.
    pub not_sophie_germain: Vec<u64>,
}

pub struct Pipeline<S: ResidueStore> {
    store: S,
    engine: LiftEngine,
    persist: bool,
    static_seeds: bool,
}

impl<S: ResidueStore> Pipeline<S> {
    pub fn new(store: S, engine: LiftEngine) -> Self {
        Self {
            store,
            engine,
            persist: true,
            static_seeds: true,
        }
    }

    /// Save regenerated sets back to the store (on by default).
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Only the store may supply sets; nothing is seeded from built-in tables.
    pub fn without_static_seeds(mut self) -> Self {
        self.static_seeds = false;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn modulus_at(&self, level: usize) -> Result<Modulus, PipelineError> {
        if level == 0 || level > MAX_LEVEL {
            return Err(PipelineError::LevelOutOfRange {
                level,
                max: MAX_LEVEL,
            });
        }
        let value = primorial(level).ok_or(PipelineError::LevelOutOfRange {
            level,
            max: MAX_LEVEL,
        })?;
        Ok(Modulus::new(value)?)
    }

    /// The prime that extends level - 1 to `level`.
    pub fn prime_at(&self, level: usize) -> Result<u64, PipelineError> {
        self.modulus_at(level)?;
        Ok(SMALL_PRIMES[level - 1])
    }

    fn check_cardinality(&self, set: &ResidueSet) -> Result<(), PipelineError> {
        if let Some(expected) = known_count(set.modulus()) {
            if set.len() as u64 != expected {
                return Err(PipelineError::CardinalityMismatch {
                    modulus: set.modulus().value(),
                    expected,
                    found: set.len() as u64,
                });
            }
        }
        Ok(())
    }

    /// The set at `level` from the store or a static seed, without lifting.
    fn find(&mut self, level: usize) -> Result<Option<ResidueSet>, PipelineError> {
        let modulus = self.modulus_at(level)?;
        match self.store.load(modulus) {
            Ok(set) => {
                self.check_cardinality(&set)?;
                return Ok(Some(set));
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        if !self.static_seeds {
            return Ok(None);
        }
        match static_seed(modulus) {
            Some(set) => {
                self.check_cardinality(&set)?;
                log::debug!("Using static residues mod {}", modulus);
                if self.persist {
                    self.store.save(&set)?;
                }
                Ok(Some(set))
            }
            None => Ok(None),
        }
    }

    /// Lift `parent` (the set at level - 1) to `level`. A lifted set off the
    /// closed form is a finding, not a failure: it is logged and returned
    /// but never persisted.
    fn lift_level(
        &mut self,
        parent: &ResidueSet,
        level: usize,
    ) -> Result<(ResidueSet, LiftSummary), PipelineError> {
        let prime = self.prime_at(level)?;
        let (set, summary) = self.engine.lift(parent, prime)?;
        if let Err(e) = self.check_cardinality(&set) {
            log::warn!("Lifted set: {}; not saved", e);
        } else if self.persist {
            self.store.save(&set)?;
        }
        Ok((set, summary))
    }

    /// Verify one step of a chain and send it to `report`. `lifted` marks a
    /// `next` produced by lifting `current`, so its per-parent profile
    /// explains a deviation.
    fn record_step<R>(
        &self,
        current: &ResidueSet,
        next: &ResidueSet,
        prime: u64,
        lifted: bool,
        report: &mut R,
    ) -> ScalingLawRecord
    where
        R: ReportSink + ?Sized,
    {
        let record = verify(current.modulus(), prime, current.len() as u64, next.len() as u64)
            .with_brute_force(BRUTE_FORCE_LIMIT);
        if record.brute_force_mismatch() {
            log::warn!(
                "Set mod {} has {} residues, enumeration finds {:?}",
                record.modulus,
                record.observed_count,
                record.brute_force
            );
        }
        report.scaling_record(&record);
        if !record.holds() {
            log::warn!(
                "Scaling law off at mod {}: epsilon {:+.6}",
                record.modulus,
                record.epsilon
            );
            if lifted {
                report.extension_profile(
                    current.modulus(),
                    &ExtensionProfile::from_lifted(next, current.modulus()),
                );
            }
        }
        record
    }

    /// Load the set at `level`, regenerating it from lower levels if needed.
    pub fn load_or_regenerate(&mut self, level: usize) -> Result<ResidueSet, PipelineError> {
        let target = self.modulus_at(level)?;
        let mut k = level;
        let mut set = loop {
            if let Some(set) = self.find(k)? {
                break set;
            }
            if k == 1 {
                return Err(PipelineError::NoSource {
                    modulus: target.value(),
                });
            }
            log::warn!(
                "No residue set mod {}; falling back to level {}",
                self.modulus_at(k)?,
                k - 1
            );
            k -= 1;
        };

        while k < level {
            k += 1;
            let (next, _) = self.lift_level(&set, k)?;
            set = next;
        }
        Ok(set)
    }

    /// Walk levels 1..=max_level, verifying the (p-2) law at each step.
    pub fn run<R>(&mut self, max_level: usize, report: &mut R) -> Result<Vec<ScalingLawRecord>, PipelineError>
    where
        R: ReportSink + ?Sized,
    {
        self.modulus_at(max_level)?;
        let mut current = self.load_or_regenerate(1)?;
        let mut records = Vec::with_capacity(max_level.saturating_sub(1));

        for level in 2..=max_level {
            let prime = self.prime_at(level)?;
            let (next, lifted) = match self.find(level)? {
                Some(set) => (set, false),
                None => (self.lift_level(&current, level)?.0, true),
            };
            records.push(self.record_step(&current, &next, prime, lifted, report));
            current = next;
        }

        let primes = &SMALL_PRIMES[..max_level];
        report.closed_form(primes, &predicted_residue_count(primes));
        Ok(records)
    }

    /// Lift `base` through `primes` in turn, outside the store, and report
    /// every step. Deviations from the (p-2) law are returned as records.
    pub fn run_from<R>(
        &self,
        base: ResidueSet,
        primes: &[u64],
        report: &mut R,
    ) -> Result<Vec<ScalingLawRecord>, PipelineError>
    where
        R: ReportSink + ?Sized,
    {
        let mut current = base;
        let mut records = Vec::with_capacity(primes.len());
        for &prime in primes {
            let (next, _) = self.engine.lift(&current, prime)?;
            records.push(self.record_step(&current, &next, prime, true, report));
            current = next;
        }
        Ok(records)
    }

    /// Stream the lift of `level` to `level + 1`, keeping only counts and
    /// the per-parent profile.
    pub fn extend_count<R>(
        &mut self,
        level: usize,
        report: &mut R,
    ) -> Result<(ScalingLawRecord, ExtensionProfile, LiftSummary), PipelineError>
    where
        R: ReportSink + ?Sized,
    {
        let prime = self.prime_at(level + 1)?;
        let parent = self.load_or_regenerate(level)?;
        let mut profile = ExtensionProfile::new(prime);
        let summary = self.engine.lift_into(
            parent.iter().copied(),
            Some(parent.len()),
            parent.modulus(),
            prime,
            &mut profile,
        )?;
        let record = verify(parent.modulus(), prime, parent.len() as u64, summary.children);
        if let Some(expected) = known_count(record.modulus) {
            if expected != summary.children {
                log::warn!(
                    "Count-only lift mod {} gave {}, closed form says {}",
                    record.modulus,
                    summary.children,
                    expected
                );
            }
        }
        report.scaling_record(&record);
        report.extension_profile(parent.modulus(), &profile);
        Ok((record, profile, summary))
    }

    /// Collision analysis of the set at `level` against the next prime.
    pub fn analyze_collisions(&mut self, level: usize, composed: bool) -> Result<CollisionReport, PipelineError> {
        let probe = self.prime_at(level + 1)?;
        let set = self.load_or_regenerate(level)?;
        let interval = self.engine.options().progress_interval;
        let report = if composed {
            let probe = ComposedProbe::new(&SMALL_PRIMES[..level], probe)?;
            CollisionAnalyzer::new(probe)
                .with_progress_interval(interval)
                .analyze(set.iter().copied())
        } else {
            CollisionAnalyzer::single_level(set.modulus(), probe)?
                .with_progress_interval(interval)
                .analyze(set.iter().copied())
        };
        Ok(report)
    }

    /// Count-only lift of `level`, then the collision analysis of the same
    /// set matched against the parents the lift found off (p-2).
    pub fn analyze_anomaly<R>(
        &mut self,
        level: usize,
        composed: bool,
        report: &mut R,
    ) -> Result<CollisionReport, PipelineError>
    where
        R: ReportSink + ?Sized,
    {
        let (_, profile, _) = self.extend_count(level, report)?;
        let collisions = self
            .analyze_collisions(level, composed)?
            .with_observed(profile.anomalous_parents());
        report.collision_report(&collisions);
        Ok(collisions)
    }

    /// Generate `count` safe primes from `start` without consulting any
    /// residue set, then check them against every level up to `level`,
    /// against the residue-filtered search and against the mod-2310 table.
    pub fn validate_generated<O, R>(
        &mut self,
        level: usize,
        search: &SafePrimeSearch<'_, O>,
        start: u64,
        count: usize,
        report: &mut R,
    ) -> Result<ValidationSummary, PipelineError>
    where
        O: PrimalityOracle + ?Sized,
        R: ReportSink + ?Sized,
    {
        let target = self.load_or_regenerate(level)?;
        let (naive, _, comparison) = search.compare(start, count, &target);
        report.search_comparison(&comparison);
        let mut passed = comparison.agree;
        if !comparison.agree {
            log::error!("Residue-filtered search mod {} missed safe primes", target.modulus());
        }
        let primes = naive.primes;

        let mut levels = Vec::with_capacity(level);
        for k in 1..=level {
            levels.push(self.load_or_regenerate(k)?);
        }
        let mut reports: Vec<ValidationReport> =
            validate_lineage(&primes, &levels, CandidateKind::SafePrime)
                .into_values()
                .collect();

        let sophie_germain: Vec<u64> = primes.iter().map(|p| p / 2).collect();
        let not_sophie_germain: Vec<u64> = sophie_germain
            .iter()
            .copied()
            .filter(|&q| !is_sophie_germain(search.oracle(), q))
            .collect();
        for q in &not_sophie_germain {
            log::error!("{} is not a Sophie Germain prime", q);
        }
        passed &= not_sophie_germain.is_empty();

        reports.push(ResidueValidator::for_sophie_germain(&target).validate(&sophie_germain));
        reports.push(ResidueValidator::reference_2310().validate(&primes));
        for validation in &reports {
            passed &= validation.passed();
            report.validation_report(validation);
        }

        Ok(ValidationSummary {
            passed,
            target,
            primes,
            comparison,
            reports,
            not_sophie_germain,
        })
    }

    /// Closed-form count at `level`.
    pub fn predicted_count(&self, level: usize) -> Result<BigUint, PipelineError> {
        self.modulus_at(level)?;
        Ok(predicted_residue_count(&SMALL_PRIMES[..level]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_static_seeds_are_consistent() {
        for level in [1, 2, 3, 5] {
            let m = Modulus::new(primorial(level).unwrap()).unwrap();
            let seed = static_seed(m).unwrap();
            assert_eq!(Some(seed.len() as u64), known_count(m), "seed mod {}", m);
        }
        assert!(static_seed(Modulus::new(210).unwrap()).is_none());
    }

    #[test]
    fn test_seed_2310_matches_lift() {
        let lifted = LiftEngine::default()
            .lift_chain(&ResidueSet::trivial(), &[2, 3, 5, 7, 11])
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(static_seed(Modulus::P5).unwrap(), lifted);
    }

    #[test]
    fn test_level_bounds() {
        let pipeline = Pipeline::new(MemoryStore::new(), LiftEngine::default());
        assert_eq!(pipeline.modulus_at(3).unwrap().value(), 30);
        assert_eq!(pipeline.prime_at(4).unwrap(), 7);
        assert!(matches!(
            pipeline.modulus_at(0),
            Err(PipelineError::LevelOutOfRange { level: 0, .. })
        ));
        assert!(pipeline.modulus_at(MAX_LEVEL + 1).is_err());
        assert_eq!(pipeline.predicted_count(6).unwrap(), BigUint::from(1485u32));
    }

    #[test]
    fn test_regenerates_from_seed() {
        let mut pipeline = Pipeline::new(MemoryStore::new(), LiftEngine::default());
        let set = pipeline.load_or_regenerate(4).unwrap();
        assert_eq!(set.len(), 15);
        // seed at 30 plus the lifted level
        assert!(pipeline.store().contains(Modulus::new(30).unwrap()));
        assert!(pipeline.store().contains(Modulus::new(210).unwrap()));
    }

    #[test]
    fn test_no_source_is_fatal() {
        let mut pipeline =
            Pipeline::new(MemoryStore::new(), LiftEngine::default()).without_static_seeds();
        assert!(matches!(
            pipeline.load_or_regenerate(3),
            Err(PipelineError::NoSource { modulus: 30 })
        ));
    }

    #[test]
    fn test_cardinality_mismatch_is_fatal() {
        let mut store = MemoryStore::new();
        store
            .save(&ResidueSet::from_residues(Modulus::new(30).unwrap(), [11, 23]).unwrap())
            .unwrap();
        let mut pipeline = Pipeline::new(store, LiftEngine::default());
        assert!(matches!(
            pipeline.load_or_regenerate(4),
            Err(PipelineError::CardinalityMismatch {
                modulus: 30,
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn test_analyze_collisions() {
        let mut pipeline = Pipeline::new(MemoryStore::new(), LiftEngine::default());
        let naive = pipeline.analyze_collisions(5, false).unwrap();
        assert_eq!(naive.total, 135);
        assert_eq!(naive.collisions, 0);
        assert!(naive.algebraically_unsatisfiable);
        let composed = pipeline.analyze_collisions(5, true).unwrap();
        assert_eq!(composed.total, 135);
        assert_eq!(composed.probe_prime, 13);
        assert_eq!(composed.modulus, Modulus::P5);
        assert!(composed.algebraically_unsatisfiable);
    }

    #[derive(Default)]
    struct Collect {
        records: Vec<ScalingLawRecord>,
        profiles: Vec<(Modulus, ExtensionProfile)>,
        collisions: Vec<CollisionReport>,
        validations: Vec<ValidationReport>,
    }

    impl ReportSink for Collect {
        fn scaling_record(&mut self, record: &ScalingLawRecord) {
            self.records.push(record.clone());
        }

        fn collision_report(&mut self, report: &CollisionReport) {
            self.collisions.push(report.clone());
        }

        fn extension_profile(&mut self, modulus: Modulus, profile: &ExtensionProfile) {
            self.profiles.push((modulus, profile.clone()));
        }

        fn validation_report(&mut self, report: &ValidationReport) {
            self.validations.push(report.clone());
        }
    }

    #[test]
    fn test_deviation_is_reported_not_fatal() {
        let pipeline = Pipeline::new(MemoryStore::new(), LiftEngine::default());
        let base = static_seed(Modulus::new(30).unwrap()).unwrap();
        let mut sink = Collect::default();

        // 5 divides 30, so every parent keeps all five children
        let records = pipeline.run_from(base, &[5, 7], &mut sink).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].observed_count, 15);
        assert_eq!(records[0].predicted_count, 9);
        assert_eq!(records[0].verdict, crate::scaling::Verdict::SignificantDeviation);
        assert_eq!(records[0].brute_force, Some(15));
        assert!(!records[0].brute_force_mismatch());
        assert!(records[1].holds());
        assert_eq!(records[1].observed_count, 75);

        assert_eq!(sink.records.len(), 2);
        assert!(!sink.records[0].holds());
        assert_eq!(sink.profiles.len(), 1);
        let (modulus, profile) = &sink.profiles[0];
        assert_eq!(modulus.value(), 30);
        assert_eq!(profile.anomalous_parents(), 3);
        assert_eq!(profile.max(), Some(5));
    }

    #[test]
    fn test_run_cross_checks_brute_force() {
        let mut pipeline = Pipeline::new(MemoryStore::new(), LiftEngine::default());
        let mut sink = Collect::default();
        let records = pipeline.run(7, &mut sink).unwrap();
        let checked: Vec<u64> = records.iter().filter_map(|r| r.brute_force).collect();
        assert_eq!(checked, vec![1, 3, 15, 135, 1485]);
        assert!(records.iter().all(|r| !r.brute_force_mismatch()));
        assert!(sink.profiles.is_empty());
    }

    #[test]
    fn test_analyze_anomaly_matches_lift() {
        let mut pipeline = Pipeline::new(MemoryStore::new(), LiftEngine::default());
        let mut sink = Collect::default();
        let report = pipeline.analyze_anomaly(4, true, &mut sink).unwrap();
        assert_eq!(report.observed_anomaly, Some(0));
        assert_eq!(report.observed_match, Some(crate::collision::AnomalyMatch::Exact));
        assert_eq!(sink.collisions.len(), 1);
        assert_eq!(sink.profiles.len(), 1);
        assert!(sink.records[0].holds());
    }

    #[test]
    fn test_validate_generated_clean() {
        let oracle = residue_core::MillerRabin::new(16);
        let search = SafePrimeSearch::new(&oracle);
        let mut pipeline = Pipeline::new(MemoryStore::new(), LiftEngine::default());
        let mut sink = Collect::default();
        let summary = pipeline
            .validate_generated(5, &search, 100_000, 20, &mut sink)
            .unwrap();
        assert!(summary.passed);
        assert!(summary.comparison.agree);
        assert_eq!(summary.primes.len(), 20);
        assert!(summary.not_sophie_germain.is_empty());
        // five levels, the Sophie Germain parts, the 2310 table
        assert_eq!(summary.reports.len(), 7);
        assert_eq!(sink.validations.len(), 7);
        assert_eq!(sink.validations[6].modulus, Modulus::P5);
    }
}
