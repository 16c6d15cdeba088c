//! Reporting sinks: console tables, JSON reports and the safe-prime CSV.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use num_bigint::BigUint;
use serde::Serialize;

use residue_core::primorial_big;

use crate::collision::CollisionReport;
use crate::error::ReportError;
use crate::generate::SearchComparison;
use crate::profile::ExtensionProfile;
use crate::residue::{Modulus, ResidueSet};
use crate::scaling::{epsilon_trend, EpsilonTrend, ScalingLawRecord};
use crate::validator::ValidationReport;

/// Consumer of the statistics computed by the engine.
pub trait ReportSink {
    fn scaling_record(&mut self, record: &ScalingLawRecord);

    fn closed_form(&mut self, _primes: &[u64], _predicted: &BigUint) {}

    fn collision_report(&mut self, report: &CollisionReport);

    fn extension_profile(&mut self, modulus: Modulus, profile: &ExtensionProfile);

    fn validation_report(&mut self, report: &ValidationReport);

    fn search_comparison(&mut self, _comparison: &SearchComparison) {}
}

impl<A: ReportSink, B: ReportSink> ReportSink for (A, B) {
    fn scaling_record(&mut self, record: &ScalingLawRecord) {
        self.0.scaling_record(record);
        self.1.scaling_record(record);
    }

    fn closed_form(&mut self, primes: &[u64], predicted: &BigUint) {
        self.0.closed_form(primes, predicted);
        self.1.closed_form(primes, predicted);
    }

    fn collision_report(&mut self, report: &CollisionReport) {
        self.0.collision_report(report);
        self.1.collision_report(report);
    }

    fn extension_profile(&mut self, modulus: Modulus, profile: &ExtensionProfile) {
        self.0.extension_profile(modulus, profile);
        self.1.extension_profile(modulus, profile);
    }

    fn validation_report(&mut self, report: &ValidationReport) {
        self.0.validation_report(report);
        self.1.validation_report(report);
    }

    fn search_comparison(&mut self, comparison: &SearchComparison) {
        self.0.search_comparison(comparison);
        self.1.search_comparison(comparison);
    }
}

/// Prints human-readable tables to stdout.
#[derive(Debug, Default)]
pub struct ConsoleReport {
    header_printed: bool,
    last_anomaly: Option<ScalingLawRecord>,
}

impl ConsoleReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn print_header(&mut self) {
        if self.header_printed {
            return;
        }
        println!(
            "{:>14} | {:>3} | {:>12} | {:>12} | {:>12} | {:>10} | {:>9}",
            "Modulus", "p", "Previous", "Observed", "Predicted", "Epsilon", "Error %"
        );
        println!("{}", "-".repeat(90));
        self.header_printed = true;
    }
}

impl ReportSink for ConsoleReport {
    fn scaling_record(&mut self, record: &ScalingLawRecord) {
        self.print_header();
        println!(
            "{:>14} | {:>3} | {:>12} | {:>12} | {:>12} | {:>+10.6} | {:>+9.4}  {}",
            record.modulus.to_string(),
            record.prime,
            record.previous_count,
            record.observed_count,
            record.predicted_count,
            record.epsilon,
            record.error_pct,
            record.verdict
        );
        if !record.holds() {
            if let Some(prev) = &self.last_anomaly {
                match epsilon_trend(prev, record) {
                    EpsilonTrend::Amplification(x) => {
                        println!("{:>14}   epsilon amplified {:.2}x since p={}", "", x, prev.prime)
                    }
                    EpsilonTrend::Attenuation(x) => {
                        println!("{:>14}   epsilon attenuated to {:.2}x of p={}", "", x, prev.prime)
                    }
                    EpsilonTrend::Stable => {}
                }
            }
            self.last_anomaly = Some(record.clone());
        }
    }

    fn closed_form(&mut self, primes: &[u64], predicted: &BigUint) {
        let factors: Vec<String> = primes.iter().skip(1).map(|p| p.saturating_sub(2).to_string()).collect();
        println!();
        println!(
            "Closed form: Res({}# = {}) = {} = {}",
            primes.last().copied().unwrap_or(1),
            primorial_big(primes.len()),
            factors.join(" x "),
            predicted
        );
    }

    fn collision_report(&mut self, report: &CollisionReport) {
        println!();
        println!("Collision analysis mod {}:", report.modulus);
        print!("{}", report);
    }

    fn extension_profile(&mut self, modulus: Modulus, profile: &ExtensionProfile) {
        println!();
        println!("Extension profile mod {} -> p = {}:", modulus, profile.prime);
        print!("{}", profile);
    }

    fn validation_report(&mut self, report: &ValidationReport) {
        println!();
        println!("Validation mod {}:", report.modulus);
        print!("{}", report);
        if !report.frequency.top.is_empty() {
            println!("  Top residues:");
            for (residue, hits) in &report.frequency.top {
                println!("    {:>8} : {}", residue, hits);
            }
        }
    }

    fn search_comparison(&mut self, comparison: &SearchComparison) {
        println!();
        println!("Safe-prime search:");
        println!("  Naive tested:     {}", comparison.naive_tested);
        println!("  Filtered tested:  {}", comparison.filtered_tested);
        println!("  Reduction:        {:.1}%", comparison.reduction_pct);
        println!("  Speedup:          {:.2}x", comparison.speedup);
        println!("  Same primes:      {}", if comparison.agree { "yes" } else { "NO" });
    }
}

#[derive(Debug, Clone, Serialize)]
struct ClosedForm {
    primes: Vec<u64>,
    predicted: String,
}

#[derive(Debug, Clone, Serialize)]
struct ProfileEntry {
    modulus: Modulus,
    parents: u64,
    mean: f64,
    std_dev: f64,
    uniform: bool,
    profile: ExtensionProfile,
}

/// Collects everything and writes one pretty-printed JSON document.
#[derive(Debug, Default, Serialize)]
pub struct JsonReport {
    generated_at: String,
    scaling: Vec<ScalingLawRecord>,
    closed_form: Option<ClosedForm>,
    collisions: Vec<CollisionReport>,
    profiles: Vec<ProfileEntry>,
    validations: Vec<ValidationReport>,
    searches: Vec<SearchComparison>,
}

impl JsonReport {
    pub fn new() -> Self {
        Self {
            generated_at: iso_now(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scaling.is_empty()
            && self.collisions.is_empty()
            && self.profiles.is_empty()
            && self.validations.is_empty()
            && self.searches.is_empty()
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}

impl ReportSink for JsonReport {
    fn scaling_record(&mut self, record: &ScalingLawRecord) {
        self.scaling.push(record.clone());
    }

    fn closed_form(&mut self, primes: &[u64], predicted: &BigUint) {
        self.closed_form = Some(ClosedForm {
            primes: primes.to_vec(),
            predicted: predicted.to_string(),
        });
    }

    fn collision_report(&mut self, report: &CollisionReport) {
        self.collisions.push(report.clone());
    }

    fn extension_profile(&mut self, modulus: Modulus, profile: &ExtensionProfile) {
        self.profiles.push(ProfileEntry {
            modulus,
            parents: profile.parents(),
            mean: profile.mean(),
            std_dev: profile.std_dev(),
            uniform: profile.is_uniform(),
            profile: profile.clone(),
        });
    }

    fn validation_report(&mut self, report: &ValidationReport) {
        self.validations.push(report.clone());
    }

    fn search_comparison(&mut self, comparison: &SearchComparison) {
        self.searches.push(comparison.clone());
    }
}

/// One row of the safe-prime CSV export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafePrimeRow {
    pub safe_prime: u64,
    pub residue: u64,
    pub sophie_germain: u64,
    /// `residue` is in the safe-prime image of the set.
    pub in_safe: bool,
    /// The Sophie Germain part's residue is in the set.
    pub in_sg: bool,
}

pub fn safe_prime_rows(primes: &[u64], set: &ResidueSet) -> Vec<SafePrimeRow> {
    let m = set.modulus().value();
    let image = set.safe_prime_image();
    primes
        .iter()
        .map(|&p| {
            let sophie_germain = p / 2;
            SafePrimeRow {
                safe_prime: p,
                residue: p % m,
                sophie_germain,
                in_safe: image.contains(&(p % m)),
                in_sg: set.contains(sophie_germain % m),
            }
        })
        .collect()
}

pub fn write_safe_prime_csv(path: &Path, rows: &[SafePrimeRow]) -> Result<(), ReportError> {
    let mut out = BufWriter::new(fs::File::create(path)?);
    writeln!(out, "SafePrime,Residue,SophieGermain,InSafe,InSG")?;
    for row in rows {
        writeln!(
            out,
            "{},{},{},{},{}",
            row.safe_prime, row.residue, row.sophie_germain, row.in_safe, row.in_sg
        )?;
    }
    out.flush()?;
    log::info!("Wrote {} safe primes to {}", rows.len(), path.display());
    Ok(())
}

/// Current UTC time as ISO 8601, via `date` where available.
pub fn iso_now() -> String {
    #[cfg(unix)]
    {
        if let Ok(out) = std::process::Command::new("date")
            .args(["-u", "+%Y-%m-%dT%H:%M:%SZ"])
            .output()
        {
            if out.status.success() {
                return String::from_utf8_lossy(&out.stdout).trim().to_string();
            }
        }
    }
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("epoch:{}", secs)
}
