//! Primorial residue-lift driver.
//!
//! Usage:
//!   safe-residues --mode=scaling  [--levels=8]
//!   safe-residues --mode=lift     [--level=6] [--parallel]
//!   safe-residues --mode=anomaly  [--level=6] [--composed]
//!   safe-residues --mode=validate [--level=6] [--start=N] [--count=N] [--rounds=20] [--csv=FILE]
//!   safe-residues --mode=all          (scaling, anomaly, validate)
//!
//! Common flags: --store-dir=DIR --json=FILE --progress=N --no-persist

use std::fmt::Display;

use residue_core::MillerRabin;
use safe_residues::config::{CliConfig, Mode};
use safe_residues::generate::SafePrimeSearch;
use safe_residues::report::{safe_prime_rows, write_safe_prime_csv, ConsoleReport, JsonReport};
use safe_residues::{JsonStore, LiftEngine, Pipeline, PipelineError};

type Report = (ConsoleReport, JsonReport);

fn main() {
    env_logger::init();

    let config = or_exit(CliConfig::from_args(std::env::args().skip(1)));

    println!("==========================================================");
    println!("  Safe-prime residues modulo primorials");
    println!("==========================================================");
    println!();

    let store = JsonStore::new(&config.store_dir);
    let engine = LiftEngine::new(config.lift_options());
    let mut pipeline = Pipeline::new(store, engine).with_persist(config.persist);
    let mut report: Report = (ConsoleReport::new(), JsonReport::new());

    let mut passed = true;
    match config.mode {
        Mode::Scaling => or_exit(run_scaling(&mut pipeline, &config, &mut report)),
        Mode::Lift => or_exit(run_lift(&mut pipeline, &config, &mut report)),
        Mode::Anomaly => or_exit(run_anomaly(&mut pipeline, &config, &mut report)),
        Mode::Validate => passed = or_exit(run_validate(&mut pipeline, &config, &mut report)),
        Mode::All => {
            or_exit(run_scaling(&mut pipeline, &config, &mut report));
            or_exit(run_anomaly(&mut pipeline, &config, &mut report));
            passed = or_exit(run_validate(&mut pipeline, &config, &mut report));
        }
    }

    if let Some(path) = &config.json {
        or_exit(report.1.write(path));
        println!("\nResults written to {}", path.display());
    }

    if !passed {
        eprintln!("Error: generated safe primes fell outside the predicted residues");
        std::process::exit(1);
    }
}

fn or_exit<T, E: Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

fn run_scaling(
    pipeline: &mut Pipeline<JsonStore>,
    config: &CliConfig,
    report: &mut Report,
) -> Result<(), PipelineError> {
    println!("--- Scaling law up to level {} ---", config.levels);
    let records = pipeline.run(config.levels, report)?;
    let exact = records.iter().filter(|r| r.holds()).count();
    println!();
    println!("(p-2) law exact at {}/{} levels", exact, records.len());
    println!();
    Ok(())
}

fn run_lift(
    pipeline: &mut Pipeline<JsonStore>,
    config: &CliConfig,
    report: &mut Report,
) -> Result<(), PipelineError> {
    println!("--- Count-only lift of level {} ---", config.level);
    let (record, profile, summary) = pipeline.extend_count(config.level, report)?;
    println!();
    print!("{}", record);
    println!(
        "  Dropped / collided / partial: {} / {} / {}",
        summary.dropped, summary.collisions, summary.partially_constrained
    );
    if profile.anomalous_parents() > 0 {
        println!("  Parents off p-2: {}", profile.anomalous_parents());
    }
    println!();
    Ok(())
}

fn run_anomaly(
    pipeline: &mut Pipeline<JsonStore>,
    config: &CliConfig,
    report: &mut Report,
) -> Result<(), PipelineError> {
    println!("--- Collision analysis of level {} ---", config.level);
    pipeline.analyze_anomaly(config.level, config.composed, report)?;
    println!();
    Ok(())
}

/// Returns whether every level validated.
fn run_validate(
    pipeline: &mut Pipeline<JsonStore>,
    config: &CliConfig,
    report: &mut Report,
) -> Result<bool, PipelineError> {
    println!("--- Safe-prime validation at level {} ---", config.level);
    let oracle = MillerRabin::new(config.rounds);
    let search = SafePrimeSearch::new(&oracle);
    let summary =
        pipeline.validate_generated(config.level, &search, config.start, config.count, report)?;
    let (passed, primes) = (summary.passed, &summary.primes);

    if let Some(path) = &config.csv {
        let rows = safe_prime_rows(primes, &summary.target);
        if let Err(e) = write_safe_prime_csv(path, &rows) {
            log::warn!("Could not write {}: {}", path.display(), e);
        } else {
            println!("\nSafe primes written to {}", path.display());
        }
    }

    println!();
    println!(
        "{} safe primes from {}: {}",
        primes.len(),
        config.start,
        if passed { "all residues predicted" } else { "UNPREDICTED RESIDUES" }
    );
    Ok(passed)
}
