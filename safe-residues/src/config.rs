//! Command-line configuration.
//!
//! Flags use the `--key=value` form; a bare `--flag` means `true`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::lift::{LiftOptions, DEFAULT_PROGRESS_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Verify the (p-2) law level by level up to `levels`.
    Scaling,
    /// Count-only lift of `level` with an extension profile.
    Lift,
    /// Collision analysis of `level` against the next prime.
    Anomaly,
    /// Generate safe primes and validate their residues.
    Validate,
    All,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scaling" => Ok(Mode::Scaling),
            "lift" => Ok(Mode::Lift),
            "anomaly" => Ok(Mode::Anomaly),
            "validate" => Ok(Mode::Validate),
            "all" => Ok(Mode::All),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

const KNOWN_FLAGS: &[&str] = &[
    "mode", "levels", "level", "store-dir", "rounds", "progress", "start", "count", "csv", "json",
    "parallel", "composed", "no-persist",
];

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub mode: Mode,
    /// Highest level of the scaling table.
    pub levels: usize,
    /// Level lifted or analyzed in `lift` / `anomaly` mode.
    pub level: usize,
    pub store_dir: PathBuf,
    /// Miller-Rabin rounds.
    pub rounds: u32,
    pub progress: usize,
    pub start: u64,
    pub count: usize,
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
    pub parallel: bool,
    pub composed: bool,
    pub persist: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            mode: Mode::All,
            levels: 8,
            level: 6,
            store_dir: PathBuf::from("data"),
            rounds: 20,
            progress: DEFAULT_PROGRESS_INTERVAL,
            start: 1_000_000,
            count: 100,
            csv: None,
            json: None,
            parallel: false,
            composed: false,
            persist: true,
        }
    }
}

impl CliConfig {
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let opts = parse_args(args);
        if let Some(key) = opts.keys().find(|k| !KNOWN_FLAGS.contains(&k.as_str())) {
            return Err(ConfigError::UnknownFlag(key.clone()));
        }

        let defaults = Self::default();
        Ok(Self {
            mode: match opts.get("mode") {
                Some(v) => v.parse()?,
                None => defaults.mode,
            },
            levels: parse_value(&opts, "levels", defaults.levels)?,
            level: parse_value(&opts, "level", defaults.level)?,
            store_dir: opts.get("store-dir").map(PathBuf::from).unwrap_or(defaults.store_dir),
            rounds: parse_value(&opts, "rounds", defaults.rounds)?,
            progress: parse_value(&opts, "progress", defaults.progress)?,
            start: parse_value(&opts, "start", defaults.start)?,
            count: parse_value(&opts, "count", defaults.count)?,
            csv: opts.get("csv").map(PathBuf::from),
            json: opts.get("json").map(PathBuf::from),
            parallel: parse_value(&opts, "parallel", defaults.parallel)?,
            composed: parse_value(&opts, "composed", defaults.composed)?,
            persist: !parse_value(&opts, "no-persist", !defaults.persist)?,
        })
    }

    pub fn lift_options(&self) -> LiftOptions {
        LiftOptions {
            progress_interval: self.progress,
            parallel: self.parallel,
        }
    }
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for arg in args {
        if let Some(kv) = arg.strip_prefix("--") {
            match kv.split_once('=') {
                Some((k, v)) => map.insert(k.to_string(), v.to_string()),
                None => map.insert(kv.to_string(), "true".to_string()),
            };
        }
    }
    map
}

fn parse_value<T: FromStr>(opts: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError> {
    match opts.get(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v.clone(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let cfg = CliConfig::from_args(Vec::new()).unwrap();
        assert_eq!(cfg.mode, Mode::All);
        assert_eq!(cfg.levels, 8);
        assert_eq!(cfg.rounds, 20);
        assert!(cfg.persist);
        assert!(!cfg.lift_options().parallel);
    }

    #[test]
    fn test_parse_flags() {
        let cfg = CliConfig::from_args(args(&[
            "--mode=lift",
            "--level=7",
            "--store-dir=/tmp/res",
            "--parallel",
            "--no-persist",
            "--json=out/report.json",
        ]))
        .unwrap();
        assert_eq!(cfg.mode, Mode::Lift);
        assert_eq!(cfg.level, 7);
        assert_eq!(cfg.store_dir, PathBuf::from("/tmp/res"));
        assert!(cfg.parallel);
        assert!(!cfg.persist);
        assert_eq!(cfg.json, Some(PathBuf::from("out/report.json")));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            CliConfig::from_args(args(&["--mode=fast"])),
            Err(ConfigError::UnknownMode(_))
        ));
        assert!(matches!(
            CliConfig::from_args(args(&["--levels=many"])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            CliConfig::from_args(args(&["--seed=1"])),
            Err(ConfigError::UnknownFlag(_))
        ));
    }
}
