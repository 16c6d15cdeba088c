//! Error types for lifting, storage and the level pipeline.

use std::path::PathBuf;

/// Errors raised by the lift arithmetic. Degenerate forbidden values are
/// not errors; they are handled by `LiftPolicy`.
#[derive(Debug, thiserror::Error)]
pub enum LiftError {
    #[error("modulus must be positive")]
    ZeroModulus,

    #[error("extending modulus {modulus} by {prime} overflows u64")]
    ModulusOverflow { modulus: u64, prime: u64 },

    #[error("{0} is not prime")]
    NotPrime(u64),

    #[error("residue {residue} is not a unit modulo {modulus}")]
    InvalidResidue { residue: u64, modulus: u64 },

    #[error("{ancestor} does not divide {modulus}")]
    NotAnAncestor { modulus: u64, ancestor: u64 },
}

/// Errors raised by a persistent residue store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no residue set stored for modulus {0}")]
    NotFound(u64),

    #[error("stored file {path} is for modulus {found}, expected {expected}")]
    ModulusMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("stored file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("invalid stored residues: {0}")]
    Invalid(#[from] LiftError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("residue set mod {modulus} has {found} elements, expected {expected}")]
    CardinalityMismatch {
        modulus: u64,
        expected: u64,
        found: u64,
    },

    #[error("no stored or static residue set available for modulus {modulus}")]
    NoSource { modulus: u64 },

    #[error("level {level} is outside the chain (1..={max})")]
    LevelOutOfRange { level: usize, max: usize },

    #[error(transparent)]
    Lift(#[from] LiftError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures writing reports and exports.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bad command-line flags.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown mode '{0}' (expected scaling|lift|anomaly|validate|all)")]
    UnknownMode(String),

    #[error("invalid value '{value}' for --{key}")]
    InvalidValue { key: String, value: String },

    #[error("unknown flag --{0}")]
    UnknownFlag(String),
}
