//! Residue classes of Sophie Germain / safe-prime candidates modulo
//! successive primorials.
//!
//! A residue set at modulus M is lifted to M·p by the CRT, skipping the two
//! forbidden offsets per residue. The count then scales by exactly (p - 2);
//! the scaling, collision, profile and validator modules check that claim
//! from different directions.

pub mod collision;
pub mod config;
pub mod error;
pub mod forbidden;
pub mod generate;
pub mod lift;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod residue;
pub mod scaling;
pub mod store;
pub mod validator;

pub use error::{ConfigError, LiftError, PipelineError, ReportError, StoreError};
pub use forbidden::{forbidden_values, ForbiddenCalculator, LiftPolicy};
pub use lift::{CountOnly, LiftEngine, LiftOptions, LiftSink, LiftSummary};
pub use pipeline::Pipeline;
pub use residue::{Modulus, ResidueSet};
pub use scaling::{ScalingLawRecord, Verdict};
pub use store::{JsonStore, MemoryStore, ResidueStore};
