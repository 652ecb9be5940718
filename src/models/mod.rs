//! Configuration and result data models shared by the testers

pub mod check;
pub mod config;
pub mod outcome;
pub mod query;

// Re-export main model types
pub use check::{CheckLevel, Comparison, ThresholdCheck, Verdict};
pub use config::{
    BenchmarkSettings, Config, GitHubSettings, LoadSettings, ScalabilitySettings, ScalingDimension,
    SecuritySettings, SoakSettings, SpikeSettings, StressSettings,
};
pub use outcome::{OutcomeRecorder, RequestOutcome};
pub use query::{default_queries, QueryClass, QueryKind, QuerySpec};
