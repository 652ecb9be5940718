//! Stress and spike testing

pub mod concurrent;
pub mod spike;

pub use concurrent::{ramp_levels, ConcurrentQueryStressTester, StressLevel, StressResult};
pub use spike::{PhaseStats, SpikeResult, SpikeTester};
