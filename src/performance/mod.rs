//! Query performance benchmarking with optional baseline comparison

pub mod baseline;
pub mod benchmark;

pub use baseline::{load_baseline, parse_baseline, regression_pct};
pub use benchmark::{BenchmarkResult, QueryBenchmark, QueryBenchmarkResult};
