//! Endurance testing
//!
//! - [`SoakTester`] keeps a steady query load up for a long period and
//!   watches latency trends and Prometheus' own resource usage
//! - [`StabilityMonitor`] probes the health endpoints alongside it
//! - [`K6SoakRunner`] hands the same query set to k6 instead

pub mod k6_soak;
pub mod soak;
pub mod stability;

pub use k6_soak::K6SoakRunner;
pub use soak::{ResourceSample, SoakResult, SoakTester, WindowStats};
pub use stability::{OutageTracker, StabilityMonitor, StabilityResult};

use crate::error::Result;

/// Run the soak loop and the stability monitor side by side
pub async fn run_soak_with_monitor(
    tester: &SoakTester,
    monitor: &StabilityMonitor,
    min_availability: f64,
) -> Result<SoakResult> {
    let (soak, stability) = tokio::join!(tester.run(), monitor.run());
    Ok(soak?.with_stability(stability, min_availability))
}
