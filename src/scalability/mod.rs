//! Scalability testing
//!
//! [`ScalingDimensionTester`] measures latency at increasing levels of one
//! dimension (concurrency, time range or cardinality) and
//! [`ScalingCurveGenerator`] turns the points into a scaling curve.

pub mod curve;
pub mod dimension;

pub use curve::{ScalingBehavior, ScalingCurve, ScalingCurveGenerator, StepEfficiency};
pub use dimension::{level_query, range_step, ScalingDimensionTester, ScalingPoint};

use crate::error::Result;

/// Measure every level and build the curve
pub async fn run_scalability(tester: &ScalingDimensionTester) -> Result<ScalingCurve> {
    let (points, errors) = tester.run().await?;
    let settings = tester.settings();
    Ok(ScalingCurveGenerator::from_settings(settings).generate(settings.dimension, points, errors))
}
