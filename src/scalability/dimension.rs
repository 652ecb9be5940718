//! Latency measurements along one scaling dimension

use crate::client::{ensure_healthy, run_batch, PrometheusApi};
use crate::error::{ErrorLog, Result};
use crate::logging::Logger;
use crate::models::{OutcomeRecorder, QueryClass, QuerySpec, ScalabilitySettings, ScalingDimension};
use crate::stats::{LatencySummary, LevelMeasurement};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Smallest step used for time-range queries
const MIN_RANGE_STEP: Duration = Duration::from_secs(15);
/// Upper bound on points per series for time-range queries
const RANGE_POINTS: u32 = 250;

/// Measurements at one level of the dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPoint {
    pub level: u32,
    pub requests: u64,
    pub latency: LatencySummary,
    /// Successful requests per second of wall time
    pub throughput: f64,
    pub error_rate: f64,
}

impl ScalingPoint {
    pub fn measurement(&self) -> LevelMeasurement {
        LevelMeasurement {
            level: self.level,
            error_rate: self.error_rate,
            p95_ms: self.latency.p95_ms,
        }
    }
}

/// Step of a range query spanning `range`
pub fn range_step(range: Duration) -> Duration {
    (range / RANGE_POINTS).max(MIN_RANGE_STEP)
}

/// Query issued at `level` and how many copies run concurrently
pub fn level_query(settings: &ScalabilitySettings, level: u32) -> (QuerySpec, u32) {
    match settings.dimension {
        ScalingDimension::Concurrency => (
            QuerySpec::instant(format!("concurrency_{}", level), settings.query.clone(), QueryClass::Moderate),
            level,
        ),
        ScalingDimension::TimeRange => {
            let range = Duration::from_secs(u64::from(level) * 3600);
            (
                QuerySpec::range(
                    format!("range_{}h", level),
                    settings.query.clone(),
                    range,
                    range_step(range),
                    QueryClass::Complex,
                ),
                1,
            )
        }
        ScalingDimension::Cardinality => (
            QuerySpec::instant(
                format!("topk_{}", level),
                format!("topk({}, {})", level, settings.cardinality_selector),
                QueryClass::Complex,
            ),
            1,
        ),
    }
}

/// Runs `samples` rounds at each configured level
pub struct ScalingDimensionTester {
    api: Arc<dyn PrometheusApi>,
    settings: ScalabilitySettings,
    logger: Logger,
}

impl ScalingDimensionTester {
    pub fn new(api: Arc<dyn PrometheusApi>, settings: ScalabilitySettings, logger: Logger) -> Self {
        Self { api, settings, logger }
    }

    pub fn settings(&self) -> &ScalabilitySettings {
        &self.settings
    }

    pub async fn run(&self) -> Result<(Vec<ScalingPoint>, ErrorLog)> {
        ensure_healthy(self.api.as_ref()).await?;

        let mut points = Vec::with_capacity(self.settings.levels.len());
        let mut errors = ErrorLog::default();

        for &level in &self.settings.levels {
            let point = self.measure_level(level, &mut errors).await;
            self.logger
                .info("Measured scaling level")
                .field("dimension", self.settings.dimension.as_str())
                .field("level", level)
                .field("p95_ms", point.latency.p95_ms)
                .field("error_rate", point.error_rate)
                .log()
                .await;
            points.push(point);
        }

        Ok((points, errors))
    }

    async fn measure_level(&self, level: u32, errors: &mut ErrorLog) -> ScalingPoint {
        let (query, concurrency) = level_query(&self.settings, level);
        let mut recorder = OutcomeRecorder::new();
        let mut wall_time = Duration::ZERO;

        for _ in 0..self.settings.samples {
            let batch = run_batch(self.api.as_ref(), std::slice::from_ref(&query), concurrency).await;
            wall_time += batch.wall_time;
            recorder.merge(batch.outcomes);
        }

        let throughput = if wall_time.as_secs_f64() > 0.0 {
            recorder.successes() as f64 / wall_time.as_secs_f64()
        } else {
            0.0
        };

        let point = ScalingPoint {
            level,
            requests: recorder.total(),
            latency: recorder.summary(),
            throughput,
            error_rate: recorder.error_rate(),
        };
        errors.extend(recorder.into_errors());
        point
    }
}
