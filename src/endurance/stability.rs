//! Availability monitoring through the health and readiness endpoints

use crate::client::PrometheusApi;
use crate::logging::Logger;
use crate::models::ThresholdCheck;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Availability figures over the monitored period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityResult {
    pub probes: u64,
    pub healthy_probes: u64,
    /// Share of probes where both `/-/healthy` and `/-/ready` answered 200
    pub availability: f64,
    pub outage_count: u32,
    #[serde(with = "humantime_serde")]
    pub longest_outage: Duration,
    pub max_consecutive_failures: u32,
    pub mean_probe_latency_ms: f64,
}

impl StabilityResult {
    pub fn availability_check(&self, min_availability: f64) -> ThresholdCheck {
        ThresholdCheck::at_least("availability", self.availability, min_availability)
    }
}

/// Folds a sequence of probe results into outage statistics
///
/// An outage starts at the first failed probe and ends at the next
/// healthy one, or at the end of monitoring.
#[derive(Debug, Default)]
pub struct OutageTracker {
    probes: u64,
    healthy: u64,
    consecutive_failures: u32,
    max_consecutive_failures: u32,
    outage_count: u32,
    outage_started: Option<Duration>,
    longest_outage: Duration,
    latency_total_ms: f64,
}

impl OutageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a probe taken `at` after monitoring started
    pub fn observe(&mut self, at: Duration, healthy: bool, latency_ms: f64) {
        self.probes += 1;
        self.latency_total_ms += latency_ms;

        if healthy {
            self.healthy += 1;
            self.consecutive_failures = 0;
            if let Some(started) = self.outage_started.take() {
                self.longest_outage = self.longest_outage.max(at.saturating_sub(started));
            }
        } else {
            self.consecutive_failures += 1;
            self.max_consecutive_failures = self.max_consecutive_failures.max(self.consecutive_failures);
            if self.outage_started.is_none() {
                self.outage_started = Some(at);
                self.outage_count += 1;
            }
        }
    }

    /// Close a running outage at `at` and produce the result
    pub fn finish(mut self, at: Duration) -> StabilityResult {
        if let Some(started) = self.outage_started.take() {
            self.longest_outage = self.longest_outage.max(at.saturating_sub(started));
        }

        let (availability, mean_probe_latency_ms) = if self.probes == 0 {
            (0.0, 0.0)
        } else {
            (
                self.healthy as f64 / self.probes as f64,
                self.latency_total_ms / self.probes as f64,
            )
        };

        StabilityResult {
            probes: self.probes,
            healthy_probes: self.healthy,
            availability,
            outage_count: self.outage_count,
            longest_outage: self.longest_outage,
            max_consecutive_failures: self.max_consecutive_failures,
            mean_probe_latency_ms,
        }
    }
}

/// Polls `/-/healthy` and `/-/ready` at a fixed interval
pub struct StabilityMonitor {
    api: Arc<dyn PrometheusApi>,
    interval: Duration,
    duration: Duration,
    logger: Logger,
}

impl StabilityMonitor {
    pub fn new(api: Arc<dyn PrometheusApi>, interval: Duration, duration: Duration, logger: Logger) -> Self {
        Self {
            api,
            interval,
            duration,
            logger,
        }
    }

    pub async fn run(&self) -> StabilityResult {
        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tracker = OutageTracker::new();

        loop {
            ticker.tick().await;
            let at = start.elapsed();
            if at >= self.duration {
                break;
            }

            let (health, ready) = tokio::join!(self.api.health(), self.api.readiness());
            let healthy = health.success && ready.success;
            let latency_ms = health.latency_ms().max(ready.latency_ms());

            if !healthy {
                let reason = health
                    .error
                    .as_ref()
                    .or(ready.error.as_ref())
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                self.logger
                    .warn("Health probe failed")
                    .field("elapsed_s", at.as_secs_f64())
                    .field("reason", reason)
                    .log()
                    .await;
            }

            tracker.observe(at, healthy, latency_ms);
        }

        tracker.finish(start.elapsed().min(self.duration))
    }
}
