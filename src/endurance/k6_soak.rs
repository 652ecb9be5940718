//! Soak test driven by the external k6 binary

use crate::client::Credentials;
use crate::error::Result;
use crate::k6::{K6Report, K6Runner, K6Scenario};
use crate::logging::Logger;
use crate::models::{QuerySpec, SoakSettings};
use std::path::PathBuf;

/// Runs the query set from a constant number of k6 virtual users
pub struct K6SoakRunner {
    runner: K6Runner,
    settings: SoakSettings,
    queries: Vec<QuerySpec>,
    base_url: String,
    credentials: Credentials,
    work_dir: PathBuf,
    logger: Logger,
}

impl K6SoakRunner {
    pub fn new(
        runner: K6Runner,
        settings: SoakSettings,
        queries: Vec<QuerySpec>,
        base_url: String,
        credentials: Credentials,
        work_dir: PathBuf,
        logger: Logger,
    ) -> Self {
        Self {
            runner,
            settings,
            queries,
            base_url,
            credentials,
            work_dir,
            logger,
        }
    }

    pub fn scenario(&self) -> K6Scenario {
        K6Scenario::ConstantVus {
            vus: self.settings.vus,
            duration: self.settings.duration,
        }
    }

    pub async fn run(&self) -> Result<K6Report> {
        let scenario = self.scenario();
        let run = self
            .runner
            .run(
                &scenario,
                &self.base_url,
                &self.queries,
                &self.credentials,
                &self.work_dir,
                &self.logger,
            )
            .await?;

        let checks = run.summary.checks(
            self.settings.max_p95_ms,
            self.settings.max_p99_ms,
            self.settings.min_success_rate,
        );
        Ok(K6Report::new("soak-k6", scenario, run, checks))
    }
}
