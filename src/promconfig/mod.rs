//! Prometheus configuration generation and relabel simulation

mod generator;
mod relabel;
mod template;

pub use generator::{
    default_jobs, pod_relabel_rules, ConfigGenerator, GlobalConfig, JobSpec, KubernetesSdConfig, PrometheusConfig,
    ScrapeConfig, StaticConfig,
};
pub use relabel::{hashmod, public_labels, relabel, LabelSet, RelabelAction, RelabelConfig};
pub use template::{SizeTemplate, TemplateSpec};

use crate::error::{AppError, ErrorContext, Result};
use serde::Serialize;
use std::path::Path;

/// What relabeling did to one discovered target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetOutcome {
    pub discovered: LabelSet,
    /// Labels of the scraped series, `None` when the target was dropped
    pub scraped: Option<LabelSet>,
}

/// Discovered targets from a YAML list of label maps
pub fn load_targets(path: &Path) -> Result<Vec<LabelSet>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read targets file {}", path.display()))?;
    let targets: Vec<LabelSet> = serde_yaml::from_str(&content)?;
    Ok(targets)
}

/// Run every target through the relabel rules of `job_name`
pub fn simulate_job(config: &PrometheusConfig, job_name: &str, targets: &[LabelSet]) -> Result<Vec<TargetOutcome>> {
    let job = config
        .job(job_name)
        .ok_or_else(|| AppError::validation(format!("No scrape job named '{}'", job_name)))?;

    targets
        .iter()
        .map(|target| {
            let scraped = relabel(target, &job.relabel_configs)?.map(|labels| {
                let mut public = public_labels(&labels);
                public.insert("job".to_string(), job_name.to_string());
                if let Some(address) = labels.get("__address__") {
                    public.entry("instance".to_string()).or_insert_with(|| address.clone());
                }
                public
            });
            Ok(TargetOutcome {
                discovered: target.clone(),
                scraped,
            })
        })
        .collect()
}
