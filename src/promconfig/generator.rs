//! `prometheus.yml` generation from a size template

use super::relabel::{RelabelAction, RelabelConfig};
use super::template::{SizeTemplate, TemplateSpec};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn is_false(value: &bool) -> bool {
    !*value
}

fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub scrape_interval: String,
    pub scrape_timeout: String,
    pub evaluation_interval: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub external_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSelector {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesSdConfig {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<NamespaceSelector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_path: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub honor_labels: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_configs: Vec<StaticConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kubernetes_sd_configs: Vec<KubernetesSdConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relabel_configs: Vec<RelabelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_limit: Option<u64>,
}

impl ScrapeConfig {
    fn named(job_name: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            scrape_interval: None,
            metrics_path: None,
            honor_labels: false,
            static_configs: Vec::new(),
            kubernetes_sd_configs: Vec::new(),
            relabel_configs: Vec::new(),
            sample_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrometheusConfig {
    pub global: GlobalConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_files: Vec<String>,
    pub scrape_configs: Vec<ScrapeConfig>,
}

impl PrometheusConfig {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn job(&self, name: &str) -> Option<&ScrapeConfig> {
        self.scrape_configs.iter().find(|job| job.job_name == name)
    }
}

/// A scrape job to include in the generated configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSpec {
    Static {
        name: String,
        targets: Vec<String>,
        #[serde(default)]
        labels: BTreeMap<String, String>,
    },
    /// Pods opted in with `prometheus.io/scrape: "true"`
    KubernetesPods {
        name: String,
        #[serde(default)]
        namespaces: Vec<String>,
    },
}

impl JobSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Static { name, .. } | Self::KubernetesPods { name, .. } => name,
        }
    }
}

/// Jobs used when none are given: a node exporter and annotated pods
pub fn default_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec::Static {
            name: "node".to_string(),
            targets: vec!["localhost:9100".to_string()],
            labels: BTreeMap::new(),
        },
        JobSpec::KubernetesPods {
            name: "kubernetes-pods".to_string(),
            namespaces: Vec::new(),
        },
    ]
}

/// Standard relabel rules for annotated pod discovery
pub fn pod_relabel_rules() -> Vec<RelabelConfig> {
    vec![
        RelabelConfig::new(RelabelAction::Keep)
            .source_labels(&["__meta_kubernetes_pod_annotation_prometheus_io_scrape"])
            .regex("true"),
        RelabelConfig::new(RelabelAction::Replace)
            .source_labels(&["__meta_kubernetes_pod_annotation_prometheus_io_path"])
            .regex("(.+)")
            .target("__metrics_path__"),
        RelabelConfig::new(RelabelAction::Replace)
            .source_labels(&["__address__", "__meta_kubernetes_pod_annotation_prometheus_io_port"])
            .regex(r"([^:]+)(?::\d+)?;(\d+)")
            .replacement("$1:$2")
            .target("__address__"),
        RelabelConfig::new(RelabelAction::LabelMap).regex("__meta_kubernetes_pod_label_(.+)"),
        RelabelConfig::new(RelabelAction::Replace)
            .source_labels(&["__meta_kubernetes_namespace"])
            .target("namespace"),
        RelabelConfig::new(RelabelAction::Replace)
            .source_labels(&["__meta_kubernetes_pod_name"])
            .target("pod"),
    ]
}

pub struct ConfigGenerator {
    template: SizeTemplate,
    spec: TemplateSpec,
    /// `(shards, index)` for hashmod sharding of discovered targets
    sharding: Option<(u64, u64)>,
    external_labels: BTreeMap<String, String>,
}

impl ConfigGenerator {
    pub fn new(template: SizeTemplate) -> Self {
        Self {
            template,
            spec: template.spec(),
            sharding: None,
            external_labels: BTreeMap::new(),
        }
    }

    pub fn spec(&self) -> &TemplateSpec {
        &self.spec
    }

    /// Scrape only the discovered targets whose address hashes to `index`
    pub fn with_sharding(mut self, shards: u64, index: u64) -> Result<Self> {
        if shards == 0 || index >= shards {
            return Err(AppError::validation(format!(
                "Shard index {} is out of range for {} shards",
                index, shards
            )));
        }
        self.sharding = Some((shards, index));
        self
            .external_labels
            .insert("shard".to_string(), index.to_string());
        Ok(self)
    }

    pub fn with_external_label(mut self, name: &str, value: &str) -> Self {
        self.external_labels.insert(name.to_string(), value.to_string());
        self
    }

    /// Per-target sample limit: expected series spread over the targets with headroom
    fn sample_limit(&self) -> u64 {
        let per_target = self.spec.expected_series / u64::from(self.spec.targets.max(1));
        per_target * 2
    }

    fn scrape_job(&self, job: &JobSpec) -> ScrapeConfig {
        let mut config = ScrapeConfig::named(job.name());
        config.sample_limit = Some(self.sample_limit());

        match job {
            JobSpec::Static { targets, labels, .. } => {
                config.static_configs.push(StaticConfig {
                    targets: targets.clone(),
                    labels: labels.clone(),
                });
            }
            JobSpec::KubernetesPods { namespaces, .. } => {
                config.kubernetes_sd_configs.push(KubernetesSdConfig {
                    role: "pod".to_string(),
                    namespaces: (!namespaces.is_empty()).then(|| NamespaceSelector {
                        names: namespaces.clone(),
                    }),
                });
                config.relabel_configs = pod_relabel_rules();
                if let Some((shards, index)) = self.sharding {
                    config.relabel_configs.push(
                        RelabelConfig::new(RelabelAction::HashMod)
                            .source_labels(&["__address__"])
                            .modulus(shards)
                            .target("__tmp_hash"),
                    );
                    config.relabel_configs.push(
                        RelabelConfig::new(RelabelAction::Keep)
                            .source_labels(&["__tmp_hash"])
                            .regex(&index.to_string()),
                    );
                }
            }
        }
        config
    }

    pub fn generate(&self, jobs: &[JobSpec]) -> Result<PrometheusConfig> {
        let mut names: Vec<&str> = jobs.iter().map(JobSpec::name).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(AppError::validation(format!("Duplicate job name: {}", pair[0])));
        }
        if names.contains(&"prometheus") {
            return Err(AppError::validation("Job name 'prometheus' is reserved for self-scraping"));
        }

        let interval = self.spec.scrape_interval;
        let timeout = (interval * 2 / 3).max(Duration::from_secs(5)).min(interval);

        let mut external_labels = self.external_labels.clone();
        external_labels.insert("size".to_string(), self.template.to_string());

        let mut self_job = ScrapeConfig::named("prometheus");
        self_job.static_configs.push(StaticConfig {
            targets: vec!["localhost:9090".to_string()],
            labels: BTreeMap::new(),
        });

        let mut scrape_configs = vec![self_job];
        scrape_configs.extend(jobs.iter().map(|job| self.scrape_job(job)));

        Ok(PrometheusConfig {
            global: GlobalConfig {
                scrape_interval: format_duration(interval),
                scrape_timeout: format_duration(timeout),
                evaluation_interval: format_duration(interval),
                external_labels,
            },
            rule_files: vec!["rules/*.yml".to_string()],
            scrape_configs,
        })
    }

    /// Generated YAML with the recommended flags as a header comment
    pub fn render(&self, jobs: &[JobSpec]) -> Result<String> {
        let config = self.generate(jobs)?;
        let mut out = format!(
            "# Prometheus configuration for a {} deployment ({} targets, ~{} series)\n# Recommended flags:\n",
            self.template, self.spec.targets, self.spec.expected_series
        );
        for flag in self.spec.recommended_flags() {
            out.push_str(&format!("#   {}\n", flag));
        }
        out.push_str(&config.to_yaml()?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::relabel::{relabel, LabelSet};
    use super::*;
    use proptest::prelude::*;

    fn pod(annotated: bool, port: Option<&str>) -> LabelSet {
        let mut labels = LabelSet::new();
        labels.insert("__address__".into(), "10.1.2.3:8080".into());
        labels.insert("__meta_kubernetes_namespace".into(), "shop".into());
        labels.insert("__meta_kubernetes_pod_name".into(), "cart-7d9f".into());
        labels.insert("__meta_kubernetes_pod_label_app".into(), "cart".into());
        if annotated {
            labels.insert("__meta_kubernetes_pod_annotation_prometheus_io_scrape".into(), "true".into());
        }
        if let Some(port) = port {
            labels.insert("__meta_kubernetes_pod_annotation_prometheus_io_port".into(), port.into());
        }
        labels
    }

    #[test]
    fn test_generated_yaml_round_trips() {
        let generator = ConfigGenerator::new(SizeTemplate::Medium).with_external_label("cluster", "eu-1");
        let config = generator.generate(&default_jobs()).unwrap();
        let yaml = config.to_yaml().unwrap();

        assert_eq!(PrometheusConfig::from_yaml(&yaml).unwrap(), config);
        assert!(yaml.contains("scrape_interval: 15s"));
        assert!(yaml.contains("action: labelmap"));
        assert_eq!(config.global.scrape_timeout, "10s");
        assert_eq!(config.global.external_labels["size"], "medium");
        assert_eq!(config.scrape_configs[0].job_name, "prometheus");
        assert_eq!(config.job("node").unwrap().sample_limit, Some(4_000));
    }

    #[test]
    fn test_render_header() {
        let rendered = ConfigGenerator::new(SizeTemplate::Small).render(&[]).unwrap();
        assert!(rendered.starts_with("# Prometheus configuration for a small deployment"));
        assert!(rendered.contains("#   --storage.tsdb.retention.time=15d\n"));
        // Comments are ignored by the YAML parser
        let parsed = PrometheusConfig::from_yaml(&rendered).unwrap();
        assert_eq!(parsed.scrape_configs.len(), 1);
    }

    #[test]
    fn test_duplicate_and_reserved_jobs() {
        let generator = ConfigGenerator::new(SizeTemplate::Small);
        let mut jobs = default_jobs();
        jobs.push(jobs[0].clone());
        assert!(generator.generate(&jobs).is_err());

        let reserved = vec![JobSpec::KubernetesPods {
            name: "prometheus".to_string(),
            namespaces: Vec::new(),
        }];
        assert!(generator.generate(&reserved).is_err());
    }

    #[test]
    fn test_pod_rules_keep_annotated_and_rewrite_address() {
        let rules = pod_relabel_rules();

        let kept = relabel(&pod(true, Some("9102")), &rules).unwrap().unwrap();
        assert_eq!(kept["__address__"], "10.1.2.3:9102");
        assert_eq!(kept["namespace"], "shop");
        assert_eq!(kept["pod"], "cart-7d9f");
        assert_eq!(kept["app"], "cart");

        // Without a port annotation the address is left alone
        let default_port = relabel(&pod(true, None), &rules).unwrap().unwrap();
        assert_eq!(default_port["__address__"], "10.1.2.3:8080");

        assert!(relabel(&pod(false, Some("9102")), &rules).unwrap().is_none());
    }

    #[test]
    fn test_sharding_rules() {
        assert!(ConfigGenerator::new(SizeTemplate::Large).with_sharding(2, 2).is_err());

        let generator = ConfigGenerator::new(SizeTemplate::Large).with_sharding(2, 1).unwrap();
        let config = generator.generate(&default_jobs()).unwrap();
        let rules = &config.job("kubernetes-pods").unwrap().relabel_configs;
        assert_eq!(rules[rules.len() - 2].action, RelabelAction::HashMod);
        assert_eq!(config.global.external_labels["shard"], "1");

        // Every annotated pod lands on exactly one shard
        let pod = pod(true, Some("9102"));
        let kept_by: Vec<bool> = (0..2)
            .map(|index| {
                let generator = ConfigGenerator::new(SizeTemplate::Large).with_sharding(2, index).unwrap();
                let config = generator.generate(&default_jobs()).unwrap();
                let rules = &config.job("kubernetes-pods").unwrap().relabel_configs;
                relabel(&pod, rules).unwrap().is_some()
            })
            .collect();
        assert_eq!(kept_by.iter().filter(|kept| **kept).count(), 1);
    }

    proptest! {
        #[test]
        fn static_jobs_survive_yaml(targets in prop::collection::vec("[a-z]{1,10}:[0-9]{2,5}", 1..5)) {
            let jobs = vec![JobSpec::Static {
                name: "app".to_string(),
                targets,
                labels: BTreeMap::new(),
            }];
            let config = ConfigGenerator::new(SizeTemplate::Small).generate(&jobs).unwrap();
            let parsed = PrometheusConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
            prop_assert_eq!(parsed, config);
        }
    }
}
