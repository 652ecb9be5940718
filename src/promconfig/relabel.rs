//! Simulation of Prometheus target relabeling
//!
//! Applies `relabel_configs` to discovered label sets the way Prometheus does
//! before a scrape: regexes are fully anchored, source label values are
//! joined with the separator, and `$1` / `${name}` references in the
//! replacement are expanded from the match.

use crate::error::{AppError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type LabelSet = BTreeMap<String, String>;

pub const DEFAULT_SEPARATOR: &str = ";";
pub const DEFAULT_REGEX: &str = "(.*)";
pub const DEFAULT_REPLACEMENT: &str = "$1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelabelAction {
    #[default]
    Replace,
    Keep,
    Drop,
    HashMod,
    LabelMap,
    LabelDrop,
    LabelKeep,
}

/// One entry of `relabel_configs`; unset fields take the Prometheus defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelabelConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulus: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default)]
    pub action: RelabelAction,
}

impl RelabelConfig {
    pub fn new(action: RelabelAction) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }

    pub fn source_labels(mut self, labels: &[&str]) -> Self {
        self.source_labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn target(mut self, label: &str) -> Self {
        self.target_label = Some(label.to_string());
        self
    }

    pub fn regex(mut self, regex: &str) -> Self {
        self.regex = Some(regex.to_string());
        self
    }

    pub fn replacement(mut self, replacement: &str) -> Self {
        self.replacement = Some(replacement.to_string());
        self
    }

    pub fn modulus(mut self, modulus: u64) -> Self {
        self.modulus = Some(modulus);
        self
    }

    fn compiled_regex(&self) -> Result<Regex> {
        let pattern = self.regex.as_deref().unwrap_or(DEFAULT_REGEX);
        Ok(Regex::new(&format!("^(?:{})$", pattern))?)
    }

    fn target_label(&self) -> Result<&str> {
        self.target_label
            .as_deref()
            .ok_or_else(|| AppError::config(format!("relabel action {:?} requires target_label", self.action)))
    }

    /// Check the fields the action needs and that the regex compiles
    pub fn validate(&self) -> Result<()> {
        self.compiled_regex()?;
        match self.action {
            RelabelAction::Replace => {
                self.target_label()?;
            }
            RelabelAction::HashMod => {
                self.target_label()?;
                if self.modulus.unwrap_or(0) == 0 {
                    return Err(AppError::config("hashmod relabeling requires a non-zero modulus"));
                }
            }
            RelabelAction::Keep | RelabelAction::Drop if self.source_labels.is_empty() => {
                return Err(AppError::config(format!("{:?} relabeling requires source_labels", self.action)));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Prometheus' hashmod digest: last 8 bytes of the MD5 sum, big-endian
pub fn hashmod(value: &str, modulus: u64) -> u64 {
    let digest = md5::compute(value.as_bytes());
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest.0[8..16]);
    u64::from_be_bytes(tail) % modulus
}

/// Apply `configs` in order; `None` means the target was dropped
pub fn relabel(labels: &LabelSet, configs: &[RelabelConfig]) -> Result<Option<LabelSet>> {
    let mut labels = labels.clone();

    for config in configs {
        config.validate()?;
        let regex = config.compiled_regex()?;
        let separator = config.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR);
        let replacement = config.replacement.as_deref().unwrap_or(DEFAULT_REPLACEMENT);
        let value = config
            .source_labels
            .iter()
            .map(|name| labels.get(name).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(separator);

        match config.action {
            RelabelAction::Keep => {
                if !regex.is_match(&value) {
                    return Ok(None);
                }
            }
            RelabelAction::Drop => {
                if regex.is_match(&value) {
                    return Ok(None);
                }
            }
            RelabelAction::Replace => {
                let Some(captures) = regex.captures(&value) else {
                    continue;
                };
                let mut target = String::new();
                captures.expand(config.target_label()?, &mut target);
                let mut result = String::new();
                captures.expand(replacement, &mut result);

                if target.is_empty() {
                    continue;
                }
                if result.is_empty() {
                    labels.remove(&target);
                } else {
                    labels.insert(target, result);
                }
            }
            RelabelAction::HashMod => {
                let modulus = config.modulus.unwrap_or(1);
                labels.insert(config.target_label()?.to_string(), hashmod(&value, modulus).to_string());
            }
            RelabelAction::LabelMap => {
                let mapped: Vec<(String, String)> = labels
                    .iter()
                    .filter_map(|(name, value)| {
                        let captures = regex.captures(name)?;
                        let mut target = String::new();
                        captures.expand(replacement, &mut target);
                        Some((target, value.clone()))
                    })
                    .collect();
                labels.extend(mapped);
            }
            RelabelAction::LabelDrop => labels.retain(|name, _| !regex.is_match(name)),
            RelabelAction::LabelKeep => labels.retain(|name, _| regex.is_match(name)),
        }
    }

    Ok(Some(labels))
}

/// Labels Prometheus attaches to the scraped series: everything not starting with `__`
pub fn public_labels(labels: &LabelSet) -> LabelSet {
    labels
        .iter()
        .filter(|(name, _)| !name.starts_with("__"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
