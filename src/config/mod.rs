use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};
use crate::rules::{Finding, RuleMode, RuleRegistry, RuleRisk};

/// Top-level configuration from `.stackguard.toml`.
///
/// Built once per run and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Active rule ids, in execution order. `None` means every registered rule.
    #[serde(default)]
    pub rules: Option<Vec<String>>,
    #[serde(default)]
    pub stack_name: Option<String>,
    /// Account the template is deployed into.
    #[serde(default)]
    pub aws_account_id: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
    /// Account ids / ARNs trusted by every rule.
    #[serde(default)]
    pub aws_principals: Vec<String>,
    /// Per-rule tuning.
    #[serde(default)]
    pub rule_settings: BTreeMap<String, RuleSettings>,
}

/// Tuning for a single rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSettings {
    /// Override the rule's default mode.
    #[serde(default)]
    pub mode: Option<RuleMode>,
    #[serde(default)]
    pub risk: Option<RuleRisk>,
    /// Extra trusted principals for this rule only.
    #[serde(default)]
    pub allowed_principals: Vec<String>,
    /// Logical ids whose findings from this rule are dropped.
    #[serde(default)]
    pub exempt_resources: Vec<String>,
    #[serde(default)]
    pub allowed_ports: Option<Vec<u32>>,
}

impl RuleSettings {
    pub fn exempts(&self, finding: &Finding) -> bool {
        finding
            .logical_id()
            .is_some_and(|id| self.exempt_resources.iter().any(|e| e == id))
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GuardError::Config(e.to_string()))
    }

    /// Config that runs exactly `rules`, in that order.
    pub fn with_rules<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: Some(rules.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Rule ids to run: the configured list, or every registered rule in
    /// registry order.
    pub fn active_rules(&self, registry: &RuleRegistry) -> Vec<String> {
        match &self.rules {
            Some(rules) => rules.clone(),
            None => registry.ids().map(str::to_string).collect(),
        }
    }

    pub fn settings(&self, rule_id: &str) -> Option<&RuleSettings> {
        self.rule_settings.get(rule_id)
    }

    /// Whether an account id or principal ARN is trusted, globally or by
    /// the given rule.
    pub fn is_trusted_principal(&self, rule_id: &str, principal: &str) -> bool {
        let rule_allowed = self
            .settings(rule_id)
            .map(|s| s.allowed_principals.as_slice())
            .unwrap_or(&[]);
        self.aws_account_id.as_deref() == Some(principal)
            || self.aws_principals.iter().any(|p| p == principal)
            || rule_allowed.iter().any(|p| p == principal)
    }

    /// Check tuning data against the registry. Runs before any rule is built.
    pub fn validate(&self, registry: &RuleRegistry) -> Result<()> {
        for (rule_id, settings) in &self.rule_settings {
            if registry.get(rule_id).is_none() {
                return Err(GuardError::Config(format!(
                    "settings given for unknown rule '{rule_id}'"
                )));
            }
            if let Some(ports) = &settings.allowed_ports {
                if let Some(bad) = ports.iter().find(|p| !(1..=65535).contains(*p)) {
                    return Err(GuardError::Config(format!(
                        "rule '{rule_id}': allowed port {bad} is out of range"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# stackguard configuration

# Rules to run, in order. Omit to run every built-in rule.
# rules = ["S3BucketPublicReadAclRule", "EC2SecurityGroupOpenToWorldRule"]

# Account the templates deploy into; used when judging cross-account trust.
# aws_account_id = "123456789012"

# Account ids or ARNs trusted by every rule.
# aws_principals = ["111122223333"]

# Per-rule tuning.
# [rule_settings.EC2SecurityGroupOpenToWorldRule]
# allowed_ports = [80, 443]
# exempt_resources = ["PublicLoadBalancerSecurityGroup"]
#
# [rule_settings.EBSVolumeHasSSERule]
# mode = "blocking"
"#
    }
}
