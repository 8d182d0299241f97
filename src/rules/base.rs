use crate::config::{Config, RuleSettings};
use crate::model::Resource;

use super::{Finding, FindingContext, RuleMetadata, RuleMode, RuleRisk};

/// Shared state for built-in rules: static metadata plus the mode, risk
/// and tuning this run's configuration resolved for the rule.
#[derive(Debug, Clone)]
pub struct RuleBase {
    metadata: RuleMetadata,
    mode: RuleMode,
    risk: RuleRisk,
    settings: RuleSettings,
}

impl RuleBase {
    pub fn new(metadata: RuleMetadata, config: &Config) -> Self {
        let settings = config.settings(metadata.id).cloned().unwrap_or_default();
        Self {
            mode: settings.mode.unwrap_or(metadata.default_mode),
            risk: settings.risk.unwrap_or(metadata.risk),
            metadata,
            settings,
        }
    }

    pub fn metadata(&self) -> &RuleMetadata {
        &self.metadata
    }

    pub fn id(&self) -> &'static str {
        self.metadata.id
    }

    pub fn mode(&self) -> RuleMode {
        self.mode
    }

    pub fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    /// A stack-level finding.
    pub fn finding(&self, reason: impl Into<String>) -> Finding {
        Finding::new(
            self.metadata.id,
            reason,
            self.mode,
            self.risk,
            self.metadata.granularity,
        )
    }

    /// A finding pointing at `resource`, optionally at a property path.
    pub fn resource_finding(
        &self,
        resource: &Resource,
        path: Option<String>,
        reason: impl Into<String>,
    ) -> Finding {
        self.action_finding(resource, path, Vec::new(), reason)
    }

    /// A finding pointing at specific policy actions of `resource`.
    pub fn action_finding(
        &self,
        resource: &Resource,
        path: Option<String>,
        actions: Vec<String>,
        reason: impl Into<String>,
    ) -> Finding {
        self.finding(reason).with_context(FindingContext {
            logical_id: resource.logical_id.clone(),
            resource_type: resource.resource_type.clone(),
            path,
            actions,
        })
    }
}
