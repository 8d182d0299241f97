use crate::config::Config;
use crate::error::Result;
use crate::model::Template;
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

/// Managed policies should be attached to roles or groups, not users.
pub struct ManagedPolicyOnUserRule {
    base: RuleBase,
}

impl ManagedPolicyOnUserRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "ManagedPolicyOnUserRule",
        name: "Managed policy on user",
        description: "IAM managed policy is attached directly to users",
        default_mode: RuleMode::Monitor,
        risk: RuleRisk::Low,
        granularity: RuleGranularity::Resource,
    };

    pub fn build(config: &Config) -> Result<Box<dyn Rule>> {
        Ok(Box::new(Self {
            base: RuleBase::new(Self::METADATA, config),
        }))
    }
}

impl Rule for ManagedPolicyOnUserRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for policy in template.resources_of_type("AWS::IAM::ManagedPolicy") {
            if !policy.property_items("Users").is_empty() {
                result.record(self.base.resource_finding(
                    policy,
                    Some("Properties.Users".into()),
                    format!(
                        "IAM managed policy {} should not apply directly to users",
                        policy.logical_id
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin::test_support::run_rule;
    use serde_json::json;

    #[test]
    fn flags_policy_with_users() {
        let result = run_rule(
            ManagedPolicyOnUserRule::build,
            json!({
                "Resources": {
                    "Direct": {
                        "Type": "AWS::IAM::ManagedPolicy",
                        "Properties": {"Users": [{"Ref": "Alice"}], "PolicyDocument": {}}
                    },
                    "ViaGroup": {
                        "Type": "AWS::IAM::ManagedPolicy",
                        "Properties": {"Groups": ["devs"], "PolicyDocument": {}}
                    }
                }
            }),
            &Config::default(),
        );
        assert_eq!(result.monitored_findings().len(), 1);
        assert_eq!(result.monitored_findings()[0].logical_id(), Some("Direct"));
    }
}
