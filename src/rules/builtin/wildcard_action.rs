use crate::config::Config;
use crate::error::Result;
use crate::model::iam;
use crate::model::Template;
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

/// Flags identity policies that allow `*` or `service:*` actions.
pub struct WildcardActionRule {
    base: RuleBase,
}

impl WildcardActionRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "IAMRoleWildcardActionOnPolicyRule",
        name: "IAM wildcard action",
        description: "IAM policy allows a wildcard action",
        default_mode: RuleMode::Monitor,
        risk: RuleRisk::Medium,
        granularity: RuleGranularity::Action,
    };

    pub fn build(config: &Config) -> Result<Box<dyn Rule>> {
        Ok(Box::new(Self {
            base: RuleBase::new(Self::METADATA, config),
        }))
    }
}

impl Rule for WildcardActionRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for site in iam::identity_policies(template) {
            for (i, statement) in site.document.allow_statements().enumerate() {
                let wildcards = statement.wildcard_actions();
                if wildcards.is_empty() {
                    continue;
                }
                result.record(self.base.action_finding(
                    site.resource,
                    Some(format!("Properties.{}", site.path)),
                    wildcards.iter().map(|a| a.to_string()).collect(),
                    format!(
                        "{} should not allow wildcard actions ({}) in allow statement {i}",
                        site.resource.logical_id,
                        wildcards.join(", ")
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
    fn flags_inline_role_policy_as_monitor() {
        let result = run_rule(
            WildcardActionRule::build,
            json!({
                "Resources": {
                    "Role": {
                        "Type": "AWS::IAM::Role",
                        "Properties": {
                            "Policies": [{
                                "PolicyName": "all",
                                "PolicyDocument": {
                                    "Statement": [{"Effect": "Allow", "Action": ["s3:*", "sqs:SendMessage"], "Resource": "*"}]
                                }
                            }]
                        }
                    }
                }
            }),
            &Config::default(),
        );
        assert!(result.is_valid());
        assert_eq!(result.monitored_findings().len(), 1);
        let finding = &result.monitored_findings()[0];
        assert_eq!(finding.context().unwrap().actions, vec!["s3:*"]);
        assert_eq!(
            finding.context().unwrap().path.as_deref(),
            Some("Properties.Policies.0.PolicyDocument")
        );
    }

    #[test]
    fn flags_managed_policy_star() {
        let result = run_rule(
            WildcardActionRule::build,
            json!({
                "Resources": {
                    "Admin": {
                        "Type": "AWS::IAM::ManagedPolicy",
                        "Properties": {
                            "PolicyDocument": {"Statement": {"Effect": "Allow", "Action": "*", "Resource": "*"}}
                        }
                    }
                }
            }),
            &Config::default(),
        );
        assert_eq!(result.monitored_findings().len(), 1);
    }

    #[test]
    fn specific_actions_pass() {
        let result = run_rule(
            WildcardActionRule::build,
            json!({
                "Resources": {
                    "Policy": {
                        "Type": "AWS::IAM::Policy",
                        "Properties": {
                            "PolicyDocument": {"Statement": [
                                {"Effect": "Allow", "Action": "s3:GetObject", "Resource": "*"},
                                {"Effect": "Deny", "Action": "*", "Resource": "*"}
                            ]}
                        }
                    }
                }
            }),
            &Config::default(),
        );
        assert!(result.is_empty());
    }
}
