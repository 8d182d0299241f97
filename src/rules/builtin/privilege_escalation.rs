use std::collections::BTreeSet;

use crate::config::Config;
use crate::error::Result;
use crate::model::iam;
use crate::model::Template;
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

/// Actions that let a principal grant itself more permissions.
const ESCALATION_ACTIONS: &[&str] = &[
    "iam:AddUserToGroup",
    "iam:AttachGroupPolicy",
    "iam:AttachRolePolicy",
    "iam:AttachUserPolicy",
    "iam:CreateAccessKey",
    "iam:CreateLoginProfile",
    "iam:CreatePolicyVersion",
    "iam:PassRole",
    "iam:PutGroupPolicy",
    "iam:PutRolePolicy",
    "iam:PutUserPolicy",
    "iam:SetDefaultPolicyVersion",
    "iam:UpdateAssumeRolePolicy",
    "iam:UpdateLoginProfile",
    "glue:UpdateDevEndpoint",
    "lambda:UpdateFunctionCode",
    "sts:AssumeRole",
];

/// Flags identity policies granting privilege-escalation actions.
pub struct PrivilegeEscalationRule {
    base: RuleBase,
}

impl PrivilegeEscalationRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "PrivilegeEscalationRule",
        name: "Privilege escalation",
        description: "IAM policy grants actions that allow privilege escalation",
        default_mode: RuleMode::Blocking,
        risk: RuleRisk::High,
        granularity: RuleGranularity::Action,
    };

    pub fn build(config: &Config) -> Result<Box<dyn Rule>> {
        Ok(Box::new(Self {
            base: RuleBase::new(Self::METADATA, config),
        }))
    }
}

impl Rule for PrivilegeEscalationRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for site in iam::identity_policies(template) {
            let granted: BTreeSet<&str> = site
                .document
                .allow_statements()
                .flat_map(|statement| {
                    ESCALATION_ACTIONS
                        .iter()
                        .copied()
                        .filter(move |action| statement.grants_action(action))
                })
                .collect();
            if granted.is_empty() {
                continue;
            }

            let actions: Vec<String> = granted.iter().map(|a| a.to_string()).collect();
            result.record(self.base.action_finding(
                site.resource,
                Some(format!("Properties.{}", site.path)),
                actions.clone(),
                format!(
                    "{} has blocklisted IAM actions: {}",
                    site.resource.logical_id,
                    actions.join(", ")
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin::test_support::run_rule;
    use serde_json::{json, Value};

    fn policy(actions: Value) -> Value {
        json!({
            "Resources": {
                "Policy": {
                    "Type": "AWS::IAM::Policy",
                    "Properties": {
                        "PolicyName": "p",
                        "PolicyDocument": {"Statement": [{"Effect": "Allow", "Action": actions, "Resource": "*"}]}
                    }
                }
            }
        })
    }

    #[test]
    fn flags_explicit_escalation_action() {
        let result = run_rule(
            PrivilegeEscalationRule::build,
            policy(json!(["iam:CreateAccessKey", "s3:GetObject"])),
            &Config::default(),
        );
        assert_eq!(result.blocking_findings().len(), 1);
        assert_eq!(
            result.blocking_findings()[0].context().unwrap().actions,
            vec!["iam:CreateAccessKey"]
        );
    }

    #[test]
    fn wildcard_expands_to_sorted_actions() {
        let result = run_rule(
            PrivilegeEscalationRule::build,
            policy(json!("iam:Put*Policy")),
            &Config::default(),
        );
        assert_eq!(
            result.blocking_findings()[0].context().unwrap().actions,
            vec!["iam:PutGroupPolicy", "iam:PutRolePolicy", "iam:PutUserPolicy"]
        );
    }

    #[test]
    fn harmless_actions_pass() {
        let result = run_rule(
            PrivilegeEscalationRule::build,
            policy(json!(["s3:GetObject", "iam:GetRole"])),
            &Config::default(),
        );
        assert!(result.is_empty());
    }
}
