use serde_json::Value;

use crate::config::Config;
use crate::error::Result;
use crate::model::Template;
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

const RDS_TYPES: &[&str] = &["AWS::RDS::DBInstance", "AWS::RDS::DBCluster"];

/// Dynamic references resolved by CloudFormation at deploy time.
const SECRET_REFERENCE_PREFIXES: &[&str] = &["{{resolve:secretsmanager:", "{{resolve:ssm-secure:"];

/// Flags RDS master passwords that end up in the template in clear text:
/// literals, and parameters that have a default or lack `NoEcho`.
pub struct HardcodedRdsPasswordRule {
    base: RuleBase,
}

impl HardcodedRdsPasswordRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "HardcodedRDSPasswordRule",
        name: "Hardcoded RDS password",
        description: "RDS master password is hardcoded or exposed through a parameter",
        default_mode: RuleMode::Blocking,
        risk: RuleRisk::High,
        granularity: RuleGranularity::Resource,
    };

    pub fn build(config: &Config) -> Result<Box<dyn Rule>> {
        Ok(Box::new(Self {
            base: RuleBase::new(Self::METADATA, config),
        }))
    }

    fn problem(template: &Template, password: &Value) -> Option<String> {
        match password {
            Value::String(s)
                if SECRET_REFERENCE_PREFIXES
                    .iter()
                    .any(|prefix| s.starts_with(prefix)) =>
            {
                None
            }
            Value::String(_) | Value::Number(_) => Some("a hardcoded password".into()),
            Value::Object(map) => {
                let name = map.get("Ref").and_then(Value::as_str)?;
                let parameter = template.parameter(name)?;
                if parameter.default.is_some() {
                    Some(format!("parameter '{name}' with a default password"))
                } else if !parameter.no_echo {
                    Some(format!("parameter '{name}' without NoEcho"))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl Rule for HardcodedRdsPasswordRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for resource in template.resources() {
            if !RDS_TYPES.contains(&resource.resource_type.as_str()) {
                continue;
            }
            let Some(password) = resource.property("MasterUserPassword") else {
                continue;
            };
            if let Some(problem) = Self::problem(template, password) {
                result.record(self.base.resource_finding(
                    resource,
                    Some("Properties.MasterUserPassword".into()),
                    format!(
                        "{} {} uses {problem} for MasterUserPassword",
                        resource.resource_type, resource.logical_id
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

    fn db(password: Value, parameters: Value) -> Value {
        json!({
            "Parameters": parameters,
            "Resources": {
                "Db": {
                    "Type": "AWS::RDS::DBInstance",
                    "Properties": {"MasterUsername": "admin", "MasterUserPassword": password}
                }
            }
        })
    }

    #[test]
    fn flags_literal_password() {
        let result = run_rule(
            HardcodedRdsPasswordRule::build,
            db(json!("hunter2"), json!({})),
            &Config::default(),
        );
        assert_eq!(result.blocking_findings().len(), 1);
        assert!(result.blocking_findings()[0].reason().contains("hardcoded"));
    }

    #[test]
    fn flags_parameter_with_default() {
        let result = run_rule(
            HardcodedRdsPasswordRule::build,
            db(
                json!({"Ref": "DbPassword"}),
                json!({"DbPassword": {"Type": "String", "NoEcho": true, "Default": "changeme"}}),
            ),
            &Config::default(),
        );
        assert!(result.blocking_findings()[0].reason().contains("default"));
    }

    #[test]
    fn flags_parameter_without_no_echo() {
        let result = run_rule(
            HardcodedRdsPasswordRule::build,
            db(
                json!({"Ref": "DbPassword"}),
                json!({"DbPassword": {"Type": "String"}}),
            ),
            &Config::default(),
        );
        assert!(result.blocking_findings()[0].reason().contains("NoEcho"));
    }

    #[test]
    fn no_echo_parameter_and_secret_reference_pass() {
        let result = run_rule(
            HardcodedRdsPasswordRule::build,
            db(
                json!({"Ref": "DbPassword"}),
                json!({"DbPassword": {"Type": "String", "NoEcho": "true"}}),
            ),
            &Config::default(),
        );
        assert!(result.is_empty());

        let result = run_rule(
            HardcodedRdsPasswordRule::build,
            db(json!("{{resolve:secretsmanager:db-secret:SecretString:password}}"), json!({})),
            &Config::default(),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn instance_without_password_passes() {
        let result = run_rule(
            HardcodedRdsPasswordRule::build,
            json!({
                "Resources": {
                    "Aurora": {"Type": "AWS::RDS::DBInstance", "Properties": {"DBClusterIdentifier": "c"}}
                }
            }),
            &Config::default(),
        );
        assert!(result.is_empty());
    }
}
