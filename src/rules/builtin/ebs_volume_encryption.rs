use serde_json::Value;

use crate::config::Config;
use crate::error::Result;
use crate::model::Template;
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

/// EBS volumes must set `Encrypted: true`.
pub struct EbsVolumeHasSseRule {
    base: RuleBase,
}

impl EbsVolumeHasSseRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "EBSVolumeHasSSERule",
        name: "EBS volume encryption",
        description: "EBS volume is not encrypted at rest",
        default_mode: RuleMode::Monitor,
        risk: RuleRisk::Medium,
        granularity: RuleGranularity::Resource,
    };

    pub fn build(config: &Config) -> Result<Box<dyn Rule>> {
        Ok(Box::new(Self {
            base: RuleBase::new(Self::METADATA, config),
        }))
    }
}

impl Rule for EbsVolumeHasSseRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for volume in template.resources_of_type("AWS::EC2::Volume") {
            let encrypted = match volume.property("Encrypted") {
                Some(Value::Bool(b)) => *b,
                Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
                // Unresolved intrinsic: can't tell, don't guess.
                Some(Value::Object(_)) => true,
                _ => false,
            };
            if !encrypted {
                result.record(self.base.resource_finding(
                    volume,
                    Some("Properties.Encrypted".into()),
                    format!(
                        "EBS volume {} should have server-side encryption enabled",
                        volume.logical_id
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
    fn unencrypted_volumes_are_monitored() {
        let result = run_rule(
            EbsVolumeHasSseRule::build,
            json!({
                "Resources": {
                    "Plain": {"Type": "AWS::EC2::Volume", "Properties": {"Size": 10}},
                    "Off": {"Type": "AWS::EC2::Volume", "Properties": {"Encrypted": "false"}},
                    "On": {"Type": "AWS::EC2::Volume", "Properties": {"Encrypted": true}}
                }
            }),
            &Config::default(),
        );
        assert!(result.is_valid());
        let flagged: Vec<_> = result
            .monitored_findings()
            .iter()
            .map(|f| f.logical_id().unwrap())
            .collect();
        assert_eq!(flagged, vec!["Plain", "Off"]);
    }
}
