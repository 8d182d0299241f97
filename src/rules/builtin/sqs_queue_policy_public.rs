use crate::config::Config;
use crate::error::Result;
use crate::model::iam;
use crate::model::Template;
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

use super::s3_bucket_policy_principal::record_public_statements;

/// Flags SQS queue policies that let anyone send or receive.
pub struct SqsQueuePolicyPublicRule {
    base: RuleBase,
}

impl SqsQueuePolicyPublicRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "SQSQueuePolicyPublicRule",
        name: "SQS queue policy public",
        description: "SQS queue policy allows any principal with no condition",
        default_mode: RuleMode::Blocking,
        risk: RuleRisk::High,
        granularity: RuleGranularity::Resource,
    };

    pub fn build(config: &Config) -> Result<Box<dyn Rule>> {
        Ok(Box::new(Self {
            base: RuleBase::new(Self::METADATA, config),
        }))
    }
}

impl Rule for SqsQueuePolicyPublicRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for site in iam::resource_policies(template, "AWS::SQS::QueuePolicy", "PolicyDocument") {
            record_public_statements(&self.base, &site, "SQS Queue policy", result);
        }
        Ok(())
    }
}
