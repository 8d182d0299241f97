use crate::config::Config;
use crate::error::Result;
use crate::model::Template;
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

const PUBLIC_ACLS: &[&str] = &["PublicRead", "PublicReadWrite"];

/// Flags S3 buckets whose canned ACL grants public read.
pub struct S3BucketPublicReadAclRule {
    base: RuleBase,
}

impl S3BucketPublicReadAclRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "S3BucketPublicReadAclRule",
        name: "S3 public-read ACL",
        description: "S3 bucket uses a PublicRead or PublicReadWrite canned ACL",
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

impl Rule for S3BucketPublicReadAclRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for bucket in template.resources_of_type("AWS::S3::Bucket") {
            let Some(acl) = bucket.property_str("AccessControl") else {
                continue;
            };
            if PUBLIC_ACLS.contains(&acl) {
                result.record(self.base.resource_finding(
                    bucket,
                    Some("Properties.AccessControl".into()),
                    format!(
                        "S3 Bucket {} should not have a public-read acl ({acl})",
                        bucket.logical_id
                    ),
                ));
            }
        }
        Ok(())
    }
}
