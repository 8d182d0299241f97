use crate::config::Config;
use crate::error::Result;
use crate::model::iam::{self, PolicySite};
use crate::model::Template;
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

/// Flags bucket policies that allow access to `*` without any condition.
pub struct S3BucketPolicyWildcardPrincipalRule {
    base: RuleBase,
}

impl S3BucketPolicyWildcardPrincipalRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "S3BucketPolicyWildcardPrincipalRule",
        name: "S3 bucket policy wildcard principal",
        description: "S3 bucket policy allows any principal with no condition",
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

impl Rule for S3BucketPolicyWildcardPrincipalRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for site in iam::resource_policies(template, "AWS::S3::BucketPolicy", "PolicyDocument") {
            record_public_statements(&self.base, &site, "S3 Bucket policy", result);
        }
        Ok(())
    }
}

/// One finding per unconditioned `Allow` to a wildcard principal.
pub(super) fn record_public_statements(
    base: &RuleBase,
    site: &PolicySite<'_>,
    label: &str,
    result: &mut ScanResult,
) {
    for (i, statement) in site.document.statements.iter().enumerate() {
        if statement.is_allow()
            && statement.has_wildcard_principal()
            && statement.condition.is_none()
        {
            result.record(base.action_finding(
                site.resource,
                Some(format!("Properties.{}.Statement.{i}", site.path)),
                statement.actions.clone(),
                format!(
                    "{label} {} should not allow access to a wildcard principal without a condition",
                    site.resource.logical_id
                ),
            ));
        }
    }
}
