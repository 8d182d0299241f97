use crate::config::Config;
use crate::error::Result;
use crate::model::iam::{self, Principal, Statement};
use crate::model::{Template, DEFAULT_ACCOUNT_ID};
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

/// Flags role trust policies that let untrusted AWS accounts assume the role.
///
/// The deployment account (`aws_account_id`, or the placeholder used by
/// resolution when none is configured) is always trusted, as are
/// `aws_principals` and this rule's `allowed_principals`. A wildcard
/// principal names every account and is flagged unless the statement
/// carries a `Condition` or `"*"` is allow-listed.
pub struct CrossAccountTrustRule {
    base: RuleBase,
}

impl CrossAccountTrustRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "CrossAccountTrustRule",
        name: "Cross-account trust",
        description: "IAM role can be assumed from an untrusted AWS account",
        default_mode: RuleMode::Blocking,
        risk: RuleRisk::High,
        granularity: RuleGranularity::Resource,
    };

    pub fn build(config: &Config) -> Result<Box<dyn Rule>> {
        Ok(Box::new(Self {
            base: RuleBase::new(Self::METADATA, config),
        }))
    }

    fn is_trusted(&self, config: &Config, statement: &Statement, principal: &Principal) -> bool {
        let value = match principal {
            Principal::Wildcard => {
                return statement.condition.is_some()
                    || config.is_trusted_principal(self.base.id(), "*");
            }
            Principal::Aws(value) => value,
            _ => return true,
        };
        let Some(account) = principal.account_id() else {
            // Not an account-scoped principal (unresolved intrinsic, etc.).
            return true;
        };
        let own_account = config.aws_account_id.as_deref().unwrap_or(DEFAULT_ACCOUNT_ID);
        account == own_account
            || config.is_trusted_principal(self.base.id(), account)
            || config.is_trusted_principal(self.base.id(), value)
    }
}

impl Rule for CrossAccountTrustRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, config: &Config, result: &mut ScanResult) -> Result<()> {
        let sites = iam::resource_policies(template, "AWS::IAM::Role", "AssumeRolePolicyDocument");
        for site in sites {
            for statement in site.document.allow_statements() {
                for principal in &statement.principals {
                    if self.is_trusted(config, statement, principal) {
                        continue;
                    }
                    let trustee = match principal {
                        Principal::Aws(value) => value.as_str(),
                        _ => "*",
                    };
                    result.record(self.base.resource_finding(
                        site.resource,
                        Some(format!("Properties.{}", site.path)),
                        format!(
                            "{} has forbidden cross-account trust relationship with {trustee}",
                            site.resource.logical_id
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
