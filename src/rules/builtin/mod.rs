mod cross_account_trust;
mod ebs_volume_encryption;
mod hardcoded_rds_password;
mod managed_policy_on_user;
mod privilege_escalation;
mod s3_bucket_policy_principal;
mod s3_public_read_acl;
mod security_group_open_to_world;
mod sqs_queue_policy_public;
mod wildcard_action;

use once_cell::sync::Lazy;

use super::{RuleFactory, RuleMetadata, RuleRegistry};
use crate::error::Result;

pub use cross_account_trust::CrossAccountTrustRule;
pub use ebs_volume_encryption::EbsVolumeHasSseRule;
pub use hardcoded_rds_password::HardcodedRdsPasswordRule;
pub use managed_policy_on_user::ManagedPolicyOnUserRule;
pub use privilege_escalation::PrivilegeEscalationRule;
pub use s3_bucket_policy_principal::S3BucketPolicyWildcardPrincipalRule;
pub use s3_public_read_acl::S3BucketPublicReadAclRule;
pub use security_group_open_to_world::SecurityGroupOpenToWorldRule;
pub use sqs_queue_policy_public::SqsQueuePolicyPublicRule;
pub use wildcard_action::WildcardActionRule;

/// Every built-in rule, in default execution order.
const BUILTIN: &[(RuleMetadata, RuleFactory)] = &[
    (S3BucketPublicReadAclRule::METADATA, S3BucketPublicReadAclRule::build),
    (
        S3BucketPolicyWildcardPrincipalRule::METADATA,
        S3BucketPolicyWildcardPrincipalRule::build,
    ),
    (WildcardActionRule::METADATA, WildcardActionRule::build),
    (PrivilegeEscalationRule::METADATA, PrivilegeEscalationRule::build),
    (CrossAccountTrustRule::METADATA, CrossAccountTrustRule::build),
    (SecurityGroupOpenToWorldRule::METADATA, SecurityGroupOpenToWorldRule::build),
    (HardcodedRdsPasswordRule::METADATA, HardcodedRdsPasswordRule::build),
    (EbsVolumeHasSseRule::METADATA, EbsVolumeHasSseRule::build),
    (SqsQueuePolicyPublicRule::METADATA, SqsQueuePolicyPublicRule::build),
    (ManagedPolicyOnUserRule::METADATA, ManagedPolicyOnUserRule::build),
];

/// The default rule catalogue, built once per process.
pub static DEFAULT_RULES: Lazy<RuleRegistry> =
    Lazy::new(|| default_registry().expect("built-in rule ids are unique"));

/// Build a fresh registry holding every built-in rule.
pub fn default_registry() -> Result<RuleRegistry> {
    let mut registry = RuleRegistry::new();
    for (metadata, factory) in BUILTIN {
        registry.register(*metadata, *factory)?;
    }
    Ok(registry)
}
