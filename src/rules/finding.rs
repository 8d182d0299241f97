use serde::{Deserialize, Serialize};

/// Whether a failing finding blocks the template or is only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Blocking,
    Monitor,
}

impl RuleMode {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blocking" | "block" => Some(Self::Blocking),
            "monitor" | "monitored" => Some(Self::Monitor),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::Monitor => write!(f, "monitor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleRisk {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RuleRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// What a finding points at: the whole stack, one resource, or specific
/// actions inside a resource's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleGranularity {
    Stack,
    Resource,
    Action,
}

impl std::fmt::Display for RuleGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stack => write!(f, "stack"),
            Self::Resource => write!(f, "resource"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// Where in the template a finding applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingContext {
    pub logical_id: String,
    pub resource_type: String,
    /// Dotted property path inside the resource, e.g. `Properties.AccessControl`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

/// One recorded rule outcome. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    rule_id: String,
    reason: String,
    #[serde(skip)]
    mode: RuleMode,
    risk: RuleRisk,
    granularity: RuleGranularity,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<FindingContext>,
}

impl Finding {
    pub fn new(
        rule_id: impl Into<String>,
        reason: impl Into<String>,
        mode: RuleMode,
        risk: RuleRisk,
        granularity: RuleGranularity,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            reason: reason.into(),
            mode,
            risk,
            granularity,
            context: None,
        }
    }

    pub fn with_context(mut self, context: FindingContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn mode(&self) -> RuleMode {
        self.mode
    }

    pub fn risk(&self) -> RuleRisk {
        self.risk
    }

    pub fn granularity(&self) -> RuleGranularity {
        self.granularity
    }

    pub fn context(&self) -> Option<&FindingContext> {
        self.context.as_ref()
    }

    /// Logical id of the offending resource, if the finding names one.
    pub fn logical_id(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.logical_id.as_str())
    }
}

/// Static description of a rule, available without running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleMetadata {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub default_mode: RuleMode,
    pub risk: RuleRisk,
    pub granularity: RuleGranularity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_without_mode_and_empty_context() {
        let finding = Finding::new(
            "S3BucketPublicReadAclRule",
            "public bucket",
            RuleMode::Blocking,
            RuleRisk::High,
            RuleGranularity::Resource,
        );
        assert_eq!(
            serde_json::to_value(&finding).unwrap(),
            json!({
                "rule_id": "S3BucketPublicReadAclRule",
                "reason": "public bucket",
                "risk": "high",
                "granularity": "resource"
            })
        );
    }

    #[test]
    fn context_is_serialized_when_present() {
        let finding = Finding::new(
            "R",
            "why",
            RuleMode::Monitor,
            RuleRisk::Low,
            RuleGranularity::Action,
        )
        .with_context(FindingContext {
            logical_id: "Role".into(),
            resource_type: "AWS::IAM::Role".into(),
            path: None,
            actions: vec!["iam:*".into()],
        });
        assert_eq!(finding.logical_id(), Some("Role"));
        let value = serde_json::to_value(&finding).unwrap();
        assert_eq!(
            value["context"],
            json!({"logical_id": "Role", "resource_type": "AWS::IAM::Role", "actions": ["iam:*"]})
        );
    }

    #[test]
    fn mode_parsing_is_lenient() {
        assert_eq!(RuleMode::from_str_lenient("BLOCKING"), Some(RuleMode::Blocking));
        assert_eq!(RuleMode::from_str_lenient("monitored"), Some(RuleMode::Monitor));
        assert_eq!(RuleMode::from_str_lenient("debug"), None);
    }
}
