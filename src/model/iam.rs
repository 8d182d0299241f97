//! Read-only view over IAM-style policy documents embedded in templates.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{Resource, Template};

static ACCOUNT_ARN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^arn:aws[a-z-]*:iam::(\d{12}):").expect("valid regex"));

static BARE_ACCOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{12}$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// A principal as written in a policy statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// `"Principal": "*"` or `{"AWS": "*"}`.
    Wildcard,
    Aws(String),
    Service(String),
    Federated(String),
    CanonicalUser(String),
}

impl Principal {
    /// Twelve-digit account id named by an AWS principal, if any.
    pub fn account_id(&self) -> Option<&str> {
        let Self::Aws(value) = self else {
            return None;
        };
        if BARE_ACCOUNT.is_match(value) {
            return Some(value);
        }
        ACCOUNT_ARN
            .captures(value)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub effect: Effect,
    pub principals: Vec<Principal>,
    pub actions: Vec<String>,
    pub not_actions: Vec<String>,
    pub resources: Vec<String>,
    pub condition: Option<Value>,
}

impl Statement {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let effect = match obj.get("Effect").and_then(Value::as_str) {
            Some(e) if e.eq_ignore_ascii_case("deny") => Effect::Deny,
            _ => Effect::Allow,
        };
        Some(Self {
            effect,
            principals: obj.get("Principal").map(principals_of).unwrap_or_default(),
            actions: obj.get("Action").map(strings_of).unwrap_or_default(),
            not_actions: obj.get("NotAction").map(strings_of).unwrap_or_default(),
            resources: obj.get("Resource").map(strings_of).unwrap_or_default(),
            condition: obj
                .get("Condition")
                .filter(|c| c.as_object().is_some_and(|m| !m.is_empty()))
                .cloned(),
        })
    }

    pub fn is_allow(&self) -> bool {
        self.effect == Effect::Allow
    }

    pub fn has_wildcard_principal(&self) -> bool {
        self.principals
            .iter()
            .any(|p| matches!(p, Principal::Wildcard))
    }

    /// Actions written as `*` or `service:*`.
    pub fn wildcard_actions(&self) -> Vec<&str> {
        self.actions
            .iter()
            .map(String::as_str)
            .filter(|a| *a == "*" || a.ends_with(":*"))
            .collect()
    }

    /// Whether any listed action (which may contain IAM wildcards) grants
    /// the concrete `action`.
    pub fn grants_action(&self, action: &str) -> bool {
        self.actions.iter().any(|pattern| action_matches(pattern, action))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    /// Read a policy document. Statements that are not mappings are skipped.
    pub fn from_value(value: &Value) -> Self {
        let statements = match value.get("Statement") {
            Some(Value::Array(items)) => items.iter().filter_map(Statement::from_value).collect(),
            Some(single @ Value::Object(_)) => Statement::from_value(single).into_iter().collect(),
            _ => Vec::new(),
        };
        Self { statements }
    }

    pub fn allow_statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter().filter(|s| s.is_allow())
    }
}

/// A policy document together with where it lives in the template.
#[derive(Debug, Clone)]
pub struct PolicySite<'t> {
    pub resource: &'t Resource,
    /// Dotted path of the document relative to the resource's properties.
    pub path: String,
    pub document: PolicyDocument,
}

/// Identity policies: inline policies on roles, users and groups plus
/// standalone `AWS::IAM::Policy` / `AWS::IAM::ManagedPolicy` resources.
pub fn identity_policies(template: &Template) -> Vec<PolicySite<'_>> {
    let mut sites = Vec::new();
    for resource in template.resources() {
        match resource.resource_type.as_str() {
            "AWS::IAM::Role" | "AWS::IAM::User" | "AWS::IAM::Group" => {
                for (i, policy) in resource.property_items("Policies").iter().enumerate() {
                    if let Some(doc) = policy.get("PolicyDocument") {
                        sites.push(PolicySite {
                            resource,
                            path: format!("Policies.{i}.PolicyDocument"),
                            document: PolicyDocument::from_value(doc),
                        });
                    }
                }
            }
            "AWS::IAM::Policy" | "AWS::IAM::ManagedPolicy" => {
                if let Some(doc) = resource.property("PolicyDocument") {
                    sites.push(PolicySite {
                        resource,
                        path: "PolicyDocument".into(),
                        document: PolicyDocument::from_value(doc),
                    });
                }
            }
            _ => {}
        }
    }
    sites
}

/// Resource policies of one resource type, read from `property`.
pub fn resource_policies<'t>(
    template: &'t Template,
    resource_type: &str,
    property: &str,
) -> Vec<PolicySite<'t>> {
    template
        .resources()
        .iter()
        .filter(|r| r.resource_type == resource_type)
        .filter_map(|resource| {
            resource.property(property).map(|doc| PolicySite {
                resource,
                path: property.to_string(),
                document: PolicyDocument::from_value(doc),
            })
        })
        .collect()
}

/// Case-insensitive IAM glob match (`*` any run, `?` one character).
pub fn action_matches(pattern: &str, action: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let action: Vec<char> = action.chars().flat_map(char::to_lowercase).collect();

    let (mut p, mut a) = (0, 0);
    // Last `*` seen and the action position it is currently absorbing up to.
    let mut star: Option<(usize, usize)> = None;
    while a < action.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, a));
                p += 1;
            }
            Some(&c) if c == '?' || c == action[a] => {
                p += 1;
                a += 1;
            }
            _ => match star {
                Some((star_p, star_a)) => {
                    p = star_p + 1;
                    a = star_a + 1;
                    star = Some((star_p, star_a + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

fn strings_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(strings_of).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

fn principals_of(value: &Value) -> Vec<Principal> {
    match value {
        Value::String(s) if s == "*" => vec![Principal::Wildcard],
        Value::Object(map) => {
            let mut out = Vec::new();
            for (kind, ids) in map {
                for id in strings_of(ids) {
                    out.push(match kind.as_str() {
                        "AWS" if id == "*" => Principal::Wildcard,
                        "AWS" => Principal::Aws(id),
                        "Service" => Principal::Service(id),
                        "Federated" => Principal::Federated(id),
                        _ => Principal::CanonicalUser(id),
                    });
                }
            }
            out
        }
        Value::String(s) => vec![Principal::Aws(s.clone())],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_single_statement_object() {
        let doc = PolicyDocument::from_value(&json!({
            "Statement": {"Effect": "Allow", "Action": "s3:GetObject", "Principal": "*"}
        }));
        assert_eq!(doc.statements.len(), 1);
        assert!(doc.statements[0].has_wildcard_principal());
        assert_eq!(doc.statements[0].actions, vec!["s3:GetObject"]);
    }

    #[test]
    fn empty_condition_counts_as_none() {
        let doc = PolicyDocument::from_value(&json!({
            "Statement": [{"Effect": "Allow", "Action": "*", "Condition": {}}]
        }));
        assert!(doc.statements[0].condition.is_none());
    }

    #[test]
    fn principal_forms() {
        let doc = PolicyDocument::from_value(&json!({
            "Statement": [{
                "Effect": "Allow",
                "Principal": {
                    "AWS": ["arn:aws:iam::111122223333:root", "444455556666", "*"],
                    "Service": "lambda.amazonaws.com"
                }
            }]
        }));
        let principals = &doc.statements[0].principals;
        assert_eq!(principals.len(), 4);
        assert_eq!(principals[0].account_id(), Some("111122223333"));
        assert_eq!(principals[1].account_id(), Some("444455556666"));
        assert_eq!(principals[2], Principal::Wildcard);
        assert_eq!(principals[3].account_id(), None);
    }

    #[test]
    fn wildcard_action_matching() {
        assert!(action_matches("iam:*", "iam:PassRole"));
        assert!(action_matches("IAM:pass*", "iam:PassRole"));
        assert!(action_matches("s3:Get?bject", "s3:GetObject"));
        assert!(!action_matches("s3:*", "iam:PassRole"));
        assert!(!action_matches("iam:Pass", "iam:PassRole"));
        assert!(action_matches("*", "sts:AssumeRole"));
        assert!(action_matches("iam:*Role*", "iam:AttachRolePolicy"));
        assert!(!action_matches("iam:*Role", "iam:PassRoles"));
        assert!(action_matches("iam:Put*Policy", "iam:PutUserPolicy"));
        assert!(!action_matches("iam:Put?Policy", "iam:PutUserPolicy"));
    }

    #[test]
    fn deny_statements_are_not_allow() {
        let doc = PolicyDocument::from_value(&json!({
            "Statement": [
                {"Effect": "Deny", "Action": "*"},
                {"Effect": "Allow", "Action": ["s3:*", "sqs:SendMessage"]}
            ]
        }));
        let allows: Vec<_> = doc.allow_statements().collect();
        assert_eq!(allows.len(), 1);
        assert_eq!(allows[0].wildcard_actions(), vec!["s3:*"]);
    }
}
