//! Document model for CloudFormation templates.
//!
//! Parsing produces a `Template`. Every rule consumes a `&Template` and only
//! walks in-memory JSON values; nothing in here mutates a parsed template.

pub mod iam;
mod parse;
mod resolve;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{GuardError, Result};

/// Placeholder account id used when `AWS::AccountId` is resolved without
/// an explicit substitution.
pub const DEFAULT_ACCOUNT_ID: &str = "123456789012";

/// Placeholder region used when `AWS::Region` is resolved without an
/// explicit substitution.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// A parsed template. Cheap to clone; resources keep document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    raw: Value,
    parameters: BTreeMap<String, Parameter>,
    resources: Vec<Resource>,
}

/// A declared template parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub param_type: String,
    pub default: Option<Value>,
    pub no_echo: bool,
}

/// A single resource declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub logical_id: String,
    pub resource_type: String,
    pub properties: Value,
    pub condition: Option<String>,
}

impl Resource {
    /// Look up a property by dotted path, e.g. `"SecurityGroupIngress.0.CidrIp"`.
    ///
    /// Numeric segments index into arrays. Missing segments yield `None`.
    pub fn property(&self, path: &str) -> Option<&Value> {
        lookup(&self.properties, path)
    }

    /// String value of a property, if present and a string.
    pub fn property_str(&self, path: &str) -> Option<&str> {
        self.property(path).and_then(Value::as_str)
    }

    /// Items of an array property; empty when absent or not an array.
    pub fn property_items(&self, path: &str) -> &[Value] {
        self.property(path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Template {
    /// Parse JSON or YAML template text.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let value = parse::parse_document(&name, text)?;
        Self::from_value(name, value)
    }

    /// Build a template from an already-decoded JSON document.
    pub fn from_value(name: impl Into<String>, raw: Value) -> Result<Self> {
        let name = name.into();
        let root = raw
            .as_object()
            .ok_or_else(|| GuardError::parse(&name, "template root must be a mapping"))?;

        let parameters = parse_parameters_section(&name, root.get("Parameters"))?;
        let resources = parse_resources_section(&name, root.get("Resources"))?;

        Ok(Self {
            name,
            raw,
            parameters,
            resources,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full underlying document.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// The `Conditions` section, if any.
    pub fn conditions(&self) -> Option<&Map<String, Value>> {
        self.raw.get("Conditions").and_then(Value::as_object)
    }

    /// All resources in document order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    /// Resources of one CloudFormation type, e.g. `AWS::S3::Bucket`.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }

    /// Return an equivalent template with intrinsic references replaced by
    /// literal values where they can be resolved.
    ///
    /// Unresolvable references stay in place as symbolic placeholders.
    pub fn resolve(&self, substitutions: &HashMap<String, Value>) -> Template {
        resolve::resolve_template(self, substitutions)
    }
}

/// Parse a JSON/YAML mapping of parameter substitutions.
pub fn parse_substitutions(name: &str, text: &str) -> Result<HashMap<String, Value>> {
    let value = parse::parse_document(name, text)?;
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(HashMap::new()),
        _ => Err(GuardError::parse(
            name,
            "parameter file must contain a mapping of names to values",
        )),
    }
}

pub(crate) fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn parse_parameters_section(
    template: &str,
    section: Option<&Value>,
) -> Result<BTreeMap<String, Parameter>> {
    let Some(section) = section else {
        return Ok(BTreeMap::new());
    };
    let map = section
        .as_object()
        .ok_or_else(|| GuardError::parse(template, "Parameters must be a mapping"))?;

    let mut parameters = BTreeMap::new();
    for (name, decl) in map {
        let decl = decl.as_object().ok_or_else(|| {
            GuardError::parse(template, format!("parameter '{name}' must be a mapping"))
        })?;
        let no_echo = match decl.get("NoEcho") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        parameters.insert(
            name.clone(),
            Parameter {
                param_type: decl
                    .get("Type")
                    .and_then(Value::as_str)
                    .unwrap_or("String")
                    .to_string(),
                default: decl.get("Default").cloned(),
                no_echo,
            },
        );
    }
    Ok(parameters)
}

fn parse_resources_section(template: &str, section: Option<&Value>) -> Result<Vec<Resource>> {
    let Some(section) = section else {
        return Ok(Vec::new());
    };
    let map = section
        .as_object()
        .ok_or_else(|| GuardError::parse(template, "Resources must be a mapping"))?;

    map.iter()
        .map(|(logical_id, decl)| {
            let resource_type = decl
                .get("Type")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    GuardError::parse(
                        template,
                        format!("resource '{logical_id}' has no string Type"),
                    )
                })?;
            Ok(Resource {
                logical_id: logical_id.clone(),
                resource_type: resource_type.to_string(),
                properties: decl
                    .get("Properties")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new())),
                condition: decl
                    .get("Condition")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}
