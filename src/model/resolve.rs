//! Best-effort intrinsic function resolution.
//!
//! Resolution is pure: it builds a new document and never fails. Anything
//! that can't be turned into a literal (resource references, `Fn::GetAtt`,
//! `Fn::ImportValue`, unknown names) is kept as the original intrinsic.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::warn;

use super::{Resource, Template, DEFAULT_ACCOUNT_ID, DEFAULT_REGION};

const MAX_CONDITION_DEPTH: usize = 32;

const UNRESOLVED_SECTIONS: &[&str] = &["Parameters", "Conditions"];

pub(super) fn resolve_template(
    template: &Template,
    substitutions: &HashMap<String, Value>,
) -> Template {
    let resolver = Resolver {
        template,
        substitutions,
    };

    let resources: Vec<Resource> = template
        .resources
        .iter()
        .filter(|resource| resolver.resource_enabled(resource))
        .map(|resource| Resource {
            properties: resolver
                .resolve(&resource.properties)
                .unwrap_or_else(|| Value::Object(Map::new())),
            ..resource.clone()
        })
        .collect();

    let raw = match &template.raw {
        Value::Object(root) => {
            let mut out = Map::new();
            for (section, value) in root {
                let resolved = if section == "Resources" {
                    resolver.resolve_resources_section(value)
                } else if UNRESOLVED_SECTIONS.contains(&section.as_str()) {
                    value.clone()
                } else {
                    resolver.resolve(value).unwrap_or(Value::Null)
                };
                out.insert(section.clone(), resolved);
            }
            Value::Object(out)
        }
        other => other.clone(),
    };

    Template {
        name: template.name.clone(),
        raw,
        parameters: template.parameters.clone(),
        resources,
    }
}

struct Resolver<'a> {
    template: &'a Template,
    substitutions: &'a HashMap<String, Value>,
}

impl Resolver<'_> {
    fn resource_enabled(&self, resource: &Resource) -> bool {
        match &resource.condition {
            Some(name) => self.condition_named(name, 0) != Some(false),
            None => true,
        }
    }

    fn resolve_resources_section(&self, section: &Value) -> Value {
        let Some(map) = section.as_object() else {
            return section.clone();
        };
        let mut out = Map::new();
        for (logical_id, decl) in map {
            if let Some(resource) = self.template.resource(logical_id) {
                if !self.resource_enabled(resource) {
                    continue;
                }
            }
            let mut decl = decl.clone();
            if let Some(props) = decl.get_mut("Properties") {
                *props = self
                    .resolve(props)
                    .unwrap_or_else(|| Value::Object(Map::new()));
            }
            out.insert(logical_id.clone(), decl);
        }
        Value::Object(out)
    }

    /// Resolve a value. `None` means the value was `AWS::NoValue` and the
    /// enclosing property or list item should be dropped.
    fn resolve(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Object(map) if is_intrinsic(map) => {
                let (key, args) = map.iter().next()?;
                self.resolve_intrinsic(key, args)
            }
            Value::Object(map) => Some(Value::Object(
                map.iter()
                    .filter_map(|(k, v)| self.resolve(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
            Value::Array(items) => Some(Value::Array(
                items.iter().filter_map(|v| self.resolve(v)).collect(),
            )),
            other => Some(other.clone()),
        }
    }

    fn resolve_intrinsic(&self, key: &str, args: &Value) -> Option<Value> {
        match key {
            "Ref" => match args.as_str() {
                Some("AWS::NoValue") => None,
                Some(name) => Some(self.lookup_name(name).unwrap_or_else(|| keep(key, args))),
                None => Some(keep(key, args)),
            },
            "Fn::Join" => {
                let args = self.resolve(args)?;
                Some(join(&args).unwrap_or_else(|| keep(key, &args)))
            }
            "Fn::Sub" => Some(self.substitute(args).unwrap_or_else(|| {
                let resolved = self.resolve(args).unwrap_or(Value::Null);
                keep(key, &resolved)
            })),
            "Fn::Select" => {
                let args = self.resolve(args)?;
                Some(select(&args).unwrap_or_else(|| keep(key, &args)))
            }
            "Fn::Split" => {
                let args = self.resolve(args)?;
                Some(split(&args).unwrap_or_else(|| keep(key, &args)))
            }
            "Fn::If" => self.resolve_if(args),
            _ => {
                let mut map = Map::new();
                map.insert(
                    key.to_string(),
                    self.resolve(args).unwrap_or(Value::Null),
                );
                Some(Value::Object(map))
            }
        }
    }

    /// Substitutions win over parameter defaults, which win over pseudo
    /// parameters.
    fn lookup_name(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.substitutions.get(name) {
            return Some(value.clone());
        }
        if let Some(default) = self
            .template
            .parameters
            .get(name)
            .and_then(|p| p.default.as_ref())
        {
            return Some(default.clone());
        }
        pseudo_parameter(name).map(Value::from)
    }

    fn substitute(&self, args: &Value) -> Option<Value> {
        let (text, vars) = match args {
            Value::String(text) => (text.as_str(), None),
            Value::Array(items) if items.len() == 2 => {
                (items[0].as_str()?, items[1].as_object())
            }
            _ => return None,
        };

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}')?;
            let name = &after[..end];

            if let Some(literal) = name.strip_prefix('!') {
                out.push_str("${");
                out.push_str(literal);
                out.push('}');
            } else {
                let value = match vars.and_then(|v| v.get(name)) {
                    Some(var) => self.resolve(var)?,
                    None if name.contains('.') => return None,
                    None => self.lookup_name(name)?,
                };
                out.push_str(&scalar_string(&value)?);
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Some(Value::String(out))
    }

    fn resolve_if(&self, args: &Value) -> Option<Value> {
        let items = match args.as_array() {
            Some(items) if items.len() == 3 => items,
            _ => {
                warn!(template = self.template.name(), "malformed Fn::If left unresolved");
                return Some(keep("Fn::If", args));
            }
        };
        let condition = items[0].as_str();
        match condition.and_then(|name| self.condition_named(name, 0)) {
            Some(true) => self.resolve(&items[1]),
            Some(false) => self.resolve(&items[2]),
            None => {
                let branches: Vec<Value> = items
                    .iter()
                    .map(|item| self.resolve(item).unwrap_or(Value::Null))
                    .collect();
                Some(keep("Fn::If", &Value::Array(branches)))
            }
        }
    }

    fn condition_named(&self, name: &str, depth: usize) -> Option<bool> {
        if depth > MAX_CONDITION_DEPTH {
            warn!(
                template = self.template.name(),
                condition = name,
                "condition nesting too deep, left unresolved"
            );
            return None;
        }
        let Some(expr) = self.template.conditions().and_then(|c| c.get(name)) else {
            warn!(template = self.template.name(), condition = name, "unknown condition");
            return None;
        };
        self.evaluate_condition(expr, depth + 1)
    }

    fn evaluate_condition(&self, expr: &Value, depth: usize) -> Option<bool> {
        let map = expr.as_object().filter(|m| m.len() == 1)?;
        let (key, args) = map.iter().next()?;
        match key.as_str() {
            "Condition" => self.condition_named(args.as_str()?, depth),
            "Fn::Equals" => {
                let items = args.as_array().filter(|items| items.len() == 2)?;
                let left = scalar_string(&self.resolve(&items[0])?)?;
                let right = scalar_string(&self.resolve(&items[1])?)?;
                Some(left == right)
            }
            "Fn::Not" => {
                let items = args.as_array().filter(|items| items.len() == 1)?;
                self.evaluate_condition(&items[0], depth + 1).map(|b| !b)
            }
            "Fn::And" => {
                let results: Option<Vec<bool>> = args
                    .as_array()?
                    .iter()
                    .map(|item| self.evaluate_condition(item, depth + 1))
                    .collect();
                results.map(|r| r.into_iter().all(|b| b))
            }
            "Fn::Or" => {
                let results: Option<Vec<bool>> = args
                    .as_array()?
                    .iter()
                    .map(|item| self.evaluate_condition(item, depth + 1))
                    .collect();
                results.map(|r| r.into_iter().any(|b| b))
            }
            _ => None,
        }
    }
}

fn pseudo_parameter(name: &str) -> Option<String> {
    let value = match name {
        "AWS::AccountId" => DEFAULT_ACCOUNT_ID.to_string(),
        "AWS::Region" => DEFAULT_REGION.to_string(),
        "AWS::Partition" => "aws".to_string(),
        "AWS::URLSuffix" => "amazonaws.com".to_string(),
        "AWS::StackName" => "stack-name".to_string(),
        "AWS::StackId" => format!(
            "arn:aws:cloudformation:{DEFAULT_REGION}:{DEFAULT_ACCOUNT_ID}:stack/stack-name/00000000-0000-0000-0000-000000000000"
        ),
        _ => return None,
    };
    Some(value)
}

fn is_intrinsic(map: &Map<String, Value>) -> bool {
    if map.len() != 1 {
        return false;
    }
    map.iter().next().is_some_and(|(key, value)| {
        key == "Ref" || key.starts_with("Fn::") || (key == "Condition" && value.is_string())
    })
}

fn keep(key: &str, args: &Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), args.clone());
    Value::Object(map)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn join(args: &Value) -> Option<Value> {
    let items = args.as_array().filter(|items| items.len() == 2)?;
    let delimiter = items[0].as_str()?;
    let parts: Option<Vec<String>> = items[1].as_array()?.iter().map(scalar_string).collect();
    Some(Value::String(parts?.join(delimiter)))
}

fn select(args: &Value) -> Option<Value> {
    let items = args.as_array().filter(|items| items.len() == 2)?;
    let index = match &items[0] {
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    items[1].as_array()?.get(index).cloned()
}

fn split(args: &Value) -> Option<Value> {
    let items = args.as_array().filter(|items| items.len() == 2)?;
    let delimiter = items[0].as_str()?;
    let source = items[1].as_str()?;
    Some(Value::Array(
        source.split(delimiter).map(Value::from).collect(),
    ))
}
