use serde_json::{Map, Value};
use serde_yaml::value::TaggedValue;
use serde_yaml::Value as YamlValue;

use crate::error::{GuardError, Result};

/// Decode template text as JSON when it looks like JSON, YAML otherwise.
pub(super) fn parse_document(name: &str, text: &str) -> Result<Value> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(text).map_err(|e| GuardError::parse(name, e.to_string()));
    }

    let yaml: YamlValue =
        serde_yaml::from_str(text).map_err(|e| GuardError::parse(name, e.to_string()))?;
    yaml_to_json(yaml).map_err(|message| GuardError::parse(name, message))
}

fn yaml_to_json(value: YamlValue) -> std::result::Result<Value, String> {
    Ok(match value {
        YamlValue::Null => Value::Null,
        YamlValue::Bool(b) => Value::Bool(b),
        YamlValue::Number(n) => yaml_number(&n),
        YamlValue::String(s) => Value::String(s),
        YamlValue::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        YamlValue::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, value) in mapping {
                out.insert(mapping_key(key)?, yaml_to_json(value)?);
            }
            Value::Object(out)
        }
        YamlValue::Tagged(tagged) => expand_short_form(*tagged)?,
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::from(i)
    } else if let Some(u) = n.as_u64() {
        Value::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(n.to_string()))
    }
}

fn mapping_key(key: YamlValue) -> std::result::Result<String, String> {
    match key {
        YamlValue::String(s) => Ok(s),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Bool(b) => Ok(b.to_string()),
        other => Err(format!("unsupported mapping key: {other:?}")),
    }
}

/// Expand a short-form intrinsic (`!Ref`, `!Sub`, `!GetAtt` ...) into the
/// long-form mapping used by JSON templates.
fn expand_short_form(tagged: TaggedValue) -> std::result::Result<Value, String> {
    let tag = tagged.tag.to_string();
    let name = tag.trim_start_matches('!');
    let inner = yaml_to_json(tagged.value)?;

    let (key, value) = match name {
        "Ref" | "Condition" => (name.to_string(), inner),
        "GetAtt" => {
            let value = match inner {
                Value::String(s) => match s.split_once('.') {
                    Some((resource, attribute)) => {
                        Value::Array(vec![Value::from(resource), Value::from(attribute)])
                    }
                    None => Value::String(s),
                },
                other => other,
            };
            ("Fn::GetAtt".to_string(), value)
        }
        other => (format!("Fn::{other}"), inner),
    };

    let mut map = Map::new();
    map.insert(key, value);
    Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_json() {
        let value = parse_document("t.json", r#"{"Resources": {}}"#).unwrap();
        assert_eq!(value, json!({"Resources": {}}));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_document("t.json", r#"{"Resources": "#).unwrap_err();
        assert!(matches!(err, GuardError::Parse { ref template, .. } if template == "t.json"));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = parse_document("t.yaml", "Resources: [unclosed").unwrap_err();
        assert!(matches!(err, GuardError::Parse { .. }));
    }

    #[test]
    fn expands_short_form_tags() {
        let text = r#"
Resources:
  Bucket:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: !Sub "${AWS::StackName}-logs"
      Tags:
        - Key: env
          Value: !Ref Env
      Arn: !GetAtt Role.Arn
      Az: !Select [0, !GetAZs ""]
"#;
        let value = parse_document("t.yaml", text).unwrap();
        let props = &value["Resources"]["Bucket"]["Properties"];
        assert_eq!(props["BucketName"], json!({"Fn::Sub": "${AWS::StackName}-logs"}));
        assert_eq!(props["Tags"][0]["Value"], json!({"Ref": "Env"}));
        assert_eq!(props["Arn"], json!({"Fn::GetAtt": ["Role", "Arn"]}));
        assert_eq!(props["Az"], json!({"Fn::Select": [0, {"Fn::GetAZs": ""}]}));
    }

    #[test]
    fn yaml_keys_and_numbers_convert() {
        let value = parse_document("t.yaml", "80: open\nratio: 0.5\nflag: true\n").unwrap();
        assert_eq!(value, json!({"80": "open", "ratio": 0.5, "flag": true}));
    }
}
