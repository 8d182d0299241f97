use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::RenderTarget;
use crate::error::Result;
use crate::rules::{Finding, RuleMode, ScanResult};

/// Render findings as SARIF 2.1.0.
///
/// Blocking findings map to `error`, monitored ones to `warning`. Output is
/// deterministic for a given result: rules are listed sorted by id and
/// results keep recording order (blocking first).
pub fn render(result: &ScanResult, target: RenderTarget<'_>) -> Result<String> {
    let findings: Vec<&Finding> = result
        .blocking_findings()
        .iter()
        .chain(result.monitored_findings())
        .collect();

    let mut rule_index: BTreeMap<&str, &Finding> = BTreeMap::new();
    for finding in findings.iter().copied() {
        rule_index.entry(finding.rule_id()).or_insert(finding);
    }
    let rules: Vec<Value> = rule_index
        .values()
        .map(|finding| {
            json!({
                "id": finding.rule_id(),
                "defaultConfiguration": {
                    "level": mode_to_sarif_level(finding.mode()),
                },
                "properties": {
                    "risk": finding.risk().to_string(),
                    "granularity": finding.granularity().to_string(),
                },
            })
        })
        .collect();

    let results: Vec<Value> = findings
        .iter()
        .map(|f| {
            let mut result = json!({
                "ruleId": f.rule_id(),
                "level": mode_to_sarif_level(f.mode()),
                "message": { "text": f.reason() },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": { "uri": target.name, "index": 0 },
                    },
                }],
            });

            if let Some(context) = f.context() {
                let mut fqn = context.logical_id.clone();
                if let Some(path) = &context.path {
                    fqn = format!("{fqn}.{path}");
                }
                result["locations"][0]["logicalLocations"] = json!([{
                    "name": context.logical_id,
                    "fullyQualifiedName": fqn,
                    "kind": context.resource_type,
                }]);
                if !context.actions.is_empty() {
                    result["properties"] = json!({ "actions": context.actions });
                }
            }

            result
        })
        .collect();

    let sarif = json!({
        "$schema": "https://docs.oasis-open.org/sarif/sarif/v2.1.0/errata01/os/schemas/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "stackguard",
                    "version": env!("CARGO_PKG_VERSION"),
                    "semanticVersion": env!("CARGO_PKG_VERSION"),
                    "rules": rules,
                },
            },
            "artifacts": [{
                "location": { "uri": target.name },
                "hashes": { "sha-256": target.digest },
            }],
            "results": results,
            "automationDetails": {
                "id": format!("stackguard/{}", target.name),
            },
        }],
    });

    let mut output = serde_json::to_string_pretty(&sarif)?;
    output.push('\n');
    Ok(output)
}

fn mode_to_sarif_level(mode: RuleMode) -> &'static str {
    match mode {
        RuleMode::Blocking => "error",
        RuleMode::Monitor => "warning",
    }
}
