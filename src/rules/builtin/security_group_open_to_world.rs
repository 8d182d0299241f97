use serde_json::Value;

use crate::config::Config;
use crate::error::Result;
use crate::model::{Resource, Template};
use crate::rules::{Rule, RuleBase, RuleGranularity, RuleMetadata, RuleMode, RuleRisk, ScanResult};

const DEFAULT_ALLOWED_PORTS: &[u32] = &[80, 443];
const OPEN_CIDRS: &[&str] = &["0.0.0.0/0", "::/0"];

/// Flags security group ingress open to the internet on ports outside the
/// allowed list (`allowed_ports`, default 80 and 443).
pub struct SecurityGroupOpenToWorldRule {
    base: RuleBase,
    allowed_ports: Vec<u32>,
}

impl SecurityGroupOpenToWorldRule {
    pub const METADATA: RuleMetadata = RuleMetadata {
        id: "EC2SecurityGroupOpenToWorldRule",
        name: "Security group open to world",
        description: "Security group ingress allows 0.0.0.0/0 or ::/0 on non-allowed ports",
        default_mode: RuleMode::Blocking,
        risk: RuleRisk::Medium,
        granularity: RuleGranularity::Resource,
    };

    pub fn build(config: &Config) -> Result<Box<dyn Rule>> {
        let base = RuleBase::new(Self::METADATA, config);
        let allowed_ports = base
            .settings()
            .allowed_ports
            .clone()
            .unwrap_or_else(|| DEFAULT_ALLOWED_PORTS.to_vec());
        Ok(Box::new(Self {
            base,
            allowed_ports,
        }))
    }

    fn check_ingress(
        &self,
        resource: &Resource,
        path: String,
        ingress: &Value,
        result: &mut ScanResult,
    ) {
        let Some(cidr) = open_cidr(ingress) else {
            return;
        };
        let Some((from, to)) = port_range(ingress) else {
            return;
        };
        if self.range_allowed(from, to) {
            return;
        }

        let ports = if from == to {
            format!("Port {from}")
        } else {
            format!("Ports {from}-{to}")
        };
        result.record(self.base.resource_finding(
            resource,
            Some(path),
            format!(
                "{ports} open to public IPs ({cidr}) in security group '{}'",
                resource.logical_id
            ),
        ));
    }

    fn range_allowed(&self, from: u32, to: u32) -> bool {
        let span = (to - from) as usize + 1;
        span <= self.allowed_ports.len() && (from..=to).all(|p| self.allowed_ports.contains(&p))
    }
}

impl Rule for SecurityGroupOpenToWorldRule {
    fn metadata(&self) -> &RuleMetadata {
        self.base.metadata()
    }

    fn invoke(&self, template: &Template, _config: &Config, result: &mut ScanResult) -> Result<()> {
        for resource in template.resources() {
            match resource.resource_type.as_str() {
                "AWS::EC2::SecurityGroup" => {
                    let ingresses = resource.property_items("SecurityGroupIngress");
                    for (i, ingress) in ingresses.iter().enumerate() {
                        self.check_ingress(
                            resource,
                            format!("Properties.SecurityGroupIngress.{i}"),
                            ingress,
                            result,
                        );
                    }
                }
                "AWS::EC2::SecurityGroupIngress" => {
                    self.check_ingress(resource, "Properties".into(), &resource.properties, result);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn open_cidr(ingress: &Value) -> Option<&str> {
    ["CidrIp", "CidrIpv6"]
        .iter()
        .filter_map(|key| ingress.get(*key).and_then(Value::as_str))
        .find(|cidr| OPEN_CIDRS.contains(cidr))
}

/// Inclusive port range of an ingress rule. Protocol `-1` and missing
/// ports mean every port.
fn port_range(ingress: &Value) -> Option<(u32, u32)> {
    let all_protocols = match ingress.get("IpProtocol") {
        Some(Value::String(p)) => p == "-1",
        Some(Value::Number(n)) => n.as_i64() == Some(-1),
        _ => false,
    };
    if all_protocols {
        return Some((0, 65535));
    }
    let from = port_value(ingress.get("FromPort")).unwrap_or(Some(0))?;
    let to = port_value(ingress.get("ToPort")).unwrap_or(Some(65535))?;
    // ICMP uses -1 for "all types"; treat it as the full range.
    let from = u32::try_from(from.max(0)).ok()?;
    let to = if to < 0 { 65535 } else { u32::try_from(to).ok()? };
    (from <= to).then_some((from, to))
}

/// `None` when the key is absent, `Some(None)` when present but not a
/// literal port (e.g. an unresolved `Ref`).
fn port_value(value: Option<&Value>) -> Option<Option<i64>> {
    let value = value?;
    Some(match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}
