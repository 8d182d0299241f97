//! Runs a configured rule set against one template.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::config::Config;
use crate::error::{GuardError, Result};
use crate::model::Template;

use super::{Rule, RuleMetadata, RuleRegistry, ScanResult};

/// Invokes every rule, in order, against a template.
pub struct RuleProcessor {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleProcessor {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Validate `config`, then build its active rules from `registry`.
    pub fn from_config(registry: &RuleRegistry, config: &Config) -> Result<Self> {
        config.validate(registry)?;
        let ids = config.active_rules(registry);
        registry.resolve(&ids, config).map(Self::new)
    }

    /// Metadata of the rules this processor will run, in run order.
    pub fn rules(&self) -> impl Iterator<Item = &RuleMetadata> {
        self.rules.iter().map(|r| r.metadata())
    }

    /// Run every rule once, strictly in order.
    ///
    /// The first rule that fails (returns `Err` or panics) stops the run.
    /// Its partial findings are discarded, so `result` holds exactly what
    /// the preceding rules recorded.
    pub fn process(
        &self,
        template: &Template,
        config: &Config,
        result: &mut ScanResult,
    ) -> Result<()> {
        for rule in &self.rules {
            let rule_id = rule.metadata().id;
            debug!(rule = rule_id, template = template.name(), "invoking rule");

            let checkpoint = result.checkpoint();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                rule.invoke(template, config, result)
            }));

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };

            if let Some(message) = failure {
                result.rollback(checkpoint);
                error!(rule = rule_id, template = template.name(), %message, "rule failed");
                return Err(GuardError::RuleInvocation {
                    rule_id: rule_id.to_string(),
                    template: template.name().to_string(),
                    message,
                });
            }

            if let Some(settings) = config.settings(rule_id) {
                if !settings.exempt_resources.is_empty() {
                    result.retain_since(checkpoint, |f| !settings.exempts(f));
                }
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("rule panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("rule panicked: {s}")
    } else {
        "rule panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSettings;
    use crate::rules::{FindingContext, RuleBase, RuleGranularity, RuleMode, RuleRisk};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    /// Records one finding per resource of a given type, or fails on demand.
    struct ScriptedRule {
        base: RuleBase,
        resource_type: &'static str,
        behaviour: Behaviour,
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Record,
        RecordThenError,
        RecordThenPanic,
    }

    impl Rule for ScriptedRule {
        fn metadata(&self) -> &RuleMetadata {
            self.base.metadata()
        }

        fn invoke(&self, template: &Template, _: &Config, result: &mut ScanResult) -> Result<()> {
            for resource in template.resources_of_type(self.resource_type) {
                result.record(self.base.resource_finding(
                    resource,
                    None,
                    format!("{} saw {}", self.base.id(), resource.logical_id),
                ));
            }
            match self.behaviour {
                Behaviour::Record => Ok(()),
                Behaviour::RecordThenError => {
                    Err(GuardError::Internal("lookup table missing".into()))
                }
                Behaviour::RecordThenPanic => panic!("index out of bounds"),
            }
        }
    }

    fn meta(id: &'static str, mode: RuleMode) -> RuleMetadata {
        RuleMetadata {
            id,
            name: id,
            description: "",
            default_mode: mode,
            risk: RuleRisk::Medium,
            granularity: RuleGranularity::Resource,
        }
    }

    fn rule(id: &'static str, mode: RuleMode, behaviour: Behaviour) -> Box<dyn Rule> {
        Box::new(ScriptedRule {
            base: RuleBase::new(meta(id, mode), &Config::default()),
            resource_type: "AWS::S3::Bucket",
            behaviour,
        })
    }

    fn buckets(n: usize) -> Template {
        let mut resources = serde_json::Map::new();
        for i in 0..n {
            resources.insert(format!("Bucket{i}"), json!({"Type": "AWS::S3::Bucket"}));
        }
        Template::from_value("buckets.json", json!({"Resources": resources})).unwrap()
    }

    fn ids(findings: &[crate::rules::Finding]) -> Vec<String> {
        findings.iter().map(|f| f.rule_id().to_string()).collect()
    }

    #[test]
    fn rule_order_is_preserved_per_partition() {
        let processor = RuleProcessor::new(vec![
            rule("A", RuleMode::Blocking, Behaviour::Record),
            rule("B", RuleMode::Monitor, Behaviour::Record),
            rule("C", RuleMode::Blocking, Behaviour::Record),
            rule("D", RuleMode::Monitor, Behaviour::Record),
        ]);
        let mut result = ScanResult::new();
        processor
            .process(&buckets(1), &Config::default(), &mut result)
            .unwrap();
        assert_eq!(ids(result.blocking_findings()), vec!["A", "C"]);
        assert_eq!(ids(result.monitored_findings()), vec!["B", "D"]);
        assert!(!result.is_valid());
    }

    #[test]
    fn emission_order_within_rule_is_kept() {
        let processor = RuleProcessor::new(vec![rule("A", RuleMode::Blocking, Behaviour::Record)]);
        let mut result = ScanResult::new();
        processor
            .process(&buckets(3), &Config::default(), &mut result)
            .unwrap();
        let reasons: Vec<_> = result.blocking_findings().iter().map(|f| f.reason()).collect();
        assert_eq!(reasons, vec!["A saw Bucket0", "A saw Bucket1", "A saw Bucket2"]);
    }

    #[test]
    fn template_without_matching_resources_yields_nothing() {
        let processor = RuleProcessor::new(vec![rule("A", RuleMode::Blocking, Behaviour::Record)]);
        let mut result = ScanResult::new();
        processor
            .process(&buckets(0), &Config::default(), &mut result)
            .unwrap();
        assert!(result.is_empty());
        assert!(result.is_valid());
    }

    #[test]
    fn error_stops_run_and_discards_partial_findings() {
        let processor = RuleProcessor::new(vec![
            rule("A", RuleMode::Blocking, Behaviour::Record),
            rule("Broken", RuleMode::Blocking, Behaviour::RecordThenError),
            rule("C", RuleMode::Monitor, Behaviour::Record),
        ]);
        let mut result = ScanResult::new();
        let err = processor
            .process(&buckets(1), &Config::default(), &mut result)
            .unwrap_err();
        assert_eq!(err.rule_id(), Some("Broken"));
        assert!(err.to_string().contains("lookup table missing"));
        assert!(err.to_string().contains("buckets.json"));
        assert_eq!(ids(result.blocking_findings()), vec!["A"]);
        assert!(result.monitored_findings().is_empty());
    }

    #[test]
    fn panic_is_contained_and_reported() {
        let processor = RuleProcessor::new(vec![
            rule("A", RuleMode::Monitor, Behaviour::Record),
            rule("Panicky", RuleMode::Blocking, Behaviour::RecordThenPanic),
            rule("C", RuleMode::Blocking, Behaviour::Record),
        ]);
        let mut result = ScanResult::new();
        let err = processor
            .process(&buckets(2), &Config::default(), &mut result)
            .unwrap_err();
        assert_eq!(err.rule_id(), Some("Panicky"));
        assert!(err.to_string().contains("index out of bounds"));
        assert_eq!(ids(result.monitored_findings()), vec!["A", "A"]);
        assert!(result.blocking_findings().is_empty());
    }

    #[test]
    fn exempt_resources_are_dropped_for_that_rule_only() {
        let mut config = Config::default();
        config.rule_settings.insert(
            "A".into(),
            RuleSettings {
                exempt_resources: vec!["Bucket0".into()],
                ..RuleSettings::default()
            },
        );
        let processor = RuleProcessor::new(vec![
            rule("A", RuleMode::Blocking, Behaviour::Record),
            rule("B", RuleMode::Blocking, Behaviour::Record),
        ]);
        let mut result = ScanResult::new();
        processor.process(&buckets(2), &config, &mut result).unwrap();
        let targets: Vec<_> = result
            .blocking_findings()
            .iter()
            .map(|f| (f.rule_id(), f.logical_id().unwrap()))
            .collect();
        assert_eq!(
            targets,
            vec![("A", "Bucket1"), ("B", "Bucket0"), ("B", "Bucket1")]
        );
    }

    #[test]
    fn context_names_offending_resource() {
        let processor = RuleProcessor::new(vec![rule("A", RuleMode::Blocking, Behaviour::Record)]);
        let mut result = ScanResult::new();
        processor
            .process(&buckets(1), &Config::default(), &mut result)
            .unwrap();
        assert_eq!(
            result.blocking_findings()[0].context(),
            Some(&FindingContext {
                logical_id: "Bucket0".into(),
                resource_type: "AWS::S3::Bucket".into(),
                path: None,
                actions: vec![],
            })
        );
    }

    proptest! {
        #[test]
        fn validity_law_and_determinism(
            modes in proptest::collection::vec(any::<bool>(), 0..6),
            bucket_count in 0usize..4,
        ) {
            const IDS: [&str; 6] = ["R0", "R1", "R2", "R3", "R4", "R5"];
            let build = || RuleProcessor::new(
                modes
                    .iter()
                    .enumerate()
                    .map(|(i, blocking)| {
                        let mode = if *blocking { RuleMode::Blocking } else { RuleMode::Monitor };
                        rule(IDS[i], mode, Behaviour::Record)
                    })
                    .collect(),
            );
            let template = buckets(bucket_count);

            let mut first = ScanResult::new();
            build().process(&template, &Config::default(), &mut first).unwrap();
            let mut second = ScanResult::new();
            build().process(&template, &Config::default(), &mut second).unwrap();

            prop_assert_eq!(first.is_valid(), first.blocking_findings().is_empty());
            prop_assert_eq!(
                serde_json::to_string(&first.report()).unwrap(),
                serde_json::to_string(&second.report()).unwrap()
            );
        }
    }
}
