pub mod builtin;
pub mod finding;
pub mod processor;
pub mod result;

mod base;

use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::error::{GuardError, Result};
use crate::model::Template;

pub use base::RuleBase;
pub use finding::{Finding, FindingContext, RuleGranularity, RuleMetadata, RuleMode, RuleRisk};
pub use processor::RuleProcessor;
pub use result::{Checkpoint, Report, ScanResult};

/// A rule checks a `Template` and records findings into a `ScanResult`.
///
/// Rules are built fresh for every template and invoked exactly once.
/// Recording nothing is the "no issue" outcome; an `Err` means the rule
/// itself is broken.
pub trait Rule: Send + Sync {
    /// Metadata about this rule (id, name, default mode, risk).
    fn metadata(&self) -> &RuleMetadata;

    /// Inspect the template and record findings.
    fn invoke(&self, template: &Template, config: &Config, result: &mut ScanResult)
        -> Result<()>;
}

/// Builds a rule instance from the run's configuration.
pub type RuleFactory = fn(&Config) -> Result<Box<dyn Rule>>;

/// A registered rule: its static metadata plus how to build it.
#[derive(Clone, Copy)]
pub struct RuleEntry {
    pub metadata: RuleMetadata,
    factory: RuleFactory,
}

impl std::fmt::Debug for RuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEntry")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl RuleEntry {
    pub fn build(&self, config: &Config) -> Result<Box<dyn Rule>> {
        (self.factory)(config)
    }
}

/// Maps stable rule ids to rule factories. Read-only once populated, so a
/// single registry can be shared by concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    entries: Vec<RuleEntry>,
    index: HashMap<&'static str, usize>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. Ids must be unique.
    pub fn register(&mut self, metadata: RuleMetadata, factory: RuleFactory) -> Result<()> {
        if self.index.contains_key(metadata.id) {
            return Err(GuardError::Config(format!(
                "rule '{}' is registered twice",
                metadata.id
            )));
        }
        self.index.insert(metadata.id, self.entries.len());
        self.entries.push(RuleEntry { metadata, factory });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&RuleEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.metadata.id)
    }

    /// List metadata for all registered rules.
    pub fn list_rules(&self) -> Vec<RuleMetadata> {
        self.entries.iter().map(|e| e.metadata).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Turn rule ids into rule instances, in the order given.
    ///
    /// Every id is checked before anything is built: an unknown or repeated
    /// id fails the whole resolution.
    pub fn resolve<S: AsRef<str>>(&self, ids: &[S], config: &Config) -> Result<Vec<Box<dyn Rule>>> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            if !seen.insert(id) {
                return Err(GuardError::Config(format!("rule '{id}' is listed more than once")));
            }
            let entry = self
                .get(id)
                .ok_or_else(|| GuardError::Config(format!("unknown rule '{id}'")))?;
            entries.push(entry);
        }

        entries.into_iter().map(|entry| entry.build(config)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    const NOOP: RuleMetadata = RuleMetadata {
        id: "NoopRule",
        name: "No-op",
        description: "Records nothing",
        default_mode: RuleMode::Monitor,
        risk: RuleRisk::Low,
        granularity: RuleGranularity::Stack,
    };

    struct NoopRule;

    impl Rule for NoopRule {
        fn metadata(&self) -> &RuleMetadata {
            &NOOP
        }

        fn invoke(&self, _: &Template, _: &Config, _: &mut ScanResult) -> Result<()> {
            Ok(())
        }
    }

    fn build_noop(_: &Config) -> Result<Box<dyn Rule>> {
        BUILT.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(NoopRule))
    }

    fn registry() -> RuleRegistry {
        let mut registry = RuleRegistry::new();
        registry.register(NOOP, build_noop).unwrap();
        registry
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = registry();
        assert!(registry.register(NOOP, build_noop).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_rule_rejected_before_construction() {
        let registry = registry();
        let before = BUILT.load(Ordering::SeqCst);
        let err = registry
            .resolve(&["NoopRule", "Missing"], &Config::default())
            .err()
            .unwrap();
        assert!(matches!(err, GuardError::Config(ref m) if m.contains("Missing")));
        assert_eq!(BUILT.load(Ordering::SeqCst), before);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let registry = registry();
        let err = registry
            .resolve(&["NoopRule", "NoopRule"], &Config::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn resolves_in_order() {
        let registry = registry();
        let rules = registry.resolve(&["NoopRule"], &Config::default()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].metadata().id, "NoopRule");
        let none: Vec<Box<dyn Rule>> = registry.resolve::<&str>(&[], &Config::default()).unwrap();
        assert!(none.is_empty());
    }
}
