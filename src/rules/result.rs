use serde::Serialize;

use super::finding::{Finding, RuleMode};

/// Accumulates findings for one template analysis.
///
/// Findings are partitioned by mode as they arrive; each partition keeps
/// recording order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    blocking: Vec<Finding>,
    monitored: Vec<Finding>,
}

/// Position of both partitions at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    blocking: usize,
    monitored: usize,
}

/// Exported view of a finished analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub valid: bool,
    pub blocking_findings: Vec<Finding>,
    pub monitored_findings: Vec<Finding>,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, finding: Finding) {
        match finding.mode() {
            RuleMode::Blocking => self.blocking.push(finding),
            RuleMode::Monitor => self.monitored.push(finding),
        }
    }

    /// True iff no blocking finding has been recorded.
    pub fn is_valid(&self) -> bool {
        self.blocking.is_empty()
    }

    pub fn blocking_findings(&self) -> &[Finding] {
        &self.blocking
    }

    pub fn monitored_findings(&self) -> &[Finding] {
        &self.monitored
    }

    /// Total findings across both partitions.
    pub fn len(&self) -> usize {
        self.blocking.len() + self.monitored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            blocking: self.blocking.len(),
            monitored: self.monitored.len(),
        }
    }

    /// Discard everything recorded after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.blocking.truncate(checkpoint.blocking);
        self.monitored.truncate(checkpoint.monitored);
    }

    /// Keep only the findings recorded after `checkpoint` that satisfy
    /// `keep`. Earlier findings are untouched.
    pub fn retain_since(&mut self, checkpoint: Checkpoint, mut keep: impl FnMut(&Finding) -> bool) {
        retain_tail(&mut self.blocking, checkpoint.blocking, &mut keep);
        retain_tail(&mut self.monitored, checkpoint.monitored, &mut keep);
    }

    pub fn report(&self) -> Report {
        Report {
            valid: self.is_valid(),
            blocking_findings: self.blocking.clone(),
            monitored_findings: self.monitored.clone(),
        }
    }

    pub fn into_report(self) -> Report {
        Report {
            valid: self.is_valid(),
            blocking_findings: self.blocking,
            monitored_findings: self.monitored,
        }
    }
}

fn retain_tail(findings: &mut Vec<Finding>, from: usize, keep: &mut impl FnMut(&Finding) -> bool) {
    if from >= findings.len() {
        return;
    }
    let tail: Vec<Finding> = findings.split_off(from);
    findings.extend(tail.into_iter().filter(|f| keep(f)));
}
