use crate::rules::ScanResult;

/// Plain-text summary: validity line, then one line per finding.
pub fn render(result: &ScanResult) -> String {
    let mut lines = vec![format!("Valid: {}", result.is_valid())];

    if !result.blocking_findings().is_empty() {
        lines.push("Issues found:".into());
        for finding in result.blocking_findings() {
            lines.push(format!("\t- {}: {}", finding.rule_id(), finding.reason()));
        }
    }

    if !result.monitored_findings().is_empty() {
        lines.push("Monitored issues found:".into());
        for finding in result.monitored_findings() {
            lines.push(format!("\t- {}: {}", finding.rule_id(), finding.reason()));
        }
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}
