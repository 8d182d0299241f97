use crate::error::Result;
use crate::rules::ScanResult;

/// Render the report as pretty JSON: `valid`, `blocking_findings`,
/// `monitored_findings`.
pub fn render(result: &ScanResult) -> Result<String> {
    let mut json = serde_json::to_string_pretty(&result.report())?;
    json.push('\n');
    Ok(json)
}
