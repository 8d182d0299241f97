//! stackguard: security scanner for CloudFormation templates.
//!
//! Parses a template into a document model, runs a configurable, ordered
//! set of rules against it and collects blocking and monitored findings
//! into a report suitable for CI gating.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use stackguard::rules::builtin::DEFAULT_RULES;
//! use stackguard::{analyse_file, load_config, ScanOptions};
//!
//! let options = ScanOptions::default();
//! let config = load_config(&options, &DEFAULT_RULES).unwrap();
//! let report = analyse_file(Path::new("stack.yaml"), &options, &config, &DEFAULT_RULES).unwrap();
//! println!("Valid: {}", report.result.is_valid());
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod rules;

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;
use walkdir::WalkDir;

use config::Config;
use error::{GuardError, Result};
use model::Template;
use output::{OutputFormat, RenderTarget};
use rules::{RuleProcessor, RuleRegistry, ScanResult};

/// File extensions picked up when a directory is given as a template path.
const TEMPLATE_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "template"];

/// Options for a scan invocation.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Path to config file (defaults to `.stackguard.toml` in the working directory).
    pub config_path: Option<PathBuf>,
    /// Output format.
    pub format: OutputFormat,
    /// Resolve intrinsic functions before running rules.
    pub resolve: bool,
    /// Parameter values used when resolving.
    pub resolve_parameters: HashMap<String, Value>,
    /// CLI override for the active rule list.
    pub rules_override: Option<Vec<String>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            format: OutputFormat::Txt,
            resolve: false,
            resolve_parameters: HashMap::new(),
            rules_override: None,
        }
    }
}

/// Analysis outcome for a single template.
#[derive(Debug, Clone)]
pub struct TemplateReport {
    pub template_name: String,
    /// Hex SHA-256 of the template text.
    pub digest: String,
    pub result: ScanResult,
}

/// Load and validate the run's configuration.
///
/// Fails on malformed tuning, unknown or duplicate rule ids before any
/// template is touched.
pub fn load_config(options: &ScanOptions, registry: &RuleRegistry) -> Result<Config> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(".stackguard.toml"));
    let mut config = Config::load(&config_path)?;

    if let Some(rules) = &options.rules_override {
        config.rules = Some(rules.clone());
    }

    RuleProcessor::from_config(registry, &config)?;
    Ok(config)
}

/// Run every active rule against an already-parsed template.
///
/// Rules are built fresh for this call, so concurrent calls never share
/// rule state.
pub fn analyse(
    template: &Template,
    config: &Config,
    registry: &RuleRegistry,
) -> Result<ScanResult> {
    let processor = RuleProcessor::from_config(registry, config)?;
    let mut result = ScanResult::new();
    processor.process(template, config, &mut result)?;
    Ok(result)
}

/// Parse, optionally resolve, and analyse template text.
pub fn analyse_text(
    name: &str,
    text: &str,
    options: &ScanOptions,
    config: &Config,
    registry: &RuleRegistry,
) -> Result<TemplateReport> {
    info!(template = name, "analysing template");

    let mut template = Template::parse(name, text)?;
    if options.resolve {
        template = template.resolve(&substitutions(options, config));
    }

    let result = analyse(&template, config, registry)?;
    info!(
        template = name,
        valid = result.is_valid(),
        blocking = result.blocking_findings().len(),
        monitored = result.monitored_findings().len(),
        "analysis complete"
    );

    Ok(TemplateReport {
        template_name: name.to_string(),
        digest: hex::encode(Sha256::digest(text.as_bytes())),
        result,
    })
}

/// Read and analyse one template file.
pub fn analyse_file(
    path: &Path,
    options: &ScanOptions,
    config: &Config,
    registry: &RuleRegistry,
) -> Result<TemplateReport> {
    let text = std::fs::read_to_string(path)?;
    analyse_text(&path.display().to_string(), &text, options, config, registry)
}

/// Expand directories into the template files they contain, sorted.
/// Plain file paths are passed through unchanged. A path reached twice is
/// only listed the first time.
pub fn discover_templates(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut templates = Vec::new();
    let mut seen = HashSet::new();
    for path in paths {
        if !path.is_dir() {
            if seen.insert(path.clone()) {
                templates.push(path.clone());
            }
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| GuardError::Io(e.into()))?;
            let is_template = entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| TEMPLATE_EXTENSIONS.contains(&e.to_lowercase().as_str()));
            if is_template && seen.insert(entry.path().to_path_buf()) {
                templates.push(entry.into_path());
            }
        }
    }
    Ok(templates)
}

/// Render a template report in the specified format.
pub fn render_report(report: &TemplateReport, format: OutputFormat) -> Result<String> {
    output::render(
        &report.result,
        format,
        RenderTarget {
            name: &report.template_name,
            digest: &report.digest,
        },
    )
}

/// Writes one result file per template under an output folder.
///
/// The template's path is mirrored below the folder, so templates sharing
/// a file name in different directories never share a result file. Writing
/// the same result path twice in one run is an error.
#[derive(Debug)]
pub struct ResultWriter {
    folder: PathBuf,
    format: OutputFormat,
    written: HashSet<PathBuf>,
}

impl ResultWriter {
    pub fn new(folder: impl Into<PathBuf>, format: OutputFormat) -> Result<Self> {
        let folder = folder.into();
        std::fs::create_dir_all(&folder)
            .map_err(|e| GuardError::Output(format!("{}: {e}", folder.display())))?;
        Ok(Self {
            folder,
            format,
            written: HashSet::new(),
        })
    }

    /// `<folder>/<template dirs>/<file name>.stackguard.results.<ext>`.
    ///
    /// Root and `.` components are dropped and `..` becomes `__`, so the
    /// result always lands inside the folder.
    pub fn result_path(&self, template: &Path) -> PathBuf {
        let mut parts: Vec<String> = template
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                Component::ParentDir => Some("__".to_string()),
                _ => None,
            })
            .collect();
        let file_name = parts.pop().unwrap_or_else(|| "template".to_string());

        let mut out = self.folder.clone();
        out.extend(parts);
        out.push(format!(
            "{file_name}.stackguard.results.{}",
            self.format.extension()
        ));
        out
    }

    /// Write `rendered` as the result file for `template`.
    pub fn write(&mut self, template: &Path, rendered: &str) -> Result<PathBuf> {
        let out = self.result_path(template);
        if !self.written.insert(out.clone()) {
            return Err(GuardError::Output(format!(
                "{} already holds results for another template",
                out.display()
            )));
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GuardError::Output(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(&out, rendered)
            .map_err(|e| GuardError::Output(format!("{}: {e}", out.display())))?;
        Ok(out)
    }
}

/// Pseudo parameters taken from config, overridden by explicit parameters.
fn substitutions(options: &ScanOptions, config: &Config) -> HashMap<String, Value> {
    let mut subs = HashMap::new();
    if let Some(account) = &config.aws_account_id {
        subs.insert("AWS::AccountId".to_string(), Value::from(account.as_str()));
    }
    if let Some(region) = &config.aws_region {
        subs.insert("AWS::Region".to_string(), Value::from(region.as_str()));
    }
    if let Some(stack) = &config.stack_name {
        subs.insert("AWS::StackName".to_string(), Value::from(stack.as_str()));
    }
    subs.extend(
        options
            .resolve_parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    subs
}
