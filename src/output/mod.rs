pub mod json;
pub mod sarif;
pub mod txt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rules::ScanResult;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Txt,
    Json,
    Sarif,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "txt" | "text" | "console" => Some(Self::Txt),
            "json" => Some(Self::Json),
            "sarif" => Some(Self::Sarif),
            _ => None,
        }
    }

    /// File extension used when results are written to an output folder.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Json => "json",
            Self::Sarif => "sarif",
        }
    }
}

/// What a renderer needs to know about the analysed template.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget<'a> {
    pub name: &'a str,
    /// Hex SHA-256 of the template text.
    pub digest: &'a str,
}

/// Render an analysis result into the specified format.
pub fn render(
    result: &ScanResult,
    format: OutputFormat,
    target: RenderTarget<'_>,
) -> Result<String> {
    match format {
        OutputFormat::Txt => Ok(txt::render(result)),
        OutputFormat::Json => json::render(result),
        OutputFormat::Sarif => sarif::render(result, target),
    }
}
