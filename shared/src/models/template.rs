//! Label Template Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output format of a label template
///
/// `Text` goes through page drawing; the other formats are spooled raw and
/// their content is expected to already carry printer-control markup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Zpl,
    Code128,
    #[serde(rename = "qrcode")]
    QrCode,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Text,
        OutputFormat::Zpl,
        OutputFormat::Code128,
        OutputFormat::QrCode,
    ];

    /// Whether this format is delivered as a raw byte stream
    pub fn is_raw(&self) -> bool {
        !matches!(self, OutputFormat::Text)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Zpl => "zpl",
            OutputFormat::Code128 => "code128",
            OutputFormat::QrCode => "qrcode",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown output format: {0}")]
pub struct ParseFormatError(pub String);

impl FromStr for OutputFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "zpl" => Ok(OutputFormat::Zpl),
            "code128" => Ok(OutputFormat::Code128),
            "qrcode" | "qr" => Ok(OutputFormat::QrCode),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

/// Font and page layout metadata, passed through to page drawing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLayout {
    #[serde(default = "default_font_family")]
    pub font_family: String,
    /// Point size
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Multiplier applied to the font height between lines
    #[serde(default = "default_line_spacing")]
    pub line_spacing: f32,
    #[serde(default = "default_margin")]
    pub margin_left_mm: f32,
    #[serde(default = "default_margin")]
    pub margin_top_mm: f32,
    pub width_mm: Option<f32>,
    pub height_mm: Option<f32>,
}

fn default_font_family() -> String {
    "Arial".to_string()
}

fn default_font_size() -> f32 {
    10.0
}

fn default_line_spacing() -> f32 {
    1.2
}

fn default_margin() -> f32 {
    2.0
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            font_family: default_font_family(),
            font_size: default_font_size(),
            line_spacing: default_line_spacing(),
            margin_left_mm: default_margin(),
            margin_top_mm: default_margin(),
            width_mm: None,
            height_mm: None,
        }
    }
}

/// Label template
///
/// Owned by external editors; the monitor only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub format: OutputFormat,
    /// Body with `{PlaceholderName}` tokens
    pub content: String,
    #[serde(default)]
    pub layout: TemplateLayout,
}

impl Template {
    pub fn new(name: impl Into<String>, format: OutputFormat, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format,
            content: content.into(),
            layout: TemplateLayout::default(),
        }
    }
}
