//! Output templates split around the data marker.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};

use dirsnap_core::{ScanResult, path_text};

use crate::error::ExportError;

/// Marker replaced by the encoded folder array.
pub const DATA_MARKER: &str = "[DIR DATA]";

/// Minimal viewer used when no template file is given.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/default.html");

/// A template split into the text before and after [`DATA_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    header: String,
    footer: String,
}

impl Template {
    /// Split template text at the first data marker.
    pub fn parse(text: &str) -> Result<Self, ExportError> {
        let (header, footer) = text
            .split_once(DATA_MARKER)
            .ok_or(ExportError::MissingMarker {
                marker: DATA_MARKER,
            })?;
        Ok(Self {
            header: header.to_string(),
            footer: footer.to_string(),
        })
    }

    /// Read and split a template file.
    pub fn load(path: &Path) -> Result<Self, ExportError> {
        let text = fs::read_to_string(path).map_err(|source| ExportError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// The built-in default template.
    pub fn builtin() -> Result<Self, ExportError> {
        Self::parse(DEFAULT_TEMPLATE)
    }

    /// Text written before the array.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Text written after the array.
    pub fn footer(&self) -> &str {
        &self.footer
    }

    /// Header and footer with every placeholder filled in.
    pub fn render(&self, vars: &TemplateVars) -> (String, String) {
        (vars.substitute(&self.header), vars.substitute(&self.footer))
    }
}

/// Values for the header/footer placeholders.
#[derive(Debug, Clone)]
pub struct TemplateVars {
    pub title: String,
    pub app_name: String,
    pub app_version: String,
    pub generated: DateTime<Local>,
    pub num_files: u64,
    pub num_dirs: u64,
    pub total_size: u64,
    pub source_root: String,
}

impl TemplateVars {
    /// Derive placeholder values from a finished scan.
    pub fn from_result(title: impl Into<String>, result: &ScanResult) -> Self {
        Self {
            title: title.into(),
            app_name: "dirsnap".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            generated: Local::now(),
            num_files: result.total_files,
            num_dirs: result.total_dirs,
            total_size: result.total_size,
            source_root: path_text(&result.root).into_owned(),
        }
    }

    fn substitute(&self, text: &str) -> String {
        let replacements = [
            ("[TITLE]", html_escape(&self.title)),
            ("[APP NAME]", self.app_name.clone()),
            ("[APP VER]", self.app_version.clone()),
            ("[GEN DATE]", self.generated.format("%Y-%m-%d").to_string()),
            ("[GEN TIME]", self.generated.format("%H:%M:%S").to_string()),
            ("[NUM FILES]", self.num_files.to_string()),
            ("[NUM DIRS]", self.num_dirs.to_string()),
            ("[TOT SIZE]", self.total_size.to_string()),
            ("[SOURCE ROOT]", html_escape(&self.source_root)),
        ];
        replacements
            .iter()
            .fold(text.to_string(), |acc, (key, value)| acc.replace(*key, value))
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
