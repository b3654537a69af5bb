//! Template catalogue
//!
//! Read-only set of label templates: built-ins for every output format plus
//! any templates loaded from a JSON file. File entries replace built-ins of
//! the same name.
//!
//! File layout:
//!
//! ```json
//! [
//!   { "name": "bench-a", "format": "text", "content": "S/N {SerialNumber}",
//!     "layout": { "font_size": 12.0 } }
//! ]
//! ```

use super::renderer::{self, TemplateRenderError};
use label_printer::{ZplBuilder, escape_field_data};
use shared::models::record::{FIELD_ID, FIELD_PRINT_COUNT, FIELD_SERIAL, FIELD_TIMESTAMP};
use shared::{OutputFormat, Template};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the built-in text template and the usual default
pub const DEFAULT_TEMPLATE_NAME: &str = "default";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Cannot read template file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid template file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Template '{name}' is malformed: {source}")]
    Invalid {
        name: String,
        source: TemplateRenderError,
    },
}

/// Name of the built-in template for a format
pub fn builtin_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Text => DEFAULT_TEMPLATE_NAME,
        OutputFormat::Zpl => "default-zpl",
        OutputFormat::Code128 => "default-code128",
        OutputFormat::QrCode => "default-qrcode",
    }
}

/// Built-in template listing every configured measurement
pub fn builtin_template(format: OutputFormat, measurements: &[String]) -> Template {
    let content = match format {
        OutputFormat::Text => {
            let mut lines = vec![
                format!("S/N: {{{}}}", FIELD_SERIAL),
                format!("Date: {{{}}}", FIELD_TIMESTAMP),
            ];
            lines.extend(measurements.iter().map(|m| format!("{m}: {{{m}}}")));
            lines.push(format!("ID: {{{}}}  Printed: {{{}}}", FIELD_ID, FIELD_PRINT_COUNT));
            lines.join("\n")
        }
        OutputFormat::Zpl => {
            let mut zpl = label_header();
            let mut y = 80;
            for m in measurements {
                zpl.field_origin(20, y)
                    .font(24, 24)
                    .text_escaped(&format!("{}: {{{}}}", escape_field_data(m), m));
                y += 32;
            }
            zpl.build()
        }
        OutputFormat::Code128 => {
            let mut zpl = label_header();
            zpl.field_origin(20, 80)
                .code128(&format!("{{{}}}", FIELD_SERIAL), 80);
            zpl.build()
        }
        OutputFormat::QrCode => {
            let mut zpl = label_header();
            zpl.field_origin(20, 80)
                .qr_code(&format!("{{{}}}", FIELD_SERIAL), 5);
            zpl.build()
        }
    };
    Template::new(builtin_name(format), format, content)
}

/// Serial and timestamp lines shared by the raw built-ins
fn label_header() -> ZplBuilder {
    let mut zpl = ZplBuilder::new();
    zpl.utf8().label_home(0, 0).print_width(400);
    zpl.field_origin(20, 15)
        .font(30, 30)
        .text(&format!("S/N {{{}}}", FIELD_SERIAL));
    zpl.field_origin(20, 50)
        .font(20, 20)
        .text(&format!("{{{}}}", FIELD_TIMESTAMP));
    zpl
}

/// Templates available to the dispatcher
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Template>,
    measurements: Vec<String>,
}

impl TemplateCatalog {
    /// Catalogue holding only the built-in templates
    pub fn builtin(measurements: &[String]) -> Self {
        let templates = OutputFormat::ALL
            .iter()
            .map(|f| {
                let t = builtin_template(*f, measurements);
                (t.name.clone(), t)
            })
            .collect();
        Self {
            templates,
            measurements: measurements.to_vec(),
        }
    }

    /// Built-ins plus the templates of a JSON file
    pub fn load(path: impl AsRef<Path>, measurements: &[String]) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let templates: Vec<Template> =
            serde_json::from_str(&json).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut catalog = Self::builtin(measurements);
        for template in templates {
            catalog.insert(template)?;
        }
        tracing::info!(path = %path.display(), count = catalog.len(), "Templates loaded");
        Ok(catalog)
    }

    /// Add or replace a template after checking its structure
    pub fn insert(&mut self, template: Template) -> Result<(), CatalogError> {
        renderer::validate(&template).map_err(|source| CatalogError::Invalid {
            name: template.name.clone(),
            source,
        })?;

        let known: Vec<&str> = [FIELD_ID, FIELD_SERIAL, FIELD_TIMESTAMP, FIELD_PRINT_COUNT]
            .into_iter()
            .chain(self.measurements.iter().map(String::as_str))
            .collect();
        for token in renderer::tokens(&template.content) {
            if !known.contains(&token) {
                tracing::warn!(template = %template.name, token, "Placeholder does not match any field");
            }
        }

        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Pick the template for a job
    ///
    /// Order: `requested`, then `default_name`, then the built-in for
    /// `format`. A named template is only used when it was written for
    /// `format`; text content sent down a raw spool prints as garbage.
    pub fn resolve(&self, requested: Option<&str>, default_name: &str, format: OutputFormat) -> Template {
        for name in requested.into_iter().chain(Some(default_name)) {
            match self.get(name) {
                Some(t) if t.format == format => return t.clone(),
                Some(t) => tracing::warn!(
                    template = name,
                    template_format = %t.format,
                    format = %format,
                    "Template is for another format, skipped"
                ),
                None => tracing::warn!(template = name, "Template not found"),
            }
        }
        self.get(builtin_name(format))
            .filter(|t| t.format == format)
            .cloned()
            .unwrap_or_else(|| builtin_template(format, &self.measurements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Record;
    use std::io::Write;

    fn measurements() -> Vec<String> {
        vec!["Resistance".into(), "Leak_Current".into()]
    }

    #[test]
    fn test_builtins_cover_every_format() {
        let catalog = TemplateCatalog::builtin(&measurements());
        for format in OutputFormat::ALL {
            let t = catalog.get(builtin_name(format)).unwrap();
            assert_eq!(t.format, format);
            assert!(renderer::validate(t).is_ok());
        }
    }

    #[test]
    fn test_builtin_zpl_resolves_underscored_names() {
        let t = builtin_template(OutputFormat::Zpl, &measurements());
        let record = Record::new(1)
            .with_serial("SN1")
            .with_measurement("Resistance", Some(1.5))
            .with_measurement("Leak_Current", Some(0.0002));
        let out = renderer::render(&t, &record);

        assert!(out.starts_with("^XA^CI28"));
        assert!(out.contains("^FH^FDLeak_5FCurrent: 2.000E-4^FS"));
        assert!(out.contains("^FH^FDS/N SN1^FS"));
        assert!(!out.contains('{'));
    }

    #[test]
    fn test_builtin_text_lines() {
        let t = builtin_template(OutputFormat::Text, &measurements());
        let lines: Vec<&str> = t.content.lines().collect();
        assert_eq!(lines[0], "S/N: {SerialNumber}");
        assert_eq!(lines[2], "Resistance: {Resistance}");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_resolve_fallbacks() {
        let mut catalog = TemplateCatalog::builtin(&measurements());
        catalog
            .insert(Template::new("bench", OutputFormat::Text, "B {Id}"))
            .unwrap();

        assert_eq!(catalog.resolve(Some("bench"), "default", OutputFormat::Text).name, "bench");
        assert_eq!(catalog.resolve(Some("missing"), "bench", OutputFormat::Text).name, "bench");
        assert_eq!(
            catalog.resolve(Some("missing"), "also-missing", OutputFormat::QrCode).name,
            "default-qrcode"
        );
    }

    #[test]
    fn test_resolve_skips_other_formats() {
        let mut catalog = TemplateCatalog::builtin(&measurements());
        catalog
            .insert(Template::new("bench", OutputFormat::Text, "B {Id}"))
            .unwrap();
        catalog
            .insert(Template::new("bench-zpl", OutputFormat::Zpl, "^XA^FD{Id}^FS^XZ"))
            .unwrap();

        // 默认名 "default" 是文本模板，ZPL 任务应落到 ZPL 内置模板
        let t = catalog.resolve(None, DEFAULT_TEMPLATE_NAME, OutputFormat::Zpl);
        assert_eq!(t.name, "default-zpl");
        assert_eq!(t.format, OutputFormat::Zpl);

        assert_eq!(catalog.resolve(Some("bench"), "bench-zpl", OutputFormat::Zpl).name, "bench-zpl");
        assert_eq!(
            catalog.resolve(Some("bench-zpl"), "default", OutputFormat::Code128).name,
            "default-code128"
        );
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "default", "content": "Custom {{SerialNumber}}"}},
                {{"name": "small", "format": "zpl", "content": "^XA^FD{{Id}}^FS^XZ",
                  "layout": {{"font_size": 8.0}}}}
            ]"#
        )
        .unwrap();

        let catalog = TemplateCatalog::load(file.path(), &measurements()).unwrap();
        assert_eq!(catalog.get("default").unwrap().content, "Custom {SerialNumber}");
        let small = catalog.get("small").unwrap();
        assert_eq!(small.format, OutputFormat::Zpl);
        assert_eq!(small.layout.font_size, 8.0);
        assert_eq!(small.layout.font_family, "Arial");
        assert!(catalog.get("default-zpl").is_some());
    }

    #[test]
    fn test_load_rejects_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "bad", "content": "S/N {{SerialNumber"}}]"#).unwrap();
        assert!(matches!(
            TemplateCatalog::load(file.path(), &measurements()),
            Err(CatalogError::Invalid { .. })
        ));

        assert!(matches!(
            TemplateCatalog::load("/nonexistent/templates.json", &measurements()),
            Err(CatalogError::Io { .. })
        ));
    }
}
