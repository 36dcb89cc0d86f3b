//! HTML pages
//!
//! The admin surface is JSON, but browsers hitting it get human-readable
//! error and maintenance pages. Templates are embedded in the binary and
//! rendered with Tera.

use anyhow::{Context, Result};
use axum::http::StatusCode;
use rust_embed::RustEmbed;
use tera::{Context as TeraContext, Tera};

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct Templates;

/// Renders the embedded templates
pub struct Views {
    tera: Tera,
}

impl Views {
    pub fn new() -> Result<Self> {
        let mut templates = Vec::new();
        for name in Templates::iter() {
            let file = Templates::get(name.as_ref())
                .with_context(|| format!("Embedded template {} disappeared", name))?;
            let content = String::from_utf8(file.data.into_owned())
                .with_context(|| format!("Template {} is not UTF-8", name))?;
            templates.push((name.to_string(), content));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .context("Failed to load templates")?;
        Ok(Self { tera })
    }

    pub fn render_error(&self, status: StatusCode, message: &str) -> Result<String> {
        let mut context = TeraContext::new();
        context.insert("status", &status.as_u16());
        context.insert("title", status.canonical_reason().unwrap_or("Error"));
        context.insert("message", message);
        self.tera
            .render("error.html", &context)
            .context("Failed to render error page")
    }

    /// Maintenance page; the template supplies a default text
    pub fn render_maintenance(&self, message: Option<&str>) -> Result<String> {
        let mut context = TeraContext::new();
        if let Some(message) = message {
            context.insert("message", message);
        }
        self.tera
            .render("maintenance.html", &context)
            .context("Failed to render maintenance page")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_page_escapes_message() {
        let views = Views::new().unwrap();
        let html = views
            .render_error(StatusCode::FORBIDDEN, "<script>alert(1)</script>")
            .unwrap();
        assert!(html.contains("403"));
        assert!(html.contains("Forbidden"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_maintenance_page() {
        let views = Views::new().unwrap();
        assert!(views
            .render_maintenance(Some("Volvemos a las 18hs"))
            .unwrap()
            .contains("Volvemos a las 18hs"));
        assert!(views.render_maintenance(None).unwrap().contains("mantenimiento"));
    }
}
