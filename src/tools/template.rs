//! Docstring templating.
//!
//! duploctl docstrings are shared across resource kinds and carry Jinja
//! variables such as `{{kind}}` or `{{kind | lower}}`.

use minijinja::{Environment, context};

/// Render `doc` with `kind` bound to `resource`.
///
/// A docstring that fails to render is returned unchanged.
pub fn render_doc(doc: &str, resource: &str) -> String {
    if doc.is_empty() || (!doc.contains("{{") && !doc.contains("{%")) {
        return doc.to_string();
    }
    let env = Environment::new();
    match env.render_str(doc, context! { kind => resource }) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::debug!(resource = %resource, error = %e, "docstring template failed to render");
            doc.to_string()
        }
    }
}

/// ` - {subject}` where subject is the first paragraph joined onto one line,
/// or an empty string for an empty docstring.
pub fn docstring_summary(doc: &str) -> String {
    let subject = first_paragraph(doc);
    if subject.is_empty() {
        String::new()
    } else {
        format!(" - {}", subject)
    }
}

/// First paragraph of `doc`, newlines folded into spaces.
pub fn first_paragraph(doc: &str) -> String {
    doc.trim()
        .split("\n\n")
        .next()
        .unwrap_or("")
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// First line of `doc`.
pub fn first_line(doc: &str) -> String {
    doc.trim().lines().next().unwrap_or("").trim().to_string()
}
