//! Named reply templates.
//!
//! Templates are handlebars sources with HTML escaping switched off, since
//! replies are plain text shown on a handset.

use handlebars::Handlebars;
use std::path::Path;
use walkdir::WalkDir;

use ussd_common::{Error, Result};

use crate::response::TemplateValues;

/// File extensions picked up by [`TemplateRegistry::load_dir`].
pub const TEMPLATE_EXTENSIONS: &[&str] = &["tmpl", "hbs"];

/// Registry of templates consulted when a deferred response is resolved.
pub struct TemplateRegistry {
    registry: Handlebars<'static>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(false);
        Self { registry }
    }

    /// Compile and register `source` under `name`, replacing any previous template.
    pub fn register(&mut self, name: &str, source: &str) -> Result<()> {
        self.registry
            .register_template_string(name, source)
            .map_err(|e| Error::Template {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Register every `.tmpl` / `.hbs` file below `root`.
    ///
    /// Templates are named by their path relative to `root` with `/`
    /// separators, e.g. `transfer/confirm.tmpl`. Returns how many were loaded.
    pub fn load_dir(&mut self, root: &Path) -> Result<usize> {
        let mut loaded = 0;

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| {
                Error::Config(format!("cannot scan templates in {}: {e}", root.display()))
            })?;
            if !entry.file_type().is_file() || !has_template_extension(entry.path()) {
                continue;
            }

            let Some(name) = template_name(root, entry.path()) else {
                continue;
            };
            let source = std::fs::read_to_string(entry.path()).map_err(|e| {
                Error::Config(format!("cannot read template {}: {e}", entry.path().display()))
            })?;
            self.register(&name, &source)?;
            tracing::debug!(template = %name, "Registered template");
            loaded += 1;
        }

        tracing::info!(dir = %root.display(), loaded, "Templates loaded");
        Ok(loaded)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }

    /// Render a registered template. An unknown name is a configuration fault.
    pub fn render(&self, name: &str, values: &TemplateValues) -> Result<String> {
        if !self.contains(name) {
            return Err(Error::TemplateNotFound(name.to_string()));
        }
        self.registry
            .render(name, values)
            .map_err(|e| Error::Template {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.get_templates().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.registry.get_templates().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("templates", &self.names())
            .finish()
    }
}

fn has_template_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TEMPLATE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn template_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}
